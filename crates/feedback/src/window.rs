//! Interactive preview: a `winit` window whose pointer drives the content.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::clock::{FrameClock, SystemClock};
use crate::compositor::ContentDraw;
use crate::effects::{EffectSelection, EFFECTS};
use crate::gpu::{GpuContext, WgpuBackend, WindowSurface};
use crate::interpolator::Pose;
use crate::params::ParamSet;
use crate::pipeline::{FeedbackPipeline, FrameInput, PoseSample};
use crate::viewport::Viewport;

pub struct PreviewOptions {
    pub title: String,
    pub size: (u32, u32),
    pub background: [f32; 3],
    pub frame_interval: Duration,
    pub selection: EffectSelection,
    pub params: ParamSet,
    pub content: Box<dyn ContentDraw>,
}

/// Opens the preview window and blocks until it is closed.
pub fn run_preview(options: PreviewOptions, pipeline: FeedbackPipeline) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(&options.title)
        .with_inner_size(PhysicalSize::new(options.size.0, options.size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let mut state = PreviewState::new(window, options, pipeline)?;
    state.window.request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                state.shutdown();
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && state.handle_key(&event.logical_key) == KeyOutcome::Exit
                {
                    state.shutdown();
                    elwt.exit();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.drag.handle_cursor_moved(position);
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                state.drag.handle_button(button_state);
            }
            WindowEvent::Resized(size) => {
                state.resize(size);
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = state.window.inner_size();
                state.resize(size);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.redraw() {
                    match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            state.surface.reconfigure(state.backend.device());
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            tracing::error!("surface out of memory; closing preview");
                            state.shutdown();
                            elwt.exit();
                        }
                        other => {
                            tracing::warn!(error = ?other, "surface error; retrying next frame");
                        }
                    }
                }
                state.pacer.mark(Instant::now());
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if state.pacer.ready(now) {
                state.window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else {
                elwt.set_control_flow(ControlFlow::WaitUntil(state.pacer.deadline()));
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Exit,
}

/// Field order matters: the swapchain must drop before the window.
struct PreviewState {
    surface: WindowSurface,
    backend: WgpuBackend,
    pipeline: FeedbackPipeline,
    _context: GpuContext,
    clock: SystemClock,
    pacer: FramePacer,
    drag: DragState,
    selection: EffectSelection,
    params: ParamSet,
    background: [f32; 3],
    title: String,
    window: Arc<Window>,
}

impl PreviewState {
    fn new(
        window: Arc<Window>,
        options: PreviewOptions,
        mut pipeline: FeedbackPipeline,
    ) -> Result<Self> {
        let size = window.inner_size();
        let (context, surface) = GpuContext::for_window(window.as_ref(), size)
            .context("failed to initialise preview renderer")?;
        let mut backend = WgpuBackend::new(&context);
        pipeline.bind_content(&mut backend, options.content);
        pipeline.select_effect(&mut backend, options.selection, options.params.clone())?;

        let mut state = Self {
            surface,
            backend,
            pipeline,
            _context: context,
            clock: SystemClock::new(),
            pacer: FramePacer::new(options.frame_interval, Instant::now()),
            drag: DragState::new(size),
            selection: options.selection,
            params: options.params,
            background: options.background,
            title: options.title,
            window,
        };
        state.refresh_title();
        Ok(state)
    }

    fn handle_key(&mut self, key: &Key) -> KeyOutcome {
        match key {
            Key::Named(NamedKey::Escape) => return KeyOutcome::Exit,
            Key::Named(NamedKey::Space) => self.cycle_effect(),
            Key::Character(value) => match value.as_str() {
                " " => self.cycle_effect(),
                "c" | "C" => {
                    let enabled = !self.pipeline.settings().center_zoom;
                    self.pipeline.set_center_zoom(enabled);
                    tracing::info!(enabled, "center zoom");
                }
                "p" | "P" => {
                    let enabled = !self.pipeline.settings().paint_while_still;
                    self.pipeline.set_paint_while_still(enabled);
                    tracing::info!(enabled, "paint while still");
                }
                _ => {}
            },
            _ => {}
        }
        self.refresh_title();
        KeyOutcome::Continue
    }

    fn cycle_effect(&mut self) {
        let current = EFFECTS
            .iter()
            .position(|effect| effect.name == self.selection.effect.name)
            .unwrap_or(0);
        let next = EffectSelection {
            effect: &EFFECTS[(current + 1) % EFFECTS.len()],
            preprocess: self.selection.preprocess,
        };
        match self
            .pipeline
            .select_effect(&mut self.backend, next, self.params.clone())
        {
            Ok(()) => self.selection = next,
            Err(err) => tracing::error!(error = %err, effect = next.effect.name, "failed to switch effect"),
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(self.backend.device(), size);
        self.drag.resize(size);
        self.window.request_redraw();
    }

    fn redraw(&mut self) -> Result<(), wgpu::SurfaceError> {
        let physical = self.surface.size();
        let scale = self.window.scale_factor();
        let logical = physical.to_logical::<f32>(scale);
        let viewport = Viewport::new(logical.width, logical.height, scale as f32);
        let device = viewport.device_size(self.pipeline.settings().pixel_ratio_cap);

        let tick = self.clock.tick();
        let pose = self.drag.sample(physical, device.as_f32());
        let output = self.pipeline.frame(
            &mut self.backend,
            &FrameInput {
                viewport,
                pose,
                elapsed: tick.elapsed,
            },
        );

        let frame = self.surface.acquire()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        if let Err(err) =
            self.backend
                .present(output.surface, &view, self.surface.format(), self.background)
        {
            tracing::error!(error = %err, "failed to present frame");
        }
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }

    fn refresh_title(&self) {
        let settings = self.pipeline.settings();
        let mut flags = Vec::new();
        if settings.center_zoom {
            flags.push("center");
        }
        if settings.paint_while_still {
            flags.push("paint");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        self.window.set_title(&format!(
            "{} - {}{}",
            self.title, self.selection.effect.label, suffix
        ));
    }

    fn shutdown(&mut self) {
        self.pipeline.teardown(&mut self.backend);
        self.backend.flush();
    }
}

/// Pointer-driven pose source. Each press starts a new session.
#[derive(Debug)]
struct DragState {
    cursor: Option<PhysicalPosition<f64>>,
    /// Content position in window pixels.
    content: PhysicalPosition<f64>,
    grab_offset: Option<(f64, f64)>,
    session_id: u64,
}

impl DragState {
    fn new(size: PhysicalSize<u32>) -> Self {
        Self {
            cursor: None,
            content: PhysicalPosition::new(f64::from(size.width) * 0.5, f64::from(size.height) * 0.5),
            grab_offset: None,
            session_id: 0,
        }
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.cursor = Some(position);
        if let Some((dx, dy)) = self.grab_offset {
            self.content = PhysicalPosition::new(position.x + dx, position.y + dy);
        }
    }

    fn handle_button(&mut self, state: ElementState) {
        match state {
            ElementState::Pressed => {
                let cursor = self.cursor.unwrap_or(self.content);
                self.grab_offset = Some((self.content.x - cursor.x, self.content.y - cursor.y));
                self.session_id += 1;
            }
            ElementState::Released => {
                self.grab_offset = None;
            }
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.content.x = self.content.x.clamp(0.0, f64::from(size.width));
        self.content.y = self.content.y.clamp(0.0, f64::from(size.height));
    }

    /// Converts the window-pixel position into render-target pixels.
    fn sample(&self, window: PhysicalSize<u32>, device: [f32; 2]) -> PoseSample {
        let sx = device[0] / window.width.max(1) as f32;
        let sy = device[1] / window.height.max(1) as f32;
        PoseSample {
            position: Pose::new(self.content.x as f32 * sx, self.content.y as f32 * sy),
            active: self.grab_offset.is_some(),
            session_id: self.session_id,
        }
    }
}

/// Fixed-interval redraw scheduling.
#[derive(Debug)]
struct FramePacer {
    interval: Duration,
    next: Instant,
}

impl FramePacer {
    fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, next: now }
    }

    fn ready(&self, now: Instant) -> bool {
        now >= self.next
    }

    fn deadline(&self) -> Instant {
        self.next
    }

    /// Schedules the next frame one interval after `now`, without trying to
    /// catch up on missed frames.
    fn mark(&mut self, now: Instant) {
        self.next = now + self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_press_starts_a_session() {
        let mut drag = DragState::new(PhysicalSize::new(100, 100));
        drag.handle_cursor_moved(PhysicalPosition::new(40.0, 40.0));
        drag.handle_button(ElementState::Pressed);
        drag.handle_cursor_moved(PhysicalPosition::new(60.0, 45.0));
        let pose = drag.sample(PhysicalSize::new(100, 100), [100.0, 100.0]);
        assert!(pose.active);
        assert_eq!(pose.session_id, 1);
        assert_eq!(pose.position, Pose::new(70.0, 55.0));

        drag.handle_button(ElementState::Released);
        drag.handle_cursor_moved(PhysicalPosition::new(0.0, 0.0));
        drag.handle_button(ElementState::Pressed);
        let pose = drag.sample(PhysicalSize::new(100, 100), [100.0, 100.0]);
        assert_eq!(pose.session_id, 2);
        assert_eq!(pose.position, Pose::new(70.0, 55.0));
    }

    #[test]
    fn pose_scales_to_capped_targets() {
        let drag = DragState::new(PhysicalSize::new(200, 100));
        let pose = drag.sample(PhysicalSize::new(200, 100), [100.0, 50.0]);
        assert_eq!(pose.position, Pose::new(50.0, 25.0));
        assert!(!pose.active);
    }

    #[test]
    fn pacer_waits_one_interval() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(Duration::from_millis(16), start);
        assert!(pacer.ready(start));
        pacer.mark(start);
        assert!(!pacer.ready(start + Duration::from_millis(8)));
        assert!(pacer.ready(start + Duration::from_millis(16)));
        assert_eq!(pacer.deadline(), start + Duration::from_millis(16));
    }
}
