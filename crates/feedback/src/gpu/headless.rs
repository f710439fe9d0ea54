use crate::backend::{
    BackendError, BlendMode, FullscreenDraw, LoadAction, ProgramDesc, ProgramId, RenderBackend,
    SurfaceDesc, SurfaceFormat, SurfaceId, TextureSlots, TRANSPARENT,
};
use crate::clock::FrameClock;
use crate::pipeline::{FeedbackPipeline, FrameInput, FrameOutput};
use crate::script::DragScript;
use crate::shaders;
use crate::uniforms::PassUniforms;
use crate::viewport::{DeviceSize, Viewport};

use super::backend::WgpuBackend;
use super::context::GpuContext;
use super::readback::to_rgba8;

/// Straight RGBA8 pixels, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Drives a pipeline without a window and reads the result back.
pub struct HeadlessRenderer {
    backend: WgpuBackend,
    composite: Option<ProgramId>,
    target: Option<(SurfaceId, DeviceSize)>,
}

impl HeadlessRenderer {
    pub fn new(context: &GpuContext) -> Self {
        Self {
            backend: WgpuBackend::new(context),
            composite: None,
            target: None,
        }
    }

    pub fn backend_mut(&mut self) -> &mut WgpuBackend {
        &mut self.backend
    }

    /// Runs `frames` frames of `script` at a fixed viewport and returns the
    /// last frame's output.
    pub fn run(
        &mut self,
        pipeline: &mut FeedbackPipeline,
        clock: &mut dyn FrameClock,
        script: &dyn DragScript,
        viewport: Viewport,
        frames: u64,
    ) -> FrameOutput {
        let mut output = FrameOutput::default();
        for _ in 0..frames {
            let tick = clock.tick();
            output = pipeline.frame(
                &mut self.backend,
                &FrameInput {
                    viewport,
                    pose: script.pose(tick.frame_index),
                    elapsed: tick.elapsed,
                },
            );
            self.backend.flush();
        }
        output
    }

    /// Composites `source` over `background` and reads the pixels back.
    pub fn capture(
        &mut self,
        source: Option<SurfaceId>,
        size: DeviceSize,
        background: [f32; 3],
    ) -> Result<RenderedImage, BackendError> {
        let program = match self.composite {
            Some(program) => program,
            None => {
                let program = self.backend.create_program(&ProgramDesc {
                    label: "export composite",
                    fragment: shaders::COMPOSITE,
                    target_format: SurfaceFormat::Rgba8Unorm,
                    blend: BlendMode::Replace,
                })?;
                self.composite = Some(program);
                program
            }
        };
        let target = match self.target {
            Some((id, current)) if current == size => id,
            previous => {
                if let Some((id, _)) = previous {
                    self.backend.release_surface(id);
                }
                let id = self.backend.create_surface(&SurfaceDesc::new(
                    "export target",
                    size.width,
                    size.height,
                    SurfaceFormat::Rgba8Unorm,
                ))?;
                self.target = Some((id, size));
                id
            }
        };

        let mut uniforms = PassUniforms::new(size);
        uniforms.params[0] = [background[0], background[1], background[2], 1.0];
        self.backend.draw_fullscreen(&FullscreenDraw {
            program,
            target,
            load: LoadAction::Clear(TRANSPARENT),
            uniforms: uniforms.as_bytes(),
            textures: TextureSlots {
                previous_pass_this_frame: source,
                ..TextureSlots::default()
            },
        })?;
        let texels = self.backend.read_surface(target)?;
        Ok(RenderedImage {
            width: size.width,
            height: size.height,
            rgba: to_rgba8(&texels),
        })
    }

    /// Reads a pipeline surface as linear floats.
    pub fn read(&mut self, id: SurfaceId) -> Result<Vec<[f32; 4]>, BackendError> {
        self.backend.read_surface(id)
    }

    pub fn release(&mut self) {
        if let Some(program) = self.composite.take() {
            self.backend.release_program(program);
        }
        if let Some((id, _)) = self.target.take() {
            self.backend.release_surface(id);
        }
    }
}
