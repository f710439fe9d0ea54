//! Snapshot capture: draws the movable content once per sub-position into an
//! uncleared surface so fast motion leaves a continuous streak.

use crate::backend::{
    BackendError, BlendMode, FullscreenDraw, LoadAction, ProgramDesc, ProgramId, RenderBackend,
    SurfaceFormat, SurfaceId, TextureSlots, TRANSPARENT,
};
use crate::interpolator::Pose;
use crate::shaders;
use crate::uniforms::PassUniforms;
use crate::viewport::DeviceSize;

/// Draw callback for the movable foreground.
pub trait ContentDraw {
    /// Renders the content centred at `position` into `target`, blending over
    /// whatever the target already holds.
    fn draw(
        &mut self,
        backend: &mut dyn RenderBackend,
        target: SurfaceId,
        size: DeviceSize,
        position: Pose,
    ) -> Result<(), BackendError>;

    /// Releases any GPU resources the content holds.
    fn release(&mut self, backend: &mut dyn RenderBackend);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Shape {
    #[default]
    Diamond,
    Disc,
}

/// Signed-distance shape drawn with a full-screen program.
pub struct ShapeContent {
    pub shape: Shape,
    /// Corner-to-corner extent in device pixels.
    pub size_px: f32,
    /// Straight (not premultiplied) RGBA.
    pub color: [f32; 4],
    program: Option<ProgramId>,
}

impl ShapeContent {
    pub fn new(shape: Shape, size_px: f32, color: [f32; 4]) -> Self {
        Self {
            shape,
            size_px,
            color,
            program: None,
        }
    }

    fn program(&mut self, backend: &mut dyn RenderBackend) -> Result<ProgramId, BackendError> {
        if let Some(program) = self.program {
            return Ok(program);
        }
        let program = backend.create_program(&ProgramDesc {
            label: "content shape",
            fragment: shaders::SHAPE,
            target_format: SurfaceFormat::Rgba16Float,
            blend: BlendMode::PremultipliedOver,
        })?;
        self.program = Some(program);
        Ok(program)
    }
}

impl ContentDraw for ShapeContent {
    fn draw(
        &mut self,
        backend: &mut dyn RenderBackend,
        target: SurfaceId,
        size: DeviceSize,
        position: Pose,
    ) -> Result<(), BackendError> {
        let program = self.program(backend)?;
        let mut uniforms = PassUniforms::new(size);
        uniforms.params[0] = [
            position.x,
            position.y,
            self.size_px * 0.5,
            match self.shape {
                Shape::Diamond => 0.0,
                Shape::Disc => 1.0,
            },
        ];
        let [r, g, b, a] = self.color;
        uniforms.params[1] = [r * a, g * a, b * a, a];
        backend.draw_fullscreen(&FullscreenDraw {
            program,
            target,
            load: LoadAction::Load,
            uniforms: uniforms.as_bytes(),
            textures: TextureSlots::default(),
        })
    }

    fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(program) = self.program.take() {
            backend.release_program(program);
        }
    }
}

/// Capture flags for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureMode {
    /// Content is being moved by the pose source.
    pub active: bool,
    /// Keep drawing the content even when it does not move.
    pub paint_while_still: bool,
}

#[derive(Debug, Default)]
pub struct SnapshotCompositor {
    last_drawn: Option<Pose>,
}

impl SnapshotCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the snapshot, then draws `content` at each pending sub-position
    /// (or at `current` when none are pending). Returns the number of draws.
    #[allow(clippy::too_many_arguments)]
    pub fn capture(
        &mut self,
        backend: &mut dyn RenderBackend,
        snapshot: SurfaceId,
        size: DeviceSize,
        content: Option<&mut (dyn ContentDraw + 'static)>,
        current: Pose,
        pending: Vec<Pose>,
        mode: CaptureMode,
    ) -> Result<usize, BackendError> {
        backend.clear_surface(snapshot, TRANSPARENT)?;
        let Some(content) = content else {
            self.last_drawn = None;
            return Ok(0);
        };
        if !(mode.active || mode.paint_while_still || !pending.is_empty()) {
            self.last_drawn = None;
            return Ok(0);
        }

        let poses = if pending.is_empty() {
            vec![current]
        } else {
            pending
        };
        let mut draws = 0;
        // Sub-draws accumulate: the snapshot is only cleared once per frame.
        for pose in poses {
            // redrawing the same spot would darken it twice
            if !mode.paint_while_still && self.last_drawn == Some(pose) {
                continue;
            }
            content.draw(backend, snapshot, size, pose)?;
            self.last_drawn = Some(pose);
            draws += 1;
        }
        Ok(draws)
    }

    pub fn reset(&mut self) {
        self.last_drawn = None;
    }
}
