//! Units of GPU work.
//!
//! - [`ShaderPass`] runs one full-screen program per frame and keeps no state
//!   beyond the ping-pong pair the orchestrator hands it.
//! - [`AsciiLuminancePass`] is a scene pass: it samples its input on a coarse
//!   grid, reads the samples back and redraws a glyph per cell.
//!
//! Passes only ever see surfaces through the handles in their contexts.

mod scene;
mod shader;

pub use scene::{AsciiLuminancePass, GlyphGrid, GLYPH_RAMP};
pub use shader::{ShaderPass, ShaderPassDef};

use crate::backend::{BackendError, RenderBackend, SurfaceId};
use crate::params::{ParamDef, ParamSet, ParamValue};
use crate::uniforms::BaseUniforms;
use crate::viewport::DeviceSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Shader,
    Scene,
}

pub struct PassSetupContext<'a> {
    pub pass_index: usize,
    pub size: DeviceSize,
    pub base: &'a BaseUniforms,
    pub params: &'a ParamSet,
}

impl PassSetupContext<'_> {
    pub fn texel_size(&self) -> [f32; 2] {
        self.size.texel_size()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PassRenderContext {
    /// Upstream stage's output this frame, or the snapshot for stage 0.
    pub input: SurfaceId,
    /// This stage's own output from the previous frame.
    pub history: SurfaceId,
    pub output: SurfaceId,
    pub snapshot: SurfaceId,
    pub time: f32,
}

/// What a parameter change requires from the owner of the pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamChange {
    /// Took effect immediately.
    Applied,
    /// Takes effect after the pass is set up again.
    NeedsSetup,
    /// The pass does not declare this id.
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("pass '{pass}': {source}")]
    Backend {
        pass: String,
        #[source]
        source: BackendError,
    },
    #[error("pass '{pass}': {message}")]
    Invalid { pass: String, message: String },
}

impl PassError {
    pub(crate) fn backend(pass: &str) -> impl FnOnce(BackendError) -> PassError + '_ {
        move |source| PassError::Backend {
            pass: pass.to_string(),
            source,
        }
    }
}

pub trait Pass {
    fn name(&self) -> &str;

    fn kind(&self) -> PassKind;

    fn params(&self) -> &[ParamDef];

    /// Allocates GPU resources. Any previous resources are released first.
    fn setup(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &PassSetupContext<'_>,
    ) -> Result<(), PassError>;

    /// False until `setup` has completed successfully.
    fn is_ready(&self) -> bool;

    /// Receives the per-frame base uniforms before `render`.
    fn update_base(&mut self, base: &BaseUniforms);

    /// Applies one validated parameter value.
    fn set_param(&mut self, id: &str, value: ParamValue) -> ParamChange;

    /// Writes into `ctx.output` only.
    fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &PassRenderContext,
    ) -> Result<(), PassError>;

    /// Releases everything `setup` allocated. Safe to call repeatedly.
    fn cleanup(&mut self, backend: &mut dyn RenderBackend);
}
