//! Feedback render pipeline for afterimage.
//!
//! A movable piece of content leaves a decaying trail that is routed through
//! an ordered chain of full-screen stages every frame:
//!
//! ```text
//!   pose source ──▶ FrameInterpolator ──▶ sub-positions
//!                                             │
//!                                             ▼
//!                  SnapshotCompositor ──▶ snapshot surface
//!                                             │
//!                                             ▼
//!   FeedbackPipeline: stage 0 ─▶ stage 1 ─▶ … ─▶ output
//!                     (each reads its own previous output through a
//!                      ping-pong pair from the RenderTargetPool)
//! ```
//!
//! Nothing in the orchestration touches a GPU directly; every allocation,
//! clear and draw goes through a [`RenderBackend`]. [`gpu::WgpuBackend`] is the
//! real implementation, and [`window`] hosts the interactive preview.

pub mod backend;
pub mod clock;
pub mod compositor;
pub mod effects;
pub mod glyphs;
pub mod gpu;
pub mod interpolator;
pub mod params;
pub mod pass;
pub mod pipeline;
pub mod pool;
pub mod script;
pub mod session;
pub mod shaders;
pub mod uniforms;
pub mod viewport;
pub mod window;

pub use backend::{BackendError, RenderBackend, SurfaceId};
pub use compositor::{ContentDraw, Shape, ShapeContent};
pub use effects::{find_effect, Effect, EffectSelection, Preprocess, EFFECTS};
pub use interpolator::{FrameInterpolator, Interpolation, Pose};
pub use params::{ParamDef, ParamError, ParamKind, ParamSet, ParamValue};
pub use pipeline::{
    FeedbackPipeline, FrameInput, FrameOutput, PipelineError, PipelineSettings, PoseSample,
};
pub use viewport::{DeviceSize, Viewport};
