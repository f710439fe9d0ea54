//! `wgpu` implementation of the render backend.
//!
//! - `context` owns instance/adapter/device wiring and the preview window's
//!   swapchain, which it reconfigures on resize or loss.
//! - `backend` implements [`RenderBackend`](crate::backend::RenderBackend):
//!   surfaces are plain textures, programs are render pipelines sharing one
//!   bind group layout, uniforms go through a dynamic-offset ring.
//! - `readback` copies textures into staging buffers and decodes half floats.
//! - `headless` drives a pipeline offscreen and exports pixels.

mod backend;
mod context;
mod headless;
mod readback;

pub use backend::WgpuBackend;
pub use context::{GpuContext, WindowSurface};
pub use headless::{HeadlessRenderer, RenderedImage};
pub use readback::to_rgba8;
