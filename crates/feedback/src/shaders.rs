//! WGSL sources.
//!
//! Every program is a fragment body defining `fn frag(uv: vec2<f32>) -> vec4<f32>`.
//! [`compose`] prepends [`PRELUDE`], which declares the uniform block, the
//! samplers, the three texture slots and the full-screen triangle entry points.

pub const PRELUDE: &str = include_str!("shaders/prelude.wgsl");

pub const MOTION_BLUR: &str = include_str!("shaders/motion_blur.wgsl");
pub const RANDOM_PAINT: &str = include_str!("shaders/random_paint.wgsl");
pub const RIPPLE_FADE: &str = include_str!("shaders/ripple_fade.wgsl");
pub const BOX_BLUR: &str = include_str!("shaders/box_blur.wgsl");
pub const GAUSSIAN_BLUR: &str = include_str!("shaders/gaussian_blur.wgsl");
pub const LUMINANCE_REDUCE: &str = include_str!("shaders/luminance_reduce.wgsl");
pub const GLYPHS: &str = include_str!("shaders/glyphs.wgsl");
pub const SHAPE: &str = include_str!("shaders/shape.wgsl");
pub const COMPOSITE: &str = include_str!("shaders/composite.wgsl");

/// Produces a complete module from a fragment body.
pub fn compose(fragment: &str) -> String {
    let mut source = String::with_capacity(PRELUDE.len() + fragment.len() + 1);
    source.push_str(PRELUDE);
    source.push('\n');
    source.push_str(fragment);
    source
}
