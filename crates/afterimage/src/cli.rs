use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use feedback::{ParamValue, Preprocess};
use trailconfig::{InterpolationSetting, ShapeSetting};

#[derive(Parser, Debug)]
#[command(
    name = "afterimage",
    author,
    version,
    about = "Decaying motion trails through a GPU feedback pipeline",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings shared by the preview and headless render. Flags override the
/// config file.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Config file; defaults to `<config dir>/afterimage/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Effect name (see `afterimage effects`).
    #[arg(long, global = true, value_name = "NAME")]
    pub effect: Option<String>,

    /// Blur applied to the snapshot first: `none`, `box`, or `gaussian`.
    #[arg(long, global = true, value_name = "MODE", value_parser = parse_preprocess)]
    pub preprocess: Option<Preprocess>,

    /// Feedback decay per frame, in `[0, 1)`.
    #[arg(long, global = true, value_name = "FACTOR")]
    pub decay: Option<f32>,

    /// Spacing between interpolated content positions in device pixels.
    #[arg(long, global = true, value_name = "PX")]
    pub step_px: Option<f32>,

    /// Sub-frame path between poses: `linear` or `bezier`.
    #[arg(long, global = true, value_name = "MODE", value_parser = parse_interpolation)]
    pub interpolation: Option<InterpolationSetting>,

    /// Zoom toward the viewport center instead of the content.
    #[arg(long, global = true)]
    pub center_zoom: bool,

    /// Keep painting the content while it is not moving.
    #[arg(long, global = true)]
    pub paint_while_still: bool,

    /// Upper bound for the device pixel ratio.
    #[arg(long, global = true, value_name = "RATIO")]
    pub pixel_ratio_cap: Option<f32>,

    /// Content shape: `diamond` or `disc`.
    #[arg(long, global = true, value_name = "SHAPE", value_parser = parse_shape)]
    pub shape: Option<ShapeSetting>,

    /// Font used for the ASCII glyph atlas.
    #[arg(long, global = true, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Effect parameter override, repeatable (e.g. `--param char_width=16`).
    #[arg(long = "param", global = true, value_name = "ID=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the available effects and their parameters.
    Effects,
    /// Render a scripted drag without a window and write a PNG.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Output PNG path.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Number of frames to simulate.
    #[arg(long, value_name = "COUNT", default_value_t = 120)]
    pub frames: u64,

    /// Frames spent dragging before the content is released; defaults to all.
    #[arg(long, value_name = "COUNT")]
    pub drag_frames: Option<u64>,

    /// Output resolution in device pixels.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "512x512")]
    pub size: (u32, u32),

    /// Seed for the per-session random vector.
    #[arg(long, value_name = "SEED", default_value_t = 1)]
    pub seed: u64,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_preprocess(value: &str) -> Result<Preprocess, String> {
    value.parse()
}

pub fn parse_interpolation(value: &str) -> Result<InterpolationSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "linear" => Ok(InterpolationSetting::Linear),
        "bezier" | "curve" => Ok(InterpolationSetting::Bezier),
        other => Err(format!(
            "unknown interpolation '{other}'; expected linear or bezier"
        )),
    }
}

pub fn parse_shape(value: &str) -> Result<ShapeSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "diamond" => Ok(ShapeSetting::Diamond),
        "disc" | "circle" => Ok(ShapeSetting::Disc),
        other => Err(format!("unknown shape '{other}'; expected diamond or disc")),
    }
}

pub fn parse_param(value: &str) -> Result<(String, ParamValue), String> {
    let (id, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{value}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err("parameter id must not be empty".into());
    }
    let raw = raw.trim();
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" => ParamValue::Bool(true),
        "false" | "off" | "no" => ParamValue::Bool(false),
        _ => ParamValue::Number(
            raw.parse::<f32>()
                .map_err(|_| format!("invalid value '{raw}' for parameter '{id}'"))?,
        ),
    };
    Ok((id.to_string(), parsed))
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height".to_string())?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}
