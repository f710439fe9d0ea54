use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use feedback::clock::FixedStepClock;
use feedback::gpu::{GpuContext, HeadlessRenderer};
use feedback::script::CircularDrag;
use feedback::session::SessionRandomizer;
use feedback::window::{run_preview, PreviewOptions};
use feedback::{
    DeviceSize, EffectSelection, FeedbackPipeline, Interpolation, ParamSet, ParamValue,
    PipelineSettings, Preprocess, Shape, ShapeContent, Viewport, EFFECTS,
};
use image::RgbaImage;
use trailconfig::{InterpolationSetting, ParamSetting, PreprocessSetting, ShapeSetting, TrailConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{RenderArgs, RunArgs};
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Everything the preview and the headless render need, after the config
/// file and the command line have been merged.
#[derive(Debug)]
pub struct Resolved {
    pub settings: PipelineSettings,
    pub selection: EffectSelection,
    pub params: ParamSet,
    pub shape: Shape,
    pub content_size: f32,
    pub content_color: [f32; 4],
    pub background: [f32; 3],
    pub frame_interval: Duration,
    pub font: Option<Arc<Vec<u8>>>,
}

pub fn preview(args: &RunArgs) -> Result<()> {
    let resolved = resolve(args)?;
    let mut pipeline = FeedbackPipeline::new(resolved.settings.clone())?;
    pipeline.set_font(resolved.font.clone());

    tracing::info!(
        effect = resolved.selection.effect.name,
        preprocess = %resolved.selection.preprocess,
        "starting preview"
    );
    run_preview(
        PreviewOptions {
            title: format!("afterimage: {}", resolved.selection.effect.label),
            size: (960, 720),
            background: resolved.background,
            frame_interval: resolved.frame_interval,
            selection: resolved.selection,
            params: resolved.params,
            content: Box::new(ShapeContent::new(
                resolved.shape,
                resolved.content_size,
                resolved.content_color,
            )),
        },
        pipeline,
    )
}

pub fn render(args: &RunArgs, render: &RenderArgs) -> Result<()> {
    if render.frames == 0 {
        bail!("--frames must be at least 1");
    }
    let resolved = resolve(args)?;
    let size = DeviceSize::new(render.size.0, render.size.1);

    let context = GpuContext::headless()?;
    if size.width.max(size.height) > context.max_texture_dimension() {
        bail!(
            "render size {}x{} exceeds the adapter limit of {}",
            size.width,
            size.height,
            context.max_texture_dimension()
        );
    }
    let mut renderer = HeadlessRenderer::new(&context);
    let mut pipeline = FeedbackPipeline::with_session(
        resolved.settings.clone(),
        SessionRandomizer::seeded(render.seed),
    )?;
    pipeline.set_font(resolved.font.clone());
    pipeline.bind_content(
        renderer.backend_mut(),
        Box::new(ShapeContent::new(
            resolved.shape,
            resolved.content_size,
            resolved.content_color,
        )),
    );
    pipeline.select_effect(renderer.backend_mut(), resolved.selection, resolved.params)?;

    let script = CircularDrag::centered(
        size.width,
        size.height,
        render.drag_frames.unwrap_or(render.frames),
    );
    let mut clock = FixedStepClock::new(resolved.frame_interval);
    let output = renderer.run(
        &mut pipeline,
        &mut clock,
        &script,
        Viewport::from_device(size),
        render.frames,
    );
    if let Some(failure) = pipeline.failure() {
        bail!("rendering failed: {failure}");
    }

    let image = renderer
        .capture(output.surface, size, resolved.background)
        .context("failed to read back the rendered frame")?;
    pipeline.teardown(renderer.backend_mut());
    renderer.release();

    save_png(&render.output, image.width, image.height, image.rgba)?;
    tracing::info!(
        path = %render.output.display(),
        frames = render.frames,
        width = size.width,
        height = size.height,
        "wrote render"
    );
    Ok(())
}

pub fn list_effects() -> Result<()> {
    println!("Effects:");
    for effect in EFFECTS.iter() {
        println!("  {:<14} {}", effect.name, effect.label);
        let selection = EffectSelection {
            effect,
            preprocess: Preprocess::None,
        };
        for def in selection.param_defs() {
            let range = match (def.min, def.max) {
                (Some(min), Some(max)) => format!(" range={min}..{max}"),
                _ => String::new(),
            };
            println!(
                "    {:<12} {:<8} default={}{range}  {}",
                def.id, def.kind, def.default, def.label
            );
        }
    }
    println!("Preprocess: none, box, gaussian");
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<TrailConfig> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let paths = AppPaths::discover()?;
            let path = paths.config_file();
            if !path.exists() {
                tracing::debug!(dir = %paths.config_dir().display(), "no config file; using defaults");
                return Ok(TrailConfig::default());
            }
            path
        }
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = TrailConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn resolve(args: &RunArgs) -> Result<Resolved> {
    let mut config = load_config(args)?;
    apply_overrides(&mut config, args);
    config.validate().context("invalid settings")?;
    resolve_config(config)
}

fn apply_overrides(config: &mut TrailConfig, args: &RunArgs) {
    if let Some(effect) = &args.effect {
        config.effect = effect.clone();
    }
    if let Some(preprocess) = args.preprocess {
        config.preprocess = match preprocess {
            Preprocess::None => PreprocessSetting::None,
            Preprocess::Box => PreprocessSetting::Box,
            Preprocess::Gaussian => PreprocessSetting::Gaussian,
        };
    }
    if let Some(decay) = args.decay {
        config.decay = decay;
    }
    if let Some(step_px) = args.step_px {
        config.step_px = step_px;
    }
    if let Some(interpolation) = args.interpolation {
        config.interpolation = interpolation;
    }
    config.center_zoom |= args.center_zoom;
    config.paint_while_still |= args.paint_while_still;
    if let Some(cap) = args.pixel_ratio_cap {
        config.pixel_ratio_cap = Some(cap);
    }
    if let Some(shape) = args.shape {
        config.content.shape = shape;
    }
    if let Some(font) = &args.font {
        config.ascii.font = Some(font.clone());
    }
    for (id, value) in &args.params {
        let setting = match *value {
            ParamValue::Number(number) => ParamSetting::Number(number),
            ParamValue::Bool(flag) => ParamSetting::Bool(flag),
        };
        config.params.insert(id.clone(), setting);
    }
}

fn resolve_config(config: TrailConfig) -> Result<Resolved> {
    let preprocess = match config.preprocess {
        PreprocessSetting::None => Preprocess::None,
        PreprocessSetting::Box => Preprocess::Box,
        PreprocessSetting::Gaussian => Preprocess::Gaussian,
    };
    let selection = EffectSelection::named(&config.effect, preprocess).ok_or_else(|| {
        let known: Vec<&str> = EFFECTS.iter().map(|effect| effect.name).collect();
        anyhow!(
            "unknown effect '{}'; expected one of {}",
            config.effect,
            known.join(", ")
        )
    })?;

    let params: ParamSet = config
        .params
        .iter()
        .map(|(id, setting)| {
            let value = match *setting {
                ParamSetting::Number(number) => ParamValue::Number(number),
                ParamSetting::Bool(flag) => ParamValue::Bool(flag),
            };
            (id.clone(), value)
        })
        .collect();

    let font = match &config.ascii.font {
        Some(path) => Some(Arc::new(read_font(path)?)),
        None => None,
    };

    Ok(Resolved {
        settings: PipelineSettings {
            decay: config.decay,
            center_zoom: config.center_zoom,
            paint_while_still: config.paint_while_still,
            step_px: config.step_px,
            interpolation: match config.interpolation {
                InterpolationSetting::Linear => Interpolation::Linear,
                InterpolationSetting::Bezier => Interpolation::Bezier,
            },
            pixel_ratio_cap: config.pixel_ratio_cap,
        },
        selection,
        params,
        shape: match config.content.shape {
            ShapeSetting::Diamond => Shape::Diamond,
            ShapeSetting::Disc => Shape::Disc,
        },
        content_size: config.content.size,
        content_color: config.content.color,
        background: config.background,
        frame_interval: config.frame_interval,
        font,
    })
}

fn read_font(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read font {}", path.display()))
}

fn save_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let image = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        anyhow!("failed to construct image buffer for {width}x{height} RGBA frame")
    })?;
    image
        .save(path)
        .with_context(|| format!("failed to write png {}", path.display()))
}
