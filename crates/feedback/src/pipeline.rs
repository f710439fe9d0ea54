//! Per-frame orchestration: capture the content into the snapshot, then run
//! every stage of the selected effect over its ping-pong pair.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendError, RenderBackend, SurfaceId};
use crate::compositor::{CaptureMode, ContentDraw, SnapshotCompositor};
use crate::effects::EffectSelection;
use crate::interpolator::{FrameInterpolator, Interpolation, InterpolatorStats, Pose};
use crate::params::{find_def, ParamDef, ParamError, ParamSet, ParamValue};
use crate::pass::{ParamChange, Pass, PassError, PassRenderContext, PassSetupContext};
use crate::pool::RenderTargetPool;
use crate::session::SessionRandomizer;
use crate::uniforms::BaseUniforms;
use crate::viewport::{DeviceSize, Viewport};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Pass(#[from] PassError),
    #[error("failed to allocate render targets: {0}")]
    Targets(#[source] BackendError),
    #[error("failed to capture content: {0}")]
    Capture(#[source] BackendError),
    #[error("invalid setting: {0}")]
    Setting(String),
}

/// Pipeline-wide knobs that are not effect parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Feedback attenuation per frame, `0 <= decay < 1`.
    pub decay: f32,
    pub center_zoom: bool,
    pub paint_while_still: bool,
    pub step_px: f32,
    pub interpolation: Interpolation,
    pub pixel_ratio_cap: Option<f32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            decay: 0.975,
            center_zoom: false,
            paint_while_still: false,
            step_px: 4.0,
            interpolation: Interpolation::Linear,
            pixel_ratio_cap: None,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..1.0).contains(&self.decay) {
            return Err(PipelineError::Setting(format!(
                "decay must be in [0, 1), got {}",
                self.decay
            )));
        }
        if !self.step_px.is_finite() || self.step_px < 1.0 {
            return Err(PipelineError::Setting(format!(
                "step_px must be at least 1, got {}",
                self.step_px
            )));
        }
        if let Some(cap) = self.pixel_ratio_cap {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(PipelineError::Setting(format!(
                    "pixel_ratio_cap must be positive, got {cap}"
                )));
            }
        }
        Ok(())
    }
}

/// One reading of the pose source.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseSample {
    /// Device pixels, origin top-left.
    pub position: Pose,
    pub active: bool,
    /// Incremented once per grab.
    pub session_id: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameInput {
    pub viewport: Viewport,
    pub pose: PoseSample,
    pub elapsed: Duration,
}

/// What a frame produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameOutput {
    /// Texture to present, or `None` for a transparent frame.
    pub surface: Option<SurfaceId>,
    pub size: Option<DeviceSize>,
    pub content_draws: usize,
    pub stages_rendered: usize,
    pub stats: InterpolatorStats,
}

struct Stage {
    pass: Box<dyn Pass>,
    needs_setup: bool,
}

pub struct FeedbackPipeline {
    settings: PipelineSettings,
    pool: RenderTargetPool,
    stages: Vec<Stage>,
    selection: Option<EffectSelection>,
    params: ParamSet,
    defs: Vec<ParamDef>,
    font: Option<Arc<Vec<u8>>>,
    base: BaseUniforms,
    session: SessionRandomizer,
    interpolator: FrameInterpolator,
    compositor: SnapshotCompositor,
    content: Option<Box<dyn ContentDraw>>,
    last_output: Option<SurfaceId>,
    /// Set when a stage failed to set up; cleared on reselect or resize.
    broken: bool,
    failure: Option<String>,
    failures_reported: usize,
}

impl FeedbackPipeline {
    pub fn new(settings: PipelineSettings) -> Result<Self, PipelineError> {
        Self::with_session(settings, SessionRandomizer::new())
    }

    /// Uses the given randomizer, e.g. a seeded one for reproducible renders.
    pub fn with_session(
        settings: PipelineSettings,
        session: SessionRandomizer,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;
        let base = BaseUniforms {
            decay: settings.decay,
            session_random: session.seed(),
            ..BaseUniforms::default()
        };
        Ok(Self {
            interpolator: FrameInterpolator::new(settings.step_px, settings.interpolation),
            settings,
            pool: RenderTargetPool::default(),
            stages: Vec::new(),
            selection: None,
            params: ParamSet::new(),
            defs: Vec::new(),
            font: None,
            base,
            session,
            compositor: SnapshotCompositor::new(),
            content: None,
            last_output: None,
            broken: false,
            failure: None,
            failures_reported: 0,
        })
    }

    /// Font used by glyph passes created from now on.
    pub fn set_font(&mut self, font: Option<Arc<Vec<u8>>>) {
        self.font = font;
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn selection(&self) -> Option<EffectSelection> {
        self.selection
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn param_defs(&self) -> &[ParamDef] {
        &self.defs
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    pub fn session_random(&self) -> [f32; 3] {
        self.base.session_random
    }

    /// Most recent reported failure, cleared by the next good frame.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn failures_reported(&self) -> usize {
        self.failures_reported
    }

    /// Replaces the pass list. The previous passes and every render target
    /// are released before anything new is allocated; allocation happens on
    /// the next frame.
    pub fn select_effect(
        &mut self,
        backend: &mut dyn RenderBackend,
        selection: EffectSelection,
        params: ParamSet,
    ) -> Result<(), PipelineError> {
        let defs = selection.param_defs();
        let mut accepted = ParamSet::new();
        for (id, value) in params.iter() {
            match find_def(&defs, id) {
                Some(def) => accepted.insert(id, def.validate(value)?),
                None => tracing::debug!(param = id, effect = selection.effect.name, "ignoring unknown parameter"),
            }
        }

        self.release_stages(backend);
        self.pool.release(backend);
        self.last_output = None;
        self.broken = false;

        self.stages = selection
            .instantiate(self.font.as_ref())
            .into_iter()
            .map(|pass| Stage {
                pass,
                needs_setup: true,
            })
            .collect();
        self.defs = defs;
        self.params = accepted;
        self.selection = Some(selection);
        tracing::info!(
            effect = selection.effect.name,
            preprocess = %selection.preprocess,
            stages = self.stages.len(),
            "selected effect"
        );
        Ok(())
    }

    /// Validates and applies one parameter. Unknown ids are ignored.
    pub fn set_param(&mut self, id: &str, value: ParamValue) -> Result<(), PipelineError> {
        let Some(def) = find_def(&self.defs, id) else {
            tracing::debug!(param = id, "ignoring unknown parameter");
            return Ok(());
        };
        let value = def.validate(value)?;
        self.params.insert(id, value);
        for stage in &mut self.stages {
            if stage.pass.set_param(id, value) == ParamChange::NeedsSetup {
                stage.needs_setup = true;
            }
        }
        Ok(())
    }

    pub fn set_decay(&mut self, decay: f32) -> Result<(), PipelineError> {
        let settings = PipelineSettings {
            decay,
            ..self.settings.clone()
        };
        settings.validate()?;
        self.settings = settings;
        self.base.decay = decay;
        Ok(())
    }

    pub fn set_center_zoom(&mut self, enabled: bool) {
        self.settings.center_zoom = enabled;
    }

    pub fn set_paint_while_still(&mut self, enabled: bool) {
        self.settings.paint_while_still = enabled;
    }

    pub fn set_step_px(&mut self, step_px: f32) -> Result<(), PipelineError> {
        let settings = PipelineSettings {
            step_px,
            ..self.settings.clone()
        };
        settings.validate()?;
        self.settings = settings;
        self.interpolator.set_step_px(step_px);
        Ok(())
    }

    pub fn set_interpolation(&mut self, mode: Interpolation) {
        self.settings.interpolation = mode;
        self.interpolator.set_mode(mode);
    }

    /// Binds the movable content, releasing any previously bound content.
    pub fn bind_content(&mut self, backend: &mut dyn RenderBackend, content: Box<dyn ContentDraw>) {
        self.unbind_content(backend);
        self.content = Some(content);
    }

    pub fn unbind_content(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(mut content) = self.content.take() {
            content.release(backend);
        }
        self.compositor.reset();
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Runs one frame. Never fails: errors are reported once and the most
    /// recent valid output (or nothing) is presented instead.
    pub fn frame(&mut self, backend: &mut dyn RenderBackend, input: &FrameInput) -> FrameOutput {
        match self.try_frame(backend, input) {
            Ok(Some(output)) => {
                if self.failure.take().is_some() {
                    tracing::info!("pipeline recovered");
                }
                self.last_output = output.surface;
                output
            }
            Ok(None) => self.fallback(),
            Err(err) => {
                self.report(&err);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> FrameOutput {
        FrameOutput {
            surface: self.last_output.filter(|id| self.pool.owns(*id)),
            size: self.pool.size(),
            ..FrameOutput::default()
        }
    }

    fn try_frame(
        &mut self,
        backend: &mut dyn RenderBackend,
        input: &FrameInput,
    ) -> Result<Option<FrameOutput>, PipelineError> {
        let size = input.viewport.device_size(self.settings.pixel_ratio_cap);
        let pose = input.pose;

        if self.session.observe(pose.session_id) {
            self.base.session_random = self.session.seed();
        }

        self.ensure_targets(backend, size, pose.position)?;
        let Some(snapshot) = self.pool.snapshot() else {
            return Err(PipelineError::Targets(BackendError::Allocation {
                what: "snapshot".into(),
                reason: "missing after allocation".into(),
            }));
        };

        self.base.time = input.elapsed.as_secs_f32();
        self.base.texel_size = size.texel_size();
        self.base.center = self.center(pose.position, size);
        self.setup_stages(backend, size)?;
        if self.broken {
            // already reported
            return Ok(None);
        }
        for stage in &mut self.stages {
            stage.pass.update_base(&self.base);
        }

        // A teleport or off-screen pose must not turn into an unbounded
        // number of draws; one viewport diagonal of sub-positions is enough.
        self.interpolator
            .set_max_steps(max_sub_positions(size, self.interpolator.step_px()));
        self.interpolator.update(pose.position);
        let (pending, stats) = self.interpolator.drain();
        let content_draws = self
            .compositor
            .capture(
                backend,
                snapshot.id,
                size,
                self.content.as_deref_mut(),
                pose.position,
                pending,
                CaptureMode {
                    active: pose.active,
                    paint_while_still: self.settings.paint_while_still,
                },
            )
            .map_err(PipelineError::Capture)?;

        let mut input_surface = snapshot.id;
        let mut stages_rendered = 0;
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if !stage.pass.is_ready() {
                tracing::trace!(
                    stage = index,
                    pass = stage.pass.name(),
                    kind = ?stage.pass.kind(),
                    "skipping unready stage"
                );
                continue;
            }
            let Some(pair) = self.pool.pair_mut(index) else {
                continue;
            };
            let ctx = PassRenderContext {
                input: input_surface,
                history: pair.read().id,
                output: pair.write().id,
                snapshot: snapshot.id,
                time: self.base.time,
            };
            stage.pass.render(backend, &ctx)?;
            pair.swap();
            input_surface = pair.read().id;
            stages_rendered += 1;
        }

        let surface = match self.stages.len() {
            0 => snapshot.id,
            count => self
                .pool
                .pair(count - 1)
                .map(|pair| pair.read().id)
                .unwrap_or(input_surface),
        };

        Ok(Some(FrameOutput {
            surface: Some(surface),
            size: Some(size),
            content_draws,
            stages_rendered,
            stats,
        }))
    }

    fn ensure_targets(
        &mut self,
        backend: &mut dyn RenderBackend,
        size: DeviceSize,
        position: Pose,
    ) -> Result<(), PipelineError> {
        let resized = self.pool.size() != Some(size);
        if !resized && self.pool.len() == self.stages.len() && self.pool.snapshot().is_some() {
            return Ok(());
        }
        if resized {
            for stage in &mut self.stages {
                stage.needs_setup = true;
            }
            if self.pool.size().is_some() {
                tracing::debug!(width = size.width, height = size.height, "viewport resized");
            }
            self.interpolator.reset(Some(position));
            self.compositor.reset();
            self.last_output = None;
            self.broken = false;
        }
        self.pool
            .ensure(backend, self.stages.len(), size)
            .map_err(PipelineError::Targets)
    }

    fn setup_stages(
        &mut self,
        backend: &mut dyn RenderBackend,
        size: DeviceSize,
    ) -> Result<(), PipelineError> {
        if self.broken {
            return Ok(());
        }
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if !stage.needs_setup {
                continue;
            }
            stage.needs_setup = false;
            let ctx = PassSetupContext {
                pass_index: index,
                size,
                base: &self.base,
                params: &self.params,
            };
            if let Err(err) = stage.pass.setup(backend, &ctx) {
                tracing::debug!(
                    stage = index,
                    pass = stage.pass.name(),
                    kind = ?stage.pass.kind(),
                    "stage setup failed; disabling effect"
                );
                stage.pass.cleanup(backend);
                self.broken = true;
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn center(&self, position: Pose, size: DeviceSize) -> [f32; 2] {
        if self.settings.center_zoom || self.content.is_none() {
            return [0.5, 0.5];
        }
        let [width, height] = size.as_f32();
        [
            (position.x / width).clamp(0.0, 1.0),
            (position.y / height).clamp(0.0, 1.0),
        ]
    }

    fn report(&mut self, err: &PipelineError) {
        let message = err.to_string();
        if self.failure.as_deref() == Some(message.as_str()) {
            return;
        }
        tracing::error!(error = %message, "feedback pipeline failure");
        self.failure = Some(message);
        self.failures_reported += 1;
    }

    fn release_stages(&mut self, backend: &mut dyn RenderBackend) {
        for stage in &mut self.stages {
            stage.pass.cleanup(backend);
        }
        self.stages.clear();
    }

    /// Releases every GPU resource the pipeline holds.
    pub fn teardown(&mut self, backend: &mut dyn RenderBackend) {
        self.release_stages(backend);
        self.pool.release(backend);
        self.unbind_content(backend);
        self.selection = None;
        self.last_output = None;
    }
}

fn max_sub_positions(size: DeviceSize, step_px: f32) -> usize {
    let [width, height] = size.as_f32();
    (width.hypot(height) / step_px).ceil().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, Op};
    use crate::compositor::{Shape, ShapeContent};
    use crate::effects::Preprocess;

    fn input(width: f32, height: f32, pose: PoseSample, frame: u32) -> FrameInput {
        FrameInput {
            viewport: Viewport::new(width, height, 1.0),
            pose,
            elapsed: Duration::from_millis(16) * frame,
        }
    }

    fn pipeline() -> FeedbackPipeline {
        FeedbackPipeline::with_session(PipelineSettings::default(), SessionRandomizer::seeded(7))
            .unwrap()
    }

    fn select(pipeline: &mut FeedbackPipeline, backend: &mut MockBackend, name: &str) {
        let selection = EffectSelection::named(name, Preprocess::None).unwrap();
        pipeline
            .select_effect(backend, selection, ParamSet::new())
            .unwrap();
    }

    fn shape() -> Box<dyn ContentDraw> {
        Box::new(ShapeContent::new(Shape::Diamond, 16.0, [0.0, 0.0, 0.0, 1.0]))
    }

    #[test]
    fn zero_stages_present_the_snapshot() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        let output = pipeline.frame(&mut backend, &input(32.0, 32.0, PoseSample::default(), 0));
        assert_eq!(output.surface, pipeline.pool().snapshot().map(|s| s.id));
        assert_eq!(output.stages_rendered, 0);
    }

    #[test]
    fn every_stage_count_has_an_output() {
        for (name, stages) in [("motion_blur", 1), ("ascii_trail", 2)] {
            let mut backend = MockBackend::new();
            let mut pipeline = pipeline();
            select(&mut pipeline, &mut backend, name);
            let output =
                pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 0));
            assert_eq!(output.stages_rendered, stages);
            let last = pipeline.pool().pair(stages - 1).unwrap().read().id;
            assert_eq!(output.surface, Some(last));
        }
    }

    #[test]
    fn stages_swap_without_copying() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        let pose = PoseSample::default();

        pipeline.frame(&mut backend, &input(32.0, 32.0, pose, 0));
        let pair = pipeline.pool().pair(0).unwrap();
        let (read, write) = (pair.read().id, pair.write().id);

        backend.clear_ops();
        pipeline.frame(&mut backend, &input(32.0, 32.0, pose, 1));
        let pair = pipeline.pool().pair(0).unwrap();
        assert_eq!(pair.read().id, write);
        assert_eq!(pair.write().id, read);

        let draws = backend.draws();
        let (_, target, textures) = draws.last().unwrap();
        assert_eq!(*target, write);
        assert_eq!(textures.this_pass_previous_frame, Some(read));
        assert_eq!(
            textures.previous_pass_this_frame,
            pipeline.pool().snapshot().map(|s| s.id)
        );
        assert!(!backend.ops.iter().any(|op| matches!(op, Op::CreateSurface(..))));
    }

    #[test]
    fn second_stage_reads_first_stage_output() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "ascii_trail");
        pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 0));
        let first = pipeline.pool().pair(0).unwrap().read().id;
        let reduce_draw = backend
            .draws()
            .into_iter()
            .find(|(program, _, _)| backend.programs[program] == "ascii luminance reduce")
            .unwrap();
        assert_eq!(reduce_draw.2.previous_pass_this_frame, Some(first));
    }

    #[test]
    fn resize_round_trip_discards_history() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        let pose = PoseSample::default();
        pipeline.frame(&mut backend, &input(64.0, 32.0, pose, 0));
        let before = pipeline.pool().pair(0).unwrap().read();

        pipeline.frame(&mut backend, &input(40.0, 40.0, pose, 1));
        assert_eq!(pipeline.pool().size(), Some(DeviceSize::new(40, 40)));

        backend.clear_ops();
        pipeline.frame(&mut backend, &input(64.0, 32.0, pose, 2));
        let pair = pipeline.pool().pair(0).unwrap();
        assert_eq!(pair.size(), before.size);
        assert!(!backend.surfaces.contains_key(&before.id));
        // the history fed to the first draw after resizing was freshly cleared
        let history = backend.draws()[0].2.this_pass_previous_frame.unwrap();
        assert_eq!(backend.surface(history).generation, 0);
        assert_eq!(pipeline.stage_count(), 1);
        assert_eq!(backend.live_surfaces(), 3);
    }

    #[test]
    fn pixel_ratio_cap_bounds_targets() {
        let mut backend = MockBackend::new();
        let mut pipeline = FeedbackPipeline::new(PipelineSettings {
            pixel_ratio_cap: Some(1.5),
            ..PipelineSettings::default()
        })
        .unwrap();
        let frame = FrameInput {
            viewport: Viewport::new(100.0, 50.0, 3.0),
            pose: PoseSample::default(),
            elapsed: Duration::ZERO,
        };
        let output = pipeline.frame(&mut backend, &frame);
        assert_eq!(output.size, Some(DeviceSize::new(150, 75)));
    }

    #[test]
    fn effect_switch_releases_before_allocating() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "ascii_trail");
        pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 0));
        assert!(backend.live_programs() > 0);

        backend.clear_ops();
        select(&mut pipeline, &mut backend, "ripple_fade");
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_surfaces(), 0);

        pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 1));
        let first_create = backend
            .ops
            .iter()
            .position(|op| matches!(op, Op::CreateSurface(..) | Op::CreateProgram(..)))
            .unwrap();
        let last_release = backend
            .ops
            .iter()
            .rposition(|op| matches!(op, Op::ReleaseSurface(..) | Op::ReleaseProgram(..)))
            .unwrap();
        assert!(last_release < first_create);
        assert_eq!(backend.live_programs(), 1);
        assert_eq!(backend.live_surfaces(), 3);

        pipeline.teardown(&mut backend);
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_surfaces(), 0);
    }

    #[test]
    fn unready_stage_is_skipped() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        pipeline.frame(&mut backend, &input(32.0, 32.0, PoseSample::default(), 0));

        // simulate a pass mid-rebuild
        pipeline.stages[0].pass.cleanup(&mut backend);
        backend.clear_ops();
        let output = pipeline.frame(&mut backend, &input(32.0, 32.0, PoseSample::default(), 1));
        assert_eq!(output.stages_rendered, 0);
        assert!(output.surface.is_some());
        assert!(backend.draws().is_empty());
        assert_eq!(pipeline.failures_reported(), 0);
    }

    #[test]
    fn setup_failure_is_reported_once() {
        let mut backend = MockBackend::new();
        backend.fail_programs.push("random paint".into());
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "random_paint");

        for frame in 0..10 {
            let output =
                pipeline.frame(&mut backend, &input(32.0, 32.0, PoseSample::default(), frame));
            assert!(output.surface.is_none());
        }
        assert_eq!(pipeline.failures_reported(), 1);
        assert!(pipeline.failure().unwrap().contains("random paint"));

        backend.fail_programs.clear();
        select(&mut pipeline, &mut backend, "random_paint");
        let output = pipeline.frame(&mut backend, &input(32.0, 32.0, PoseSample::default(), 11));
        assert!(output.surface.is_some());
        assert!(pipeline.failure().is_none());
    }

    #[test]
    fn allocation_failure_presents_last_output() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        let good = pipeline.frame(&mut backend, &input(32.0, 32.0, PoseSample::default(), 0));

        // a failing resize loses the old targets, so nothing valid remains
        backend.fail_surfaces = true;
        let failed = pipeline.frame(&mut backend, &input(48.0, 48.0, PoseSample::default(), 1));
        assert!(good.surface.is_some());
        assert_eq!(failed.surface, None);
        pipeline.frame(&mut backend, &input(48.0, 48.0, PoseSample::default(), 2));
        assert_eq!(pipeline.failures_reported(), 1);
        assert_eq!(backend.live_surfaces(), 0);
    }

    #[test]
    fn new_session_reseeds_random() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "random_paint");
        let mut pose = PoseSample {
            session_id: 1,
            ..PoseSample::default()
        };
        pipeline.frame(&mut backend, &input(32.0, 32.0, pose, 0));
        let first = pipeline.session_random();
        pipeline.frame(&mut backend, &input(32.0, 32.0, pose, 1));
        assert_eq!(pipeline.session_random(), first);

        pose.session_id = 2;
        pipeline.frame(&mut backend, &input(32.0, 32.0, pose, 2));
        assert_ne!(pipeline.session_random(), first);
    }

    #[test]
    fn stationary_content_stops_drawing() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        pipeline.bind_content(&mut backend, shape());
        let pose = PoseSample {
            position: Pose::new(16.0, 16.0),
            active: true,
            session_id: 1,
        };
        let draws: Vec<usize> = (0..5)
            .map(|frame| {
                pipeline
                    .frame(&mut backend, &input(32.0, 32.0, pose, frame))
                    .content_draws
            })
            .collect();
        assert_eq!(draws, vec![1, 0, 0, 0, 0]);
        assert_eq!(backend.draws_with("content shape"), 1);
    }

    #[test]
    fn fast_motion_draws_every_sub_position() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        pipeline.set_step_px(25.0).unwrap();
        select(&mut pipeline, &mut backend, "motion_blur");
        pipeline.bind_content(&mut backend, shape());
        let mut pose = PoseSample {
            position: Pose::new(0.0, 10.0),
            active: true,
            session_id: 1,
        };
        pipeline.frame(&mut backend, &input(200.0, 20.0, pose, 0));
        pose.position = Pose::new(100.0, 10.0);
        let output = pipeline.frame(&mut backend, &input(200.0, 20.0, pose, 1));
        assert_eq!(output.content_draws, 4);
        assert_eq!(output.stats.produced, output.stats.consumed);
    }

    #[test]
    fn offscreen_jump_is_bounded_by_the_viewport() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        pipeline.bind_content(&mut backend, shape());
        let mut pose = PoseSample {
            position: Pose::new(16.0, 16.0),
            active: true,
            session_id: 1,
        };
        pipeline.frame(&mut backend, &input(64.0, 64.0, pose, 0));
        pose.position = Pose::new(4_000_000.0, 16.0);
        let output = pipeline.frame(&mut backend, &input(64.0, 64.0, pose, 1));

        // ceil(hypot(64, 64) / 4)
        assert_eq!(output.content_draws, 23);
        assert_eq!(output.stats.produced, 23);
        assert_eq!(output.stats.produced, output.stats.consumed);
    }

    #[test]
    fn live_param_applies_without_setup() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "ascii_trail");
        pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 0));
        backend.clear_ops();

        pipeline.set_param("invert", ParamValue::Bool(false)).unwrap();
        pipeline.set_param("no_such_param", ParamValue::Number(1.0)).unwrap();
        pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 1));
        assert!(!backend.ops.iter().any(|op| matches!(op, Op::CreateProgram(..))));

        pipeline.set_param("char_width", ParamValue::Number(24.0)).unwrap();
        pipeline.frame(&mut backend, &input(96.0, 48.0, PoseSample::default(), 2));
        assert!(backend.ops.iter().any(|op| matches!(op, Op::CreateProgram(..))));
        assert_eq!(pipeline.params().get("char_width"), Some(ParamValue::Number(24.0)));
    }

    #[test]
    fn param_kind_mismatch_is_rejected() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        select(&mut pipeline, &mut backend, "motion_blur");
        let err = pipeline
            .set_param("cutoff", ParamValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Param(ParamError::KindMismatch { .. })));
    }

    #[test]
    fn center_follows_content_unless_centered() {
        let mut backend = MockBackend::new();
        let mut pipeline = pipeline();
        let pose = Pose::new(25.0, 75.0);
        let size = DeviceSize::new(100, 100);
        assert_eq!(pipeline.center(pose, size), [0.5, 0.5]);

        pipeline.bind_content(&mut backend, shape());
        assert_eq!(pipeline.center(pose, size), [0.25, 0.75]);
        pipeline.set_center_zoom(true);
        assert_eq!(pipeline.center(pose, size), [0.5, 0.5]);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        for decay in [1.0, -0.1, f32::NAN] {
            let settings = PipelineSettings {
                decay,
                ..PipelineSettings::default()
            };
            assert!(FeedbackPipeline::new(settings).is_err());
        }
        let mut pipeline = pipeline();
        assert!(pipeline.set_step_px(0.5).is_err());
        assert!(pipeline.set_decay(0.0).is_ok());
    }
}
