use std::sync::Arc;

use crate::backend::{
    BackendError, BlendMode, FullscreenDraw, LoadAction, ProgramDesc, ProgramId, RenderBackend, SurfaceDesc,
    SurfaceFormat, SurfaceId, TextureSlots, TRANSPARENT,
};
use crate::glyphs::{AtlasError, GlyphAtlas, DEFAULT_CELL_PX};
use crate::params::{find_def, ParamDef, ParamValue};
use crate::shaders;
use crate::uniforms::{BaseUniforms, PassUniforms};
use crate::viewport::DeviceSize;

use super::{ParamChange, Pass, PassError, PassKind, PassRenderContext, PassSetupContext};

/// Symbols from densest to blank.
pub const GLYPH_RAMP: [char; 35] = [
    '█', '▓', '▒', '░', '@', '#', 'M', 'W', '&', '8', 'B', '%', 'Q', 'D', 'O', '0', 'G', 'H', 'K',
    'X', 'N', 'U', 'Z', 'Y', 'C', 'V', 'J', 'L', 'I', '!', ';', ',', '.', '`', ' ',
];

const NAME: &str = "ascii luminance";

static PARAMS: [ParamDef; 2] = [
    ParamDef::number("char_width", "char width", 12.0)
        .range(4.0, 64.0)
        .step(1.0),
    ParamDef::boolean("invert", "ink luminance", true).uniform("uInvert"),
];

/// Maps a luminance in `[0, 1]` to a ramp index; bright input picks dense
/// symbols.
pub fn symbol_index(luminance: f32, count: usize) -> u8 {
    if count < 2 {
        return 0;
    }
    let luminance = if luminance.is_finite() {
        luminance.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let index = ((1.0 - luminance) * (count - 1) as f32).floor() as usize;
    index.min(count - 1) as u8
}

/// CPU-side cell table mirrored into the glyph index surface.
///
/// Each cell stores its symbol in red and its luminance in green.
#[derive(Debug)]
pub struct GlyphGrid {
    cols: u32,
    rows: u32,
    symbols: Vec<Option<u8>>,
    texels: Vec<u8>,
    relayouts: u64,
    dirty: bool,
}

impl GlyphGrid {
    pub fn new(cols: u32, rows: u32) -> Self {
        let cells = (cols * rows) as usize;
        Self {
            cols,
            rows,
            symbols: vec![None; cells],
            texels: vec![0; cells * 4],
            relayouts: 0,
            dirty: true,
        }
    }

    /// Grid for a surface of `size` with square cells of `cell_px`.
    pub fn for_size(size: DeviceSize, cell_px: f32) -> Self {
        let cell = cell_px.max(1.0);
        let cols = ((size.width as f32 / cell).floor() as u32).max(1);
        let rows = ((size.height as f32 / cell).floor() as u32).max(1);
        Self::new(cols, rows)
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol(&self, cell: usize) -> Option<u8> {
        self.symbols.get(cell).copied().flatten()
    }

    /// Number of symbol changes applied so far.
    pub fn relayouts(&self) -> u64 {
        self.relayouts
    }

    /// Updates one cell. Returns whether the symbol changed.
    pub fn update(&mut self, cell: usize, symbol: u8, luminance: f32) -> bool {
        let Some(slot) = self.symbols.get_mut(cell) else {
            return false;
        };
        let level = (luminance.clamp(0.0, 1.0) * 255.0).round() as u8;
        let texel = &mut self.texels[cell * 4..cell * 4 + 4];
        if texel[1] != level {
            texel[1] = level;
            self.dirty = true;
        }
        if *slot == Some(symbol) {
            return false;
        }
        *slot = Some(symbol);
        texel[0] = symbol;
        texel[3] = 255;
        self.relayouts += 1;
        self.dirty = true;
        true
    }

    /// Returns the texel bytes when anything changed since the last call.
    pub fn take_dirty(&mut self) -> Option<&[u8]> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(&self.texels)
    }
}

struct SceneResources {
    sample_surface: SurfaceId,
    index_surface: SurfaceId,
    atlas_surface: SurfaceId,
    reduce_program: ProgramId,
    glyph_program: ProgramId,
    reduce_uniforms: PassUniforms,
    glyph_uniforms: PassUniforms,
    grid: GlyphGrid,
}

impl SceneResources {
    fn release(self, backend: &mut dyn RenderBackend) {
        backend.release_program(self.reduce_program);
        backend.release_program(self.glyph_program);
        backend.release_surface(self.sample_surface);
        backend.release_surface(self.index_surface);
        backend.release_surface(self.atlas_surface);
    }
}

/// Tracks handles allocated during setup so a failure part-way releases them.
#[derive(Default)]
struct Allocation {
    surfaces: Vec<SurfaceId>,
    programs: Vec<ProgramId>,
}

impl Allocation {
    fn surface(
        &mut self,
        backend: &mut dyn RenderBackend,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<SurfaceId, BackendError> {
        let desc = SurfaceDesc::new(label, width, height, SurfaceFormat::Rgba8Unorm);
        let id = backend.create_surface(&desc)?;
        self.surfaces.push(id);
        Ok(id)
    }

    fn program(
        &mut self,
        backend: &mut dyn RenderBackend,
        desc: &ProgramDesc<'_>,
    ) -> Result<ProgramId, BackendError> {
        let id = backend.create_program(desc)?;
        self.programs.push(id);
        Ok(id)
    }

    fn unwind(self, backend: &mut dyn RenderBackend) {
        for program in self.programs {
            backend.release_program(program);
        }
        for surface in self.surfaces {
            backend.release_surface(surface);
        }
    }
}

/// Quantizes its input into a grid of luminance glyphs.
pub struct AsciiLuminancePass {
    font: Option<Arc<Vec<u8>>>,
    char_width: f32,
    invert: bool,
    resources: Option<SceneResources>,
}

impl AsciiLuminancePass {
    pub fn new() -> Self {
        Self {
            font: None,
            char_width: 12.0,
            invert: true,
            resources: None,
        }
    }

    /// Rasterizes glyphs from `font` instead of the dither ramp.
    pub fn with_font(mut self, font: Option<Arc<Vec<u8>>>) -> Self {
        self.font = font;
        self
    }

    pub fn grid(&self) -> Option<&GlyphGrid> {
        self.resources.as_ref().map(|resources| &resources.grid)
    }

    fn build_atlas(&self) -> Result<GlyphAtlas, AtlasError> {
        if let Some(bytes) = &self.font {
            match GlyphAtlas::from_font(bytes, &GLYPH_RAMP, DEFAULT_CELL_PX) {
                Ok(atlas) => return Ok(atlas),
                Err(err) => tracing::warn!(error = %err, "falling back to procedural glyphs"),
            }
        }
        GlyphAtlas::procedural(&GLYPH_RAMP, DEFAULT_CELL_PX)
    }

    fn allocate(
        &self,
        backend: &mut dyn RenderBackend,
        size: DeviceSize,
        alloc: &mut Allocation,
    ) -> Result<SceneResources, PassError> {
        let err = || PassError::backend(NAME);
        let grid = GlyphGrid::for_size(size, self.char_width);
        let (cols, rows) = (grid.cols(), grid.rows());

        let sample_surface =
            alloc.surface(backend, "ascii sample grid", cols, rows).map_err(err())?;
        let index_surface =
            alloc.surface(backend, "ascii glyph index", cols, rows).map_err(err())?;
        let atlas = self.build_atlas().map_err(|atlas_err| PassError::Invalid {
            pass: NAME.to_string(),
            message: atlas_err.to_string(),
        })?;
        let atlas_surface = alloc
            .surface(backend, "ascii glyph atlas", atlas.width(), atlas.height())
            .map_err(err())?;
        backend
            .write_surface(atlas_surface, atlas.pixels())
            .map_err(err())?;

        let reduce_program = alloc
            .program(
                backend,
                &ProgramDesc {
                    label: "ascii luminance reduce",
                    fragment: shaders::LUMINANCE_REDUCE,
                    target_format: SurfaceFormat::Rgba8Unorm,
                    blend: BlendMode::Replace,
                },
            )
            .map_err(err())?;
        let glyph_program = alloc
            .program(
                backend,
                &ProgramDesc {
                    label: "ascii glyphs",
                    fragment: shaders::GLYPHS,
                    target_format: SurfaceFormat::Rgba16Float,
                    blend: BlendMode::Replace,
                },
            )
            .map_err(err())?;

        let mut reduce_uniforms = PassUniforms::new(DeviceSize::new(cols, rows));
        reduce_uniforms.set_slot(0, cols as f32);
        reduce_uniforms.set_slot(1, rows as f32);
        reduce_uniforms.set_slot(2, ParamValue::Bool(self.invert).as_f32());

        let mut glyph_uniforms = PassUniforms::new(size);
        glyph_uniforms.set_slot(0, cols as f32);
        glyph_uniforms.set_slot(1, rows as f32);
        glyph_uniforms.set_slot(2, atlas.count() as f32);

        Ok(SceneResources {
            sample_surface,
            index_surface,
            atlas_surface,
            reduce_program,
            glyph_program,
            reduce_uniforms,
            glyph_uniforms,
            grid,
        })
    }
}

impl Default for AsciiLuminancePass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for AsciiLuminancePass {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> PassKind {
        PassKind::Scene
    }

    fn params(&self) -> &[ParamDef] {
        &PARAMS
    }

    fn setup(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &PassSetupContext<'_>,
    ) -> Result<(), PassError> {
        self.cleanup(backend);
        self.char_width = ctx.params.resolve(&PARAMS[0]).as_f32();
        self.invert = ctx.params.resolve(&PARAMS[1]).as_bool();

        let mut alloc = Allocation::default();
        match self.allocate(backend, ctx.size, &mut alloc) {
            Ok(resources) => {
                tracing::debug!(
                    index = ctx.pass_index,
                    cols = resources.grid.cols(),
                    rows = resources.grid.rows(),
                    char_width = self.char_width,
                    "ascii pass ready"
                );
                self.resources = Some(resources);
                Ok(())
            }
            Err(err) => {
                alloc.unwind(backend);
                Err(err)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.resources.is_some()
    }

    fn update_base(&mut self, base: &BaseUniforms) {
        if let Some(resources) = self.resources.as_mut() {
            resources.glyph_uniforms.apply_base(base, false);
        }
    }

    fn set_param(&mut self, id: &str, value: ParamValue) -> ParamChange {
        if find_def(&PARAMS, id).is_none() {
            return ParamChange::Unknown;
        }
        match id {
            "invert" => {
                self.invert = value.as_bool();
                if let Some(resources) = self.resources.as_mut() {
                    resources.reduce_uniforms.set_slot(2, value.as_f32());
                }
                ParamChange::Applied
            }
            _ => ParamChange::NeedsSetup,
        }
    }

    fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &PassRenderContext,
    ) -> Result<(), PassError> {
        let Some(resources) = self.resources.as_mut() else {
            return Ok(());
        };
        let err = || PassError::backend(NAME);

        backend
            .draw_fullscreen(&FullscreenDraw {
                program: resources.reduce_program,
                target: resources.sample_surface,
                load: LoadAction::Clear(TRANSPARENT),
                uniforms: resources.reduce_uniforms.as_bytes(),
                textures: TextureSlots {
                    previous_pass_this_frame: Some(ctx.input),
                    ..TextureSlots::default()
                },
            })
            .map_err(err())?;

        // Readback flushes the reduce draw first, so the samples are this
        // frame's input, not last frame's.
        let samples = backend
            .read_surface(resources.sample_surface)
            .map_err(err())?;
        let count = GLYPH_RAMP.len();
        for (cell, sample) in samples.iter().enumerate().take(resources.grid.len()) {
            let luminance = sample[0];
            resources
                .grid
                .update(cell, symbol_index(luminance, count), luminance);
        }
        // Only changed cells mark the grid dirty; a still trail uploads nothing.
        if let Some(texels) = resources.grid.take_dirty() {
            backend
                .write_surface(resources.index_surface, texels)
                .map_err(err())?;
        }

        resources.glyph_uniforms.set_time(ctx.time);
        // Queue writes land before the next submission, which holds this draw.
        backend
            .draw_fullscreen(&FullscreenDraw {
                program: resources.glyph_program,
                target: ctx.output,
                load: LoadAction::Clear(TRANSPARENT),
                uniforms: resources.glyph_uniforms.as_bytes(),
                textures: TextureSlots {
                    previous_pass_this_frame: Some(resources.index_surface),
                    this_pass_previous_frame: None,
                    aux: Some(resources.atlas_surface),
                },
            })
            .map_err(err())
    }

    fn cleanup(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(resources) = self.resources.take() {
            resources.release(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::params::ParamSet;

    fn ready_pass(backend: &mut MockBackend, size: DeviceSize, params: &ParamSet) -> AsciiLuminancePass {
        let mut pass = AsciiLuminancePass::new();
        let base = BaseUniforms::default();
        pass.setup(
            backend,
            &PassSetupContext {
                pass_index: 1,
                size,
                base: &base,
                params,
            },
        )
        .unwrap();
        pass
    }

    fn frame(backend: &mut MockBackend, pass: &mut AsciiLuminancePass) {
        let desc = SurfaceDesc::new("io", 96, 48, SurfaceFormat::Rgba16Float);
        let input = backend.create_surface(&desc).unwrap();
        let output = backend.create_surface(&desc).unwrap();
        pass.render(
            backend,
            &PassRenderContext {
                input,
                history: output,
                output,
                snapshot: input,
                time: 0.0,
            },
        )
        .unwrap();
    }

    #[test]
    fn symbol_index_spans_the_ramp() {
        assert_eq!(symbol_index(1.0, 35), 0);
        assert_eq!(symbol_index(0.0, 35), 34);
        assert_eq!(symbol_index(0.5, 35), 17);
        assert_eq!(symbol_index(f32::NAN, 35), 34);
        assert_eq!(symbol_index(2.0, 35), 0);
    }

    #[test]
    fn grid_dimensions_floor_to_whole_cells() {
        let grid = GlyphGrid::for_size(DeviceSize::new(100, 50), 12.0);
        assert_eq!((grid.cols(), grid.rows()), (8, 4));
        let grid = GlyphGrid::for_size(DeviceSize::new(5, 5), 12.0);
        assert_eq!((grid.cols(), grid.rows()), (1, 1));
    }

    #[test]
    fn repeated_symbol_relayouts_once() {
        let mut grid = GlyphGrid::new(2, 1);
        assert!(grid.update(0, 5, 0.8));
        assert!(!grid.update(0, 5, 0.8));
        assert_eq!(grid.relayouts(), 1);
        assert!(grid.update(0, 6, 0.7));
        assert_eq!(grid.relayouts(), 2);
        assert_eq!(grid.symbol(0), Some(6));
        assert_eq!(grid.symbol(1), None);
    }

    #[test]
    fn unchanged_frames_skip_uploads() {
        let mut grid = GlyphGrid::new(1, 1);
        grid.update(0, 3, 0.5);
        assert!(grid.take_dirty().is_some());
        grid.update(0, 3, 0.5);
        assert!(grid.take_dirty().is_none());
    }

    #[test]
    fn steady_input_relayouts_each_cell_once() {
        let mut backend = MockBackend::new();
        backend.read_fill = Some([0.6, 0.6, 0.6, 1.0]);
        let mut pass = ready_pass(&mut backend, DeviceSize::new(96, 48), &ParamSet::new());
        let cells = pass.grid().unwrap().len() as u64;
        assert_eq!(cells, 8 * 4);

        frame(&mut backend, &mut pass);
        frame(&mut backend, &mut pass);
        assert_eq!(pass.grid().unwrap().relayouts(), cells);
        assert_eq!(pass.grid().unwrap().symbol(0), Some(symbol_index(0.6, 35)));
    }

    #[test]
    fn char_width_change_needs_setup_and_rebuilds_grid() {
        let mut backend = MockBackend::new();
        let mut pass = ready_pass(&mut backend, DeviceSize::new(96, 48), &ParamSet::new());
        assert_eq!(
            pass.set_param("char_width", ParamValue::Number(24.0)),
            ParamChange::NeedsSetup
        );
        let params = ParamSet::new().with("char_width", 24.0);
        let mut pass2 = ready_pass(&mut backend, DeviceSize::new(96, 48), &params);
        assert_eq!(pass2.grid().unwrap().cols(), 4);
        pass.cleanup(&mut backend);
        pass2.cleanup(&mut backend);
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_surfaces(), 0);
    }

    #[test]
    fn failed_setup_releases_partial_resources() {
        let mut backend = MockBackend::new();
        backend.fail_programs.push("ascii glyphs".into());
        let mut pass = AsciiLuminancePass::new();
        let base = BaseUniforms::default();
        let params = ParamSet::new();
        let result = pass.setup(
            &mut backend,
            &PassSetupContext {
                pass_index: 0,
                size: DeviceSize::new(64, 64),
                base: &base,
                params: &params,
            },
        );
        assert!(result.is_err());
        assert!(!pass.is_ready());
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_surfaces(), 0);
    }
}
