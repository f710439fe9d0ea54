use crate::backend::{
    BlendMode, FullscreenDraw, LoadAction, ProgramDesc, ProgramId, RenderBackend, SurfaceFormat,
    TextureSlots, TRANSPARENT,
};
use crate::params::{find_def, ParamDef, ParamValue};
use crate::uniforms::{BaseUniforms, PassUniforms, UniformSlots};
use crate::viewport::DeviceSize;

use super::{ParamChange, Pass, PassError, PassKind, PassRenderContext, PassSetupContext};

/// Static description of a full-screen feedback program.
#[derive(Debug)]
pub struct ShaderPassDef {
    pub name: &'static str,
    pub fragment: &'static str,
    pub params: &'static [ParamDef],
    /// Whether the program reads the zoom center.
    pub uses_center: bool,
}

impl PartialEq for ShaderPassDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ShaderPassDef {}

pub struct ShaderPass {
    def: &'static ShaderPassDef,
    program: Option<ProgramId>,
    uniforms: PassUniforms,
    slots: UniformSlots,
}

impl ShaderPass {
    pub fn new(def: &'static ShaderPassDef) -> Self {
        Self {
            def,
            program: None,
            uniforms: PassUniforms::new(DeviceSize::new(1, 1)),
            slots: UniformSlots::from_defs(def.params),
        }
    }

    pub fn uniforms(&self) -> &PassUniforms {
        &self.uniforms
    }
}

impl Pass for ShaderPass {
    fn name(&self) -> &str {
        self.def.name
    }

    fn kind(&self) -> PassKind {
        PassKind::Shader
    }

    fn params(&self) -> &[ParamDef] {
        self.def.params
    }

    fn setup(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &PassSetupContext<'_>,
    ) -> Result<(), PassError> {
        self.cleanup(backend);

        let program = backend
            .create_program(&ProgramDesc {
                label: self.def.name,
                fragment: self.def.fragment,
                target_format: SurfaceFormat::Rgba16Float,
                blend: BlendMode::Replace,
            })
            .map_err(PassError::backend(self.def.name))?;

        self.uniforms.set_size(ctx.size);
        self.uniforms.apply_base(ctx.base, self.def.uses_center);
        self.slots
            .write_all(self.def.params, ctx.params, &mut self.uniforms);
        self.program = Some(program);
        tracing::debug!(
            pass = self.def.name,
            index = ctx.pass_index,
            width = ctx.size.width,
            height = ctx.size.height,
            "shader pass ready"
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    fn update_base(&mut self, base: &BaseUniforms) {
        self.uniforms.apply_base(base, self.def.uses_center);
    }

    fn set_param(&mut self, id: &str, value: ParamValue) -> ParamChange {
        if find_def(self.def.params, id).is_none() {
            return ParamChange::Unknown;
        }
        match self.slots.slot_for(id) {
            Some(slot) => {
                self.uniforms.set_slot(slot, value.as_f32());
                ParamChange::Applied
            }
            None => ParamChange::NeedsSetup,
        }
    }

    fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        ctx: &PassRenderContext,
    ) -> Result<(), PassError> {
        let Some(program) = self.program else {
            return Ok(());
        };
        self.uniforms.set_time(ctx.time);
        backend
            .draw_fullscreen(&FullscreenDraw {
                program,
                target: ctx.output,
                load: LoadAction::Clear(TRANSPARENT),
                uniforms: self.uniforms.as_bytes(),
                textures: TextureSlots {
                    previous_pass_this_frame: Some(ctx.input),
                    this_pass_previous_frame: Some(ctx.history),
                    aux: Some(ctx.snapshot),
                },
            })
            .map_err(PassError::backend(self.def.name))
    }

    fn cleanup(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(program) = self.program.take() {
            backend.release_program(program);
        }
    }
}
