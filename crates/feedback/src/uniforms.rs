use bytemuck::{Pod, Zeroable};

use crate::params::{ParamDef, ParamSet};
use crate::viewport::DeviceSize;

/// Number of scalar parameter slots available to a program.
pub const PARAM_SLOTS: usize = 16;

/// Values every stage receives regardless of effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaseUniforms {
    pub decay: f32,
    pub session_random: [f32; 3],
    pub time: f32,
    pub texel_size: [f32; 2],
    pub center: [f32; 2],
}

impl Default for BaseUniforms {
    fn default() -> Self {
        Self {
            decay: 0.975,
            session_random: [0.0; 3],
            time: 0.0,
            texel_size: [1.0, 1.0],
            center: [0.5, 0.5],
        }
    }
}

/// Uniform block shared by every full-screen program. Mirrors `PassUniforms`
/// in `shaders/prelude.wgsl`.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassUniforms {
    pub texel_size: [f32; 2],
    pub center: [f32; 2],
    pub session_random: [f32; 4],
    pub resolution: [f32; 2],
    pub decay: f32,
    pub time: f32,
    pub params: [[f32; 4]; PARAM_SLOTS / 4],
}

unsafe impl Zeroable for PassUniforms {}
unsafe impl Pod for PassUniforms {}

impl PassUniforms {
    pub fn new(size: DeviceSize) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.set_size(size);
        uniforms.center = [0.5, 0.5];
        uniforms
    }

    pub fn set_size(&mut self, size: DeviceSize) {
        self.resolution = size.as_f32();
        self.texel_size = size.texel_size();
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn set_center(&mut self, center: [f32; 2]) {
        self.center = center;
    }

    /// Copies the per-frame base values. The zoom center is only taken when
    /// `with_center` is set.
    pub fn apply_base(&mut self, base: &BaseUniforms, with_center: bool) {
        self.decay = base.decay;
        self.time = base.time;
        self.session_random = [
            base.session_random[0],
            base.session_random[1],
            base.session_random[2],
            0.0,
        ];
        if with_center {
            self.center = base.center;
        }
    }

    pub fn set_slot(&mut self, slot: usize, value: f32) {
        if slot < PARAM_SLOTS {
            self.params[slot / 4][slot % 4] = value;
        }
    }

    pub fn slot(&self, slot: usize) -> f32 {
        self.params[slot / 4][slot % 4]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Uniform slot assignment for parameters that declare a uniform name, in
/// declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformSlots {
    slots: Vec<(&'static str, usize)>,
}

impl UniformSlots {
    pub fn from_defs(defs: &[ParamDef]) -> Self {
        let slots = defs
            .iter()
            .filter(|def| def.uniform.is_some())
            .take(PARAM_SLOTS)
            .enumerate()
            .map(|(slot, def)| (def.id, slot))
            .collect();
        Self { slots }
    }

    pub fn slot_for(&self, id: &str) -> Option<usize> {
        self.slots
            .iter()
            .find(|(param, _)| *param == id)
            .map(|(_, slot)| *slot)
    }

    /// Writes every resolved value into its slot.
    pub fn write_all(&self, defs: &[ParamDef], params: &ParamSet, uniforms: &mut PassUniforms) {
        for def in defs {
            if let Some(slot) = self.slot_for(def.id) {
                uniforms.set_slot(slot, params.resolve(def).as_f32());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<PassUniforms>(), 112);
        assert_eq!(std::mem::align_of::<PassUniforms>(), 16);
    }

    #[test]
    fn slots_follow_declaration_order() {
        let defs = [
            ParamDef::number("a", "a", 1.0).uniform("uA"),
            ParamDef::number("scene_only", "scene", 3.0),
            ParamDef::boolean("b", "b", true).uniform("uB"),
        ];
        let slots = UniformSlots::from_defs(&defs);
        assert_eq!(slots.slot_for("a"), Some(0));
        assert_eq!(slots.slot_for("b"), Some(1));
        assert_eq!(slots.slot_for("scene_only"), None);

        let mut uniforms = PassUniforms::new(DeviceSize::new(2, 2));
        slots.write_all(&defs, &ParamSet::new().with("a", 5.0), &mut uniforms);
        assert_eq!(uniforms.slot(0), 5.0);
        assert_eq!(uniforms.slot(1), 1.0);
    }

    #[test]
    fn center_is_optional_when_applying_base() {
        let mut uniforms = PassUniforms::new(DeviceSize::new(2, 2));
        let base = BaseUniforms {
            center: [0.1, 0.9],
            time: 2.0,
            ..BaseUniforms::default()
        };
        uniforms.apply_base(&base, false);
        assert_eq!(uniforms.center, [0.5, 0.5]);
        assert_eq!(uniforms.time, 2.0);
        uniforms.apply_base(&base, true);
        assert_eq!(uniforms.center, [0.1, 0.9]);
    }
}
