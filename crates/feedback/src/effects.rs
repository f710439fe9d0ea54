//! Fixed effect registry.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::params::ParamDef;
use crate::pass::{AsciiLuminancePass, Pass, ShaderPass, ShaderPassDef};
use crate::shaders;

const CUTOFF: ParamDef = ParamDef::number("cutoff", "alpha cutoff", 0.002)
    .range(0.0, 0.05)
    .step(0.001)
    .uniform("uCutoff");

static MOTION_BLUR_PARAMS: [ParamDef; 1] = [CUTOFF];

static RANDOM_PAINT_PARAMS: [ParamDef; 2] = [
    ParamDef::number("color_amount", "colour amount", 0.8)
        .range(0.0, 1.0)
        .step(0.01)
        .uniform("uColorAmount"),
    ParamDef::number("drift", "drift", 1.0)
        .range(0.0, 4.0)
        .step(0.1)
        .uniform("uDrift"),
];

static RIPPLE_FADE_PARAMS: [ParamDef; 3] = [
    ParamDef::number("wavelength", "wavelength", 48.0)
        .range(8.0, 200.0)
        .step(1.0)
        .uniform("uWavelength"),
    ParamDef::number("amplitude", "amplitude", 1.5)
        .range(0.0, 8.0)
        .step(0.1)
        .uniform("uAmplitude"),
    ParamDef::number("zoom", "zoom", 0.006)
        .range(0.0, 0.05)
        .step(0.001)
        .uniform("uZoom"),
];

static BOX_BLUR_PARAMS: [ParamDef; 1] = [ParamDef::number("blur_radius", "blur radius", 2.0)
    .range(0.0, 6.0)
    .step(1.0)
    .uniform("uBlurRadius")];

static GAUSSIAN_BLUR_PARAMS: [ParamDef; 1] = [ParamDef::number("blur_sigma", "blur sigma", 1.5)
    .range(0.1, 3.0)
    .step(0.1)
    .uniform("uBlurSigma")];

pub static MOTION_BLUR: ShaderPassDef = ShaderPassDef {
    name: "motion blur",
    fragment: shaders::MOTION_BLUR,
    params: &MOTION_BLUR_PARAMS,
    uses_center: false,
};

pub static RANDOM_PAINT: ShaderPassDef = ShaderPassDef {
    name: "random paint",
    fragment: shaders::RANDOM_PAINT,
    params: &RANDOM_PAINT_PARAMS,
    uses_center: false,
};

pub static RIPPLE_FADE: ShaderPassDef = ShaderPassDef {
    name: "ripple fade",
    fragment: shaders::RIPPLE_FADE,
    params: &RIPPLE_FADE_PARAMS,
    uses_center: true,
};

pub static BOX_BLUR: ShaderPassDef = ShaderPassDef {
    name: "box blur",
    fragment: shaders::BOX_BLUR,
    params: &BOX_BLUR_PARAMS,
    uses_center: false,
};

pub static GAUSSIAN_BLUR: ShaderPassDef = ShaderPassDef {
    name: "gaussian blur",
    fragment: shaders::GAUSSIAN_BLUR,
    params: &GAUSSIAN_BLUR_PARAMS,
    uses_center: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassSpec {
    Shader(&'static ShaderPassDef),
    AsciiLuminance,
}

#[derive(Debug)]
pub struct Effect {
    pub name: &'static str,
    pub label: &'static str,
    pub passes: &'static [PassSpec],
}

pub static EFFECTS: [Effect; 4] = [
    Effect {
        name: "motion_blur",
        label: "Motion Blur",
        passes: &[PassSpec::Shader(&MOTION_BLUR)],
    },
    Effect {
        name: "random_paint",
        label: "Random Paint",
        passes: &[PassSpec::Shader(&RANDOM_PAINT)],
    },
    Effect {
        name: "ripple_fade",
        label: "Ripple Fade",
        passes: &[PassSpec::Shader(&RIPPLE_FADE)],
    },
    Effect {
        name: "ascii_trail",
        label: "ASCII Trail",
        passes: &[PassSpec::Shader(&MOTION_BLUR), PassSpec::AsciiLuminance],
    },
];

pub fn find_effect(name: &str) -> Option<&'static Effect> {
    EFFECTS.iter().find(|effect| effect.name == name)
}

/// Optional blur applied to the snapshot before the effect's own passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preprocess {
    #[default]
    None,
    Box,
    Gaussian,
}

impl Preprocess {
    pub fn pass(&self) -> Option<PassSpec> {
        match self {
            Self::None => None,
            Self::Box => Some(PassSpec::Shader(&BOX_BLUR)),
            Self::Gaussian => Some(PassSpec::Shader(&GAUSSIAN_BLUR)),
        }
    }
}

impl FromStr for Preprocess {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "box" => Ok(Self::Box),
            "gaussian" | "gauss" => Ok(Self::Gaussian),
            other => Err(format!(
                "invalid preprocess '{other}'; expected none, box, or gaussian"
            )),
        }
    }
}

impl fmt::Display for Preprocess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Box => f.write_str("box"),
            Self::Gaussian => f.write_str("gaussian"),
        }
    }
}

/// Selection handed to the pipeline: an effect plus an optional preprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSelection {
    pub effect: &'static Effect,
    pub preprocess: Preprocess,
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Effect {}

impl EffectSelection {
    pub fn named(name: &str, preprocess: Preprocess) -> Option<Self> {
        find_effect(name).map(|effect| Self { effect, preprocess })
    }

    pub fn specs(&self) -> Vec<PassSpec> {
        self.preprocess
            .pass()
            .into_iter()
            .chain(self.effect.passes.iter().copied())
            .collect()
    }

    /// Fresh, not yet set up pass instances in stage order.
    pub fn instantiate(&self, font: Option<&Arc<Vec<u8>>>) -> Vec<Box<dyn Pass>> {
        self.specs()
            .into_iter()
            .map(|spec| -> Box<dyn Pass> {
                match spec {
                    PassSpec::Shader(def) => Box::new(ShaderPass::new(def)),
                    PassSpec::AsciiLuminance => {
                        Box::new(AsciiLuminancePass::new().with_font(font.cloned()))
                    }
                }
            })
            .collect()
    }

    /// Every parameter the selected passes declare, in stage order.
    pub fn param_defs(&self) -> Vec<ParamDef> {
        self.instantiate(None)
            .iter()
            .flat_map(|pass| pass.params().to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::PassKind;

    #[test]
    fn registry_names_are_unique() {
        for (i, a) in EFFECTS.iter().enumerate() {
            for b in &EFFECTS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
        assert!(find_effect("motion_blur").is_some());
        assert!(find_effect("nope").is_none());
    }

    #[test]
    fn preprocess_is_prepended() {
        let selection = EffectSelection::named("ascii_trail", Preprocess::Gaussian).unwrap();
        let passes = selection.instantiate(None);
        let names: Vec<&str> = passes.iter().map(|pass| pass.name()).collect();
        assert_eq!(names, ["gaussian blur", "motion blur", "ascii luminance"]);
    }

    #[test]
    fn ascii_trail_ends_with_a_scene_pass() {
        let selection = EffectSelection::named("ascii_trail", Preprocess::Box).unwrap();
        let kinds: Vec<PassKind> = selection
            .instantiate(None)
            .iter()
            .map(|pass| pass.kind())
            .collect();
        assert_eq!(kinds, [PassKind::Shader, PassKind::Shader, PassKind::Scene]);
    }

    #[test]
    fn param_defs_cover_every_stage() {
        let selection = EffectSelection::named("ascii_trail", Preprocess::None).unwrap();
        let ids: Vec<&str> = selection.param_defs().iter().map(|def| def.id).collect();
        assert_eq!(ids, ["cutoff", "char_width", "invert"]);
    }

    #[test]
    fn preprocess_parses_from_text() {
        assert_eq!("Box".parse::<Preprocess>(), Ok(Preprocess::Box));
        assert_eq!("none".parse::<Preprocess>(), Ok(Preprocess::None));
        assert!("median".parse::<Preprocess>().is_err());
    }
}
