use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessSetting {
    #[default]
    None,
    Box,
    Gaussian,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationSetting {
    #[default]
    Linear,
    Bezier,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeSetting {
    #[default]
    Diamond,
    Disc,
}

/// A parameter override as written in `[params]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamSetting {
    Bool(bool),
    Number(f32),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrailConfig {
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(default)]
    pub preprocess: PreprocessSetting,
    #[serde(default = "default_decay")]
    pub decay: f32,
    #[serde(default = "default_step_px")]
    pub step_px: f32,
    #[serde(default)]
    pub interpolation: InterpolationSetting,
    #[serde(default)]
    pub center_zoom: bool,
    #[serde(default)]
    pub paint_while_still: bool,
    #[serde(default)]
    pub pixel_ratio_cap: Option<f32>,
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub frame_interval: Duration,
    #[serde(default = "default_background", deserialize_with = "deserialize_rgb")]
    pub background: [f32; 3],
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub ascii: AsciiConfig,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSetting>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub shape: ShapeSetting,
    #[serde(default = "default_content_size")]
    pub size: f32,
    #[serde(default = "default_content_color", deserialize_with = "deserialize_rgba")]
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AsciiConfig {
    /// TrueType/OpenType font for the glyph atlas.
    #[serde(default)]
    pub font: Option<PathBuf>,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            effect: default_effect(),
            preprocess: PreprocessSetting::default(),
            decay: default_decay(),
            step_px: default_step_px(),
            interpolation: InterpolationSetting::default(),
            center_zoom: false,
            paint_while_still: false,
            pixel_ratio_cap: None,
            frame_interval: default_frame_interval(),
            background: default_background(),
            content: ContentConfig::default(),
            ascii: AsciiConfig::default(),
            params: BTreeMap::new(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            shape: ShapeSetting::default(),
            size: default_content_size(),
            color: default_content_color(),
        }
    }
}

fn default_effect() -> String {
    "motion_blur".into()
}

fn default_decay() -> f32 {
    0.975
}

fn default_step_px() -> f32 {
    4.0
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(16)
}

fn default_background() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_content_size() -> f32 {
    96.0
}

fn default_content_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_rgb<'de, D>(deserializer: D) -> Result<[f32; 3], D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match parse_hex_color(&raw).map_err(de::Error::custom)? {
        [r, g, b, a] if a == 1.0 => Ok([r, g, b]),
        _ => Err(de::Error::custom(format!(
            "background '{raw}' must be opaque (#rrggbb)"
        ))),
    }
}

fn deserialize_rgba<'de, D>(deserializer: D) -> Result<[f32; 4], D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_hex_color(&raw).map_err(de::Error::custom)
}

/// Parses `#rrggbb` or `#rrggbbaa` into straight RGBA in `[0, 1]`.
pub fn parse_hex_color(raw: &str) -> Result<[f32; 4], String> {
    let hex = raw.trim().strip_prefix('#').unwrap_or(raw.trim());
    if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!(
            "invalid colour '{raw}'; expected '#rrggbb' or '#rrggbbaa'"
        ));
    }
    let channel = |index: usize| -> Result<f32, String> {
        u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
            .map(|value| f32::from(value) / 255.0)
            .map_err(|err| format!("invalid colour '{raw}': {err}"))
    };
    let alpha = if hex.len() == 8 { channel(3)? } else { 1.0 };
    Ok([channel(0)?, channel(1)?, channel(2)?, alpha])
}

impl TrailConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: TrailConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.effect.trim().is_empty() {
            return Err(ConfigError::Invalid("effect may not be empty".into()));
        }

        if !(0.0..1.0).contains(&self.decay) {
            return Err(ConfigError::Invalid(format!(
                "decay must be in [0, 1), got {}",
                self.decay
            )));
        }

        if self.step_px.is_nan() || self.step_px < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "step_px must be >= 1, got {}",
                self.step_px
            )));
        }

        if let Some(cap) = self.pixel_ratio_cap {
            if cap.is_nan() || cap <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "pixel_ratio_cap must be > 0, got {cap}"
                )));
            }
        }

        if self.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "frame_interval must be greater than zero".into(),
            ));
        }

        if self.content.size.is_nan() || self.content.size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "content.size must be > 0, got {}",
                self.content.size
            )));
        }

        for id in self.params.keys() {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid("parameter id may not be empty".into()));
            }
        }

        Ok(())
    }
}
