//! Declarative pass parameters.
//!
//! Passes publish a static list of [`ParamDef`]s; values arrive as a
//! [`ParamSet`] and are validated against those definitions when assigned.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    Bool,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => f.write_str("number"),
            Self::Bool => f.write_str("boolean"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Number(f32),
    Bool(bool),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Number(_) => ParamKind::Number,
            Self::Bool(_) => ParamKind::Bool,
        }
    }

    /// Uniform representation; booleans become 0.0 / 1.0.
    pub fn as_f32(&self) -> f32 {
        match *self {
            Self::Number(value) => value,
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            Self::Number(value) => value != 0.0,
            Self::Bool(value) => value,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Contract between a pass and a value it consumes each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamDef {
    pub id: &'static str,
    pub kind: ParamKind,
    pub label: &'static str,
    pub default: ParamValue,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub step: Option<f32>,
    /// Name of the shader uniform fed by this parameter, if any. Parameters
    /// without one are consumed during setup.
    pub uniform: Option<&'static str>,
}

impl ParamDef {
    pub const fn number(id: &'static str, label: &'static str, default: f32) -> Self {
        Self {
            id,
            kind: ParamKind::Number,
            label,
            default: ParamValue::Number(default),
            min: None,
            max: None,
            step: None,
            uniform: None,
        }
    }

    pub const fn boolean(id: &'static str, label: &'static str, default: bool) -> Self {
        Self {
            id,
            kind: ParamKind::Bool,
            label,
            default: ParamValue::Bool(default),
            min: None,
            max: None,
            step: None,
            uniform: None,
        }
    }

    pub const fn range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub const fn step(mut self, step: f32) -> Self {
        self.step = Some(step);
        self
    }

    pub const fn uniform(mut self, name: &'static str) -> Self {
        self.uniform = Some(name);
        self
    }

    /// Checks `value` against this definition, clamping and snapping numbers.
    pub fn validate(&self, value: ParamValue) -> Result<ParamValue, ParamError> {
        if value.kind() != self.kind {
            return Err(ParamError::KindMismatch {
                id: self.id.to_string(),
                expected: self.kind,
                actual: value.kind(),
            });
        }
        let ParamValue::Number(raw) = value else {
            return Ok(value);
        };
        if !raw.is_finite() {
            return Err(ParamError::NotFinite {
                id: self.id.to_string(),
            });
        }
        let mut number = raw;
        if let (Some(step), Some(min)) = (self.step, self.min) {
            if step > 0.0 {
                number = min + ((number - min) / step).round() * step;
            }
        }
        if let Some(min) = self.min {
            number = number.max(min);
        }
        if let Some(max) = self.max {
            number = number.min(max);
        }
        Ok(ParamValue::Number(number))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter '{id}' expects a {expected}, got a {actual}")]
    KindMismatch {
        id: String,
        expected: ParamKind,
        actual: ParamKind,
    },
    #[error("parameter '{id}' must be finite")]
    NotFinite { id: String },
}

/// Values supplied for an effect, keyed by parameter id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(id, value);
        self
    }

    /// Stores a raw value; validation happens when a pass resolves it.
    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(id.into(), value.into());
    }

    pub fn get(&self, id: &str) -> Option<ParamValue> {
        self.values.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.values.iter().map(|(id, value)| (id.as_str(), *value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolves the value for `def`, falling back to its default when the
    /// supplied value is missing or does not validate.
    pub fn resolve(&self, def: &ParamDef) -> ParamValue {
        match self.get(def.id) {
            None => def.default,
            Some(value) => match def.validate(value) {
                Ok(valid) => valid,
                Err(err) => {
                    tracing::warn!(error = %err, param = def.id, "using parameter default");
                    def.default
                }
            },
        }
    }
}

impl FromIterator<(String, ParamValue)> for ParamSet {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Finds the definition for `id` among `defs`.
pub fn find_def<'a>(defs: &'a [ParamDef], id: &str) -> Option<&'a ParamDef> {
    defs.iter().find(|def| def.id == id)
}
