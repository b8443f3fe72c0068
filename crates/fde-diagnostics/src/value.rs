//! Typed tap values

use fde_graph::DataKind;
use std::fmt;

/// A value observed on, or injected into, a tap
#[derive(Debug, Clone, PartialEq)]
pub enum TapValue {
    Event,
    Int(i16),
    Lint(i64),
    Real(f32),
    Lreal(f64),
    String(String),
    WString(String),
    Bool(bool),
}

impl TapValue {
    /// Zero value of `kind`.
    #[must_use]
    pub fn zero(kind: DataKind) -> Self {
        match kind {
            DataKind::Event => Self::Event,
            DataKind::Int => Self::Int(0),
            DataKind::Lint => Self::Lint(0),
            DataKind::Real => Self::Real(0.0),
            DataKind::Lreal => Self::Lreal(0.0),
            DataKind::String => Self::String(String::new()),
            DataKind::WString => Self::WString(String::new()),
            DataKind::Bool => Self::Bool(false),
        }
    }

    /// Parse wire text as `kind`. Malformed text yields the zero value.
    #[must_use]
    pub fn parse(kind: DataKind, text: &str) -> Self {
        let t = text.trim();
        match kind {
            DataKind::Event => Self::Event,
            DataKind::Int => Self::Int(t.parse().unwrap_or(0)),
            DataKind::Lint => Self::Lint(t.parse().unwrap_or(0)),
            DataKind::Real => Self::Real(t.parse().unwrap_or(0.0)),
            DataKind::Lreal => Self::Lreal(t.parse().unwrap_or(0.0)),
            DataKind::String => Self::String(text.to_string()),
            DataKind::WString => Self::WString(text.to_string()),
            DataKind::Bool => Self::Bool(matches!(
                t.to_ascii_lowercase().as_str(),
                "true" | "1"
            )),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Event => DataKind::Event,
            Self::Int(_) => DataKind::Int,
            Self::Lint(_) => DataKind::Lint,
            Self::Real(_) => DataKind::Real,
            Self::Lreal(_) => DataKind::Lreal,
            Self::String(_) => DataKind::String,
            Self::WString(_) => DataKind::WString,
            Self::Bool(_) => DataKind::Bool,
        }
    }

    /// Numeric view, used for threshold comparisons.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Event => None,
            Self::Int(v) => Some(f64::from(*v)),
            Self::Lint(v) => Some(*v as f64),
            Self::Real(v) => Some(f64::from(*v)),
            Self::Lreal(v) => Some(*v),
            Self::String(s) | Self::WString(s) => s.trim().parse().ok(),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    /// Value of `kind` from a float, used when a script triggers a numeric value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_f64(kind: DataKind, v: f64) -> Self {
        match kind {
            DataKind::Event => Self::Event,
            DataKind::Int => Self::Int(v.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16),
            DataKind::Lint => Self::Lint(v.round() as i64),
            DataKind::Real => Self::Real(v as f32),
            DataKind::Lreal => Self::Lreal(v),
            DataKind::String => Self::String(v.to_string()),
            DataKind::WString => Self::WString(v.to_string()),
            DataKind::Bool => Self::Bool(v != 0.0),
        }
    }
}

impl fmt::Display for TapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => Ok(()),
            Self::Int(v) => write!(f, "{v}"),
            Self::Lint(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Lreal(v) => write!(f, "{v}"),
            Self::String(s) | Self::WString(s) => f.write_str(s),
            Self::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
        }
    }
}
