use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::ValidationError;

/// Sampling parameters forwarded to the inference server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f64,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

fn default_repeat_penalty() -> f64 {
    1.0
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Temperature,
    TopP,
    RepeatPenalty,
}

impl OptionKind {
    pub const ALL: [OptionKind; 3] = [
        OptionKind::Temperature,
        OptionKind::TopP,
        OptionKind::RepeatPenalty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OptionKind::Temperature => "temperature",
            OptionKind::TopP => "top_p",
            OptionKind::RepeatPenalty => "repeat_penalty",
        }
    }

    /// Inclusive bounds accepted for this option.
    pub fn range(self) -> (f64, f64) {
        match self {
            OptionKind::Temperature | OptionKind::TopP => (0.0, 1.0),
            OptionKind::RepeatPenalty => (0.0, 2.0),
        }
    }

    pub fn check(self, value: f64) -> Result<f64, ValidationError> {
        let (min, max) = self.range();
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ValidationError::OutOfRange {
                option: self.name(),
                min,
                max,
                value,
            })
        }
    }

    /// Parses user input for this option without touching any state.
    pub fn parse_value(self, raw: &str) -> Result<f64, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::EmptyValue);
        }
        let value = raw
            .parse::<f64>()
            .map_err(|_| ValidationError::NotNumeric(raw.to_string()))?;
        self.check(value)
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptionKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "temperature" => Ok(OptionKind::Temperature),
            "top_p" => Ok(OptionKind::TopP),
            "repeat_penalty" => Ok(OptionKind::RepeatPenalty),
            other => Err(ValidationError::UnknownOption(other.to_string())),
        }
    }
}

impl ModelOptions {
    pub fn get(&self, kind: OptionKind) -> f64 {
        match kind {
            OptionKind::Temperature => self.temperature,
            OptionKind::TopP => self.top_p,
            OptionKind::RepeatPenalty => self.repeat_penalty,
        }
    }

    /// Stores a value after range validation; rejected values leave `self`
    /// unchanged.
    pub fn set(&mut self, kind: OptionKind, value: f64) -> Result<(), ValidationError> {
        let value = kind.check(value)?;
        match kind {
            OptionKind::Temperature => self.temperature = value,
            OptionKind::TopP => self.top_p = value,
            OptionKind::RepeatPenalty => self.repeat_penalty = value,
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for kind in OptionKind::ALL {
            kind.check(self.get(kind))?;
        }
        Ok(())
    }
}
