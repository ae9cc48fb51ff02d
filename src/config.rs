//! Engine configuration
//!
//! Reference maxima used to normalize outcome dimensions and the rounding
//! precision of the composite indices. Defaults reproduce the study's scoring.

use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};

/// Lives saved that normalize to 1.0
pub const DEFAULT_LIVES_SAVED_MAX: f64 = 20_000.0;

/// Casualties that normalize to 0.0 (the dimension is reversed)
pub const DEFAULT_CASUALTIES_MAX: f64 = 1_000.0;

/// Percentage delta that normalizes to 1.0
pub const DEFAULT_PERCENTAGE_MAX: f64 = 100.0;

/// Decimal places kept for the performance composite and balance index
pub const DEFAULT_ROUNDING_DECIMALS: u32 = 2;

/// Reference maxima for outcome normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceMaxima {
    pub lives_saved: f64,
    pub human_casualties: f64,
    pub percentage: f64,
}

impl Default for ReferenceMaxima {
    fn default() -> Self {
        Self {
            lives_saved: DEFAULT_LIVES_SAVED_MAX,
            human_casualties: DEFAULT_CASUALTIES_MAX,
            percentage: DEFAULT_PERCENTAGE_MAX,
        }
    }
}

/// Configuration for a [`MetricsProcessor`](crate::pipeline::MetricsProcessor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reference_maxima: ReferenceMaxima,
    pub rounding_decimals: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reference_maxima: ReferenceMaxima::default(),
            rounding_decimals: DEFAULT_ROUNDING_DECIMALS,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| AnalyticsError::ConfigError(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        serde_json::to_string_pretty(self).map_err(AnalyticsError::JsonError)
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let maxima = [
            ("lives_saved", self.reference_maxima.lives_saved),
            ("human_casualties", self.reference_maxima.human_casualties),
            ("percentage", self.reference_maxima.percentage),
        ];
        for (name, value) in maxima {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalyticsError::ConfigError(format!(
                    "reference maximum '{name}' must be a positive number, got {value}"
                )));
            }
        }
        if self.rounding_decimals > 10 {
            return Err(AnalyticsError::ConfigError(format!(
                "rounding_decimals must be at most 10, got {}",
                self.rounding_decimals
            )));
        }
        Ok(())
    }
}
