//! Engine configuration
//!
//! All recognized options live in [`EngineConfig`]. Hosts usually build it
//! from their own settings store; JSON loading is provided for tools and
//! tests.
//!
//! ```rust
//! use tier_ladder_engine::config::{AccumulationRate, EngineConfig};
//!
//! let config = EngineConfig::from_json_str(
//!     r#"{ "base_chance_percent": 2.0, "accumulation_rate": "medium", "batch_size": 50 }"#,
//! )
//! .unwrap();
//! assert_eq!(config.accumulation_rate, AccumulationRate::Medium);
//! assert_eq!(config.cycle_period_ticks, 10); // default
//! ```

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Pity added per failed attempt unit, as a share of the base chance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationRate {
    /// 0%
    Off,
    /// 20%
    #[default]
    Low,
    /// 50%
    Medium,
    /// 100%
    High,
}

impl AccumulationRate {
    pub fn percent(self) -> f64 {
        match self {
            AccumulationRate::Off => 0.0,
            AccumulationRate::Low => 20.0,
            AccumulationRate::Medium => 50.0,
            AccumulationRate::High => 100.0,
        }
    }
}

/// How much the profiler times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingDetail {
    /// Batch-level sections only
    #[default]
    Basic,
    /// Batch-level plus per-item sections
    Detailed,
}

/// Section profiler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub enabled: bool,
    pub detail: ProfilingDetail,
    /// Emit a report through `tracing` every this many ticks (0 = never)
    pub report_every_ticks: u64,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            detail: ProfilingDetail::Basic,
            report_every_ticks: 3600,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base transition chance in percent, (0, 100]
    pub base_chance_percent: f64,

    /// Pity accumulation rate
    pub accumulation_rate: AccumulationRate,

    /// Work units per crossing on the root tier
    pub base_threshold: f64,

    /// Per-tier threshold growth; 0.0 keeps cost flat
    pub cost_scaling_factor: f64,

    /// Items visited per batch (N)
    pub batch_size: usize,

    /// Ticks between batches (K)
    pub cycle_period_ticks: u64,

    /// Require a reserved external resource unit for each transition
    pub resource_gated: bool,

    /// Keep terminal-tier items registered (producers keep feeding the pool)
    pub continue_at_terminal: bool,

    /// Producers spend their own crossings as attempts
    pub producer_self_attempts: bool,

    /// Outstanding orders checked per tick for missed signals
    pub pending_scan_limit: usize,

    /// Seed for the engine RNG
    pub rng_seed: u64,

    /// Events kept before the oldest are discarded (0 = unbounded)
    pub event_log_capacity: usize,

    pub profiling: ProfilingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_chance_percent: 1.0,
            accumulation_rate: AccumulationRate::Low,
            base_threshold: 3.0,
            cost_scaling_factor: 0.5,
            batch_size: 10,
            cycle_period_ticks: 10,
            resource_gated: false,
            continue_at_terminal: false,
            producer_self_attempts: true,
            pending_scan_limit: 10,
            rng_seed: 0,
            event_log_capacity: 100_000,
            profiling: ProfilingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Base chance as a fraction
    pub fn base_chance(&self) -> f64 {
        self.base_chance_percent / 100.0
    }

    /// Validate option ranges
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.base_chance_percent > 0.0 && self.base_chance_percent <= 100.0) {
            return Err(EngineError::InvalidConfig(format!(
                "base_chance_percent must be in (0, 100], got {}",
                self.base_chance_percent
            )));
        }
        if !(self.base_threshold.is_finite() && self.base_threshold > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "base_threshold must be > 0, got {}",
                self.base_threshold
            )));
        }
        if !(self.cost_scaling_factor.is_finite() && self.cost_scaling_factor >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "cost_scaling_factor must be >= 0, got {}",
                self.cost_scaling_factor
            )));
        }
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.cycle_period_ticks == 0 {
            return Err(EngineError::InvalidConfig(
                "cycle_period_ticks must be > 0".to_string(),
            ));
        }
        if self.pending_scan_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "pending_scan_limit must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// Missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(input)
            .map_err(|e| EngineError::InvalidConfig(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_accumulation_percentages() {
        assert_eq!(AccumulationRate::Off.percent(), 0.0);
        assert_eq!(AccumulationRate::Low.percent(), 20.0);
        assert_eq!(AccumulationRate::Medium.percent(), 50.0);
        assert_eq!(AccumulationRate::High.percent(), 100.0);
    }

    #[test]
    fn test_zero_scaling_allowed() {
        let config = EngineConfig {
            cost_scaling_factor: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
