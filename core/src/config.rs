//! Engine thresholds and model parameters.
//!
//! Every field has a built-in default, so a partial (or missing) JSON file
//! still yields a complete configuration.

use crate::simulation::{ClimateScenario, ScenarioType};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "analytics_config.json";

// ── Benchmark ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Smallest peer group accepted before widening the grouping key.
    pub min_peer_sample:     usize,
    /// Deviation from the peer mean, as % of |mean|, that counts as a
    /// strength or weakness.
    pub strength_margin_pct: f64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            min_peer_sample:     3,
            strength_margin_pct: 10.0,
        }
    }
}

// ── Attribution ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub secondary_sdg_count:    usize,
    /// Records below this confidence are logged as low quality.
    pub low_confidence_warning: f64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            secondary_sdg_count:    3,
            low_confidence_warning: 40.0,
        }
    }
}

// ── Optimization ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Largest relative cut to any holding's weight (0.5 = -50%).
    pub max_weight_decrease: f64,
    /// Largest relative increase to any holding's weight (0.5 = +50%).
    pub max_weight_increase: f64,
    /// Absolute weight moved per transfer before any halving.
    pub initial_step:        f64,
    pub min_step:            f64,
    pub max_iterations:      usize,
    /// Residual (normalized shortfall) treated as "targets met".
    pub tolerance:           f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_weight_decrease: 0.5,
            max_weight_increase: 0.5,
            initial_step:        0.05,
            min_step:            0.000_5,
            max_iterations:      2_000,
            tolerance:           1e-6,
        }
    }
}

// ── Correlation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub strong_threshold:   f64,
    pub moderate_threshold: f64,
    pub significance_level: f64,
    pub min_pair_sample:    usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            strong_threshold:   0.5,
            moderate_threshold: 0.2,
            significance_level: 0.05,
            min_pair_sample:    3,
        }
    }
}

// ── Simulation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub return_multiplier:     f64,
    pub volatility_multiplier: f64,
    pub esg_drift_per_year:    f64,
    pub impact_drift_per_year: f64,
}

impl ScenarioParams {
    /// Scenario-adjusted annual return (%). The multiplier scales the
    /// base's distance from zero, so a multiplier above 1 raises the
    /// return and one below 1 lowers it whatever the base's sign.
    pub fn adjusted_return(&self, base: f64) -> f64 {
        base + (self.return_multiplier - 1.0) * base.abs()
    }
}

/// One scenario entry as read from JSON. Absent fields keep that
/// scenario's built-in value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScenarioPatch {
    return_multiplier:     Option<f64>,
    volatility_multiplier: Option<f64>,
    esg_drift_per_year:    Option<f64>,
    impact_drift_per_year: Option<f64>,
}

impl ScenarioPatch {
    fn over(self, base: ScenarioParams) -> ScenarioParams {
        ScenarioParams {
            return_multiplier:     self.return_multiplier.unwrap_or(base.return_multiplier),
            volatility_multiplier: self.volatility_multiplier.unwrap_or(base.volatility_multiplier),
            esg_drift_per_year:    self.esg_drift_per_year.unwrap_or(base.esg_drift_per_year),
            impact_drift_per_year: self.impact_drift_per_year.unwrap_or(base.impact_drift_per_year),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScenarioTablePatch {
    baseline:    ScenarioPatch,
    optimistic:  ScenarioPatch,
    pessimistic: ScenarioPatch,
    stress_test: ScenarioPatch,
}

impl From<ScenarioTablePatch> for ScenarioTable {
    fn from(patch: ScenarioTablePatch) -> Self {
        let base = ScenarioTable::default();
        Self {
            baseline:    patch.baseline.over(base.baseline),
            optimistic:  patch.optimistic.over(base.optimistic),
            pessimistic: patch.pessimistic.over(base.pessimistic),
            stress_test: patch.stress_test.over(base.stress_test),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ScenarioTablePatch")]
pub struct ScenarioTable {
    pub baseline:    ScenarioParams,
    pub optimistic:  ScenarioParams,
    pub pessimistic: ScenarioParams,
    pub stress_test: ScenarioParams,
}

impl Default for ScenarioTable {
    fn default() -> Self {
        Self {
            baseline: ScenarioParams {
                return_multiplier:     1.0,
                volatility_multiplier: 1.0,
                esg_drift_per_year:    0.5,
                impact_drift_per_year: 0.05,
            },
            optimistic: ScenarioParams {
                return_multiplier:     1.25,
                volatility_multiplier: 0.85,
                esg_drift_per_year:    1.0,
                impact_drift_per_year: 0.1,
            },
            pessimistic: ScenarioParams {
                return_multiplier:     0.6,
                volatility_multiplier: 1.25,
                esg_drift_per_year:    0.0,
                impact_drift_per_year: 0.0,
            },
            stress_test: ScenarioParams {
                return_multiplier:     0.2,
                volatility_multiplier: 1.75,
                esg_drift_per_year:    -1.0,
                impact_drift_per_year: -0.1,
            },
        }
    }
}

impl ScenarioTable {
    pub fn get(&self, scenario: ScenarioType) -> &ScenarioParams {
        match scenario {
            ScenarioType::Baseline => &self.baseline,
            ScenarioType::Optimistic => &self.optimistic,
            ScenarioType::Pessimistic => &self.pessimistic,
            ScenarioType::StressTest => &self.stress_test,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateParams {
    /// Annual return drag in percentage points for a portfolio at
    /// climate risk 10; scaled linearly by risk / 10.
    pub return_drag:           f64,
    pub esg_drift_per_year:    f64,
    pub impact_drift_per_year: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClimatePatch {
    return_drag:           Option<f64>,
    esg_drift_per_year:    Option<f64>,
    impact_drift_per_year: Option<f64>,
}

impl ClimatePatch {
    fn over(self, base: ClimateParams) -> ClimateParams {
        ClimateParams {
            return_drag:           self.return_drag.unwrap_or(base.return_drag),
            esg_drift_per_year:    self.esg_drift_per_year.unwrap_or(base.esg_drift_per_year),
            impact_drift_per_year: self.impact_drift_per_year.unwrap_or(base.impact_drift_per_year),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClimateTablePatch {
    #[serde(rename = "1.5c")]
    well_below_2c: ClimatePatch,
    #[serde(rename = "2c")]
    two_degrees:   ClimatePatch,
    #[serde(rename = "3c")]
    three_degrees: ClimatePatch,
}

impl From<ClimateTablePatch> for ClimateTable {
    fn from(patch: ClimateTablePatch) -> Self {
        let base = ClimateTable::default();
        Self {
            well_below_2c: patch.well_below_2c.over(base.well_below_2c),
            two_degrees:   patch.two_degrees.over(base.two_degrees),
            three_degrees: patch.three_degrees.over(base.three_degrees),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ClimateTablePatch")]
pub struct ClimateTable {
    #[serde(rename = "1.5c")]
    pub well_below_2c: ClimateParams,
    #[serde(rename = "2c")]
    pub two_degrees:   ClimateParams,
    #[serde(rename = "3c")]
    pub three_degrees: ClimateParams,
}

impl Default for ClimateTable {
    fn default() -> Self {
        Self {
            well_below_2c: ClimateParams {
                return_drag:           0.5,
                esg_drift_per_year:    0.5,
                impact_drift_per_year: 0.05,
            },
            two_degrees: ClimateParams {
                return_drag:           1.5,
                esg_drift_per_year:    0.0,
                impact_drift_per_year: 0.0,
            },
            three_degrees: ClimateParams {
                return_drag:           3.5,
                esg_drift_per_year:    -0.75,
                impact_drift_per_year: -0.05,
            },
        }
    }
}

impl ClimateTable {
    pub fn get(&self, scenario: ClimateScenario) -> &ClimateParams {
        match scenario {
            ClimateScenario::WellBelow2C => &self.well_below_2c,
            ClimateScenario::TwoDegrees => &self.two_degrees,
            ClimateScenario::ThreeDegrees => &self.three_degrees,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Annual return (%) assumed when no holding carries an ROI.
    pub default_annual_return: f64,
    /// Climate risk assumed when no holding carries one.
    pub default_climate_risk:  f64,
    pub default_target_impact: Option<f64>,
    pub default_loss_threshold_pct: Option<f64>,
    pub esg_volatility:        f64,
    pub impact_volatility:     f64,
    pub max_iterations:        usize,
    pub max_horizon_years:     u32,
    pub chunk_size:            usize,
    pub sample_outcomes:       usize,
    pub scenarios:             ScenarioTable,
    pub climate:               ClimateTable,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_annual_return: 8.0,
            default_climate_risk:  5.0,
            default_target_impact: Some(7.0),
            default_loss_threshold_pct: Some(-10.0),
            esg_volatility:        2.0,
            impact_volatility:     0.3,
            max_iterations:        100_000,
            max_horizon_years:     50,
            chunk_size:            1_024,
            sample_outcomes:       100,
            scenarios:             ScenarioTable::default(),
            climate:               ClimateTable::default(),
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub benchmark:    BenchmarkConfig,
    pub attribution:  AttributionConfig,
    pub optimization: OptimizationConfig,
    pub correlation:  CorrelationConfig,
    pub simulation:   SimulationConfig,
}

impl AnalyticsConfig {
    /// Load from the data/ directory.
    /// In tests, use AnalyticsConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/{CONFIG_FILE}");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalyticsConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults, no file access.
    pub fn default_test() -> Self {
        Self::default()
    }

    fn validate(&self) -> anyhow::Result<()> {
        let opt = &self.optimization;
        if !(0.0..=1.0).contains(&opt.max_weight_decrease) {
            anyhow::bail!("optimization.max_weight_decrease must be in [0, 1]");
        }
        if !(opt.max_weight_increase >= 0.0) {
            anyhow::bail!("optimization.max_weight_increase must be >= 0");
        }
        if !(opt.min_step > 0.0 && opt.initial_step >= opt.min_step) {
            anyhow::bail!("optimization steps must satisfy 0 < min_step <= initial_step");
        }
        let corr = &self.correlation;
        if corr.moderate_threshold > corr.strong_threshold {
            anyhow::bail!("correlation.moderate_threshold exceeds strong_threshold");
        }
        if self.simulation.chunk_size == 0 {
            anyhow::bail!("simulation.chunk_size must be > 0");
        }
        if self.benchmark.min_peer_sample == 0 {
            anyhow::bail!("benchmark.min_peer_sample must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AnalyticsConfig =
            serde_json::from_str(r#"{ "benchmark": { "min_peer_sample": 5 } }"#).unwrap();
        assert_eq!(config.benchmark.min_peer_sample, 5);
        assert_eq!(config.benchmark.strength_margin_pct, 10.0);
        assert_eq!(config.simulation.max_horizon_years, 50);
    }

    #[test]
    fn climate_table_uses_scenario_labels() {
        let config: AnalyticsConfig = serde_json::from_str(
            r#"{ "simulation": { "climate": { "3c": { "return_drag": 9.0 } } } }"#,
        )
        .unwrap();
        assert_eq!(config.simulation.climate.three_degrees.return_drag, 9.0);
        assert_eq!(config.simulation.climate.two_degrees.return_drag, 1.5);
    }

    #[test]
    fn partial_scenario_entry_keeps_its_own_defaults() {
        let config: AnalyticsConfig = serde_json::from_str(
            r#"{ "simulation": {
                   "climate":   { "3c": { "return_drag": 9.0 } },
                   "scenarios": { "stress_test": { "volatility_multiplier": 3.0 } } } }"#,
        )
        .unwrap();
        let hot = &config.simulation.climate.three_degrees;
        assert_eq!(hot.esg_drift_per_year, -0.75);
        assert_eq!(hot.impact_drift_per_year, -0.05);
        let stress = &config.simulation.scenarios.stress_test;
        assert_eq!(stress.volatility_multiplier, 3.0);
        assert_eq!(stress.return_multiplier, 0.2);
        assert_eq!(stress.esg_drift_per_year, -1.0);
    }

    #[test]
    fn scenario_adjustment_keeps_order_for_losses() {
        let table = ScenarioTable::default();
        for base in [-20.0, 0.0, 8.0] {
            let r = |s: ScenarioType| table.get(s).adjusted_return(base);
            assert!(r(ScenarioType::Optimistic) >= r(ScenarioType::Baseline), "base {base}");
            assert!(r(ScenarioType::Baseline) >= r(ScenarioType::Pessimistic), "base {base}");
            assert!(r(ScenarioType::Pessimistic) >= r(ScenarioType::StressTest), "base {base}");
        }
        let pessimistic = table.get(ScenarioType::Pessimistic);
        assert!((pessimistic.adjusted_return(10.0) - 6.0).abs() < 1e-12);
        assert!((pessimistic.adjusted_return(-10.0) + 14.0).abs() < 1e-12);
    }
}
