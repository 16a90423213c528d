//! Monte Carlo projection of portfolio return, value, ESG and impact.
//!
//! MODEL (per trial, horizon T years):
//!   r        ~ Normal(mu, sigma)                annual return, %
//!   growth   = max(0, 1 + r / 100) ^ T
//!   roi      = (growth - 1) * 100
//!   value    = V0 * growth
//!   esg      = clamp(esg0 + drift * T + N(0, esg_vol) * sqrt(T), 0, 100)
//!   impact   = clamp(imp0 + drift * T + N(0, imp_vol) * sqrt(T), 0, 10)
//!
//! mu    = base + (scenario.return_multiplier - 1) * |base| - drag * climate_risk / 10
//! sigma = market_volatility * 100 * scenario.volatility_multiplier
//!
//! Trial i draws from RngBank::for_trial(i) only. Trials run on the rayon
//! pool in fixed-size chunks and are collected in index order, so the
//! same seed gives identical outputs on any thread count.

use crate::{
    analysis::Analysis,
    cancel::CancellationToken,
    config::SimulationConfig,
    error::{AnalyticsError, AnalyticsResult, Degradation},
    rng::RngBank,
    snapshot::{MetricSnapshot, PortfolioSnapshot},
    stats,
    types::RunId,
};
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const PERCENTILES: [u8; 7] = [5, 10, 25, 50, 75, 90, 95];
pub const CONFIDENCE_LEVELS: [u8; 3] = [90, 95, 99];

// ── Scenarios ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    #[default]
    Baseline,
    Optimistic,
    Pessimistic,
    StressTest,
}

impl ScenarioType {
    pub const ALL: [ScenarioType; 4] = [
        Self::Baseline,
        Self::Optimistic,
        Self::Pessimistic,
        Self::StressTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Optimistic => "optimistic",
            Self::Pessimistic => "pessimistic",
            Self::StressTest => "stress_test",
        }
    }
}

impl FromStr for ScenarioType {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AnalyticsError::invalid("scenario_type", format!("unknown scenario '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClimateScenario {
    #[serde(rename = "1.5c")]
    WellBelow2C,
    #[serde(rename = "2c")]
    TwoDegrees,
    #[serde(rename = "3c")]
    ThreeDegrees,
}

impl ClimateScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WellBelow2C => "1.5c",
            Self::TwoDegrees => "2c",
            Self::ThreeDegrees => "3c",
        }
    }
}

impl FromStr for ClimateScenario {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::WellBelow2C, Self::TwoDegrees, Self::ThreeDegrees]
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                AnalyticsError::invalid("climate_scenario", format!("unknown climate scenario '{s}'"))
            })
    }
}

// ── Request / result ─────────────────────────────────────────────────────────

fn default_iterations() -> usize {
    10_000
}

fn default_horizon() -> u32 {
    5
}

fn default_volatility() -> f64 {
    0.15
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    #[serde(default)]
    pub simulation_name:    String,
    #[serde(default = "default_iterations")]
    pub num_iterations:     usize,
    #[serde(default = "default_horizon")]
    pub time_horizon_years: u32,
    #[serde(default)]
    pub scenario_type:      ScenarioType,
    #[serde(default)]
    pub climate_scenario:   Option<ClimateScenario>,
    /// Annual volatility as a fraction (0.15 = 15 percentage points).
    #[serde(default = "default_volatility")]
    pub market_volatility:  f64,
    #[serde(default)]
    pub seed:               Option<u64>,
    #[serde(default)]
    pub target_impact_score: Option<f64>,
    /// ROI (%) below which a trial counts as a breach, e.g. -10.
    #[serde(default)]
    pub loss_threshold_pct: Option<f64>,
    #[serde(default)]
    pub created_by:         Option<String>,
}

impl Default for SimulationRequest {
    fn default() -> Self {
        Self {
            simulation_name:     String::new(),
            num_iterations:      default_iterations(),
            time_horizon_years:  default_horizon(),
            scenario_type:       ScenarioType::Baseline,
            climate_scenario:    None,
            market_volatility:   default_volatility(),
            seed:                None,
            target_impact_score: None,
            loss_threshold_pct:  None,
            created_by:          None,
        }
    }
}

/// Resolved simulation parameters, as recorded on the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub num_iterations:      usize,
    pub time_horizon_years:  u32,
    pub scenario_type:       ScenarioType,
    pub climate_scenario:    Option<ClimateScenario>,
    pub market_volatility:   f64,
    pub target_impact_score: Option<f64>,
    pub loss_threshold_pct:  Option<f64>,
    pub initial_value:       f64,
    pub base_annual_return:  f64,
    pub expected_annual_return: f64,
    pub annual_volatility:   f64,
    pub climate_risk:        f64,
    pub initial_esg:         Option<f64>,
    pub initial_impact:      Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub expected:    f64,
    pub std_dev:     f64,
    /// Percentile → value, at PERCENTILES.
    pub percentiles: BTreeMap<u8, f64>,
}

impl OutcomeStats {
    fn from_samples(samples: &[f64]) -> Option<Self> {
        let sorted = stats::sorted(samples);
        let percentiles = PERCENTILES
            .iter()
            .map(|p| Some((*p, stats::percentile_sorted(&sorted, *p as f64)?)))
            .collect::<Option<BTreeMap<_, _>>>()?;
        Some(Self {
            expected: stats::mean(samples)?,
            std_dev: stats::sample_std_dev(samples)?,
            percentiles,
        })
    }

    pub fn percentile(&self, p: u8) -> Option<f64> {
        self.percentiles.get(&p).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub level: u8,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial:          usize,
    pub annual_return:  f64,
    pub roi:            f64,
    pub terminal_value: f64,
    pub esg:            Option<f64>,
    pub impact:         Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario:               ScenarioType,
    pub expected_annual_return: f64,
    pub annual_volatility:      f64,
    /// ROI over the horizon at the expected annual return.
    pub expected_horizon_roi:   f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSimulation {
    pub simulation_id:              RunId,
    pub simulation_name:            String,
    pub simulation_date:            NaiveDate,
    pub seed:                       u64,
    pub parameters:                 SimulationParameters,
    pub confidence_levels:          Vec<u8>,
    pub completed_iterations:       usize,
    pub partial:                    bool,
    pub roi:                        OutcomeStats,
    pub terminal_value:             OutcomeStats,
    pub esg:                        Option<OutcomeStats>,
    pub impact:                     Option<OutcomeStats>,
    pub roi_confidence_intervals:   Vec<ConfidenceInterval>,
    pub value_at_risk_95:           f64,
    pub value_at_risk_99:           f64,
    pub conditional_var_95:         f64,
    pub probability_positive_roi:   f64,
    pub probability_target_impact:  Option<f64>,
    pub probability_risk_threshold: Option<f64>,
    pub sample_outcomes:            Vec<TrialOutcome>,
    pub scenario_analysis:          Vec<ScenarioSummary>,
    pub notes:                      String,
    pub created_by:                 Option<String>,
    pub degradations:               Vec<Degradation>,
    pub created_at:                 DateTime<Utc>,
}

// ── Model ────────────────────────────────────────────────────────────────────

/// Everything one trial needs; shared read-only across workers.
#[derive(Debug, Clone, Copy)]
struct TrialModel {
    horizon:       f64,
    mu:            f64,
    sigma:         f64,
    initial_value: f64,
    esg0:          Option<f64>,
    esg_drift:     f64,
    esg_vol:       f64,
    impact0:       Option<f64>,
    impact_drift:  f64,
    impact_vol:    f64,
}

impl TrialModel {
    fn trial(&self, bank: &RngBank, index: usize) -> TrialOutcome {
        let mut rng = bank.for_trial(index as u64);
        let z_return = rng.standard_normal();
        let z_esg = rng.standard_normal();
        let z_impact = rng.standard_normal();

        let annual_return = self.mu + self.sigma * z_return;
        let growth = (1.0 + annual_return / 100.0).max(0.0).powf(self.horizon);
        let sqrt_t = self.horizon.sqrt();

        TrialOutcome {
            trial: index,
            annual_return,
            roi: (growth - 1.0) * 100.0,
            terminal_value: self.initial_value * growth,
            esg: self.esg0.map(|e| {
                (e + self.esg_drift * self.horizon + self.esg_vol * z_esg * sqrt_t).clamp(0.0, 100.0)
            }),
            impact: self.impact0.map(|i| {
                (i + self.impact_drift * self.horizon + self.impact_vol * z_impact * sqrt_t)
                    .clamp(0.0, 10.0)
            }),
        }
    }
}

/// Value-weighted average of `f` over rows carrying it; plain mean when
/// no such row has a value.
fn weighted_average<F>(snapshot: &PortfolioSnapshot, f: F) -> Option<f64>
where
    F: Fn(&MetricSnapshot) -> Option<f64>,
{
    let mut num = 0.0;
    let mut den = 0.0;
    let mut plain = Vec::new();
    for row in snapshot.rows() {
        let Some(x) = f(row) else { continue };
        plain.push(x);
        if let Some(w) = row.weight_basis() {
            num += w * x;
            den += w;
        }
    }
    if den > 0.0 {
        Some(num / den)
    } else {
        stats::mean(&plain)
    }
}

/// Seed derived from a run id when the caller supplies none.
pub fn seed_from_run_id(run_id: &uuid::Uuid) -> u64 {
    let bits = run_id.as_u128();
    (bits >> 64) as u64 ^ bits as u64
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct MonteCarloEngine<'a> {
    pub config:  &'a SimulationConfig,
    pub request: SimulationRequest,
    pub cancel:  CancellationToken,
}

impl<'a> MonteCarloEngine<'a> {
    fn scenario_summary(&self, base: f64, drag: f64, horizon: f64) -> Vec<ScenarioSummary> {
        ScenarioType::ALL
            .iter()
            .map(|s| {
                let params = self.config.scenarios.get(*s);
                let mu = params.adjusted_return(base) - drag;
                ScenarioSummary {
                    scenario: *s,
                    expected_annual_return: mu,
                    annual_volatility: self.request.market_volatility
                        * 100.0
                        * params.volatility_multiplier,
                    expected_horizon_roi: ((1.0 + mu / 100.0).max(0.0).powf(horizon) - 1.0) * 100.0,
                }
            })
            .collect()
    }
}

impl<'a> Analysis for MonteCarloEngine<'a> {
    type Output = MonteCarloSimulation;

    fn name(&self) -> &'static str {
        "monte_carlo"
    }

    fn validate(&self) -> AnalyticsResult<()> {
        let req = &self.request;
        let cfg = self.config;
        if req.num_iterations == 0 || req.num_iterations > cfg.max_iterations {
            return Err(AnalyticsError::invalid(
                "num_iterations",
                format!("must be in [1, {}], got {}", cfg.max_iterations, req.num_iterations),
            ));
        }
        if req.time_horizon_years == 0 || req.time_horizon_years > cfg.max_horizon_years {
            return Err(AnalyticsError::invalid(
                "time_horizon_years",
                format!("must be in [1, {}], got {}", cfg.max_horizon_years, req.time_horizon_years),
            ));
        }
        if !req.market_volatility.is_finite() || req.market_volatility < 0.0 {
            return Err(AnalyticsError::invalid(
                "market_volatility",
                format!("must be a finite value >= 0, got {}", req.market_volatility),
            ));
        }
        if let Some(t) = req.target_impact_score {
            if !(0.0..=10.0).contains(&t) {
                return Err(AnalyticsError::invalid("target_impact_score", "must be in [0, 10]"));
            }
        }
        if let Some(l) = req.loss_threshold_pct {
            if !l.is_finite() {
                return Err(AnalyticsError::invalid("loss_threshold_pct", "must be finite"));
            }
        }
        Ok(())
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<MonteCarloSimulation> {
        self.validate()?;
        let cfg = self.config;
        let req = &self.request;
        let run_uuid = uuid::Uuid::new_v4();
        let seed = req.seed.unwrap_or_else(|| seed_from_run_id(&run_uuid));
        let bank = RngBank::new(seed);
        let mut degradations = Vec::new();

        let initial_value: f64 = snapshot.rows().iter().filter_map(|r| r.weight_basis()).sum();
        let base_annual_return = weighted_average(snapshot, |r| r.annualized_roi())
            .unwrap_or(cfg.default_annual_return);
        let climate_risk =
            weighted_average(snapshot, |r| r.climate_risk()).unwrap_or(cfg.default_climate_risk);
        let initial_esg = weighted_average(snapshot, |r| r.esg_score);
        let initial_impact = weighted_average(snapshot, |r| r.impact_score);
        if snapshot.is_empty() {
            degradations.push(Degradation::missing(
                "portfolio has no active investments; default return assumptions used",
            ));
        }
        if initial_esg.is_none() {
            degradations.push(Degradation::missing("no ESG scores; ESG not projected"));
        }
        if initial_impact.is_none() {
            degradations.push(Degradation::missing("no impact scores; impact not projected"));
        }

        let scenario = cfg.scenarios.get(req.scenario_type);
        let climate = req.climate_scenario.map(|c| cfg.climate.get(c));
        let drag = climate.map_or(0.0, |c| c.return_drag * climate_risk / 10.0);
        let horizon = req.time_horizon_years as f64;
        let model = TrialModel {
            horizon,
            mu: scenario.adjusted_return(base_annual_return) - drag,
            sigma: req.market_volatility * 100.0 * scenario.volatility_multiplier,
            initial_value,
            esg0: initial_esg,
            esg_drift: scenario.esg_drift_per_year + climate.map_or(0.0, |c| c.esg_drift_per_year),
            esg_vol: cfg.esg_volatility,
            impact0: initial_impact,
            impact_drift: scenario.impact_drift_per_year
                + climate.map_or(0.0, |c| c.impact_drift_per_year),
            impact_vol: cfg.impact_volatility,
        };

        // ── Trials ─────────────────────────────────────────────
        let n = req.num_iterations;
        let chunk = cfg.chunk_size.max(1);
        let mut outcomes: Vec<TrialOutcome> = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let end = (start + chunk).min(n);
            let batch: Vec<TrialOutcome> =
                (start..end).into_par_iter().map(|i| model.trial(&bank, i)).collect();
            outcomes.extend(batch);
            start = end;
            if start < n && self.cancel.is_cancelled() {
                log::warn!("monte_carlo: cancelled after {start}/{n} trials");
                degradations.push(Degradation::Cancelled {
                    completed: start,
                    requested: n,
                });
                break;
            }
        }
        let completed = outcomes.len();
        let partial = completed < n;

        // ── Aggregation ────────────────────────────────────────
        let rois: Vec<f64> = outcomes.iter().map(|o| o.roi).collect();
        let values: Vec<f64> = outcomes.iter().map(|o| o.terminal_value).collect();
        let esgs: Vec<f64> = outcomes.iter().filter_map(|o| o.esg).collect();
        let impacts: Vec<f64> = outcomes.iter().filter_map(|o| o.impact).collect();

        let sorted_roi = stats::sorted(&rois);
        let no_trials = || AnalyticsError::Other(anyhow::anyhow!("simulation produced no trials"));
        let roi = OutcomeStats::from_samples(&rois).ok_or_else(no_trials)?;
        let terminal_value = OutcomeStats::from_samples(&values).ok_or_else(no_trials)?;
        let esg = OutcomeStats::from_samples(&esgs);
        let impact = OutcomeStats::from_samples(&impacts);

        let pct = |p: f64| stats::percentile_sorted(&sorted_roi, p).unwrap_or(0.0);
        let p5 = pct(5.0);
        let value_at_risk_95 = p5.min(0.0);
        let value_at_risk_99 = pct(1.0).min(0.0);
        let tail: Vec<f64> = sorted_roi.iter().copied().filter(|r| *r <= p5).collect();
        let conditional_var_95 = stats::mean(&tail).unwrap_or(p5);

        let share = |count: usize| count as f64 / completed as f64 * 100.0;
        let probability_positive_roi = share(rois.iter().filter(|r| **r > 0.0).count());
        let target_impact = req.target_impact_score.or(cfg.default_target_impact);
        let probability_target_impact = match (target_impact, impact.is_some()) {
            (Some(t), true) => Some(share(impacts.iter().filter(|i| **i >= t).count())),
            _ => None,
        };
        let loss_threshold = req.loss_threshold_pct.or(cfg.default_loss_threshold_pct);
        let probability_risk_threshold =
            loss_threshold.map(|t| share(rois.iter().filter(|r| **r < t).count()));

        let roi_confidence_intervals = CONFIDENCE_LEVELS
            .iter()
            .map(|level| {
                let tail = (100.0 - *level as f64) / 2.0;
                ConfidenceInterval {
                    level: *level,
                    lower: pct(tail),
                    upper: pct(100.0 - tail),
                }
            })
            .collect();

        let notes = format!(
            "{} scenario{} over {} years, {} of {} trials; expected annual return {:.2}% (base {:.2}%), volatility {:.1}pp.",
            req.scenario_type.as_str(),
            req.climate_scenario
                .map(|c| format!(" under a {} pathway", c.as_str()))
                .unwrap_or_default(),
            req.time_horizon_years,
            completed,
            n,
            model.mu,
            base_annual_return,
            model.sigma,
        );

        let simulation_name = if req.simulation_name.trim().is_empty() {
            format!("{} {}y", req.scenario_type.as_str(), req.time_horizon_years)
        } else {
            req.simulation_name.clone()
        };

        Ok(MonteCarloSimulation {
            simulation_id: run_uuid.to_string(),
            simulation_name,
            simulation_date: snapshot.as_of,
            seed,
            parameters: SimulationParameters {
                num_iterations: n,
                time_horizon_years: req.time_horizon_years,
                scenario_type: req.scenario_type,
                climate_scenario: req.climate_scenario,
                market_volatility: req.market_volatility,
                target_impact_score: target_impact,
                loss_threshold_pct: loss_threshold,
                initial_value,
                base_annual_return,
                expected_annual_return: model.mu,
                annual_volatility: model.sigma,
                climate_risk,
                initial_esg,
                initial_impact,
            },
            confidence_levels: CONFIDENCE_LEVELS.to_vec(),
            completed_iterations: completed,
            partial,
            roi,
            terminal_value,
            esg,
            impact,
            roi_confidence_intervals,
            value_at_risk_95,
            value_at_risk_99,
            conditional_var_95,
            probability_positive_roi,
            probability_target_impact,
            probability_risk_threshold,
            sample_outcomes: outcomes.iter().take(cfg.sample_outcomes).copied().collect(),
            scenario_analysis: self.scenario_summary(base_annual_return, drag, horizon),
            notes,
            created_by: req.created_by.clone(),
            degradations,
            created_at: Utc::now(),
        })
    }
}
