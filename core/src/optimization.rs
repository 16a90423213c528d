//! Portfolio rebalancing toward impact / ESG / climate / return targets.
//!
//! Search: bounded greedy pairwise weight transfers. Each iteration moves
//! at most `step` of weight from one holding to another, choosing the move
//! that removes the most normalized shortfall per unit of L1 change. A move
//! that would carry a target past its bound is cut back to the amount that
//! just reaches it. The step halves when nothing improves and the search
//! ends at `min_step`, when the targets are met, or after `max_iterations`.
//!
//! Every holding stays within [w0 * (1 - max_decrease), w0 * (1 + max_increase)]
//! and weights always sum to 1, so optimized metrics are weighted averages
//! of existing holdings. Holdings without a value do not participate.

use crate::{
    analysis::Analysis,
    config::OptimizationConfig,
    error::{AnalyticsError, AnalyticsResult, Degradation},
    snapshot::{MetricSnapshot, PortfolioSnapshot},
    types::{InvestmentId, RunId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OPTIMIZATION_METHOD: &str = "bounded_greedy_l1_transfer";

const EPS: f64 = 1e-12;
const BISECTION_ROUNDS: usize = 48;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationTargets {
    pub target_impact_score: Option<f64>,
    pub target_esg_score:    Option<f64>,
    pub max_climate_risk:    Option<f64>,
    pub min_roi_threshold:   Option<f64>,
}

impl OptimizationTargets {
    pub fn validate(&self) -> AnalyticsResult<()> {
        fn check(field: &str, v: Option<f64>, lo: f64, hi: f64) -> AnalyticsResult<()> {
            match v {
                Some(x) if !x.is_finite() || x < lo || x > hi => Err(AnalyticsError::invalid(
                    field,
                    format!("{x} is outside [{lo}, {hi}]"),
                )),
                _ => Ok(()),
            }
        }
        check("target_impact_score", self.target_impact_score, 0.0, 10.0)?;
        check("target_esg_score", self.target_esg_score, 0.0, 100.0)?;
        check("max_climate_risk", self.max_climate_risk, 0.0, 10.0)?;
        check("min_roi_threshold", self.min_roi_threshold, -100.0, f64::MAX)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.constraints().is_empty()
    }

    fn constraints(&self) -> Vec<Constraint> {
        let mut out = Vec::new();
        if let Some(b) = self.target_impact_score {
            out.push(Constraint { axis: Axis::Impact, bound: b });
        }
        if let Some(b) = self.target_esg_score {
            out.push(Constraint { axis: Axis::Esg, bound: b });
        }
        if let Some(b) = self.max_climate_risk {
            out.push(Constraint { axis: Axis::ClimateRisk, bound: b });
        }
        if let Some(b) = self.min_roi_threshold {
            out.push(Constraint { axis: Axis::Roi, bound: b });
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    AlreadyFeasible,
    Feasible,
    Partial,
}

/// Value-weighted portfolio averages; each axis over the holdings that
/// carry it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub impact_score: Option<f64>,
    pub esg_score:    Option<f64>,
    pub climate_risk: Option<f64>,
    pub roi:          Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConstraints {
    pub max_weight_decrease: f64,
    pub max_weight_increase: f64,
    pub max_iterations:      usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedChange {
    pub investment_id:    InvestmentId,
    pub investment_name:  String,
    pub current_weight:   f64,
    pub suggested_weight: f64,
    pub relative_change:  f64,
    /// Favorable normalized deviation from the portfolio average on the
    /// targeted axes.
    pub merit:            f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioOptimization {
    pub optimization_id:       RunId,
    pub optimization_date:     NaiveDate,
    pub targets:               OptimizationTargets,
    pub constraints:           OptimizationConstraints,
    pub optimization_method:   String,
    pub status:                OptimizationStatus,
    pub current:               PortfolioMetrics,
    pub optimized:             PortfolioMetrics,
    /// Investment id → (w' − w) / w, changed holdings only.
    pub suggested_rebalancing: BTreeMap<InvestmentId, f64>,
    pub suggested_additions:   Vec<SuggestedChange>,
    pub suggested_reductions:  Vec<SuggestedChange>,
    pub total_weight_change:   f64,
    pub iterations:            usize,
    pub residual:              f64,
    pub analysis_notes:        String,
    pub created_by:            Option<String>,
    pub degradations:          Vec<Degradation>,
    pub created_at:            DateTime<Utc>,
}

// ── Internals ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Impact,
    Esg,
    ClimateRisk,
    Roi,
}

impl Axis {
    fn value(&self, row: &MetricSnapshot) -> Option<f64> {
        match self {
            Self::Impact => row.impact_score,
            Self::Esg => row.esg_score,
            Self::ClimateRisk => row.climate_risk(),
            Self::Roi => row.roi,
        }
    }

    /// Scale that makes shortfalls on different axes comparable.
    fn scale(&self) -> f64 {
        match self {
            Self::Impact | Self::ClimateRisk => 10.0,
            Self::Esg | Self::Roi => 100.0,
        }
    }

    fn is_ceiling(&self) -> bool {
        matches!(self, Self::ClimateRisk)
    }

    fn target_name(&self) -> &'static str {
        match self {
            Self::Impact => "target_impact_score",
            Self::Esg => "target_esg_score",
            Self::ClimateRisk => "max_climate_risk",
            Self::Roi => "min_roi_threshold",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Constraint {
    axis:  Axis,
    bound: f64,
}

impl Constraint {
    fn shortfall(&self, avg: Option<f64>) -> f64 {
        let Some(avg) = avg else {
            return 1.0;
        };
        let gap = if self.axis.is_ceiling() { avg - self.bound } else { self.bound - avg };
        gap.max(0.0) / self.axis.scale()
    }

    fn favorable(&self, value: f64, avg: f64) -> f64 {
        let d = if self.axis.is_ceiling() { avg - value } else { value - avg };
        d / self.axis.scale()
    }
}

/// Running Σ w·x and Σ w over holders of one axis.
#[derive(Debug, Clone, Copy, Default)]
struct AxisSum {
    num: f64,
    den: f64,
}

impl AxisSum {
    fn avg(&self) -> Option<f64> {
        (self.den > EPS).then(|| self.num / self.den)
    }
}

struct Holding<'s> {
    row:    &'s MetricSnapshot,
    w0:     f64,
    lo:     f64,
    hi:     f64,
    /// Per-constraint value, aligned with the constraint list.
    values: Vec<Option<f64>>,
}

fn sums_for(holdings: &[Holding], weights: &[f64], n_axes: usize) -> Vec<AxisSum> {
    let mut sums = vec![AxisSum::default(); n_axes];
    for (h, w) in holdings.iter().zip(weights) {
        for (a, v) in h.values.iter().enumerate() {
            if let Some(x) = v {
                sums[a].num += w * x;
                sums[a].den += w;
            }
        }
    }
    sums
}

fn violation(constraints: &[Constraint], sums: &[AxisSum]) -> f64 {
    constraints.iter().zip(sums).map(|(c, s)| c.shortfall(s.avg())).sum()
}

/// Axis sums after moving `delta` of weight from `donor` to `recipient`.
fn transfer(
    holdings: &[Holding],
    sums: &[AxisSum],
    donor: usize,
    recipient: usize,
    delta: f64,
) -> Vec<AxisSum> {
    sums.iter()
        .enumerate()
        .map(|(a, s)| {
            let mut s = *s;
            if let Some(x) = holdings[recipient].values[a] {
                s.num += delta * x;
                s.den += delta;
            }
            if let Some(x) = holdings[donor].values[a] {
                s.num -= delta * x;
                s.den -= delta;
            }
            s
        })
        .collect()
}

/// True when the move takes some unmet target all the way to met.
fn closes_target(constraints: &[Constraint], before: &[AxisSum], after: &[AxisSum]) -> bool {
    constraints
        .iter()
        .zip(before.iter().zip(after))
        .any(|(c, (b, a))| c.shortfall(b.avg()) > 0.0 && c.shortfall(a.avg()) == 0.0)
}

/// Smallest transfer in (0, `delta`] whose violation is no worse than
/// `reached`, the violation of the full `delta` move.
fn smallest_transfer(
    holdings: &[Holding],
    constraints: &[Constraint],
    sums: &[AxisSum],
    donor: usize,
    recipient: usize,
    delta: f64,
    reached: f64,
) -> f64 {
    let (mut lo, mut hi) = (0.0, delta);
    for _ in 0..BISECTION_ROUNDS {
        let mid = 0.5 * (lo + hi);
        let v = violation(constraints, &transfer(holdings, sums, donor, recipient, mid));
        if v <= reached {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

fn portfolio_metrics(rows: &[&MetricSnapshot], weights: &[f64]) -> PortfolioMetrics {
    let avg = |axis: Axis| {
        let mut s = AxisSum::default();
        for (r, w) in rows.iter().zip(weights) {
            if let Some(x) = axis.value(r) {
                s.num += w * x;
                s.den += w;
            }
        }
        s.avg()
    };
    PortfolioMetrics {
        impact_score: avg(Axis::Impact),
        esg_score:    avg(Axis::Esg),
        climate_risk: avg(Axis::ClimateRisk),
        roi:          avg(Axis::Roi),
    }
}

struct SearchOutcome {
    weights:    Vec<f64>,
    iterations: usize,
    residual:   f64,
}

// ── Optimizer ────────────────────────────────────────────────────────────────

pub struct PortfolioOptimizer<'a> {
    pub config:     &'a OptimizationConfig,
    pub targets:    OptimizationTargets,
    pub created_by: Option<String>,
}

impl<'a> PortfolioOptimizer<'a> {
    fn search(&self, holdings: &[Holding], constraints: &[Constraint]) -> SearchOutcome {
        let cfg = self.config;
        let n = holdings.len();
        let mut weights: Vec<f64> = holdings.iter().map(|h| h.w0).collect();
        let mut sums = sums_for(holdings, &weights, constraints.len());
        let mut current = violation(constraints, &sums);
        let mut step = cfg.initial_step;
        let mut iterations = 0;

        while current > cfg.tolerance && iterations < cfg.max_iterations {
            iterations += 1;
            // (gain, donor, recipient, delta, sums, violation)
            let mut best: Option<(f64, usize, usize, f64, Vec<AxisSum>, f64)> = None;

            for j in 0..n {
                let room_down = weights[j] - holdings[j].lo;
                if room_down <= EPS {
                    continue;
                }
                for i in 0..n {
                    if i == j {
                        continue;
                    }
                    let room_up = holdings[i].hi - weights[i];
                    if room_up <= EPS {
                        continue;
                    }
                    let mut delta = step.min(room_down).min(room_up);
                    let mut trial = transfer(holdings, &sums, j, i, delta);
                    let mut v = violation(constraints, &trial);
                    if v < current && closes_target(constraints, &sums, &trial) {
                        delta = smallest_transfer(holdings, constraints, &sums, j, i, delta, v);
                        trial = transfer(holdings, &sums, j, i, delta);
                        v = violation(constraints, &trial);
                    }
                    let gain = (current - v) / (2.0 * delta);
                    if gain > EPS && best.as_ref().map_or(true, |b| gain > b.0) {
                        best = Some((gain, j, i, delta, trial, v));
                    }
                }
            }

            match best {
                Some((_, donor, recipient, delta, trial, v)) => {
                    weights[donor] -= delta;
                    weights[recipient] += delta;
                    sums = trial;
                    current = v;
                }
                None => {
                    if step / 2.0 < cfg.min_step {
                        break;
                    }
                    step /= 2.0;
                    log::debug!("optimizer: no improving transfer, step halved to {step}");
                }
            }
        }

        SearchOutcome {
            weights,
            iterations,
            residual: current,
        }
    }
}

impl<'a> Analysis for PortfolioOptimizer<'a> {
    type Output = PortfolioOptimization;

    fn name(&self) -> &'static str {
        "portfolio_optimization"
    }

    fn validate(&self) -> AnalyticsResult<()> {
        self.targets.validate()
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<PortfolioOptimization> {
        let cfg = self.config;
        let mut degradations = Vec::new();

        let valued: Vec<&MetricSnapshot> =
            snapshot.rows().iter().filter(|r| r.weight_basis().is_some()).collect();
        let total_value: f64 = valued.iter().filter_map(|r| r.weight_basis()).sum();
        let w0: Vec<f64> = valued
            .iter()
            .map(|r| r.weight_basis().unwrap_or(0.0) / total_value)
            .collect();
        let current = portfolio_metrics(&valued, &w0);

        if valued.len() < snapshot.len() {
            log::debug!(
                "optimizer: {} holdings without value excluded",
                snapshot.len() - valued.len()
            );
        }

        // Targets on axes no holding carries cannot be steered.
        let mut constraints = Vec::new();
        for c in self.targets.constraints() {
            if valued.iter().any(|r| c.axis.value(r).is_some()) {
                constraints.push(c);
            } else {
                degradations.push(Degradation::missing(format!(
                    "{}: no valued holding reports this metric",
                    c.axis.target_name()
                )));
            }
        }

        let holdings: Vec<Holding> = valued
            .iter()
            .zip(&w0)
            .map(|(&row, &w)| Holding {
                row,
                w0: w,
                lo: w * (1.0 - cfg.max_weight_decrease),
                hi: w * (1.0 + cfg.max_weight_increase),
                values: constraints.iter().map(|c| c.axis.value(row)).collect(),
            })
            .collect();

        let initial = violation(&constraints, &sums_for(&holdings, &w0, constraints.len()));
        let outcome = if initial <= cfg.tolerance {
            SearchOutcome {
                weights:    w0.clone(),
                iterations: 0,
                residual:   initial,
            }
        } else {
            self.search(&holdings, &constraints)
        };

        let mut status = if initial <= cfg.tolerance {
            OptimizationStatus::AlreadyFeasible
        } else if outcome.residual <= cfg.tolerance {
            OptimizationStatus::Feasible
        } else {
            let final_sums = sums_for(&holdings, &outcome.weights, constraints.len());
            let unmet: Vec<String> = constraints
                .iter()
                .zip(&final_sums)
                .filter(|(c, s)| c.shortfall(s.avg()) > cfg.tolerance)
                .map(|(c, _)| c.axis.target_name().to_string())
                .collect();
            degradations.push(Degradation::InfeasibleConstraints {
                residual: outcome.residual,
                unmet,
            });
            OptimizationStatus::Partial
        };
        if !degradations.is_empty() {
            status = OptimizationStatus::Partial;
        }

        let optimized = portfolio_metrics(&valued, &outcome.weights);

        let baseline_avgs = current_avgs(&constraints, &current);
        let mut suggested_rebalancing = BTreeMap::new();
        let mut suggested_additions = Vec::new();
        let mut suggested_reductions = Vec::new();
        let mut total_weight_change = 0.0;
        for (h, &w) in holdings.iter().zip(&outcome.weights) {
            let delta = w - h.w0;
            total_weight_change += delta.abs();
            if delta.abs() <= 1e-9 {
                continue;
            }
            let relative_change = delta / h.w0;
            suggested_rebalancing.insert(h.row.investment_id, relative_change);
            let merit: f64 = constraints
                .iter()
                .zip(&h.values)
                .zip(&baseline_avgs)
                .filter_map(|((c, v), avg)| Some(c.favorable((*v)?, (*avg)?)))
                .sum();
            let change = SuggestedChange {
                investment_id: h.row.investment_id,
                investment_name: h.row.name.clone(),
                current_weight: h.w0,
                suggested_weight: w,
                relative_change,
                merit,
            };
            if delta > 0.0 {
                suggested_additions.push(change);
            } else {
                suggested_reductions.push(change);
            }
        }
        suggested_additions
            .sort_by(|a, b| b.merit.total_cmp(&a.merit).then(a.investment_id.cmp(&b.investment_id)));
        suggested_reductions
            .sort_by(|a, b| a.merit.total_cmp(&b.merit).then(a.investment_id.cmp(&b.investment_id)));

        let analysis_notes = match status {
            OptimizationStatus::AlreadyFeasible if self.targets.is_empty() => {
                "No targets given; current allocation returned unchanged.".to_string()
            }
            OptimizationStatus::AlreadyFeasible => {
                "Current allocation already meets every target; no rebalancing needed.".to_string()
            }
            OptimizationStatus::Feasible => format!(
                "Targets met by moving {:.1}% of portfolio weight across {} holdings in {} iterations.",
                total_weight_change / 2.0 * 100.0,
                suggested_rebalancing.len(),
                outcome.iterations,
            ),
            OptimizationStatus::Partial => format!(
                "Targets not fully reachable within ±{:.0}%/{:.0}% weight bounds; best point leaves a normalized shortfall of {:.4}.",
                cfg.max_weight_decrease * 100.0,
                cfg.max_weight_increase * 100.0,
                outcome.residual,
            ),
        };

        Ok(PortfolioOptimization {
            optimization_id: uuid::Uuid::new_v4().to_string(),
            optimization_date: snapshot.as_of,
            targets: self.targets.clone(),
            constraints: OptimizationConstraints {
                max_weight_decrease: cfg.max_weight_decrease,
                max_weight_increase: cfg.max_weight_increase,
                max_iterations:      cfg.max_iterations,
            },
            optimization_method: OPTIMIZATION_METHOD.to_string(),
            status,
            current,
            optimized,
            suggested_rebalancing,
            suggested_additions,
            suggested_reductions,
            total_weight_change,
            iterations: outcome.iterations,
            residual: outcome.residual,
            analysis_notes,
            created_by: self.created_by.clone(),
            degradations,
            created_at: Utc::now(),
        })
    }
}

/// Current portfolio average for each constraint's axis.
fn current_avgs(constraints: &[Constraint], current: &PortfolioMetrics) -> Vec<Option<f64>> {
    constraints
        .iter()
        .map(|c| match c.axis {
            Axis::Impact => current.impact_score,
            Axis::Esg => current.esg_score,
            Axis::ClimateRisk => current.climate_risk,
            Axis::Roi => current.roi,
        })
        .collect()
}
