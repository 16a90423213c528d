//! Impact attribution.
//!
//! Each investment's share of portfolio outcomes follows its attribution
//! weight: value share of the portfolio, with investments lacking a value
//! each taking an equal 1/n slice.

use crate::{
    analysis::Analysis,
    config::AttributionConfig,
    error::{AnalyticsResult, Degradation},
    snapshot::{MetricSnapshot, PortfolioSnapshot},
    types::{InvestmentId, RunId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ATTRIBUTION_METHOD: &str = "proportional_value";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAttribution {
    pub attribution_id:                 RunId,
    pub run_id:                         RunId,
    pub investment_id:                  InvestmentId,
    pub investment_name:                String,
    pub attribution_weight:             f64,
    pub attributed_beneficiaries:       f64,
    pub attributed_jobs:                f64,
    pub attributed_emissions_reduction: f64,
    pub sdg_contributions:              BTreeMap<u8, f64>,
    pub primary_sdg:                    Option<u8>,
    pub secondary_sdgs:                 Vec<u8>,
    /// impact_score × weight; 0 without an impact score.
    pub total_impact_score:             f64,
    pub portfolio_impact_percentage:    f64,
    /// esg_score × weight; sums to the value-weighted portfolio ESG.
    pub portfolio_esg_contribution:     f64,
    /// (10 − climate_risk) × weight.
    pub portfolio_climate_contribution: f64,
    pub attribution_method:             String,
    pub confidence_level:               f64,
    pub attribution_date:               NaiveDate,
    pub created_at:                     DateTime<Utc>,
}

/// One whole-portfolio attribution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRun {
    pub run_id:                    RunId,
    pub attribution_date:          NaiveDate,
    pub attribution_method:        String,
    pub total_beneficiaries:       f64,
    pub total_jobs:                f64,
    pub total_emissions_reduction: f64,
    pub attributions:              Vec<ImpactAttribution>,
    pub degradations:              Vec<Degradation>,
}

impl AttributionRun {
    pub fn for_investment(&self, id: InvestmentId) -> Option<&ImpactAttribution> {
        self.attributions.iter().find(|a| a.investment_id == id)
    }
}

/// Attribution weights in row order. Sum to 1 for a non-empty portfolio.
pub fn attribution_weights(rows: &[MetricSnapshot]) -> Vec<f64> {
    let n = rows.len();
    if n == 0 {
        return Vec::new();
    }
    let total_value: f64 = rows.iter().filter_map(|r| r.weight_basis()).sum();
    let valued = rows.iter().filter(|r| r.weight_basis().is_some()).count();
    let equal = 1.0 / n as f64;
    if valued == 0 || total_value <= 0.0 {
        return vec![equal; n];
    }
    let valued_share = valued as f64 / n as f64;
    rows.iter()
        .map(|r| match r.weight_basis() {
            Some(v) => valued_share * v / total_value,
            None => equal,
        })
        .collect()
}

/// Primary SDG and up to `secondary_count` runners-up, by contribution.
/// Ties go to the lower SDG number.
fn rank_sdgs(contributions: &BTreeMap<u8, f64>, secondary_count: usize) -> (Option<u8>, Vec<u8>) {
    let mut ranked: Vec<(u8, f64)> = contributions
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(k, v)| (*k, *v))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut iter = ranked.into_iter().map(|(k, _)| k);
    let primary = iter.next();
    (primary, iter.take(secondary_count).collect())
}

fn confidence(row: &MetricSnapshot) -> f64 {
    let present = [
        row.investment_value.is_some(),
        row.impact_score.is_some(),
        row.beneficiaries.is_some(),
        row.jobs_created.is_some(),
        !row.sdg_alignment.is_empty(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    present as f64 * 20.0
}

pub struct ImpactAttributor<'a> {
    pub config: &'a AttributionConfig,
}

impl<'a> Analysis for ImpactAttributor<'a> {
    type Output = AttributionRun;

    fn name(&self) -> &'static str {
        "impact_attribution"
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<AttributionRun> {
        let rows = snapshot.rows();
        let run_id = uuid::Uuid::new_v4().to_string();
        let weights = attribution_weights(rows);
        let mut degradations = Vec::new();

        if rows.is_empty() {
            degradations.push(Degradation::missing("portfolio has no active investments"));
        } else if rows.iter().all(|r| r.weight_basis().is_none()) {
            degradations.push(Degradation::missing(
                "no investment carries a value; weights are equal",
            ));
        }

        let total_beneficiaries: f64 = rows.iter().filter_map(|r| r.beneficiaries).sum();
        let total_jobs: f64 = rows.iter().filter_map(|r| r.jobs_created).sum();
        let total_emissions_reduction: f64 =
            rows.iter().filter_map(|r| r.emissions_reduction).sum();

        let weighted_impact: Vec<Option<f64>> = rows
            .iter()
            .zip(&weights)
            .map(|(r, w)| r.impact_score.map(|s| s * w))
            .collect();
        let impact_denominator: f64 = weighted_impact.iter().flatten().sum();
        if !rows.is_empty() && impact_denominator <= 0.0 {
            degradations.push(Degradation::missing(
                "no positive impact scores; impact percentages are zero",
            ));
        }

        let created_at = Utc::now();
        let attributions: Vec<ImpactAttribution> = rows
            .iter()
            .zip(&weights)
            .zip(&weighted_impact)
            .map(|((row, &w), wi)| {
                let sdg_contributions: BTreeMap<u8, f64> =
                    row.sdg_alignment.iter().map(|(sdg, score)| (*sdg, score * w)).collect();
                let (primary_sdg, secondary_sdgs) =
                    rank_sdgs(&sdg_contributions, self.config.secondary_sdg_count);
                let portfolio_impact_percentage = match wi {
                    Some(v) if impact_denominator > 0.0 => v / impact_denominator * 100.0,
                    _ => 0.0,
                };
                let confidence_level = confidence(row);
                if confidence_level < self.config.low_confidence_warning {
                    log::warn!(
                        "attribution: investment {} has low data confidence ({confidence_level:.0}%)",
                        row.investment_id
                    );
                }
                ImpactAttribution {
                    attribution_id: uuid::Uuid::new_v4().to_string(),
                    run_id: run_id.clone(),
                    investment_id: row.investment_id,
                    investment_name: row.name.clone(),
                    attribution_weight: w,
                    attributed_beneficiaries: total_beneficiaries * w,
                    attributed_jobs: total_jobs * w,
                    attributed_emissions_reduction: total_emissions_reduction * w,
                    sdg_contributions,
                    primary_sdg,
                    secondary_sdgs,
                    total_impact_score: wi.unwrap_or(0.0),
                    portfolio_impact_percentage,
                    portfolio_esg_contribution: row.esg_score.map_or(0.0, |s| s * w),
                    portfolio_climate_contribution: row
                        .climate_risk()
                        .map_or(0.0, |risk| (10.0 - risk).max(0.0) * w),
                    attribution_method: ATTRIBUTION_METHOD.to_string(),
                    confidence_level,
                    attribution_date: snapshot.as_of,
                    created_at,
                }
            })
            .collect();

        Ok(AttributionRun {
            run_id,
            attribution_date: snapshot.as_of,
            attribution_method: ATTRIBUTION_METHOD.to_string(),
            total_beneficiaries,
            total_jobs,
            total_emissions_reduction,
            attributions,
            degradations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: InvestmentId, value: Option<f64>) -> MetricSnapshot {
        let mut r = MetricSnapshot::bare(id, format!("inv-{id}"));
        r.investment_value = value;
        r
    }

    #[test]
    fn weights_split_unvalued_share_equally() {
        let rows = vec![row(1, Some(300.0)), row(2, Some(100.0)), row(3, None), row(4, None)];
        let w = attribution_weights(&rows);
        assert!((w[0] - 0.375).abs() < 1e-12);
        assert!((w[1] - 0.125).abs() < 1e-12);
        assert!((w[2] - 0.25).abs() < 1e-12);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weights_equal_without_values() {
        let rows = vec![row(1, None), row(2, Some(0.0))];
        assert_eq!(attribution_weights(&rows), vec![0.5, 0.5]);
    }

    #[test]
    fn sdg_ties_break_to_lowest_goal() {
        let contributions = BTreeMap::from([(7, 2.0), (3, 2.0), (13, 1.0), (1, 0.5), (5, 0.1), (9, 0.0)]);
        let (primary, secondary) = rank_sdgs(&contributions, 3);
        assert_eq!(primary, Some(3));
        assert_eq!(secondary, vec![7, 13, 1]);
    }
}
