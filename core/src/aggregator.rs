//! Metric aggregation: raw store rows → PortfolioSnapshot.
//!
//! RULE: Engines never read storage. The aggregator is the only path
//! from the investment store to an engine, and it runs once per request.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    snapshot::{MetricSnapshot, PortfolioSnapshot},
    types::InvestmentId,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// One active investment joined with its latest assessment of each kind,
/// exactly as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvestmentMetrics {
    pub investment_id:       InvestmentId,
    pub name:                String,
    pub sector:              Option<String>,
    pub industry:            Option<String>,
    pub region:              Option<String>,
    pub investment_amount:   Option<f64>,
    pub current_value:       Option<f64>,
    pub investment_date:     Option<NaiveDate>,
    pub esg_score:           Option<f64>,
    pub physical_risk:       Option<f64>,
    pub transition_risk:     Option<f64>,
    pub climate_opportunity: Option<f64>,
    pub impact_score:        Option<f64>,
    pub beneficiaries:       Option<f64>,
    pub jobs_created:        Option<f64>,
    pub sdg_alignment:       BTreeMap<u8, f64>,
    pub total_emissions:     Option<f64>,
    pub baseline_emissions:  Option<f64>,
    pub emissions_intensity: Option<f64>,
}

/// The read-only "list investments with metrics" query.
pub trait MetricSource {
    /// Active investments with their latest assessments dated on or
    /// before `as_of`.
    fn load_metric_rows(&self, as_of: NaiveDate) -> AnalyticsResult<Vec<InvestmentMetrics>>;
}

/// Build the snapshot for `as_of`. Any storage failure becomes
/// `DataUnavailable`.
pub fn build_snapshot(
    source: &dyn MetricSource,
    as_of: NaiveDate,
) -> AnalyticsResult<PortfolioSnapshot> {
    let raw = source.load_metric_rows(as_of).map_err(|e| match e {
        AnalyticsError::DataUnavailable { .. } => e,
        other => AnalyticsError::DataUnavailable {
            reason: other.to_string(),
        },
    })?;
    let rows = raw.into_iter().map(|r| derive_row(r, as_of)).collect::<Vec<_>>();
    log::debug!("aggregator: as_of={as_of} rows={}", rows.len());
    Ok(PortfolioSnapshot::new(as_of, rows))
}

fn derive_row(raw: InvestmentMetrics, as_of: NaiveDate) -> MetricSnapshot {
    let roi = match (raw.current_value, raw.investment_amount) {
        (Some(cur), Some(amt)) if amt > 0.0 => Some((cur - amt) / amt * 100.0),
        _ => None,
    };
    let holding_years = raw
        .investment_date
        .map(|d| (as_of - d).num_days() as f64 / 365.25)
        .filter(|y| *y >= 0.0);
    let emissions_reduction = match (raw.baseline_emissions, raw.total_emissions) {
        (Some(base), Some(total)) => Some((base - total).max(0.0)),
        _ => None,
    };

    MetricSnapshot {
        investment_id: raw.investment_id,
        name: raw.name,
        sector: raw.sector.filter(|s| !s.trim().is_empty()),
        industry: raw.industry.filter(|s| !s.trim().is_empty()),
        region: raw.region.filter(|s| !s.trim().is_empty()),
        esg_score: raw.esg_score,
        physical_risk: raw.physical_risk,
        transition_risk: raw.transition_risk,
        climate_opportunity: raw.climate_opportunity,
        roi,
        holding_years,
        impact_score: raw.impact_score,
        beneficiaries: raw.beneficiaries,
        jobs_created: raw.jobs_created,
        emissions_reduction,
        emissions_intensity: raw.emissions_intensity,
        sdg_alignment: raw.sdg_alignment,
        investment_amount: raw.investment_amount,
        investment_value: raw.current_value.or(raw.investment_amount),
    }
}
