//! The per-request portfolio view every engine reads.
//!
//! A snapshot is built once per operation by the aggregator and passed
//! by reference to exactly one engine. It is never persisted.

use crate::types::InvestmentId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One active investment with its latest metrics. Every metric is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub investment_id:       InvestmentId,
    pub name:                String,
    pub sector:              Option<String>,
    pub industry:            Option<String>,
    pub region:              Option<String>,
    pub esg_score:           Option<f64>,
    pub physical_risk:       Option<f64>,
    pub transition_risk:     Option<f64>,
    pub climate_opportunity: Option<f64>,
    pub roi:                 Option<f64>,
    pub holding_years:       Option<f64>,
    pub impact_score:        Option<f64>,
    pub beneficiaries:       Option<f64>,
    pub jobs_created:        Option<f64>,
    pub emissions_reduction: Option<f64>,
    pub emissions_intensity: Option<f64>,
    pub sdg_alignment:       BTreeMap<u8, f64>,
    pub investment_amount:   Option<f64>,
    pub investment_value:    Option<f64>,
}

impl MetricSnapshot {
    /// A row with only identity fields set.
    pub fn bare(investment_id: InvestmentId, name: impl Into<String>) -> Self {
        Self {
            investment_id,
            name: name.into(),
            sector: None,
            industry: None,
            region: None,
            esg_score: None,
            physical_risk: None,
            transition_risk: None,
            climate_opportunity: None,
            roi: None,
            holding_years: None,
            impact_score: None,
            beneficiaries: None,
            jobs_created: None,
            emissions_reduction: None,
            emissions_intensity: None,
            sdg_alignment: BTreeMap::new(),
            investment_amount: None,
            investment_value: None,
        }
    }

    /// The worse of physical and transition risk.
    pub fn climate_risk(&self) -> Option<f64> {
        match (self.physical_risk, self.transition_risk) {
            (Some(p), Some(t)) => Some(p.max(t)),
            (p, t) => p.or(t),
        }
    }

    /// ROI expressed per year. Holdings younger than a year use the raw ROI.
    pub fn annualized_roi(&self) -> Option<f64> {
        let roi = self.roi?;
        match self.holding_years {
            Some(years) if years > 1.0 => {
                let growth = (1.0 + roi / 100.0).max(0.0);
                Some((growth.powf(1.0 / years) - 1.0) * 100.0)
            }
            _ => Some(roi),
        }
    }

    /// Positive investment value, if any.
    pub fn weight_basis(&self) -> Option<f64> {
        self.investment_value.filter(|v| *v > 0.0)
    }
}

/// Scalar metrics an engine can read off a row by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Esg,
    PhysicalRisk,
    TransitionRisk,
    ClimateRisk,
    ClimateOpportunity,
    Roi,
    InvestmentSize,
    ImpactScore,
    Beneficiaries,
    EmissionsIntensity,
}

impl Metric {
    pub fn value(&self, row: &MetricSnapshot) -> Option<f64> {
        match self {
            Self::Esg => row.esg_score,
            Self::PhysicalRisk => row.physical_risk,
            Self::TransitionRisk => row.transition_risk,
            Self::ClimateRisk => row.climate_risk(),
            Self::ClimateOpportunity => row.climate_opportunity,
            Self::Roi => row.roi,
            Self::InvestmentSize => row.investment_value,
            Self::ImpactScore => row.impact_score,
            Self::Beneficiaries => row.beneficiaries,
            Self::EmissionsIntensity => row.emissions_intensity,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Esg => "esg",
            Self::PhysicalRisk => "physical_risk",
            Self::TransitionRisk => "transition_risk",
            Self::ClimateRisk => "climate_risk",
            Self::ClimateOpportunity => "climate_opportunity",
            Self::Roi => "roi",
            Self::InvestmentSize => "investment_size",
            Self::ImpactScore => "impact",
            Self::Beneficiaries => "beneficiaries",
            Self::EmissionsIntensity => "emissions_intensity",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Esg => "ESG score",
            Self::PhysicalRisk => "physical climate risk",
            Self::TransitionRisk => "transition risk",
            Self::ClimateRisk => "climate risk",
            Self::ClimateOpportunity => "climate opportunity",
            Self::Roi => "ROI",
            Self::InvestmentSize => "investment size",
            Self::ImpactScore => "impact score",
            Self::Beneficiaries => "beneficiaries reached",
            Self::EmissionsIntensity => "emissions intensity",
        }
    }

    /// Some(true) when a higher value is favorable, Some(false) when lower
    /// is, None when the metric carries no direction.
    pub fn higher_is_better(&self) -> Option<bool> {
        match self {
            Self::Esg | Self::ClimateOpportunity | Self::Roi | Self::ImpactScore
            | Self::Beneficiaries => Some(true),
            Self::PhysicalRisk | Self::TransitionRisk | Self::ClimateRisk
            | Self::EmissionsIntensity => Some(false),
            Self::InvestmentSize => None,
        }
    }
}

/// All active investments as of one date, ordered by investment id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub as_of: NaiveDate,
    rows:      Vec<MetricSnapshot>,
}

impl PortfolioSnapshot {
    pub fn new(as_of: NaiveDate, mut rows: Vec<MetricSnapshot>) -> Self {
        rows.sort_by_key(|r| r.investment_id);
        Self { as_of, rows }
    }

    pub fn rows(&self) -> &[MetricSnapshot] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: InvestmentId) -> Option<&MetricSnapshot> {
        self.rows
            .binary_search_by_key(&id, |r| r.investment_id)
            .ok()
            .map(|i| &self.rows[i])
    }
}
