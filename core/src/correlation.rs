//! Cross-metric correlation analysis.
//!
//! Pearson r over pairwise-complete observations, two-tailed t-test
//! p-values, and rule-based insight text.

use crate::{
    analysis::Analysis,
    config::CorrelationConfig,
    error::{AnalyticsResult, Degradation},
    snapshot::{Metric, PortfolioSnapshot},
    stats,
    types::RunId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every unordered pair among the four analysed metrics, with its key.
pub const METRIC_PAIRS: [(Metric, Metric, &str); 6] = [
    (Metric::Esg, Metric::Roi, "esg_roi"),
    (Metric::ClimateRisk, Metric::Roi, "climate_risk_roi"),
    (Metric::ImpactScore, Metric::Roi, "impact_roi"),
    (Metric::Esg, Metric::ClimateRisk, "esg_climate_risk"),
    (Metric::Esg, Metric::ImpactScore, "esg_impact"),
    (Metric::ClimateRisk, Metric::ImpactScore, "climate_risk_impact"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub key:         String,
    pub left:        Metric,
    pub right:       Metric,
    pub coefficient: f64,
    pub p_value:     f64,
    pub sample_size: usize,
    pub strength:    Strength,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    pub analysis_id:                  RunId,
    pub analysis_date:                NaiveDate,
    /// Investments in the snapshot.
    pub sample_size:                  usize,
    pub pairs:                        Vec<PairCorrelation>,
    pub correlation_matrix:           BTreeMap<String, f64>,
    pub p_values:                     BTreeMap<String, f64>,
    pub pair_sample_sizes:            BTreeMap<String, usize>,
    pub esg_roi_correlation:          Option<f64>,
    pub climate_risk_roi_correlation: Option<f64>,
    pub impact_roi_correlation:       Option<f64>,
    pub esg_climate_risk_correlation: Option<f64>,
    pub omitted_pairs:                Vec<String>,
    pub key_insights:                 Vec<String>,
    pub recommendations:              Vec<String>,
    pub degradations:                 Vec<Degradation>,
    pub created_at:                   DateTime<Utc>,
}

impl CorrelationAnalysis {
    /// r for (a, b) in either order; 1.0 for a metric with itself.
    pub fn coefficient(&self, a: Metric, b: Metric) -> Option<f64> {
        if a == b {
            return Some(1.0);
        }
        self.pairs
            .iter()
            .find(|p| (p.left == a && p.right == b) || (p.left == b && p.right == a))
            .map(|p| p.coefficient)
    }

    pub fn pair(&self, key: &str) -> Option<&PairCorrelation> {
        self.pairs.iter().find(|p| p.key == key)
    }
}

fn recommendation(key: &str, r: f64) -> Option<&'static str> {
    let positive = r > 0.0;
    match (key, positive) {
        ("esg_roi", true) => Some(
            "ESG leaders are delivering stronger returns; consider raising allocation to high-ESG holdings",
        ),
        ("esg_roi", false) => Some(
            "Higher ESG scores coincide with weaker returns; review entry valuations of ESG leaders",
        ),
        ("climate_risk_roi", false) => Some(
            "Climate-exposed holdings are underperforming; prioritise transition risk mitigation",
        ),
        ("climate_risk_roi", true) => Some(
            "Returns currently compensate for climate risk; monitor for repricing as policy tightens",
        ),
        ("impact_roi", true) => Some(
            "Impact and returns move together; impact-first allocation need not sacrifice performance",
        ),
        ("impact_roi", false) => Some(
            "Impact appears to trade off against returns; set explicit impact-return targets per holding",
        ),
        ("esg_climate_risk", false) => Some(
            "Strong ESG practice tracks lower climate risk; use ESG screening as a climate risk proxy",
        ),
        ("esg_impact", true) => Some(
            "ESG quality and impact reinforce each other; engagement on either is likely to lift both",
        ),
        _ => None,
    }
}

const NO_RELATIONSHIP_RECOMMENDATION: &str =
    "No material relationships detected; collect more complete metrics before drawing conclusions";

pub struct CorrelationAnalyzer<'a> {
    pub config: &'a CorrelationConfig,
}

impl<'a> CorrelationAnalyzer<'a> {
    fn strength(&self, r: f64) -> Strength {
        let a = r.abs();
        if a >= self.config.strong_threshold {
            Strength::Strong
        } else if a >= self.config.moderate_threshold {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }

    fn insight(&self, p: &PairCorrelation) -> String {
        let relation = match p.strength {
            Strength::Strong | Strength::Moderate => format!(
                "{} {} relationship",
                if p.strength == Strength::Strong { "Strong" } else { "Moderate" },
                if p.coefficient > 0.0 { "positive" } else { "negative" },
            ),
            Strength::Weak => "Weak or no relationship".to_string(),
        };
        let mut text = format!(
            "{relation} between {} and {} (r = {:.2}, p = {:.3}, n = {})",
            p.left.label(),
            p.right.label(),
            p.coefficient,
            p.p_value,
            p.sample_size,
        );
        if !p.significant {
            text.push_str("; not statistically significant");
        }
        text
    }
}

impl<'a> Analysis for CorrelationAnalyzer<'a> {
    type Output = CorrelationAnalysis;

    fn name(&self) -> &'static str {
        "correlation"
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<CorrelationAnalysis> {
        let cfg = self.config;
        let min = cfg.min_pair_sample.max(3);
        let mut pairs = Vec::new();
        let mut omitted_pairs = Vec::new();
        let mut degradations = Vec::new();

        for (left, right, key) in METRIC_PAIRS {
            let (xs, ys): (Vec<f64>, Vec<f64>) = snapshot
                .rows()
                .iter()
                .filter_map(|r| Some((left.value(r)?, right.value(r)?)))
                .unzip();
            let n = xs.len();
            if n < min {
                omitted_pairs.push(key.to_string());
                degradations.push(Degradation::insufficient(key, n, min));
                continue;
            }
            let Some(r) = stats::pearson(&xs, &ys) else {
                omitted_pairs.push(key.to_string());
                degradations.push(Degradation::missing(format!("{key}: zero variance")));
                continue;
            };
            let p_value = stats::correlation_p_value(r, n).unwrap_or(1.0);
            pairs.push(PairCorrelation {
                key: key.to_string(),
                left,
                right,
                coefficient: r,
                p_value,
                sample_size: n,
                strength: self.strength(r),
                significant: p_value < cfg.significance_level,
            });
        }

        let key_insights: Vec<String> = pairs.iter().map(|p| self.insight(p)).collect();
        let mut recommendations: Vec<String> = pairs
            .iter()
            .filter(|p| p.strength != Strength::Weak)
            .filter_map(|p| recommendation(&p.key, p.coefficient))
            .map(str::to_string)
            .collect();
        if recommendations.is_empty() {
            recommendations.push(NO_RELATIONSHIP_RECOMMENDATION.to_string());
        }

        let lookup = |key: &str| pairs.iter().find(|p| p.key == key).map(|p| p.coefficient);
        let esg_roi_correlation = lookup("esg_roi");
        let climate_risk_roi_correlation = lookup("climate_risk_roi");
        let impact_roi_correlation = lookup("impact_roi");
        let esg_climate_risk_correlation = lookup("esg_climate_risk");

        Ok(CorrelationAnalysis {
            analysis_id: uuid::Uuid::new_v4().to_string(),
            analysis_date: snapshot.as_of,
            sample_size: snapshot.len(),
            correlation_matrix: pairs.iter().map(|p| (p.key.clone(), p.coefficient)).collect(),
            p_values: pairs.iter().map(|p| (p.key.clone(), p.p_value)).collect(),
            pair_sample_sizes: pairs.iter().map(|p| (p.key.clone(), p.sample_size)).collect(),
            esg_roi_correlation,
            climate_risk_roi_correlation,
            impact_roi_correlation,
            esg_climate_risk_correlation,
            pairs,
            omitted_pairs,
            key_insights,
            recommendations,
            degradations,
            created_at: Utc::now(),
        })
    }
}
