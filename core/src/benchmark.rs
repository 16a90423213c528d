//! Peer benchmarking.
//!
//! Investments are grouped by (sector, industry, region). When a group is
//! too small the key is widened to (sector, region), then (sector). An
//! investment with no sector is compared against the whole portfolio.
//!
//! Percentile rank of X for metric M:
//!   (other peers with value <= X.M) / (other peers with a value) * 100

use crate::{
    analysis::Analysis,
    config::BenchmarkConfig,
    error::{AnalyticsError, AnalyticsResult, Degradation},
    snapshot::{Metric, MetricSnapshot, PortfolioSnapshot},
    stats,
    types::{InvestmentId, RunId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Metrics summarised in every benchmark.
pub const BENCHMARK_METRICS: [Metric; 9] = [
    Metric::Esg,
    Metric::PhysicalRisk,
    Metric::TransitionRisk,
    Metric::ClimateOpportunity,
    Metric::Roi,
    Metric::InvestmentSize,
    Metric::ImpactScore,
    Metric::Beneficiaries,
    Metric::EmissionsIntensity,
];

/// Metrics an investment is ranked on.
pub const RANKED_METRICS: [Metric; 5] = [
    Metric::Esg,
    Metric::PhysicalRisk,
    Metric::TransitionRisk,
    Metric::Roi,
    Metric::ImpactScore,
];

/// Metrics that can produce a strength or weakness.
const JUDGED_METRICS: [Metric; 6] = [
    Metric::Esg,
    Metric::PhysicalRisk,
    Metric::TransitionRisk,
    Metric::ClimateOpportunity,
    Metric::Roi,
    Metric::ImpactScore,
];

/// Sector label recorded when the group spans the whole portfolio.
pub const ALL_SECTORS: &str = "All";

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingLevel {
    SectorIndustryRegion,
    SectorIndustry,
    SectorRegion,
    Sector,
    Portfolio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub metric:      Metric,
    pub mean:        f64,
    pub median:      f64,
    pub p25:         f64,
    pub p75:         f64,
    pub sample_size: usize,
}

impl MetricStats {
    fn from_values(metric: Metric, values: &[f64]) -> Option<Self> {
        let sorted = stats::sorted(values);
        Some(Self {
            metric,
            mean: stats::mean(&sorted)?,
            median: stats::percentile_sorted(&sorted, 50.0)?,
            p25: stats::percentile_sorted(&sorted, 25.0)?,
            p75: stats::percentile_sorted(&sorted, 75.0)?,
            sample_size: sorted.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerBenchmark {
    pub benchmark_id:   RunId,
    pub sector:         String,
    pub industry:       Option<String>,
    pub region:         Option<String>,
    pub grouping_level: GroupingLevel,
    pub benchmark_date: NaiveDate,
    pub group_size:     usize,
    /// Only metrics with at least one value appear.
    pub metrics:        Vec<MetricStats>,
    pub degradations:   Vec<Degradation>,
    pub created_at:     DateTime<Utc>,
}

impl PeerBenchmark {
    pub fn stats(&self, metric: Metric) -> Option<&MetricStats> {
        self.metrics.iter().find(|s| s.metric == metric)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileRank {
    pub metric:    Metric,
    pub value:     Option<f64>,
    /// None when the investment or every other peer lacks the metric.
    pub rank:      Option<f64>,
    pub peer_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub comparison_id:    RunId,
    pub investment_id:    InvestmentId,
    pub investment:       MetricSnapshot,
    pub percentile_ranks: Vec<PercentileRank>,
    pub strengths:        Vec<String>,
    pub weaknesses:       Vec<String>,
    pub recommendations:  Vec<String>,
    pub benchmark:        PeerBenchmark,
    pub degradations:     Vec<Degradation>,
    pub created_at:       DateTime<Utc>,
}

impl BenchmarkComparison {
    pub fn rank(&self, metric: Metric) -> Option<f64> {
        self.percentile_ranks
            .iter()
            .find(|r| r.metric == metric)
            .and_then(|r| r.rank)
    }
}

/// Explicit group key for a standalone benchmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkKey {
    pub sector:   Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub region:   Option<String>,
}

impl BenchmarkKey {
    fn level(&self) -> GroupingLevel {
        match (&self.sector, &self.industry, &self.region) {
            (None, _, _) => GroupingLevel::Portfolio,
            (Some(_), Some(_), Some(_)) => GroupingLevel::SectorIndustryRegion,
            (Some(_), Some(_), None) => GroupingLevel::SectorIndustry,
            (Some(_), None, Some(_)) => GroupingLevel::SectorRegion,
            (Some(_), None, None) => GroupingLevel::Sector,
        }
    }

    fn matches(&self, row: &MetricSnapshot) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            match want {
                None => true,
                Some(w) => have.as_deref() == Some(w.as_str()),
            }
        }
        eq(&self.sector, &row.sector) && eq(&self.industry, &row.industry) && eq(&self.region, &row.region)
    }

    /// Grouping keys to try for `row`, tightest first. Levels whose key
    /// component the row lacks are skipped.
    fn fallbacks_for(row: &MetricSnapshot) -> Vec<BenchmarkKey> {
        let Some(sector) = row.sector.clone() else {
            return vec![BenchmarkKey::default()];
        };
        let mut keys = Vec::new();
        if let (Some(industry), Some(region)) = (&row.industry, &row.region) {
            keys.push(BenchmarkKey {
                sector:   Some(sector.clone()),
                industry: Some(industry.clone()),
                region:   Some(region.clone()),
            });
        }
        if let Some(region) = &row.region {
            keys.push(BenchmarkKey {
                sector:   Some(sector.clone()),
                industry: None,
                region:   Some(region.clone()),
            });
        }
        keys.push(BenchmarkKey {
            sector:   Some(sector),
            industry: None,
            region:   None,
        });
        keys
    }
}

// ── Shared computation ───────────────────────────────────────────────────────

fn build_benchmark(
    key: &BenchmarkKey,
    peers: &[&MetricSnapshot],
    as_of: NaiveDate,
    min_sample: usize,
) -> PeerBenchmark {
    let metrics = BENCHMARK_METRICS
        .iter()
        .filter_map(|m| {
            let values: Vec<f64> = peers.iter().filter_map(|r| m.value(r)).collect();
            MetricStats::from_values(*m, &values)
        })
        .collect();

    let mut degradations = Vec::new();
    if peers.len() < min_sample {
        degradations.push(Degradation::insufficient("peer_group", peers.len(), min_sample));
    }

    PeerBenchmark {
        benchmark_id: uuid::Uuid::new_v4().to_string(),
        sector: key.sector.clone().unwrap_or_else(|| ALL_SECTORS.to_string()),
        industry: key.industry.clone(),
        region: key.region.clone(),
        grouping_level: key.level(),
        benchmark_date: as_of,
        group_size: peers.len(),
        metrics,
        degradations,
        created_at: Utc::now(),
    }
}

fn percentile_rank(target: &MetricSnapshot, peers: &[&MetricSnapshot], metric: Metric) -> Option<f64> {
    let x = metric.value(target)?;
    let others: Vec<f64> = peers
        .iter()
        .filter(|r| r.investment_id != target.investment_id)
        .filter_map(|r| metric.value(r))
        .collect();
    if others.is_empty() {
        return None;
    }
    let at_or_below = others.iter().filter(|v| **v <= x).count();
    Some(at_or_below as f64 / others.len() as f64 * 100.0)
}

fn recommendation_for(metric: Metric) -> &'static str {
    match metric {
        Metric::Esg => "Engage management on ESG disclosure and set measurable improvement targets",
        Metric::PhysicalRisk => "Review physical climate adaptation and asset resilience plans",
        Metric::TransitionRisk => "Assess the transition plan against low-carbon pathways",
        Metric::ClimateOpportunity => "Explore revenue opportunities in climate solutions",
        Metric::Roi => "Review financial performance drivers against sector peers",
        Metric::ImpactScore => "Strengthen impact measurement and deepen beneficiary reach",
        _ => "Monitor this metric against peers at the next review",
    }
}

const NO_WEAKNESS_RECOMMENDATION: &str =
    "Maintain current approach; performance is at or above peer levels";

// ── Peer comparison ──────────────────────────────────────────────────────────

/// Compare one investment against its best-fitting peer group.
pub struct PeerComparison<'a> {
    pub config:        &'a BenchmarkConfig,
    pub investment_id: InvestmentId,
}

impl<'a> PeerComparison<'a> {
    fn select_group<'s>(
        &self,
        snapshot: &'s PortfolioSnapshot,
        target: &MetricSnapshot,
    ) -> (BenchmarkKey, Vec<&'s MetricSnapshot>) {
        let min = self.config.min_peer_sample;
        let keys = BenchmarkKey::fallbacks_for(target);
        let mut chosen = None;
        for key in keys {
            let peers: Vec<&MetricSnapshot> =
                snapshot.rows().iter().filter(|r| key.matches(r)).collect();
            let enough = peers.len() >= min;
            chosen = Some((key, peers));
            if enough {
                break;
            }
        }
        // fallbacks_for never returns an empty list
        chosen.unwrap_or_else(|| (BenchmarkKey::default(), snapshot.rows().iter().collect()))
    }
}

impl<'a> Analysis for PeerComparison<'a> {
    type Output = BenchmarkComparison;

    fn name(&self) -> &'static str {
        "peer_comparison"
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<BenchmarkComparison> {
        let target = snapshot
            .get(self.investment_id)
            .ok_or(AnalyticsError::InvestmentNotFound { id: self.investment_id })?;

        let (key, peers) = self.select_group(snapshot, target);
        let benchmark = build_benchmark(&key, &peers, snapshot.as_of, self.config.min_peer_sample);
        let mut degradations = benchmark.degradations.clone();

        let percentile_ranks: Vec<PercentileRank> = RANKED_METRICS
            .iter()
            .map(|m| PercentileRank {
                metric:    *m,
                value:     m.value(target),
                rank:      percentile_rank(target, &peers, *m),
                peer_mean: benchmark.stats(*m).map(|s| s.mean),
            })
            .collect();
        let other_peers = peers.len().saturating_sub(1);
        if other_peers == 0 {
            degradations.push(Degradation::insufficient("percentile_rank", 0, 1));
        }

        let margin = self.config.strength_margin_pct / 100.0;
        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        let mut recommendations = Vec::new();
        for metric in JUDGED_METRICS {
            let (Some(value), Some(peer)) = (metric.value(target), benchmark.stats(metric)) else {
                continue;
            };
            if other_peers == 0 {
                continue;
            }
            let Some(higher_better) = metric.higher_is_better() else {
                continue;
            };
            let diff = value - peer.mean;
            let favorable = if higher_better { diff } else { -diff };
            let threshold = margin * peer.mean.abs();
            let pct = if peer.mean.abs() > f64::EPSILON {
                diff.abs() / peer.mean.abs() * 100.0
            } else {
                0.0
            };
            let direction = if diff > 0.0 { "above" } else { "below" };
            let sentence = format!(
                "{} of {value:.1} is {pct:.0}% {direction} the peer average of {:.1}",
                capitalize(metric.label()),
                peer.mean,
            );
            if favorable > threshold {
                strengths.push(sentence);
            } else if -favorable > threshold {
                weaknesses.push(sentence);
                recommendations.push(recommendation_for(metric).to_string());
            }
        }
        if recommendations.is_empty() {
            recommendations.push(NO_WEAKNESS_RECOMMENDATION.to_string());
        }

        Ok(BenchmarkComparison {
            comparison_id: uuid::Uuid::new_v4().to_string(),
            investment_id: target.investment_id,
            investment: target.clone(),
            percentile_ranks,
            strengths,
            weaknesses,
            recommendations,
            benchmark,
            degradations,
            created_at: Utc::now(),
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ── Standalone segment benchmark ─────────────────────────────────────────────

/// Peer statistics for an explicit (sector, industry?, region?) key.
pub struct SegmentBenchmark<'a> {
    pub config: &'a BenchmarkConfig,
    pub key:    BenchmarkKey,
}

impl<'a> Analysis for SegmentBenchmark<'a> {
    type Output = PeerBenchmark;

    fn name(&self) -> &'static str {
        "segment_benchmark"
    }

    fn validate(&self) -> AnalyticsResult<()> {
        match self.key.sector.as_deref() {
            Some(s) if s.trim().is_empty() => Err(AnalyticsError::invalid("sector", "must not be blank")),
            None if self.key.industry.is_some() || self.key.region.is_some() => Err(
                AnalyticsError::invalid("sector", "required when industry or region is given"),
            ),
            _ => Ok(()),
        }
    }

    fn run(&self, snapshot: &PortfolioSnapshot) -> AnalyticsResult<PeerBenchmark> {
        let peers: Vec<&MetricSnapshot> =
            snapshot.rows().iter().filter(|r| self.key.matches(r)).collect();
        Ok(build_benchmark(&self.key, &peers, snapshot.as_of, self.config.min_peer_sample))
    }
}
