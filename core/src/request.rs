//! Versioned JSON request/response contract.
//!
//! Every operation in engine.rs has exactly one request variant and one
//! response variant. Responses are wrapped in a ResponseEnvelope carrying
//! SCHEMA_VERSION and either `data` or `error`, never both.
//! Variants are appended, never removed or reordered.

use crate::{
    attribution::ImpactAttribution,
    benchmark::{BenchmarkComparison, BenchmarkKey, PeerBenchmark},
    cancel::CancellationToken,
    correlation::CorrelationAnalysis,
    engine::AnalyticsEngine,
    error::{AnalyticsError, AnalyticsResult},
    optimization::{OptimizationTargets, PortfolioOptimization},
    simulation::{MonteCarloSimulation, SimulationRequest},
    types::{InvestmentId, SCHEMA_VERSION},
};
use serde::{Deserialize, Serialize};

fn default_limit() -> usize {
    10
}

/// All analytics requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AnalyticsRequest {
    // ── Benchmark ─────────────────────────────────
    CompareToPeers {
        investment_id: InvestmentId,
    },
    CalculateBenchmark {
        sector:   String,
        #[serde(default)]
        industry: Option<String>,
        #[serde(default)]
        region:   Option<String>,
    },
    Benchmarks {
        #[serde(default)]
        sector:   Option<String>,
        #[serde(default)]
        industry: Option<String>,
        #[serde(default)]
        region:   Option<String>,
    },

    // ── Attribution ───────────────────────────────
    AttributeImpact {
        #[serde(default)]
        investment_id: Option<InvestmentId>,
    },
    Attributions {
        #[serde(default)]
        investment_id: Option<InvestmentId>,
    },

    // ── Optimization ──────────────────────────────
    Optimize {
        #[serde(default)]
        targets:    OptimizationTargets,
        #[serde(default)]
        created_by: Option<String>,
    },
    Optimizations {
        #[serde(default = "default_limit")]
        limit: usize,
    },

    // ── Correlation ───────────────────────────────
    CalculateCorrelations,
    LatestCorrelation,

    // ── Simulation ────────────────────────────────
    RunMonteCarlo {
        #[serde(default)]
        params: SimulationRequest,
    },
    Simulations {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Simulation {
        simulation_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum AnalyticsResponse {
    Comparison(Box<BenchmarkComparison>),
    Benchmark(Box<PeerBenchmark>),
    Benchmarks(Vec<PeerBenchmark>),
    Attributions(Vec<ImpactAttribution>),
    Optimization(Box<PortfolioOptimization>),
    Optimizations(Vec<PortfolioOptimization>),
    Correlation(Box<CorrelationAnalysis>),
    LatestCorrelation(Option<Box<CorrelationAnalysis>>),
    Simulation(Box<MonteCarloSimulation>),
    Simulations(Vec<MonteCarloSimulation>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code:    String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data:           Option<AnalyticsResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:          Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn from_result(result: AnalyticsResult<AnalyticsResponse>) -> Self {
        match result {
            Ok(data) => Self {
                schema_version: SCHEMA_VERSION,
                data:           Some(data),
                error:          None,
            },
            Err(e) => Self {
                schema_version: SCHEMA_VERSION,
                data:           None,
                error:          Some(ErrorBody {
                    code:    e.code().to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl AnalyticsEngine {
    /// Execute one request. Errors are folded into the envelope.
    pub fn handle_request(
        &self,
        request: AnalyticsRequest,
        cancel:  &CancellationToken,
    ) -> ResponseEnvelope {
        ResponseEnvelope::from_result(self.dispatch(request, cancel))
    }

    fn dispatch(
        &self,
        request: AnalyticsRequest,
        cancel:  &CancellationToken,
    ) -> AnalyticsResult<AnalyticsResponse> {
        use AnalyticsRequest as Rq;
        use AnalyticsResponse as Rs;
        Ok(match request {
            Rq::CompareToPeers { investment_id } => {
                Rs::Comparison(Box::new(self.compare_to_peers(investment_id)?))
            }
            Rq::CalculateBenchmark { sector, industry, region } => {
                Rs::Benchmark(Box::new(self.calculate_benchmark(BenchmarkKey {
                    sector: Some(sector),
                    industry,
                    region,
                })?))
            }
            Rq::Benchmarks { sector, industry, region } => Rs::Benchmarks(self.benchmarks(
                sector.as_deref(),
                industry.as_deref(),
                region.as_deref(),
            )?),
            Rq::AttributeImpact { investment_id } => {
                Rs::Attributions(self.attribute_impact(investment_id)?)
            }
            Rq::Attributions { investment_id } => Rs::Attributions(self.attributions(investment_id)?),
            Rq::Optimize { targets, created_by } => {
                Rs::Optimization(Box::new(self.optimize(targets, created_by)?))
            }
            Rq::Optimizations { limit } => Rs::Optimizations(self.optimizations(limit)?),
            Rq::CalculateCorrelations => Rs::Correlation(Box::new(self.calculate_correlations()?)),
            Rq::LatestCorrelation => Rs::LatestCorrelation(self.latest_correlation()?.map(Box::new)),
            Rq::RunMonteCarlo { params } => {
                Rs::Simulation(Box::new(self.run_monte_carlo(params, cancel)?))
            }
            Rq::Simulations { limit } => Rs::Simulations(self.simulations(limit)?),
            Rq::Simulation { simulation_id } => {
                if simulation_id.trim().is_empty() {
                    return Err(AnalyticsError::invalid("simulation_id", "must not be empty"));
                }
                Rs::Simulation(Box::new(self.simulation(&simulation_id)?))
            }
        })
    }
}
