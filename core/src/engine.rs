//! The analytics engine façade.
//!
//! FLOW (every operation, fixed):
//!   1. Validate request parameters (before any I/O).
//!   2. Build the PortfolioSnapshot once from the store.
//!   3. Run exactly one Analysis against it.
//!   4. Persist the immutable run record.
//!   5. Log the headline numbers and return the record.
//!
//! RULES:
//!   - No analysis reads the store; only step 2 does.
//!   - All randomness flows through the RngBank seeded on the request.
//!   - Run records are inserted, never updated.

use crate::{
    aggregator,
    analysis::Analysis,
    attribution::{ImpactAttribution, ImpactAttributor},
    benchmark::{BenchmarkComparison, BenchmarkKey, PeerBenchmark, PeerComparison, SegmentBenchmark},
    cancel::CancellationToken,
    config::AnalyticsConfig,
    correlation::{CorrelationAnalysis, CorrelationAnalyzer},
    error::{AnalyticsError, AnalyticsResult},
    optimization::{OptimizationTargets, PortfolioOptimization, PortfolioOptimizer},
    simulation::{MonteCarloEngine, MonteCarloSimulation, SimulationRequest},
    snapshot::{Metric, PortfolioSnapshot},
    store::AnalyticsStore,
    types::InvestmentId,
};
use chrono::{NaiveDate, Utc};

pub struct AnalyticsEngine {
    store:  AnalyticsStore,
    config: AnalyticsConfig,
    /// Fixed as-of date; None means "today" (UTC) at each call.
    as_of:  Option<NaiveDate>,
}

impl AnalyticsEngine {
    pub fn new(store: AnalyticsStore, config: AnalyticsConfig) -> Self {
        Self {
            store,
            config,
            as_of: None,
        }
    }

    /// In-memory, migrated store with built-in defaults.
    pub fn build_test() -> AnalyticsResult<Self> {
        let store = AnalyticsStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, AnalyticsConfig::default_test()))
    }

    /// Pin the snapshot date so holding periods and assessment cut-offs
    /// are reproducible.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn store(&self) -> &AnalyticsStore {
        &self.store
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn snapshot(&self) -> AnalyticsResult<PortfolioSnapshot> {
        aggregator::build_snapshot(&self.store, self.as_of())
    }

    fn execute<A: Analysis>(&self, analysis: &A) -> AnalyticsResult<A::Output> {
        analysis.validate()?;
        let snapshot = self.snapshot()?;
        let started = std::time::Instant::now();
        let out = analysis.run(&snapshot)?;
        log::debug!(
            "{}: {} investments analysed in {:?}",
            analysis.name(),
            snapshot.len(),
            started.elapsed()
        );
        Ok(out)
    }

    // ── Benchmark ──────────────────────────────────────────────

    pub fn compare_to_peers(&self, investment_id: InvestmentId) -> AnalyticsResult<BenchmarkComparison> {
        let comparison = self.execute(&PeerComparison {
            config: &self.config.benchmark,
            investment_id,
        })?;
        self.store.insert_benchmark_comparison(&comparison)?;
        log::info!(
            "benchmark: investment={investment_id} level={:?} peers={} esg_rank={:?} weaknesses={}",
            comparison.benchmark.grouping_level,
            comparison.benchmark.group_size,
            comparison.rank(Metric::Esg),
            comparison.weaknesses.len(),
        );
        for d in &comparison.degradations {
            log::warn!("benchmark: investment={investment_id} degraded: {d:?}");
        }
        Ok(comparison)
    }

    pub fn calculate_benchmark(&self, key: BenchmarkKey) -> AnalyticsResult<PeerBenchmark> {
        let benchmark = self.execute(&SegmentBenchmark {
            config: &self.config.benchmark,
            key,
        })?;
        self.store.insert_peer_benchmark(&benchmark)?;
        log::info!(
            "benchmark: sector={} industry={:?} region={:?} group_size={}",
            benchmark.sector,
            benchmark.industry,
            benchmark.region,
            benchmark.group_size,
        );
        Ok(benchmark)
    }

    pub fn benchmarks(
        &self,
        sector:   Option<&str>,
        industry: Option<&str>,
        region:   Option<&str>,
    ) -> AnalyticsResult<Vec<PeerBenchmark>> {
        self.store.peer_benchmarks(sector, industry, region)
    }

    // ── Attribution ────────────────────────────────────────────

    /// Attribute across the whole portfolio; with `investment_id`, return
    /// only that investment's record (weights still use every holding).
    pub fn attribute_impact(
        &self,
        investment_id: Option<InvestmentId>,
    ) -> AnalyticsResult<Vec<ImpactAttribution>> {
        let run = self.execute(&ImpactAttributor {
            config: &self.config.attribution,
        })?;
        if let Some(id) = investment_id {
            if run.for_investment(id).is_none() {
                return Err(AnalyticsError::InvestmentNotFound { id });
            }
        }
        self.store.insert_attribution_run(&run)?;
        log::info!(
            "attribution: run={} investments={} beneficiaries={:.0} jobs={:.0}",
            run.run_id,
            run.attributions.len(),
            run.total_beneficiaries,
            run.total_jobs,
        );
        for d in &run.degradations {
            log::warn!("attribution: degraded: {d:?}");
        }
        Ok(match investment_id {
            Some(id) => run.attributions.into_iter().filter(|a| a.investment_id == id).collect(),
            None => run.attributions,
        })
    }

    pub fn attributions(
        &self,
        investment_id: Option<InvestmentId>,
    ) -> AnalyticsResult<Vec<ImpactAttribution>> {
        self.store.impact_attributions(investment_id)
    }

    // ── Optimization ───────────────────────────────────────────

    pub fn optimize(
        &self,
        targets:    OptimizationTargets,
        created_by: Option<String>,
    ) -> AnalyticsResult<PortfolioOptimization> {
        let opt = self.execute(&PortfolioOptimizer {
            config: &self.config.optimization,
            targets,
            created_by,
        })?;
        self.store.insert_optimization(&opt)?;
        log::info!(
            "optimization: status={:?} iterations={} moved={:.4} residual={:.6}",
            opt.status,
            opt.iterations,
            opt.total_weight_change,
            opt.residual,
        );
        for d in &opt.degradations {
            log::warn!("optimization: degraded: {d:?}");
        }
        Ok(opt)
    }

    pub fn optimizations(&self, limit: usize) -> AnalyticsResult<Vec<PortfolioOptimization>> {
        self.store.optimizations(limit)
    }

    // ── Correlation ────────────────────────────────────────────

    pub fn calculate_correlations(&self) -> AnalyticsResult<CorrelationAnalysis> {
        let analysis = self.execute(&CorrelationAnalyzer {
            config: &self.config.correlation,
        })?;
        self.store.insert_correlation(&analysis)?;
        log::info!(
            "correlation: n={} pairs={} omitted={} esg_roi={:?}",
            analysis.sample_size,
            analysis.pairs.len(),
            analysis.omitted_pairs.len(),
            analysis.esg_roi_correlation,
        );
        Ok(analysis)
    }

    pub fn latest_correlation(&self) -> AnalyticsResult<Option<CorrelationAnalysis>> {
        self.store.latest_correlation()
    }

    // ── Simulation ─────────────────────────────────────────────

    pub fn run_monte_carlo(
        &self,
        request: SimulationRequest,
        cancel:  &CancellationToken,
    ) -> AnalyticsResult<MonteCarloSimulation> {
        let sim = self.execute(&MonteCarloEngine {
            config: &self.config.simulation,
            request,
            cancel: cancel.clone(),
        })?;
        self.store.insert_simulation(&sim)?;
        log::info!(
            "monte_carlo: id={} seed={} trials={}/{} expected_roi={:.2} var95={:.2} p_positive={:.1}",
            sim.simulation_id,
            sim.seed,
            sim.completed_iterations,
            sim.parameters.num_iterations,
            sim.roi.expected,
            sim.value_at_risk_95,
            sim.probability_positive_roi,
        );
        Ok(sim)
    }

    pub fn simulations(&self, limit: usize) -> AnalyticsResult<Vec<MonteCarloSimulation>> {
        self.store.simulations(limit)
    }

    pub fn simulation(&self, simulation_id: &str) -> AnalyticsResult<MonteCarloSimulation> {
        self.store.simulation(simulation_id)
    }
}
