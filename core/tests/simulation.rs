//! Monte Carlo simulation tests.
//!
//! Tests cover: single-trial degenerate output, percentile ordering,
//! scenario and climate effects, parameter validation, cancellation
//! and run lookup.

use chrono::NaiveDate;
use impact_analytics_core::{
    cancel::CancellationToken,
    engine::AnalyticsEngine,
    error::{AnalyticsError, Degradation},
    simulation::{ClimateScenario, OutcomeStats, ScenarioType, SimulationRequest, PERCENTILES},
    store::{ClimateAssessment, EsgAssessment, ImpactAssessment, NewInvestment},
};
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).expect("valid date")
}

fn empty() -> AnalyticsEngine {
    AnalyticsEngine::build_test()
        .expect("build test engine")
        .with_as_of(as_of())
}

/// Three holdings held for four years with ROI, ESG, impact and climate data.
fn build() -> AnalyticsEngine {
    let engine = empty();
    let store = engine.store();
    let assessed = as_of() - chrono::Duration::days(20);
    for (i, (amount, value, esg, impact, risk)) in [
        (1_000_000.0, 1_400_000.0, 72.0, 7.5, 3.0),
        (500_000.0, 560_000.0, 55.0, 5.0, 6.0),
        (250_000.0, 240_000.0, 64.0, 6.5, 4.5),
    ]
    .into_iter()
    .enumerate()
    {
        let id = store
            .insert_investment(&NewInvestment {
                name:              format!("Holding {i}"),
                sector:            Some("Energy".into()),
                investment_amount: Some(amount),
                current_value:     Some(value),
                investment_date:   NaiveDate::from_ymd_opt(2020, 6, 30),
                ..NewInvestment::default()
            })
            .expect("insert investment");
        store
            .insert_esg_score(id, assessed, &EsgAssessment {
                overall: Some(esg),
                ..EsgAssessment::default()
            })
            .expect("insert esg");
        store
            .insert_social_impact(id, assessed, &ImpactAssessment {
                overall_impact_score: Some(impact),
                ..ImpactAssessment::default()
            })
            .expect("insert impact");
        store
            .insert_climate_risk(id, assessed, &ClimateAssessment {
                physical_risk:   Some(risk),
                transition_risk: Some(risk - 1.0),
                ..ClimateAssessment::default()
            })
            .expect("insert climate");
    }
    engine
}

fn request(iterations: usize, seed: u64) -> SimulationRequest {
    SimulationRequest {
        num_iterations: iterations,
        seed: Some(seed),
        ..SimulationRequest::default()
    }
}

fn assert_monotone(label: &str, stats: &OutcomeStats) {
    let values: Vec<f64> = PERCENTILES
        .iter()
        .map(|p| stats.percentile(*p).expect("percentile present"))
        .collect();
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "{label} percentiles not non-decreasing: {values:?}"
    );
}

// ── Output shape ─────────────────────────────────────────────────────────────

/// One trial: every percentile is that trial, spread is zero and the
/// probability of a positive return is all or nothing.
#[test]
fn single_trial_is_degenerate() {
    let engine = build();
    let sim = engine
        .run_monte_carlo(request(1, 7), &CancellationToken::new())
        .expect("simulate");

    assert_eq!(sim.completed_iterations, 1);
    let first = sim.roi.percentile(5).expect("p5");
    assert!(sim.roi.percentiles.values().all(|v| *v == first));
    assert_eq!(sim.roi.expected, first);
    assert_eq!(sim.roi.std_dev, 0.0);
    assert!(sim.probability_positive_roi == 0.0 || sim.probability_positive_roi == 100.0);
}

/// Percentile tables never decrease and the confidence intervals nest.
#[test]
fn percentiles_are_non_decreasing() {
    let engine = build();
    let sim = engine
        .run_monte_carlo(request(5_000, 0xABCD), &CancellationToken::new())
        .expect("simulate");

    assert_monotone("roi", &sim.roi);
    assert_monotone("terminal_value", &sim.terminal_value);
    assert_monotone("esg", sim.esg.as_ref().expect("esg projected"));
    assert_monotone("impact", sim.impact.as_ref().expect("impact projected"));

    for ci in &sim.roi_confidence_intervals {
        assert!(ci.lower <= ci.upper, "{}% interval inverted", ci.level);
    }
    let widths: Vec<f64> = sim.roi_confidence_intervals.iter().map(|c| c.upper - c.lower).collect();
    assert!(widths.windows(2).all(|w| w[0] <= w[1]), "intervals do not nest: {widths:?}");
    assert!(sim.value_at_risk_99 <= sim.value_at_risk_95);
    assert!(sim.value_at_risk_95 <= 0.0);
    assert!(sim.conditional_var_95 <= sim.roi.percentile(5).expect("p5"));
}

/// Probabilities are percentages and projected scores stay on their scales.
#[test]
fn outputs_stay_in_range() {
    let engine = build();
    let sim = engine
        .run_monte_carlo(request(2_000, 11), &CancellationToken::new())
        .expect("simulate");

    assert!((0.0..=100.0).contains(&sim.probability_positive_roi));
    let p_target = sim.probability_target_impact.expect("default impact target applies");
    assert!((0.0..=100.0).contains(&p_target));
    let p_loss = sim.probability_risk_threshold.expect("default loss threshold applies");
    assert!((0.0..=100.0).contains(&p_loss));
    for o in &sim.sample_outcomes {
        assert!((0.0..=100.0).contains(&o.esg.expect("esg")));
        assert!((0.0..=10.0).contains(&o.impact.expect("impact")));
        assert!(o.terminal_value >= 0.0);
    }
    assert_eq!(sim.sample_outcomes.len(), 100);
    assert!((sim.parameters.initial_value - 2_200_000.0).abs() < 1e-6);
}

/// Scenario multipliers order the expected returns.
#[test]
fn scenarios_order_expected_returns() {
    let engine = build();
    let sim = engine
        .run_monte_carlo(request(100, 3), &CancellationToken::new())
        .expect("simulate");

    assert_eq!(sim.scenario_analysis.len(), ScenarioType::ALL.len());
    let expected = |s: ScenarioType| {
        sim.scenario_analysis
            .iter()
            .find(|x| x.scenario == s)
            .map(|x| x.expected_annual_return)
            .expect("scenario present")
    };
    assert!(expected(ScenarioType::Optimistic) > expected(ScenarioType::Baseline));
    assert!(expected(ScenarioType::Baseline) > expected(ScenarioType::Pessimistic));
    assert!(expected(ScenarioType::Pessimistic) > expected(ScenarioType::StressTest));
}

/// A losing portfolio keeps the same scenario order: stress is still the
/// worst case and optimistic still the best.
#[test]
fn scenarios_keep_order_for_losing_portfolio() {
    let engine = empty();
    engine
        .store()
        .insert_investment(&NewInvestment {
            name:              "Drawdown".into(),
            investment_amount: Some(1_000_000.0),
            current_value:     Some(800_000.0),
            investment_date:   NaiveDate::from_ymd_opt(2024, 1, 1),
            ..NewInvestment::default()
        })
        .expect("insert investment");

    let cancel = CancellationToken::new();
    let run = |scenario: ScenarioType| {
        engine
            .run_monte_carlo(SimulationRequest { scenario_type: scenario, ..request(2_000, 17) }, &cancel)
            .expect("simulate")
    };
    let baseline = run(ScenarioType::Baseline);
    assert!((baseline.parameters.base_annual_return + 20.0).abs() < 1e-9);

    let summary = |s: ScenarioType| {
        baseline
            .scenario_analysis
            .iter()
            .find(|x| x.scenario == s)
            .cloned()
            .expect("scenario present")
    };
    let order = [
        ScenarioType::Optimistic,
        ScenarioType::Baseline,
        ScenarioType::Pessimistic,
        ScenarioType::StressTest,
    ];
    for pair in order.windows(2) {
        let (better, worse) = (summary(pair[0]), summary(pair[1]));
        assert!(
            better.expected_annual_return >= worse.expected_annual_return,
            "{:?} below {:?}",
            pair[0],
            pair[1]
        );
        assert!(better.expected_horizon_roi >= worse.expected_horizon_roi);
    }

    let stress = run(ScenarioType::StressTest);
    let optimistic = run(ScenarioType::Optimistic);
    assert!(stress.parameters.expected_annual_return < baseline.parameters.expected_annual_return);
    assert!(optimistic.parameters.expected_annual_return > baseline.parameters.expected_annual_return);
    assert!(stress.roi.expected < 0.0, "stress test turned a loss into {}", stress.roi.expected);
}

/// A hotter climate pathway drags the expected return down.
#[test]
fn climate_pathway_drags_return() {
    let engine = build();
    let cancel = CancellationToken::new();
    let plain = engine.run_monte_carlo(request(500, 5), &cancel).expect("plain");
    let hot = engine
        .run_monte_carlo(
            SimulationRequest {
                climate_scenario: Some(ClimateScenario::ThreeDegrees),
                ..request(500, 5)
            },
            &cancel,
        )
        .expect("3c");

    assert!(hot.parameters.expected_annual_return < plain.parameters.expected_annual_return);
    assert!(hot.roi.expected < plain.roi.expected);
}

/// An empty portfolio still simulates on default assumptions; ESG and
/// impact are simply not projected.
#[test]
fn empty_portfolio_uses_defaults() {
    let engine = empty();
    let sim = engine
        .run_monte_carlo(request(200, 9), &CancellationToken::new())
        .expect("simulate");

    assert!(sim.esg.is_none());
    assert!(sim.impact.is_none());
    assert_eq!(sim.probability_target_impact, None);
    assert_eq!(sim.parameters.base_annual_return, 8.0);
    assert!(sim.degradations.iter().any(|d| matches!(d, Degradation::MissingData { .. })));
}

// ── Validation ───────────────────────────────────────────────────────────────

#[test]
fn invalid_parameters_are_rejected() {
    let engine = build();
    let cancel = CancellationToken::new();
    let cases = [
        ("num_iterations", SimulationRequest { num_iterations: 0, ..request(1, 1) }),
        ("num_iterations", SimulationRequest { num_iterations: 100_001, ..request(1, 1) }),
        ("time_horizon_years", SimulationRequest { time_horizon_years: 0, ..request(1, 1) }),
        ("market_volatility", SimulationRequest { market_volatility: -0.1, ..request(1, 1) }),
        ("market_volatility", SimulationRequest { market_volatility: f64::NAN, ..request(1, 1) }),
    ];
    for (field, req) in cases {
        let err = engine.run_monte_carlo(req, &cancel).expect_err(field);
        assert!(
            matches!(&err, AnalyticsError::InvalidParameters { field: f, .. } if f == field),
            "expected {field} rejection, got {err:?}"
        );
    }
    assert!(engine.simulations(10).expect("read").is_empty(), "rejected runs must not persist");
}

#[test]
fn unknown_scenario_name_is_rejected() {
    let err = "meltdown".parse::<ScenarioType>().expect_err("unknown scenario");
    assert_eq!(err.code(), "invalid_parameters");
    assert_eq!("stress_test".parse::<ScenarioType>().ok(), Some(ScenarioType::StressTest));
    assert_eq!("1.5c".parse::<ClimateScenario>().ok(), Some(ClimateScenario::WellBelow2C));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

/// A token cancelled up front still lets the first chunk finish; the
/// result is marked partial.
#[test]
fn cancelled_run_returns_partial_result() {
    let engine = build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let sim = engine.run_monte_carlo(request(5_000, 21), &cancel).expect("simulate");
    let chunk = engine.config().simulation.chunk_size;
    assert!(sim.partial);
    assert_eq!(sim.completed_iterations, chunk);
    assert_eq!(sim.parameters.num_iterations, 5_000);
    assert!(sim.degradations.iter().any(|d| matches!(
        d,
        Degradation::Cancelled { completed, requested: 5_000 } if *completed == chunk
    )));
    assert_monotone("roi", &sim.roi);
}

/// An expired deadline stops the run like an explicit cancel and says so.
#[test]
fn timed_out_run_returns_partial_result() {
    let engine = build();
    let cancel = CancellationToken::with_timeout(Duration::ZERO);
    assert!(cancel.is_cancelled());

    let sim = engine.run_monte_carlo(request(5_000, 23), &cancel).expect("simulate");
    let chunk = engine.config().simulation.chunk_size;
    assert!(sim.partial);
    assert_eq!(sim.completed_iterations, chunk);
    assert!(sim.degradations.iter().any(|d| matches!(
        d,
        Degradation::Cancelled { completed, requested: 5_000 } if *completed == chunk
    )));
    assert!(engine.simulation(&sim.simulation_id).expect("stored").partial);
}

/// A cancelled run's completed trials match the same trials of a full run.
#[test]
fn partial_trials_match_full_run() {
    let engine = build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let partial = engine.run_monte_carlo(request(3_000, 77), &cancel).expect("partial");
    let full = engine
        .run_monte_carlo(request(3_000, 77), &CancellationToken::new())
        .expect("full");
    assert!(!full.partial);
    assert_eq!(partial.sample_outcomes, full.sample_outcomes);
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[test]
fn simulation_can_be_fetched_by_id() {
    let engine = build();
    let sim = engine
        .run_monte_carlo(
            SimulationRequest {
                simulation_name: "five year base".into(),
                created_by: Some("analyst".into()),
                ..request(300, 13)
            },
            &CancellationToken::new(),
        )
        .expect("simulate");

    let stored = engine.simulation(&sim.simulation_id).expect("fetch");
    assert_eq!(stored.simulation_id, sim.simulation_id);
    assert_eq!(stored.simulation_name, "five year base");
    assert_eq!(stored.seed, 13);
    assert_eq!(stored.created_by.as_deref(), Some("analyst"));
    assert_eq!(stored.completed_iterations, 300);

    assert_eq!(engine.simulations(10).expect("list").len(), 1);
}

#[test]
fn unknown_simulation_is_not_found() {
    let engine = build();
    let err = engine.simulation("no-such-run").expect_err("unknown id");
    assert!(matches!(err, AnalyticsError::RunNotFound { .. }), "{err:?}");
}

/// Without a seed one is chosen and recorded so the run can be replayed.
#[test]
fn unseeded_run_records_its_seed() {
    let engine = build();
    let cancel = CancellationToken::new();
    let first = engine
        .run_monte_carlo(SimulationRequest { seed: None, ..request(400, 0) }, &cancel)
        .expect("unseeded");
    let replay = engine
        .run_monte_carlo(request(400, first.seed), &cancel)
        .expect("replay");
    assert_eq!(first.roi, replay.roi);
}
