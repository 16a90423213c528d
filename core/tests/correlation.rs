//! Correlation analysis tests.
//!
//! Tests cover: a perfect linear relationship, coefficient and p-value
//! bounds, sparse pairs, small portfolios and the latest-analysis lookup.

use chrono::NaiveDate;
use impact_analytics_core::{
    correlation::{Strength, METRIC_PAIRS},
    demo::DemoPortfolio,
    engine::AnalyticsEngine,
    snapshot::Metric,
    store::{EsgAssessment, NewInvestment},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).expect("valid date")
}

fn build() -> AnalyticsEngine {
    AnalyticsEngine::build_test()
        .expect("build test engine")
        .with_as_of(as_of())
}

/// Insert holdings whose ROI is exactly ESG / 5.
fn seed_linear(engine: &AnalyticsEngine, esgs: &[f64]) {
    let store = engine.store();
    for (i, esg) in esgs.iter().enumerate() {
        let roi = esg / 5.0;
        let id = store
            .insert_investment(&NewInvestment {
                name:              format!("Linear {i}"),
                investment_amount: Some(100_000.0),
                current_value:     Some(100_000.0 * (1.0 + roi / 100.0)),
                ..NewInvestment::default()
            })
            .expect("insert investment");
        store
            .insert_esg_score(id, as_of() - chrono::Duration::days(5), &EsgAssessment {
                overall: Some(*esg),
                ..EsgAssessment::default()
            })
            .expect("insert esg");
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// ROI that is a linear function of ESG over five holdings gives r = 1
/// and a significant p-value.
#[test]
fn perfect_linear_relationship() {
    let engine = build();
    seed_linear(&engine, &[50.0, 60.0, 70.0, 80.0, 90.0]);

    let analysis = engine.calculate_correlations().expect("correlate");
    let pair = analysis.pair("esg_roi").expect("esg_roi computed");
    assert!(pair.coefficient > 0.999_999, "r = {}", pair.coefficient);
    assert!(pair.p_value < 0.05, "p = {}", pair.p_value);
    assert!(pair.significant);
    assert_eq!(pair.strength, Strength::Strong);
    assert_eq!(pair.sample_size, 5);
    assert_eq!(analysis.esg_roi_correlation, Some(pair.coefficient));
    assert!(analysis.recommendations.iter().any(|r| r.contains("ESG leaders")));
}

/// Pairs missing one side everywhere are omitted, not reported as zero.
#[test]
fn sparse_pairs_are_omitted() {
    let engine = build();
    seed_linear(&engine, &[50.0, 60.0, 70.0, 80.0, 90.0]);

    let analysis = engine.calculate_correlations().expect("correlate");
    assert_eq!(analysis.pairs.len(), 1);
    assert_eq!(analysis.omitted_pairs.len(), METRIC_PAIRS.len() - 1);
    assert!(analysis.omitted_pairs.contains(&"esg_impact".to_string()));
    assert!(!analysis.correlation_matrix.contains_key("esg_impact"));
    assert_eq!(analysis.impact_roi_correlation, None);
    assert_eq!(analysis.degradations.len(), analysis.omitted_pairs.len());
}

/// A metric correlates perfectly with itself.
#[test]
fn self_correlation_is_one() {
    let engine = build();
    seed_linear(&engine, &[50.0, 60.0, 70.0]);

    let analysis = engine.calculate_correlations().expect("correlate");
    assert_eq!(analysis.coefficient(Metric::Esg, Metric::Esg), Some(1.0));
    assert_eq!(
        analysis.coefficient(Metric::Roi, Metric::Esg),
        analysis.coefficient(Metric::Esg, Metric::Roi)
    );
}

/// Fewer than three complete observations is not enough for any pair.
#[test]
fn two_holdings_are_not_enough() {
    let engine = build();
    seed_linear(&engine, &[50.0, 60.0]);

    let analysis = engine.calculate_correlations().expect("correlate");
    assert!(analysis.pairs.is_empty());
    assert_eq!(analysis.omitted_pairs.len(), METRIC_PAIRS.len());
    assert_eq!(analysis.recommendations.len(), 1);
}

/// On a realistic portfolio every coefficient lies in [-1, 1] and every
/// p-value in [0, 1].
#[test]
fn coefficients_and_p_values_are_bounded() {
    let engine = build();
    DemoPortfolio::seed(engine.store(), 0xC0FF_EE00, 60, as_of()).expect("seed demo");

    let analysis = engine.calculate_correlations().expect("correlate");
    assert_eq!(analysis.sample_size, 60);
    assert!(!analysis.pairs.is_empty());
    for p in &analysis.pairs {
        assert!((-1.0..=1.0).contains(&p.coefficient), "{}: r = {}", p.key, p.coefficient);
        assert!((0.0..=1.0).contains(&p.p_value), "{}: p = {}", p.key, p.p_value);
        assert!(p.sample_size >= 3 && p.sample_size <= 60);
    }
    assert_eq!(analysis.key_insights.len(), analysis.pairs.len());
}

#[test]
fn latest_correlation_returns_newest_run() {
    let engine = build();
    assert!(engine.latest_correlation().expect("read empty").is_none());

    seed_linear(&engine, &[50.0, 60.0, 70.0, 80.0]);
    engine.calculate_correlations().expect("first");
    let second = engine.calculate_correlations().expect("second");

    let latest = engine.latest_correlation().expect("read").expect("stored analysis");
    assert_eq!(latest.analysis_id, second.analysis_id);
}
