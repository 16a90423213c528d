//! Portfolio optimization tests.
//!
//! Tests cover: reachable and unreachable targets, weight bounds,
//! idempotence, parameter validation and persistence.

use chrono::NaiveDate;
use impact_analytics_core::{
    engine::AnalyticsEngine,
    error::{AnalyticsError, Degradation},
    optimization::{OptimizationStatus, OptimizationTargets, SuggestedChange},
    store::{EsgAssessment, ImpactAssessment, NewInvestment},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).expect("valid date")
}

/// Four equal-value holdings with impact 2/4/6/8, ESG 40/50/60/70 and
/// ROI 20/15/10/5 (impact and return pull in opposite directions).
fn build() -> AnalyticsEngine {
    let engine = AnalyticsEngine::build_test()
        .expect("build test engine")
        .with_as_of(as_of());
    let store = engine.store();
    let assessed = as_of() - chrono::Duration::days(10);
    for (i, (impact, esg, roi)) in
        [(2.0, 40.0, 20.0), (4.0, 50.0, 15.0), (6.0, 60.0, 10.0), (8.0, 70.0, 5.0)]
            .into_iter()
            .enumerate()
    {
        let id = store
            .insert_investment(&NewInvestment {
                name:              format!("Holding {i}"),
                sector:            Some("Energy".into()),
                investment_amount: Some(100_000.0 / (1.0 + roi / 100.0)),
                current_value:     Some(100_000.0),
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
    }
    engine
}

fn impact_target(score: f64) -> OptimizationTargets {
    OptimizationTargets {
        target_impact_score: Some(score),
        ..OptimizationTargets::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// A reachable impact target is met by shifting weight toward high-impact
/// holdings, with every weight inside its bounds.
#[test]
fn reachable_target_is_met_within_bounds() {
    let engine = build();
    let opt = engine.optimize(impact_target(5.8), None).expect("optimize");

    assert_eq!(opt.status, OptimizationStatus::Feasible, "{}", opt.analysis_notes);
    let current = opt.current.impact_score.expect("current impact");
    let optimized = opt.optimized.impact_score.expect("optimized impact");
    assert!((current - 5.0).abs() < 1e-9);
    assert!(optimized >= 5.8 - 1e-4, "optimized impact {optimized}");

    let changes = opt.suggested_additions.iter().chain(&opt.suggested_reductions);
    let mut weight_sum = 0.25 * (4 - opt.suggested_rebalancing.len()) as f64;
    for c in changes {
        assert!(c.suggested_weight >= c.current_weight * 0.5 - 1e-12);
        assert!(c.suggested_weight <= c.current_weight * 1.5 + 1e-12);
        weight_sum += c.suggested_weight;
    }
    assert!((weight_sum - 1.0).abs() < 1e-9, "weights sum to {weight_sum}");
    assert!(opt.suggested_additions.iter().all(|c| c.merit > 0.0));
    assert!(opt.suggested_reductions.iter().all(|c| c.merit < 0.0));
}

/// A target just above the current average is met with the smallest
/// possible move: weight goes from the lowest-impact holding straight to
/// the highest, and no further than needed.
#[test]
fn near_target_uses_minimal_reweighting() {
    let engine = build();
    let opt = engine.optimize(impact_target(5.01), None).expect("optimize");

    assert_eq!(opt.status, OptimizationStatus::Feasible, "{}", opt.analysis_notes);
    // Moving d from impact 2 to impact 8 lifts the average by 6d.
    let minimal = 2.0 * 0.01 / 6.0;
    assert!(
        opt.total_weight_change <= minimal * 1.05,
        "moved {} where {minimal} suffices",
        opt.total_weight_change
    );
    let names = |v: &[SuggestedChange]| {
        v.iter().map(|c| c.investment_name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&opt.suggested_additions), vec!["Holding 3".to_string()]);
    assert_eq!(names(&opt.suggested_reductions), vec!["Holding 0".to_string()]);
    let optimized = opt.optimized.impact_score.expect("optimized impact");
    assert!((optimized - 5.01).abs() < 1e-6, "optimized impact {optimized}");
}

/// Same snapshot, same targets: same suggestions.
#[test]
fn optimization_is_idempotent() {
    let engine = build();
    let targets = OptimizationTargets {
        target_impact_score: Some(5.5),
        target_esg_score:    Some(57.0),
        ..OptimizationTargets::default()
    };
    let a = engine.optimize(targets.clone(), None).expect("first run");
    let b = engine.optimize(targets, None).expect("second run");

    assert_eq!(a.suggested_rebalancing, b.suggested_rebalancing);
    assert_eq!(a.optimized, b.optimized);
    assert_eq!(a.iterations, b.iterations);
}

/// A minimum ROI above every holding's ROI cannot be met; the result is
/// the closest point and says which target is unmet.
#[test]
fn unreachable_target_is_partial() {
    let engine = build();
    let targets = OptimizationTargets {
        min_roi_threshold: Some(50.0),
        ..OptimizationTargets::default()
    };
    let opt = engine.optimize(targets, None).expect("optimize");

    assert_eq!(opt.status, OptimizationStatus::Partial);
    assert!(opt.residual > 0.0);
    let unmet = opt
        .degradations
        .iter()
        .find_map(|d| match d {
            Degradation::InfeasibleConstraints { unmet, .. } => Some(unmet.clone()),
            _ => None,
        })
        .expect("infeasible degradation");
    assert_eq!(unmet, vec!["min_roi_threshold".to_string()]);
    // Still moved toward the target as far as the bounds allow.
    assert!(opt.optimized.roi.expect("roi") > opt.current.roi.expect("roi"));
}

#[test]
fn met_target_needs_no_rebalancing() {
    let engine = build();
    let opt = engine.optimize(impact_target(4.0), None).expect("optimize");
    assert_eq!(opt.status, OptimizationStatus::AlreadyFeasible);
    assert!(opt.suggested_rebalancing.is_empty());
    assert_eq!(opt.iterations, 0);
}

#[test]
fn no_targets_returns_current_allocation() {
    let engine = build();
    let opt = engine.optimize(OptimizationTargets::default(), None).expect("optimize");
    assert_eq!(opt.status, OptimizationStatus::AlreadyFeasible);
    assert!(opt.suggested_rebalancing.is_empty());
    assert_eq!(opt.current, opt.optimized);
}

/// A target on a metric no holding reports cannot be steered.
#[test]
fn target_without_data_is_flagged() {
    let engine = build();
    let targets = OptimizationTargets {
        max_climate_risk: Some(4.0),
        ..OptimizationTargets::default()
    };
    let opt = engine.optimize(targets, None).expect("optimize");
    assert_eq!(opt.status, OptimizationStatus::Partial);
    assert!(opt
        .degradations
        .iter()
        .any(|d| matches!(d, Degradation::MissingData { reason } if reason.contains("max_climate_risk"))));
}

#[test]
fn out_of_range_target_is_rejected() {
    let engine = build();
    let targets = OptimizationTargets {
        target_esg_score: Some(150.0),
        ..OptimizationTargets::default()
    };
    let err = engine.optimize(targets, None).expect_err("esg above 100");
    assert!(
        matches!(&err, AnalyticsError::InvalidParameters { field, .. } if field == "target_esg_score"),
        "{err:?}"
    );
    assert!(engine.optimizations(10).expect("read").is_empty());
}

#[test]
fn optimizations_are_persisted_newest_first() {
    let engine = build();
    let first = engine.optimize(impact_target(5.2), Some("analyst".into())).expect("first");
    let second = engine.optimize(impact_target(5.4), None).expect("second");

    let stored = engine.optimizations(10).expect("read");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].optimization_id, second.optimization_id);
    assert_eq!(stored[1].optimization_id, first.optimization_id);
    assert_eq!(stored[1].created_by.as_deref(), Some("analyst"));
    assert_eq!(engine.optimizations(1).expect("read one").len(), 1);
}
