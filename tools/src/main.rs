//! analytics-runner: headless runner for the portfolio analytics engine.
//!
//! Usage:
//!   analytics-runner --demo 40 --seed 12345 --iterations 10000 --horizon 5
//!   analytics-runner --db portfolio.db --scenario stress_test --climate 3c
//!   analytics-runner --db portfolio.db --ipc-mode < requests.jsonl

use anyhow::Result;
use chrono::NaiveDate;
use impact_analytics_core::{
    cancel::CancellationToken,
    config::AnalyticsConfig,
    demo::DemoPortfolio,
    engine::AnalyticsEngine,
    optimization::OptimizationTargets,
    request::AnalyticsRequest,
    simulation::{ClimateScenario, ScenarioType, SimulationRequest},
    store::AnalyticsStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let demo = parse_arg(&args, "--demo", 0usize);
    let iterations = parse_arg(&args, "--iterations", 10_000usize);
    let horizon = parse_arg(&args, "--horizon", 5u32);
    let volatility = parse_arg(&args, "--volatility", 0.15f64);
    let timeout_ms = parse_arg(&args, "--timeout-ms", 0u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let scenario: ScenarioType = flag_value(&args, "--scenario").unwrap_or("baseline").parse()?;
    let climate: Option<ClimateScenario> =
        flag_value(&args, "--climate").map(|s| s.parse::<ClimateScenario>()).transpose()?;
    let as_of: Option<NaiveDate> = flag_value(&args, "--as-of")
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()?;

    let config = match AnalyticsConfig::load(data_dir) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("using built-in config: {e}");
            AnalyticsConfig::default_test()
        }
    };

    if !ipc_mode {
        println!("Impact Portfolio Analytics: analytics-runner");
        println!("  seed:       {seed}");
        println!("  db:         {db}");
        println!("  data_dir:   {data_dir}");
        println!("  iterations: {iterations}");
        println!("  horizon:    {horizon}y");
        println!("  scenario:   {}", scenario.as_str());
        println!();
    }

    let store = AnalyticsStore::open(db)?;
    store.migrate()?;
    let mut engine = AnalyticsEngine::new(store, config);
    if let Some(d) = as_of {
        engine = engine.with_as_of(d);
    }

    if demo > 0 {
        DemoPortfolio::seed(engine.store(), seed, demo, engine.as_of())?;
    }

    let cancel = if timeout_ms > 0 {
        CancellationToken::with_timeout(Duration::from_millis(timeout_ms))
    } else {
        CancellationToken::new()
    };

    if ipc_mode {
        run_ipc_loop(&engine, &cancel)?;
    } else {
        let targets = OptimizationTargets {
            target_impact_score: parse_opt(&args, "--target-impact"),
            target_esg_score:    parse_opt(&args, "--target-esg"),
            max_climate_risk:    parse_opt(&args, "--max-climate-risk"),
            min_roi_threshold:   parse_opt(&args, "--min-roi"),
        };
        let request = SimulationRequest {
            simulation_name:    format!("runner-{seed}"),
            num_iterations:     iterations,
            time_horizon_years: horizon,
            scenario_type:      scenario,
            climate_scenario:   climate,
            market_volatility:  volatility,
            seed:               Some(seed),
            created_by:         Some("analytics-runner".to_string()),
            ..SimulationRequest::default()
        };
        print_summary(&engine, targets, request, &cancel)?;
    }

    Ok(())
}

/// One JSON request per line in, one response envelope per line out.
/// `{"op":"quit"}` or EOF ends the loop.
fn run_ipc_loop(engine: &AnalyticsEngine, cancel: &CancellationToken) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(&buffer) {
            Ok(v) => v,
            Err(e) => {
                let err_json = serde_json::json!({ "error": { "code": "bad_request", "message": e.to_string() } });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if value["op"] == "quit" {
            break;
        }

        let request: AnalyticsRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                let err_json = serde_json::json!({ "error": { "code": "bad_request", "message": e.to_string() } });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = engine.handle_request(request, cancel);
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn print_summary(
    engine:  &AnalyticsEngine,
    targets: OptimizationTargets,
    request: SimulationRequest,
    cancel:  &CancellationToken,
) -> Result<()> {
    let snapshot = engine.snapshot()?;
    println!("=== PORTFOLIO ===");
    println!("  as_of:        {}", snapshot.as_of);
    println!("  investments:  {}", snapshot.len());
    println!();

    println!("=== CORRELATIONS ===");
    let corr = engine.calculate_correlations()?;
    for p in &corr.pairs {
        println!(
            "  {:<20} r={:+.3}  p={:.3}  n={}",
            p.key, p.coefficient, p.p_value, p.sample_size
        );
    }
    for key in &corr.omitted_pairs {
        println!("  {key:<20} (omitted: insufficient data)");
    }
    for insight in &corr.key_insights {
        println!("  - {insight}");
    }
    println!();

    println!("=== ATTRIBUTION (top 5 by impact share) ===");
    let mut attributions = engine.attribute_impact(None)?;
    attributions.sort_by(|a, b| b.portfolio_impact_percentage.total_cmp(&a.portfolio_impact_percentage));
    for a in attributions.iter().take(5) {
        println!(
            "  {:<40} weight={:.3}  impact={:.1}%  sdg={:?}  confidence={:.0}%",
            a.investment_name,
            a.attribution_weight,
            a.portfolio_impact_percentage,
            a.primary_sdg,
            a.confidence_level
        );
    }
    println!();

    if let Some(first) = snapshot.rows().first() {
        println!("=== BENCHMARK ({}) ===", first.name);
        let cmp = engine.compare_to_peers(first.investment_id)?;
        println!(
            "  group:  {} / {:?} / {:?} ({:?}, {} peers)",
            cmp.benchmark.sector,
            cmp.benchmark.industry,
            cmp.benchmark.region,
            cmp.benchmark.grouping_level,
            cmp.benchmark.group_size
        );
        for r in &cmp.percentile_ranks {
            match r.rank {
                Some(rank) => println!("  {:<18} rank={rank:.0}", r.metric.key()),
                None => println!("  {:<18} rank=n/a", r.metric.key()),
            }
        }
        for s in &cmp.strengths {
            println!("  + {s}");
        }
        for w in &cmp.weaknesses {
            println!("  - {w}");
        }
        println!();
    }

    println!("=== OPTIMIZATION ===");
    let opt = engine.optimize(targets, Some("analytics-runner".to_string()))?;
    println!("  status:   {:?}", opt.status);
    println!("  current:  {:?}", opt.current);
    println!("  proposed: {:?}", opt.optimized);
    println!("  notes:    {}", opt.analysis_notes);
    println!();

    println!("=== MONTE CARLO ===");
    let sim = engine.run_monte_carlo(request, cancel)?;
    println!("  simulation_id:  {}", sim.simulation_id);
    println!("  trials:         {}/{}", sim.completed_iterations, sim.parameters.num_iterations);
    println!("  expected ROI:   {:.2}%", sim.roi.expected);
    for (p, v) in &sim.roi.percentiles {
        println!("  p{p:<3} ROI:       {v:.2}%");
    }
    println!("  VaR 95:         {:.2}%", sim.value_at_risk_95);
    println!("  CVaR 95:        {:.2}%", sim.conditional_var_95);
    println!("  P(ROI > 0):     {:.1}%", sim.probability_positive_roi);
    println!("  notes:          {}", sim.notes);
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    parse_opt(args, flag).unwrap_or(default)
}

fn parse_opt<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    flag_value(args, flag).and_then(|v| v.parse().ok())
}
