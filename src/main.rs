use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use datasource::scenario::{duration, Frame, RaceSummary, Scenario, Strategy};
use datasource::sources::wait_for_final_result;
use datasource::{DataSource, DataSourceRef, DataSubscriber, SerialExecutor};

#[derive(Parser, Debug)]
#[command(name = "datasource-race")]
#[command(about = "Race simulated producers through a data source combinator")]
struct Args {
    /// Path to the scenario file (TOML, JSON or YAML)
    #[arg(short, long, default_value = "scenario.toml")]
    scenario: PathBuf,

    /// Override the scenario's combinator
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Override the scenario's timeout (e.g., "5s", "500ms")
    #[arg(short, long)]
    timeout: Option<String>,

    /// Create producers only when the result is first asked for
    #[arg(long)]
    lazy: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut scenario = Scenario::load(&args.scenario)?;
    if let Some(strategy) = args.strategy {
        scenario.strategy = strategy;
    }
    if let Some(ref timeout) = args.timeout {
        let timeout = duration::parse_duration(timeout)
            .with_context(|| format!("Invalid --timeout {}", timeout))?;
        scenario.timeout = Some(timeout);
    }
    scenario.lazy |= args.lazy;

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = run_race(&scenario, &runtime)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    // Producers still sleeping are abandoned rather than awaited.
    runtime.shutdown_timeout(Duration::from_millis(100));
    Ok(())
}

/// Start the race, log every event and wait for the final outcome.
fn run_race(scenario: &Scenario, runtime: &tokio::runtime::Runtime) -> Result<RaceSummary> {
    info!(
        strategy = ?scenario.strategy,
        lazy = scenario.lazy,
        producers = scenario.producers.len(),
        "starting race"
    );

    let started = Instant::now();
    let source = scenario.data_source(runtime.handle())?;

    source.subscribe(
        Arc::new(RaceLogger),
        Arc::new(SerialExecutor::spawn_on(runtime.handle())),
    );

    let outcome = wait_for_final_result(&source, scenario.timeout);
    let summary = RaceSummary::new(scenario, &source, &outcome, started.elapsed());
    source.close();

    info!(status = ?summary.status, elapsed = %summary.elapsed, "race done");
    Ok(summary)
}

/// Logs race events. Leaves closing the source to `run_race`, which still
/// needs the final result for the summary.
struct RaceLogger;

impl DataSubscriber<Frame> for RaceLogger {
    fn on_new_result(&self, data_source: &DataSourceRef<Frame>) {
        if let Some(frame) = data_source.result() {
            info!(
                producer = %frame.producer,
                sequence = frame.sequence,
                is_final = frame.is_final,
                "new result"
            );
        }
    }

    fn on_failure(&self, data_source: &DataSourceRef<Frame>) {
        if let Some(cause) = data_source.failure_cause() {
            warn!(%cause, "race failed");
        }
    }

    fn on_cancellation(&self, _data_source: &DataSourceRef<Frame>) {
        info!("race cancelled");
    }

    fn on_progress_update(&self, data_source: &DataSourceRef<Frame>) {
        info!(progress = data_source.progress(), "progress");
    }
}
