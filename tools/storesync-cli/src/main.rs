//! StoreSync Command Line Interface
//! Operator tooling for the resilient sync engine: simulated population
//! runs, circuit breaker inspection and configuration dumps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use storesync_core::{
    error::Result as CoreResult, CircuitState, CompositeSyncOperation, InMemoryStoreProvider,
    NoLimit, Store, SyncConfig, SyncEngine, SyncMetrics, SyncMode, SyncStep,
};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated sync over a synthetic store population
    Run {
        /// Number of stores in the population
        #[arg(long, default_value_t = 120)]
        stores: usize,

        /// Number of stores that permanently fail their primary step
        #[arg(long, default_value_t = 2)]
        failing: usize,

        /// Stores per sequential batch
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Worker tasks
        #[arg(long, default_value_t = 15)]
        workers: usize,

        /// Consecutive failures before a store's circuit opens
        #[arg(long, default_value_t = 50)]
        failure_threshold: u32,

        /// How many times to run over the population
        #[arg(long, default_value_t = 1)]
        runs: usize,

        /// Simulated remote-call latency per step, in milliseconds
        #[arg(long, default_value_t = 0)]
        step_millis: u64,

        /// Catch-up mode (recent window only) instead of full sync
        #[arg(long)]
        catch_up: bool,
    },

    /// Print the default engine configuration as JSON
    Defaults,
}

/// Fake remote-data pull with configurable latency and a set of stores
/// whose primary step always fails.
struct SimulatedStep {
    name: String,
    primary: bool,
    delay: Duration,
    failing: HashSet<Uuid>,
}

#[async_trait]
impl SyncStep for SimulatedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary(&self) -> bool {
        self.primary
    }

    async fn run(&self, store: &Store, _mode: SyncMode) -> CoreResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.primary && self.failing.contains(&store.id) {
            return Err(storesync_core::Error::step("simulated API failure"));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            stores,
            failing,
            batch_size,
            workers,
            failure_threshold,
            runs,
            step_millis,
            catch_up,
        } => {
            run_simulation(
                stores,
                failing,
                batch_size,
                workers,
                failure_threshold,
                runs,
                Duration::from_millis(step_millis),
                catch_up,
            )
            .await?;
        }
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&SyncConfig::default())?);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_simulation(
    store_count: usize,
    failing_count: usize,
    batch_size: usize,
    workers: usize,
    failure_threshold: u32,
    runs: usize,
    step_delay: Duration,
    catch_up: bool,
) -> anyhow::Result<()> {
    let population: Vec<Store> = (0..store_count)
        .map(|i| Store::new(format!("store-{i:04}"), "trendyol"))
        .collect();
    let failing: HashSet<Uuid> = population
        .iter()
        .take(failing_count)
        .map(|s| s.id)
        .collect();

    let mut config = SyncConfig::default();
    config.batch_size = batch_size;
    config.parallel_workers = workers;
    config.failure_threshold = failure_threshold;

    let engine = SyncEngine::new(
        config,
        Arc::new(InMemoryStoreProvider::new(population)),
        Arc::new(SyncMetrics::new()),
    )?;

    let steps: Vec<Arc<dyn SyncStep>> = ["Orders", "Products", "Questions", "Claims"]
        .iter()
        .enumerate()
        .map(|(index, name)| {
            Arc::new(SimulatedStep {
                name: name.to_string(),
                primary: index == 0,
                delay: step_delay,
                failing: failing.clone(),
            }) as Arc<dyn SyncStep>
        })
        .collect();
    let operation = Arc::new(CompositeSyncOperation::new(steps, Arc::new(NoLimit)));

    let mode = if catch_up {
        SyncMode::CatchUp
    } else {
        SyncMode::Full
    };

    println!(
        "{} {} stores ({} failing), batch size {}, {} workers, {} run(s)",
        style("Simulating").bold().cyan(),
        store_count,
        failing_count,
        batch_size,
        workers,
        runs
    );

    let progress = ProgressBar::new(runs as u64);
    progress.set_style(ProgressStyle::with_template(
        "{spinner} [{bar:30}] run {pos}/{len}",
    )?);

    for run_index in 1..=runs {
        let result = engine.run(operation.clone(), mode).await;
        progress.inc(1);
        info!(
            run = run_index,
            success = result.success_count,
            failed = result.failure_count,
            skipped = result.skipped_count,
            "run finished"
        );
        progress.println(format!(
            "run {:>3}: {} ok, {} failed, {} skipped ({:.1}% success)",
            run_index,
            style(result.success_count).green(),
            style(result.failure_count).red(),
            style(result.skipped_count).yellow(),
            result.success_rate()
        ));
    }
    progress.finish_and_clear();

    let states = engine.circuit_states().await;
    let open = states
        .values()
        .filter(|s| **s == CircuitState::Open)
        .count();
    let half_open = states
        .values()
        .filter(|s| **s == CircuitState::HalfOpen)
        .count();
    println!(
        "{} {} circuits tracked: {} open, {} half-open, {} closed",
        style("Circuits").bold().cyan(),
        states.len(),
        style(open).red(),
        style(half_open).yellow(),
        style(states.len() - open - half_open).green()
    );
    for store_id in engine.open_circuits().await {
        println!("  open: {store_id}");
    }

    engine.shutdown().await;
    Ok(())
}
