use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use plant_energy_scheduler::{api, config::Config, controller, repo::Repositories, telemetry};

#[derive(Parser)]
#[command(name = "plant-scheduler")]
#[command(author, version, about = "Per-machine demand forecasting and energy-cost production scheduling")]
struct Cli {
    /// Configuration file (defaults to config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate synthetic observations into the configured store
    Simulate(SimulateArgs),
    /// Forecast every machine and store the horizon
    Forecast(SeedArgs),
    /// Optimize production against the stored forecasts
    Optimize(SeedArgs),
    /// Forecast, then optimize
    Run(SeedArgs),
    /// Run the pipeline periodically and serve the HTTP API
    Serve(SeedArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct SimulateArgs {
    #[arg(long)]
    machines: Option<usize>,
    #[arg(long)]
    hours: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct SeedArgs {
    /// Fill the observation store with synthetic history first
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs);

    let mut cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Config => {
            println!("{}", toml::to_string_pretty(&cfg).context("failed to render config")?);
            Ok(())
        }
        Command::Simulate(args) => {
            if let Some(m) = args.machines {
                cfg.simulation.machines = m;
            }
            if let Some(h) = args.hours {
                cfg.simulation.hours = h;
            }
            if args.seed.is_some() {
                cfg.simulation.seed = args.seed;
            }
            cfg.check()?;
            let repos = Repositories::new(&cfg).await?;
            let stored = seed_observations(&cfg, &repos).await?;
            println!("Generated {stored} observation rows.");
            Ok(())
        }
        Command::Forecast(args) => {
            let state = prepare(cfg, args.simulate).await?;
            let report = state.pipeline.forecast().await?;
            println!(
                "Forecasted {} machines ({} fallbacks, {} skipped), {} rows written.",
                report.machines.len(),
                report.fallbacks(),
                report.skipped.len(),
                report.rows_written()
            );
            Ok(())
        }
        Command::Optimize(args) => {
            let state = prepare(cfg, args.simulate).await?;
            let summary = state.pipeline.optimize().await?;
            print_summary(&summary);
            Ok(())
        }
        Command::Run(args) => {
            let state = prepare(cfg, args.simulate).await?;
            let summary = state.pipeline.run_cycle().await?;
            print_summary(&summary);
            Ok(())
        }
        Command::Serve(args) => serve(prepare(cfg, args.simulate).await?).await,
    }
}

async fn prepare(cfg: Config, simulate: bool) -> Result<controller::AppState> {
    let repos = Repositories::new(&cfg).await?;
    if simulate {
        seed_observations(&cfg, &repos).await?;
    }
    Ok(controller::AppState::with_repos(cfg, repos))
}

#[cfg(feature = "sim")]
async fn seed_observations(cfg: &Config, repos: &Repositories) -> Result<usize> {
    use plant_energy_scheduler::simulation::PlantSimulator;

    let mut sim = PlantSimulator::new(&cfg.simulation);
    let start = sim.default_start();
    let rows = sim.generate(start);
    let generated = rows.len();
    let stored = repos
        .observations
        .append_observations(rows)
        .await
        .context("failed to store synthetic observations")?;
    info!(generated, stored, machines = sim.profiles().len(), "synthetic history generated");
    Ok(stored)
}

#[cfg(not(feature = "sim"))]
async fn seed_observations(_cfg: &Config, _repos: &Repositories) -> Result<usize> {
    anyhow::bail!("built without the `sim` feature")
}

fn print_summary(summary: &plant_energy_scheduler::domain::OptimizationSummary) {
    println!("Optimal solution found!");
    println!("Total minimized cost: ${:.2}", summary.optimized_cost);
    println!("Baseline cost:        ${:.2}", summary.baseline_cost);
    println!("Savings:              ${:.2}", summary.savings());
    println!(
        "Machines: {}, hours: {}, plant limit: {:.1} units/h",
        summary.machines, summary.timestamps, summary.plant_limit
    );
}

async fn serve(mut state: controller::AppState) -> Result<()> {
    let cfg = state.cfg.clone();
    if cfg.auth.token.is_empty() {
        warn!("auth.token is empty; run trigger endpoints are disabled");
    }

    let scheduler = controller::spawn_scheduler(&mut state);
    let app = api::router(state, &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0; the API is reachable from the network");
    }
    info!(%addr, "starting plant scheduler");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    scheduler.abort();
    warn!("shutdown complete");
    Ok(())
}
