use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runflow_cli::planner::HeuristicPlanner;
use runflow_cli::server::{serve, AppState};
use runflow_cli::Settings;
use runflow_run_engine::Planner;

#[derive(Parser)]
#[command(name = "runflow", version, about = "Browser ops runs with an auditable trail")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force debug-level logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Print the plan the planner would produce for a task, without
    /// creating a run.
    Plan(PlanArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Override the configured bind address.
    #[arg(long)]
    addr: Option<SocketAddr>,
}

#[derive(Args)]
struct PlanArgs {
    /// Task text, e.g. "log in via Form Authentication".
    task: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::Serve(args) => {
            let addr: SocketAddr = match args.addr {
                Some(addr) => addr,
                None => settings
                    .listen_addr
                    .parse()
                    .with_context(|| format!("invalid listen_addr '{}'", settings.listen_addr))?,
            };
            let state = AppState::from_settings(settings);
            serve(state, addr).await
        }
        Commands::Plan(args) => {
            let planner = HeuristicPlanner::new(settings.demo_starting_url.clone());
            let draft = planner
                .plan(&args.task, &[])
                .await
                .map_err(|err| anyhow::anyhow!(err))?;
            println!("{}", serde_json::to_string_pretty(&draft)?);
            info!(steps = draft.steps.len(), "plan preview generated");
            Ok(())
        }
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}
