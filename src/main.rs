use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gapbot::api::{DeribitClient, DeribitSettings, ExchangeGateway, DEFAULT_INSTRUMENT};
use gapbot::db::PostgresOrderLog;
use gapbot::execution::{GapTrader, SessionController, SessionReport, SessionSettings};
use gapbot::StrategyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gapbot", version, about = "Gap market-making bot for Deribit perpetuals")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one trading session
    Run(RunArgs),
    /// Write a configuration file from explicit values
    ExportConfig(ExportConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Number of ticks to perform
    #[arg(long, default_value_t = 1000)]
    iterations: u64,

    /// Pause between ticks in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_interval_ms: u64,

    /// Abort after this many failed ticks in a row (0 = never)
    #[arg(long, default_value_t = 10)]
    max_consecutive_failures: u32,

    #[arg(long, default_value = DEFAULT_INSTRUMENT)]
    instrument: String,

    /// Contract amount per order
    #[arg(long, default_value_t = 10.0)]
    amount: f64,

    /// Store the order history in Postgres (DATABASE_URL) after the session
    #[arg(long)]
    log_orders: bool,
}

#[derive(Args)]
struct ExportConfigArgs {
    #[arg(long, default_value = "config.json")]
    output: PathBuf,

    #[arg(long)]
    gap: f64,

    #[arg(long)]
    gap_ignore: f64,

    #[arg(long)]
    client_id: String,

    #[arg(long)]
    client_secret: String,

    /// Use the mainnet host instead of the testnet
    #[arg(long)]
    mainnet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::ExportConfig(args) => export_config(args),
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gapbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_order_log() -> Result<PostgresOrderLog> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when --log-orders is used")?;

    PostgresOrderLog::new(&database_url)
        .await
        .context("Failed to connect to Postgres order log")
}

// ============================================================================
// Commands
// ============================================================================

async fn run(args: RunArgs) -> Result<()> {
    // Configuration errors surface here, before any network activity
    let config = StrategyConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    tracing::info!("🚀 gapbot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Host: {}", config.host());
    tracing::info!("  Instrument: {}", args.instrument);
    tracing::info!("  Gap: {} (ignore band {})", config.gap(), config.gap_ignore());
    tracing::info!("  Amount: {}", args.amount);
    tracing::info!("  Iterations: {}", args.iterations);

    let settings = DeribitSettings {
        amount: args.amount,
        ..Default::default()
    };
    let gateway = Arc::new(DeribitClient::new(&config, settings)?);

    let session_settings = SessionSettings {
        tick_interval: Duration::from_millis(args.tick_interval_ms),
        max_consecutive_failures: (args.max_consecutive_failures > 0)
            .then_some(args.max_consecutive_failures),
        ..Default::default()
    };

    let trader = GapTrader::new(config, gateway.clone(), args.instrument.clone());
    let mut session = SessionController::new(trader, session_settings);

    if args.log_orders {
        session = session.with_order_log(Box::new(connect_order_log().await?));
    }

    tokio::select! {
        result = session.run(args.iterations) => {
            let report = result.context("Trading session failed")?;
            print_report(&report);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("⚠️  Received Ctrl+C, cancelling open orders...");
            if let Err(e) = gateway.cancel_all_orders(&args.instrument).await {
                tracing::error!("Failed to cancel open orders on shutdown: {}", e);
            }
        }
    }

    tracing::info!("👋 gapbot stopped");
    Ok(())
}

fn export_config(args: ExportConfigArgs) -> Result<()> {
    let config = StrategyConfig::new(
        args.gap,
        args.gap_ignore,
        "",
        args.client_id,
        args.client_secret,
    )
    .with_test_mode(!args.mainnet);

    config
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    tracing::info!("✅ Configuration written to {}", args.output.display());
    Ok(())
}

fn print_report(report: &SessionReport) {
    let elapsed = report.finished_at - report.started_at;

    tracing::info!("📈 Session summary:");
    tracing::info!("  Duration: {}s", elapsed.num_seconds());
    tracing::info!("  Ticks: {} ({} failed)", report.ticks, report.failed_ticks);
    tracing::info!("  Transitions: {}", report.transitions);
    tracing::info!("  Orders placed: {}", report.orders_placed);
    tracing::info!("  Cancellations: {}", report.cancellations);
    tracing::info!("  Completed cycles: {}", report.completed_cycles);
    if let Some(logged) = report.orders_logged {
        tracing::info!("  Orders logged: {}", logged);
    }
}
