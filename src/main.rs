use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adrotate::config::Config;
use adrotate::error::AdrotateErrorTrait;
use adrotate::gate::Gate;
use adrotate::rotation::{format_simulation, Clock, DAY_KEY_FORMAT};
use adrotate::server::AdServer;

#[derive(Parser)]
#[command(
    name = "adrotate",
    version,
    about = "Session-capped ad rotation service",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML); ADROTATE_* environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, pretty, json); defaults to logging.format from the config
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Override the bind address (e.g. 127.0.0.1:8080)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print the ads a fresh session would see over one day
    Simulate {
        /// Number of same-day requests to run
        #[arg(short, long, default_value = "20")]
        requests: usize,

        /// Day to simulate (YYYY-MM-DD), defaults to today in the reset offset
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Show the gate decision for a user agent
    CheckAgent {
        /// User-Agent header value
        user_agent: String,

        /// Treat the visitor as signed in
        #[arg(long, default_value = "false")]
        authenticated: bool,
    },

    /// List the configured ads
    Ads,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })?;

    // Initialize tracing/logging
    let log_format = LogFormat::from_name(
        cli.log_format.as_deref().unwrap_or(&config.logging.format),
    )?;
    setup_tracing(log_format, cli.verbose, &config.logging.level)?;

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(config = ?cli.config, bind = ?bind, "Starting serve command");
            serve(config, cli.config, bind).await?;
        }

        Commands::Simulate { requests, date } => {
            tracing::debug!(requests, date = ?date, "Starting simulate command");
            simulate(&config, requests, date.as_deref())?;
        }

        Commands::CheckAgent {
            user_agent,
            authenticated,
        } => {
            check_agent(&config, &user_agent, authenticated);
        }

        Commands::Ads => {
            list_ads(&config)?;
        }
    }

    Ok(())
}

/// Output layout of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// Single-line compact records
    Text,
    /// Multi-line human-friendly records
    Pretty,
    /// One JSON object per record
    Json,
}

impl LogFormat {
    fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unknown log format '{other}', expected text, pretty or json"),
        }
    }
}

fn setup_tracing(format: LogFormat, verbose: bool, level: &str) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("adrotate=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("adrotate={},warn", level.to_lowercase()))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(())
}

async fn serve(mut config: Config, config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind
            .parse()
            .with_context(|| format!("Invalid bind address: {bind}"))?;
    }

    if let Err(e) = adrotate::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    run_server(config, config_path).await.map_err(|e| {
        tracing::error!(category = %e.category(), recoverable = e.is_recoverable(), "{e}");
        anyhow::Error::new(e)
    })
}

async fn run_server(config: Config, config_path: Option<PathBuf>) -> adrotate::Result<()> {
    let server = AdServer::new(config, config_path).await?;
    println!("{}", server.info().display());

    server.start_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

fn simulate(config: &Config, requests: usize, date: Option<&str>) -> Result<()> {
    let rotation = config.rotation.rotation_config()?;
    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, DAY_KEY_FORMAT)
            .with_context(|| format!("Invalid date '{raw}', expected YYYY-MM-DD"))?,
        None => config.rotation.clock()?.today(),
    };

    print!("{}", format_simulation(&rotation, requests, date));
    Ok(())
}

fn check_agent(config: &Config, user_agent: &str, authenticated: bool) {
    let gate = Gate::from_config(&config.gate);
    let decision = gate.evaluate(authenticated, user_agent);

    println!("User-Agent: {user_agent:?}");
    println!("Signed in:  {authenticated}");
    println!(
        "Decision:   {decision} ({})",
        if decision.is_eligible() { "ads shown" } else { "no ads" }
    );
}

fn list_ads(config: &Config) -> Result<()> {
    let rotation = config.rotation.rotation_config()?;
    let source = config
        .rotation
        .ad_scripts_file
        .as_deref()
        .map(Path::display)
        .map(|path| path.to_string())
        .unwrap_or_else(|| "inline ad_scripts".to_string());

    println!("Source:        {source}");
    println!("Views per ad:  {}", rotation.views_per_ad());
    println!("Reset offset:  UTC{}", config.rotation.utc_offset);
    println!("Daily quota:   {}", rotation.daily_quota());
    println!("{:-<60}", "");

    if rotation.is_empty() {
        println!("(no ads configured)");
    }
    for (index, ad) in rotation.ads().iter().enumerate() {
        println!("{index:>3}  {ad}");
    }

    Ok(())
}
