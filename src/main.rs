use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{Algorithm, RateLimiter, Sweeper, SystemClock};

/// Drive the admission engine with a simulated stream of requests.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured algorithm (uses that algorithm's default quota)
    #[arg(short, long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    /// Client identifier to send requests as (repeatable)
    #[arg(long = "client", default_value = "user_1")]
    clients: Vec<String>,

    /// Requests to send per client
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: usize,

    /// Cost of each request (token bucket only)
    #[arg(long, default_value_t = 1.0)]
    cost: f64,

    /// Pause between rounds of requests, in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Print decisions as JSON
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::FixedWindow => Algorithm::FixedWindow,
            AlgorithmArg::SlidingWindow => Algorithm::SlidingWindow,
            AlgorithmArg::TokenBucket => Algorithm::TokenBucket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// One admission decision, as reported to the user.
#[derive(Debug, Serialize)]
struct Decision {
    client_id: String,
    request: usize,
    allowed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(algorithm) = cli.algorithm {
        let algorithm = Algorithm::from(algorithm);
        if algorithm != config.limiter.algorithm {
            config.limiter.algorithm = algorithm;
            config.limiter.rules = None;
        }
    }
    config.validate()?;
    info!(algorithm = %config.limiter.algorithm, "Configuration loaded");

    let limiter = RateLimiter::from_config(&config.limiter)?;

    let sweeper = config.sweep.enabled.then(|| {
        Sweeper::new(limiter.store().clone(), Arc::new(SystemClock), &config.sweep).spawn()
    });

    let decisions = tokio::select! {
        decisions = simulate(&limiter, &cli) => Some(decisions?),
        _ = shutdown_signal() => None,
    };

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    match decisions {
        Some(decisions) => report(&decisions, cli.json)?,
        None => warn!("Interrupted before all requests were sent"),
    }

    info!(clients = limiter.store().len(), "Turnstile stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.with_thread_ids(true).init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Send `cli.requests` rounds of one request per client.
async fn simulate(limiter: &RateLimiter, cli: &Cli) -> turnstile::error::Result<Vec<Decision>> {
    let mut decisions = Vec::with_capacity(cli.requests * cli.clients.len());

    for request in 1..=cli.requests {
        for client_id in &cli.clients {
            let allowed = limiter.check(client_id, cli.cost)?;
            decisions.push(Decision {
                client_id: client_id.clone(),
                request,
                allowed,
            });
        }

        if cli.interval_ms > 0 && request < cli.requests {
            tokio::time::sleep(Duration::from_millis(cli.interval_ms)).await;
        }
    }

    Ok(decisions)
}

fn report(decisions: &[Decision], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(decisions)?);
        return Ok(());
    }

    for decision in decisions {
        let verdict = if decision.allowed { "allowed" } else { "throttled" };
        println!("{} #{}: {}", decision.client_id, decision.request, verdict);
    }
    let allowed = decisions.iter().filter(|d| d.allowed).count();
    println!("{} of {} requests allowed", allowed, decisions.len());
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping");
        }
    }
}
