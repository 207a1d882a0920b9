mod args;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use turnstile_core::{
    load_config, validate_config, AutomationSurface, Config, PurchaseError, PurchaseOrchestrator,
    PurchaseReport, SurfaceFactory, TracingReporter, WebDriverSurfaceFactory,
};
use turnstile_server::api::{create_router, WsBroadcaster};
use turnstile_server::state::AppState;

use args::{Cli, Commands};

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "TURNSTILE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "turnstile.toml";

/// How long shutdown waits for cancelled jobs to wind down
const JOB_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Run => purchase_once(config).await,
    }
}

/// Start the job service and block until shutdown.
async fn serve(config: Config) -> Result<()> {
    info!(
        "WebDriver endpoint: {} ({})",
        config.webdriver.url, config.webdriver.browser
    );
    let factory: Arc<dyn SurfaceFactory> =
        Arc::new(WebDriverSurfaceFactory::new(config.webdriver.clone()));

    let ws_broadcaster = WsBroadcaster::default();
    let state = Arc::new(AppState::new(config.clone(), factory, ws_broadcaster));
    let jobs = state.jobs().clone();

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let shutdown_jobs = jobs.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let cancelled = shutdown_jobs.cancel_all();
            info!("Shutting down, cancelled {} running jobs", cancelled);
        })
        .await
        .context("Server error")?;

    let drained = tokio::time::timeout(JOB_DRAIN_TIMEOUT, async {
        while jobs.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("{} jobs still running at exit", jobs.active_count());
    }

    info!("Server stopped");
    Ok(())
}

/// Execute the configured purchase once in this process.
async fn purchase_once(config: Config) -> Result<()> {
    let Some(request) = config.purchase.clone() else {
        bail!("No [purchase] section in the configuration");
    };

    let factory = WebDriverSurfaceFactory::new(config.webdriver.clone());
    let surface: Arc<dyn AutomationSurface> = Arc::from(
        factory
            .create()
            .await
            .context("Failed to start a browser session")?,
    );

    let orchestrator = PurchaseOrchestrator::new(
        config.orchestrator.clone(),
        config.storefront.clone(),
        Arc::clone(&surface),
        Arc::new(TracingReporter::new()),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping");
            trigger.cancel();
        }
    });

    match orchestrator.run(&request, cancel).await {
        Ok(report) => {
            println!("{}", success_banner(&report));
            if config.webdriver.keep_open_on_success {
                info!("Browser left open at {} to finish payment", report.location);
            } else {
                close_surface(surface.as_ref()).await;
            }
            Ok(())
        }
        Err(PurchaseError::Cancelled { attempts }) => {
            close_surface(surface.as_ref()).await;
            info!("Purchase cancelled after {} attempts", attempts);
            Ok(())
        }
        Err(e) => {
            close_surface(surface.as_ref()).await;
            Err(e).context("Purchase failed")
        }
    }
}

async fn close_surface(surface: &dyn AutomationSurface) {
    if let Err(e) = surface.close().await {
        warn!("Failed to close browser session: {}", e);
    }
}

fn success_banner(report: &PurchaseReport) -> String {
    let headline = format!(
        "Tickets for {} reached payment after {} attempt{}",
        report.category,
        report.attempts,
        if report.attempts == 1 { "" } else { "s" }
    );
    let rule = "=".repeat(headline.len());
    format!(
        "{rule}\n{headline}\nComplete the payment at {}\n{rule}",
        report.location
    )
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_success_banner() {
        let report = PurchaseReport {
            attempts: 3,
            category: "Floor".to_string(),
            location: "https://tickets.example.com/payment/42".to_string(),
            completed_at: Utc::now(),
        };
        let banner = success_banner(&report);
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "Tickets for Floor reached payment after 3 attempts");
        assert_eq!(lines[0].len(), lines[1].len());
        assert!(lines[2].ends_with("/payment/42"));
    }
}
