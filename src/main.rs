use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wxrecall::client::{DEFAULT_BASE_URL, DEFAULT_RELAY_URL};
use wxrecall::config::{DashboardConfig, FetchPolicy};
use wxrecall::models::AppState;
use wxrecall::orchestrator::FetchOrchestrator;
use wxrecall::routes::create_router;
use wxrecall::scheduler::{run_once, ContinuousRunner};

#[derive(Parser, Debug)]
#[command(name = "wxrecall")]
#[command(about = "Aviation weather scraper and dashboard backend")]
struct Args {
    /// Primary airport ICAO code
    #[arg(long, env = "WXRECALL_PRIMARY_SITE", default_value = "CYYT")]
    primary_site: String,

    /// Additional airports, comma separated
    #[arg(long, env = "WXRECALL_SITES", value_delimiter = ',')]
    sites: Vec<String>,

    /// Alpha products to fetch, comma separated
    #[arg(long, env = "WXRECALL_ALPHA", value_delimiter = ',', default_value = "metar,taf")]
    alpha: Vec<String>,

    /// Image products to fetch, comma separated
    #[arg(long, env = "WXRECALL_IMAGE", value_delimiter = ',', default_value = "GFA/CLDWX,GFA/TURBC")]
    image: Vec<String>,

    /// Seconds between runs in continuous mode
    #[arg(long, env = "WXRECALL_INTERVAL", default_value = "300")]
    interval: u64,

    /// Milliseconds to wait after each request
    #[arg(long, env = "WXRECALL_REQUEST_DELAY", default_value = "500")]
    request_delay: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "WXRECALL_REQUEST_TIMEOUT", default_value = "30")]
    request_timeout: u64,

    /// How items of one site are scheduled
    #[arg(long, env = "WXRECALL_POLICY", value_enum, default_value_t = FetchPolicy::Sequential)]
    policy: FetchPolicy,

    /// Upstream base url
    #[arg(long, env = "WXRECALL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// CORS relay prefix, the encoded upstream url is appended to it
    #[arg(long, env = "WXRECALL_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    relay_url: String,

    /// Port for the api server
    #[arg(long, env = "WXRECALL_PORT", default_value = "3000")]
    port: u16,

    /// Start continuous fetching together with the server
    #[arg(long)]
    continuous: bool,

    /// Run a single fetch, print it as json and exit
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, env = "WXRECALL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as json
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn dashboard_config(&self) -> DashboardConfig {
        DashboardConfig {
            primary_site: self.primary_site.clone(),
            additional_sites: self.sites.clone(),
            interval: self.interval,
            request_delay: self.request_delay,
            request_timeout: self.request_timeout,
            policy: self.policy,
            base_url: self.base_url.clone(),
            relay_url: self.relay_url.clone(),
            alpha_types: self.alpha.clone(),
            image_types: self.image.clone(),
        }
    }
}

fn init_tracing(args: &Args) -> Result<()> {
    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let config = args.dashboard_config();
    config.validate().context("invalid configuration")?;

    info!(
        sites = ?config.sites(),
        policy = ?config.policy,
        request_delay_ms = config.request_delay,
        "Starting wxrecall"
    );

    let orchestrator =
        FetchOrchestrator::from_config(&config).context("failed to build the http client")?;
    let state = Arc::new(AppState::new(config, orchestrator));

    if args.once {
        let requests = state.config.site_requests();
        let entry = run_once(&state.orchestrator, &state.session, &requests).await;
        let stats = entry.stats();
        info!(
            total = stats.total,
            successful = stats.successful,
            failed = stats.failed,
            data_points = stats.data_points,
            "Single fetch complete"
        );
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    if args.continuous {
        let runner = ContinuousRunner::start(
            state.orchestrator.clone(),
            state.session.clone(),
            state.config.site_requests(),
            state.config.interval(),
        );
        *state.continuous.lock().await = Some(runner);
    }

    let app = create_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;

    if let Some(runner) = state.continuous.lock().await.take() {
        runner.stop_and_wait().await;
    }

    Ok(())
}
