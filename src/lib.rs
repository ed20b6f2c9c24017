pub mod api;
pub mod cli;
pub mod client;
pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
use clap::Parser;
use cli::{CacheCommands, Cli, Commands, ConfigCommands};
pub use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use services::MidnightRefresh;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `config init` must work before a valid config exists.
    if let Some(Commands::Config {
        command: ConfigCommands::Init,
    }) = cli.command
    {
        return cli::commands::cmd_config_init();
    }

    let config = Config::load()?;
    config.validate()?;

    init_logging(&config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let prometheus_handle = init_metrics(&config)?;
            run_server(config, prometheus_handle).await
        }
        Commands::Check => cli::commands::cmd_check(&config).await,
        Commands::Reschedule => cli::commands::cmd_reschedule(config).await,
        Commands::Cache {
            command: CacheCommands::Clear,
        } => cli::commands::cmd_cache_clear(&config).await,
        Commands::Config {
            command: ConfigCommands::Init,
        } => cli::commands::cmd_config_init(),
    }
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let (plain_layer, json_layer) = if config.general.json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "futurebot")?
            .extra_field("deployment", format!("{:?}", config.server.deployment).to_lowercase())?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

fn init_metrics(config: &Config) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.observability.metrics_enabled {
        return Ok(None);
    }

    use metrics_exporter_prometheus::PrometheusBuilder;
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");
    Ok(Some(handle))
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "FutureBot v{} starting ({:?} deployment)...",
        env!("CARGO_PKG_VERSION"),
        config.server.deployment
    );

    let port = config.server.port;
    let notification_config = config.notifications.clone();

    let shared = Arc::new(SharedState::new(config).await?);

    let midnight = MidnightRefresh::new(
        notification_config,
        shared.event_bus.clone(),
        shared.rescheduler.clone(),
    );
    midnight.start().await?;

    let api_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(api_state).await;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let server_handle = tokio::spawn(async move {
        info!("Gateway running at http://{}", addr);
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server error: {}", e);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    midnight.stop().await;
    server_handle.abort();
    info!("Gateway stopped");

    Ok(())
}
