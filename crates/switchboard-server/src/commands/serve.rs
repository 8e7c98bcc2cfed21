use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use switchboard::config::ServiceConfig;
use switchboard::providers::{OpenAiProvider, Provider};
use switchboard::session::SqliteSessionStore;
use switchboard::{CapabilityRegistry, Dispatcher};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::auth;
use crate::configuration::Settings;
use crate::logging;
use crate::routes;
use crate::slack::{SlackClient, SlackVerifier};
use crate::state::{AppState, SlackState};

pub async fn run(config_override: Option<PathBuf>, port_override: Option<u16>) -> Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::new().context("loading settings")?;
    if let Some(port) = port_override {
        settings.port = port;
    }
    let _log_guard = logging::setup_logging(settings.log_dir.as_deref())?;

    info!("starting switchboardd");

    let config_path = config_override.unwrap_or_else(|| settings.config_file.clone());
    let config = if config_path.exists() {
        ServiceConfig::load(&config_path)?
    } else {
        warn!(
            path = %config_path.display(),
            "no service config found, starting with defaults and no capabilities"
        );
        ServiceConfig::default()
    };

    let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::from_config(&config.provider)?);
    let store = Arc::new(SqliteSessionStore::new(&config.storage.path).await?);

    let registry = Arc::new(CapabilityRegistry::new(
        config.capabilities,
        Arc::clone(&provider),
        config.dispatch.invoke_timeout(),
    ));
    if let Err(error) = registry.start_all().await {
        // Keep serving with whatever came up; /status shows the failures.
        warn!(error = %error, "some capabilities failed to start");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&provider),
        Arc::clone(&registry),
        config.dispatch.max_rounds,
    ));

    let api_token = std::env::var("SWITCHBOARD_API_TOKEN").ok();
    if api_token.is_none() {
        warn!("SWITCHBOARD_API_TOKEN is not set, API requests will be refused");
    }

    let cancel = CancellationToken::new();
    let state = AppState::new(
        dispatcher,
        Arc::clone(&registry),
        store,
        slack_state()?,
        config.dispatch.history_limit,
        cancel.clone(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state)
        .layer(middleware::from_fn_with_state(api_token, auth::check_token))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.socket_addr()).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    cancel.cancel();
    if let Err(error) = registry.stop_all(settings.shutdown_grace()).await {
        warn!(error = %error, "some capabilities did not stop cleanly");
    }
    Ok(())
}

/// Slack wiring comes entirely from the environment. Without a signing secret
/// the events endpoint refuses everything; without a bot token events are
/// still processed but replies cannot be posted.
fn slack_state() -> Result<Option<Arc<SlackState>>> {
    let Ok(signing_secret) = std::env::var("SLACK_SIGNING_SECRET") else {
        warn!("SLACK_SIGNING_SECRET is not set, slack events will be refused");
        return Ok(None);
    };
    let client = match std::env::var("SLACK_BOT_TOKEN") {
        Ok(token) => Some(SlackClient::new(token)?),
        Err(_) => {
            warn!("SLACK_BOT_TOKEN is not set, slack replies cannot be posted");
            None
        }
    };
    Ok(Some(Arc::new(SlackState {
        verifier: SlackVerifier::new(signing_secret),
        client,
    })))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
