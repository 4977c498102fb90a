//! HealthMate backend: binary entrypoint.
//! Boots the Axum HTTP server on Shuttle: config, logging, shared state, routes.

use healthmate::config::{AppConfig, AppEnv};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// JSON logs in production, compact logs elsewhere. `RUST_LOG` overrides the filter.
fn init_tracing(env: AppEnv) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("healthmate=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if env == AppEnv::Production {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    // Shuttle may already have installed a subscriber.
    if res.is_err() {
        tracing::debug!("tracing subscriber already set");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env()?;
    init_tracing(config.env);
    tracing::info!(
        env = %config.env,
        model = %config.llm.model,
        frontend_origin = %config.frontend_origin,
        chat_log = %config.chat_log_path.display(),
        "starting HealthMate backend"
    );

    let router = healthmate::app(config)?;
    Ok(router.into())
}
