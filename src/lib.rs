// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analytics;
pub mod api;
pub mod chat;
pub mod chat_log;
pub mod classifier;
pub mod config;
pub mod error;
pub mod metrics;
pub mod taxonomy;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub use crate::api::{create_router, AppState};
pub use crate::config::AppConfig;

/// Wire taxonomy, analytics, provider, audit log and metrics from configuration.
pub fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let taxonomy = taxonomy::Taxonomy::load(config.taxonomy_path.as_deref())
        .context("loading concern/condition taxonomy")?;
    info!(
        concerns = taxonomy.concerns().len(),
        conditions = taxonomy.conditions().len(),
        "taxonomy loaded"
    );
    let provider = chat::build_provider(&config.llm)?;
    let metrics = match metrics::Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "prometheus recorder unavailable, /metrics disabled");
            None
        }
    };

    Ok(AppState {
        analytics: analytics::Analytics::new(Arc::new(taxonomy)),
        provider,
        chat_log: Arc::new(chat_log::ChatLogStore::new(config.chat_log_path.clone())),
        metrics,
        config: Arc::new(config),
    })
}

/// Build the complete HTTP application for `config`.
pub fn app(config: AppConfig) -> anyhow::Result<axum::Router> {
    create_router(build_state(config)?)
}
