// src/metrics.rs
//! Prometheus exposition of chat-turn counters.

use std::sync::Mutex;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::chat::Usage;

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder once per process; later calls share it.
    pub fn init() -> anyhow::Result<Self> {
        let mut slot = HANDLE.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = slot.as_ref() {
            return Ok(Self {
                handle: handle.clone(),
            });
        }
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        *slot = Some(handle.clone());
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

pub fn record_success(response_time_ms: u64, usage: Option<&Usage>) {
    counter!("chat_requests_total", "status" => "success").increment(1);
    histogram!("chat_response_time_ms").record(response_time_ms as f64);
    let Some(u) = usage else { return };
    if let Some(n) = u.prompt_tokens {
        counter!("chat_tokens_total", "kind" => "prompt").increment(n);
    }
    if let Some(n) = u.completion_tokens {
        counter!("chat_tokens_total", "kind" => "completion").increment(n);
    }
}

pub fn record_failure() {
    counter!("chat_requests_total", "status" => "failure").increment(1);
}
