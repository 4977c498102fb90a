// src/config/mod.rs
//! Startup configuration read from the process environment (after `.env`).
//!
//! Every loader takes a lookup function so tests can supply variables without
//! touching the real environment.

pub mod llm;

use std::fmt;
use std::path::PathBuf;

pub use llm::{LlmConfig, ProviderKind};

pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_CHAT_LOG_PATH: &str = "data/chat-logs.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            "production" | "prod" => Ok(AppEnv::Production),
            other => anyhow::bail!("APP_ENV must be development, test or production, got `{other}`"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Test => "test",
            AppEnv::Production => "production",
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: AppEnv,
    pub llm: LlmConfig,
    pub frontend_origin: String,
    pub chat_log_path: PathBuf,
    pub taxonomy_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
            Some(raw) if !raw.trim().is_empty() => AppEnv::parse(&raw)?,
            _ => AppEnv::Development,
        };

        let frontend_origin = non_empty(lookup("FRONTEND_ORIGIN"))
            .map(|o| o.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGIN.to_string());
        if !(frontend_origin.starts_with("http://") || frontend_origin.starts_with("https://")) {
            anyhow::bail!("FRONTEND_ORIGIN must be an http(s) URL, got `{frontend_origin}`");
        }

        Ok(Self {
            env,
            llm: LlmConfig::from_lookup(&lookup)?,
            frontend_origin,
            chat_log_path: non_empty(lookup("CHAT_LOG_PATH"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHAT_LOG_PATH)),
            taxonomy_path: non_empty(lookup("TAXONOMY_PATH")).map(PathBuf::from),
            static_dir: non_empty(lookup("STATIC_DIR")).map(PathBuf::from),
        })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
