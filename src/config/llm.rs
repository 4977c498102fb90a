// src/config/llm.rs
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which chat-completion backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Groq (or any OpenAI-compatible endpoint at `base_url`).
    Groq,
    /// Deterministic local replies; selected with `AI_TEST_MODE=mock`.
    Mock,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Resolve from a variable lookup (process env in production).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = if lookup("AI_TEST_MODE").is_some_and(|v| v.trim() == "mock") {
            ProviderKind::Mock
        } else {
            ProviderKind::Groq
        };

        let api_key = lookup("GROQ_API_KEY")
            .map(|k| k.trim().to_string())
            .unwrap_or_default();
        if provider == ProviderKind::Groq && api_key.is_empty() {
            anyhow::bail!("GROQ_API_KEY is required to call the Groq API");
        }

        let model = lookup("GROQ_MODEL")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = lookup("GROQ_BASE_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("GROQ_BASE_URL must be an http(s) URL, got `{base_url}`");
        }

        let timeout_secs = match lookup("GROQ_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| anyhow::anyhow!("GROQ_TIMEOUT_SECS must be a positive integer"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            provider,
            api_key,
            model,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
