// src/chat/provider.rs
//! Chat-completion providers: Groq (OpenAI-compatible HTTP) and a deterministic mock.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatRole, MAX_TOKENS, TEMPERATURE};
use crate::config::{LlmConfig, ProviderKind};
use crate::error::ChatError;

const USER_AGENT: &str = concat!("healthmate/", env!("CARGO_PKG_VERSION"));

/// Token accounting as reported by the provider. Missing or `null` counts stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// One provider answer. `reply` is untrimmed; callers decide what counts as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub reply: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one completion over `messages` (system prompt included).
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ChatError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynChatProvider = Arc<dyn ChatProvider>;

/// Build the provider selected by configuration.
pub fn build_provider(cfg: &LlmConfig) -> anyhow::Result<DynChatProvider> {
    match cfg.provider {
        ProviderKind::Mock => {
            tracing::info!(model = %cfg.model, "AI_TEST_MODE=mock, using mock chat provider");
            Ok(Arc::new(MockProvider::new(cfg.model.clone())))
        }
        ProviderKind::Groq => Ok(Arc::new(GroqProvider::new(cfg)?)),
    }
}

// ------------------------------------------------------------
// Groq
// ------------------------------------------------------------

pub struct GroqProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GroqProvider {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(cfg.timeout)
            .build()
            .context("building HTTP client for chat provider")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: format!("{}/chat/completions", cfg.base_url),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl ChatProvider for GroqProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ChatError> {
        let req = Req {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| Msg {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("{} status code (no body)", status.as_u16()));
            tracing::warn!(status = status.as_u16(), "chat provider returned an error status");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: Resp = resp.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(Completion {
            reply,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage: body.usage,
        })
    }

    fn name(&self) -> &'static str {
        "groq"
    }
}

// ------------------------------------------------------------
// Mock
// ------------------------------------------------------------

#[derive(Debug, Clone)]
enum MockBehavior {
    Canned,
    Fixed(String),
    Fail { status: u16, message: String },
}

/// Deterministic provider for tests and offline runs.
#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
    behavior: MockBehavior,
}

pub const MOCK_REPLY: &str = "Hi, I'm HealthMate. I'm not a doctor, so always consult a healthcare professional for diagnosis or emergencies. (mock reply)";

impl MockProvider {
    /// Always answers with [`MOCK_REPLY`].
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            behavior: MockBehavior::Canned,
        }
    }

    /// Always answers with `reply` (may be blank).
    pub fn with_reply(model: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            behavior: MockBehavior::Fixed(reply.into()),
        }
    }

    /// Always fails as if the upstream API returned `status`.
    pub fn failing(model: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            behavior: MockBehavior::Fail {
                status,
                message: message.into(),
            },
        }
    }
}

// Whitespace word count stands in for a tokenizer.
fn rough_tokens(s: &str) -> u64 {
    s.split_whitespace().count() as u64
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, ChatError> {
        let reply = match &self.behavior {
            MockBehavior::Canned => MOCK_REPLY.to_string(),
            MockBehavior::Fixed(r) => r.clone(),
            MockBehavior::Fail { status, message } => {
                return Err(ChatError::Upstream {
                    status: *status,
                    message: message.clone(),
                })
            }
        };

        let prompt_tokens = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| rough_tokens(&m.content))
            .sum::<u64>();
        let completion_tokens = rough_tokens(&reply);

        Ok(Completion {
            reply,
            model: self.model.clone(),
            usage: Some(Usage {
                prompt_tokens: Some(prompt_tokens),
                completion_tokens: Some(completion_tokens),
                total_tokens: Some(prompt_tokens.saturating_add(completion_tokens)),
            }),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            content: text.into(),
        }
    }

    #[tokio::test]
    async fn mock_counts_words_outside_system_prompt() {
        let p = MockProvider::with_reply("m", "take rest");
        let msgs = vec![
            ChatMessage {
                role: ChatRole::System,
                content: "long system prompt here".into(),
            },
            user("I have a cough"),
        ];
        let c = p.complete(&msgs).await.unwrap();
        assert_eq!(c.reply, "take rest");
        assert_eq!(c.model, "m");
        assert_eq!(
            c.usage,
            Some(Usage {
                prompt_tokens: Some(4),
                completion_tokens: Some(2),
                total_tokens: Some(6)
            })
        );
    }

    #[tokio::test]
    async fn failing_mock_reports_upstream_status() {
        let p = MockProvider::failing("m", 401, "Invalid API Key");
        let err = p.complete(&[user("hi")]).await.unwrap_err();
        assert!(matches!(err, ChatError::Upstream { status: 401, .. }));
        assert_eq!(p.name(), "mock");
    }

    #[test]
    fn groq_response_decodes_with_missing_fields() {
        let body: Resp = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
        )
        .unwrap();
        assert!(body.model.is_none());
        assert!(body.usage.is_none());
        assert!(body.choices[0].message.content.is_none());
    }

    #[test]
    fn null_usage_counts_do_not_fail_the_completion() {
        let body: Resp = serde_json::from_str(
            r#"{"model":"llama-3.1-8b-instant",
                "choices":[{"message":{"role":"assistant","content":"Rest and fluids."}}],
                "usage":{"prompt_tokens":null,"completion_tokens":12}}"#,
        )
        .unwrap();
        assert_eq!(
            body.usage,
            Some(Usage {
                prompt_tokens: None,
                completion_tokens: Some(12),
                total_tokens: None
            })
        );
    }

    #[test]
    fn build_provider_honours_mock_mode() {
        let cfg = LlmConfig {
            provider: ProviderKind::Mock,
            api_key: String::new(),
            model: "llama-3.1-8b-instant".into(),
            base_url: "https://api.groq.com/openai/v1".into(),
            timeout: std::time::Duration::from_secs(5),
        };
        let p = build_provider(&cfg).unwrap();
        assert_eq!(p.name(), "mock");
    }
}
