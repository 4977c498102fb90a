// src/chat/mod.rs
//! Chat request contract: validation, the HealthMate system prompt and the
//! per-turn analytics projection.

pub mod provider;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::TurnMetrics;
use crate::error::ValidationDetails;

pub use provider::{build_provider, ChatProvider, Completion, GroqProvider, MockProvider, Usage};

/// Messages forwarded upstream per turn (after the system prompt).
pub const HISTORY_LIMIT: usize = 10;
pub const MAX_CONTENT_CHARS: usize = 2000;
pub const TEMPERATURE: f32 = 0.4;
pub const MAX_TOKENS: u32 = 768;

const MSG_EMPTY_CONTENT: &str = "Message content must include at least one character.";
const MSG_CONTENT_TOO_LONG: &str = "Message is too long. Try summarizing your question.";
const MSG_NO_MESSAGES: &str = "Please include at least one message in the conversation.";

pub const SYSTEM_PROMPT: &str = r#"You are HealthMate, an AI health companion that offers general guidance only.
- Always include a brief safety disclaimer that you are not a doctor.
- Encourage consulting licensed healthcare professionals for diagnosis and treatment.
- Structure your answers with concise sections:
  1. Summary of what you understood.
  2. Possible causes or factors (if relevant).
  3. Suggested next steps, self-care tips, and when to seek urgent care.
- Alert the user to seek emergency care immediately if you detect life-threatening symptoms (e.g., chest pain, difficulty breathing, severe bleeding, stroke symptoms).
- Keep the overall response under 180 words unless the user explicitly asks for more detail.
- Base each reply on the full conversation so far and acknowledge follow-up questions concisely.
- When the conversation begins (your first reply), open with exactly: "Hi, I'm HealthMate. Describe your symptoms or health concern and I'll share general guidance. I'm not a doctor, so always consult a healthcare professional for diagnosis or emergencies."
- If the user asks about topics unrelated to their health (e.g., math, puzzles, coding), firmly refuse to engage with that topic and reply verbatim with: "I'm happy to help with health-related questions, but HealthMate only provides general health guidance. Please share your symptoms or health concern so I can assist." Do not add additional information about solving the non-health request.
- Respect privacy: do not ask for identifying details beyond health-related context."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A validated conversation as posted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Validate a raw JSON body. Every problem is collected, not just the first.
    pub fn from_json(body: &Value) -> Result<Self, ValidationDetails> {
        let mut details = ValidationDetails::default();

        let Some(obj) = body.as_object() else {
            details
                .form_errors
                .push(format!("Expected object, received {}", json_type(body)));
            return Err(details);
        };

        let items = match obj.get("messages") {
            None => {
                details.push_field("messages", "Required");
                return Err(details);
            }
            Some(Value::Array(items)) => items,
            Some(other) => {
                details.push_field(
                    "messages",
                    format!("Expected array, received {}", json_type(other)),
                );
                return Err(details);
            }
        };

        if items.is_empty() {
            details.push_field("messages", MSG_NO_MESSAGES);
        }

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            match parse_message(item) {
                Ok(m) => messages.push(m),
                Err(errs) => {
                    for e in errs {
                        details.push_field("messages", e);
                    }
                }
            }
        }

        if details.is_empty() {
            Ok(Self { messages })
        } else {
            Err(details)
        }
    }

    /// The tail of the conversation that is actually sent upstream.
    pub fn forwarded(&self) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(HISTORY_LIMIT);
        &self.messages[start..]
    }

    /// System prompt followed by the forwarded tail.
    pub fn prompt(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(HISTORY_LIMIT + 1);
        out.push(ChatMessage {
            role: ChatRole::System,
            content: SYSTEM_PROMPT.to_string(),
        });
        out.extend(self.forwarded().iter().cloned());
        out
    }

    /// Analytics input for a completed turn. Only forwarded user messages count.
    pub fn turn_metrics(&self, completion: &Completion, response_time_ms: u64) -> TurnMetrics {
        let user_messages: Vec<String> = self
            .forwarded()
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .collect();
        let usage = completion.usage.as_ref();
        TurnMetrics {
            user_message_count: user_messages.len() as u64,
            user_messages,
            prompt_tokens: usage.and_then(|u| u.prompt_tokens),
            completion_tokens: usage.and_then(|u| u.completion_tokens),
            response_time_ms,
        }
    }
}

fn parse_message(item: &Value) -> Result<ChatMessage, Vec<String>> {
    let Some(obj) = item.as_object() else {
        return Err(vec![format!("Expected object, received {}", json_type(item))]);
    };
    let mut errs = Vec::new();

    let role = match obj.get("role") {
        Some(Value::String(s)) if s == "user" => Some(ChatRole::User),
        Some(Value::String(s)) if s == "assistant" => Some(ChatRole::Assistant),
        Some(Value::String(s)) => {
            errs.push(format!(
                "Invalid enum value. Expected 'user' | 'assistant', received '{s}'"
            ));
            None
        }
        Some(other) => {
            errs.push(format!("Expected string, received {}", json_type(other)));
            None
        }
        None => {
            errs.push("Required".to_string());
            None
        }
    };

    let content = match obj.get("content") {
        Some(Value::String(s)) => {
            let n = s.chars().count();
            if n < 1 {
                errs.push(MSG_EMPTY_CONTENT.to_string());
            } else if n > MAX_CONTENT_CHARS {
                errs.push(MSG_CONTENT_TOO_LONG.to_string());
            }
            Some(s.clone())
        }
        Some(other) => {
            errs.push(format!("Expected string, received {}", json_type(other)));
            None
        }
        None => {
            errs.push("Required".to_string());
            None
        }
    };

    match (role, content) {
        (Some(role), Some(content)) if errs.is_empty() => Ok(ChatMessage { role, content }),
        _ => Err(errs),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Successful `POST /api/chat` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub model: String,
    pub usage: Option<Usage>,
}
