//! Downstream (client-facing) wire types.
//!
//! Request field names follow the web client's existing payloads
//! (`chat_history`, `chat_model`, `chat_id`, ...).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_message: String,
    #[serde(alias = "assistant_message")]
    pub ai_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    #[serde(rename = "chat_history", default)]
    pub history: Vec<ConversationTurn>,
    #[serde(rename = "chat_model", default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(rename = "chat_id", default, skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
    #[serde(rename = "regenerate_message", default, deserialize_with = "null_as_false")]
    pub regenerate: bool,
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    Stream,
    Error,
}

/// One server-sent event on the chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event: StreamEventKind,
    pub data: String,
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(rename = "exchangeId", default, skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
}

impl StreamEvent {
    pub fn fragment(text: impl Into<String>) -> Self {
        Self {
            event: StreamEventKind::Stream,
            data: text.into(),
            is_final: false,
            exchange_id: None,
        }
    }

    pub fn done(exchange_id: impl Into<String>) -> Self {
        Self {
            event: StreamEventKind::Stream,
            data: String::new(),
            is_final: true,
            exchange_id: Some(exchange_id.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event: StreamEventKind::Error,
            data: message.into(),
            is_final: true,
            exchange_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleResponse {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_token_length: i64,
    pub output_token_length: i64,
    /// Cost in USD.
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub chat_id: String,
    pub chat_title: Option<String>,
    pub chat_model: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEntryView {
    pub user_message: String,
    pub ai_message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub regenerate_message: bool,
    pub model: String,
    pub stats: UsageStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationsResponse {
    pub generations_left: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub family: String,
    pub vendor: String,
    pub premium: bool,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_match_web_client() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"user_input":"hi","chat_history":[],"regenerate_message":null}"#)
                .unwrap();
        assert_eq!(req.model, DEFAULT_CHAT_MODEL);
        assert_eq!(req.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(req.exchange_id, None);
        assert!(!req.regenerate);
    }

    #[test]
    fn final_event_carries_exchange_id() {
        let value = serde_json::to_value(StreamEvent::done("abc")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "stream", "data": "", "final": true, "exchangeId": "abc"})
        );
        let value = serde_json::to_value(StreamEvent::fragment("x")).unwrap();
        assert_eq!(value.get("exchangeId"), None);
        assert_eq!(value["final"], false);
    }
}
