use crate::cache::{CacheSnapshot, CacheStore};
use crate::normalize::HotelRecord;
use crate::prompt::build_system_prompt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const HISTORY_LIMIT: usize = 10;
pub const FALLBACK_MESSAGE_CHARS: usize = 200;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_COMPLETION_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub message: String,
    pub hotels: Vec<String>,
    pub map_action: Option<MapAction>,
}

// Only `message` is required. Null or misshapen `hotels` and `mapAction` are dropped.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    message: String,
    #[serde(default)]
    hotels: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    map_action: Option<serde_json::Value>,
}

impl From<RawReply> for AssistantReply {
    fn from(raw: RawReply) -> Self {
        let hotels = raw
            .hotels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|slug| match slug {
                serde_json::Value::String(slug) => Some(slug),
                _ => None,
            })
            .collect();
        let map_action = raw
            .map_action
            .and_then(|value| serde_json::from_value::<MapAction>(value).ok());
        Self {
            message: raw.message,
            hotels,
            map_action,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Parsed(AssistantReply),
    Fallback(String),
}

impl ParsedReply {
    pub fn into_reply(self) -> AssistantReply {
        match self {
            ParsedReply::Parsed(reply) => reply,
            ParsedReply::Fallback(raw) => AssistantReply {
                message: raw.chars().take(FALLBACK_MESSAGE_CHARS).collect(),
                hotels: Vec::new(),
                map_action: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("ANTHROPIC_API_KEY is not configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat api failure ({status}): {message}")]
    Upstream { status: StatusCode, message: String },
}

pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

pub struct ChatOutcome {
    pub reply: AssistantReply,
    pub hotels: Vec<HotelRecord>,
    pub usage: Usage,
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Arc<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ChatClient {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: Arc::new(api_key.to_string()),
        })
    }

    pub async fn complete(&self, system: &str, turns: &[ChatTurn]) -> Result<Completion, ChatError> {
        let payload = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_COMPLETION_TOKENS,
            system,
            messages: turns,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(ChatError::Upstream { status, message });
        }

        let body: MessagesResponse = response.json().await?;
        let text = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(Completion {
            text,
            usage: body.usage,
        })
    }
}

pub struct ChatGateway {
    cache: Arc<CacheStore>,
    client: Option<ChatClient>,
}

impl ChatGateway {
    pub fn new(cache: Arc<CacheStore>, client: Option<ChatClient>) -> Self {
        Self { cache, client }
    }

    pub async fn chat(&self, message: &str, history: Vec<ChatTurn>) -> Result<ChatOutcome, ChatError> {
        let client = self.client.as_ref().ok_or(ChatError::NotConfigured)?;

        if self.cache.has_source() && self.cache.is_stale() {
            // A failed refresh is already logged; answer from whatever is cached.
            let _ = self.cache.refresh().await;
        }
        let snapshot = self.cache.snapshot();

        let system_prompt = build_system_prompt(&snapshot.visible);
        let turns = prepare_turns(history, message);
        let completion = client.complete(&system_prompt, &turns).await?;

        let reply = match parse_assistant_reply(&completion.text) {
            ParsedReply::Parsed(reply) => reply,
            fallback @ ParsedReply::Fallback(_) => {
                warn!(
                    target: "chat",
                    chars = completion.text.chars().count(),
                    msg = "model reply was not valid JSON; using raw text"
                );
                fallback.into_reply()
            }
        };
        let hotels = resolve_hotels(&snapshot, &reply.hotels);
        info!(
            target: "chat",
            referenced = reply.hotels.len(),
            resolved = hotels.len(),
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            msg = "chat reply ready"
        );

        Ok(ChatOutcome {
            reply,
            hotels,
            usage: completion.usage,
        })
    }
}

pub fn prepare_turns(mut history: Vec<ChatTurn>, message: &str) -> Vec<ChatTurn> {
    if history.len() > HISTORY_LIMIT {
        history.drain(..history.len() - HISTORY_LIMIT);
    }
    history.push(ChatTurn {
        role: Role::User,
        content: message.to_string(),
    });
    history
}

pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

pub fn parse_assistant_reply(raw: &str) -> ParsedReply {
    match serde_json::from_str::<RawReply>(strip_code_fence(raw)) {
        Ok(reply) => ParsedReply::Parsed(reply.into()),
        Err(_) => ParsedReply::Fallback(raw.to_string()),
    }
}

pub fn resolve_hotels(snapshot: &CacheSnapshot, slugs: &[String]) -> Vec<HotelRecord> {
    slugs
        .iter()
        .filter_map(|slug| snapshot.find_hotel(slug).cloned())
        .collect()
}
