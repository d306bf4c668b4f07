//! Telegram Bot API message delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, DeliveryError, Result};
use crate::models::{ActionButton, OutgoingMessage, TelegramConfig};
use crate::services::MessageSender;

/// Error descriptions meaning the chat will never accept messages again.
const REVOKED_MARKERS: &[&str] = &[
    "bot was blocked by the user",
    "user is deactivated",
    "bot was kicked",
    "chat not found",
];

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: &'a [Vec<ActionButton>],
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages through the Bot API `sendMessage` method.
///
/// Constructed once at startup and shared by reference; the HTTP client is
/// dropped with it.
pub struct TelegramSender {
    client: Client,
    endpoint: String,
    parse_mode: String,
}

impl TelegramSender {
    pub fn new(config: &TelegramConfig, client: Client) -> Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::config("telegram.bot_token is not set"))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                token
            ),
            parse_mode: config.parse_mode.clone(),
        })
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> std::result::Result<(), DeliveryError> {
        let body = SendMessageRequest {
            chat_id,
            text: &message.text,
            parse_mode: &self.parse_mode,
            reply_markup: message.has_actions().then(|| InlineKeyboardMarkup {
                inline_keyboard: &message.actions,
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::other(e.to_string()))?;

        let status = response.status();
        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::other(format!("HTTP {status}: {e}")))?;

        if api.ok {
            return Ok(());
        }
        Err(classify_failure(api.error_code, api.description.as_deref()))
    }
}

/// Map a Bot API failure to a delivery error.
fn classify_failure(error_code: Option<u16>, description: Option<&str>) -> DeliveryError {
    let description = description.unwrap_or("unknown Bot API error");
    let lowered = description.to_lowercase();
    if error_code == Some(403) || REVOKED_MARKERS.iter().any(|m| lowered.contains(m)) {
        DeliveryError::revoked(description)
    } else {
        DeliveryError::other(format!(
            "{} ({})",
            description,
            error_code.map_or_else(|| "no code".to_string(), |c| c.to_string())
        ))
    }
}
