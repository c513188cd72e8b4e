use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DeliveryError, Notification, Transport};
use crate::storage::UserId;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// 400 descriptions that mean the chat itself is gone.
const GONE_CHAT_MARKERS: [&str; 3] = ["chat not found", "user is deactivated", "peer_id_invalid"];

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: UserId,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Delivers notifications through the Telegram Bot API `sendMessage` method.
pub struct TelegramTransport {
    client: reqwest::Client,
    api_url: String,
    token: SecretString,
    timeout: Duration,
}

impl TelegramTransport {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.token.expose_secret())
    }
}

/// Map a failed Bot API answer onto the delivery taxonomy.
///
/// 403 covers "bot was blocked by the user" and "bot was kicked". A 401
/// means our own token is bad, which says nothing about the recipient.
fn classify(status: StatusCode, description: &str) -> DeliveryError {
    let detail = format!("HTTP {}: {}", status.as_u16(), description);
    if status == StatusCode::FORBIDDEN {
        return DeliveryError::Permanent(detail);
    }
    if status == StatusCode::BAD_REQUEST {
        let lowered = description.to_lowercase();
        if GONE_CHAT_MARKERS.iter().any(|m| lowered.contains(m)) {
            return DeliveryError::Permanent(detail);
        }
    }
    DeliveryError::Transient(detail)
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, user: UserId, notification: &Notification) -> Result<(), DeliveryError> {
        let text = notification.to_string();
        let body = SendMessage {
            chat_id: user,
            text: &text,
            disable_web_page_preview: false,
        };

        // without_url(): the request URL embeds the bot token
        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(self.endpoint()).json(&body).send(),
        )
        .await
        .map_err(|_| DeliveryError::Transient("request timed out".into()))?
        .map_err(|e| DeliveryError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        let parsed = response.json::<ApiResponse>().await.ok();

        match parsed {
            Some(api) if status.is_success() && api.ok => Ok(()),
            Some(api) => Err(classify(status, api.description.as_deref().unwrap_or(""))),
            None => Err(classify(status, "unreadable response body")),
        }
    }
}
