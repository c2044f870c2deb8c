//! WhatsApp Cloud API channel.
//!
//! Meta calls `GET /webhook` once to verify the subscription and then
//! `POST /webhook` for every event on the business number. Text messages
//! are answered through the same RAG chain as `/api/chat`, with the
//! sender's number as the session id; replies go out through
//! `POST {graph_url}/{phone_number_id}/messages`.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::WhatsAppConfig;
use crate::http::{self, Endpoint};

/// Sent instead of an answer when the RAG chain fails.
pub const APOLOGY: &str = "Sorry, I encountered an error processing your request.";

/// Longest text body the Cloud API accepts, in characters.
pub const MAX_TEXT_CHARS: usize = 4096;

/// A text message pulled out of a webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingText {
    /// Sender's phone number, in the form WhatsApp reports it.
    pub from: String,
    pub body: String,
}

/// First text message in a webhook payload, if there is one.
///
/// Status updates, reactions, media and anything else without a text body
/// yield `None`.
pub fn incoming_text(payload: &Value) -> Option<IncomingText> {
    let message = payload.pointer("/entry/0/changes/0/value/messages/0")?;
    let from = message.get("from")?.as_str()?.trim();
    let body = message.pointer("/text/body")?.as_str()?.trim();
    if from.is_empty() || body.is_empty() {
        return None;
    }
    Some(IncomingText {
        from: from.to_string(),
        body: body.to_string(),
    })
}

/// Cut `text` to the Cloud API limit on a character boundary.
pub fn clamp_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Verification handshake and outgoing messages.
pub struct WhatsAppClient {
    client: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            config: config.clone(),
        })
    }

    /// True when `mode` is `subscribe` and `token` matches the configured
    /// verify token. An unset verify token never matches.
    pub fn verify(&self, mode: &str, token: &str) -> bool {
        match http::api_key_from_env(&self.config.verify_token_env) {
            Some(expected) => mode == "subscribe" && token == expected,
            None => false,
        }
    }

    /// Send `body` as a text message to `to`.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let phone_number_id = self
            .config
            .phone_number_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("whatsapp.phone_number_id is not configured"))?;
        let token = http::api_key_from_env(&self.config.access_token_env).ok_or_else(|| {
            anyhow!("{} environment variable not set", self.config.access_token_env)
        })?;

        let endpoint = Endpoint {
            service: "WhatsApp",
            url: http::join_url(
                &self.config.graph_url,
                &format!("{}/messages", phone_number_id.trim()),
            ),
            bearer: Some(&token),
        };
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": clamp_text(body) },
        });
        http::post_json(&self.client, &endpoint, &payload, self.config.max_retries).await?;
        debug!(to, "whatsapp reply sent");
        Ok(())
    }
}
