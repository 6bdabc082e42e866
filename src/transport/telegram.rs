use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{Button, Inbound, Input, Transport};
use crate::error::TransportError;

/// Telegram Bot API over long polling.
pub struct TelegramTransport {
    base: String,
    http: Client,
    poll_timeout: Duration,
    next_offset: Mutex<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

impl TelegramTransport {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Unreachable(format!("building http client: {}", e)))?;

        Ok(Self {
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            http,
            poll_timeout,
            next_offset: Mutex::new(0),
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, TransportError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.without_url().to_string()))?;

        let status = resp.status();
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| TransportError::Unreachable(format!("{} response: {}", method, e)))?;

        if status.as_u16() == 429 {
            let retry_after = parsed
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs);
            return Err(TransportError::Throttled { retry_after });
        }
        if status.is_server_error() {
            return Err(TransportError::Unreachable(format!("{} returned {}", method, status)));
        }
        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => Err(TransportError::Rejected(
                parsed.description.unwrap_or_else(|| format!("{} returned {}", method, status)),
            )),
        }
    }
}

fn keyboard_json(buttons: &[Vec<Button>]) -> serde_json::Value {
    let rows: Vec<Vec<InlineButton<'_>>> = buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineButton {
                    text: &b.label,
                    callback_data: &b.data,
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn to_inbound(update: Update) -> Option<(Inbound, Option<String>)> {
    if let Some(cb) = update.callback_query {
        let chat = cb.message.as_ref().map(|m| m.chat.id).unwrap_or(cb.from.id);
        let data = cb.data?;
        return Some((
            Inbound {
                chat: chat.to_string(),
                user: Some(cb.from.id),
                input: Input::Button(data),
            },
            Some(cb.id),
        ));
    }
    let msg = update.message?;
    let text = msg.text?;
    Some((
        Inbound {
            chat: msg.chat.id.to_string(),
            user: msg.from.map(|u| u.id),
            input: Input::Text(text),
        },
        None,
    ))
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": chat,
            "text": text,
            "disable_web_page_preview": true,
        });
        if !buttons.is_empty() {
            body["reply_markup"] = keyboard_json(buttons);
        }
        let _: serde_json::Value = self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn receive_actions(&self) -> Result<Vec<Inbound>, TransportError> {
        let offset = *self.next_offset.lock();
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": self.poll_timeout.as_secs(),
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            *self.next_offset.lock() = last + 1;
        }

        let mut out = Vec::with_capacity(updates.len());
        for update in updates {
            let Some((inbound, callback_id)) = to_inbound(update) else {
                continue;
            };
            if let Some(id) = callback_id {
                // Clears the button spinner on the client; failure is harmless.
                if let Err(e) = self
                    .call::<bool>("answerCallbackQuery", json!({ "callback_query_id": id }))
                    .await
                {
                    debug!("answerCallbackQuery failed: {}", e);
                }
            }
            out.push(inbound);
        }
        if !out.is_empty() {
            debug!(count = out.len(), "received telegram updates");
        }
        Ok(out)
    }
}
