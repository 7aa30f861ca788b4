//! Telegram chat transport over the Bot HTTP API.
//!
//! Long-polls `getUpdates`, hands every text message from an authorized
//! user to the [`Bot`] on its own task, and sends the reply back. `/randompg`
//! is answered with a generated character sheet instead.
//!
//! API endpoint: `https://api.telegram.org/bot<token>/<method>`

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::bot::{Bot, Command, ParseMode, Reply};
use crate::character::FORGING_NOTICE;
use crate::config::TelegramConfig;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, poll_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()?;
        Ok(Self {
            client,
            base_url: TELEGRAM_API_URL.to_string(),
            token: token.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Telegram {} request failed", method))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Telegram {} returned HTTP {} with an unreadable body", method, status))?;

        if !parsed.ok {
            bail!(
                "Telegram {} returned HTTP {}: {}",
                method,
                status,
                parsed.description.unwrap_or_default()
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow::anyhow!("Telegram {} returned no result", method))
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_typing(&self, chat_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "sendChatAction",
                &serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }

    /// Send `reply`. Markdown replies that Telegram rejects are resent as plain text.
    pub async fn send_reply(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        if reply.parse_mode == ParseMode::Markdown {
            let markdown = self
                .call::<serde_json::Value>(
                    "sendMessage",
                    &serde_json::json!({
                        "chat_id": chat_id,
                        "text": reply.text,
                        "parse_mode": "Markdown",
                    }),
                )
                .await;
            match markdown {
                Ok(_) => return Ok(()),
                Err(err) => {
                    tracing::debug!(error = %format!("{:#}", err), "Markdown reply rejected, resending as plain text");
                }
            }
        }

        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &serde_json::json!({ "chat_id": chat_id, "text": reply.text }),
            )
            .await?;
        Ok(())
    }
}

/// Poll for updates until the process is stopped.
pub async fn run_polling(client: TelegramClient, bot: Arc<Bot>, config: &TelegramConfig) -> Result<()> {
    let mut offset = 0i64;
    tracing::info!("Telegram polling started");

    loop {
        let updates = match client.get_updates(offset, config.poll_timeout_secs).await {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!(error = %format!("{:#}", err), "getUpdates failed, retrying");
                tokio::time::sleep(Duration::from_secs(3)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some((chat_id, text)) = accepted_text(&update, &bot) else {
                continue;
            };

            let client = client.clone();
            let bot = Arc::clone(&bot);
            tokio::spawn(async move {
                if let Err(err) = client.send_typing(chat_id).await {
                    tracing::debug!(error = %format!("{:#}", err), "sendChatAction failed");
                }
                let reply = match Command::parse(&text) {
                    Some(Command::RandomCharacter) => {
                        if let Err(err) = client.send_reply(chat_id, &Reply::plain(FORGING_NOTICE)).await {
                            tracing::debug!(error = %format!("{:#}", err), "failed to send notice");
                        }
                        bot.random_character().await
                    }
                    None => bot.handle(&text).await,
                };
                if let Err(err) = client.send_reply(chat_id, &reply).await {
                    tracing::error!(chat_id, error = %format!("{:#}", err), "failed to deliver reply");
                }
            });
        }
    }
}

/// The chat id and text of `update`, when it is a text message from an authorized user.
pub fn accepted_text(update: &Update, bot: &Bot) -> Option<(i64, String)> {
    let message = update.message.as_ref()?;
    let text = message.text.as_ref()?;
    let user_id = message.from.as_ref()?.id;
    if !bot.is_authorized(user_id) {
        tracing::debug!(user_id, "ignoring message from unauthorized user");
        return None;
    }
    Some((message.chat.id, text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::Assembler;
    use crate::llm::DisabledClient;
    use crate::walker::CorpusWalker;

    fn bot(authorized: Option<i64>) -> Bot {
        let assembler = Assembler::new(CorpusWalker::new("/nonexistent", "json"), 8000);
        Bot::new(assembler, Arc::new(DisabledClient), String::new(), authorized, 4000)
    }

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_text_update() {
        let u = update(
            r#"{"update_id": 10, "message": {"message_id": 1, "chat": {"id": 99, "type": "private"},
                "from": {"id": 5, "is_bot": false, "first_name": "A"}, "text": "spada"}}"#,
        );
        assert_eq!(accepted_text(&u, &bot(None)), Some((99, "spada".to_string())));
    }

    #[test]
    fn unauthorized_sender_is_ignored() {
        let u = update(
            r#"{"update_id": 10, "message": {"chat": {"id": 99}, "from": {"id": 5}, "text": "spada"}}"#,
        );
        assert_eq!(accepted_text(&u, &bot(Some(6))), None);
        assert!(accepted_text(&u, &bot(Some(5))).is_some());
    }

    #[test]
    fn non_text_updates_are_ignored() {
        let sticker = update(r#"{"update_id": 11, "message": {"chat": {"id": 1}, "from": {"id": 5}}}"#);
        let edited = update(r#"{"update_id": 12, "edited_message": {}}"#);
        assert_eq!(accepted_text(&sticker, &bot(None)), None);
        assert_eq!(accepted_text(&edited, &bot(None)), None);
    }

    #[test]
    fn method_urls() {
        let client = TelegramClient::new("123:abc", 30)
            .unwrap()
            .with_base_url("http://localhost:9/");
        assert_eq!(client.method_url("getUpdates"), "http://localhost:9/bot123:abc/getUpdates");
    }

    #[test]
    fn failed_call_without_result() {
        let parsed: ApiResponse<Vec<Update>> =
            serde_json::from_str(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }

    #[tokio::test]
    async fn transport_errors_keep_cause_but_not_token() {
        let client = TelegramClient::new("123:SECRET-TOKEN", 1)
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let err = client.get_updates(0, 0).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("Telegram getUpdates request failed: "));
        assert!(message.len() > "Telegram getUpdates request failed: ".len());
        assert!(!message.contains("SECRET-TOKEN"), "token leaked: {}", message);
        assert!(!format!("{:?}", err).contains("SECRET-TOKEN"));
    }
}
