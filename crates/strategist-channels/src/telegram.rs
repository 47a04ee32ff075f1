use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use strategist_core::config::TelegramConfig;
use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::Notifier;
use strategist_core::types::{Notification, RenderMode};

use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};

use crate::util::{split_message, with_severity};

const TELEGRAM_MAX_LEN: usize = 4096;

/// Sends notifications through a Telegram bot.
pub struct TelegramNotifier {
    bot: Bot,
    default_chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            default_chat_id: config.default_chat_id.clone(),
        }
    }
}

fn channel_error(message: impl Into<String>) -> StrategistError {
    StrategistError::Notify {
        channel: "telegram".into(),
        message: message.into(),
    }
}

/// Numeric ids address chats directly; anything else is a `@channel` username.
fn parse_recipient(chat_id: &str) -> Recipient {
    match chat_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => {
            let name = chat_id.trim();
            if name.starts_with('@') {
                Recipient::ChannelUsername(name.to_string())
            } else {
                Recipient::ChannelUsername(format!("@{}", name))
            }
        }
    }
}

fn parse_mode(mode: RenderMode) -> Option<ParseMode> {
    match mode {
        RenderMode::Plain => None,
        RenderMode::Markdown => Some(ParseMode::MarkdownV2),
        RenderMode::Html => Some(ParseMode::Html),
    }
}

/// Telegram rejects markup it cannot parse with "can't parse entities".
fn is_markup_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("can't parse entities") || message.contains("can't find end of")
}

impl TelegramNotifier {
    /// Send one chunk, retrying as plain text when the markup is rejected.
    async fn send_chunk(
        &self,
        recipient: &Recipient,
        chunk: String,
        mode: Option<ParseMode>,
    ) -> Result<i32> {
        let Some(mode) = mode else {
            let message = self
                .bot
                .send_message(recipient.clone(), chunk)
                .await
                .map_err(|e| channel_error(e.to_string()))?;
            return Ok(message.id.0);
        };

        match self
            .bot
            .send_message(recipient.clone(), chunk.clone())
            .parse_mode(mode)
            .await
        {
            Ok(message) => Ok(message.id.0),
            Err(e) if is_markup_error(&e.to_string()) => {
                warn!(error = %e, "Telegram rejected markup, resending as plain text");
                let message = self
                    .bot
                    .send_message(recipient.clone(), chunk)
                    .await
                    .map_err(|e| channel_error(e.to_string()))?;
                Ok(message.id.0)
            }
            Err(e) => Err(channel_error(e.to_string())),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let chat_id = notification
                .chat_id
                .clone()
                .filter(|c| !c.trim().is_empty())
                .or_else(|| self.default_chat_id.clone())
                .ok_or_else(|| channel_error("No chat id given and no default configured"))?;

            let recipient = parse_recipient(&chat_id);
            let text = with_severity(notification.severity, &notification.text);
            let mode = parse_mode(notification.render_mode);

            if text.trim().is_empty() {
                warn!(chat = %chat_id, "Empty notification text, nothing sent");
                return Ok(String::new());
            }

            let mut first_id = None;
            for chunk in split_message(&text, TELEGRAM_MAX_LEN) {
                let id = self.send_chunk(&recipient, chunk, mode).await?;
                debug!(chat = %chat_id, message_id = id, "Telegram chunk sent");
                first_id.get_or_insert(id);
            }

            let message_id = first_id.map(|id| id.to_string()).unwrap_or_default();
            info!(chat = %chat_id, message_id = %message_id, "Telegram notification sent");
            Ok(message_id)
        })
    }
}
