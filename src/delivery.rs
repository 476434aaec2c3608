use std::path::PathBuf;

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Reads `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` (a `.env` file loaded
    /// at startup counts). Delivery is off when neither is set.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        Self::from_values(
            std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            std::env::var("TELEGRAM_CHAT_ID").ok(),
        )
    }

    fn from_values(
        bot_token: Option<String>,
        chat_id: Option<String>,
    ) -> anyhow::Result<Option<Self>> {
        let bot_token = bot_token.filter(|value| !value.trim().is_empty());
        let chat_id = chat_id.filter(|value| !value.trim().is_empty());

        match (bot_token, chat_id) {
            (None, None) => Ok(None),
            (Some(bot_token), chat_id) => {
                let chat_id = chat_id.context("TELEGRAM_CHAT_ID must be set with TELEGRAM_BOT_TOKEN")?;
                Ok(Some(TelegramConfig { bot_token, chat_id }))
            }
            (None, Some(_)) => {
                anyhow::bail!("TELEGRAM_BOT_TOKEN must be set with TELEGRAM_CHAT_ID")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Document,
}

/// A published file to send to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub path: PathBuf,
    pub caption: String,
    pub mime: &'static str,
}

impl Attachment {
    pub fn photo(path: PathBuf, caption: &str) -> Self {
        Attachment {
            kind: AttachmentKind::Photo,
            path,
            caption: caption.to_string(),
            mime: "image/png",
        }
    }

    pub fn document(path: PathBuf, caption: &str) -> Self {
        Attachment {
            kind: AttachmentKind::Document,
            path,
            caption: caption.to_string(),
            mime: "text/markdown",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramSink {
    client: reqwest::Client,
    config: TelegramConfig,
    api_base: String,
}

impl TelegramSink {
    pub fn new(client: reqwest::Client, config: TelegramConfig) -> Self {
        TelegramSink {
            client,
            config,
            api_base: TELEGRAM_API.to_string(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.bot_token, method)
    }

    /// Uploads one file with `method` (e.g. `sendPhoto`) under form field `field`.
    async fn upload(
        &self,
        method: &str,
        field: &'static str,
        attachment: &Attachment,
    ) -> PipelineResult<()> {
        let file_name = attachment
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = tokio::fs::read(&attachment.path).await?;
        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(attachment.mime)?;
        let form = Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", attachment.caption.clone())
            .part(field, part);

        let response: TelegramResponse = self
            .client
            .post(self.endpoint(method))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(PipelineError::Delivery(format!(
                "{}: {}",
                file_name,
                response
                    .description
                    .unwrap_or_else(|| "rejected by Telegram".to_string())
            )));
        }

        info!(file = %file_name, method, "delivered attachment");
        Ok(())
    }

    pub async fn send(&self, attachment: &Attachment) -> PipelineResult<()> {
        match attachment.kind {
            AttachmentKind::Photo => self.upload("sendPhoto", "photo", attachment).await,
            AttachmentKind::Document => self.upload("sendDocument", "document", attachment).await,
        }
    }

    /// Sends attachments one at a time, in order, stopping at the first failure.
    pub async fn send_all(&self, attachments: &[Attachment]) -> PipelineResult<usize> {
        for attachment in attachments {
            self.send(attachment).await?;
        }
        Ok(attachments.len())
    }
}
