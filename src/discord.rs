use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::alerts::{AlertEvent, DispatchError, Notifier};
use crate::config::Discord;

const COLOR_RED: u32 = 15158332;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Posts unreachable-device alerts to a Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    discord: Discord,
}

impl DiscordNotifier {
    pub fn new(client: Client, discord: Discord) -> Self {
        Self { client, discord }
    }

    pub fn build_unreachable_embed(&self, event: &AlertEvent) -> Embed {
        Embed {
            title: Some("🔴 Device Unreachable".to_string()),
            description: Some(format!(
                "Device **{}** did not answer its reachability check",
                event.device_id
            )),
            color: Some(COLOR_RED),
            fields: vec![
                EmbedField {
                    name: "📟 Device".to_string(),
                    value: event.device_id.clone(),
                    inline: true,
                },
                EmbedField {
                    name: "🌐 Address".to_string(),
                    value: event.address.clone(),
                    inline: true,
                },
                EmbedField {
                    name: "❓ Reason".to_string(),
                    value: event.reason.clone(),
                    inline: false,
                },
            ],
            footer: Some(EmbedFooter {
                text: event.subject(),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn build_message(&self, event: &AlertEvent) -> Message {
        let mut message_builder = MessageBuilder::new().add_embed(self.build_unreachable_embed(event));
        if let Some(user_id) = &self.discord.user_id {
            message_builder = message_builder.content(format!(
                "🔴 ({} ~ {}) <@{user_id}>",
                event.device_id, event.address
            ));
        }
        message_builder.build()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip(self, event), fields(device = %event.device_id))]
    async fn send(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let message = self.build_message(event);

        let response = self
            .client
            .post(&self.discord.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| DispatchError::Transport {
                channel: self.name().to_string(),
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            info!("Successfully sent Discord message");
            return Ok(());
        }

        let status = response.status().as_u16();
        if let Ok(error_text) = response.text().await {
            error!("Discord API error response: {}", error_text);
        }
        Err(DispatchError::Rejected {
            channel: self.name().to_string(),
            status,
        })
    }
}
