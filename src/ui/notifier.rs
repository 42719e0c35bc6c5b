//! Posts playback notifications to the text channel each guild last used.

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::{
        notify::{FinishReason, MessageRef, Notifier},
        track::TrackRecord,
    },
    ui::embeds,
};

pub struct ChannelNotifier {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    /// Sends future notifications for `guild_id` to `channel_id`.
    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    pub fn unbind(&self, guild_id: GuildId) {
        self.channels.remove(&guild_id);
    }

    async fn replace(
        &self,
        guild_id: GuildId,
        previous: Option<MessageRef>,
        embed: CreateEmbed,
    ) -> anyhow::Result<Option<MessageRef>> {
        if let Some(previous) = previous {
            // Already deleted by someone else is fine.
            if let Err(e) = previous
                .channel_id
                .delete_message(&self.http, previous.message_id)
                .await
            {
                debug!("No se pudo borrar el mensaje anterior: {}", e);
            }
        }

        let Some(channel_id) = self.channels.get(&guild_id).map(|entry| *entry) else {
            return Ok(None);
        };

        let message = channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;

        Ok(Some(MessageRef {
            channel_id,
            message_id: message.id,
        }))
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn now_playing(
        &self,
        guild_id: GuildId,
        track: &TrackRecord,
        position: usize,
        replace: Option<MessageRef>,
    ) -> anyhow::Result<Option<MessageRef>> {
        self.replace(guild_id, replace, embeds::now_playing_embed(track, position))
            .await
    }

    async fn finished(
        &self,
        guild_id: GuildId,
        track: &TrackRecord,
        position: usize,
        reason: FinishReason,
        replace: Option<MessageRef>,
    ) -> anyhow::Result<Option<MessageRef>> {
        self.replace(guild_id, replace, embeds::finished_embed(track, position, reason))
            .await
    }
}
