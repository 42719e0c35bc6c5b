use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId};

use crate::audio::track::TrackRecord;

/// Handle to a message posted by a [`Notifier`], kept so the next
/// notification can replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The track played to the end (or failed mid-stream).
    Ended,
    /// Skipped, jumped away from or removed by a user.
    Skipped,
    /// Explicit stop or reset; the message should be short-lived.
    Stopped,
}

/// User-facing "now playing" / "finished" messages. Rendering is up to the
/// implementation; the player only tracks the returned handles.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn now_playing(
        &self,
        guild_id: GuildId,
        track: &TrackRecord,
        position: usize,
        replace: Option<MessageRef>,
    ) -> anyhow::Result<Option<MessageRef>>;

    async fn finished(
        &self,
        guild_id: GuildId,
        track: &TrackRecord,
        position: usize,
        reason: FinishReason,
        replace: Option<MessageRef>,
    ) -> anyhow::Result<Option<MessageRef>>;
}
