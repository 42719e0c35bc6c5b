//! Contract for the audio output side (a voice connection).

use async_trait::async_trait;
use futures::future::BoxFuture;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;

use crate::error::SinkError;

/// Invoked once when the source handed to [`SinkConnection::play`] stops,
/// with the error if it ended abnormally.
pub type TrackEndCallback = Box<dyn FnOnce(Option<SinkError>) -> BoxFuture<'static, ()> + Send>;

#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn SinkConnection>, SinkError>;
}

/// A live voice connection for one guild.
#[async_trait]
pub trait SinkConnection: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Replaces whatever is playing with `stream_url`.
    async fn play(
        &self,
        stream_url: &str,
        volume_percent: u16,
        on_end: TrackEndCallback,
    ) -> Result<(), SinkError>;

    async fn pause(&self) -> Result<(), SinkError>;

    async fn resume(&self) -> Result<(), SinkError>;

    async fn stop(&self) -> Result<(), SinkError>;

    async fn set_volume(&self, volume_percent: u16) -> Result<(), SinkError>;

    async fn disconnect(&self) -> Result<(), SinkError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;
}
