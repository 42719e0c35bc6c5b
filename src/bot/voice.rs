//! Songbird implementation of the audio sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::sink::{AudioSink, SinkConnection, TrackEndCallback},
    error::SinkError,
};

pub struct SongbirdSink {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn SinkConnection>, SinkError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                debug!("No se pudo ensordecer al bot: {}", e);
            }
        }

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(Arc::new(SongbirdConnection {
            guild_id,
            channel_id,
            call,
            manager: self.manager.clone(),
            http: self.http.clone(),
            current: Mutex::new(None),
        }))
    }
}

/// One songbird `Call` plus the handle of the track it is playing.
pub struct SongbirdConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

fn control_error(e: songbird::error::ControlError) -> SinkError {
    SinkError::Playback(e.to_string())
}

/// The fallible controls applied to a track right after it starts.
trait StartedTrack {
    fn apply_volume(&self, volume_percent: u16) -> Result<(), SinkError>;
    fn watch_end(&self, handler: TrackEndHandler) -> Result<(), SinkError>;
    fn halt(&self) -> Result<(), SinkError>;
}

impl StartedTrack for TrackHandle {
    fn apply_volume(&self, volume_percent: u16) -> Result<(), SinkError> {
        self.set_volume(f32::from(volume_percent) / 100.0)
            .map_err(control_error)
    }

    fn watch_end(&self, handler: TrackEndHandler) -> Result<(), SinkError> {
        // End and Error share one callback slot; whichever fires first takes it.
        for event in [TrackEvent::End, TrackEvent::Error] {
            self.add_event(VoiceEvent::Track(event), handler.clone())
                .map_err(control_error)?;
        }
        Ok(())
    }

    fn halt(&self) -> Result<(), SinkError> {
        self.stop().map_err(control_error)
    }
}

/// Sets volume and end notification on a started track. The track is
/// stopped again if either fails, since nobody would be left to stop it.
fn arm_track<T: StartedTrack>(
    track: &T,
    volume_percent: u16,
    guild_id: GuildId,
    on_end: TrackEndCallback,
) -> Result<(), SinkError> {
    let handler = TrackEndHandler {
        guild_id,
        slot: Arc::new(Mutex::new(Some(on_end))),
    };
    let result = track
        .apply_volume(volume_percent)
        .and_then(|()| track.watch_end(handler));

    if let Err(e) = &result {
        warn!("❌ No se pudo preparar el track en guild {}: {}", guild_id, e);
        if let Err(stop_err) = track.halt() {
            debug!("No se pudo detener el track: {}", stop_err);
        }
    }
    result
}

#[async_trait]
impl SinkConnection for SongbirdConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(
        &self,
        stream_url: &str,
        volume_percent: u16,
        on_end: TrackEndCallback,
    ) -> Result<(), SinkError> {
        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        arm_track(&handle, volume_percent, self.guild_id, on_end)?;
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        match self.handle() {
            Some(handle) => handle.pause().map_err(control_error),
            None => Ok(()),
        }
    }

    async fn resume(&self) -> Result<(), SinkError> {
        match self.handle() {
            Some(handle) => handle.play().map_err(control_error),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), SinkError> {
        match self.current.lock().take() {
            Some(handle) => handle.stop().map_err(control_error),
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume_percent: u16) -> Result<(), SinkError> {
        match self.handle() {
            Some(handle) => handle
                .set_volume(f32::from(volume_percent) / 100.0)
                .map_err(control_error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(songbird::error::JoinError::NoCall) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(SinkError::Connect(e.to_string())),
        }
    }

    async fn is_playing(&self) -> bool {
        match self.handle() {
            Some(handle) => matches!(
                handle.get_info().await.map(|state| state.playing),
                Ok(PlayMode::Play)
            ),
            None => false,
        }
    }

    async fn is_paused(&self) -> bool {
        match self.handle() {
            Some(handle) => matches!(
                handle.get_info().await.map(|state| state.playing),
                Ok(PlayMode::Pause)
            ),
            None => false,
        }
    }
}

/// Handler para fin o error de un track.
#[derive(Clone)]
struct TrackEndHandler {
    guild_id: GuildId,
    slot: Arc<Mutex<Option<TrackEndCallback>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let error = match ctx {
            EventContext::Track(track_list) => track_list.iter().find_map(|(state, _)| {
                match &state.playing {
                    PlayMode::Errored(e) => Some(SinkError::Playback(format!("{:?}", e))),
                    _ => None,
                }
            }),
            _ => None,
        };

        if let Some(e) = &error {
            warn!("❌ Error en track para guild {}: {}", self.guild_id, e);
        }

        let callback = self.slot.lock().take();
        if let Some(callback) = callback {
            // The player may start the next track from here; run it off the
            // driver's event task.
            tokio::spawn(callback(error));
        }

        None
    }
}
