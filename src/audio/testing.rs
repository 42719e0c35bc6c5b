//! In-memory collaborators for player and registry tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

use crate::{
    audio::{
        notify::{FinishReason, MessageRef, Notifier},
        player::{Player, PlayerDeps, PlayerOptions},
        sink::{AudioSink, SinkConnection, TrackEndCallback},
        track::TrackRecord,
    },
    error::{ResolveError, SinkError, StoreError},
    sources::{AutoplaySource, MockAutoplaySource, Resolved, TrackResolver},
    storage::{GuildConfigStore, GuildSettings, GuildSettingsPatch},
};

pub fn guild() -> GuildId {
    GuildId::new(42)
}

pub fn channel() -> ChannelId {
    ChannelId::new(500)
}

pub fn user() -> UserId {
    UserId::new(77)
}

pub fn unresolved(id: &str) -> TrackRecord {
    TrackRecord::new(id, format!("Track {id}"), format!("https://youtu.be/{id}"))
        .with_duration(Duration::from_secs(180))
}

pub fn resolved(id: &str) -> TrackRecord {
    unresolved(id).with_stream_url(format!("https://cdn.test/{id}"), None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Play(String, u16),
    Pause,
    Resume,
    Stop,
    SetVolume(u16),
    Disconnect,
}

pub struct FakeConnection {
    channel_id: ChannelId,
    calls: Mutex<Vec<SinkCall>>,
    callbacks: Mutex<Vec<TrackEndCallback>>,
    pub fail_next_play: AtomicBool,
}

impl FakeConnection {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            calls: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            fail_next_play: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Stream URLs handed to `play`, in order.
    pub fn plays(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Play(url, _) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    /// Fires the end callback of the most recent `play`.
    pub async fn finish_latest(&self, error: Option<SinkError>) {
        let callback = self.callbacks.lock().pop().expect("no track is playing");
        callback(error).await;
    }

    /// Removes the callback registered by the `index`-th `play`.
    pub fn take_callback(&self, index: usize) -> TrackEndCallback {
        self.callbacks.lock().remove(index)
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SinkConnection for FakeConnection {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn play(
        &self,
        stream_url: &str,
        volume_percent: u16,
        on_end: TrackEndCallback,
    ) -> Result<(), SinkError> {
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            return Err(SinkError::Playback("malformed source".into()));
        }
        self.record(SinkCall::Play(stream_url.to_string(), volume_percent));
        self.callbacks.lock().push(on_end);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.record(SinkCall::Pause);
        Ok(())
    }

    async fn resume(&self) -> Result<(), SinkError> {
        self.record(SinkCall::Resume);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.record(SinkCall::Stop);
        Ok(())
    }

    async fn set_volume(&self, volume_percent: u16) -> Result<(), SinkError> {
        self.record(SinkCall::SetVolume(volume_percent));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.record(SinkCall::Disconnect);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        !self.callbacks.lock().is_empty()
    }

    async fn is_paused(&self) -> bool {
        false
    }
}

pub struct FakeSink {
    pub connection: Arc<FakeConnection>,
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<Arc<dyn SinkConnection>, SinkError> {
        Ok(self.connection.clone() as Arc<dyn SinkConnection>)
    }
}

#[derive(Default)]
pub struct FakeResolver {
    pub refreshes: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError> {
        Ok(Resolved::Track(unresolved(query).with_requested_by(requested_by)))
    }

    async fn refresh(&self, track: &TrackRecord) -> Result<TrackRecord, ResolveError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResolveError::RegionBlocked);
        }
        let round = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(track.clone().with_stream_url(
            format!("https://cdn.test/{}/{}", track.id, round),
            Some(Utc::now() + chrono::Duration::hours(6)),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NowPlaying(String, usize),
    Finished(String, usize, FinishReason),
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    replaced: Mutex<Vec<Option<MessageRef>>>,
    next_id: AtomicU64,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// The `replace` argument of every `now_playing` call.
    pub fn replaced(&self) -> Vec<Option<MessageRef>> {
        self.replaced.lock().clone()
    }

    fn message(&self) -> MessageRef {
        MessageRef {
            channel_id: ChannelId::new(900),
            message_id: MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn now_playing(
        &self,
        _guild_id: GuildId,
        track: &TrackRecord,
        position: usize,
        replace: Option<MessageRef>,
    ) -> anyhow::Result<Option<MessageRef>> {
        self.notices
            .lock()
            .push(Notice::NowPlaying(track.id.clone(), position));
        self.replaced.lock().push(replace);
        Ok(Some(self.message()))
    }

    async fn finished(
        &self,
        _guild_id: GuildId,
        track: &TrackRecord,
        position: usize,
        reason: FinishReason,
        _replace: Option<MessageRef>,
    ) -> anyhow::Result<Option<MessageRef>> {
        self.notices
            .lock()
            .push(Notice::Finished(track.id.clone(), position, reason));
        Ok(Some(self.message()))
    }
}

/// Store that forwards every saved patch to a channel.
pub struct ChannelStore {
    settings: GuildSettings,
    saves: mpsc::UnboundedSender<GuildSettingsPatch>,
}

impl ChannelStore {
    pub fn new(settings: GuildSettings) -> (Self, mpsc::UnboundedReceiver<GuildSettingsPatch>) {
        let (saves, rx) = mpsc::unbounded_channel();
        (Self { settings, saves }, rx)
    }
}

#[async_trait]
impl GuildConfigStore for ChannelStore {
    async fn load(&self, _guild_id: GuildId) -> Result<GuildSettings, StoreError> {
        Ok(self.settings)
    }

    async fn save(&self, _guild_id: GuildId, patch: GuildSettingsPatch) -> Result<(), StoreError> {
        let _ = self.saves.send(patch);
        Ok(())
    }
}

pub struct Fakes {
    pub deps: PlayerDeps,
    pub connection: Arc<FakeConnection>,
    pub notifier: Arc<RecordingNotifier>,
    pub resolver: Arc<FakeResolver>,
}

pub fn fakes(autoplay: MockAutoplaySource, store: Arc<dyn GuildConfigStore>) -> Fakes {
    let connection = Arc::new(FakeConnection::new(channel()));
    let notifier = Arc::new(RecordingNotifier::default());
    let resolver = Arc::new(FakeResolver::default());
    let autoplay: Arc<dyn AutoplaySource> = Arc::new(autoplay);

    Fakes {
        deps: PlayerDeps {
            resolver: resolver.clone(),
            autoplay,
            sink: Arc::new(FakeSink {
                connection: connection.clone(),
            }),
            store,
            notifier: notifier.clone(),
        },
        connection,
        notifier,
        resolver,
    }
}

pub fn no_autoplay() -> MockAutoplaySource {
    let mut autoplay = MockAutoplaySource::new();
    autoplay.expect_related_to().never();
    autoplay
}

pub fn options() -> PlayerOptions {
    PlayerOptions {
        max_queue_size: 100,
        autoplay_attempts: 3,
        shuffle_seed: Some(7),
    }
}

pub struct Harness {
    pub player: Arc<Player>,
    pub connection: Arc<FakeConnection>,
    pub notifier: Arc<RecordingNotifier>,
    pub resolver: Arc<FakeResolver>,
    pub saves: mpsc::UnboundedReceiver<GuildSettingsPatch>,
}

/// A player connected to [`channel()`] with nothing queued.
pub async fn harness(settings: GuildSettings, autoplay: MockAutoplaySource) -> Harness {
    harness_with(settings, autoplay, options()).await
}

pub async fn harness_with(
    settings: GuildSettings,
    autoplay: MockAutoplaySource,
    options: PlayerOptions,
) -> Harness {
    let (store, saves) = ChannelStore::new(settings);
    let fakes = fakes(autoplay, Arc::new(store));
    let player = Player::new(guild(), settings, options, fakes.deps);
    player.connect(channel()).await.expect("fake sink connects");

    Harness {
        player,
        connection: fakes.connection,
        notifier: fakes.notifier,
        resolver: fakes.resolver,
        saves,
    }
}
