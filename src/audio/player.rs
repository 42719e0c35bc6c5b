use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    ops::Range,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        notify::{FinishReason, MessageRef, Notifier},
        policy::{compute_next, PlaybackDecision},
        queue::{Queue, QueueEntry, QueueInfo, RepeatMode},
        sink::{AudioSink, SinkConnection, TrackEndCallback},
        track::TrackRecord,
    },
    error::{PlayerError, PlayerResult, SinkError},
    sources::{AutoplaySource, TrackResolver},
    storage::{GuildConfigStore, GuildSettings, GuildSettingsPatch},
};

/// Rounds of "resolve, then re-read the queue" before `play()` gives up on
/// a queue that keeps changing underneath it.
const MAX_RESOLVE_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
    /// Transient: the source is being replaced by a jump or a removal.
    Jumped,
    /// Paused because nobody is left in the voice channel.
    AutoPaused,
    /// Torn down by `reset()`; the registry entry is gone or going.
    Removed,
}

impl PlayerState {
    /// A track is loaded in the sink (playing or paused).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PlayerState::Playing | PlayerState::Paused | PlayerState::Jumped | PlayerState::AutoPaused
        )
    }
}

/// How [`Player::next`] should move on from the current track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NextOptions {
    /// Resume at this index instead of asking the policy.
    pub index: Option<usize>,
    /// Stop playback instead of advancing.
    pub stop: bool,
}

impl NextOptions {
    pub fn jump(index: usize) -> Self {
        Self { index: Some(index), stop: false }
    }

    pub fn stop() -> Self {
        Self { index: None, stop: true }
    }
}

/// External collaborators shared by every player.
#[derive(Clone)]
pub struct PlayerDeps {
    pub resolver: Arc<dyn TrackResolver>,
    pub autoplay: Arc<dyn AutoplaySource>,
    pub sink: Arc<dyn AudioSink>,
    pub store: Arc<dyn GuildConfigStore>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerOptions {
    pub max_queue_size: usize,
    pub autoplay_attempts: usize,
    /// Fixed shuffle seed; `None` seeds from entropy.
    pub shuffle_seed: Option<u64>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            autoplay_attempts: 3,
            shuffle_seed: None,
        }
    }
}

/// Read-only view of a player for rendering.
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub guild_id: GuildId,
    pub state: PlayerState,
    pub channel_id: Option<ChannelId>,
    pub queue: QueueInfo,
}

struct PlayerInner {
    queue: Queue,
    state: PlayerState,
    connection: Option<Arc<dyn SinkConnection>>,
    now_playing_message: Option<MessageRef>,
    finished_message: Option<MessageRef>,
    rng: StdRng,
}

/// Reproductor de un guild.
///
/// All mutable state sits behind a synchronous mutex that is never held
/// across an `.await`; every operation re-reads the queue after each
/// suspension point. Each `play()` takes a new generation id and the sink's
/// end callback is dropped unless its id is still the latest one.
pub struct Player {
    guild_id: GuildId,
    inner: Mutex<PlayerInner>,
    generation: AtomicU64,
    deps: PlayerDeps,
    autoplay_attempts: usize,
    weak_self: Weak<Player>,
}

impl Player {
    pub fn new(
        guild_id: GuildId,
        settings: GuildSettings,
        options: PlayerOptions,
        deps: PlayerDeps,
    ) -> Arc<Self> {
        let mut queue = Queue::new(options.max_queue_size);
        queue.set_volume_percent(settings.volume);
        queue.set_repeat_mode(settings.repeat_mode);
        queue.set_shuffle(settings.shuffle_enabled);
        queue.set_autoplay(settings.autoplay_enabled);

        let rng = match options.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Arc::new_cyclic(|weak_self| Self {
            guild_id,
            inner: Mutex::new(PlayerInner {
                queue,
                state: PlayerState::Stopped,
                connection: None,
                now_playing_message: None,
                finished_message: None,
                rng,
            }),
            generation: AtomicU64::new(0),
            deps,
            autoplay_attempts: options.autoplay_attempts.max(1),
            weak_self: weak_self.clone(),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> PlayerState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    pub fn current_track(&self) -> Option<TrackRecord> {
        self.inner.lock().queue.current().ok().map(|entry| entry.track.clone())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.inner.lock().queue.current_index()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let inner = self.inner.lock();
        PlayerSnapshot {
            guild_id: self.guild_id,
            state: inner.state,
            channel_id: inner.connection.as_ref().map(|conn| conn.channel_id()),
            queue: inner.queue.info(),
        }
    }

    /// Conecta al canal de voz (no-op si ya está en ese canal)
    pub async fn connect(&self, channel_id: ChannelId) -> PlayerResult<()> {
        let existing = self.inner.lock().connection.clone();
        if existing.is_some_and(|conn| conn.channel_id() == channel_id) {
            return Ok(());
        }

        let connection = self.deps.sink.connect(self.guild_id, channel_id).await?;
        let mut inner = self.inner.lock();
        if inner.state == PlayerState::Removed {
            inner.state = PlayerState::Stopped;
        }
        inner.connection = Some(connection);

        info!("🔗 Conectado al canal {} en guild {}", channel_id, self.guild_id);
        Ok(())
    }

    /// Agrega canciones a la cola; si no hay nada sonando, empieza por la primera agregada.
    pub async fn add_to_queue(
        &self,
        tracks: Vec<TrackRecord>,
        requested_by: UserId,
    ) -> PlayerResult<Range<usize>> {
        let (range, should_start) = {
            let mut inner = self.inner.lock();
            let range = inner.queue.append(tracks, requested_by)?;
            let should_start = !range.is_empty()
                && inner.state == PlayerState::Stopped
                && inner.connection.is_some();
            if should_start {
                inner.queue.jump_to(range.start)?;
            }
            (range, should_start)
        };

        if should_start {
            self.play().await?;
        }
        Ok(range)
    }

    /// Reproduce la entrada actual de la cola.
    pub async fn play(&self) -> PlayerResult<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.start_current(generation).await;
        if result.is_err() {
            self.settle_failed_start(generation);
        }
        result
    }

    async fn start_current(&self, generation: u64) -> PlayerResult<()> {
        if !self.is_connected() {
            return Err(PlayerError::NotConnected);
        }

        let (entry, position) = self.resolve_current().await?;
        let stream_url = entry
            .track
            .stream_url
            .clone()
            .ok_or_else(|| PlayerError::PlaybackStart("la canción no tiene URL de stream".into()))?;

        let (connection, volume) = {
            let inner = self.inner.lock();
            let connection = inner.connection.clone().ok_or(PlayerError::NotConnected)?;
            (connection, inner.queue.volume_percent())
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("⏭️ play() reemplazado por una operación más reciente en guild {}", self.guild_id);
            return Ok(());
        }

        if let Err(e) = connection
            .play(&stream_url, volume, self.end_callback(generation))
            .await
        {
            error!("❌ Error al iniciar '{}': {}", entry.track.title, e);
            return Err(PlayerError::PlaybackStart(e.to_string()));
        }

        {
            let mut inner = self.inner.lock();
            if self.generation.load(Ordering::SeqCst) == generation
                && inner.state != PlayerState::Removed
            {
                inner.state = PlayerState::Playing;
            }
        }

        info!("🎵 Reproduciendo: {} (#{})", entry.track.title, position + 1);
        self.announce_now_playing(&entry.track, position).await;
        Ok(())
    }

    /// Nothing is streaming after a failed start. Leaves the player Stopped
    /// unless a newer operation has taken over or it was reset.
    fn settle_failed_start(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if self.generation.load(Ordering::SeqCst) == generation
            && inner.state != PlayerState::Removed
        {
            inner.state = PlayerState::Stopped;
        }
    }

    /// Returns the current entry with a playable stream, resolving it first
    /// when needed. The resolved record is written back only into the slot
    /// it came from.
    async fn resolve_current(&self) -> PlayerResult<(QueueEntry, usize)> {
        for _ in 0..MAX_RESOLVE_ROUNDS {
            let (entry, position) = {
                let inner = self.inner.lock();
                let entry = inner.queue.current()?.clone();
                let position = inner.queue.current_index().unwrap_or_default();
                (entry, position)
            };

            if !entry.track.needs_resolution(Utc::now()) {
                return Ok((entry, position));
            }

            debug!("🔗 Resolviendo stream para: {}", entry.track.title);
            let refreshed = self
                .deps
                .resolver
                .refresh(&entry.track)
                .await
                .map_err(|e| PlayerError::PlaybackStart(e.to_string()))?;

            if !self.inner.lock().queue.replace_track(entry.key, refreshed) {
                debug!("🔀 La cola cambió mientras se resolvía '{}'", entry.track.title);
            }
        }

        Err(PlayerError::PlaybackStart(
            "la cola cambió repetidamente durante la resolución".into(),
        ))
    }

    fn end_callback(&self, generation: u64) -> TrackEndCallback {
        let player = self.weak_self.clone();
        Box::new(move |error| {
            async move {
                if let Some(player) = player.upgrade() {
                    player.handle_track_end(generation, error).await;
                }
            }
            .boxed()
        })
    }

    async fn handle_track_end(&self, generation: u64, error: Option<SinkError>) {
        let latest = self.generation.load(Ordering::SeqCst);
        if generation != latest {
            debug!(
                "🕰️ Fin de track obsoleto ignorado (gen {} vs {}) en guild {}",
                generation, latest, self.guild_id
            );
            return;
        }

        if !self.state().is_active() {
            return;
        }

        if let Some(e) = error {
            warn!("⚠️ Error durante la reproducción en guild {}: {}", self.guild_id, e);
        }

        if let Err(e) = self.advance(NextOptions::default(), FinishReason::Ended, None).await {
            error!("Error al reproducir siguiente track: {:?}", e);
        }
    }

    /// Avanza a la siguiente canción (skip manual, salto o stop).
    pub async fn next(&self, options: NextOptions) -> PlayerResult<()> {
        let reason = if options.stop {
            FinishReason::Stopped
        } else {
            FinishReason::Skipped
        };
        self.advance(options, reason, None).await
    }

    pub async fn skip(&self) -> PlayerResult<()> {
        self.next(NextOptions::default()).await
    }

    pub async fn jump(&self, index: usize) -> PlayerResult<()> {
        self.next(NextOptions::jump(index)).await
    }

    pub async fn stop(&self) -> PlayerResult<()> {
        self.next(NextOptions::stop()).await
    }

    /// `finished` overrides the outgoing track, for when it has already been
    /// removed from the queue.
    async fn advance(
        &self,
        options: NextOptions,
        reason: FinishReason,
        finished: Option<(TrackRecord, usize)>,
    ) -> PlayerResult<()> {
        let (connection, finished, generation) = {
            let mut inner = self.inner.lock();
            if let Some(index) = options.index {
                if index >= inner.queue.len() {
                    return Err(PlayerError::IndexOutOfBounds {
                        index,
                        len: inner.queue.len(),
                    });
                }
            }

            let finished = if inner.state.is_active() {
                finished.or_else(|| {
                    let position = inner.queue.current_index()?;
                    Some((inner.queue.current().ok()?.track.clone(), position))
                })
            } else {
                None
            };

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if options.index.is_some() && inner.state.is_active() {
                inner.state = PlayerState::Jumped;
            }
            (inner.connection.clone(), finished, generation)
        };

        let result = self.move_on(options, reason, connection, finished).await;
        if result.is_err() {
            self.settle_failed_start(generation);
        }
        result
    }

    /// Second half of [`advance`](Self::advance): stops the outgoing track
    /// and starts whatever comes next.
    async fn move_on(
        &self,
        options: NextOptions,
        reason: FinishReason,
        connection: Option<Arc<dyn SinkConnection>>,
        finished: Option<(TrackRecord, usize)>,
    ) -> PlayerResult<()> {
        if finished.is_some() {
            if let Some(connection) = &connection {
                if let Err(e) = connection.stop().await {
                    warn!("⚠️ Error al detener el audio: {}", e);
                }
            }
        }

        if let Some((track, position)) = &finished {
            self.announce_finished(track, *position, reason).await;
        }

        if options.stop {
            self.go_idle();
            info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
            return Ok(());
        }

        if let Some(index) = options.index {
            self.inner.lock().queue.jump_to(index)?;
            return self.play().await;
        }

        let decision = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let decision = compute_next(&inner.queue, &mut inner.rng);
            if let PlaybackDecision::NextIndex(index) = decision {
                if inner.queue.shuffle_enabled() {
                    inner.queue.record_shuffle_pick(index);
                }
                inner.queue.jump_to(index)?;
            }
            decision
        };

        match decision {
            PlaybackDecision::Stop => {
                self.go_idle();
                info!("📭 Fin de la cola en guild {}", self.guild_id);
                Ok(())
            }
            PlaybackDecision::NextIndex(_) => self.play().await,
            PlaybackDecision::RequestAutoplayThenIndex(_) => {
                let seed = finished
                    .map(|(track, _)| track)
                    .or_else(|| self.current_track());
                let Some(seed) = seed else {
                    self.go_idle();
                    return Ok(());
                };

                match self.fetch_autoplay(&seed.id).await {
                    Ok(track) => {
                        {
                            let mut inner = self.inner.lock();
                            let range = inner.queue.append(vec![track], seed.requested_by)?;
                            inner.queue.jump_to(range.start)?;
                        }
                        self.play().await
                    }
                    Err(PlayerError::NoCandidates) => {
                        info!("📭 Autoplay sin candidatos, deteniendo en guild {}", self.guild_id);
                        self.go_idle();
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Busca una canción relacionada que no esté ya en la cola.
    async fn fetch_autoplay(&self, seed_id: &str) -> PlayerResult<TrackRecord> {
        for attempt in 1..=self.autoplay_attempts {
            match self.deps.autoplay.related_to(seed_id).await {
                Ok(candidates) => {
                    let inner = self.inner.lock();
                    if let Some(track) = candidates
                        .into_iter()
                        .find(|candidate| !inner.queue.contains_id(&candidate.id))
                    {
                        info!("📻 Autoplay: {}", track.title);
                        return Ok(track);
                    }
                    debug!("📻 Intento {} de autoplay sin candidatos nuevos", attempt);
                }
                Err(e) => warn!("📻 Intento {} de autoplay falló: {}", attempt, e),
            }
        }
        Err(PlayerError::NoCandidates)
    }

    /// Queda conectado pero inactivo, con la cola rebobinada.
    fn go_idle(&self) {
        let mut inner = self.inner.lock();
        inner.queue.rewind();
        if inner.state != PlayerState::Removed {
            inner.state = PlayerState::Stopped;
        }
    }

    /// Pausa la reproducción actual (no-op si no está sonando)
    pub async fn pause(&self) -> PlayerResult<()> {
        self.pause_as(PlayerState::Paused).await
    }

    /// Pausa porque el canal de voz quedó vacío.
    pub async fn auto_pause(&self) -> PlayerResult<()> {
        self.pause_as(PlayerState::AutoPaused).await
    }

    async fn pause_as(&self, target: PlayerState) -> PlayerResult<()> {
        let connection = {
            let inner = self.inner.lock();
            if inner.state != PlayerState::Playing {
                return Ok(());
            }
            inner.connection.clone().ok_or(PlayerError::NotConnected)?
        };

        connection.pause().await?;

        let mut inner = self.inner.lock();
        if inner.state == PlayerState::Playing {
            inner.state = target;
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        }
        Ok(())
    }

    /// Reanuda la reproducción (no-op si no está pausada)
    pub async fn resume(&self) -> PlayerResult<()> {
        let connection = {
            let inner = self.inner.lock();
            if !matches!(inner.state, PlayerState::Paused | PlayerState::AutoPaused) {
                return Ok(());
            }
            inner.connection.clone().ok_or(PlayerError::NotConnected)?
        };

        connection.resume().await?;

        let mut inner = self.inner.lock();
        if matches!(inner.state, PlayerState::Paused | PlayerState::AutoPaused) {
            inner.state = PlayerState::Playing;
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        Ok(())
    }

    /// Elimina una canción; si era la actual, continúa en la que ocupa su lugar.
    pub async fn remove_at(&self, index: usize) -> PlayerResult<TrackRecord> {
        let (removed, resume_at, was_current) = {
            let mut inner = self.inner.lock();
            let was_current =
                inner.state.is_active() && inner.queue.current_index() == Some(index);
            if was_current {
                // Any end event from the removed track is now stale.
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            let removed = inner.queue.remove_at(index)?;
            (removed, inner.queue.current_index(), was_current)
        };

        if was_current {
            let finished = Some((removed.track.clone(), index));
            match resume_at {
                Some(next) => {
                    self.advance(NextOptions::jump(next), FinishReason::Skipped, finished)
                        .await?
                }
                None => {
                    self.advance(NextOptions::stop(), FinishReason::Skipped, finished)
                        .await?
                }
            }
        }

        Ok(removed.track)
    }

    pub fn move_entry(&self, from: usize, to: usize) -> PlayerResult<()> {
        self.inner.lock().queue.move_entry(from, to)
    }

    /// Vacía la cola dejando solo la canción actual.
    pub fn clear(&self) -> usize {
        self.inner.lock().queue.clear()
    }

    /// Ajusta el volumen (0-200%)
    pub async fn update_volume(&self, percent: u16) -> u16 {
        let (applied, connection) = {
            let mut inner = self.inner.lock();
            let applied = inner.queue.set_volume_percent(percent);
            (applied, inner.connection.clone())
        };

        if let Some(connection) = connection {
            if let Err(e) = connection.set_volume(applied).await {
                warn!("⚠️ No se pudo aplicar el volumen: {}", e);
            }
        }

        info!("🔊 Volumen ajustado a {}%", applied);
        self.persist(GuildSettingsPatch {
            volume: Some(applied),
            ..Default::default()
        });
        applied
    }

    pub fn update_repeat_mode(&self, mode: RepeatMode) {
        self.inner.lock().queue.set_repeat_mode(mode);
        self.persist(GuildSettingsPatch {
            repeat_mode: Some(mode),
            ..Default::default()
        });
    }

    pub fn update_shuffle(&self, enabled: bool) {
        self.inner.lock().queue.set_shuffle(enabled);
        self.persist(GuildSettingsPatch {
            shuffle_enabled: Some(enabled),
            ..Default::default()
        });
    }

    pub fn update_autoplay(&self, enabled: bool) {
        self.inner.lock().queue.set_autoplay(enabled);
        info!(
            "📻 Autoplay {} en guild {}",
            if enabled { "activado" } else { "desactivado" },
            self.guild_id
        );
        self.persist(GuildSettingsPatch {
            autoplay_enabled: Some(enabled),
            ..Default::default()
        });
    }

    /// Guarda sin esperar; un fallo solo se registra.
    fn persist(&self, patch: GuildSettingsPatch) {
        let store = self.deps.store.clone();
        let guild_id = self.guild_id;
        tokio::spawn(async move {
            if let Err(e) = store.save(guild_id, patch).await {
                warn!("💾 No se pudo guardar la configuración de guild {}: {}", guild_id, e);
            }
        });
    }

    /// Detiene todo y se desconecta. The player is unusable afterwards until
    /// it reconnects; the registry drops it.
    pub async fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let (connection, finished) = {
            let mut inner = self.inner.lock();
            let finished = if inner.state.is_active() {
                inner
                    .queue
                    .current()
                    .ok()
                    .map(|entry| entry.track.clone())
                    .zip(inner.queue.current_index())
            } else {
                None
            };
            inner.state = PlayerState::Removed;
            (inner.connection.take(), finished)
        };

        if let Some(connection) = connection {
            if let Err(e) = connection.stop().await {
                warn!("⚠️ Error al detener el audio: {}", e);
            }
            if let Err(e) = connection.disconnect().await {
                warn!("⚠️ Error al desconectar: {}", e);
            }
        }

        if let Some((track, position)) = finished {
            self.announce_finished(&track, position, FinishReason::Stopped).await;
        }
        info!("👋 Reproductor reiniciado en guild {}", self.guild_id);
    }

    async fn announce_now_playing(&self, track: &TrackRecord, position: usize) {
        let previous = self.inner.lock().now_playing_message.take();
        match self
            .deps
            .notifier
            .now_playing(self.guild_id, track, position, previous)
            .await
        {
            Ok(message) => self.inner.lock().now_playing_message = message,
            Err(e) => warn!("Error al enviar mensaje now playing: {:?}", e),
        }
    }

    async fn announce_finished(&self, track: &TrackRecord, position: usize, reason: FinishReason) {
        let previous = self.inner.lock().finished_message.take();
        match self
            .deps
            .notifier
            .finished(self.guild_id, track, position, reason, previous)
            .await
        {
            Ok(message) => self.inner.lock().finished_message = message,
            Err(e) => warn!("Error al enviar mensaje de fin: {:?}", e),
        }
    }
}
