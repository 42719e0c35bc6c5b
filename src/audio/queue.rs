use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::{collections::BTreeSet, ops::Range, time::Duration};
use tracing::{debug, info};

use crate::audio::track::TrackRecord;
use crate::error::{PlayerError, PlayerResult};

/// One queue slot. `key` is unique within the queue, so the same song
/// enqueued twice still occupies two distinguishable slots.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub key: u64,
    pub track: TrackRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    Single,
    All,
}

/// Cola de reproducción de un guild con cursor.
///
/// `current` is `None` exactly when the queue is empty; otherwise it always
/// points at a valid entry.
#[derive(Debug)]
pub struct Queue {
    entries: Vec<QueueEntry>,
    current: Option<usize>,
    repeat_mode: RepeatMode,
    shuffle_enabled: bool,
    autoplay_enabled: bool,
    volume_percent: u16,
    shuffle_played: BTreeSet<usize>,
    next_key: u64,
    max_size: usize,
}

pub const MAX_VOLUME_PERCENT: u16 = 200;

impl Queue {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            repeat_mode: RepeatMode::Off,
            shuffle_enabled: false,
            autoplay_enabled: false,
            volume_percent: 100,
            shuffle_played: BTreeSet::new(),
            next_key: 0,
            max_size,
        }
    }

    /// Agrega tracks al final de la cola.
    ///
    /// Returns the index range that was appended. When the cap is reached
    /// mid-playlist only the tracks that fit are taken.
    pub fn append(
        &mut self,
        tracks: Vec<TrackRecord>,
        requested_by: UserId,
    ) -> PlayerResult<Range<usize>> {
        let start = self.entries.len();
        if tracks.is_empty() {
            return Ok(start..start);
        }

        let available = self.max_size.saturating_sub(start);
        if available == 0 {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        for mut track in tracks.into_iter().take(available) {
            track.requested_by = requested_by;
            let key = self.next_key;
            self.next_key += 1;
            debug!("➕ Agregado a la cola: {}", track.title);
            self.entries.push(QueueEntry { key, track });
        }

        if self.current.is_none() {
            self.current = Some(0);
        }

        let end = self.entries.len();
        info!("➕ Agregadas {} canciones a la cola", end - start);
        Ok(start..end)
    }

    /// Elimina la entrada en `index`.
    ///
    /// The cursor keeps pointing at the same slot when an earlier entry is
    /// removed. Removing the entry under the cursor leaves it on whatever
    /// now occupies that index, or on the previous index if it was the last.
    pub fn remove_at(&mut self, index: usize) -> PlayerResult<QueueEntry> {
        self.check_bounds(index)?;

        let removed = self.entries.remove(index);
        self.current = match self.current {
            _ if self.entries.is_empty() => None,
            Some(current) if index < current => Some(current - 1),
            Some(current) if current >= self.entries.len() => Some(self.entries.len() - 1),
            other => other,
        };

        self.shuffle_played = self
            .shuffle_played
            .iter()
            .filter(|&&played| played != index)
            .map(|&played| if played > index { played - 1 } else { played })
            .collect();

        debug!("❌ Track eliminado en posición {}: {}", index, removed.track.title);
        Ok(removed)
    }

    /// Mueve el cursor a `index`.
    pub fn jump_to(&mut self, index: usize) -> PlayerResult<()> {
        self.check_bounds(index)?;
        self.current = Some(index);
        Ok(())
    }

    /// Mueve una entrada a otra posición sin cambiar cuál es la actual.
    pub fn move_entry(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        self.check_bounds(from)?;
        self.check_bounds(to)?;
        if from == to {
            return Ok(());
        }

        let current_key = self.current().ok().map(|entry| entry.key);
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        self.current = current_key.and_then(|key| self.position_of(key));
        self.shuffle_played.clear();

        debug!("📍 Track movido de posición {} a {}", from, to);
        Ok(())
    }

    /// Vacía la cola conservando solo la entrada actual.
    pub fn clear(&mut self) -> usize {
        let Some(current) = self.current else {
            return 0;
        };
        let removed = self.entries.len() - 1;
        let keep = self.entries.swap_remove(current);
        self.entries.clear();
        self.entries.push(keep);
        self.current = Some(0);
        self.shuffle_played.clear();

        info!("🗑️ Cola limpiada ({} canciones)", removed);
        removed
    }

    pub fn current(&self) -> PlayerResult<&QueueEntry> {
        self.current
            .and_then(|index| self.entries.get(index))
            .ok_or(PlayerError::EmptyQueue)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Rebobina al inicio, como cuando la reproducción se detiene por completo.
    pub fn rewind(&mut self) {
        if !self.entries.is_empty() {
            self.current = Some(0);
        }
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.current == Some(self.entries.len().saturating_sub(1)) && !self.entries.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.track.id == id)
    }

    pub fn position_of(&self, key: u64) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    /// Replaces the record stored in the slot identified by `key`.
    /// Returns false when that slot no longer exists.
    pub fn replace_track(&mut self, key: u64, track: TrackRecord) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.track = track;
                true
            }
            None => false,
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Single => info!("🔂 Repetir canción activado"),
            RepeatMode::All => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    /// Cambia el modo aleatorio. Each change starts a fresh shuffle cycle.
    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle_enabled = enabled;
        self.shuffle_played.clear();
        if enabled {
            info!("🔀 Modo aleatorio activado");
        } else {
            info!("➡️ Modo aleatorio desactivado");
        }
    }

    pub fn autoplay_enabled(&self) -> bool {
        self.autoplay_enabled
    }

    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay_enabled = enabled;
    }

    pub fn volume_percent(&self) -> u16 {
        self.volume_percent
    }

    pub fn set_volume_percent(&mut self, percent: u16) -> u16 {
        self.volume_percent = percent.min(MAX_VOLUME_PERCENT);
        self.volume_percent
    }

    /// Indices already visited in the current shuffle cycle.
    pub fn shuffle_played(&self) -> &BTreeSet<usize> {
        &self.shuffle_played
    }

    /// Records a shuffle pick, starting a new cycle from `{current}` once
    /// every index has been visited.
    pub fn record_shuffle_pick(&mut self, index: usize) {
        if self.shuffle_played.len() >= self.entries.len() {
            self.shuffle_played.clear();
            self.shuffle_played.extend(self.current);
        }
        self.shuffle_played.insert(index);
    }

    pub fn total_duration(&self) -> Duration {
        self.entries.iter().filter_map(|entry| entry.track.duration).sum()
    }

    /// Obtiene información de la cola
    pub fn info(&self) -> QueueInfo {
        QueueInfo {
            entries: self.entries.clone(),
            current: self.current,
            repeat_mode: self.repeat_mode,
            shuffle: self.shuffle_enabled,
            autoplay: self.autoplay_enabled,
            volume_percent: self.volume_percent,
            total_duration: self.total_duration(),
        }
    }

    fn check_bounds(&self, index: usize) -> PlayerResult<()> {
        if index >= self.entries.len() {
            return Err(PlayerError::IndexOutOfBounds {
                index,
                len: self.entries.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub entries: Vec<QueueEntry>,
    pub current: Option<usize>,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    pub autoplay: bool,
    pub volume_percent: u16,
    pub total_duration: Duration,
}

impl QueueInfo {
    pub fn current_entry(&self) -> Option<&QueueEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }

    /// Obtiene una página específica de la cola (1-based)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.entries.len();
        let total_pages = total_items.div_ceil(items_per_page).max(1);
        let safe_page = page.clamp(1, total_pages);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            entries: self.entries[start..end]
                .iter()
                .cloned()
                .enumerate()
                .map(|(offset, entry)| (start + offset, entry))
                .collect(),
            current_page: safe_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    /// `(queue index, entry)` pairs.
    pub entries: Vec<(usize, QueueEntry)>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
