//! Persistent per-guild playback settings.
//!
//! Each guild gets one `guild_<id>.json` file under `<data_dir>/servers`.
//! Files are read once and cached; writes merge a partial patch into the
//! cached value and rewrite the file.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::audio::queue::{RepeatMode, MAX_VOLUME_PERCENT};
use crate::error::StoreError;

/// Configuración de reproducción de un servidor.
///
/// Missing keys take their defaults and unknown keys are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub volume: u16,
    pub repeat_mode: RepeatMode,
    pub shuffle_enabled: bool,
    pub autoplay_enabled: bool,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            volume: 100,
            repeat_mode: RepeatMode::Off,
            shuffle_enabled: false,
            autoplay_enabled: false,
        }
    }
}

impl GuildSettings {
    /// Clamps out-of-range values loaded from disk.
    pub fn validated(mut self) -> Self {
        if self.volume > MAX_VOLUME_PERCENT {
            warn!(
                "🔊 Volumen guardado fuera de rango ({}), usando {}",
                self.volume, MAX_VOLUME_PERCENT
            );
            self.volume = MAX_VOLUME_PERCENT;
        }
        self
    }

    pub fn apply(&mut self, patch: &GuildSettingsPatch) {
        if let Some(volume) = patch.volume {
            self.volume = volume.min(MAX_VOLUME_PERCENT);
        }
        if let Some(mode) = patch.repeat_mode {
            self.repeat_mode = mode;
        }
        if let Some(shuffle) = patch.shuffle_enabled {
            self.shuffle_enabled = shuffle;
        }
        if let Some(autoplay) = patch.autoplay_enabled {
            self.autoplay_enabled = autoplay;
        }
    }
}

/// Partial update for [`GuildSettings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuildSettingsPatch {
    pub volume: Option<u16>,
    pub repeat_mode: Option<RepeatMode>,
    pub shuffle_enabled: Option<bool>,
    pub autoplay_enabled: Option<bool>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildConfigStore: Send + Sync {
    async fn load(&self, guild_id: GuildId) -> Result<GuildSettings, StoreError>;

    async fn save(&self, guild_id: GuildId, patch: GuildSettingsPatch) -> Result<(), StoreError>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    cache: DashMap<GuildId, GuildSettings>,
    write_lock: tokio::sync::Mutex<()>,
    defaults: GuildSettings,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir.join("servers")).await?;
        info!("📁 Storage inicializado en: {}", data_dir.display());

        Ok(Self {
            data_dir,
            cache: DashMap::new(),
            write_lock: tokio::sync::Mutex::new(()),
            defaults: GuildSettings::default(),
        })
    }

    /// Settings handed out for guilds without a file.
    pub fn with_defaults(mut self, defaults: GuildSettings) -> Self {
        self.defaults = defaults.validated();
        self
    }

    fn server_file_path(&self, guild_id: GuildId) -> PathBuf {
        self.data_dir
            .join("servers")
            .join(format!("guild_{}.json", guild_id.get()))
    }

    async fn read_from_disk(&self, guild_id: GuildId) -> Result<GuildSettings, StoreError> {
        let path = self.server_file_path(guild_id);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let settings: GuildSettings = serde_json::from_str(&content)?;
                Ok(settings.validated())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("📝 Sin configuración para guild {}, usando valores por defecto", guild_id);
                Ok(self.defaults)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl GuildConfigStore for JsonStorage {
    async fn load(&self, guild_id: GuildId) -> Result<GuildSettings, StoreError> {
        if let Some(settings) = self.cache.get(&guild_id) {
            return Ok(*settings);
        }

        let settings = self.read_from_disk(guild_id).await?;
        self.cache.insert(guild_id, settings);
        Ok(settings)
    }

    async fn save(&self, guild_id: GuildId, patch: GuildSettingsPatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut settings = self.load(guild_id).await?;
        settings.apply(&patch);
        self.cache.insert(guild_id, settings);

        let content = serde_json::to_string_pretty(&settings)?;
        fs::write(self.server_file_path(guild_id), content).await?;

        debug!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }
}
