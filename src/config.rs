use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub command_prefix: String,

    // Audio
    /// Volume (percent) for guilds without saved settings.
    pub default_volume: u16,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub autoplay_attempts: usize,

    // Fuentes
    pub search_results: usize,
    pub ytdlp_path: String,

    // Paths
    pub data_dir: PathBuf,

    // Límites
    /// Seconds the bot may stay alone in a voice channel before leaving.
    pub idle_timeout: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            command_prefix: env_or("COMMAND_PREFIX", "!"),

            // Audio
            default_volume: env_or("DEFAULT_VOLUME", "100").parse()?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", "1000").parse()?,
            max_playlist_size: env_or("MAX_PLAYLIST_SIZE", "100").parse()?,
            autoplay_attempts: env_or("AUTOPLAY_ATTEMPTS", "3").parse()?,

            // Fuentes
            search_results: env_or("SEARCH_RESULTS", "5").parse()?,
            ytdlp_path: env_or("YTDLP_PATH", "yt-dlp"),

            // Paths
            data_dir: env_or("DATA_DIR", "/app/data").into(),

            // Límites
            idle_timeout: env_or("IDLE_TIMEOUT", "300").parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 0 and 200 percent
    /// - Queue, playlist and search sizes must be greater than 0
    /// - At least one autoplay attempt
    /// - A non-empty command prefix
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 200 {
            anyhow::bail!("Default volume must be between 0 and 200, got: {}", self.default_volume);
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.search_results == 0 {
            anyhow::bail!("Search results must be greater than 0");
        }

        if self.autoplay_attempts == 0 {
            anyhow::bail!("Autoplay attempts must be greater than 0");
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Returns a summary of the current configuration for logging, without the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {}, prefix '{}'\n  \
            Audio: {}% vol, {} queue, {} playlist, {} autoplay attempts\n  \
            Sources: {} ({} search results)\n  \
            Idle timeout: {}s, data dir: {}",
            self.application_id,
            self.command_prefix,
            self.default_volume,
            self.max_queue_size,
            self.max_playlist_size,
            self.autoplay_attempts,
            self.ytdlp_path,
            self.search_results,
            self.idle_timeout,
            self.data_dir.display()
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            command_prefix: "!".to_string(),

            default_volume: 100,
            max_queue_size: 1000,
            max_playlist_size: 100,
            autoplay_attempts: 3,

            search_results: 5,
            ytdlp_path: "yt-dlp".to_string(),

            data_dir: "/app/data".into(),

            idle_timeout: 300,
        }
    }
}
