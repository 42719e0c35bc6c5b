use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::player::{Player, PlayerDeps, PlayerOptions},
    storage::GuildSettings,
};

/// Un reproductor por guild, creado bajo demanda.
///
/// Creation never holds a map shard across the settings load; if two
/// callers race, the first insert wins and the other player is dropped
/// before anyone sees it.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<Player>>,
    deps: PlayerDeps,
    options: PlayerOptions,
    /// Settings used when the store cannot be read.
    fallback: GuildSettings,
}

impl PlayerRegistry {
    pub fn new(deps: PlayerDeps, options: PlayerOptions, fallback: GuildSettings) -> Self {
        Self {
            players: DashMap::new(),
            deps,
            options,
            fallback,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|player| player.clone())
    }

    /// Returns the guild's player, creating it from stored settings if needed.
    pub async fn get_or_create(&self, guild_id: GuildId) -> Arc<Player> {
        if let Some(player) = self.get(guild_id) {
            return player;
        }

        let settings = match self.deps.store.load(guild_id).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "💾 No se pudo cargar la configuración de guild {}: {}. Usando valores por defecto",
                    guild_id, e
                );
                self.fallback
            }
        };

        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🎛️ Nuevo reproductor para guild {}", guild_id);
                Player::new(guild_id, settings, self.options, self.deps.clone())
            })
            .clone()
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    /// Detiene y desconecta el reproductor del guild y lo elimina.
    ///
    /// Only the player that was reset is removed; one created concurrently
    /// in its place is left alone.
    pub async fn reset(&self, guild_id: GuildId) -> bool {
        let Some(player) = self.get(guild_id) else {
            return false;
        };

        player.reset().await;
        self.players
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &player));
        info!("🧹 Reproductor eliminado para guild {}", guild_id);
        true
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{player::PlayerState, queue::RepeatMode, testing::*},
        error::StoreError,
        storage::MockGuildConfigStore,
    };
    use pretty_assertions::assert_eq;

    fn registry(store: MockGuildConfigStore) -> PlayerRegistry {
        let fakes = fakes(no_autoplay(), Arc::new(store));
        PlayerRegistry::new(fakes.deps, options(), GuildSettings::default())
    }

    #[tokio::test]
    async fn creates_player_once_with_stored_settings() {
        let mut store = MockGuildConfigStore::new();
        store.expect_load().times(1).returning(|_| {
            Ok(GuildSettings {
                volume: 40,
                repeat_mode: RepeatMode::All,
                ..Default::default()
            })
        });
        let registry = registry(store);

        let first = registry.get_or_create(guild()).await;
        let second = registry.get_or_create(guild()).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        let queue = first.snapshot().queue;
        assert_eq!(queue.volume_percent, 40);
        assert_eq!(queue.repeat_mode, RepeatMode::All);
    }

    #[tokio::test]
    async fn unreadable_settings_fall_back_to_defaults() {
        let mut store = MockGuildConfigStore::new();
        store.expect_load().returning(|_| {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            )))
        });
        let registry = registry(store);

        let player = registry.get_or_create(guild()).await;

        assert_eq!(player.snapshot().queue.volume_percent, 100);
        assert_eq!(player.state(), PlayerState::Stopped);
    }

    #[tokio::test]
    async fn reset_tears_down_and_forgets_the_player() {
        let mut store = MockGuildConfigStore::new();
        store.expect_load().returning(|_| Ok(GuildSettings::default()));
        let registry = registry(store);

        let player = registry.get_or_create(guild()).await;
        player.connect(channel()).await.unwrap();

        assert!(registry.reset(guild()).await);
        assert_eq!(player.state(), PlayerState::Removed);
        assert!(registry.get(guild()).is_none());
        assert!(registry.is_empty());

        let fresh = registry.get_or_create(guild()).await;
        assert!(!Arc::ptr_eq(&player, &fresh));
        assert_eq!(fresh.state(), PlayerState::Stopped);
    }

    #[tokio::test]
    async fn reset_of_unknown_guild_is_a_no_op() {
        let registry = registry(MockGuildConfigStore::new());
        assert!(!registry.reset(guild()).await);
    }

    #[tokio::test]
    async fn guilds_are_isolated() {
        let mut store = MockGuildConfigStore::new();
        store.expect_load().returning(|_| Ok(GuildSettings::default()));
        store.expect_save().returning(|_, _| Ok(()));
        let registry = registry(store);

        let a = registry.get_or_create(GuildId::new(1)).await;
        let b = registry.get_or_create(GuildId::new(2)).await;
        a.update_volume(10).await;

        assert_eq!(b.snapshot().queue.volume_percent, 100);
        let mut guilds = registry.guilds();
        guilds.sort();
        assert_eq!(guilds, vec![GuildId::new(1), GuildId::new(2)]);
        assert!(registry.remove(GuildId::new(1)).is_some());
        assert_eq!(registry.len(), 1);
    }
}
