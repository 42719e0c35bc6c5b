//! # Bot Module
//!
//! Discord runtime around the playback engine:
//! - Text command handling ([`commands`])
//! - The songbird audio sink ([`voice`])
//! - Voice lifecycle: cleanup when the bot is disconnected, auto-pause and
//!   auto-leave ([`idle`]) when it is left alone in its channel

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod idle;
pub mod voice;

use crate::{
    audio::{player::PlayerState, registry::PlayerRegistry},
    bot::idle::IdleTimers,
    config::Config,
    sources::TrackResolver,
    ui::ChannelNotifier,
};

/// Main Discord event handler.
pub struct JukeboxBot {
    pub config: Arc<Config>,
    pub registry: Arc<PlayerRegistry>,
    pub resolver: Arc<dyn TrackResolver>,
    pub notifier: Arc<ChannelNotifier>,
    pub idle: IdleTimers,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry>,
        resolver: Arc<dyn TrackResolver>,
        notifier: Arc<ChannelNotifier>,
    ) -> Self {
        let idle = IdleTimers::new(config.idle_timeout());
        Self {
            config,
            registry,
            resolver,
            notifier,
            idle,
        }
    }

    /// Cleans up after the bot left (or was kicked from) a voice channel.
    async fn on_bot_disconnected(&self, guild_id: GuildId) {
        info!("🔌 Bot desconectado en guild {}", guild_id);
        self.idle.cancel(guild_id);
        self.registry.reset(guild_id).await;
        self.notifier.unbind(guild_id);
    }

    /// Pauses and schedules auto-leave when nobody is listening, and undoes
    /// both when someone comes back.
    async fn check_listeners(&self, ctx: &Context, guild_id: GuildId) {
        let Some(player) = self.registry.get(guild_id) else {
            return;
        };
        let Some(channel_id) = player.snapshot().channel_id else {
            return;
        };
        let Some(alone) = is_alone(ctx, guild_id, channel_id) else {
            return;
        };

        if alone {
            if let Err(e) = player.auto_pause().await {
                warn!("⚠️ No se pudo pausar en guild {}: {}", guild_id, e);
            }

            let registry = self.registry.clone();
            let scheduled = self.idle.schedule(guild_id, async move {
                info!("🚪 Auto-desconexión por inactividad en guild {}", guild_id);
                registry.reset(guild_id).await;
            });
            if scheduled {
                info!(
                    "🚪 Programando auto-desconexión por inactividad en guild {}",
                    guild_id
                );
            }
        } else {
            self.idle.cancel(guild_id);
            if player.state() == PlayerState::AutoPaused {
                if let Err(e) = player.resume().await {
                    warn!("⚠️ No se pudo reanudar en guild {}: {}", guild_id, e);
                }
            }
        }
    }
}

/// Whether no human besides the bot is in `channel_id`. `None` when the
/// guild is not cached.
fn is_alone(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<bool> {
    let bot_id: UserId = ctx.cache.current_user().id;
    let guild = ctx.cache.guild(guild_id)?;

    let listeners = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| state.member.as_ref().map_or(true, |member| !member.user.bot))
        .count();

    Some(listeners == 0)
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("💬 Prefijo de comandos: {}", self.config.command_prefix);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = commands::handle_message(&ctx, &msg, self).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id && old.is_some() && new.channel_id.is_none() {
            self.on_bot_disconnected(guild_id).await;
            return;
        }

        self.check_listeners(&ctx, guild_id).await;
    }
}
