//! Prefix text commands (`!play`, `!skip`, ...) driving the guild's player.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, GuildId, Message, UserId},
    builder::{CreateEmbed, CreateMessage},
};
use std::ops::Range;
use tracing::{info, warn};

use crate::{
    audio::{queue::RepeatMode, registry::PlayerRegistry, track::TrackRecord},
    bot::JukeboxBot,
    error::PlayerError,
    sources::{Resolved, TrackResolver},
    ui::embeds,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Stop,
    Pause,
    Resume,
    /// 1-based page.
    Queue(usize),
    NowPlaying,
    /// Queue indices are 0-based here; users type 1-based positions.
    Jump(usize),
    Remove(usize),
    Move(usize, usize),
    Clear,
    Volume(u16),
    /// `None` cycles Off → All → Single → Off.
    Loop(Option<RepeatMode>),
    Shuffle,
    Autoplay,
    Leave,
    Help,
}

/// Parses a message. `None` when it is not addressed to the bot.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, String>> {
    let body = content.trim().strip_prefix(prefix)?;
    let mut parts = body.split_whitespace();
    let name = parts.next()?.to_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match name.as_str() {
        "play" | "p" => {
            if args.is_empty() {
                return Some(Err("Uso: `play <búsqueda o URL>`".into()));
            }
            Ok(Command::Play(args.join(" ")))
        }
        "skip" | "s" | "next" => Ok(Command::Skip),
        "stop" => Ok(Command::Stop),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "queue" | "q" => match args.first() {
            Some(page) => parse_number(page).map(Command::Queue),
            None => Ok(Command::Queue(1)),
        },
        "nowplaying" | "np" => Ok(Command::NowPlaying),
        "jump" => position_arg(&args).map(Command::Jump),
        "remove" | "rm" => position_arg(&args).map(Command::Remove),
        "move" | "mv" => match args.as_slice() {
            [from, to] => parse_position(from)
                .and_then(|from| parse_position(to).map(|to| Command::Move(from, to))),
            _ => Err("Uso: `move <desde> <hasta>`".into()),
        },
        "clear" => Ok(Command::Clear),
        "volume" | "vol" => match args.first() {
            Some(value) => value
                .trim_end_matches('%')
                .parse::<u16>()
                .map(Command::Volume)
                .map_err(|_| format!("Volumen inválido: {}", value)),
            None => Err("Uso: `volume <0-200>`".into()),
        },
        "loop" | "repeat" => match args.first().map(|mode| mode.to_lowercase()) {
            None => Ok(Command::Loop(None)),
            Some(mode) => match mode.as_str() {
                "off" => Ok(Command::Loop(Some(RepeatMode::Off))),
                "song" | "track" | "single" => Ok(Command::Loop(Some(RepeatMode::Single))),
                "queue" | "all" => Ok(Command::Loop(Some(RepeatMode::All))),
                other => Err(format!("Modo de repetición desconocido: {}", other)),
            },
        },
        "shuffle" => Ok(Command::Shuffle),
        "autoplay" => Ok(Command::Autoplay),
        "leave" | "disconnect" => Ok(Command::Leave),
        "help" => Ok(Command::Help),
        _ => return None,
    };
    Some(command)
}

fn parse_number(value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("Número inválido: {}", value))
}

/// 1-based user position to 0-based queue index.
fn parse_position(value: &str) -> Result<usize, String> {
    match parse_number(value)? {
        0 => Err("Las posiciones empiezan en 1".into()),
        position => Ok(position - 1),
    }
}

fn position_arg(args: &[&str]) -> Result<usize, String> {
    match args.first() {
        Some(value) => parse_position(value),
        None => Err("Falta la posición".into()),
    }
}

fn next_repeat_mode(mode: RepeatMode) -> RepeatMode {
    match mode {
        RepeatMode::Off => RepeatMode::All,
        RepeatMode::All => RepeatMode::Single,
        RepeatMode::Single => RepeatMode::Off,
    }
}

pub async fn handle_message(ctx: &Context, msg: &Message, bot: &JukeboxBot) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let Some(parsed) = parse(&bot.config.command_prefix, &msg.content) else {
        return Ok(());
    };

    let embed = match parsed {
        Ok(command) => {
            info!("🎮 Comando {:?} en guild {}", command, guild_id);
            bot.notifier.bind(guild_id, msg.channel_id);
            match execute(ctx, msg, bot, guild_id, command).await {
                Ok(embed) => embed,
                Err(e) => {
                    warn!("Error ejecutando comando: {:?}", e);
                    embeds::error_embed("Error", &e.to_string())
                }
            }
        }
        Err(usage) => embeds::error_embed("Comando inválido", &usage),
    };

    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

async fn execute(
    ctx: &Context,
    msg: &Message,
    bot: &JukeboxBot,
    guild_id: GuildId,
    command: Command,
) -> Result<CreateEmbed> {
    let registry: &PlayerRegistry = &bot.registry;
    let player = || registry.get(guild_id).ok_or(PlayerError::NotConnected);

    let embed = match command {
        Command::Play(query) => {
            let channel_id = get_user_voice_channel(ctx, guild_id, msg.author.id)?;
            play(bot, guild_id, channel_id, msg.author.id, &query).await?
        }
        Command::Help => help_embed(&bot.config.command_prefix),
        Command::Leave => {
            bot.idle.cancel(guild_id);
            if registry.reset(guild_id).await {
                embeds::success_embed("Desconectado", "👋 Hasta la próxima")
            } else {
                embeds::error_embed("Sin conexión", "No estoy en un canal de voz")
            }
        }
        Command::Skip => {
            player()?.skip().await?;
            embeds::success_embed("Saltada", "⏭️ Siguiente canción")
        }
        Command::Stop => {
            player()?.stop().await?;
            embeds::success_embed("Detenido", "⏹️ Reproducción detenida")
        }
        Command::Pause => {
            player()?.pause().await?;
            embeds::success_embed("Pausado", "⏸️ Reproducción pausada")
        }
        Command::Resume => {
            player()?.resume().await?;
            embeds::success_embed("Reanudado", "▶️ Reproducción reanudada")
        }
        Command::Queue(page) => embeds::queue_embed(&player()?.snapshot().queue, page),
        Command::NowPlaying => {
            let snapshot = player()?.snapshot();
            match (snapshot.queue.current_entry(), snapshot.queue.current) {
                (Some(entry), Some(position)) if snapshot.state.is_active() => {
                    embeds::now_playing_embed(&entry.track, position)
                }
                _ => embeds::error_embed("Nada sonando", "No hay ninguna canción en reproducción"),
            }
        }
        Command::Jump(index) => {
            player()?.jump(index).await?;
            embeds::success_embed("Salto", &format!("⏩ Saltando a la posición #{}", index + 1))
        }
        Command::Remove(index) => {
            let track = player()?.remove_at(index).await?;
            embeds::success_embed("Eliminada", &format!("❌ **{}** eliminada de la cola", track.title))
        }
        Command::Move(from, to) => {
            player()?.move_entry(from, to)?;
            embeds::success_embed("Movida", &format!("📍 #{} → #{}", from + 1, to + 1))
        }
        Command::Clear => {
            let removed = player()?.clear();
            embeds::success_embed("Cola limpiada", &format!("🗑️ {} canciones eliminadas", removed))
        }
        Command::Volume(percent) => {
            let applied = player()?.update_volume(percent).await;
            embeds::success_embed("Volumen", &format!("🔊 {}%", applied))
        }
        Command::Loop(mode) => {
            let player = player()?;
            let mode = mode.unwrap_or_else(|| next_repeat_mode(player.snapshot().queue.repeat_mode));
            player.update_repeat_mode(mode);
            embeds::success_embed("Repetición", &format!("🔁 {:?}", mode))
        }
        Command::Shuffle => {
            let player = player()?;
            let enabled = !player.snapshot().queue.shuffle;
            player.update_shuffle(enabled);
            embeds::success_embed("Aleatorio", if enabled { "🔀 Activado" } else { "➡️ Desactivado" })
        }
        Command::Autoplay => {
            let player = player()?;
            let enabled = !player.snapshot().queue.autoplay;
            player.update_autoplay(enabled);
            embeds::success_embed("Autoplay", if enabled { "📻 Activado" } else { "📻 Desactivado" })
        }
    };
    Ok(embed)
}

async fn play(
    bot: &JukeboxBot,
    guild_id: GuildId,
    channel_id: ChannelId,
    user_id: UserId,
    query: &str,
) -> Result<CreateEmbed> {
    let tracks = match bot.resolver.resolve(query, user_id).await? {
        // Text commands have no picker; take the best match.
        Resolved::Search(candidates) => candidates.into_iter().take(1).collect(),
        resolved => resolved.into_tracks(),
    };
    if tracks.is_empty() {
        return Ok(embeds::error_embed(
            "Sin resultados",
            &format!("No se encontró nada para: {}", query),
        ));
    }

    let player = bot.registry.get_or_create(guild_id).await;
    player.connect(channel_id).await?;
    bot.idle.cancel(guild_id);

    let range = player.add_to_queue(tracks.clone(), user_id).await?;
    let (added, skipped) = split_accepted(tracks, &range);
    let mut embed = embeds::tracks_added_embed(&added, range.start);
    if skipped > 0 {
        warn!("📋 {} canciones no cupieron en la cola de guild {}", skipped, guild_id);
        embed = embed.field(
            "⚠️ Cola llena",
            format!("{} canciones no cupieron en la cola", skipped),
            false,
        );
    }
    Ok(embed)
}

/// Splits off the tracks the queue cap cut from the end of an append.
fn split_accepted(
    mut tracks: Vec<TrackRecord>,
    range: &Range<usize>,
) -> (Vec<TrackRecord>, usize) {
    let skipped = tracks.len().saturating_sub(range.len());
    tracks.truncate(range.len());
    (tracks, skipped)
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

fn help_embed(prefix: &str) -> CreateEmbed {
    let lines = [
        ("play <búsqueda|URL>", "Agrega música a la cola"),
        ("skip", "Salta la canción actual"),
        ("stop", "Detiene la reproducción"),
        ("pause / resume", "Pausa o reanuda"),
        ("queue [página]", "Muestra la cola"),
        ("nowplaying", "Canción actual"),
        ("jump <n>", "Salta a la posición n"),
        ("remove <n>", "Elimina la posición n"),
        ("move <a> <b>", "Mueve una canción"),
        ("clear", "Vacía la cola"),
        ("volume <0-200>", "Ajusta el volumen"),
        ("loop [off|song|queue]", "Modo de repetición"),
        ("shuffle / autoplay", "Alterna aleatorio o autoplay"),
        ("leave", "Sale del canal de voz"),
    ];
    let description = lines
        .iter()
        .map(|(usage, text)| format!("`{}{}` {}", prefix, usage, text))
        .collect::<Vec<_>>()
        .join("\n");
    embeds::success_embed("Comandos", &description)
}
