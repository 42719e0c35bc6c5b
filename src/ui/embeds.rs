use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    notify::FinishReason,
    queue::{QueueInfo, RepeatMode},
    track::TrackRecord,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Jukebox";
pub const ITEMS_PER_PAGE: usize = 10;

fn duration_field(track: &TrackRecord) -> String {
    match track.duration {
        Some(duration) if !track.is_live() => format_duration(duration),
        _ => "🔴 En vivo".to_string(),
    }
}

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(track: &TrackRecord, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field(
            "🎤 Artista",
            track.artist.as_deref().unwrap_or("Desconocido"),
            true,
        )
        .field("⏱️ Duración", duration_field(track), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .field("📍 Posición", format!("#{}", position + 1), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn finished_embed(track: &TrackRecord, position: usize, reason: FinishReason) -> CreateEmbed {
    let (title, color) = match reason {
        FinishReason::Ended => ("✅ Canción Terminada", colors::NEUTRAL_GRAY),
        FinishReason::Skipped => ("⏭️ Canción Saltada", colors::INFO_BLUE),
        FinishReason::Stopped => ("⏹️ Reproducción Detenida", colors::ERROR_RED),
    };

    CreateEmbed::default()
        .title(title)
        .description(format!("**{}** (#{})", track.title, position + 1))
        .color(color)
        .url(&track.url)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregaron canciones
pub fn tracks_added_embed(tracks: &[TrackRecord], first_position: usize) -> CreateEmbed {
    let embed = match tracks {
        [track] => {
            let mut embed = CreateEmbed::default()
                .title("✅ Canción Agregada")
                .description(format!(
                    "**{}** se ha agregado a la cola en la posición #{}",
                    track.title,
                    first_position + 1
                ))
                .color(colors::SUCCESS_GREEN)
                .field("⏱️ Duración", duration_field(track), true);
            if let Some(thumbnail) = &track.thumbnail {
                embed = embed.thumbnail(thumbnail);
            }
            embed.url(&track.url)
        }
        _ => {
            let total: Duration = tracks.iter().filter_map(|track| track.duration).sum();
            CreateEmbed::default()
                .title("📋 Playlist Agregada")
                .description(format!(
                    "Se agregaron **{} canciones** a la cola de reproducción",
                    tracks.len()
                ))
                .color(colors::SUCCESS_GREEN)
                .field("⏱️ Duración total", humantime::format_duration(total).to_string(), true)
        }
    };
    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de la cola (páginas desde 1)
pub fn queue_embed(info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = info.page(page, ITEMS_PER_PAGE);

    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now());

    if queue_page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `!play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY);
    }

    let description = queue_page
        .entries
        .iter()
        .map(|(index, entry)| {
            let marker = if info.current == Some(*index) { "▶️ " } else { "" };
            format!(
                "{}**{}**. {} `[{}]`",
                marker,
                index + 1,
                entry.track.title,
                duration_field(&entry.track)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mode = match info.repeat_mode {
        RepeatMode::Off => "➡️ Sin repetición",
        RepeatMode::Single => "🔂 Repetir canción",
        RepeatMode::All => "🔁 Repetir cola",
    };

    embed
        .description(description)
        .field("🔁 Modo", mode, true)
        .field("🔀 Aleatorio", on_off(info.shuffle), true)
        .field("📻 Autoplay", on_off(info.autoplay), true)
        .field("🔊 Volumen", format!("{}%", info.volume_percent), true)
        .field(
            "⏱️ Duración total",
            humantime::format_duration(info.total_duration).to_string(),
            true,
        )
        .field(
            "📄 Página",
            format!("{}/{}", queue_page.current_page, queue_page.total_pages),
            true,
        )
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::MUSIC_PURPLE)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "Activado"
    } else {
        "Desactivado"
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_track_durations() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
