use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{classify_query, AutoplaySource, QueryKind, Resolved, TrackResolver};
use crate::audio::track::TrackRecord;
use crate::config::Config;
use crate::error::ResolveError;

/// Cliente para resolver canciones con yt-dlp
pub struct YtDlpClient {
    binary: String,
    search_results: usize,
    max_playlist_size: usize,
    related_limit: usize,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// Stream URL for full extractions, watch URL for flat playlist entries.
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpClient {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.ytdlp_path.clone(),
            search_results: config.search_results,
            max_playlist_size: config.max_playlist_size,
            related_limit: 10,
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Backend(e.to_string()))?;

        debug!("🔧 yt-dlp {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::Backend(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let target = args.last().copied().unwrap_or_default();
            return Err(classify_ytdlp_error(&stderr, target));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Extracción completa de un solo video, incluyendo la URL de stream.
    async fn extract_single(&self, url: &str) -> Result<TrackRecord, ResolveError> {
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                url,
            ])
            .await?;

        let info: YtDlpInfo = serde_json::from_str(stdout.trim())
            .map_err(|e| ResolveError::Backend(format!("Respuesta inválida de yt-dlp: {e}")))?;
        Ok(info_to_track(info, false))
    }

    /// Listado plano (búsqueda, playlist, mix); las URLs de stream quedan sin resolver.
    async fn extract_flat(&self, target: &str, limit: usize) -> Result<Vec<TrackRecord>, ResolveError> {
        let limit = limit.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                target,
            ])
            .await?;

        Ok(parse_flat_listing(&stdout))
    }
}

#[async_trait]
impl TrackResolver for YtDlpClient {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError> {
        let query = query.trim();
        let resolved = match classify_query(query) {
            QueryKind::Url => Resolved::Track(self.extract_single(query).await?),
            QueryKind::Playlist => {
                info!("📋 Obteniendo playlist: {}", query);
                let tracks = self.extract_flat(query, self.max_playlist_size).await?;
                if tracks.is_empty() {
                    return Err(ResolveError::NotFound(query.to_string()));
                }
                Resolved::Playlist(tracks)
            }
            QueryKind::Search => {
                info!("🔍 Buscando en YouTube: {}", query);
                let search = format!("ytsearch{}:{}", self.search_results, query);
                let tracks = self.extract_flat(&search, self.search_results).await?;
                if tracks.is_empty() {
                    return Err(ResolveError::NotFound(query.to_string()));
                }
                Resolved::Search(tracks)
            }
        };

        Ok(match resolved {
            Resolved::Track(track) => Resolved::Track(track.with_requested_by(requested_by)),
            Resolved::Playlist(tracks) => Resolved::Playlist(with_requester(tracks, requested_by)),
            Resolved::Search(tracks) => Resolved::Search(with_requester(tracks, requested_by)),
        })
    }

    async fn refresh(&self, track: &TrackRecord) -> Result<TrackRecord, ResolveError> {
        debug!("🎵 Obteniendo URL de stream para: {}", track.title);
        let fresh = self.extract_single(&track.url).await?;
        let stream_url = fresh.stream_url.ok_or(ResolveError::Expired)?;

        let mut refreshed = track.clone().with_stream_url(stream_url, fresh.source_expires_at);
        if refreshed.duration.is_none() {
            refreshed.duration = fresh.duration;
        }
        Ok(refreshed)
    }
}

#[async_trait]
impl AutoplaySource for YtDlpClient {
    async fn related_to(&self, track_id: &str) -> Result<Vec<TrackRecord>, ResolveError> {
        let mix = format!("https://www.youtube.com/watch?v={track_id}&list=RD{track_id}");
        let tracks = self.extract_flat(&mix, self.related_limit + 1).await?;
        let related: Vec<_> = tracks.into_iter().filter(|t| t.id != track_id).collect();

        if related.is_empty() {
            warn!("📭 Sin canciones relacionadas para {}", track_id);
        }
        Ok(related)
    }
}

fn with_requester(tracks: Vec<TrackRecord>, requested_by: UserId) -> Vec<TrackRecord> {
    tracks
        .into_iter()
        .map(|track| track.with_requested_by(requested_by))
        .collect()
}

fn parse_flat_listing(stdout: &str) -> Vec<TrackRecord> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info_to_track(info, true)),
            Err(e) => {
                warn!("⚠️ Entrada de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

fn info_to_track(info: YtDlpInfo, flat: bool) -> TrackRecord {
    let page_url = info
        .webpage_url
        .clone()
        .or_else(|| if flat { info.url.clone() } else { None })
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));

    let mut track = TrackRecord::new(
        info.id,
        info.title.unwrap_or_else(|| "Desconocido".to_string()),
        page_url,
    );
    track.artist = info.uploader.or(info.channel);
    track.thumbnail = info.thumbnail;

    if !info.is_live.unwrap_or(false) {
        track.duration = info
            .duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64);
    }

    match info.url {
        Some(stream_url) if !flat => track.with_stream_url(stream_url, None),
        _ => track,
    }
}

fn classify_ytdlp_error(stderr: &str, target: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    if lower.contains("available in your country") || lower.contains("geo restrict") {
        ResolveError::RegionBlocked
    } else if lower.contains("video unavailable")
        || lower.contains("does not exist")
        || lower.contains("no video results")
        || lower.contains("http error 404")
    {
        ResolveError::NotFound(target.to_string())
    } else if lower.contains("http error 403") || lower.contains("signature") {
        ResolveError::Expired
    } else {
        ResolveError::Backend(stderr.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_extraction_carries_stream_url() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "duration": 212.0,
            "uploader": "Rick Astley",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "url": "https://rr3.googlevideo.com/videoplayback?expire=1700000000&itag=251"
        }"#;
        let track = info_to_track(serde_json::from_str(json).unwrap(), false);

        assert_eq!(track.id, "dQw4w9WgXcQ");
        assert_eq!(track.artist.as_deref(), Some("Rick Astley"));
        assert_eq!(track.duration, Some(Duration::from_secs(212)));
        assert!(track.is_resolved());
        assert!(track.source_expires_at.is_some());
    }

    #[test]
    fn flat_entries_stay_unresolved() {
        let stdout = concat!(
            r#"{"id": "a1", "title": "One", "url": "https://www.youtube.com/watch?v=a1", "duration": 100}"#,
            "\n",
            "garbage\n",
            r#"{"id": "b2", "title": "Live", "is_live": true, "duration": 5}"#,
            "\n"
        );
        let tracks = parse_flat_listing(stdout);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].url, "https://www.youtube.com/watch?v=a1");
        assert!(!tracks[0].is_resolved());
        assert_eq!(tracks[1].url, "https://www.youtube.com/watch?v=b2");
        assert!(tracks[1].is_live());
    }

    #[test]
    fn stderr_maps_to_resolve_errors() {
        assert_eq!(
            classify_ytdlp_error("ERROR: The uploader has not made this video available in your country", "x"),
            ResolveError::RegionBlocked
        );
        assert_eq!(
            classify_ytdlp_error("ERROR: [youtube] abc: Video unavailable", "abc"),
            ResolveError::NotFound("abc".into())
        );
        assert_eq!(
            classify_ytdlp_error("ERROR: unable to download: HTTP Error 403: Forbidden", "x"),
            ResolveError::Expired
        );
        assert!(matches!(
            classify_ytdlp_error("boom", "x"),
            ResolveError::Backend(_)
        ));
    }
}
