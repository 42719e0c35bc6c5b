//! # Sources
//!
//! Contracts for turning user input into [`TrackRecord`]s and for finding
//! related tracks when autoplay kicks in, plus the yt-dlp backed adapter
//! implementing both.

pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use serenity::model::id::UserId;
use std::sync::LazyLock;

use crate::audio::track::TrackRecord;
use crate::error::ResolveError;

pub use ytdlp::YtDlpClient;

/// Result of resolving a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A direct URL to a single track.
    Track(TrackRecord),
    /// A playlist URL, in playlist order.
    Playlist(Vec<TrackRecord>),
    /// Ranked candidates for a keyword search; selection happens in the UI.
    Search(Vec<TrackRecord>),
}

impl Resolved {
    pub fn into_tracks(self) -> Vec<TrackRecord> {
        match self {
            Resolved::Track(track) => vec![track],
            Resolved::Playlist(tracks) | Resolved::Search(tracks) => tracks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Url,
    Playlist,
    Search,
}

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://\S+$").expect("valid url regex"));

static PLAYLIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.|music\.|m\.)?youtube\.com/playlist\?(\S*&)?list=[\w-]+")
        .expect("valid playlist regex")
});

/// Decide cómo resolver la entrada del usuario.
pub fn classify_query(query: &str) -> QueryKind {
    let query = query.trim();
    if PLAYLIST_PATTERN.is_match(query) {
        QueryKind::Playlist
    } else if URL_PATTERN.is_match(query) {
        QueryKind::Url
    } else {
        QueryKind::Search
    }
}

#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError>;

    /// Resolves (or re-resolves) the stream URL of `track`.
    async fn refresh(&self, track: &TrackRecord) -> Result<TrackRecord, ResolveError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutoplaySource: Send + Sync {
    /// Tracks related to `track_id`, most relevant first. May be empty.
    async fn related_to(&self, track_id: &str) -> Result<Vec<TrackRecord>, ResolveError>;
}
