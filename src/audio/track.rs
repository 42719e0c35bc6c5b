use chrono::{DateTime, TimeZone, Utc};
use serenity::model::id::UserId;
use std::time::Duration;
use url::Url;

/// Minutes before a signed stream URL's expiry at which it is already treated as expired.
pub const EXPIRY_MARGIN_MINUTES: i64 = 30;

/// Metadata for one playable item.
///
/// `stream_url` is `None` until a resolver fills it in on the first play
/// attempt. Signed URLs carry an expiry in `source_expires_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub stream_url: Option<String>,
    /// `None` for livestreams.
    pub duration: Option<Duration>,
    pub requested_by: UserId,
    pub source_expires_at: Option<DateTime<Utc>>,
}

impl TrackRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            artist: None,
            thumbnail: None,
            stream_url: None,
            duration: None,
            requested_by: UserId::new(1),
            source_expires_at: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = user_id;
        self
    }

    /// Attaches a resolved stream URL. When no explicit expiry is given the
    /// `expire` query parameter of the URL is used, if present.
    pub fn with_stream_url(
        mut self,
        stream_url: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let stream_url = stream_url.into();
        self.source_expires_at = expires_at.or_else(|| expiry_from_stream_url(&stream_url));
        self.stream_url = Some(stream_url);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.stream_url.is_some()
    }

    pub fn is_live(&self) -> bool {
        self.duration.is_none()
    }

    /// True once `now` is past the expiry minus [`EXPIRY_MARGIN_MINUTES`].
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.source_expires_at {
            Some(expires_at) => now > expires_at - chrono::Duration::minutes(EXPIRY_MARGIN_MINUTES),
            None => false,
        }
    }

    /// Whether the stream must be (re-)resolved before it can be played.
    pub fn needs_resolution(&self, now: DateTime<Utc>) -> bool {
        !self.is_resolved() || self.is_expired(now)
    }
}

/// Extracts the expiry embedded in a signed stream URL (`...&expire=1700000000&...`).
pub fn expiry_from_stream_url(stream_url: &str) -> Option<DateTime<Utc>> {
    let parsed = Url::parse(stream_url).ok()?;
    let (_, value) = parsed.query_pairs().find(|(key, _)| key == "expire")?;
    let seconds = value.parse::<i64>().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}
