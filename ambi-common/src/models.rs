//! Core data model shared by the queue, cache and playback layers

use crate::position_key::PositionKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stable identity of a track in the venue library
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Staff rating of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Like,
    Dislike,
    #[default]
    #[serde(rename = "none")]
    Neutral,
}

impl Rating {
    /// Storage representation ("like", "dislike", "none")
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Like => "like",
            Rating::Dislike => "dislike",
            Rating::Neutral => "none",
        }
    }

    /// Parse the storage representation, treating anything unknown as unrated
    pub fn from_db(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("like") => Rating::Like,
            Some("dislike") => Rating::Dislike,
            _ => Rating::Neutral,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable track as known to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Duration in seconds (0.0 when unknown)
    pub duration_secs: f64,
    #[serde(default)]
    pub rating: Rating,
    /// Library-relative path understood by the media origin
    pub locator: String,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>, duration_secs: f64) -> Self {
        let id = id.into();
        Self {
            locator: format!("{}.mp3", id),
            id,
            title: title.into(),
            artist: String::new(),
            album: String::new(),
            duration_secs,
            rating: Rating::Neutral,
        }
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }

    pub fn is_disliked(&self) -> bool {
        self.rating == Rating::Dislike
    }

    /// Duration as a `Duration`, `None` when unknown
    pub fn duration(&self) -> Option<Duration> {
        if self.duration_secs > 0.0 {
            Duration::try_from_secs_f64(self.duration_secs).ok()
        } else {
            None
        }
    }
}

/// One slot of the play queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub track: Track,
    pub position: PositionKey,
    pub is_current: bool,
    pub added_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn track_id(&self) -> &TrackId {
        &self.track.id
    }
}

/// Play history and cache state of one track
///
/// Records outlive eviction: `is_cached` flips back to false but the play
/// history is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub track_id: TrackId,
    pub last_played_at: DateTime<Utc>,
    pub play_count: u64,
    pub is_cached: bool,
    /// Bytes on disk, 0 when never downloaded
    pub file_size: u64,
}

impl CacheRecord {
    /// Record for a track that has never been played or downloaded
    pub fn unseen(track_id: TrackId, now: DateTime<Utc>) -> Self {
        Self {
            track_id,
            last_played_at: now,
            play_count: 0,
            is_cached: false,
            file_size: 0,
        }
    }
}

/// Where a channel should read a track from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum MediaSource {
    /// File in the local cache directory
    Local(PathBuf),
    /// Streaming locator served by the media origin
    Remote(String),
}

impl MediaSource {
    pub fn is_local(&self) -> bool {
        matches!(self, MediaSource::Local(_))
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Local(path) => write!(f, "file://{}", path.display()),
            MediaSource::Remote(url) => f.write_str(url),
        }
    }
}

/// Identity of one of the two alternating output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    A,
    B,
}

impl ChannelId {
    pub fn other(self) -> Self {
        match self {
            ChannelId::A => ChannelId::B,
            ChannelId::B => ChannelId::A,
        }
    }

    /// Slot index into a two-element channel array
    pub fn index(self) -> usize {
        match self {
            ChannelId::A => 0,
            ChannelId::B => 1,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::A => write!(f, "A"),
            ChannelId::B => write!(f, "B"),
        }
    }
}

/// Player state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Queue repeat behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatMode::None => write!(f, "none"),
            RepeatMode::One => write!(f, "one"),
            RepeatMode::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for RepeatMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(RepeatMode::None),
            "one" | "track" => Ok(RepeatMode::One),
            "all" | "queue" => Ok(RepeatMode::All),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown repeat mode '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_storage_strings() {
        assert_eq!(Rating::from_db(Some("dislike")), Rating::Dislike);
        assert_eq!(Rating::from_db(Some("LIKE")), Rating::Like);
        assert_eq!(Rating::from_db(Some("meh")), Rating::Neutral);
        assert_eq!(Rating::from_db(None), Rating::Neutral);
        assert_eq!(Rating::Neutral.as_str(), "none");
    }

    #[test]
    fn test_rating_serializes_as_spec_strings() {
        let json = serde_json::to_string(&Rating::Neutral).unwrap();
        assert_eq!(json, "\"none\"");
        let parsed: Rating = serde_json::from_str("\"dislike\"").unwrap();
        assert_eq!(parsed, Rating::Dislike);
    }

    #[test]
    fn test_track_duration_unknown() {
        let track = Track::new("t1", "Intro", 0.0);
        assert_eq!(track.duration(), None);
        let track = Track::new("t2", "Body", 90.5);
        assert_eq!(track.duration(), Some(Duration::from_millis(90_500)));
    }

    #[test]
    fn test_channel_other() {
        assert_eq!(ChannelId::A.other(), ChannelId::B);
        assert_eq!(ChannelId::B.other().other(), ChannelId::B);
        assert_eq!(ChannelId::B.index(), 1);
    }

    #[test]
    fn test_repeat_mode_parse() {
        assert_eq!("all".parse::<RepeatMode>().unwrap(), RepeatMode::All);
        assert_eq!(" One ".parse::<RepeatMode>().unwrap(), RepeatMode::One);
        assert!("sometimes".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn test_media_source_display() {
        let remote = MediaSource::Remote("http://origin/music/stream?id=1".to_string());
        assert_eq!(remote.to_string(), "http://origin/music/stream?id=1");
        assert!(!remote.is_local());
        assert!(MediaSource::Local(PathBuf::from("/tmp/x.cache")).is_local());
    }
}
