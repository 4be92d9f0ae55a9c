//! Media records tracked for acquisition.

use serde::{Deserialize, Serialize};

use super::AcquisitionStatus;

/// Kind of media a request or record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    /// Any kind; only meaningful for broad lookups.
    #[default]
    Any,
    /// A single film.
    Film,
    /// One season of a serial.
    Serial,
}

impl MediaKind {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Film => "FILM",
            Self::Serial => "SERIAL",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ANY" => Some(Self::Any),
            "FILM" | "FILMS" => Some(Self::Film),
            "SERIAL" | "SERIALS" => Some(Self::Serial),
            _ => None,
        }
    }

    /// Whether a record of kind `other` satisfies a lookup for `self`.
    pub fn matches(&self, other: MediaKind) -> bool {
        matches!(self, Self::Any) || *self == other
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a media record: catalog id, kind and (for serials) season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaKey {
    pub media_id: u64,
    pub kind: MediaKind,
    pub season: Option<u32>,
}

impl MediaKey {
    pub fn film(media_id: u64) -> Self {
        Self {
            media_id,
            kind: MediaKind::Film,
            season: None,
        }
    }

    pub fn serial(media_id: u64, season: u32) -> Self {
        Self {
            media_id,
            kind: MediaKind::Serial,
            season: Some(season),
        }
    }

    /// Whether `record` is addressed by this key. `Any` and a missing
    /// season act as wildcards.
    pub fn matches(&self, record: &MediaRecord) -> bool {
        self.media_id == record.media_id
            && self.kind.matches(record.kind)
            && self.season.is_none_or(|s| record.season == Some(s))
    }
}

impl std::fmt::Display for MediaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.season {
            Some(season) => write!(f, "{}:{}:s{}", self.kind, self.media_id, season),
            None => write!(f, "{}:{}", self.kind, self.media_id),
        }
    }
}

/// Snapshot of a media record as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Catalog id; doubles as the id torrent candidates are matched against.
    pub media_id: u64,
    pub kind: MediaKind,
    pub title: String,
    pub year: i32,
    pub season: Option<u32>,
    /// Total number of episodes in the season, 0 when unknown.
    pub episodes_total: u32,
    /// Episodes already present in the last fetched torrent.
    pub current_episodes: u32,
    pub download_url: Option<String>,
    pub detail_url: Option<String>,
    pub tracker: Option<String>,
    /// Handle returned by the torrent client for the last added torrent.
    pub torrent_handle: Option<String>,
    pub catalog_url: Option<String>,
    pub status: AcquisitionStatus,
    pub in_library: bool,
}

impl MediaRecord {
    /// Create a film record in its initial state.
    pub fn film(media_id: u64, title: impl Into<String>, year: i32) -> Self {
        Self {
            media_id,
            kind: MediaKind::Film,
            title: title.into(),
            year,
            season: None,
            episodes_total: 0,
            current_episodes: 0,
            download_url: None,
            detail_url: None,
            tracker: None,
            torrent_handle: None,
            catalog_url: None,
            status: AcquisitionStatus::InProgress,
            in_library: false,
        }
    }

    /// Create a serial season record in its initial state.
    pub fn serial(media_id: u64, title: impl Into<String>, year: i32, season: u32) -> Self {
        Self {
            kind: MediaKind::Serial,
            season: Some(season),
            ..Self::film(media_id, title, year)
        }
    }

    pub fn key(&self) -> MediaKey {
        MediaKey {
            media_id: self.media_id,
            kind: self.kind,
            season: self.season,
        }
    }

    pub fn is_serial(&self) -> bool {
        self.kind == MediaKind::Serial
    }

    /// Resolved download URL, ignoring empty strings.
    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Free-text query used against torrent trackers.
    pub fn text_query(&self) -> String {
        match self.season {
            Some(season) if self.is_serial() => {
                format!("{} {} season {}", self.title, self.year, season)
            }
            _ => format!("{} {}", self.title, self.year),
        }
    }
}

/// Partial update of a media record; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaUpdate {
    pub status: Option<AcquisitionStatus>,
    pub download_url: Option<String>,
    pub detail_url: Option<String>,
    pub tracker: Option<String>,
    pub torrent_handle: Option<String>,
    pub current_episodes: Option<u32>,
    pub in_library: Option<bool>,
}

impl MediaUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_status(mut self, status: AcquisitionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_torrent_handle(mut self, handle: impl Into<String>) -> Self {
        self.torrent_handle = Some(handle.into());
        self
    }

    /// Apply the update to a record in place.
    pub fn apply(&self, record: &mut MediaRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(url) = &self.download_url {
            record.download_url = Some(url.clone());
        }
        if let Some(url) = &self.detail_url {
            record.detail_url = Some(url.clone());
        }
        if let Some(tracker) = &self.tracker {
            record.tracker = Some(tracker.clone());
        }
        if let Some(handle) = &self.torrent_handle {
            record.torrent_handle = Some(handle.clone());
        }
        if let Some(episodes) = self.current_episodes {
            record.current_episodes = episodes;
        }
        if let Some(in_library) = self.in_library {
            record.in_library = in_library;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_query() {
        let film = MediaRecord::film(1, "Heat", 1995);
        assert_eq!(film.text_query(), "Heat 1995");

        let serial = MediaRecord::serial(2, "Dark", 2017, 2);
        assert_eq!(serial.text_query(), "Dark 2017 season 2");
    }

    #[test]
    fn test_empty_download_url_is_unresolved() {
        let mut film = MediaRecord::film(1, "Heat", 1995);
        film.download_url = Some(String::new());
        assert!(film.download_url().is_none());
    }

    #[test]
    fn test_update_apply_only_touches_set_fields() {
        let mut film = MediaRecord::film(1, "Heat", 1995);
        film.tracker = Some("jackett".to_string());

        MediaUpdate::default()
            .with_status(AcquisitionStatus::Ended)
            .with_torrent_handle("abc")
            .apply(&mut film);

        assert_eq!(film.status, AcquisitionStatus::Ended);
        assert_eq!(film.torrent_handle.as_deref(), Some("abc"));
        assert_eq!(film.tracker.as_deref(), Some("jackett"));
        assert!(MediaUpdate::default().is_empty());
    }

    #[test]
    fn test_kind_matching() {
        assert!(MediaKind::Any.matches(MediaKind::Serial));
        assert!(MediaKind::Film.matches(MediaKind::Film));
        assert!(!MediaKind::Film.matches(MediaKind::Serial));
        assert_eq!(MediaKind::parse("serials"), Some(MediaKind::Serial));
    }

    #[test]
    fn test_key_matches_record() {
        let serial = MediaRecord::serial(9, "Dark", 2017, 2);
        assert!(MediaKey::serial(9, 2).matches(&serial));
        assert!(!MediaKey::serial(9, 3).matches(&serial));
        assert!(!MediaKey::film(9).matches(&serial));
        let any = MediaKey {
            media_id: 9,
            kind: MediaKind::Any,
            season: None,
        };
        assert!(any.matches(&serial));
    }
}
