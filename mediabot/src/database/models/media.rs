//! Media database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{AcquisitionStatus, MediaKind, MediaRecord};
use crate::{Error, Result};

/// Row of the `media` table. Films are stored with season 0.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaDbModel {
    pub media_id: i64,
    /// `FILM` or `SERIAL`
    pub kind: String,
    pub season: i64,
    pub title: String,
    pub year: i64,
    pub episodes_total: i64,
    pub current_episodes: i64,
    pub download_url: Option<String>,
    pub detail_url: Option<String>,
    pub tracker: Option<String>,
    pub torrent_handle: Option<String>,
    pub catalog_url: Option<String>,
    /// `IN_PROGRESS`, `FIND_TORRENT` or `ENDED`
    pub status: String,
    pub in_library: bool,
    /// Unix epoch milliseconds (UTC).
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC).
    pub updated_at: i64,
}

/// Season column value for an optional season.
pub fn season_column(season: Option<u32>) -> i64 {
    season.map(i64::from).unwrap_or(0)
}

impl MediaDbModel {
    pub fn from_record(record: &MediaRecord, now: i64) -> Self {
        Self {
            media_id: record.media_id as i64,
            kind: record.kind.as_str().to_string(),
            season: season_column(record.season),
            title: record.title.clone(),
            year: i64::from(record.year),
            episodes_total: i64::from(record.episodes_total),
            current_episodes: i64::from(record.current_episodes),
            download_url: record.download_url.clone(),
            detail_url: record.detail_url.clone(),
            tracker: record.tracker.clone(),
            torrent_handle: record.torrent_handle.clone(),
            catalog_url: record.catalog_url.clone(),
            status: record.status.as_str().to_string(),
            in_library: record.in_library,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TryFrom<MediaDbModel> for MediaRecord {
    type Error = Error;

    fn try_from(row: MediaDbModel) -> Result<Self> {
        let kind = MediaKind::parse(&row.kind)
            .filter(|k| *k != MediaKind::Any)
            .ok_or_else(|| Error::validation(format!("unknown media kind '{}'", row.kind)))?;
        let status = AcquisitionStatus::parse(&row.status)
            .ok_or_else(|| Error::validation(format!("unknown status '{}'", row.status)))?;
        let season = match (kind, row.season) {
            (MediaKind::Serial, s) if s > 0 => Some(s as u32),
            _ => None,
        };

        Ok(Self {
            media_id: row.media_id as u64,
            kind,
            title: row.title,
            year: row.year as i32,
            season,
            episodes_total: row.episodes_total.max(0) as u32,
            current_episodes: row.current_episodes.max(0) as u32,
            download_url: row.download_url,
            detail_url: row.detail_url,
            tracker: row.tracker,
            torrent_handle: row.torrent_handle,
            catalog_url: row.catalog_url,
            status,
            in_library: row.in_library,
        })
    }
}
