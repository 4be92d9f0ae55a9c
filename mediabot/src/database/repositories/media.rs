//! Media repository: records, status updates and subscriptions.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{MediaDbModel, season_column};
use crate::database::time::now_ms;
use crate::domain::{MediaKey, MediaKind, MediaRecord, MediaUpdate};
use crate::{Error, Result};

/// Media store trait consumed by the crawler and the command dispatcher.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Find the record addressed by `key`.
    async fn find_media(&self, key: &MediaKey) -> Result<Option<MediaRecord>>;

    /// All records of `kind` that have not ended yet. `Any` matches every kind.
    async fn find_all_pending(&self, kind: MediaKind) -> Result<Vec<MediaRecord>>;

    /// Apply a partial update. Fails with `NotFound` when no record matches
    /// and with `Validation` on an illegal status transition.
    async fn update_fields(&self, key: &MediaKey, update: &MediaUpdate) -> Result<()>;

    /// Users to notify about `key`: its subscribers plus everyone who opted
    /// into all notifications. Sorted and deduplicated.
    async fn users_subscribed_to(&self, key: &MediaKey) -> Result<Vec<i64>>;

    /// Insert a record or replace its fields.
    async fn upsert_media(&self, record: &MediaRecord) -> Result<()>;

    /// Subscribe a user to a record, creating the user if needed.
    async fn subscribe(&self, user_id: i64, key: &MediaKey) -> Result<()>;

    /// Toggle the "notify me about everything" option.
    async fn set_notify_all(&self, user_id: i64, enabled: bool) -> Result<()>;
}

const FIND_BY_KEY: &str = r#"
    SELECT * FROM media
    WHERE media_id = ?
      AND (? = 'ANY' OR kind = ?)
      AND (? IS NULL OR season = ?)
    ORDER BY kind, season
    LIMIT 1
"#;

/// SQLx implementation of MediaStore.
pub struct SqlxMediaStore {
    pool: SqlitePool,
}

impl SqlxMediaStore {
    /// Create a new SqlxMediaStore with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ensure_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MediaStore for SqlxMediaStore {
    async fn find_media(&self, key: &MediaKey) -> Result<Option<MediaRecord>> {
        let season = key.season.map(i64::from);
        let row = sqlx::query_as::<_, MediaDbModel>(FIND_BY_KEY)
            .bind(key.media_id as i64)
            .bind(key.kind.as_str())
            .bind(key.kind.as_str())
            .bind(season)
            .bind(season)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MediaRecord::try_from).transpose()
    }

    async fn find_all_pending(&self, kind: MediaKind) -> Result<Vec<MediaRecord>> {
        let rows = sqlx::query_as::<_, MediaDbModel>(
            r#"
            SELECT * FROM media
            WHERE status != 'ENDED' AND (? = 'ANY' OR kind = ?)
            ORDER BY media_id, kind, season
            "#,
        )
        .bind(kind.as_str())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MediaRecord::try_from).collect()
    }

    async fn update_fields(&self, key: &MediaKey, update: &MediaUpdate) -> Result<()> {
        let season = key.season.map(i64::from);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MediaDbModel>(FIND_BY_KEY)
            .bind(key.media_id as i64)
            .bind(key.kind.as_str())
            .bind(key.kind.as_str())
            .bind(season)
            .bind(season)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("media", key.to_string()))?;
        let current = MediaRecord::try_from(row)?;
        if let Some(target) = update.status {
            current.status.transition_to(target)?;
        }

        sqlx::query(
            r#"
            UPDATE media SET
                status = COALESCE(?, status),
                download_url = COALESCE(?, download_url),
                detail_url = COALESCE(?, detail_url),
                tracker = COALESCE(?, tracker),
                torrent_handle = COALESCE(?, torrent_handle),
                current_episodes = COALESCE(?, current_episodes),
                in_library = COALESCE(?, in_library),
                updated_at = ?
            WHERE media_id = ? AND kind = ? AND season = ?
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.download_url)
        .bind(&update.detail_url)
        .bind(&update.tracker)
        .bind(&update.torrent_handle)
        .bind(update.current_episodes.map(i64::from))
        .bind(update.in_library)
        .bind(now_ms())
        .bind(current.media_id as i64)
        .bind(current.kind.as_str())
        .bind(season_column(current.season))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn users_subscribed_to(&self, key: &MediaKey) -> Result<Vec<i64>> {
        let season = key.season.map(i64::from);
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM user_media
            WHERE media_id = ?
              AND (? = 'ANY' OR kind = ?)
              AND (? IS NULL OR season = ?)
            UNION
            SELECT user_id FROM user_options WHERE notify_all = 1
            ORDER BY user_id
            "#,
        )
        .bind(key.media_id as i64)
        .bind(key.kind.as_str())
        .bind(key.kind.as_str())
        .bind(season)
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn upsert_media(&self, record: &MediaRecord) -> Result<()> {
        if record.kind == MediaKind::Any {
            return Err(Error::validation("media records need a concrete kind"));
        }
        let row = MediaDbModel::from_record(record, now_ms());
        sqlx::query(
            r#"
            INSERT INTO media (
                media_id, kind, season, title, year, episodes_total, current_episodes,
                download_url, detail_url, tracker, torrent_handle, catalog_url,
                status, in_library, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (media_id, kind, season) DO UPDATE SET
                title = excluded.title,
                year = excluded.year,
                episodes_total = excluded.episodes_total,
                current_episodes = excluded.current_episodes,
                download_url = excluded.download_url,
                detail_url = excluded.detail_url,
                tracker = excluded.tracker,
                torrent_handle = excluded.torrent_handle,
                catalog_url = excluded.catalog_url,
                status = excluded.status,
                in_library = excluded.in_library,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(row.media_id)
        .bind(&row.kind)
        .bind(row.season)
        .bind(&row.title)
        .bind(row.year)
        .bind(row.episodes_total)
        .bind(row.current_episodes)
        .bind(&row.download_url)
        .bind(&row.detail_url)
        .bind(&row.tracker)
        .bind(&row.torrent_handle)
        .bind(&row.catalog_url)
        .bind(&row.status)
        .bind(row.in_library)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn subscribe(&self, user_id: i64, key: &MediaKey) -> Result<()> {
        let record = self
            .find_media(key)
            .await?
            .ok_or_else(|| Error::not_found("media", key.to_string()))?;
        self.ensure_user(user_id).await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_media (user_id, media_id, kind, season, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(record.media_id as i64)
        .bind(record.kind.as_str())
        .bind(season_column(record.season))
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_notify_all(&self, user_id: i64, enabled: bool) -> Result<()> {
        self.ensure_user(user_id).await?;
        sqlx::query(
            r#"
            INSERT INTO user_options (user_id, notify_all) VALUES (?, ?)
            ON CONFLICT (user_id) DO UPDATE SET notify_all = excluded.notify_all
            "#,
        )
        .bind(user_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool, run_migrations};
    use crate::domain::AcquisitionStatus;

    async fn store() -> SqlxMediaStore {
        let pool = init_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlxMediaStore::new(pool)
    }

    #[tokio::test]
    async fn test_update_fields_keeps_unset_columns() {
        let store = store().await;
        let mut film = MediaRecord::film(10, "Heat", 1995);
        film.tracker = Some("jackett".to_string());
        store.upsert_media(&film).await.unwrap();

        let update = MediaUpdate {
            download_url: Some("http://t/1".to_string()),
            ..Default::default()
        };
        store.update_fields(&film.key(), &update).await.unwrap();

        let found = store.find_media(&film.key()).await.unwrap().unwrap();
        assert_eq!(found.download_url.as_deref(), Some("http://t/1"));
        assert_eq!(found.tracker.as_deref(), Some("jackett"));
        assert_eq!(found.status, AcquisitionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = store().await;
        let result = store
            .update_fields(&MediaKey::film(404), &MediaUpdate::default())
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let store = store().await;
        let mut film = MediaRecord::film(11, "Ronin", 1998);
        film.status = AcquisitionStatus::FindTorrent;
        store.upsert_media(&film).await.unwrap();

        let update = MediaUpdate::default().with_status(AcquisitionStatus::InProgress);
        let result = store.update_fields(&film.key(), &update).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_any_kind_key_finds_serial() {
        let store = store().await;
        store
            .upsert_media(&MediaRecord::serial(12, "Dark", 2017, 1))
            .await
            .unwrap();

        let key = MediaKey {
            media_id: 12,
            kind: MediaKind::Any,
            season: None,
        };
        let found = store.find_media(&key).await.unwrap().unwrap();
        assert_eq!(found.season, Some(1));
        assert!(store.find_media(&MediaKey::film(12)).await.unwrap().is_none());
    }
}
