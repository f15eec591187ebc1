//! Cache record persistence for [`SqliteStore`]

use super::{from_millis, to_millis, CacheStore, SqliteStore};
use crate::error::Result;
use ambi_common::{CacheRecord, TrackId};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn record_from_row(row: &SqliteRow) -> CacheRecord {
    CacheRecord {
        track_id: TrackId::from(row.get::<String, _>("track_id")),
        last_played_at: from_millis(row.get("last_played_at")),
        play_count: row.get::<i64, _>("play_count").max(0) as u64,
        is_cached: row.get::<i64, _>("is_cached") != 0,
        file_size: row.get::<i64, _>("file_size").max(0) as u64,
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn list_records(&self) -> Result<Vec<CacheRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id, last_played_at, play_count, is_cached, file_size
            FROM music_cache_stats
            ORDER BY last_played_at ASC, track_id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn get_record(&self, track_id: &TrackId) -> Result<Option<CacheRecord>> {
        let row = sqlx::query(
            r#"
            SELECT track_id, last_played_at, play_count, is_cached, file_size
            FROM music_cache_stats
            WHERE track_id = ?
            "#,
        )
        .bind(track_id.as_str())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn upsert_record(&self, record: &CacheRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO music_cache_stats (track_id, last_played_at, play_count, is_cached, file_size)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                last_played_at = excluded.last_played_at,
                play_count = excluded.play_count,
                is_cached = excluded.is_cached,
                file_size = excluded.file_size
            "#,
        )
        .bind(record.track_id.as_str())
        .bind(to_millis(record.last_played_at))
        .bind(i64::try_from(record.play_count).unwrap_or(i64::MAX))
        .bind(record.is_cached)
        .bind(i64::try_from(record.file_size).unwrap_or(i64::MAX))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete_record(&self, track_id: &TrackId) -> Result<()> {
        sqlx::query("DELETE FROM music_cache_stats WHERE track_id = ?")
            .bind(track_id.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
