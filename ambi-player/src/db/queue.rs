//! Queue persistence for [`SqliteStore`]

use super::{from_millis, to_millis, QueueStore, SqliteStore};
use crate::error::Result;
use ambi_common::{PositionKey, QueueEntry, Rating, Track, TrackId};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, warn};

const INSERT_ENTRY: &str = r#"
    INSERT INTO playback_queue
        (track_id, title, artist, album, duration_secs, rating, locator, position, is_current, added_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(track_id) DO UPDATE SET
        title = excluded.title,
        artist = excluded.artist,
        album = excluded.album,
        duration_secs = excluded.duration_secs,
        rating = excluded.rating,
        locator = excluded.locator,
        position = excluded.position,
        is_current = excluded.is_current
"#;

fn bind_entry<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    entry: &'q QueueEntry,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(entry.track.id.as_str())
        .bind(entry.track.title.as_str())
        .bind(entry.track.artist.as_str())
        .bind(entry.track.album.as_str())
        .bind(entry.track.duration_secs)
        .bind(entry.track.rating.as_str())
        .bind(entry.track.locator.as_str())
        .bind(entry.position.as_str())
        .bind(entry.is_current)
        .bind(to_millis(entry.added_at))
}

/// Map one row, `None` when its position key is unusable
fn entry_from_row(row: &SqliteRow) -> Option<QueueEntry> {
    let track_id: String = row.get("track_id");
    let position: String = row.get("position");
    let position = match PositionKey::parse(&position) {
        Ok(key) => key,
        Err(e) => {
            warn!("Dropping stored queue entry {}: {}", track_id, e);
            return None;
        }
    };

    Some(QueueEntry {
        track: Track {
            id: TrackId::from(track_id),
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            duration_secs: row.get("duration_secs"),
            rating: Rating::from_db(row.get::<Option<String>, _>("rating").as_deref()),
            locator: row.get("locator"),
        },
        position,
        is_current: row.get::<i64, _>("is_current") != 0,
        added_at: from_millis(row.get("added_at")),
    })
}

async fn insert_all(tx: &mut Transaction<'_, Sqlite>, entries: &[QueueEntry]) -> Result<()> {
    for entry in entries {
        bind_entry(sqlx::query(INSERT_ENTRY), entry)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn load_queue(&self) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT track_id, title, artist, album, duration_secs, rating, locator,
                   position, is_current, added_at
            FROM playback_queue
            ORDER BY position
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        // BINARY collation orders keys byte-wise, matching PositionKey's Ord
        let entries: Vec<QueueEntry> = rows.iter().filter_map(entry_from_row).collect();
        debug!("Loaded {} queue entries", entries.len());
        Ok(entries)
    }

    async fn save_queue(&self, entries: &[QueueEntry]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM playback_queue")
            .execute(&mut *tx)
            .await?;
        insert_all(&mut tx, entries).await?;
        tx.commit().await?;
        debug!("Saved full queue snapshot ({} entries)", entries.len());
        Ok(())
    }

    async fn upsert_entry(&self, entry: &QueueEntry) -> Result<()> {
        bind_entry(sqlx::query(INSERT_ENTRY), entry)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn remove_entry(&self, track_id: &TrackId) -> Result<()> {
        sqlx::query("DELETE FROM playback_queue WHERE track_id = ?")
            .bind(track_id.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn set_current(&self, track_id: Option<&TrackId>) -> Result<()> {
        match track_id {
            Some(id) => {
                sqlx::query("UPDATE playback_queue SET is_current = (track_id = ?)")
                    .bind(id.as_str())
                    .execute(self.pool())
                    .await?;
            }
            None => {
                sqlx::query("UPDATE playback_queue SET is_current = 0")
                    .execute(self.pool())
                    .await?;
            }
        }
        Ok(())
    }
}
