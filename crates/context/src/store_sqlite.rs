/// SQLite-backed implementation of [`ContextStore`].
use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{
    category::Category,
    error::{ContextError, Result},
    schema::run_migrations,
    snapshot::Snapshot,
    store::{ContextMeta, ContextStore, MemoryIndexMeta, StoredItem},
};

pub struct SqliteContextStore {
    pool: SqlitePool,
}

impl SqliteContextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// A private in-memory database. Pinned to one connection so every query
    /// sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_category(raw: &str) -> Result<Category> {
    raw.parse()
        .map_err(|e| ContextError::Corrupt(format!("{e}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ContextError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(ContextError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn load_snapshot(&self, category: Category) -> Result<Option<Snapshot>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT data, created_at FROM snapshots WHERE category = ?")
                .bind(category.as_str())
                .fetch_optional(&self.pool)
                .await?;
        let Some((data, created_at)) = row else {
            return Ok(None);
        };
        let data = serde_json::from_str(&data)
            .map_err(|e| ContextError::Corrupt(format!("{category} snapshot: {e}")))?;
        Ok(Some(Snapshot {
            category,
            data,
            created_at: parse_time(&created_at)?,
        }))
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_string(&snapshot.data)
            .map_err(|e| ContextError::Corrupt(format!("{} snapshot: {e}", snapshot.category)))?;
        let created_at = snapshot.created_at.to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO snapshots (category, data, created_at) VALUES (?, ?, ?)
               ON CONFLICT(category) DO UPDATE SET data = excluded.data, created_at = excluded.created_at"#,
        )
        .bind(snapshot.category.as_str())
        .bind(&data)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"INSERT INTO context_meta (category, last_update) VALUES (?, ?)
               ON CONFLICT(category) DO UPDATE SET last_update = excluded.last_update"#,
        )
        .bind(snapshot.category.as_str())
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(category = %snapshot.category, bytes = data.len(), "snapshot persisted");
        Ok(())
    }

    async fn context_meta(&self) -> Result<ContextMeta> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT category, last_update FROM context_meta")
                .fetch_all(&self.pool)
                .await?;
        let mut meta = ContextMeta::default();
        for (category, last_update) in rows {
            meta.set(parse_category(&category)?, parse_time(&last_update)?);
        }
        Ok(meta)
    }

    async fn index_meta(&self) -> Result<MemoryIndexMeta> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT last_rebuild FROM memory_index_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        let last_rebuild = row.map(|(raw,)| parse_time(&raw)).transpose()?;
        Ok(MemoryIndexMeta { last_rebuild })
    }

    async fn count_items(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memory_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn load_items(&self) -> Result<Vec<StoredItem>> {
        let rows: Vec<(String, String, Vec<u8>, String)> = sqlx::query_as(
            "SELECT category, text, embedding, created_at FROM memory_items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(category, text, embedding, created_at)| {
                Ok(StoredItem {
                    category: parse_category(&category)?,
                    text,
                    embedding: decode_embedding(&embedding)?,
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }

    async fn replace_items(&self, items: &[StoredItem], rebuilt_at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM memory_items")
            .execute(&mut *tx)
            .await?;
        for item in items {
            sqlx::query(
                "INSERT INTO memory_items (category, text, embedding, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(item.category.as_str())
            .bind(&item.text)
            .bind(encode_embedding(&item.embedding))
            .bind(item.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            r#"INSERT INTO memory_index_meta (id, last_rebuild) VALUES (1, ?)
               ON CONFLICT(id) DO UPDATE SET last_rebuild = excluded.last_rebuild"#,
        )
        .bind(rebuilt_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {super::*, chrono::TimeZone, serde_json::json};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, 8, 30, 0).unwrap()
    }

    fn item(category: Category, text: &str, embedding: Vec<f32>) -> StoredItem {
        StoredItem {
            category,
            text: text.into(),
            embedding,
            created_at: ts(1),
        }
    }

    #[tokio::test]
    async fn snapshot_save_stamps_meta() {
        let store = SqliteContextStore::in_memory().await.unwrap();
        assert!(store.load_snapshot(Category::Resume).await.unwrap().is_none());

        let snap = Snapshot {
            category: Category::Resume,
            data: json!({"resume_text": "Education\nState University"}),
            created_at: ts(3),
        };
        store.save_snapshot(&snap).await.unwrap();

        let loaded = store.load_snapshot(Category::Resume).await.unwrap().unwrap();
        assert_eq!(loaded, snap);
        let meta = store.context_meta().await.unwrap();
        assert_eq!(meta.last_update(Category::Resume), Some(ts(3)));
        assert_eq!(meta.last_update(Category::Records), None);
    }

    #[tokio::test]
    async fn snapshot_save_replaces_previous() {
        let store = SqliteContextStore::in_memory().await.unwrap();
        for (day, text) in [(1, "old"), (2, "new")] {
            store
                .save_snapshot(&Snapshot {
                    category: Category::Resume,
                    data: json!({"resume_text": text}),
                    created_at: ts(day),
                })
                .await
                .unwrap();
        }
        let loaded = store.load_snapshot(Category::Resume).await.unwrap().unwrap();
        assert_eq!(loaded.data["resume_text"], "new");
        assert_eq!(loaded.created_at, ts(2));
    }

    #[tokio::test]
    async fn replace_items_is_wholesale() {
        let store = SqliteContextStore::in_memory().await.unwrap();
        store
            .replace_items(
                &[
                    item(Category::Records, "a", vec![1.0, 0.0]),
                    item(Category::Resume, "b", vec![0.0, 1.0]),
                ],
                ts(1),
            )
            .await
            .unwrap();
        assert_eq!(store.count_items().await.unwrap(), 2);

        store
            .replace_items(&[item(Category::Repositories, "c", vec![0.5, -0.25])], ts(2))
            .await
            .unwrap();
        let items = store.load_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, Category::Repositories);
        assert_eq!(items[0].embedding, vec![0.5, -0.25]);
        assert_eq!(
            store.index_meta().await.unwrap().last_rebuild,
            Some(ts(2))
        );
    }

    #[tokio::test]
    async fn replace_with_nothing_empties_index() {
        let store = SqliteContextStore::in_memory().await.unwrap();
        store
            .replace_items(&[item(Category::Records, "a", vec![1.0])], ts(1))
            .await
            .unwrap();
        store.replace_items(&[], ts(2)).await.unwrap();
        assert_eq!(store.count_items().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_database_survives_reconnect() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", tmp.path().join("folio.db").display());

        let store = SqliteContextStore::connect(&url).await.unwrap();
        store
            .replace_items(&[item(Category::Resume, "Skills\nRust", vec![0.5, 0.5])], ts(4))
            .await
            .unwrap();
        store.pool().close().await;

        let reopened = SqliteContextStore::connect(&url).await.unwrap();
        let items = reopened.load_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Skills\nRust");
        assert_eq!(items[0].created_at, ts(1));
        assert_eq!(reopened.index_meta().await.unwrap().last_rebuild, Some(ts(4)));
    }

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.25_f32, -1.5, 3.0e-7];
        assert_eq!(decode_embedding(&encode_embedding(&v)).unwrap(), v);
        assert!(decode_embedding(&[1, 2, 3]).is_err());
    }
}
