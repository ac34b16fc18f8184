/// Structured records kept as JSON documents in SQLite, one row per document.
use {
    async_trait::async_trait,
    folio_context::{
        config::RecordCollection,
        document::{Document, without_fields},
    },
    serde_json::Value,
    sqlx::SqlitePool,
    tracing::debug,
};

pub struct SqliteRecordSource {
    pool: SqlitePool,
}

impl SqliteRecordSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `records` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS records (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT    NOT NULL,
                doc        TEXT    NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection, id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append documents to `collection`. Non-object values are rejected.
    pub async fn insert_many(&self, collection: &str, docs: &[Value]) -> anyhow::Result<usize> {
        let mut tx = self.pool.begin().await?;
        for (i, doc) in docs.iter().enumerate() {
            if !doc.is_object() {
                anyhow::bail!("document {i} in {collection} is not a JSON object");
            }
            sqlx::query("INSERT INTO records (collection, doc) VALUES (?, ?)")
                .bind(collection)
                .bind(doc.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(collection, count = docs.len(), "records imported");
        Ok(docs.len())
    }
}

#[async_trait]
impl folio_context::sources::RecordSource for SqliteRecordSource {
    async fn fetch_page(
        &self,
        collection: &RecordCollection,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<Document>> {
        let sql = if collection.soft_delete {
            "SELECT doc FROM records WHERE collection = ? \
             AND json_extract(doc, '$.deleted') IS NOT 1 \
             ORDER BY id LIMIT ? OFFSET ?"
        } else {
            "SELECT doc FROM records WHERE collection = ? ORDER BY id LIMIT ? OFFSET ?"
        };
        let rows: Vec<(String,)> = sqlx::query_as(sql)
            .bind(&collection.name)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let mut page = Vec::with_capacity(rows.len());
        for (raw,) in rows {
            let Value::Object(doc) = serde_json::from_str::<Value>(&raw)? else {
                anyhow::bail!("record in {} is not a JSON object", collection.name);
            };
            page.push(without_fields(doc, &collection.excluded_fields));
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {
        super::*, folio_context::sources::RecordSource, serde_json::json,
        sqlx::sqlite::SqlitePoolOptions,
    };

    async fn source() -> SqliteRecordSource {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let source = SqliteRecordSource::new(pool);
        source.ensure_schema().await.unwrap();
        source
    }

    #[tokio::test]
    async fn soft_deleted_documents_are_skipped() {
        let source = source().await;
        source
            .insert_many("projectTable", &[
                json!({"projectTitle": "Rover", "deleted": false}),
                json!({"projectTitle": "Gone", "deleted": true}),
                json!({"projectTitle": "Kiln"}),
            ])
            .await
            .unwrap();
        let collection = RecordCollection::with_prefix("projectTable", "Project", "project");

        let page = source.fetch_page(&collection, 0, 10).await.unwrap();
        let titles: Vec<&str> = page
            .iter()
            .map(|d| d["projectTitle"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Rover", "Kiln"]);
    }

    #[tokio::test]
    async fn plain_collections_ignore_the_deleted_flag() {
        let source = source().await;
        source
            .insert_many("skillsTable", &[json!({"skillName": "Rust", "deleted": true})])
            .await
            .unwrap();
        let page = source
            .fetch_page(&RecordCollection::plain("skillsTable", "Skill"), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn excluded_fields_are_projected_out() {
        let source = source().await;
        source
            .insert_many("projectTable", &[json!({
                "_id": "abc",
                "projectTitle": "Rover",
                "projectLink": "https://example.com",
                "likesCount": 4,
            })])
            .await
            .unwrap();
        let collection = RecordCollection::with_prefix("projectTable", "Project", "project");
        let page = source.fetch_page(&collection, 0, 10).await.unwrap();
        assert_eq!(page[0].len(), 1);
        assert_eq!(page[0]["projectTitle"], "Rover");
    }

    #[tokio::test]
    async fn pages_are_stable_and_scoped_to_collection() {
        let source = source().await;
        let docs: Vec<Value> = (0..5).map(|i| json!({"skillName": format!("s{i}")})).collect();
        source.insert_many("skillsTable", &docs).await.unwrap();
        source
            .insert_many("experienceTable", &[json!({"experienceTitle": "Intern"})])
            .await
            .unwrap();
        let collection = RecordCollection::plain("skillsTable", "Skill");

        let first = source.fetch_page(&collection, 0, 2).await.unwrap();
        let last = source.fetch_page(&collection, 4, 2).await.unwrap();
        assert_eq!(first[0]["skillName"], "s0");
        assert_eq!(first[1]["skillName"], "s1");
        assert_eq!(last.len(), 1);
        assert_eq!(last[0]["skillName"], "s4");
    }

    #[tokio::test]
    async fn non_object_documents_are_rejected() {
        let source = source().await;
        assert!(source.insert_many("skillsTable", &[json!("Rust")]).await.is_err());
    }
}
