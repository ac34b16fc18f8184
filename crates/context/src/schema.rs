/// SQLite schema for snapshots, metadata and memory items.
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS snapshots (
        category   TEXT PRIMARY KEY,
        data       TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS context_meta (
        category    TEXT PRIMARY KEY,
        last_update TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS memory_index_meta (
        id           INTEGER PRIMARY KEY CHECK (id = 1),
        last_rebuild TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS memory_items (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        category   TEXT NOT NULL,
        text       TEXT NOT NULL,
        embedding  BLOB NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_memory_items_category ON memory_items(category)",
];

/// Create all tables. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
