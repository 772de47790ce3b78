//! SQLite document store for channel records

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use herald_core::store::{DocumentStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// SQLite-backed [`DocumentStore`] (thread-safe via Arc<Mutex>)
///
/// Each record is one row keyed by id, with the JSON body stored as text.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database and initialize the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        info!("Initializing channel database at {:?}", path);
        Self::init(conn)
    }

    /// Volatile database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        debug!("Database schema initialized successfully");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            f(&conn)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn fetch(&self, id: &str) -> Result<Option<Value>> {
        let id = id.to_owned();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row("SELECT body FROM channels WHERE id = ?1", params![&id], |row| {
                    row.get(0)
                })
                .optional()?;
            body.map(|s| serde_json::from_str(&s).context("Corrupt record body"))
                .transpose()
        })
        .await
    }

    async fn fetch_all(&self) -> Result<Vec<Value>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, body FROM channels ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, body) = row?;
                let value = serde_json::from_str(&body)
                    .with_context(|| format!("Corrupt record body for {}", id))?;
                records.push(value);
            }
            Ok(records)
        })
        .await
    }

    /// Returns false when a row with `id` already exists
    async fn insert(&self, id: &str, record: Value) -> Result<bool> {
        let id = id.to_owned();
        let body = serde_json::to_string(&record)?;
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn.execute(
                "INSERT INTO channels (id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO NOTHING",
                params![&id, &body, &now],
            )?;
            debug!("Insert {}: {} row(s)", id, changed);
            Ok(changed == 1)
        })
        .await
    }

    async fn upsert(&self, id: &str, record: Value) -> Result<()> {
        let id = id.to_owned();
        let body = serde_json::to_string(&record)?;
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO channels (id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                params![&id, &body, &now],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let id = id.to_owned();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM channels WHERE id = ?1", params![&id])?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        self.fetch(id).await.map_err(StoreError::unavailable)
    }

    async fn list(&self) -> Result<Vec<Value>, StoreError> {
        self.fetch_all().await.map_err(StoreError::unavailable)
    }

    async fn create_if_absent(&self, id: &str, record: Value) -> Result<(), StoreError> {
        match self.insert(id, record).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::AlreadyExists),
            Err(e) => Err(StoreError::unavailable(e)),
        }
    }

    async fn update(&self, id: &str, record: Value) -> Result<(), StoreError> {
        self.upsert(id, record).await.map_err(StoreError::unavailable)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.remove(id).await.map_err(StoreError::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Channel, ChannelStore, Error};
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SqliteDocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteDocumentStore::open(dir.path().join("herald.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_and_get() -> Result<()> {
        let (_dir, store) = temp_store();
        store.create_if_absent("news", json!({"id": "news"})).await?;
        assert_eq!(store.get("news").await?, Some(json!({"id": "news"})));
        assert_eq!(store.get("ghost").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_original() -> Result<()> {
        let (_dir, store) = temp_store();
        store.create_if_absent("news", json!({"v": 1})).await?;
        let second = store.create_if_absent("news", json!({"v": 2})).await;
        assert!(matches!(second, Err(StoreError::AlreadyExists)));
        assert_eq!(store.get("news").await?, Some(json!({"v": 1})));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete() -> Result<()> {
        let (_dir, store) = temp_store();
        store.update("news", json!({"v": 1})).await?;
        store.update("news", json!({"v": 2})).await?;
        assert_eq!(store.get("news").await?, Some(json!({"v": 2})));

        store.delete("news").await?;
        assert_eq!(store.get("news").await?, None);
        store.delete("news").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_list_ordered_by_id() -> Result<()> {
        let store = SqliteDocumentStore::open_in_memory()?;
        for id in ["gamma", "alpha", "beta"] {
            store.create_if_absent(id, json!({ "id": id })).await?;
        }
        let ids: Vec<Value> = store
            .list()
            .await?
            .into_iter()
            .map(|v| v["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("alpha"), json!("beta"), json!("gamma")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_body_is_unavailable() -> Result<()> {
        let store = SqliteDocumentStore::open_in_memory()?;
        store.create_if_absent("news", json!({"id": "news"})).await?;
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO channels (id, body, created_at, updated_at)
                     VALUES ('broken', '{not json', '', '')",
                    [],
                )?;
                Ok(())
            })
            .await?;

        assert!(matches!(store.get("broken").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.list().await, Err(StoreError::Unavailable(_))));
        assert!(store.get("news").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_channels_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("herald.db");

        let mut ch = Channel::new("news", 1, "admin");
        ch.users = vec![7, 8];
        {
            let store = ChannelStore::new(Arc::new(SqliteDocumentStore::open(&path).unwrap()));
            store.create(&ch).await.unwrap();
        }

        let store = ChannelStore::new(Arc::new(SqliteDocumentStore::open(&path).unwrap()));
        assert_eq!(store.get("news").await.unwrap(), Some(ch.clone()));
        assert!(matches!(store.create(&ch).await, Err(Error::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_concurrent_create_single_winner() {
        let store = ChannelStore::new(Arc::new(SqliteDocumentStore::open_in_memory().unwrap()));
        let mut handles = Vec::new();
        for owner in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(&Channel::new("race", owner, "x")).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(e) => assert!(matches!(e, Error::AlreadyExists)),
            }
        }
        assert_eq!(winners, 1);
    }
}
