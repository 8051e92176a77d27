//! SQLite Exchange Storage
//!
//! Information Hiding:
//! - Table layout, JSON columns and the FTS5 index hidden from users
//! - Reconnect policy internal to the store
//! - Blocking rusqlite calls kept off the async workers
//! - Aggregations pushed down into SQL

use super::exchange::{
    Analytics, Exchange, ExchangeMetadata, ExchangePatch, ListQuery, Page, SortField, SortOrder,
    TagCount, TOP_TAGS,
};
use super::ExchangeStore;
use crate::config::DatabaseConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS exchanges (
    id               TEXT PRIMARY KEY,
    question         TEXT NOT NULL CHECK (length(question) > 0),
    answer           TEXT NOT NULL CHECK (length(answer) > 0),
    formatted_answer TEXT NOT NULL,
    metadata         TEXT NOT NULL DEFAULT '{}',
    tags             TEXT NOT NULL DEFAULT '[]',
    rating           INTEGER CHECK (rating IS NULL OR rating BETWEEN 1 AND 5),
    is_starred       INTEGER NOT NULL DEFAULT 0,
    question_length  INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    created_ms       INTEGER NOT NULL,
    updated_at       TEXT
);

CREATE INDEX IF NOT EXISTS idx_exchanges_created ON exchanges(created_ms);
CREATE INDEX IF NOT EXISTS idx_exchanges_starred ON exchanges(is_starred, created_ms);
CREATE INDEX IF NOT EXISTS idx_exchanges_rating ON exchanges(rating);

CREATE VIRTUAL TABLE IF NOT EXISTS exchanges_fts USING fts5(
    question, answer,
    content='exchanges', content_rowid='rowid',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS exchanges_fts_insert AFTER INSERT ON exchanges BEGIN
    INSERT INTO exchanges_fts(rowid, question, answer)
    VALUES (new.rowid, new.question, new.answer);
END;

CREATE TRIGGER IF NOT EXISTS exchanges_fts_delete AFTER DELETE ON exchanges BEGIN
    INSERT INTO exchanges_fts(exchanges_fts, rowid, question, answer)
    VALUES ('delete', old.rowid, old.question, old.answer);
END;

CREATE TRIGGER IF NOT EXISTS exchanges_fts_update AFTER UPDATE OF question, answer ON exchanges BEGIN
    INSERT INTO exchanges_fts(exchanges_fts, rowid, question, answer)
    VALUES ('delete', old.rowid, old.question, old.answer);
    INSERT INTO exchanges_fts(rowid, question, answer)
    VALUES (new.rowid, new.question, new.answer);
END;
";

const COLUMNS: &str = "e.id, e.question, e.answer, e.formatted_answer, e.metadata, e.tags, \
                       e.rating, e.is_starred, e.created_at, e.updated_at";

/// SQLite-backed store; each exchange is one row with JSON columns.
///
/// rusqlite is blocking, so every statement runs on the blocking pool with
/// the connection lock held only inside that task.
pub struct SqliteStore {
    path: PathBuf,
    connect_retries: u32,
    retry_delay: std::time::Duration,
    /// `None` while a reconnect is in progress or has failed
    conn: Arc<StdMutex<Option<Connection>>>,
    reconnecting: Mutex<()>,
}

impl SqliteStore {
    /// Open the database, retrying a fixed number of times on failure
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let path = PathBuf::from(database_path(&config.url));
        let retry_delay = std::time::Duration::from_millis(config.retry_delay_ms);
        let conn = open_with_retry(&path, config.connect_retries, retry_delay).await?;

        tracing::info!("[SqliteStore] Connected to {:?}", path);

        Ok(Self {
            path,
            connect_retries: config.connect_retries,
            retry_delay,
            conn: Arc::new(StdMutex::new(Some(conn))),
            reconnecting: Mutex::new(()),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("database connection lock poisoned"))?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| anyhow!("database is not connected"))?;
            f(conn)
        })
        .await
        .context("Database task failed")?
    }

    async fn is_healthy(&self) -> bool {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let healthy = match conn.lock() {
                Ok(guard) => guard.as_ref().is_some_and(|c| connection_healthy(c, &path)),
                Err(_) => false,
            };
            healthy
        })
        .await
        .unwrap_or(false)
    }

    async fn reconnect(&self) -> Result<()> {
        let _reconnecting = self.reconnecting.lock().await;
        if self.is_healthy().await {
            return Ok(());
        }

        tracing::warn!("[SqliteStore] Connection check failed, reconnecting to {:?}", self.path);

        // Close the stale handle first so its WAL files are gone before the new open
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = conn.lock() {
                guard.take();
            }
        })
        .await
        .context("Database task failed")?;

        let fresh = open_with_retry(&self.path, self.connect_retries, self.retry_delay).await?;

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("database connection lock poisoned"))?;
            *guard = Some(fresh);
            Ok(())
        })
        .await
        .context("Database task failed")??;

        tracing::info!("[SqliteStore] Reconnected to {:?}", self.path);
        Ok(())
    }
}

/// Accepts plain paths as well as `sqlite://` / `sqlite:` prefixed URLs
fn database_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

fn is_in_memory(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.as_os_str() == ":memory:"
}

/// The file must still be on disk and the schema readable through this handle
fn connection_healthy(conn: &Connection, path: &Path) -> bool {
    if !is_in_memory(path) && !path.exists() {
        return false;
    }
    conn.query_row("SELECT COUNT(*) FROM exchanges", [], |row| row.get::<_, i64>(0))
        .is_ok()
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        .context("Failed to configure database")?;
    conn.execute_batch(SCHEMA)
        .context("Failed to initialize schema")?;
    Ok(conn)
}

async fn open_with_retry(
    path: &Path,
    retries: u32,
    delay: std::time::Duration,
) -> Result<Connection> {
    let attempts = retries.max(1);
    let mut attempt = 1;
    loop {
        let attempt_path = path.to_path_buf();
        let opened = tokio::task::spawn_blocking(move || open(&attempt_path))
            .await
            .context("Database open task failed")?;

        match opened {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    "[SqliteStore] Connection attempt {}/{} failed: {:#}. Retrying in {}ms",
                    attempt,
                    attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!("[SqliteStore] Giving up after {} attempts: {:#}", attempts, e);
                return Err(e);
            }
        }
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_exchange(row: &Row<'_>) -> rusqlite::Result<Exchange> {
    let metadata: String = row.get(4)?;
    let metadata: ExchangeMetadata =
        serde_json::from_str(&metadata).map_err(|e| conversion_error(4, e))?;

    let tags: String = row.get(5)?;
    let tags: Vec<String> = serde_json::from_str(&tags).map_err(|e| conversion_error(5, e))?;

    let created_at: String = row.get(8)?;
    let updated_at: Option<String> = row.get(9)?;

    Ok(Exchange {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        formatted_answer: row.get(3)?,
        metadata,
        tags,
        rating: row.get(6)?,
        is_starred: row.get(7)?,
        timestamp: parse_time(8, &created_at)?,
        updated_at: updated_at.map(|t| parse_time(9, &t)).transpose()?,
    })
}

fn select_by_id(conn: &Connection, id: &str) -> Result<Option<Exchange>> {
    let exchange = conn
        .query_row(
            &format!("SELECT {} FROM exchanges e WHERE e.id = ?1", COLUMNS),
            params![id],
            row_to_exchange,
        )
        .optional()
        .with_context(|| format!("Failed to load exchange '{}'", id))?;
    Ok(exchange)
}

/// WHERE clause and bound values for a list query
fn list_filter(query: &ListQuery) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(starred) = query.starred {
        clauses.push("e.is_starred = ?");
        values.push(Value::Integer(i64::from(starred)));
    }
    if let Some(min) = query.min_rating {
        clauses.push("e.rating >= ?");
        values.push(Value::Integer(i64::from(min)));
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (clause, values)
}

/// Quote each word so user input can never be read as FTS5 query syntax
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

#[async_trait]
impl ExchangeStore for SqliteStore {
    async fn insert(&self, exchange: &Exchange) -> Result<()> {
        let exchange = exchange.clone();
        let metadata = serde_json::to_string(&exchange.metadata)?;
        let tags = serde_json::to_string(&exchange.tags)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO exchanges (id, question, answer, formatted_answer, metadata, tags,
                                        rating, is_starred, question_length, created_at, created_ms, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    exchange.id,
                    exchange.question,
                    exchange.answer,
                    exchange.formatted_answer,
                    metadata,
                    tags,
                    exchange.rating,
                    exchange.is_starred,
                    exchange.question.chars().count() as i64,
                    exchange.timestamp.to_rfc3339(),
                    exchange.timestamp.timestamp_millis(),
                    exchange.updated_at.map(|t| t.to_rfc3339()),
                ],
            )
            .with_context(|| format!("Failed to insert exchange '{}'", exchange.id))?;

            tracing::debug!("[SqliteStore] Inserted exchange '{}'", exchange.id);
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Exchange>> {
        let id = id.to_string();
        self.with_conn(move |conn| select_by_id(conn, &id)).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let (filter, mut values) = list_filter(&query);
            let sort_column = match query.sort {
                SortField::Timestamp => "e.created_ms",
                SortField::Rating => "e.rating",
                SortField::QuestionLength => "e.question_length",
            };
            let direction = match query.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };

            let total: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM exchanges e {}", filter),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )
                .context("Failed to count exchanges")?;

            values.push(Value::Integer(i64::from(query.limit)));
            values.push(Value::Integer(query.offset() as i64));

            let sql = format!(
                "SELECT {} FROM exchanges e {} ORDER BY {} {}, e.created_ms {}, e.id {} LIMIT ? OFFSET ?",
                COLUMNS, filter, sort_column, direction, direction, direction
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params_from_iter(values.iter()), row_to_exchange)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list exchanges")?;

            Ok(Page {
                items,
                total: total as u64,
            })
        })
        .await
    }

    async fn update(&self, id: &str, patch: &ExchangePatch) -> Result<Option<Exchange>> {
        let id = id.to_string();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let Some(mut exchange) = select_by_id(conn, &id)? else {
                return Ok(None);
            };

            patch.apply(&mut exchange, Utc::now());

            conn.execute(
                "UPDATE exchanges SET is_starred = ?1, rating = ?2, tags = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    exchange.is_starred,
                    exchange.rating,
                    serde_json::to_string(&exchange.tags)?,
                    exchange.updated_at.map(|t| t.to_rfc3339()),
                    id,
                ],
            )
            .with_context(|| format!("Failed to update exchange '{}'", id))?;

            tracing::debug!("[SqliteStore] Updated exchange '{}'", id);
            Ok(Some(exchange))
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute("DELETE FROM exchanges WHERE id = ?1", params![id])
                .with_context(|| format!("Failed to delete exchange '{}'", id))?;
            tracing::debug!("[SqliteStore] Delete '{}' removed={}", id, removed);
            Ok(removed > 0)
        })
        .await
    }

    async fn search(&self, text: &str, limit: u32) -> Result<Vec<Exchange>> {
        let Some(fts) = fts_query(text) else {
            return Ok(Vec::new());
        };

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM exchanges_fts
                 JOIN exchanges e ON e.rowid = exchanges_fts.rowid
                 WHERE exchanges_fts MATCH ?1
                 ORDER BY bm25(exchanges_fts), e.created_ms DESC
                 LIMIT ?2",
                COLUMNS
            ))?;
            let results = stmt
                .query_map(params![fts, limit], row_to_exchange)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to search exchanges")?;

            tracing::debug!("[SqliteStore] Search {:?} matched {}", fts, results.len());
            Ok(results)
        })
        .await
    }

    async fn analytics(&self) -> Result<Analytics> {
        let since = (Utc::now() - Duration::hours(24)).timestamp_millis();

        self.with_conn(move |conn| {
            let mut analytics = conn
                .query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(is_starred), 0),
                            COUNT(rating),
                            AVG(rating),
                            AVG(json_extract(metadata, '$.responseTimeMs')),
                            AVG(json_extract(metadata, '$.questionLength')),
                            AVG(json_extract(metadata, '$.answerLength')),
                            COALESCE(SUM(CASE WHEN created_ms >= ?1 THEN 1 ELSE 0 END), 0)
                     FROM exchanges",
                    params![since],
                    |row| {
                        Ok(Analytics {
                            total_chats: row.get::<_, i64>(0)? as u64,
                            starred_chats: row.get::<_, i64>(1)? as u64,
                            rated_chats: row.get::<_, i64>(2)? as u64,
                            average_rating: row.get(3)?,
                            average_response_time_ms: row.get(4)?,
                            average_question_length: row.get(5)?,
                            average_answer_length: row.get(6)?,
                            chats_last_24h: row.get::<_, i64>(7)? as u64,
                            top_tags: Vec::new(),
                        })
                    },
                )
                .context("Failed to compute analytics")?;

            let mut stmt = conn.prepare(
                "SELECT tag.value, COUNT(*) AS uses
                 FROM exchanges, json_each(exchanges.tags) AS tag
                 GROUP BY tag.value
                 ORDER BY uses DESC, tag.value ASC
                 LIMIT ?1",
            )?;
            let top_tags = stmt
                .query_map(params![TOP_TAGS as i64], |row| {
                    Ok(TagCount {
                        tag: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to count tags")?;
            analytics.top_tags = top_tags;

            Ok(analytics)
        })
        .await
    }

    async fn export_all(&self) -> Result<Vec<Exchange>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM exchanges e ORDER BY e.created_ms ASC, e.id ASC",
                COLUMNS
            ))?;
            let all = stmt
                .query_map([], row_to_exchange)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to export exchanges")?;
            Ok(all)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        if self.is_healthy().await {
            return Ok(());
        }
        self.reconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::exchange::tests::sample;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> SqliteStore {
        let config = DatabaseConfig {
            url: dir.path().join("chat.db").to_string_lossy().into_owned(),
            connect_retries: 1,
            retry_delay_ms: 10,
        };
        SqliteStore::connect(&config).await.unwrap()
    }

    #[test]
    fn test_database_path_prefixes() {
        assert_eq!(database_path("sqlite://data/chat.db"), "data/chat.db");
        assert_eq!(database_path("sqlite::memory:"), ":memory:");
        assert_eq!(database_path("chat.db"), "chat.db");
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(
            fts_query("borrow-checker AND \"x\""),
            Some("\"borrow\" OR \"checker\" OR \"AND\" OR \"x\"".to_string())
        );
        assert_eq!(fts_query("  ***  "), None);
    }

    #[tokio::test]
    async fn test_round_trip_keeps_every_field() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let mut exchange = sample("1700000000000");
        exchange.tags = vec!["rust".to_string(), "async".to_string()];
        exchange.rating = Some(4);
        exchange.is_starred = true;
        store.insert(&exchange).await.unwrap();

        let loaded = store.get("1700000000000").await.unwrap().unwrap();
        assert_eq!(loaded, exchange);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sort_and_filter() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        for i in 0..6i64 {
            let mut exchange = sample(&format!("{}", 10 + i));
            exchange.timestamp = Utc::now() - Duration::minutes(60 - i);
            exchange.rating = Some((i % 5 + 1) as u8);
            exchange.is_starred = i >= 3;
            store.insert(&exchange).await.unwrap();
        }

        let page = store
            .list(&ListQuery {
                page: 1,
                limit: 4,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.items[0].id, "15");

        let starred = store
            .list(&ListQuery {
                starred: Some(true),
                sort: SortField::Rating,
                order: SortOrder::Asc,
                ..Default::default()
            })
            .await
            .unwrap();
        let ratings: Vec<Option<u8>> = starred.items.iter().map(|e| e.rating).collect();
        assert_eq!(starred.total, 3);
        assert_eq!(ratings, vec![Some(1), Some(4), Some(5)]);
    }

    #[tokio::test]
    async fn test_update_delete_and_search() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let mut a = sample("1");
        a.question = "How does the borrow checker work?".to_string();
        a.answer = "It tracks lifetimes of references.".to_string();
        let mut b = sample("2");
        b.question = "What is a trait?".to_string();
        b.answer = "A trait defines shared behavior.".to_string();
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let hits = store.search("Borrowing", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        let patch = ExchangePatch {
            tags: Some(vec!["traits".to_string()]),
            is_starred: Some(true),
            ..Default::default()
        };
        let updated = store.update("2", &patch).await.unwrap().unwrap();
        assert!(updated.is_starred);
        assert_eq!(updated.question, "What is a trait?");
        assert!(store.update("3", &patch).await.unwrap().is_none());

        assert!(store.delete("1").await.unwrap());
        assert!(!store.delete("1").await.unwrap());
        assert!(store.search("borrow", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analytics_aggregates() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let empty = store.analytics().await.unwrap();
        assert_eq!(empty.total_chats, 0);
        assert_eq!(empty.average_rating, None);

        let mut a = sample("1");
        a.rating = Some(2);
        a.tags = vec!["rust".to_string(), "async".to_string()];
        let mut b = sample("2");
        b.rating = Some(4);
        b.is_starred = true;
        b.tags = vec!["rust".to_string()];
        b.timestamp = Utc::now() - Duration::days(3);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let stats = store.analytics().await.unwrap();
        assert_eq!(stats.total_chats, 2);
        assert_eq!(stats.starred_chats, 1);
        assert_eq!(stats.rated_chats, 2);
        assert_eq!(stats.average_rating, Some(3.0));
        assert_eq!(stats.average_response_time_ms, Some(120.0));
        assert_eq!(stats.chats_last_24h, 1);
        assert_eq!(stats.top_tags[0].tag, "rust");
        assert_eq!(stats.top_tags[0].count, 2);
        assert_eq!(stats.top_tags.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir).await;
            store.insert(&sample("42")).await.unwrap();
        }
        let store = store_in(&dir).await;
        store.ping().await.unwrap();
        let all = store.export_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "42");
    }

    #[tokio::test]
    async fn test_ping_reconnects_when_file_removed() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("chat.db");
        let store = store_in(&dir).await;
        store.insert(&sample("1")).await.unwrap();

        std::fs::remove_file(&db).unwrap();
        store.ping().await.unwrap();
        assert!(db.exists());

        store.insert(&sample("2")).await.unwrap();
        drop(store);

        let reopened = store_in(&dir).await;
        let ids: Vec<String> = reopened
            .export_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_retries_until_directory_exists() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("created-later");
        let config = DatabaseConfig {
            url: nested.join("chat.db").to_string_lossy().into_owned(),
            connect_retries: 20,
            retry_delay_ms: 50,
        };

        let creator = {
            let nested = nested.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                std::fs::create_dir_all(&nested).unwrap();
            })
        };

        let store = SqliteStore::connect(&config).await.unwrap();
        creator.await.unwrap();

        store.insert(&sample("7")).await.unwrap();
        assert!(nested.join("chat.db").exists());
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_retries() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: dir
                .path()
                .join("never")
                .join("chat.db")
                .to_string_lossy()
                .into_owned(),
            connect_retries: 3,
            retry_delay_ms: 5,
        };

        assert!(SqliteStore::connect(&config).await.is_err());
        assert!(!dir.path().join("never").exists());
    }
}
