//! SQLite vector provider.
//!
//! Embedded SQL storage with the `sqlite-vec` extension for distance
//! functions. A collection is a single table:
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `id` | TEXT PRIMARY KEY | Namespaced vector id |
//! | `dim` | INTEGER | Vector length, so mixed dimensions never compare |
//! | `metadata` | TEXT | JSON metadata, filtered with `json_extract` |
//! | `embedding` | BLOB | Little-endian `f32` values |
//!
//! Ranking uses `vec_distance_cosine`; prefix operations use `substr`.
//! All statements run on the blocking pool behind a `std::sync::Mutex`.
//!
//! # Feature Gate
//!
//! This module requires the `vector-sqlite` feature.

use async_trait::async_trait;
use canopy_core::{Error, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use tokio::task::spawn_blocking;

use crate::normalize::{prepare_vector, similarity_from_cosine_distance};
use crate::provider::{VectorProvider, finalize_results, matches_filter};
use crate::types::{
    Metadata, ProviderConfig, ProviderKind, ProviderMode, ProviderStatus, QueryOptions,
    ScoredRecord, VectorRecord,
};

/// Default database file when the configuration leaves `path` unset.
const DEFAULT_PATH: &str = ".canopy/vectors.db";

static REGISTER_EXTENSION: Once = Once::new();

fn register_sqlite_vec() {
    REGISTER_EXTENSION.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is the extension entry point exported by
        // the sqlite-vec crate; `sqlite3_auto_extension` takes it as a generic
        // extension init pointer. This is the pattern the crate documents.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

#[derive(Debug, Default)]
struct SqliteState {
    conn: Option<Connection>,
    closed: bool,
}

/// SQLite + sqlite-vec vector provider.
pub struct SqliteProvider {
    path: PathBuf,
    table: String,
    state: Arc<Mutex<SqliteState>>,
}

impl SqliteProvider {
    /// Create a provider from its configuration block.
    ///
    /// A `path` of `:memory:` keeps the database in memory.
    pub fn new(config: &ProviderConfig) -> Self {
        let path = config
            .path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PATH));
        Self {
            path,
            table: config.collection.clone(),
            state: Arc::new(Mutex::new(SqliteState::default())),
        }
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            success: true,
            provider_name: self.name().to_string(),
            mode: ProviderMode::Embedded,
            collection_id: format!("{}#{}", self.path.display(), self.table),
        }
    }

    /// Run a closure against the open connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.state.clone();
        let table = self.table.clone();

        spawn_blocking(move || {
            let guard = state
                .lock()
                .map_err(|_| Error::operation("SQLite connection mutex poisoned"))?;
            if guard.closed {
                return Err(Error::closed("sqlite provider is closed"));
            }
            let conn = guard
                .conn
                .as_ref()
                .ok_or_else(|| Error::query("sqlite provider is not initialized"))?;
            f(conn, &table)
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }
}

fn sql_err(operation: &str) -> impl Fn(rusqlite::Error) -> Error + '_ {
    move |e| Error::query(format!("SQLite {operation} failed: {e}"))
}

fn validate_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::provider_init(
            "sqlite",
            format!("collection '{name}' is not a valid table name"),
        ))
    }
}

fn init_schema(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            dim INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{{}}',
            embedding BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_dim ON {table}(dim);"
    ))
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(id: &str, bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::corruption(format!(
            "malformed array stored for '{id}': {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn decode_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Translate a JSON predicate value into a bindable SQL value.
///
/// `json_extract` yields TEXT, INTEGER or REAL, with booleans as 0/1. Values
/// with no scalar SQL form return `None` and are checked client-side.
fn sql_scalar(value: &Value) -> Option<SqlValue> {
    match value {
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        _ => None,
    }
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

#[async_trait]
impl VectorProvider for SqliteProvider {
    async fn initialize(&self) -> Result<ProviderStatus> {
        validate_table_name(&self.table)?;

        let state = self.state.clone();
        let path = self.path.clone();
        let table = self.table.clone();

        let created = spawn_blocking(move || -> Result<bool> {
            let mut guard = state
                .lock()
                .map_err(|_| Error::operation("SQLite connection mutex poisoned"))?;
            if guard.closed {
                return Err(Error::closed("sqlite provider is closed"));
            }
            if guard.conn.is_some() {
                return Ok(false);
            }

            register_sqlite_vec();
            let in_memory = path.as_os_str() == ":memory:";
            if !in_memory && let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::provider_init("sqlite", format!("{}: {e}", parent.display())))?;
            }
            let conn = if in_memory {
                Connection::open_in_memory()
            } else {
                Connection::open(&path)
            }
            .map_err(|e| Error::provider_init("sqlite", format!("{}: {e}", path.display())))?;

            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
                .map_err(|e| Error::provider_init("sqlite", format!("pragma init failed: {e}")))?;
            conn.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0))
                .map_err(|e| {
                    Error::provider_init("sqlite", format!("sqlite-vec unavailable: {e}"))
                })?;
            init_schema(&conn, &table)
                .map_err(|e| Error::provider_init("sqlite", format!("schema init failed: {e}")))?;

            guard.conn = Some(conn);
            Ok(true)
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))??;

        if created {
            log::info!(
                "SQLite provider ready at {} (table '{}')",
                self.path.display(),
                self.table
            );
        }
        Ok(self.status())
    }

    async fn upsert_vector(&self, id: &str, vector: &[f32], metadata: &Metadata) -> Result<()> {
        let vector = prepare_vector(vector)?;
        let id = id.to_string();
        let metadata = serde_json::to_string(metadata)?;

        self.with_conn(move |conn, table| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, dim, metadata, embedding) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        dim = excluded.dim,
                        metadata = excluded.metadata,
                        embedding = excluded.embedding"
                ),
                params![id, vector.len() as i64, metadata, encode_embedding(&vector)],
            )
            .map_err(sql_err("upsert"))?;
            Ok(())
        })
        .await
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> Result<Vec<ScoredRecord>> {
        let query = prepare_vector(query)?;
        let opts = options.clone();

        let results = self
            .with_conn(move |conn, table| {
                let mut sql = format!(
                    "SELECT id, metadata, embedding, vec_distance_cosine(embedding, ?1) AS distance
                     FROM {table} WHERE dim = ?2"
                );
                let mut bind: Vec<SqlValue> = vec![
                    SqlValue::Blob(encode_embedding(&query)),
                    SqlValue::Integer(query.len() as i64),
                ];
                let mut residual = false;
                for (key, value) in &opts.filter {
                    match sql_scalar(value) {
                        Some(scalar) => {
                            bind.push(SqlValue::Text(json_path(key)));
                            bind.push(scalar);
                            sql.push_str(&format!(
                                " AND json_extract(metadata, ?{}) = ?{}",
                                bind.len() - 1,
                                bind.len()
                            ));
                        }
                        None => residual = true,
                    }
                }
                let limit = if residual { -1 } else { opts.limit as i64 };
                bind.push(SqlValue::Integer(limit));
                sql.push_str(&format!(" ORDER BY distance ASC LIMIT ?{}", bind.len()));

                let mut stmt = conn.prepare(&sql).map_err(sql_err("prepare query"))?;
                let rows = stmt
                    .query_map(params_from_iter(bind), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, f64>(3)?,
                        ))
                    })
                    .map_err(sql_err("query"))?;

                let mut results = Vec::new();
                for row in rows {
                    let (id, metadata, embedding, distance) = row.map_err(sql_err("read row"))?;
                    let vector = decode_embedding(&id, &embedding)?;
                    let metadata = decode_metadata(&metadata);
                    if residual && !matches_filter(&metadata, &opts.filter) {
                        continue;
                    }
                    let distance = distance as f32;
                    results.push(ScoredRecord {
                        record: VectorRecord::new(id, vector, metadata),
                        similarity: similarity_from_cosine_distance(distance),
                        distance,
                    });
                }
                Ok(results)
            })
            .await?;

        Ok(finalize_results(results, options))
    }

    async fn delete_vector(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn, table| {
            let changed = conn
                .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])
                .map_err(sql_err("delete"))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_namespace(&self, prefix: &str) -> Result<usize> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn, table| {
            let len = prefix.chars().count() as i64;
            conn.execute(
                &format!("DELETE FROM {table} WHERE substr(id, 1, ?2) = ?1"),
                params![prefix, len],
            )
            .map_err(sql_err("delete namespace"))
        })
        .await
    }

    async fn list_vectors(&self, prefix: &str) -> Result<Vec<VectorRecord>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn, table| {
            let len = prefix.chars().count() as i64;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT id, metadata, embedding FROM {table}
                     WHERE substr(id, 1, ?2) = ?1 ORDER BY id"
                ))
                .map_err(sql_err("prepare list"))?;
            let rows = stmt
                .query_map(params![prefix, len], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })
                .map_err(sql_err("list"))?;

            let mut records = Vec::new();
            for row in rows {
                let (id, metadata, embedding) = row.map_err(sql_err("read row"))?;
                let vector = decode_embedding(&id, &embedding)?;
                records.push(VectorRecord::new(id, vector, decode_metadata(&metadata)));
            }
            Ok(records)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn, _| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
                .optional()
                .map_err(sql_err("ping"))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let state = self.state.clone();
        spawn_blocking(move || {
            let mut guard = state
                .lock()
                .map_err(|_| Error::operation("SQLite connection mutex poisoned"))?;
            if !guard.closed {
                guard.closed = true;
                guard.conn = None;
                log::debug!("SQLite provider closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    async fn reset(&self) -> Result<()> {
        self.with_conn(|conn, table| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
                .map_err(sql_err("drop table"))?;
            init_schema(conn, table).map_err(sql_err("recreate table"))?;
            Ok(())
        })
        .await?;
        log::info!("SQLite table '{}' reset", self.table);
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Sqlite
    }
}

impl std::fmt::Debug for SqliteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteProvider")
            .field("path", &self.path)
            .field("table", &self.table)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
