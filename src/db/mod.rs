mod document;
mod schema;

pub use document::{DocumentStore, Filter, Update, UpdateOp};

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

/// SQLite-backed [`DocumentStore`]. Each document is one row of JSON text,
/// keyed by collection and `_id`.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf, busy_timeout: Duration) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default(busy_timeout: Duration) -> Result<Self> {
        Self::open(default_path()?, busy_timeout)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database lock poisoned"))
    }
}

/// Location of the database when none is configured.
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "flagkeeper")
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("flagkeeper.db"))
}

impl DocumentStore for Database {
    fn insert_one(&self, collection: &str, document: Value) -> Result<Uuid> {
        let id = document
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("document has no string _id"))?
            .to_string();
        let body = serde_json::to_string(&document)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)",
            (collection, &id, &body),
        )
        .with_context(|| format!("Failed to insert into {collection}"))?;

        // Report back what was stored, not what was asked for
        let stored: String = conn.query_row(
            "SELECT id FROM documents WHERE rowid = last_insert_rowid()",
            [],
            |row| row.get(0),
        )?;
        Uuid::parse_str(&stored).with_context(|| format!("stored id {stored} is not a uuid"))
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let (clause, params) = where_clause(collection, filter)?;
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                &format!("SELECT body FROM documents WHERE {clause} LIMIT 1"),
                params_from_iter(params),
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).context("Failed to decode document"))
            .transpose()
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let (clause, params) = where_clause(collection, filter)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT body FROM documents WHERE {clause} ORDER BY rowid"
        ))?;

        let bodies = stmt
            .query_map(params_from_iter(params), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).context("Failed to decode document"))
            .collect()
    }

    fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> Result<bool> {
        let (clause, params) = where_clause(collection, filter)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let found: Option<(String, String)> = tx
            .query_row(
                &format!("SELECT id, body FROM documents WHERE {clause} LIMIT 1"),
                params_from_iter(params),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, body)) = found else {
            return Ok(false);
        };

        let mut document: Value =
            serde_json::from_str(&body).context("Failed to decode document")?;
        update
            .apply(&mut document)
            .with_context(|| format!("Failed to apply update to {collection}/{id}"))?;
        if document.get("_id").and_then(Value::as_str) != Some(id.as_str()) {
            bail!("update may not change _id of {collection}/{id}");
        }

        tx.execute(
            "UPDATE documents SET body = ? WHERE collection = ? AND id = ?",
            (serde_json::to_string(&document)?, collection, &id),
        )?;
        tx.commit()?;

        Ok(true)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Builds `collection = ? AND ...` for a filter. Field paths are inlined
/// into `json_extract` so the expression index on `organization_id` applies;
/// they are restricted to identifier characters.
fn where_clause(collection: &str, filter: &Filter) -> Result<(String, Vec<SqlValue>)> {
    let mut clauses = vec!["collection = ?".to_string()];
    let mut params = vec![SqlValue::Text(collection.to_string())];

    for (field, value) in filter.conditions() {
        if field == "_id" {
            let id = value
                .as_str()
                .ok_or_else(|| anyhow!("_id filter must be a string"))?;
            clauses.push("id = ?".to_string());
            params.push(SqlValue::Text(id.to_string()));
            continue;
        }

        let expr = format!("json_extract(body, '{}')", json_path(field)?);

        match value {
            Value::Null => clauses.push(format!("{expr} IS NULL")),
            Value::Bool(b) => {
                clauses.push(format!("{expr} = ?"));
                params.push(SqlValue::Integer(i64::from(*b)));
            }
            Value::Number(n) => {
                clauses.push(format!("{expr} = ?"));
                params.push(match n.as_i64() {
                    Some(i) => SqlValue::Integer(i),
                    None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
                });
            }
            Value::String(s) => {
                clauses.push(format!("{expr} = ?"));
                params.push(SqlValue::Text(s.clone()));
            }
            Value::Array(_) | Value::Object(_) => {
                bail!("filter on {field} must compare a scalar")
            }
        }
    }

    Ok((clauses.join(" AND "), params))
}

/// Translates a dotted field path into an SQLite JSON path. Numeric
/// segments index into arrays, matching [`Filter::matches`].
fn json_path(field: &str) -> Result<String> {
    let mut path = String::from("$");
    for segment in field.split('.') {
        if segment.is_empty()
            || !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!("invalid filter field {field:?}");
        }
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            path.push_str(&format!("[{segment}]"));
        } else {
            path.push('.');
            path.push_str(segment);
        }
    }
    Ok(path)
}
