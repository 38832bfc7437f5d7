//! Execution history store.
//!
//! # Responsibility
//! - Record executed inputs and their plain-text outputs per line number.
//! - Answer `history_request` messages (`tail`, `range`, `search`).
//!
//! # Invariants
//! - One row per `(session, line)`; re-recording a line replaces it.
//! - Results are returned in ascending `(session, line)` order.

use log::{error, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const SCHEMA: &str = include_str!("history_schema.sql");

/// Session number the in-memory store records under.
///
/// `0` in a `range` request means "current session" and maps here.
pub const CURRENT_SESSION: i64 = 1;

pub type HistoryResult<T> = Result<T, HistoryError>;

/// History storage failure.
#[derive(Debug)]
pub enum HistoryError {
    Sqlite(rusqlite::Error),
}

impl Display for HistoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "history store error: {err}"),
        }
    }
}

impl Error for HistoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// One recorded history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub session: i64,
    pub line: u32,
    pub input: String,
    /// Present only when outputs were requested and one was recorded.
    pub output: Option<String>,
}

impl HistoryEntry {
    /// Wire shape: `[session, line, input]` or `[session, line, [input, output]]`.
    fn to_wire(&self, with_output: bool) -> Value {
        if with_output {
            json!([self.session, self.line, [self.input, self.output]])
        } else {
            json!([self.session, self.line, self.input])
        }
    }
}

/// History store contract consumed by the kernel.
pub trait HistoryManager: Send {
    fn store_input(&mut self, line: u32, code: &str) -> HistoryResult<()>;
    fn store_output(&mut self, line: u32, output: &str) -> HistoryResult<()>;
    /// Last `n` entries.
    fn tail(&self, n: u32, output: bool) -> HistoryResult<Vec<HistoryEntry>>;
    /// Entries with `start <= line < stop`; `stop <= 0` means unbounded.
    fn range(&self, session: i64, start: i64, stop: i64, output: bool)
        -> HistoryResult<Vec<HistoryEntry>>;
    /// Entries whose input matches a glob `pattern`, newest `n` when given.
    fn search(
        &self,
        pattern: &str,
        output: bool,
        n: Option<u32>,
        unique: bool,
    ) -> HistoryResult<Vec<HistoryEntry>>;

    /// Builds `history_reply` content for one `history_request` content.
    fn process_request(&self, content: &Value) -> HistoryResult<Value> {
        let output = content.get("output").and_then(Value::as_bool).unwrap_or(false);
        let access = content
            .get("hist_access_type")
            .and_then(Value::as_str)
            .unwrap_or("tail");

        let entries = match access {
            "range" => {
                let session = content.get("session").and_then(Value::as_i64).unwrap_or(0);
                let start = content.get("start").and_then(Value::as_i64).unwrap_or(0);
                let stop = content.get("stop").and_then(Value::as_i64).unwrap_or(0);
                self.range(session, start, stop, output)?
            }
            "search" => {
                let pattern = content.get("pattern").and_then(Value::as_str).unwrap_or("*");
                let n = read_u32(content, "n");
                let unique = content.get("unique").and_then(Value::as_bool).unwrap_or(false);
                self.search(pattern, output, n, unique)?
            }
            _ => {
                let n = read_u32(content, "n").unwrap_or(10);
                self.tail(n, output)?
            }
        };

        let history = entries
            .iter()
            .map(|entry| entry.to_wire(output))
            .collect::<Vec<_>>();
        Ok(json!({"status": "ok", "history": history}))
    }
}

/// SQLite-backed history store living entirely in memory.
pub struct SqliteHistory {
    conn: Connection,
    session: i64,
}

impl SqliteHistory {
    /// Opens a fresh in-memory database with the history schema applied.
    ///
    /// # Side effects
    /// - Emits `history_open` logging events with duration and status.
    pub fn open_in_memory() -> HistoryResult<Self> {
        let started_at = Instant::now();
        info!("event=history_open module=history status=start mode=memory");

        let conn = Connection::open_in_memory().and_then(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        });
        match conn {
            Ok(conn) => {
                info!(
                    "event=history_open module=history status=ok mode=memory duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    conn,
                    session: CURRENT_SESSION,
                })
            }
            Err(err) => {
                error!(
                    "event=history_open module=history status=error mode=memory duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    fn query_entries(
        &self,
        sql: &str,
        bind_values: Vec<SqlValue>,
        output: bool,
    ) -> HistoryResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry(row, output)?);
        }
        Ok(entries)
    }
}

impl HistoryManager for SqliteHistory {
    fn store_input(&mut self, line: u32, code: &str) -> HistoryResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO history (session, line, source, output) VALUES (?1, ?2, ?3, NULL)",
            params![self.session, line, code],
        )?;
        Ok(())
    }

    fn store_output(&mut self, line: u32, output: &str) -> HistoryResult<()> {
        self.conn.execute(
            "UPDATE history SET output = ?3 WHERE session = ?1 AND line = ?2",
            params![self.session, line, output],
        )?;
        Ok(())
    }

    fn tail(&self, n: u32, output: bool) -> HistoryResult<Vec<HistoryEntry>> {
        let mut entries = self.query_entries(
            "SELECT session, line, source, output FROM history
             ORDER BY session DESC, line DESC LIMIT ?",
            vec![SqlValue::Integer(i64::from(n))],
            output,
        )?;
        entries.reverse();
        Ok(entries)
    }

    fn range(
        &self,
        session: i64,
        start: i64,
        stop: i64,
        output: bool,
    ) -> HistoryResult<Vec<HistoryEntry>> {
        let session = if session == 0 { self.session } else { session };
        let mut sql = String::from(
            "SELECT session, line, source, output FROM history WHERE session = ? AND line >= ?",
        );
        let mut bind_values = vec![SqlValue::Integer(session), SqlValue::Integer(start)];
        if stop > 0 {
            sql.push_str(" AND line < ?");
            bind_values.push(SqlValue::Integer(stop));
        }
        sql.push_str(" ORDER BY line ASC");
        self.query_entries(&sql, bind_values, output)
    }

    fn search(
        &self,
        pattern: &str,
        output: bool,
        n: Option<u32>,
        unique: bool,
    ) -> HistoryResult<Vec<HistoryEntry>> {
        let mut sql = String::from("SELECT session, line, source, output FROM history WHERE source GLOB ?");
        if unique {
            // Keep only the newest line for each distinct input.
            sql.push_str(
                " AND line = (SELECT MAX(newer.line) FROM history AS newer
                   WHERE newer.source = history.source AND newer.session = history.session)",
            );
        }
        sql.push_str(" ORDER BY session DESC, line DESC");
        let mut bind_values = vec![SqlValue::Text(pattern.to_string())];
        if let Some(n) = n {
            sql.push_str(" LIMIT ?");
            bind_values.push(SqlValue::Integer(i64::from(n)));
        }

        let mut entries = self.query_entries(&sql, bind_values, output)?;
        entries.reverse();
        Ok(entries)
    }
}

/// Builds the default history store for new kernels.
pub fn make_in_memory_history_manager() -> HistoryResult<Box<dyn HistoryManager>> {
    Ok(Box::new(SqliteHistory::open_in_memory()?))
}

fn parse_entry(row: &Row<'_>, output: bool) -> HistoryResult<HistoryEntry> {
    Ok(HistoryEntry {
        session: row.get(0)?,
        line: row.get(1)?,
        input: row.get(2)?,
        output: if output { row.get(3)? } else { None },
    })
}

fn read_u32(content: &Value, key: &str) -> Option<u32> {
    content
        .get(key)
        .and_then(Value::as_u64)
        .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::{HistoryManager, SqliteHistory, CURRENT_SESSION};
    use serde_json::json;

    fn seeded() -> SqliteHistory {
        let mut history = SqliteHistory::open_in_memory().expect("open history");
        for (line, code) in [(1, "a = 1"), (2, "print(a)"), (3, "a = 1"), (4, "b = a + 1")] {
            history.store_input(line, code).expect("store input");
        }
        history.store_output(2, "1").expect("store output");
        history
    }

    #[test]
    fn open_in_memory_applies_schema() {
        let history = SqliteHistory::open_in_memory().expect("open history");
        let objects: Vec<String> = history
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE name LIKE '%history%' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(objects, vec!["history", "idx_history_source"]);
        assert!(history.tail(10, true).expect("empty tail").is_empty());
    }

    #[test]
    fn tail_returns_last_lines_in_ascending_order() {
        let history = seeded();
        let entries = history.tail(2, false).expect("tail");
        let lines: Vec<u32> = entries.iter().map(|entry| entry.line).collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn range_maps_session_zero_to_current() {
        let history = seeded();
        let entries = history.range(0, 2, 4, true).expect("range");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].session, CURRENT_SESSION);
        assert_eq!(entries[0].output.as_deref(), Some("1"));
        assert_eq!(entries[1].line, 3);
    }

    #[test]
    fn unique_search_keeps_newest_duplicate() {
        let history = seeded();
        let entries = history.search("a = *", false, None, true).expect("search");
        let lines: Vec<u32> = entries.iter().map(|entry| entry.line).collect();
        assert_eq!(lines, vec![3]);
    }

    #[test]
    fn process_request_renders_wire_shape_with_output() {
        let history = seeded();
        let reply = history
            .process_request(&json!({
                "hist_access_type": "range",
                "session": 0,
                "start": 2,
                "stop": 3,
                "output": true,
                "raw": true,
            }))
            .expect("history reply");

        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["history"], json!([[CURRENT_SESSION, 2, ["print(a)", "1"]]]));
    }

    #[test]
    fn recording_same_line_replaces_it() {
        let mut history = seeded();
        history.store_input(4, "b = 2").expect("re-store");
        let entries = history.tail(1, false).expect("tail");
        assert_eq!(entries[0].input, "b = 2");
    }
}
