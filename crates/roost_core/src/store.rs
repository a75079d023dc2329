/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::accounts::AccountInfo;
use crate::error::StoreError;
use crate::ledger::StatusItem;
use crate::resource::{ResourceId, Route, Table};
use roost_protocol::{Record, Rows, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Projection, filter and ordering of a read.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub projection: Option<Vec<String>>,
    /// SQL condition with positional `?` placeholders bound from `selection_args`.
    pub selection: Option<String>,
    pub selection_args: Vec<Value>,
    /// Comma separated `column [ASC|DESC]` terms.
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkInsertOutcome {
    pub inserted: usize,
    /// Indices into the batch of the records that were stored, in batch order.
    pub stored: Vec<usize>,
    /// Rows that actually landed in a count-tracked table (post-count minus pre-count).
    pub delta: Option<i64>,
}

/// Everything the provider needs from persistence. `TableStore` is the sqlite implementation.
pub trait TableBackend: Send + Sync {
    /// `Ok(None)` when the resource is not a readable table/view or the address is malformed.
    fn query(&self, route: &Route, args: &QueryArgs) -> StoreResult<Option<Rows>>;
    /// Row id of the new row, or `None` when a uniqueness rule dropped it.
    fn insert(&self, table: Table, values: &Record) -> StoreResult<Option<i64>>;
    fn bulk_insert(&self, table: Table, values: &[Record]) -> StoreResult<BulkInsertOutcome>;
    fn update(&self, table: Table, values: &Record, selection: Option<&str>, args: &[Value]) -> StoreResult<usize>;
    fn delete(&self, table: Table, selection: Option<&str>, args: &[Value]) -> StoreResult<usize>;
    fn is_filtered(&self, status: &StatusItem) -> StoreResult<bool>;
    fn account(&self, account_id: i64) -> StoreResult<Option<AccountInfo>>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NOT NULL UNIQUE,
      screen_name TEXT NOT NULL,
      name TEXT NULL,
      auth_type INTEGER NOT NULL DEFAULT 0,
      basic_auth_password TEXT NULL,
      oauth_token TEXT NULL,
      token_secret TEXT NULL,
      rest_base_url TEXT NULL,
      profile_image_url TEXT NULL,
      user_color INTEGER NULL,
      is_activated INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS statuses (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NOT NULL,
      status_id INTEGER NOT NULL,
      user_id INTEGER NULL,
      status_timestamp INTEGER NOT NULL DEFAULT 0,
      screen_name TEXT NULL,
      name TEXT NULL,
      text_html TEXT NULL,
      text_plain TEXT NULL,
      profile_image_url TEXT NULL,
      in_reply_to_status_id INTEGER NULL,
      in_reply_to_screen_name TEXT NULL,
      retweet_id INTEGER NULL,
      retweeted_by_name TEXT NULL,
      is_favorite INTEGER NOT NULL DEFAULT 0,
      UNIQUE(account_id, status_id) ON CONFLICT IGNORE
    );
    CREATE INDEX IF NOT EXISTS idx_statuses_ts ON statuses(account_id, status_timestamp DESC);

    CREATE TABLE IF NOT EXISTS mentions (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NOT NULL,
      status_id INTEGER NOT NULL,
      user_id INTEGER NULL,
      status_timestamp INTEGER NOT NULL DEFAULT 0,
      screen_name TEXT NULL,
      name TEXT NULL,
      text_html TEXT NULL,
      text_plain TEXT NULL,
      profile_image_url TEXT NULL,
      in_reply_to_status_id INTEGER NULL,
      in_reply_to_screen_name TEXT NULL,
      retweet_id INTEGER NULL,
      retweeted_by_name TEXT NULL,
      is_favorite INTEGER NOT NULL DEFAULT 0,
      UNIQUE(account_id, status_id) ON CONFLICT IGNORE
    );
    CREATE INDEX IF NOT EXISTS idx_mentions_ts ON mentions(account_id, status_timestamp DESC);

    CREATE TABLE IF NOT EXISTS cached_statuses (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NOT NULL,
      status_id INTEGER NOT NULL,
      user_id INTEGER NULL,
      status_timestamp INTEGER NOT NULL DEFAULT 0,
      screen_name TEXT NULL,
      name TEXT NULL,
      text_html TEXT NULL,
      text_plain TEXT NULL,
      profile_image_url TEXT NULL,
      UNIQUE(account_id, status_id) ON CONFLICT REPLACE
    );

    CREATE TABLE IF NOT EXISTS messages_inbox (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NOT NULL,
      message_id INTEGER NOT NULL,
      message_timestamp INTEGER NOT NULL DEFAULT 0,
      sender_id INTEGER NOT NULL,
      recipient_id INTEGER NOT NULL,
      sender_screen_name TEXT NULL,
      sender_name TEXT NULL,
      recipient_screen_name TEXT NULL,
      recipient_name TEXT NULL,
      text_html TEXT NULL,
      text_plain TEXT NULL,
      sender_profile_image_url TEXT NULL,
      recipient_profile_image_url TEXT NULL,
      UNIQUE(account_id, message_id) ON CONFLICT IGNORE
    );

    CREATE TABLE IF NOT EXISTS messages_outbox (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NOT NULL,
      message_id INTEGER NOT NULL,
      message_timestamp INTEGER NOT NULL DEFAULT 0,
      sender_id INTEGER NOT NULL,
      recipient_id INTEGER NOT NULL,
      sender_screen_name TEXT NULL,
      sender_name TEXT NULL,
      recipient_screen_name TEXT NULL,
      recipient_name TEXT NULL,
      text_html TEXT NULL,
      text_plain TEXT NULL,
      sender_profile_image_url TEXT NULL,
      recipient_profile_image_url TEXT NULL,
      UNIQUE(account_id, message_id) ON CONFLICT IGNORE
    );

    CREATE TABLE IF NOT EXISTS drafts (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_ids TEXT NULL,
      in_reply_to_status_id INTEGER NULL,
      text TEXT NULL,
      location TEXT NULL,
      image_uri TEXT NULL,
      is_image_attached INTEGER NOT NULL DEFAULT 0,
      is_photo_attached INTEGER NOT NULL DEFAULT 0,
      is_possibly_sensitive INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS cached_users (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      user_id INTEGER NOT NULL UNIQUE ON CONFLICT REPLACE,
      name TEXT NULL,
      screen_name TEXT NULL,
      profile_image_url TEXT NULL
    );

    CREATE TABLE IF NOT EXISTS cached_hashtags (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      name TEXT NOT NULL UNIQUE ON CONFLICT IGNORE
    );

    CREATE TABLE IF NOT EXISTS filtered_users (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      value TEXT NOT NULL UNIQUE ON CONFLICT IGNORE
    );
    CREATE TABLE IF NOT EXISTS filtered_keywords (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      value TEXT NOT NULL UNIQUE ON CONFLICT IGNORE
    );
    CREATE TABLE IF NOT EXISTS filtered_sources (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      value TEXT NOT NULL UNIQUE ON CONFLICT IGNORE
    );
    CREATE TABLE IF NOT EXISTS filtered_links (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      value TEXT NOT NULL UNIQUE ON CONFLICT IGNORE
    );

    CREATE TABLE IF NOT EXISTS trends_local (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      account_id INTEGER NULL,
      name TEXT NOT NULL,
      timestamp INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS tabs (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      name TEXT NOT NULL,
      icon TEXT NULL,
      type TEXT NOT NULL,
      arguments TEXT NULL,
      position INTEGER NOT NULL DEFAULT 0
    );
"#;

/// Both direct message tables, tagged with direction and the conversation partner.
const MESSAGES_UNION: &str = r#"(
      SELECT *, 0 AS is_outgoing, sender_id AS conversation_id, sender_screen_name AS conversation_screen_name
      FROM messages_inbox
      UNION ALL
      SELECT *, 1 AS is_outgoing, recipient_id AS conversation_id, recipient_screen_name AS conversation_screen_name
      FROM messages_outbox
    )"#;

const MESSAGE_VIEW_COLUMNS: &[&str] = &[
    "_id",
    "account_id",
    "message_id",
    "message_timestamp",
    "sender_id",
    "recipient_id",
    "sender_screen_name",
    "sender_name",
    "recipient_screen_name",
    "recipient_name",
    "text_html",
    "text_plain",
    "sender_profile_image_url",
    "recipient_profile_image_url",
    "is_outgoing",
    "conversation_id",
    "conversation_screen_name",
];

const DEFAULT_MESSAGE_ORDER: &str = "message_timestamp DESC, message_id DESC";

/// Sqlite store. All statements go through one connection, which linearises writers.
pub struct TableStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl TableStore {
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, path)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        ensure_columns(&conn, "statuses", &[("source", "TEXT NULL"), ("is_gap", "INTEGER NOT NULL DEFAULT 0")])?;
        ensure_columns(&conn, "mentions", &[("source", "TEXT NULL"), ("is_gap", "INTEGER NOT NULL DEFAULT 0")])?;
        ensure_columns(&conn, "cached_statuses", &[("source", "TEXT NULL")])?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn health_check(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn count(&self, table: Table) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        count_rows(&conn, table)
    }

    fn query_table(&self, table: Table, args: &QueryArgs) -> StoreResult<Rows> {
        let columns = projection_sql(args.projection.as_deref())?;
        let mut sql = format!("SELECT {columns} FROM {}", table.name());
        push_where(&mut sql, &[], args.selection.as_deref());
        push_order(&mut sql, args.sort_order.as_deref(), None)?;
        let conn = self.conn.lock().unwrap();
        run_query(&conn, &sql, &args.selection_args)
    }

    fn query_view(&self, route: &Route, args: &QueryArgs) -> StoreResult<Option<Rows>> {
        let mut scoped: Vec<(&str, Value)> = Vec::new();
        let mut latest_only = false;
        match route.resource {
            ResourceId::DirectMessages => {}
            ResourceId::Conversation => {
                let [_, account, partner] = route.segments.as_slice() else {
                    return Ok(None);
                };
                let (Ok(account), Ok(partner)) = (account.parse::<i64>(), partner.parse::<i64>()) else {
                    return Ok(None);
                };
                scoped.push(("account_id = ?", Value::Integer(account)));
                scoped.push(("conversation_id = ?", Value::Integer(partner)));
            }
            ResourceId::ConversationScreenName => {
                let [_, account, handle] = route.segments.as_slice() else {
                    return Ok(None);
                };
                let Ok(account) = account.parse::<i64>() else {
                    return Ok(None);
                };
                scoped.push(("account_id = ?", Value::Integer(account)));
                scoped.push(("conversation_screen_name = ?", Value::Text(handle.clone())));
            }
            ResourceId::ConversationsEntry => {
                latest_only = true;
                match route.segments.as_slice() {
                    [_] => {}
                    [_, account] => {
                        let Ok(account) = account.parse::<i64>() else {
                            return Ok(None);
                        };
                        scoped.push(("account_id = ?", Value::Integer(account)));
                    }
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        }

        let columns = match args.projection.as_deref() {
            Some(p) if !p.is_empty() => projection_sql(Some(p))?,
            _ => MESSAGE_VIEW_COLUMNS.join(", "),
        };
        let source = if latest_only {
            format!(
                "(SELECT *, ROW_NUMBER() OVER (PARTITION BY account_id, conversation_id ORDER BY {DEFAULT_MESSAGE_ORDER}) AS conversation_rank FROM {MESSAGES_UNION})"
            )
        } else {
            MESSAGES_UNION.to_string()
        };
        let mut conditions = scoped.iter().map(|(c, _)| *c).collect::<Vec<_>>();
        if latest_only {
            conditions.push("conversation_rank = 1");
        }
        let mut sql = format!("SELECT {columns} FROM {source}");
        push_where(&mut sql, &conditions, args.selection.as_deref());
        push_order(&mut sql, args.sort_order.as_deref(), Some(DEFAULT_MESSAGE_ORDER))?;

        let mut bound = scoped.into_iter().map(|(_, v)| v).collect::<Vec<_>>();
        bound.extend(args.selection_args.iter().cloned());
        let conn = self.conn.lock().unwrap();
        run_query(&conn, &sql, &bound).map(Some)
    }
}

impl TableBackend for TableStore {
    fn query(&self, route: &Route, args: &QueryArgs) -> StoreResult<Option<Rows>> {
        match route.resource {
            ResourceId::Table(table) => self.query_table(table, args).map(Some),
            r if r.is_conversation_view() => self.query_view(route, args),
            _ => Ok(None),
        }
    }

    fn insert(&self, table: Table, values: &Record) -> StoreResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        insert_row(&conn, table, values)
    }

    fn bulk_insert(&self, table: Table, values: &[Record]) -> StoreResult<BulkInsertOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let before = if table.is_count_tracked() {
            Some(count_rows(&conn, table)?)
        } else {
            None
        };
        let tx = conn.transaction()?;
        let mut stored = Vec::new();
        for (idx, record) in values.iter().enumerate() {
            if insert_row(&tx, table, record)?.is_some() {
                stored.push(idx);
            }
        }
        tx.commit()?;
        let delta = match before {
            Some(before) => Some(count_rows(&conn, table)? - before),
            None => None,
        };
        debug!(table = table.name(), inserted = values.len(), stored = stored.len(), ?delta, "bulk insert committed");
        Ok(BulkInsertOutcome {
            inserted: values.len(),
            stored,
            delta,
        })
    }

    fn update(&self, table: Table, values: &Record, selection: Option<&str>, args: &[Value]) -> StoreResult<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut assignments = Vec::with_capacity(values.len());
        let mut bound = Vec::with_capacity(values.len() + args.len());
        for (field, value) in values.iter() {
            assignments.push(format!("{} = ?", check_ident(field)?));
            bound.push(value.clone());
        }
        bound.extend(args.iter().cloned());
        let mut sql = format!("UPDATE {} SET {}", table.name(), assignments.join(", "));
        push_where(&mut sql, &[], selection);
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(&sql, params_from_iter(bound.iter().map(to_sql)))?)
    }

    fn delete(&self, table: Table, selection: Option<&str>, args: &[Value]) -> StoreResult<usize> {
        let mut sql = format!("DELETE FROM {}", table.name());
        push_where(&mut sql, &[], selection);
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(&sql, params_from_iter(args.iter().map(to_sql)))?)
    }

    fn is_filtered(&self, status: &StatusItem) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let hit: Option<i64> = conn
            .query_row(
                r#"
                SELECT 1 WHERE
                  EXISTS (SELECT 1 FROM filtered_users WHERE lower(value) = lower(?1))
                  OR EXISTS (SELECT 1 FROM filtered_keywords WHERE value <> '' AND instr(lower(?2), lower(value)) > 0)
                  OR EXISTS (SELECT 1 FROM filtered_sources WHERE value <> '' AND instr(?3, value) > 0)
                  OR EXISTS (SELECT 1 FROM filtered_links WHERE value <> '' AND instr(?4, value) > 0)
                "#,
                params![status.screen_name, status.text_plain, status.source, status.text_html],
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    fn account(&self, account_id: i64) -> StoreResult<Option<AccountInfo>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT account_id, screen_name, name, user_color, profile_image_url FROM accounts WHERE account_id=?1",
            params![account_id],
            |r| {
                Ok(AccountInfo {
                    account_id: r.get(0)?,
                    screen_name: r.get(1)?,
                    name: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    color: r.get(3)?,
                    profile_image_url: r.get(4)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

fn insert_row(conn: &Connection, table: Table, values: &Record) -> StoreResult<Option<i64>> {
    let changed = if values.is_empty() {
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", table.name()), [])?
    } else {
        let mut columns = Vec::with_capacity(values.len());
        for (field, _) in values.iter() {
            columns.push(check_ident(field)?);
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            table.name(),
            columns.join(", ")
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values.iter().map(|(_, v)| to_sql(v))))?
    };
    Ok((changed > 0).then(|| conn.last_insert_rowid()))
}

fn count_rows(conn: &Connection, table: Table) -> StoreResult<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |r| r.get(0))?)
}

fn run_query(conn: &Connection, sql: &str, args: &[Value]) -> StoreResult<Rows> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_names().into_iter().map(str::to_string).collect::<Vec<_>>();
    let mut rows = stmt.query(params_from_iter(args.iter().map(to_sql)))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (i, name) in columns.iter().enumerate() {
            record.set(name, from_sql(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(Rows { columns, rows: out })
}

fn push_where(sql: &mut String, conditions: &[&str], selection: Option<&str>) {
    let mut clauses = conditions.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    if let Some(sel) = selection.map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push(format!("({sel})"));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
}

fn push_order(sql: &mut String, sort_order: Option<&str>, default: Option<&str>) -> StoreResult<()> {
    match sort_order.map(str::trim).filter(|s| !s.is_empty()) {
        Some(order) => {
            sql.push_str(" ORDER BY ");
            sql.push_str(&check_sort_order(order)?);
        }
        None => {
            if let Some(d) = default {
                sql.push_str(" ORDER BY ");
                sql.push_str(d);
            }
        }
    }
    Ok(())
}

fn projection_sql(projection: Option<&[String]>) -> StoreResult<String> {
    match projection {
        Some(p) if !p.is_empty() => {
            let mut cols = Vec::with_capacity(p.len());
            for c in p {
                cols.push(check_ident(c.trim())?);
            }
            Ok(cols.join(", "))
        }
        _ => Ok("*".to_string()),
    }
}

fn check_ident(name: &str) -> StoreResult<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn check_sort_order(order: &str) -> StoreResult<String> {
    let mut terms = Vec::new();
    for term in order.split(',') {
        let mut parts = term.split_whitespace();
        let column = parts.next().unwrap_or_default();
        let direction = parts.next().map(str::to_ascii_uppercase);
        let ok = check_ident(column).is_ok()
            && parts.next().is_none()
            && matches!(direction.as_deref(), None | Some("ASC") | Some("DESC"));
        if !ok {
            return Err(StoreError::InvalidSortOrder(order.to_string()));
        }
        terms.push(match direction {
            Some(d) => format!("{column} {d}"),
            None => column.to_string(),
        });
    }
    Ok(terms.join(", "))
}

fn ensure_columns(conn: &Connection, table: &str, cols: &[(&str, &str)]) -> StoreResult<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut existing = HashSet::new();
    for r in rows {
        existing.insert(r?);
    }
    for (name, ty) in cols {
        if !existing.contains(*name) {
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {ty}"), [])?;
        }
    }
    Ok(())
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sql(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::content_uri;
    use tempfile::TempDir;

    fn status(account_id: i64, status_id: i64, screen_name: &str) -> Record {
        Record::new()
            .with("account_id", account_id)
            .with("status_id", status_id)
            .with("screen_name", screen_name)
            .with("name", screen_name)
            .with("text_plain", format!("status {status_id}"))
            .with("status_timestamp", status_id * 1000)
    }

    fn message(table_sender: i64, recipient: i64, message_id: i64, ts: i64) -> Record {
        Record::new()
            .with("account_id", 1)
            .with("message_id", message_id)
            .with("message_timestamp", ts)
            .with("sender_id", table_sender)
            .with("recipient_id", recipient)
            .with("sender_screen_name", format!("user{table_sender}"))
            .with("recipient_screen_name", format!("user{recipient}"))
            .with("text_plain", format!("message {message_id}"))
    }

    fn route(path: &str) -> Route {
        Route::parse(&content_uri(path))
    }

    #[test]
    fn opens_on_disk_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roost.db");
        {
            let store = TableStore::open(&path).unwrap();
            store.insert(Table::Statuses, &status(1, 1, "a")).unwrap();
        }
        let store = TableStore::open(&path).unwrap();
        store.health_check().unwrap();
        assert_eq!(store.count(Table::Statuses).unwrap(), 1);
    }

    #[test]
    fn bulk_insert_reports_only_new_rows() {
        let store = TableStore::open_in_memory().unwrap();
        store.insert(Table::Statuses, &status(1, 2, "a")).unwrap();
        let batch = vec![status(1, 1, "a"), status(1, 2, "a"), status(1, 3, "b"), status(1, 3, "b")];
        let outcome = store.bulk_insert(Table::Statuses, &batch).unwrap();
        assert_eq!(outcome.inserted, 4);
        assert_eq!(outcome.stored, vec![0, 2]);
        assert_eq!(outcome.delta, Some(2));
        assert_eq!(store.count(Table::Statuses).unwrap(), 3);
    }

    #[test]
    fn bulk_insert_is_all_or_nothing() {
        let store = TableStore::open_in_memory().unwrap();
        let bad = Record::new().with("status_id", 9);
        let err = store.bulk_insert(Table::Mentions, &[status(1, 1, "a"), bad]);
        assert!(matches!(err, Err(StoreError::Database(_))));
        assert_eq!(store.count(Table::Mentions).unwrap(), 0);
    }

    #[test]
    fn untracked_tables_have_no_delta() {
        let store = TableStore::open_in_memory().unwrap();
        let outcome = store
            .bulk_insert(Table::Drafts, &[Record::new().with("text", "hi")])
            .unwrap();
        assert_eq!(outcome.delta, None);
    }

    #[test]
    fn duplicate_single_insert_yields_no_row_id() {
        let store = TableStore::open_in_memory().unwrap();
        assert!(store.insert(Table::Mentions, &status(1, 5, "a")).unwrap().is_some());
        assert!(store.insert(Table::Mentions, &status(1, 5, "a")).unwrap().is_none());
    }

    #[test]
    fn query_projection_selection_and_order() {
        let store = TableStore::open_in_memory().unwrap();
        for id in 1..=3 {
            store.insert(Table::Statuses, &status(1, id, "a")).unwrap();
        }
        let rows = store
            .query(
                &route("statuses"),
                &QueryArgs {
                    projection: Some(vec!["status_id".into(), "screen_name".into()]),
                    selection: Some("status_id >= ?".into()),
                    selection_args: vec![Value::Integer(2)],
                    sort_order: Some("status_id desc".into()),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(rows.columns, vec!["status_id", "screen_name"]);
        let ids: Vec<_> = rows.rows.iter().map(|r| r.get_i64("status_id").unwrap()).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn rejects_hostile_identifiers() {
        let store = TableStore::open_in_memory().unwrap();
        let args = QueryArgs {
            projection: Some(vec!["screen_name; DROP TABLE accounts".into()]),
            ..Default::default()
        };
        assert!(matches!(
            store.query(&route("accounts"), &args),
            Err(StoreError::InvalidIdentifier(_))
        ));
        let args = QueryArgs {
            sort_order: Some("status_id DESC LIMIT 1".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.query(&route("statuses"), &args),
            Err(StoreError::InvalidSortOrder(_))
        ));
    }

    #[test]
    fn update_and_delete_honour_selection() {
        let store = TableStore::open_in_memory().unwrap();
        for id in 1..=3 {
            store.insert(Table::Statuses, &status(1, id, "a")).unwrap();
        }
        let n = store
            .update(
                Table::Statuses,
                &Record::new().with("is_favorite", true),
                Some("status_id = ?"),
                &[Value::Integer(2)],
            )
            .unwrap();
        assert_eq!(n, 1);
        let n = store
            .delete(Table::Statuses, Some("is_favorite = 0"), &[])
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn conversation_views_compose_inbox_and_outbox() {
        let store = TableStore::open_in_memory().unwrap();
        // account 1 talks to users 7 and 8
        store.insert(Table::DirectMessagesInbox, &message(7, 1, 100, 10)).unwrap();
        store.insert(Table::DirectMessagesOutbox, &message(1, 7, 101, 20)).unwrap();
        store.insert(Table::DirectMessagesInbox, &message(8, 1, 102, 15)).unwrap();

        let all = store.query(&route("messages"), &QueryArgs::default()).unwrap().unwrap();
        assert_eq!(all.len(), 3);

        let convo = store
            .query(&route("messages_conversation/1/7"), &QueryArgs::default())
            .unwrap()
            .unwrap();
        let ids: Vec<_> = convo.rows.iter().map(|r| r.get_i64("message_id").unwrap()).collect();
        assert_eq!(ids, vec![101, 100]);

        let by_name = store
            .query(&route("messages_conversation_screen_name/1/user8"), &QueryArgs::default())
            .unwrap()
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let entries = store
            .query(&route("messages_conversations_entry"), &QueryArgs::default())
            .unwrap()
            .unwrap();
        let latest: Vec<_> = entries.rows.iter().map(|r| r.get_i64("message_id").unwrap()).collect();
        assert_eq!(latest, vec![101, 102]);
    }

    #[test]
    fn malformed_conversation_addresses_are_empty() {
        let store = TableStore::open_in_memory().unwrap();
        for path in [
            "messages_conversation/1",
            "messages_conversation/1/2/3",
            "messages_conversation/x/2",
            "messages_conversation_screen_name/1",
            "messages_conversations_entry/1/2",
        ] {
            assert!(store.query(&route(path), &QueryArgs::default()).unwrap().is_none(), "{path}");
        }
    }

    #[test]
    fn filter_tables_match_users_keywords_sources_and_links() {
        let store = TableStore::open_in_memory().unwrap();
        let item = |screen_name: &str, text: &str, source: &str| StatusItem {
            account_id: 1,
            status_id: 1,
            screen_name: screen_name.into(),
            name: String::new(),
            text_plain: text.into(),
            text_html: text.into(),
            source: source.into(),
            profile_image_url: None,
            timestamp: 0,
        };
        assert!(!store.is_filtered(&item("bob", "hello", "web")).unwrap());
        store.insert(Table::FilteredUsers, &Record::new().with("value", "Spammer")).unwrap();
        store.insert(Table::FilteredKeywords, &Record::new().with("value", "crypto")).unwrap();
        store.insert(Table::FilteredSources, &Record::new().with("value", "botapp")).unwrap();
        store.insert(Table::FilteredLinks, &Record::new().with("value", "bad.example")).unwrap();
        assert!(store.is_filtered(&item("spammer", "hi", "web")).unwrap());
        assert!(store.is_filtered(&item("bob", "buy CRYPTO now", "web")).unwrap());
        assert!(store.is_filtered(&item("bob", "hi", "<a>botapp</a>")).unwrap());
        assert!(store.is_filtered(&item("bob", "see http://bad.example/x", "web")).unwrap());
        assert!(!store.is_filtered(&item("bob", "hello", "web")).unwrap());
    }

    #[test]
    fn account_lookup() {
        let store = TableStore::open_in_memory().unwrap();
        store
            .insert(
                Table::Accounts,
                &Record::new()
                    .with("account_id", 42)
                    .with("screen_name", "me")
                    .with("name", "Me Myself")
                    .with("user_color", 0xff0000),
            )
            .unwrap();
        let info = store.account(42).unwrap().unwrap();
        assert_eq!(info.screen_name, "me");
        assert_eq!(info.color, Some(0xff0000));
        assert!(store.account(7).unwrap().is_none());
    }
}
