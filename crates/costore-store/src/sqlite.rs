//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for costore. It uses rusqlite with
//! bundled SQLite behind a mutex; async callers go through
//! [`AsyncStore`](crate::AsyncStore), which wraps each call in
//! `tokio::task::spawn_blocking`.
//!
//! Every mutating operation opens its transaction with `BEGIN IMMEDIATE`,
//! taking the write lock before the first read so that check-then-write
//! sequences cannot interleave.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use costore_core::{
    genesis_hash, Blake3Ed25519, Blake3Hash, CoId, CoValueHeader, CryptoProvider, KnownState,
    SessionBatch, SessionId, SessionState, Transaction,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AddOutcome, BlockingStore, NewCoValue};
use crate::AsyncStore;

/// A dynamically typed SQLite value, used by the raw statement primitives.
pub type SqlValue = rusqlite::types::Value;

/// Rows and change count produced by [`SqliteStore::execute_sync`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by a statement that returns no columns.
    pub rows_affected: usize,
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Connection settings for [`SqliteStore::open_with`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a statement waits on a locked database before failing busy.
    pub busy_timeout: Duration,
    /// Journal mode for file databases.
    pub journal_mode: JournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            journal_mode: JournalMode::Wal,
        }
    }
}

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
    crypto: Arc<dyn CryptoProvider>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Open a SQLite database with explicit connection settings.
    pub fn open_with(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        configure(&conn, config)?;
        conn.pragma_update_and_check(None, "journal_mode", config.journal_mode.as_str(), |row| {
            row.get::<_, String>(0)
        })?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure(&conn, &StoreConfig::default())?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            crypto: Arc::new(Blake3Ed25519),
        }
    }

    /// Use a different provider for session chain hashes.
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    /// A panic while holding the connection poisons it for good; that is a
    /// storage fault, not contention.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Background(format!("connection mutex poisoned: {}", e)))
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a blocking operation inside an immediate write transaction.
    ///
    /// The transaction commits when `f` succeeds and rolls back otherwise.
    fn with_write_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Raw Primitives
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one SQL statement with positional parameters.
    ///
    /// Bypasses every store invariant. Statements that return columns
    /// collect their rows; others report the number of changed rows.
    pub fn execute_sync(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        self.with_conn(|conn| run_statement(conn, sql, params))
    }

    /// Run a closure inside one immediate write transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`.
    pub fn transaction_sync<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        self.with_write_tx(f)
    }

    fn append_in_tx(
        &self,
        tx: &rusqlite::Transaction<'_>,
        id: &CoId,
        co_row: i64,
        batch: &SessionBatch,
    ) -> Result<SessionState> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch(batch.session_id.to_string()));
        }

        let session_key = batch.session_id.to_string();
        let existing: Option<(i64, i64, Vec<u8>)> = tx
            .query_row(
                "SELECT row_id, last_idx, last_hash FROM sessions
                 WHERE co_value = ?1 AND session_id = ?2",
                params![co_row, session_key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (count, prev_hash) = match &existing {
            Some((_, last_idx, hash)) => (
                *last_idx as u64 + 1,
                Blake3Hash::try_from(hash.as_slice())
                    .map_err(|_| StoreError::InvalidData(format!("bad last_hash in {}", session_key)))?,
            ),
            None => (0, genesis_hash(self.crypto.as_ref(), id, &batch.session_id)),
        };

        if batch.after != count {
            return Err(StoreError::IndexConflict {
                id: id.to_string(),
                session: session_key,
                expected: count,
                got: batch.after,
            });
        }

        let last_hash = batch.head(self.crypto.as_ref(), &prev_hash);
        let last_idx = batch.end() - 1;
        let signature = batch.last_signature.to_string();

        let ses_row = match existing {
            Some((row_id, _, _)) => {
                tx.execute(
                    "UPDATE sessions SET last_idx = ?1, last_signature = ?2, last_hash = ?3
                     WHERE row_id = ?4",
                    params![last_idx as i64, signature, last_hash.as_bytes().as_slice(), row_id],
                )?;
                row_id
            }
            None => {
                tx.execute(
                    "INSERT INTO sessions (co_value, session_id, last_idx, last_signature, last_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        co_row,
                        session_key,
                        last_idx as i64,
                        signature,
                        last_hash.as_bytes().as_slice(),
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        let mut insert = tx.prepare_cached("INSERT INTO transactions (ses, idx, tx) VALUES (?1, ?2, ?3)")?;
        for (offset, transaction) in batch.transactions.iter().enumerate() {
            insert.execute(params![
                ses_row,
                (batch.after + offset as u64) as i64,
                transaction.as_str()
            ])?;
        }

        Ok(SessionState {
            session_id: batch.session_id,
            last_idx,
            last_signature: batch.last_signature,
            last_hash,
        })
    }
}

impl AsyncStore<SqliteStore> {
    /// Async form of [`SqliteStore::execute_sync`].
    pub async fn execute_async(
        &self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<QueryResult> {
        let sql = sql.into();
        self.run(move |s| s.execute_sync(&sql, &params)).await
    }

    /// Async form of [`SqliteStore::transaction_sync`].
    pub async fn transaction_async<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |s| s.transaction_sync(f)).await
    }
}

fn configure(conn: &Connection, config: &StoreConfig) -> Result<()> {
    conn.busy_timeout(config.busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

fn run_statement(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let column_count = stmt.column_count();

    if column_count == 0 {
        let rows_affected = stmt.execute(params_from_iter(params.iter()))?;
        return Ok(QueryResult {
            rows_affected,
            ..QueryResult::default()
        });
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(row.get::<_, SqlValue>(i)?);
        }
        out.push(values);
    }

    Ok(QueryResult {
        columns,
        rows: out,
        rows_affected: 0,
    })
}

fn co_value_row(conn: &Connection, id: &CoId) -> Result<Option<(i64, String)>> {
    Ok(conn
        .query_row(
            "SELECT row_id, header FROM co_values WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?)
}

fn parse_header(id: &CoId, text: &str) -> Result<CoValueHeader> {
    CoValueHeader::from_json(text)
        .map_err(|e| StoreError::InvalidData(format!("header of {}: {}", id, e)))
}

// Helper to convert a sessions row (session_id, last_idx, last_signature, last_hash)
fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionState> {
    let session_id: String = row.get(0)?;
    let last_idx: i64 = row.get(1)?;
    let signature: String = row.get(2)?;
    let hash: Vec<u8> = row.get(3)?;

    Ok(SessionState {
        session_id: session_id
            .parse::<SessionId>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?,
        last_idx: last_idx as u64,
        last_signature: signature
            .parse()
            .map_err(|e: costore_core::CoreError| StoreError::InvalidData(e.to_string()))?,
        last_hash: Blake3Hash::try_from(hash.as_slice())
            .map_err(|_| StoreError::InvalidData(format!("bad last_hash in {}", session_id)))?,
    })
}

fn load_sessions(conn: &Connection, co_row: i64) -> Result<Vec<SessionState>> {
    let mut stmt = conn.prepare_cached(
        "SELECT session_id, last_idx, last_signature, last_hash FROM sessions
         WHERE co_value = ?1 ORDER BY session_id",
    )?;
    let mut rows = stmt.query(params![co_row])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    Ok(sessions)
}

impl BlockingStore for SqliteStore {
    fn add_co_value(&self, new: &NewCoValue) -> Result<AddOutcome> {
        let header_text = new.header.to_canonical_string();

        self.with_write_tx(|tx| {
            let (co_row, outcome) = match co_value_row(tx, &new.id)? {
                Some((row_id, stored)) => {
                    // Compare canonically so formatting differences are not conflicts.
                    let stored = parse_header(&new.id, &stored)?;
                    if stored.to_canonical_string() != header_text {
                        warn!(id = %new.id, "rejecting coValue with conflicting header");
                        return Err(StoreError::HeaderConflict {
                            id: new.id.to_string(),
                        });
                    }
                    (row_id, AddOutcome::AlreadyExists)
                }
                None => {
                    tx.execute(
                        "INSERT INTO co_values (id, header, created_at) VALUES (?1, ?2, ?3)",
                        params![new.id.to_string(), header_text, migration::now_millis()],
                    )?;
                    (tx.last_insert_rowid(), AddOutcome::Inserted)
                }
            };

            for batch in &new.new_content {
                self.append_in_tx(tx, &new.id, co_row, batch)?;
            }

            debug!(
                id = %new.id,
                action = ?new.action,
                priority = new.priority.0,
                batches = new.new_content.len(),
                ?outcome,
                "added coValue"
            );
            Ok(outcome)
        })
    }

    fn get_co_value(&self, id: &CoId) -> Result<Option<CoValueHeader>> {
        self.with_conn(|conn| {
            co_value_row(conn, id)?
                .map(|(_, text)| parse_header(id, &text))
                .transpose()
        })
    }

    fn delete_co_value(&self, id: &CoId) -> Result<bool> {
        self.with_write_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM co_values WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    fn replace_header_unbound(&self, id: &CoId, header: &CoValueHeader) -> Result<bool> {
        warn!(id = %id, "replacing header in place; id no longer matches header");
        self.with_write_tx(|tx| {
            let updated = tx.execute(
                "UPDATE co_values SET header = ?1 WHERE id = ?2",
                params![header.to_canonical_string(), id.to_string()],
            )?;
            Ok(updated > 0)
        })
    }

    fn list_co_values(&self) -> Result<Vec<CoId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM co_values ORDER BY row_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids.into_iter()
                .map(|s| {
                    s.parse::<CoId>()
                        .map_err(|e| StoreError::InvalidData(e.to_string()))
                })
                .collect()
        })
    }

    fn append_batches(&self, id: &CoId, batches: &[SessionBatch]) -> Result<Vec<SessionState>> {
        self.with_write_tx(|tx| {
            let (co_row, _) =
                co_value_row(tx, id)?.ok_or_else(|| StoreError::UnknownCoValue(id.to_string()))?;

            let states = batches
                .iter()
                .map(|batch| self.append_in_tx(tx, id, co_row, batch))
                .collect::<Result<Vec<_>>>()?;

            debug!(id = %id, batches = batches.len(), "appended batches");
            Ok(states)
        })
    }

    fn get_session(&self, id: &CoId, session_id: &SessionId) -> Result<Option<SessionState>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT s.session_id, s.last_idx, s.last_signature, s.last_hash
                 FROM sessions s JOIN co_values c ON s.co_value = c.row_id
                 WHERE c.id = ?1 AND s.session_id = ?2",
            )?;
            let mut rows = stmt.query(params![id.to_string(), session_id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_session(row)?)),
                None => Ok(None),
            }
        })
    }

    fn get_sessions(&self, id: &CoId) -> Result<Vec<SessionState>> {
        self.with_conn(|conn| match co_value_row(conn, id)? {
            Some((co_row, _)) => load_sessions(conn, co_row),
            None => Ok(Vec::new()),
        })
    }

    fn get_transactions(
        &self,
        id: &CoId,
        session_id: &SessionId,
        from: u64,
        to_inclusive: u64,
    ) -> Result<Vec<Transaction>> {
        // Indices are stored as INTEGER; nothing lives past i64::MAX.
        if to_inclusive < from || from > i64::MAX as u64 {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT t.tx FROM transactions t
                 JOIN sessions s ON t.ses = s.row_id
                 JOIN co_values c ON s.co_value = c.row_id
                 WHERE c.id = ?1 AND s.session_id = ?2 AND t.idx >= ?3 AND t.idx <= ?4
                 ORDER BY t.idx",
            )?;
            let txs = stmt
                .query_map(
                    params![
                        id.to_string(),
                        session_id.to_string(),
                        from as i64,
                        to_inclusive.min(i64::MAX as u64) as i64
                    ],
                    |row| row.get::<_, String>(0),
                )?
                .map(|r| r.map(Transaction::from_stored))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(txs)
        })
    }

    fn known_state(&self, id: &CoId) -> Result<KnownState> {
        self.with_conn(|conn| {
            let mut known = KnownState::empty(*id);
            if let Some((co_row, _)) = co_value_row(conn, id)? {
                known.header = true;
                for session in load_sessions(conn, co_row)? {
                    known.set(session.session_id, session.count());
                }
            }
            Ok(known)
        })
    }
}
