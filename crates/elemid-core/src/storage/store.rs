//! Store - SQLite WAL persistent storage for the registry
//!
//! One writer connection guarded by a `parking_lot::Mutex`. Every operation
//! names a timeout: waiting for the connection longer than that fails with
//! `StoreTimeout`, and a transaction that overruns its deadline is rolled
//! back instead of committed, so prior state is left unchanged.
//!
//! File-backed stores also open a second, read-only connection for
//! [`Store::snapshot`]. Long scans run there against the last committed WAL
//! snapshot and never hold the writer. In-memory stores have no second
//! connection and `snapshot` shares the writer.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{RegistryError, Result};
use crate::storage::schema;

const MEMORY_PATH: &str = ":memory:";

/// SQLite store shared by every registry component
pub struct Store {
    conn: Mutex<Connection>,
    /// Read-only connection for scans; `None` for in-memory stores
    reader: Option<Mutex<Connection>>,
    path: PathBuf,
    default_timeout: Duration,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("default_timeout", &self.default_timeout)
            .field("has_reader", &self.reader.is_some())
            .finish()
    }
}

impl Store {
    /// Opens (or creates) the database in WAL mode and runs migrations.
    pub fn open(path: impl AsRef<Path>, default_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let in_memory = path == Path::new(MEMORY_PATH);
        let conn = if in_memory {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        };

        conn.execute_batch(schema::PRAGMAS)?;
        conn.busy_timeout(default_timeout)?;

        let mut store = Self {
            conn: Mutex::new(conn),
            reader: None,
            path: path.to_path_buf(),
            default_timeout,
        };
        store.migrate()?;
        if !in_memory {
            store.reader = Some(Mutex::new(open_reader(path, default_timeout)?));
        }
        tracing::debug!(path = %store.path.display(), reader = !in_memory, "store opened");
        Ok(store)
    }

    /// Throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::open(MEMORY_PATH, Duration::from_secs(5))
    }

    fn migrate(&self) -> Result<()> {
        self.with_conn("migrate", self.default_timeout, |conn| {
            conn.execute_batch(schema::MIGRATIONS)?;
            Ok(())
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn acquire(&self, operation: &str, timeout: Duration) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .try_lock_for(timeout)
            .ok_or_else(|| timeout_error(operation, timeout))
    }

    /// Run `f` against the connection outside a transaction
    pub fn with_conn<T>(
        &self,
        operation: &str,
        timeout: Duration,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let guard = self.acquire(operation, timeout)?;
        f(&guard)
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// Commits only if `f` succeeds and the deadline has not passed.
    pub fn transaction<T>(
        &self,
        operation: &str,
        timeout: Duration,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let mut guard = self.acquire(operation, timeout)?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let value = f(&tx)?;

        if started.elapsed() > timeout {
            tx.rollback()?;
            return Err(timeout_error(operation, timeout));
        }
        tx.commit()?;
        Ok(value)
    }

    /// `with_conn` using the default timeout
    pub fn read<T>(&self, operation: &str, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.with_conn(operation, self.default_timeout, f)
    }

    /// `transaction` using the default timeout
    pub fn write<T>(&self, operation: &str, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.transaction(operation, self.default_timeout, f)
    }

    /// Run a read-only query on the snapshot connection.
    ///
    /// Falls back to the writer for in-memory stores.
    pub fn snapshot<T>(&self, operation: &str, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let Some(reader) = &self.reader else {
            return self.read(operation, f);
        };
        let guard = reader
            .try_lock_for(self.default_timeout)
            .ok_or_else(|| timeout_error(operation, self.default_timeout))?;
        f(&guard)
    }

    /// True when [`Store::snapshot`] runs on its own connection
    pub fn has_snapshot_reader(&self) -> bool {
        self.reader.is_some()
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<serde_json::Value> {
        self.read("stats", |conn| {
            let mut out = serde_json::Map::new();
            for table in schema::TABLES {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                out.insert((*table).to_string(), serde_json::json!(count));
            }
            out.insert("path".into(), serde_json::json!(self.path.display().to_string()));
            Ok(serde_json::Value::Object(out))
        })
    }
}

fn open_reader(path: &Path, timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(timeout)?;
    Ok(conn)
}

fn timeout_error(operation: &str, timeout: Duration) -> RegistryError {
    RegistryError::StoreTimeout {
        operation: operation.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    }
}
