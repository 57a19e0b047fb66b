use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};
use tracing::{debug, warn};

/// Source of fresh SQLite handles. Implemented for closures so tests can script failures.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Connection, rusqlite::Error>;
}

impl<F> Connector for F
where
    F: Fn() -> Result<Connection, rusqlite::Error> + Send + Sync,
{
    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        self()
    }
}

/// Opens the on-disk database and applies the connection pragmas.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        // Switching journal mode needs the write lock, so a contended database fails here.
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }
}

/// Bounded retry applied to handle acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("storage unavailable: still locked after {attempts} attempt(s)")]
    Unavailable {
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("unable to open storage: {0}")]
    Open(#[source] rusqlite::Error),
}

/// True for the contention conditions SQLite reports while another writer holds the lock.
pub fn is_transient_lock(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Hands out storage handles, retrying only while the database reports it is locked.
pub struct ConnectionManager<C = SqliteConnector> {
    connector: C,
    policy: RetryPolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn acquire(&self) -> Result<Connection, ConnectionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.connector.connect() {
                Ok(conn) => {
                    if attempt > 1 {
                        debug!(attempt, "storage handle acquired after retry");
                    }
                    return Ok(conn);
                }
                Err(err) if is_transient_lock(&err) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %err, "storage still locked; giving up");
                        return Err(ConnectionError::Unavailable {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(attempt, max_attempts, error = %err, "storage locked; retrying");
                    thread::sleep(self.policy.backoff);
                    attempt += 1;
                }
                Err(err) => return Err(ConnectionError::Open(err)),
            }
        }
    }
}
