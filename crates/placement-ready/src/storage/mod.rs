//! SQLite persistence: handle acquisition with lock retry, additive schema evolution, and
//! row mapping for criteria, profiles, and students.

pub mod connection;
pub mod records;
pub mod schema;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

pub use connection::{
    is_transient_lock, ConnectionError, ConnectionManager, Connector, RetryPolicy, SqliteConnector,
};
pub use schema::{SchemaError, SchemaGuard, SchemaReport};

use crate::config::StorageConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("storage query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Entry point for everything that touches the database.
///
/// Every operation acquires its own handle and releases it before returning.
pub struct PlacementStore<C = SqliteConnector> {
    connections: ConnectionManager<C>,
    schema: SchemaGuard,
}

impl PlacementStore<SqliteConnector> {
    /// Build the store described by the process configuration. Does not touch the disk.
    pub fn from_config(config: &StorageConfig) -> Self {
        let connector = SqliteConnector::new(config.database_path.clone(), config.busy_timeout);
        Self::new(ConnectionManager::new(connector, config.retry))
    }
}

impl<C: Connector> PlacementStore<C> {
    pub fn new(connections: ConnectionManager<C>) -> Self {
        Self {
            connections,
            schema: SchemaGuard::default(),
        }
    }

    /// Construct the store and bring the schema up to date.
    pub fn open(connections: ConnectionManager<C>) -> Result<Self, StorageError> {
        let store = Self::new(connections);
        let report = store.migrate()?;
        if !report.is_noop() {
            info!(
                from = report.from_version,
                to = report.to_version,
                columns_added = report.alterations(),
                "storage schema upgraded"
            );
        }
        Ok(store)
    }

    pub fn migrate(&self) -> Result<SchemaReport, StorageError> {
        self.with_connection(|conn| self.schema.run(conn).map_err(StorageError::from))
    }

    pub fn with_connection<F, R, E>(&self, op: F) -> Result<R, E>
    where
        F: FnOnce(&mut Connection) -> Result<R, E>,
        E: From<StorageError>,
    {
        let mut conn = self
            .connections
            .acquire()
            .map_err(|err| E::from(StorageError::from(err)))?;
        op(&mut conn)
    }

    /// Run `op` inside one transaction. It commits only when `op` succeeds; on error the
    /// transaction is dropped and rolled back.
    ///
    /// The write lock is taken at `BEGIN IMMEDIATE`, where the busy timeout applies. A
    /// deferred transaction that reads first cannot wait for the lock when it later writes.
    pub fn with_transaction<F, R, E>(&self, op: F) -> Result<R, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
        E: From<StorageError>,
    {
        self.with_connection(|conn| {
            let mut tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| E::from(begin_failed(err)))?;
            let value = op(&mut tx)?;
            tx.commit().map_err(|err| E::from(StorageError::from(err)))?;
            Ok(value)
        })
    }
}

/// Still locked once the busy timeout ran out: report it like a failed acquisition.
fn begin_failed(err: rusqlite::Error) -> StorageError {
    if is_transient_lock(&err) {
        StorageError::Connection(ConnectionError::Unavailable {
            attempts: 1,
            source: err,
        })
    } else {
        StorageError::Sqlite(err)
    }
}
