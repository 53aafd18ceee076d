use std::sync::Arc;

use log::info;

use super::error::DbError;
use super::pool::{ConnectionConfig, PoolManager, PooledConn};

/// The engine's entry point, shared between the host application's command
/// handlers.
///
/// `SqlEngine` owns nothing but a reference to the [`PoolManager`]; every
/// operation checks out a connection for its own duration, so independent
/// requests run concurrently on separate pooled connections while a batch
/// mutation keeps one connection (and its transaction) to itself until it
/// commits or rolls back.
///
/// The operation implementations live next to their concern:
/// statement execution in `executor`, batch mutation in `mutation`, and
/// introspection plus table design in `schema`.
pub struct SqlEngine {
    pools: Arc<PoolManager>,
}

impl SqlEngine {
    pub fn new(pools: Arc<PoolManager>) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    /// Registers connection settings under a database name.
    pub fn register_database(&self, name: &str, config: ConnectionConfig) {
        info!("registering database connection {}", name);
        self.pools.register(name, config);
    }

    /// Checks out a connection to the named database.
    pub(crate) async fn connection(&self, database: &str) -> Result<PooledConn, DbError> {
        self.pools.pool(database)?.acquire().await
    }

    /// Verifies the named database is reachable.
    ///
    /// # Errors
    ///
    /// Returns a `DbError` when the database is unknown or unreachable.
    pub async fn test_connection(&self, database: &str) -> Result<(), DbError> {
        self.pools.pool(database)?.health_check().await
    }
}
