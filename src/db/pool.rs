//! Explicit connection pooling over tokio-postgres.
//!
//! Each configured database gets its own fixed-capacity [`ConnectionPool`];
//! the [`PoolManager`] is the registry handed to the engine by reference, so
//! no connection state lives in ambient globals. Connections are created
//! lazily, handed out exclusively through [`PooledConn`] guards and returned
//! on drop; a connection found broken on checkout is discarded and replaced.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{debug, warn};
use rust_i18n::t;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::{Client, NoTls};

use super::error::DbError;
use crate::constants::{DEFAULT_POOL_SIZE, DEFAULT_PORT};

/// Connection settings for one database, as stored by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

/// A fixed-capacity pool of connections to a single database.
pub struct ConnectionPool {
    config: ConnectionConfig,
    idle: parking_lot::Mutex<Vec<Client>>,
    permits: Arc<Semaphore>,
}

impl ConnectionPool {
    pub fn new(config: ConnectionConfig) -> Self {
        let capacity = config.pool_size.max(1);
        Self {
            config,
            idle: parking_lot::Mutex::new(Vec::with_capacity(capacity)),
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Checks out a connection, waiting FIFO when the pool is at capacity.
    ///
    /// Idle connections that went away while parked are discarded; a new
    /// connection is established when none survive.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Pool` when a connection cannot be established.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConn, DbError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| pool_error(&self.config.dbname, e.to_string()))?;

        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(client) if !client.is_closed() => {
                    return Ok(PooledConn {
                        client: Some(client),
                        pool: Arc::clone(self),
                        _permit: permit,
                    });
                }
                Some(_) => {
                    debug!("discarding broken connection to {}", self.config.dbname);
                    continue;
                }
                None => break,
            }
        }

        let client = self.connect().await?;
        Ok(PooledConn {
            client: Some(client),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Opens a fresh connection and spawns its I/O driver task.
    async fn connect(&self) -> Result<Client, DbError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .dbname(&self.config.dbname);
        if !self.config.password.is_empty() {
            pg.password(&self.config.password);
        }

        let dbname = self.config.dbname.clone();
        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| pool_error(&dbname, e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("connection to {} terminated: {}", dbname, e);
            }
        });
        debug!("opened connection to {}", self.config.dbname);
        Ok(client)
    }

    /// Verifies the database is reachable by running a trivial query.
    pub async fn health_check(self: &Arc<Self>) -> Result<(), DbError> {
        let conn = self.acquire().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| pool_error(&self.config.dbname, e.to_string()))?;
        Ok(())
    }

    fn release(&self, client: Client) {
        if client.is_closed() {
            debug!("dropping closed connection to {}", self.config.dbname);
            return;
        }
        self.idle.lock().push(client);
    }
}

fn pool_error(name: &str, error: String) -> DbError {
    DbError::Pool(t!("db.pool_exhausted", name = name, error = error).to_string())
}

/// An exclusively checked-out connection; returned to its pool on drop.
pub struct PooledConn {
    client: Option<Client>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConn {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("client present until drop")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("client present until drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}

/// Registry of connection pools keyed by database name.
#[derive(Default)]
pub struct PoolManager {
    configs: parking_lot::RwLock<HashMap<String, ConnectionConfig>>,
    pools: parking_lot::RwLock<HashMap<String, Arc<ConnectionPool>>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the connection settings for a database name.
    ///
    /// Replacing settings drops the existing pool; connections already
    /// checked out finish their work on the old settings and are discarded
    /// when returned to the dropped pool.
    pub fn register(&self, name: impl Into<String>, config: ConnectionConfig) {
        let name = name.into();
        self.pools.write().remove(&name);
        self.configs.write().insert(name, config);
    }

    /// Removes a database registration and its pool.
    pub fn remove(&self, name: &str) {
        self.pools.write().remove(name);
        self.configs.write().remove(name);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.configs.read().contains_key(name)
    }

    /// Returns the pool for a registered database, creating it lazily.
    ///
    /// # Errors
    ///
    /// Returns `DbError::DatabaseNotRegistered` for unknown names.
    pub fn pool(&self, name: &str) -> Result<Arc<ConnectionPool>, DbError> {
        if let Some(pool) = self.pools.read().get(name) {
            return Ok(Arc::clone(pool));
        }

        let config = self
            .configs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                DbError::DatabaseNotRegistered(
                    t!("db.database_not_registered", name = name).to_string(),
                )
            })?;

        let mut pools = self.pools.write();
        let pool = pools
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ConnectionPool::new(config)));
        Ok(Arc::clone(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "app".to_string(),
            pool_size: 4,
        }
    }

    #[test]
    fn unknown_database_is_rejected() {
        let manager = PoolManager::new();
        assert!(matches!(
            manager.pool("missing"),
            Err(DbError::DatabaseNotRegistered(_))
        ));
    }

    #[test]
    fn registered_database_gets_one_shared_pool() {
        let manager = PoolManager::new();
        manager.register("app", config());
        let a = manager.pool("app").unwrap();
        let b = manager.pool("app").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        manager.remove("app");
        assert!(!manager.is_registered("app"));
        assert!(manager.pool("app").is_err());
    }

    #[test]
    fn re_registering_replaces_the_pool() {
        let manager = PoolManager::new();
        manager.register("app", config());
        let old = manager.pool("app").unwrap();
        manager.register("app", config());
        let new = manager.pool("app").unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
    }

    #[test]
    fn connection_config_deserializes_with_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"host": "db.local", "user": "admin", "dbname": "sales"}"#,
        )
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert!(config.password.is_empty());
    }
}
