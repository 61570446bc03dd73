//! SQL Server adapter for sqlvcs.
//!
//! Implements the `DatabaseService` port over the tiberius TDS driver:
//! catalog extraction ([`catalog`]), live table inspection ([`inspector`]),
//! and transactional DDL application ([`applier`]). Connections are routed
//! by database name with at most one idle connection kept per target; an
//! apply holds its connection for the full transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use sqlvcs_core::{DatabaseService, DbError, DbObject, DbResult, SyncConfig};

pub mod applier;
pub mod catalog;
pub mod inspector;

pub use inspector::MssqlInspector;

pub(crate) type SqlClient = Client<Compat<TcpStream>>;

/// Connection settings for one SQL Server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MssqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Accept the server certificate without validation (development).
    pub trust_cert: bool,
}

impl Default for MssqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            user: "sa".to_string(),
            password: String::new(),
            trust_cert: false,
        }
    }
}

/// `DatabaseService` implementation routing connections by database name.
pub struct MssqlService {
    server: MssqlConfig,
    sync: SyncConfig,
    idle: Mutex<HashMap<String, Vec<SqlClient>>>,
}

impl MssqlService {
    pub fn new(server: MssqlConfig, sync: SyncConfig) -> Self {
        Self {
            server,
            sync,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.sync
    }

    async fn connect(&self, db_name: &str) -> DbResult<SqlClient> {
        let mut config = Config::new();
        config.host(&self.server.host);
        config.port(self.server.port);
        config.database(db_name);
        config.authentication(AuthMethod::sql_server(&self.server.user, &self.server.password));
        if self.server.trust_cert {
            config.trust_cert();
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }

    /// Take a connection for `db_name`, reusing an idle one when available.
    pub(crate) async fn checkout(&self, db_name: &str) -> DbResult<SqlClient> {
        let key = db_name.to_lowercase();
        if let Some(client) = self.idle.lock().await.get_mut(&key).and_then(Vec::pop) {
            return Ok(client);
        }
        debug!(db = db_name, "opening connection");
        self.connect(db_name).await
    }

    /// Return a connection to the router; at most one idle connection is
    /// kept per database.
    pub(crate) async fn checkin(&self, db_name: &str, client: SqlClient) {
        let key = db_name.to_lowercase();
        let mut idle = self.idle.lock().await;
        let slot = idle.entry(key).or_default();
        if slot.is_empty() {
            slot.push(client);
        }
    }

    /// Run a parameterized query, returning all rows of the first result
    /// set. The connection is routed by `db_name` and recycled afterwards.
    pub(crate) async fn query(
        &self,
        db_name: &str,
        sql: &str,
        params: &[&dyn tiberius::ToSql],
    ) -> DbResult<Vec<tiberius::Row>> {
        let mut client = self.checkout(db_name).await?;
        let result = client
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| DbError::Query(e.to_string()));
        match result {
            Ok(rows) => {
                self.checkin(db_name, client).await;
                Ok(rows)
            }
            // A failed connection is not recycled.
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DatabaseService for MssqlService {
    async fn list_objects(&self, db_name: &str) -> DbResult<Vec<DbObject>> {
        catalog::list_objects(self, db_name).await
    }

    async fn apply_changes(&self, db_name: &str, changes: &[DbObject]) -> DbResult<()> {
        applier::apply_changes(self, db_name, changes).await
    }
}
