//! Per-invocation database connections.
//!
//! A [`ConnectionManager`] owns at most one physical connection and walks the
//! states `Disconnected → Connecting → Connected → Disconnecting →
//! Disconnected`. There is no pooling: every tool invocation creates a
//! manager, uses it and disconnects before returning. [`with_connection`] and
//! [`with_manager`] guarantee the disconnect on every exit path.
//!
//! Statements run either directly on the manager or inside a
//! [`TransactionContext`], both of which implement [`QueryTarget`].

use crate::db::params;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{BuiltQuery, ConnectionConfig, Vendor};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "mysql")]
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
#[cfg(feature = "postgres")]
use sqlx::postgres::{PgConnectOptions, PgConnection};
#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
#[cfg(any(feature = "postgres", feature = "mysql", feature = "sqlite"))]
use {sqlx::Connection as _, std::str::FromStr};

/// One result row keyed by column name, in column order.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Reported by MySQL and SQLite only.
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Something statements can run against: an open connection or a transaction.
pub trait QueryTarget: Send {
    fn vendor(&self) -> Vendor;

    fn fetch(&mut self, query: &BuiltQuery) -> impl Future<Output = DbResult<Vec<JsonRow>>> + Send;

    fn execute(&mut self, query: &BuiltQuery) -> impl Future<Output = DbResult<WriteOutcome>> + Send;
}

enum DbConnection {
    #[cfg(feature = "postgres")]
    Postgres(PgConnection),
    #[cfg(feature = "mysql")]
    MySql(MySqlConnection),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnection),
}

impl DbConnection {
    async fn open(vendor: Vendor, url: &str) -> DbResult<Self> {
        match vendor {
            #[cfg(feature = "postgres")]
            Vendor::PostgreSQL => {
                let options = PgConnectOptions::from_str(url)?;
                Ok(Self::Postgres(PgConnection::connect_with(&options).await?))
            }
            #[cfg(feature = "mysql")]
            Vendor::MySQL => {
                let options = MySqlConnectOptions::from_str(url)?;
                Ok(Self::MySql(MySqlConnection::connect_with(&options).await?))
            }
            #[cfg(feature = "sqlite")]
            Vendor::SQLite => {
                let options = SqliteConnectOptions::from_str(url)?;
                Ok(Self::Sqlite(SqliteConnection::connect_with(&options).await?))
            }
            #[allow(unreachable_patterns)]
            other => Err(DbError::missing_driver(
                other.display_name(),
                other.driver_feature(),
            )),
        }
    }

    async fn close(self) -> DbResult<()> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => conn.close().await?,
            #[cfg(feature = "mysql")]
            Self::MySql(conn) => conn.close().await?,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.close().await?,
        }
        Ok(())
    }
}

/// Owns the connection for a single tool invocation.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    connection: Option<DbConnection>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            connection: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Open the connection. A no-op when already connected.
    ///
    /// Fails with `MissingDriver` before any network activity when the
    /// vendor's driver is not compiled in.
    pub async fn connect(&mut self) -> DbResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let vendor = self.config.vendor;
        if !vendor.driver_available() {
            return Err(DbError::missing_driver(
                vendor.display_name(),
                vendor.driver_feature(),
            ));
        }
        let url = self.config.connection_string()?;

        self.state = ConnectionState::Connecting;
        debug!(
            vendor = %vendor,
            target = %self.config.masked_connection_string(),
            "Opening connection"
        );

        let opened = tokio::time::timeout(self.connect_timeout, DbConnection::open(vendor, &url))
            .await
            .map_err(|_| DbError::timeout("connect", self.connect_timeout.as_secs()))
            .and_then(|result| result);

        match opened {
            Ok(conn) => {
                self.connection = Some(conn);
                self.state = ConnectionState::Connected;
                info!(
                    vendor = %vendor,
                    target = %self.config.masked_connection_string(),
                    "Connected"
                );
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Close the connection. Safe to call repeatedly and after a failed connect.
    pub async fn disconnect(&mut self) -> DbResult<()> {
        if let Some(conn) = self.connection.take() {
            self.state = ConnectionState::Disconnecting;
            if let Err(e) = conn.close().await {
                warn!(vendor = %self.config.vendor, error = %e, "Error while closing connection");
            }
            debug!(vendor = %self.config.vendor, "Disconnected");
        }
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn open_connection(&mut self) -> DbResult<&mut DbConnection> {
        match (self.state, self.connection.as_mut()) {
            (ConnectionState::Connected, Some(conn)) => Ok(conn),
            (state, _) => Err(DbError::not_connected(state.to_string())),
        }
    }

    /// Start a transaction on the open connection.
    pub async fn begin(&mut self) -> DbResult<TransactionContext<'_>> {
        let vendor = self.config.vendor;
        let inner = match self.open_connection()? {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(conn) => TxInner::Postgres(conn.begin().await?),
            #[cfg(feature = "mysql")]
            DbConnection::MySql(conn) => TxInner::MySql(conn.begin().await?),
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => TxInner::Sqlite(conn.begin().await?),
        };
        debug!(vendor = %vendor, "Transaction started");
        Ok(TransactionContext { vendor, inner })
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds. When `f` fails the transaction is rolled
    /// back and `f`'s error is returned unchanged.
    pub async fn transaction<T, F>(&mut self, f: F) -> DbResult<T>
    where
        T: Send,
        F: for<'t, 'c> FnOnce(&'t mut TransactionContext<'c>) -> BoxFuture<'t, DbResult<T>> + Send,
    {
        let mut tx = self.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after statement error");
                }
                Err(e)
            }
        }
    }
}

impl QueryTarget for ConnectionManager {
    fn vendor(&self) -> Vendor {
        self.config.vendor
    }

    async fn fetch(&mut self, query: &BuiltQuery) -> DbResult<Vec<JsonRow>> {
        match self.open_connection()? {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(conn) => postgres_fetch(conn, query).await,
            #[cfg(feature = "mysql")]
            DbConnection::MySql(conn) => mysql_fetch(conn, query).await,
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => sqlite_fetch(conn, query).await,
        }
    }

    async fn execute(&mut self, query: &BuiltQuery) -> DbResult<WriteOutcome> {
        match self.open_connection()? {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(conn) => postgres_execute(conn, query).await,
            #[cfg(feature = "mysql")]
            DbConnection::MySql(conn) => mysql_execute(conn, query).await,
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => sqlite_execute(conn, query).await,
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

enum TxInner<'c> {
    #[cfg(feature = "postgres")]
    Postgres(sqlx::Transaction<'c, sqlx::Postgres>),
    #[cfg(feature = "mysql")]
    MySql(sqlx::Transaction<'c, sqlx::MySql>),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Transaction<'c, sqlx::Sqlite>),
}

/// An open transaction borrowed from its [`ConnectionManager`].
///
/// Dropping the context without committing rolls the transaction back.
pub struct TransactionContext<'c> {
    vendor: Vendor,
    inner: TxInner<'c>,
}

impl TransactionContext<'_> {
    pub async fn commit(self) -> DbResult<()> {
        match self.inner {
            #[cfg(feature = "postgres")]
            TxInner::Postgres(tx) => tx.commit().await?,
            #[cfg(feature = "mysql")]
            TxInner::MySql(tx) => tx.commit().await?,
            #[cfg(feature = "sqlite")]
            TxInner::Sqlite(tx) => tx.commit().await?,
        }
        debug!(vendor = %self.vendor, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        match self.inner {
            #[cfg(feature = "postgres")]
            TxInner::Postgres(tx) => tx.rollback().await?,
            #[cfg(feature = "mysql")]
            TxInner::MySql(tx) => tx.rollback().await?,
            #[cfg(feature = "sqlite")]
            TxInner::Sqlite(tx) => tx.rollback().await?,
        }
        debug!(vendor = %self.vendor, "Transaction rolled back");
        Ok(())
    }
}

impl QueryTarget for TransactionContext<'_> {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn fetch(&mut self, query: &BuiltQuery) -> DbResult<Vec<JsonRow>> {
        match &mut self.inner {
            #[cfg(feature = "postgres")]
            TxInner::Postgres(tx) => postgres_fetch(&mut **tx, query).await,
            #[cfg(feature = "mysql")]
            TxInner::MySql(tx) => mysql_fetch(&mut **tx, query).await,
            #[cfg(feature = "sqlite")]
            TxInner::Sqlite(tx) => sqlite_fetch(&mut **tx, query).await,
        }
    }

    async fn execute(&mut self, query: &BuiltQuery) -> DbResult<WriteOutcome> {
        match &mut self.inner {
            #[cfg(feature = "postgres")]
            TxInner::Postgres(tx) => postgres_execute(&mut **tx, query).await,
            #[cfg(feature = "mysql")]
            TxInner::MySql(tx) => mysql_execute(&mut **tx, query).await,
            #[cfg(feature = "sqlite")]
            TxInner::Sqlite(tx) => sqlite_execute(&mut **tx, query).await,
        }
    }
}

// ============================================================================
// Scoped acquisition
// ============================================================================

/// Create a manager, run `f` with it and always disconnect afterwards.
///
/// `f` decides whether and when to connect.
pub async fn with_manager<T, F>(manager: ConnectionManager, f: F) -> DbResult<T>
where
    F: for<'a> FnOnce(&'a mut ConnectionManager) -> BoxFuture<'a, DbResult<T>>,
{
    let mut manager = manager;
    run_scoped(&mut manager, false, f).await
}

/// Connect, run `f` with the open manager and always disconnect afterwards.
pub async fn with_connection<T, F>(manager: ConnectionManager, f: F) -> DbResult<T>
where
    F: for<'a> FnOnce(&'a mut ConnectionManager) -> BoxFuture<'a, DbResult<T>>,
{
    let mut manager = manager;
    run_scoped(&mut manager, true, f).await
}

/// Leaves `manager` disconnected whether or not `f` succeeded.
pub(crate) async fn run_scoped<T, F>(
    manager: &mut ConnectionManager,
    connect_first: bool,
    f: F,
) -> DbResult<T>
where
    F: for<'a> FnOnce(&'a mut ConnectionManager) -> BoxFuture<'a, DbResult<T>>,
{
    let result = if connect_first {
        match manager.connect().await {
            Ok(()) => f(&mut *manager).await,
            Err(e) => Err(e),
        }
    } else {
        f(&mut *manager).await
    };
    if let Err(e) = manager.disconnect().await {
        warn!(error = %e, "Disconnect failed");
    }
    result
}

// ============================================================================
// Vendor statement runners
// ============================================================================

#[cfg(feature = "postgres")]
async fn postgres_fetch(conn: &mut PgConnection, query: &BuiltQuery) -> DbResult<Vec<JsonRow>> {
    let rows = params::postgres_query(query).fetch_all(conn).await?;
    Ok(rows.iter().map(RowToJson::to_json_map).collect())
}

#[cfg(feature = "postgres")]
async fn postgres_execute(conn: &mut PgConnection, query: &BuiltQuery) -> DbResult<WriteOutcome> {
    let result = params::postgres_query(query).execute(conn).await?;
    Ok(WriteOutcome {
        rows_affected: result.rows_affected(),
        last_insert_id: None,
    })
}

#[cfg(feature = "mysql")]
async fn mysql_fetch(conn: &mut MySqlConnection, query: &BuiltQuery) -> DbResult<Vec<JsonRow>> {
    let rows = params::mysql_query(query).fetch_all(conn).await?;
    Ok(rows.iter().map(RowToJson::to_json_map).collect())
}

#[cfg(feature = "mysql")]
async fn mysql_execute(conn: &mut MySqlConnection, query: &BuiltQuery) -> DbResult<WriteOutcome> {
    let result = params::mysql_query(query).execute(conn).await?;
    let id = result.last_insert_id();
    Ok(WriteOutcome {
        rows_affected: result.rows_affected(),
        last_insert_id: (id > 0).then(|| i64::try_from(id).unwrap_or(i64::MAX)),
    })
}

#[cfg(feature = "sqlite")]
async fn sqlite_fetch(conn: &mut SqliteConnection, query: &BuiltQuery) -> DbResult<Vec<JsonRow>> {
    let rows = params::sqlite_query(query).fetch_all(conn).await?;
    Ok(rows.iter().map(RowToJson::to_json_map).collect())
}

#[cfg(feature = "sqlite")]
async fn sqlite_execute(conn: &mut SqliteConnection, query: &BuiltQuery) -> DbResult<WriteOutcome> {
    let result = params::sqlite_query(query).execute(conn).await?;
    let id = result.last_insert_rowid();
    Ok(WriteOutcome {
        rows_affected: result.rows_affected(),
        last_insert_id: (id > 0).then_some(id),
    })
}
