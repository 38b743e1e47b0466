//! Connection-related data models.
//!
//! A [`ConnectionConfig`] names a [`Vendor`] and either a connection URL or
//! structured parameters. It resolves to the URL handed to the driver and to
//! the logical database name used for schema cache keys.

use crate::db::dialect::{self, Dialect};
use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Supported database vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[serde(alias = "postgres")]
    PostgreSQL,
    /// Includes MariaDB
    #[serde(alias = "mariadb")]
    MySQL,
    SQLite,
}

impl Vendor {
    /// Detect the vendor that owns a connection string's URL scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this vendor.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Cargo feature that compiles in this vendor's driver.
    pub fn driver_feature(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Whether the driver for this vendor was compiled in.
    pub fn driver_available(&self) -> bool {
        match self {
            Self::PostgreSQL => cfg!(feature = "postgres"),
            Self::MySQL => cfg!(feature = "mysql"),
            Self::SQLite => cfg!(feature = "sqlite"),
        }
    }

    /// Get the default port for this vendor.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    /// SQL dialect for this vendor.
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Self::PostgreSQL => &dialect::Postgres,
            Self::MySQL => &dialect::MySql,
            Self::SQLite => &dialect::Sqlite,
        }
    }

    fn url_scheme(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Structured connection parameters.
///
/// For SQLite, `database` is the file path and the network fields are ignored.
#[derive(Clone, Default, Deserialize, JsonSchema)]
pub struct ConnectionParameters {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    /// Never serialized or logged
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

/// Either a full connection URL or structured parameters.
#[derive(Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConnectionTarget {
    Url(String),
    Parameters(ConnectionParameters),
}

/// Configuration for a database connection.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct ConnectionConfig {
    /// Database vendor: postgresql, mysql or sqlite
    pub vendor: Vendor,
    /// Connection URL, or an object with host/port/user/password/database
    #[serde(rename = "connectionString", alias = "connection")]
    pub connection: ConnectionTarget,
}

impl ConnectionConfig {
    pub fn new(vendor: Vendor, connection: ConnectionTarget) -> Self {
        Self { vendor, connection }
    }

    pub fn from_url(vendor: Vendor, url: impl Into<String>) -> Self {
        Self::new(vendor, ConnectionTarget::Url(url.into()))
    }

    /// Resolve the URL handed to the driver.
    ///
    /// Rejects empty input and URLs whose scheme belongs to another vendor.
    /// A bare SQLite path (or `:memory:`) is accepted without a scheme.
    pub fn connection_string(&self) -> DbResult<String> {
        match &self.connection {
            ConnectionTarget::Url(raw) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    return Err(DbError::configuration("Connection string is empty"));
                }
                match Vendor::from_connection_string(raw) {
                    Some(detected) if detected == self.vendor => Ok(raw.to_string()),
                    Some(detected) => Err(DbError::configuration(format!(
                        "Connection string scheme is for {} but vendor is {}",
                        detected, self.vendor
                    ))),
                    None if self.vendor == Vendor::SQLite && !raw.contains("://") => {
                        Ok(format!("sqlite:{}", raw))
                    }
                    None => Err(DbError::configuration(format!(
                        "Connection string is not a {} URL (expected {}://...)",
                        self.vendor,
                        self.vendor.url_scheme()
                    ))),
                }
            }
            ConnectionTarget::Parameters(params) => self.build_url(params),
        }
    }

    fn build_url(&self, params: &ConnectionParameters) -> DbResult<String> {
        if self.vendor == Vendor::SQLite {
            let path = params
                .database
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    DbError::configuration("SQLite connections require 'database' (file path)")
                })?;
            return Ok(format!("sqlite:{}", path));
        }

        let host = params
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                DbError::configuration(format!("{} connections require 'host'", self.vendor))
            })?;

        let mut url = Url::parse(&format!("{}://{}", self.vendor.url_scheme(), host))
            .map_err(|e| DbError::configuration(format!("Invalid host '{}': {}", host, e)))?;
        let invalid = |what: &str| DbError::configuration(format!("Invalid {} in parameters", what));
        url.set_port(params.port.or(self.vendor.default_port()))
            .map_err(|_| invalid("port"))?;
        if let Some(user) = params.user.as_deref() {
            url.set_username(user).map_err(|_| invalid("user"))?;
        }
        if let Some(password) = params.password.as_deref() {
            url.set_password(Some(password))
                .map_err(|_| invalid("password"))?;
        }
        if let Some(database) = params.database.as_deref() {
            url.set_path(&format!("/{}", database.trim_start_matches('/')));
        }
        Ok(url.to_string())
    }

    /// Logical database name, or `"default"` when none is named.
    pub fn logical_database(&self) -> String {
        let name = match &self.connection {
            ConnectionTarget::Parameters(params) => params.database.clone(),
            ConnectionTarget::Url(raw) => {
                let raw = raw.trim();
                if self.vendor == Vendor::SQLite {
                    let path = raw
                        .strip_prefix("sqlite://")
                        .or_else(|| raw.strip_prefix("sqlite:"))
                        .unwrap_or(raw);
                    Some(path.split('?').next().unwrap_or(path).to_string())
                } else {
                    Url::parse(raw)
                        .ok()
                        .map(|u| u.path().trim_start_matches('/').to_string())
                }
            }
        };
        name.filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        match self.connection_string() {
            Ok(resolved) => mask_url(&resolved),
            Err(_) => "<invalid connection string>".to_string(),
        }
    }
}

fn mask_url(raw: &str) -> String {
    if let Ok(mut url) = Url::parse(raw) {
        if url.password().is_some() && url.set_password(Some("****")).is_ok() {
            return url.to_string();
        }
        return raw.to_string();
    }
    // Fallback: replace anything between the last ':' and '@'
    if let Some(at_pos) = raw.find('@') {
        if let Some(colon_pos) = raw[..at_pos].rfind(':') {
            return format!("{}****{}", &raw[..colon_pos + 1], &raw[at_pos..]);
        }
    }
    raw.to_string()
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("vendor", &self.vendor)
            .field("connection", &self.masked_connection_string())
            .finish()
    }
}
