//! Time-bounded schema snapshot cache.
//!
//! Entries are keyed by vendor, logical database and a SHA-256 fingerprint of
//! the resolved connection string. The TTL is supplied on each lookup, so two
//! callers with different freshness needs can share one entry. Expiry reads
//! the time from an injectable [`Clock`].

use crate::models::{ConnectionConfig, DatabaseSchema, Vendor};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Default snapshot lifetime in milliseconds.
pub const DEFAULT_SCHEMA_CACHE_TTL_MS: u64 = 300_000;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaCacheKey {
    pub vendor: Vendor,
    pub database: String,
    /// Hex SHA-256 of the connection string
    pub fingerprint: String,
}

impl SchemaCacheKey {
    pub fn new(vendor: Vendor, database: impl Into<String>, connection_string: &str) -> Self {
        let digest = Sha256::digest(connection_string.as_bytes());
        let fingerprint = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self {
            vendor,
            database: database.into(),
            fingerprint,
        }
    }

    /// Key for a connection config. Falls back to the raw target when the
    /// connection string cannot be resolved.
    pub fn for_config(config: &ConnectionConfig) -> Self {
        let connection_string = config
            .connection_string()
            .unwrap_or_else(|_| config.masked_connection_string());
        Self::new(config.vendor, config.logical_database(), &connection_string)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    schema: Arc<DatabaseSchema>,
    stored_at: DateTime<Utc>,
}

/// Shared cache of complete schema snapshots.
pub struct SchemaCache {
    entries: RwLock<HashMap<SchemaCacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache").finish_non_exhaustive()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Snapshot for `key` if it was stored less than `ttl_ms` ago.
    /// A TTL of zero never hits.
    pub async fn get(&self, key: &SchemaCacheKey, ttl_ms: u64) -> Option<Arc<DatabaseSchema>> {
        if ttl_ms == 0 {
            return None;
        }
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let age = self.clock.now().signed_duration_since(entry.stored_at);
        let ttl = chrono::Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX));
        if age < ttl {
            debug!(vendor = %key.vendor, database = %key.database, "Schema cache hit");
            Some(entry.schema.clone())
        } else {
            debug!(vendor = %key.vendor, database = %key.database, "Schema cache entry expired");
            None
        }
    }

    /// Store `schema` under `key`, replacing any previous entry.
    /// Nothing is stored when `ttl_ms` is zero.
    pub async fn put(&self, key: SchemaCacheKey, schema: Arc<DatabaseSchema>, ttl_ms: u64) {
        if ttl_ms == 0 {
            return;
        }
        let entry = CacheEntry {
            schema,
            stored_at: self.clock.now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Evict the entry for `key`. Returns whether one existed.
    pub async fn invalidate(&self, key: &SchemaCacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(db: &str) -> SchemaCacheKey {
        SchemaCacheKey::new(Vendor::PostgreSQL, db, "postgres://u:p@h/db")
    }

    fn snapshot() -> Arc<DatabaseSchema> {
        Arc::new(DatabaseSchema::new(Vendor::PostgreSQL, Utc::now(), vec![]))
    }

    fn manual_cache() -> (Arc<ManualClock>, SchemaCache) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SchemaCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_key_fingerprint_is_sha256_hex() {
        let k = SchemaCacheKey::new(Vendor::SQLite, "default", "sqlite::memory:");
        assert_eq!(k.fingerprint.len(), 64);
        assert!(k.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(k, SchemaCacheKey::new(Vendor::SQLite, "default", "sqlite:other.db"));
        assert_eq!(k, SchemaCacheKey::new(Vendor::SQLite, "default", "sqlite::memory:"));
    }

    #[tokio::test]
    async fn test_entry_expires_with_clock() {
        let (clock, cache) = manual_cache();
        cache.put(key("app"), snapshot(), 1_000).await;
        assert!(cache.get(&key("app"), 1_000).await.is_some());

        clock.advance(Duration::from_millis(999));
        assert!(cache.get(&key("app"), 1_000).await.is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get(&key("app"), 1_000).await.is_none());
        // A longer TTL on lookup still accepts the entry
        assert!(cache.get(&key("app"), 5_000).await.is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_caching() {
        let (_clock, cache) = manual_cache();
        cache.put(key("app"), snapshot(), 0).await;
        assert!(cache.is_empty().await);
        cache.put(key("app"), snapshot(), 1_000).await;
        assert!(cache.get(&key("app"), 0).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (_clock, cache) = manual_cache();
        cache.put(key("a"), snapshot(), 1_000).await;
        cache.put(key("b"), snapshot(), 1_000).await;
        assert!(cache.invalidate(&key("a")).await);
        assert!(!cache.invalidate(&key("a")).await);
        assert!(cache.get(&key("b"), 1_000).await.is_some());
        cache.invalidate_all().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let (_clock, cache) = manual_cache();
        let first = snapshot();
        let second = Arc::new(DatabaseSchema::new(Vendor::SQLite, Utc::now(), vec![]));
        cache.put(key("a"), first, 1_000).await;
        cache.put(key("a"), second, 1_000).await;
        let got = cache.get(&key("a"), 1_000).await.unwrap();
        assert_eq!(got.vendor, Vendor::SQLite);
    }
}
