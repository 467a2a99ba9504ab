use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::directive::ModuleId;
use crate::version::error::{CacheError, RegistryError};
use crate::version::registry::Registry;
use crate::version::types::PackageVersions;

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: not_found column
    &["ALTER TABLE modules ADD COLUMN not_found INTEGER NOT NULL DEFAULT 0"],
];

/// Snapshot of what the cache knows about one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModule {
    /// Versions in the order the registry reported them
    pub versions: Vec<String>,
    /// No repository knew the module at the last fetch
    pub not_found: bool,
    /// Older than the refresh interval
    pub stale: bool,
}

/// Storage of previously fetched module versions
#[cfg_attr(test, automock)]
pub trait VersionStore: Send + Sync + 'static {
    /// Look up a module; `repositories` keys the set of extra repositories consulted
    fn lookup(&self, module: &ModuleId, repositories: &str)
    -> Result<Option<CachedModule>, CacheError>;

    /// Replace the stored versions of a module and reset its timestamp
    fn replace_versions(
        &self,
        module: &ModuleId,
        repositories: &str,
        versions: &[String],
    ) -> Result<(), CacheError>;

    /// Remember that no repository knows the module
    fn mark_not_found(&self, module: &ModuleId, repositories: &str) -> Result<(), CacheError>;
}

/// SQLite-backed version cache
pub struct Cache {
    conn: Mutex<Connection>,
    refresh_interval: i64,
}

impl Cache {
    pub fn new(db_path: &Path, refresh_interval: i64) -> Result<Self, CacheError> {
        info!("Initializing cache database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        debug!("Database connection established");

        let cache = Self {
            conn: Mutex::new(conn),
            refresh_interval,
        };

        cache.create_schema()?;
        info!("Cache initialized successfully");

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Current timestamp in milliseconds since UNIX epoch
    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        // Create base tables (without migration columns)
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS modules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_name TEXT NOT NULL,
                module_name TEXT NOT NULL,
                repositories TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(group_name, module_name, repositories)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_updated_at ON modules(updated_at)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                version TEXT NOT NULL,
                FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE,
                UNIQUE(module_id, version)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_module_id ON versions(module_id)",
            [],
        )?;

        Self::apply_migrations(&conn)?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CacheError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    match conn.execute(sql, []) {
                        Ok(_) => {}
                        Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                            if msg.contains("duplicate column name") =>
                        {
                            debug!("Column already exists, skipping: {}", sql);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    fn upsert_module(
        tx: &rusqlite::Transaction<'_>,
        module: &ModuleId,
        repositories: &str,
        not_found: bool,
    ) -> Result<i64, CacheError> {
        let now = Self::current_timestamp_ms();
        tx.execute(
            r#"
            INSERT INTO modules (group_name, module_name, repositories, updated_at, not_found)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(group_name, module_name, repositories)
            DO UPDATE SET updated_at = excluded.updated_at, not_found = excluded.not_found
            "#,
            (&module.group, &module.module, repositories, now, not_found),
        )?;

        let module_id = tx.query_row(
            "SELECT id FROM modules WHERE group_name = ?1 AND module_name = ?2 AND repositories = ?3",
            (&module.group, &module.module, repositories),
            |row| row.get(0),
        )?;
        Ok(module_id)
    }
}

impl VersionStore for Cache {
    fn lookup(
        &self,
        module: &ModuleId,
        repositories: &str,
    ) -> Result<Option<CachedModule>, CacheError> {
        let conn = self.lock_conn()?;

        let row = conn.query_row(
            r#"
            SELECT id, updated_at, not_found FROM modules
            WHERE group_name = ?1 AND module_name = ?2 AND repositories = ?3
            "#,
            (&module.group, &module.module, repositories),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            },
        );

        let (module_id, updated_at, not_found) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stmt =
            conn.prepare("SELECT version FROM versions WHERE module_id = ?1 ORDER BY position")?;
        let versions = stmt
            .query_map([module_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let threshold = Self::current_timestamp_ms() - self.refresh_interval;

        Ok(Some(CachedModule {
            versions,
            not_found,
            stale: updated_at < threshold,
        }))
    }

    fn replace_versions(
        &self,
        module: &ModuleId,
        repositories: &str,
        versions: &[String],
    ) -> Result<(), CacheError> {
        debug!("Saving {} versions for {}", versions.len(), module);

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let module_id = Self::upsert_module(&tx, module, repositories, false)?;

        tx.execute("DELETE FROM versions WHERE module_id = ?1", [module_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO versions (module_id, position, version) VALUES (?1, ?2, ?3)",
            )?;
            for (position, version) in versions.iter().enumerate() {
                stmt.execute((module_id, position as i64, version))?;
            }
        }

        tx.commit()?;

        debug!("Successfully saved versions for {}", module);
        Ok(())
    }

    fn mark_not_found(&self, module: &ModuleId, repositories: &str) -> Result<(), CacheError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let module_id = Self::upsert_module(&tx, module, repositories, true)?;
        tx.execute("DELETE FROM versions WHERE module_id = ?1", [module_id])?;

        tx.commit()?;
        Ok(())
    }
}

/// Cache key for the extra repositories a lookup consulted
pub fn repositories_key(extra_repositories: &[String]) -> String {
    let mut repositories: Vec<&str> = extra_repositories
        .iter()
        .map(|r| r.trim_end_matches('/'))
        .collect();
    repositories.sort_unstable();
    repositories.dedup();
    repositories.join(" ")
}

/// Read-through cache in front of a registry
///
/// Fresh entries are served without network access. Stale entries are
/// refreshed, and served as a fallback when the refresh fails.
pub struct CachedRegistry<R, S> {
    inner: R,
    store: S,
}

impl<R: Registry, S: VersionStore> CachedRegistry<R, S> {
    pub fn new(inner: R, store: S) -> Self {
        Self { inner, store }
    }

    fn lookup(&self, module: &ModuleId, key: &str) -> Option<CachedModule> {
        match self.store.lookup(module, key) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("Failed to read version cache for {}: {}", module, e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl<R: Registry, S: VersionStore> Registry for CachedRegistry<R, S> {
    async fn fetch_all_versions(
        &self,
        module: &ModuleId,
        extra_repositories: &[String],
    ) -> Result<PackageVersions, RegistryError> {
        let key = repositories_key(extra_repositories);
        let cached = self.lookup(module, &key);

        if let Some(entry) = cached.as_ref().filter(|entry| !entry.stale) {
            if entry.not_found {
                debug!("Cache hit for {}: not found", module);
                return Err(RegistryError::NotFound(module.to_string()));
            }
            debug!("Cache hit for {}: {} versions", module, entry.versions.len());
            return Ok(PackageVersions::new(entry.versions.clone()));
        }

        match self.inner.fetch_all_versions(module, extra_repositories).await {
            Ok(fetched) => {
                if let Err(e) = self.store.replace_versions(module, &key, &fetched.versions) {
                    warn!("Failed to cache versions for {}: {}", module, e);
                }
                Ok(fetched)
            }
            Err(RegistryError::NotFound(name)) => {
                if let Err(e) = self.store.mark_not_found(module, &key) {
                    warn!("Failed to cache missing module {}: {}", module, e);
                }
                Err(RegistryError::NotFound(name))
            }
            Err(e) => match cached {
                Some(entry) if !entry.not_found && !entry.versions.is_empty() => {
                    warn!("Refresh of {} failed ({}); using stale cache", module, e);
                    Ok(PackageVersions::new(entry.versions))
                }
                _ => Err(e),
            },
        }
    }
}
