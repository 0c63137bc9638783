//! The store file: one SQLite database per workspace.
//!
//! [`StoreDatabase`] owns the connection. Chunk rows and index entries are
//! reached through [`ChunkStore`](crate::storage::ChunkStore) and
//! [`SimilarityIndex`](crate::vector::SimilarityIndex), which borrow the
//! connection (or an open transaction, which derefs to one).

use crate::error::{StoreError, StoreResult};
use crate::storage::metadata_keys::MetadataKey;
use crate::storage::schema::{CREATE_META_SQL, SCHEMA_VERSION};
use crate::vector::VectorDimension;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive handle on a store file.
#[derive(Debug)]
pub struct StoreDatabase {
    conn: Connection,
    path: Option<PathBuf>,
}

impl StoreDatabase {
    /// Open (or create) the store file at `path`.
    ///
    /// Creates the parent directory and the metadata table, and rejects
    /// files written with a different layout version.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::StoreDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.initialize()?;
        tracing::debug!("opened store at {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> StoreResult<()> {
        Durability::Normal.apply_checked(&self.conn, self.path.is_none())?;
        self.conn
            .execute_batch(CREATE_META_SQL)
            .map_err(|e| StoreError::Schema {
                reason: format!("cannot create store_meta: {e}"),
            })?;

        match self.metadata(MetadataKey::SchemaVersion)? {
            None => self.set_metadata(MetadataKey::SchemaVersion, &SCHEMA_VERSION.to_string()),
            Some(version) if version == SCHEMA_VERSION.to_string() => Ok(()),
            Some(version) => Err(StoreError::Schema {
                reason: format!(
                    "store layout version {version} is not supported (expected {SCHEMA_VERSION})"
                ),
            }),
        }
    }

    /// Location of the store file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn metadata(&self, key: MetadataKey) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: MetadataKey, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    /// Dimension recorded when the store was first configured.
    pub fn stored_dimension(&self) -> StoreResult<Option<VectorDimension>> {
        let Some(raw) = self.metadata(MetadataKey::Dimension)? else {
            return Ok(None);
        };
        let dim = raw.parse::<usize>().map_err(|_| StoreError::Schema {
            reason: format!("corrupt embedding dimension '{raw}' in store_meta"),
        })?;
        Ok(Some(VectorDimension::new(dim)?))
    }

    /// Record the embedding dimension and model on first use, or verify that
    /// a reopened store was created for the same ones.
    pub fn bind_embedding(&self, dimension: VectorDimension, model: &str) -> StoreResult<()> {
        match self.stored_dimension()? {
            None => {
                self.set_metadata(MetadataKey::Dimension, &dimension.get().to_string())?;
                self.set_metadata(MetadataKey::Model, model)?;
                self.set_metadata(MetadataKey::CreatedAt, &chrono::Utc::now().to_rfc3339())?;
                tracing::info!("store bound to model {model} ({dimension} dimensions)");
                Ok(())
            }
            Some(stored) if stored != dimension => Err(StoreError::DimensionMismatch {
                expected: stored.get(),
                actual: dimension.get(),
            }),
            Some(_) => match self.metadata(MetadataKey::Model)? {
                Some(stored) if stored != model => Err(StoreError::ModelMismatch {
                    stored,
                    requested: model.to_string(),
                }),
                Some(_) => Ok(()),
                None => self.set_metadata(MetadataKey::Model, model),
            },
        }
    }

    /// Switch to relaxed durability until the returned guard drops.
    pub fn relaxed_durability(&self) -> StoreResult<RelaxedDurability<'_>> {
        RelaxedDurability::enter(&self.conn, self.path.is_none())
    }
}

/// Write durability settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// `synchronous = NORMAL`, rollback journal on disk
    Normal,
    /// `synchronous = OFF`, journal kept in memory
    Relaxed,
}

impl Durability {
    fn pragmas(self) -> (&'static str, &'static str) {
        match self {
            Self::Normal => ("NORMAL", "DELETE"),
            Self::Relaxed => ("OFF", "MEMORY"),
        }
    }

    /// Must run outside of any transaction. Returns the journal mode SQLite
    /// actually switched to, lowercased.
    pub fn apply(self, conn: &Connection) -> rusqlite::Result<String> {
        let (synchronous, journal_mode) = self.pragmas();
        conn.pragma_update(None, "synchronous", synchronous)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", journal_mode, |row| row.get(0))?;
        Ok(mode.to_ascii_lowercase())
    }

    /// Whether SQLite kept another journal mode than the one requested.
    /// In-memory databases only ever journal in memory.
    pub fn refused(self, actual: &str, in_memory: bool) -> bool {
        let requested = self.pragmas().1;
        !actual.eq_ignore_ascii_case(requested) && !(in_memory && actual == "memory")
    }

    fn apply_checked(self, conn: &Connection, in_memory: bool) -> rusqlite::Result<()> {
        let actual = self.apply(conn)?;
        if self.refused(&actual, in_memory) {
            tracing::warn!(
                "journal_mode {} refused, store keeps journal_mode {actual}",
                self.pragmas().1
            );
        }
        Ok(())
    }
}

/// Relaxed durability for the lifetime of a bulk operation.
///
/// Normal durability is restored on drop, on success and error paths alike.
#[derive(Debug)]
pub struct RelaxedDurability<'conn> {
    conn: &'conn Connection,
    in_memory: bool,
}

impl<'conn> RelaxedDurability<'conn> {
    pub fn enter(conn: &'conn Connection, in_memory: bool) -> StoreResult<Self> {
        Durability::Relaxed.apply_checked(conn, in_memory)?;
        tracing::debug!("durability relaxed");
        Ok(Self { conn, in_memory })
    }
}

impl Drop for RelaxedDurability<'_> {
    fn drop(&mut self) {
        match Durability::Normal.apply_checked(self.conn, self.in_memory) {
            Ok(()) => tracing::debug!("durability restored"),
            Err(e) => tracing::warn!("failed to restore normal durability: {e}"),
        }
    }
}

/// Run `f` inside a named savepoint.
///
/// Savepoints nest, so the work is all-or-nothing whether or not the caller
/// already holds a transaction. On error everything written since the
/// savepoint is rolled back and the error is returned unchanged.
pub fn with_savepoint<T>(
    conn: &Connection,
    name: &'static str,
    f: impl FnOnce() -> StoreResult<T>,
) -> StoreResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
            {
                tracing::warn!("rollback of savepoint {name} failed: {rollback}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.db");

        let db = StoreDatabase::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
        assert_eq!(
            db.metadata(MetadataKey::SchemaVersion).unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_rejects_unknown_layout_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");
        {
            let db = StoreDatabase::open(&path).unwrap();
            db.set_metadata(MetadataKey::SchemaVersion, "99").unwrap();
        }
        let err = StoreDatabase::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bind_embedding_records_then_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.db");
        let dim = VectorDimension::dimension_384();
        {
            let db = StoreDatabase::open(&path).unwrap();
            assert!(db.stored_dimension().unwrap().is_none());
            db.bind_embedding(dim, "AllMiniLML6V2").unwrap();
            assert!(db.metadata(MetadataKey::CreatedAt).unwrap().is_some());
        }

        let db = StoreDatabase::open(&path).unwrap();
        assert_eq!(db.stored_dimension().unwrap(), Some(dim));
        db.bind_embedding(dim, "AllMiniLML6V2").unwrap();

        let err = db
            .bind_embedding(VectorDimension::new(768).unwrap(), "AllMiniLML6V2")
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 384,
                actual: 768
            }
        ));

        let err = db.bind_embedding(dim, "BGESmallENV15").unwrap_err();
        assert!(matches!(err, StoreError::ModelMismatch { .. }));
    }

    #[test]
    fn test_relaxed_durability_restores_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let db = StoreDatabase::open(&temp_dir.path().join("store.db")).unwrap();
        let journal_mode = |db: &StoreDatabase| -> String {
            db.connection()
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap()
        };
        let synchronous = |db: &StoreDatabase| -> i64 {
            db.connection()
                .query_row("PRAGMA synchronous", [], |row| row.get(0))
                .unwrap()
        };

        assert_eq!(journal_mode(&db), "delete");
        {
            let _guard = db.relaxed_durability().unwrap();
            assert_eq!(journal_mode(&db), "memory");
            assert_eq!(synchronous(&db), 0);
        }
        assert_eq!(journal_mode(&db), "delete");
        assert_eq!(synchronous(&db), 1);
    }

    #[test]
    fn test_apply_reports_journal_mode_sqlite_kept() {
        let temp_dir = TempDir::new().unwrap();
        let db = StoreDatabase::open(&temp_dir.path().join("store.db")).unwrap();
        let actual = Durability::Normal.apply(db.connection()).unwrap();
        assert_eq!(actual, "delete");
        assert!(!Durability::Normal.refused(&actual, false));

        // An in-memory database cannot switch to a rollback journal on disk
        let memory = StoreDatabase::open_in_memory().unwrap();
        let actual = Durability::Normal.apply(memory.connection()).unwrap();
        assert_eq!(actual, "memory");
        assert!(Durability::Normal.refused(&actual, false));
        assert!(!Durability::Normal.refused(&actual, true));
        assert!(Durability::Relaxed.refused("wal", false));
    }

    #[test]
    fn test_savepoint_rolls_back_on_error() {
        let db = StoreDatabase::open_in_memory().unwrap();
        let conn = db.connection();

        let result: StoreResult<()> = with_savepoint(conn, "failing", || {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('probe', 'x')",
                [],
            )?;
            Err(StoreError::Config {
                reason: "abort".into(),
            })
        });
        assert!(result.is_err());

        let probe: Option<String> = conn
            .query_row("SELECT value FROM store_meta WHERE key = 'probe'", [], |row| {
                row.get(0)
            })
            .optional()
            .unwrap();
        assert!(probe.is_none());

        with_savepoint(conn, "passing", || {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('probe', 'y')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM store_meta WHERE key = 'probe'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
