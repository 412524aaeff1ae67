// In carecheck/src/store/mod.rs
//
// Local persistence for the guideline collection. One SQLite database per
// user profile, opened on first use and kept for the life of the store.

pub mod guidelines;

use crate::{DbPool, Error, UploadedFile};
use once_cell::sync::OnceCell;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MIGRATION_SCRIPTS: &[&str] = &[include_str!("migrations/V1__guideline_files.sql")];

fn migrations() -> Migrations<'static> {
    Migrations::new(MIGRATION_SCRIPTS.iter().map(|sql| M::up(sql)).collect())
}

/// Schema version the code expects after migrating.
pub fn latest_version() -> i64 {
    MIGRATION_SCRIPTS.len() as i64
}

/// Schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> Result<i64, Error> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

pub fn migrate_db(conn: &mut Connection) -> Result<(), Error> {
    migrations().to_latest(conn)?;
    debug!(version = latest_version(), "guideline store schema is up to date");
    Ok(())
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
    /// A pool handed in by the caller; nothing to open.
    Supplied,
}

/// Replace-all persistence for guideline files.
pub struct GuidelineStore {
    location: Location,
    pool: OnceCell<DbPool>,
}

impl GuidelineStore {
    /// A store backed by the database file at `path`. Nothing is opened
    /// until the first operation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            pool: OnceCell::new(),
        }
    }

    /// A process-local store, mostly useful in tests.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            pool: OnceCell::new(),
        }
    }

    /// Wraps an existing pool; migrations run before it is used.
    pub fn with_pool(pool: DbPool) -> Result<Self, Error> {
        {
            let mut conn = pool.get()?;
            migrate_db(&mut conn)?;
        }
        Ok(Self {
            location: Location::Supplied,
            pool: OnceCell::with_value(pool),
        })
    }

    fn pool(&self) -> Result<&DbPool, Error> {
        self.pool.get_or_try_init(|| open_pool(&self.location))
    }

    /// Replaces the whole stored collection with `files`.
    pub fn save_all(&self, files: &[UploadedFile]) -> Result<(), Error> {
        let mut conn = self.pool()?.get()?;
        guidelines::replace_all(&mut conn, files)?;
        info!(count = files.len(), "saved guideline files");
        Ok(())
    }

    /// Everything currently stored. Empty when nothing was ever saved.
    pub fn get_all(&self) -> Result<Vec<UploadedFile>, Error> {
        let conn = self.pool()?.get()?;
        guidelines::list(&conn)
    }

    /// Removes every stored file. Safe to call repeatedly.
    pub fn clear(&self) -> Result<(), Error> {
        let conn = self.pool()?.get()?;
        let removed = guidelines::delete_all(&conn)?;
        info!(removed, "cleared guideline files");
        Ok(())
    }
}

fn open_pool(location: &Location) -> Result<DbPool, Error> {
    let (manager, max_size) = match location {
        Location::File(path) => {
            ensure_parent_dir(path)?;
            debug!(path = %path.display(), "opening guideline store");
            (SqliteConnectionManager::file(path), 4)
        }
        // Every in-memory connection is its own database, so keep exactly one.
        Location::Memory => (SqliteConnectionManager::memory(), 1),
        Location::Supplied => {
            return Err(Error::Config("the supplied database pool is missing".into()))
        }
    };

    let pool = r2d2::Pool::builder().max_size(max_size).build(manager)?;
    {
        let mut conn = pool.get()?;
        migrate_db(&mut conn)?;
    }
    Ok(pool)
}

fn ensure_parent_dir(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| {
            Error::Config(format!(
                "cannot create database directory {}: {}",
                parent.display(),
                err
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    #[test]
    fn save_then_get_returns_exactly_the_saved_files() -> Result<()> {
        let store = GuidelineStore::in_memory();
        let files = vec![UploadedFile::new("g1", "x")];

        store.save_all(&files)?;
        assert_eq!(store.get_all()?, files);
        Ok(())
    }

    #[test]
    fn get_all_on_a_fresh_store_is_empty() -> Result<()> {
        let store = GuidelineStore::in_memory();
        assert!(store.get_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn clear_empties_and_is_idempotent() -> Result<()> {
        let store = GuidelineStore::in_memory();
        store.save_all(&[UploadedFile::new("g1", "x")])?;

        store.clear()?;
        assert!(store.get_all()?.is_empty());
        store.clear()?;
        assert!(store.get_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn save_all_is_idempotent_and_replaces() -> Result<()> {
        let store = GuidelineStore::in_memory();
        let first = vec![
            UploadedFile::new("g1", "x"),
            UploadedFile::new("g2", "y"),
        ];

        store.save_all(&first)?;
        store.save_all(&first)?;
        assert_eq!(store.get_all()?, first);

        let second = vec![UploadedFile::new("g3", "z")];
        store.save_all(&second)?;
        assert_eq!(store.get_all()?, second);
        Ok(())
    }

    #[test]
    fn duplicate_names_keep_the_last_content() -> Result<()> {
        let store = GuidelineStore::in_memory();
        store.save_all(&[
            UploadedFile::new("g1", "old"),
            UploadedFile::new("g1", "new"),
        ])?;
        assert_eq!(store.get_all()?, vec![UploadedFile::new("g1", "new")]);
        Ok(())
    }

    #[test]
    fn file_store_persists_across_instances() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("carecheck.sqlite");

        GuidelineStore::open(&path).save_all(&[UploadedFile::new("기준.pdf", "평가 기준")])?;

        let reopened = GuidelineStore::open(&path);
        assert_eq!(
            reopened.get_all()?,
            vec![UploadedFile::new("기준.pdf", "평가 기준")]
        );
        Ok(())
    }

    #[test]
    fn migrations_record_latest_version() -> Result<()> {
        let manager = SqliteConnectionManager::memory();
        let pool: DbPool = r2d2::Pool::builder().max_size(1).build(manager)?;
        let store = GuidelineStore::with_pool(pool.clone())?;
        store.save_all(&[])?;

        let conn = pool.get()?;
        assert_eq!(schema_version(&conn)?, latest_version());
        Ok(())
    }

    #[test]
    fn supplied_pool_is_used_as_is() -> Result<()> {
        let manager = SqliteConnectionManager::memory();
        let pool: DbPool = r2d2::Pool::builder().max_size(1).build(manager)?;
        let store = GuidelineStore::with_pool(pool.clone())?;
        store.save_all(&[UploadedFile::new("g1", "x")])?;

        assert!(matches!(store.location, Location::Supplied));
        let conn = pool.get()?;
        assert_eq!(guidelines::list(&conn)?, vec![UploadedFile::new("g1", "x")]);
        Ok(())
    }
}
