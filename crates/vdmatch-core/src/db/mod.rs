//! SQLite catalog index utilities.
//!
//! Matching only ever reads the index. [`open_catalog`] therefore opens the
//! file with `SQLITE_OPEN_READ_ONLY` and refuses to hand out a connection to a
//! missing or empty catalog; this is the start-up sanity check. Each worker
//! that matches queries in parallel opens its own read-only connection.
//!
//! [`open_catalog_for_build`] is the only writable entry point and is used by
//! the index builder.

pub mod build;
pub mod fts;
pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::{path::Path, time::Duration};

use crate::error::CatalogError;

/// Busy timeout used for catalog connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open an existing catalog index read-only and verify it holds records.
///
/// # Errors
///
/// Returns [`CatalogError`] (wrapped in `anyhow`) when the file is missing,
/// lacks the catalog table, or is empty; other SQLite failures are returned
/// with context.
pub fn open_catalog(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(CatalogError::Missing(path.to_path_buf()).into());
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open catalog index {}", path.display()))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        .context("configure sqlite busy timeout")?;

    let rows = match fts::catalog_row_count(&conn) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "catalog table unreadable");
            return Err(CatalogError::NoCatalogTable(path.to_path_buf()).into());
        }
    };
    if rows == 0 {
        return Err(CatalogError::Empty(path.to_path_buf()).into());
    }

    tracing::info!(path = %path.display(), rows, "catalog index opened");
    Ok(conn)
}

/// Open (or create) a catalog index for writing, apply build pragmas and
/// migrate the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_catalog_for_build(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create catalog directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open catalog index {}", path.display()))?;

    configure_for_build(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply catalog migrations")?;

    Ok(conn)
}

fn configure_for_build(conn: &Connection) -> rusqlite::Result<()> {
    // Rollback journal, not WAL: the finished file is opened read-only and
    // must not depend on -wal/-shm side files.
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = DELETE", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{open_catalog, open_catalog_for_build};
    use crate::db::{build, migrations};
    use crate::error::CatalogError;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("indices/catalog.sqlite3");
        (dir, path)
    }

    fn catalog_error(err: &anyhow::Error) -> &CatalogError {
        err.downcast_ref::<CatalogError>()
            .expect("error should be a CatalogError")
    }

    #[test]
    fn open_catalog_missing_file_is_fatal() {
        let (_dir, path) = temp_db_path();
        let err = open_catalog(&path).expect_err("missing index must fail");
        assert!(matches!(catalog_error(&err), CatalogError::Missing(_)));
    }

    #[test]
    fn open_catalog_rejects_empty_index() {
        let (_dir, path) = temp_db_path();
        drop(open_catalog_for_build(&path).expect("create index"));

        let err = open_catalog(&path).expect_err("empty index must fail");
        assert!(matches!(catalog_error(&err), CatalogError::Empty(_)));
    }

    #[test]
    fn open_catalog_rejects_foreign_database() {
        let (_dir, path) = temp_db_path();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        let conn = rusqlite::Connection::open(&path).expect("open plain db");
        conn.execute_batch("CREATE TABLE other (x INTEGER);")
            .expect("create table");
        drop(conn);

        let err = open_catalog(&path).expect_err("foreign db must fail");
        assert!(matches!(catalog_error(&err), CatalogError::NoCatalogTable(_)));
    }

    #[test]
    fn open_catalog_for_build_migrates_and_read_only_open_succeeds() {
        let (_dir, path) = temp_db_path();
        let mut conn = open_catalog_for_build(&path).expect("create index");
        let version = migrations::current_schema_version(&conn).expect("version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);

        let record = build::catalog_record("VD18 10225986", "Frölich", "De Peste", "1702", "Leipzig")
            .expect("record");
        build::insert_records(&mut conn, &[record]).expect("insert");
        drop(conn);

        let ro = open_catalog(&path).expect("open read-only");
        let write = ro.execute("DELETE FROM catalog", []);
        assert!(write.is_err(), "read-only connection must reject writes");
    }
}
