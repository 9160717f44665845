use std::sync::{Arc, LazyLock, Mutex};

use rusqlite::Connection;
use tracing::info;

use crate::modules::context::Initialize;
use crate::modules::db::migrations::migrations;
use crate::modules::error::{code::ErrorCode, InboxResult};
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::raise_error;

/// Connection manager for the single on-disk SQLite database, grounded
/// on `examples/hunterclarke-cosmos/crates/mail/src/storage/sqlite.rs`
/// (PRAGMA choices, single-writer-connection-behind-a-mutex shape).
/// `rusqlite::Connection` isn't `Sync`-safe for concurrent use, so
/// every caller goes through `spawn_blocking` + a held `Mutex` lock,
/// mirroring the teacher's pattern of pushing synchronous storage
/// calls off the async runtime (see e.g.
/// `examples/sparklive-rustmailer/src/modules/database/manager.rs`).
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

pub static DATABASE: LazyLock<Db> = LazyLock::new(|| Db::open().expect("failed to open database"));

impl Db {
    fn open() -> InboxResult<Self> {
        let path = &DATA_DIR_MANAGER.db_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        migrations()
            .to_latest(&mut conn)
            .map_err(|e| raise_error!(format!("{e}"), ErrorCode::SchemaIntegrityError))?;
        info!(path = %path.display(), "database opened and migrated");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a synchronous closure against the connection on a blocking
    /// thread. The closure receives a locked `&Connection`.
    pub async fn with_conn<F, T>(&self, f: F) -> InboxResult<T>
    where
        F: FnOnce(&Connection) -> InboxResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("db mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| raise_error!(format!("blocking task panicked: {e}"), ErrorCode::InternalError))?
    }

    /// Same as `with_conn` but wraps the closure in an explicit
    /// transaction, committing on `Ok` and rolling back (implicitly, by
    /// drop) on `Err`.
    pub async fn with_tx<F, T>(&self, f: F) -> InboxResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> InboxResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("db mutex poisoned");
            let tx = guard.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|e| raise_error!(format!("blocking task panicked: {e}"), ErrorCode::InternalError))?
    }
}

fn apply_pragmas(conn: &Connection) -> InboxResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA mmap_size = 268435456;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

impl Initialize for Db {
    async fn initialize() -> InboxResult<()> {
        LazyLock::force(&DATABASE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Db {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        let mut conn = conn;
        migrations().to_latest(&mut conn).unwrap();
        Db {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    #[tokio::test]
    async fn with_conn_reads_back_inserted_row() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO folders (id, display_name, total_item_count) VALUES (?1, ?2, ?3)",
                rusqlite::params!["f1", "Inbox", 5],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let name: String = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT display_name FROM folders WHERE id = 'f1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(name, "Inbox");
    }

    #[tokio::test]
    async fn with_tx_rolls_back_on_error() {
        let db = test_db();
        let result: InboxResult<()> = db
            .with_tx(|tx| {
                tx.execute(
                    "INSERT INTO folders (id, display_name, total_item_count) VALUES (?1, ?2, ?3)",
                    rusqlite::params!["f2", "Archive", 0],
                )?;
                Err(raise_error!("forced".to_string(), ErrorCode::InternalError))
            })
            .await;
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM folders WHERE id = 'f2'", [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn fts_trigger_keeps_index_in_sync() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO emails (id, subject, body_markdown) VALUES (?1, ?2, ?3)",
                rusqlite::params!["e1", "Quarterly Report", "please review the numbers"],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let matched: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM emails_fts WHERE emails_fts MATCH 'quarterly'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(matched, 1);
    }
}
