use redb::{Database, TableDefinition, CommitError, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
}

pub fn setup_labels_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS labels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('category', 'tag'))
        )",
        [],
    )?;

    // Filter lookups come in by (name, kind). Name uniqueness is owned by
    // the label subsystem, so this is deliberately not a UNIQUE index.
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_labels_name_kind ON labels(name, kind)",
        [],
    )?;

    tx.commit()?;
    Ok(())
}

pub fn setup_posts_db(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");
        write_txn.open_table(POSTS)?;
    }
    write_txn.commit()?;
    Ok(())
}
