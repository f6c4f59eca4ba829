use crate::models::db_operations::labels_db_operations;
use crate::models::{Label, LabelKind};
use crate::DbPool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelHelperError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

// Read-only resolution of label references; the post query plans consume the
// ids and names this surface hands out.

pub fn resolve_label(pool: &DbPool, id: i64) -> Result<Option<Label>, LabelHelperError> {
    let conn = pool.get()?;
    Ok(labels_db_operations::read_label_by_id(&conn, id)?)
}

pub fn resolve_label_by_name(
    pool: &DbPool,
    name: &str,
    kind: LabelKind,
) -> Result<Option<Label>, LabelHelperError> {
    let conn = pool.get()?;
    Ok(labels_db_operations::read_label_by_name(&conn, name, kind)?)
}

pub fn fetch_all_labels(
    pool: &DbPool,
    kind: Option<LabelKind>,
) -> Result<Vec<Label>, LabelHelperError> {
    let conn = pool.get()?;
    Ok(labels_db_operations::read_all_labels(&conn, kind)?)
}

pub fn create_new_label(
    pool: &DbPool,
    name: &str,
    kind: LabelKind,
) -> Result<i64, LabelHelperError> {
    let conn = pool.get()?;
    Ok(labels_db_operations::create_label(&conn, name, kind)?)
}

pub fn remove_label(pool: &DbPool, id: i64) -> Result<usize, LabelHelperError> {
    let conn = pool.get()?;
    Ok(labels_db_operations::delete_label(&conn, id)?)
}
