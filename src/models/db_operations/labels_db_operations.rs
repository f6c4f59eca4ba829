use crate::models::{Label, LabelKind};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as RusqliteResult};
use std::collections::{HashMap, HashSet};

fn label_from_row(row: &rusqlite::Row) -> RusqliteResult<Label> {
    let kind_text: String = row.get(2)?;
    let kind = LabelKind::parse(&kind_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown label kind '{}'", kind_text).into(),
        )
    })?;
    Ok(Label {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
    })
}

pub fn create_label(conn: &Connection, name: &str, kind: LabelKind) -> RusqliteResult<i64> {
    conn.execute(
        "INSERT INTO labels (name, kind) VALUES (?1, ?2)",
        params![name, kind.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_label_by_id(conn: &Connection, id: i64) -> RusqliteResult<Option<Label>> {
    conn.query_row(
        "SELECT id, name, kind FROM labels WHERE id = ?1",
        [id],
        label_from_row,
    )
    .optional()
}

/// Batch lookup for the join stages. Duplicate and dangling ids are fine:
/// the result simply has no entry for them.
pub fn read_labels_by_ids(conn: &Connection, ids: &[i64]) -> RusqliteResult<HashMap<i64, Label>> {
    let unique: HashSet<i64> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; unique.len()].join(",");
    let sql = format!("SELECT id, name, kind FROM labels WHERE id IN ({})", placeholders);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(unique.iter()), label_from_row)?;

    let mut labels = HashMap::new();
    for row in rows {
        let label = row?;
        labels.insert(label.id, label);
    }
    Ok(labels)
}

pub fn read_label_by_name(
    conn: &Connection,
    name: &str,
    kind: LabelKind,
) -> RusqliteResult<Option<Label>> {
    conn.query_row(
        "SELECT id, name, kind FROM labels WHERE name = ?1 AND kind = ?2",
        params![name, kind.as_str()],
        label_from_row,
    )
    .optional()
}

pub fn read_all_labels(conn: &Connection, kind: Option<LabelKind>) -> RusqliteResult<Vec<Label>> {
    let mut labels = Vec::new();
    match kind {
        Some(kind) => {
            let mut stmt =
                conn.prepare("SELECT id, name, kind FROM labels WHERE kind = ?1 ORDER BY id")?;
            let rows = stmt.query_map([kind.as_str()], label_from_row)?;
            for row in rows {
                labels.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare("SELECT id, name, kind FROM labels ORDER BY id")?;
            let rows = stmt.query_map([], label_from_row)?;
            for row in rows {
                labels.push(row?);
            }
        }
    }
    Ok(labels)
}

pub fn delete_label(conn: &Connection, id: i64) -> RusqliteResult<usize> {
    conn.execute("DELETE FROM labels WHERE id = ?1", [id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_labels_db(&mut conn).unwrap();
        conn
    }

    #[test]
    fn create_and_read_back() {
        let conn = test_conn();
        let id = create_label(&conn, "rust", LabelKind::Tag).unwrap();

        let label = read_label_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(label.name, "rust");
        assert_eq!(label.kind, LabelKind::Tag);

        assert!(read_label_by_id(&conn, id + 1).unwrap().is_none());
    }

    #[test]
    fn read_by_name_respects_kind() {
        let conn = test_conn();
        create_label(&conn, "news", LabelKind::Category).unwrap();

        assert!(read_label_by_name(&conn, "news", LabelKind::Category)
            .unwrap()
            .is_some());
        assert!(read_label_by_name(&conn, "news", LabelKind::Tag)
            .unwrap()
            .is_none());
    }

    #[test]
    fn batch_lookup_skips_dangling_and_duplicate_ids() {
        let conn = test_conn();
        let a = create_label(&conn, "a", LabelKind::Tag).unwrap();
        let b = create_label(&conn, "b", LabelKind::Tag).unwrap();

        let labels = read_labels_by_ids(&conn, &[a, a, b, 9999]).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[&a].name, "a");
        assert_eq!(labels[&b].name, "b");

        assert!(read_labels_by_ids(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn list_filters_by_kind() {
        let conn = test_conn();
        create_label(&conn, "news", LabelKind::Category).unwrap();
        create_label(&conn, "rust", LabelKind::Tag).unwrap();
        create_label(&conn, "cooking", LabelKind::Tag).unwrap();

        assert_eq!(read_all_labels(&conn, None).unwrap().len(), 3);
        assert_eq!(
            read_all_labels(&conn, Some(LabelKind::Tag)).unwrap().len(),
            2
        );

        let id = read_label_by_name(&conn, "rust", LabelKind::Tag)
            .unwrap()
            .unwrap()
            .id;
        assert_eq!(delete_label(&conn, id).unwrap(), 1);
        assert_eq!(
            read_all_labels(&conn, Some(LabelKind::Tag)).unwrap().len(),
            1
        );
    }
}
