use redb::{Database, ReadableTable, TableDefinition, CommitError, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use crate::models::db_operations::labels_db_operations;
use crate::models::query_plan::{self, Clause, Stage};
use crate::models::{Label, LabelKind, Post, PostDetail, PostRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
}

// One JSON document per post, keyed by UUID bytes. Lifecycle state lives in
// fields on the document (deleted_at / is_published / is_pinned), there is no
// separate table per state.
pub const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");

/// One row flowing through a query plan: the stored record plus whatever the
/// lookup stages have resolved so far.
#[derive(Debug, Clone)]
pub struct JoinedPost {
    pub id: Uuid,
    pub record: PostRecord,
    pub category: Option<Label>,
    pub tags: Vec<Label>,
}

impl JoinedPost {
    pub fn into_detail(self) -> PostDetail {
        PostDetail {
            id: self.id.to_string(),
            title: self.record.title,
            content: self.record.content,
            description: self.record.description,
            author: self.record.author,
            alias: self.record.alias,
            category: self.category,
            tags: self.tags,
            is_published: self.record.is_published,
            is_pinned: self.record.is_pinned,
            thumbnail: self.record.thumbnail,
            created_at: self.record.created_at,
            updated_at: self.record.updated_at,
            deleted_at: self.record.deleted_at,
        }
    }
}

// ====================================================================
// ========================= WRITE OPERATIONS =========================
// ====================================================================

/// Inserts or fully replaces the document for `id`.
pub fn write_record(db: &Database, id: Uuid, record: &PostRecord) -> Result<(), DbError> {
    let json = serde_json::to_string(record)?;
    let key = id.into_bytes();

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(POSTS)?;
        table.insert(&key, json.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Flips the publish flag in place. Returns false if the post does not exist.
pub fn set_publish_flag(db: &Database, id: Uuid, published: bool) -> Result<bool, DbError> {
    let key = id.into_bytes();
    let write_txn = db.begin_write()?;
    let found = {
        let mut table = write_txn.open_table(POSTS)?;
        let existing = {
            let guard = table.get(&key)?;
            guard.map(|g| g.value().to_string())
        };
        match existing {
            Some(json) => {
                let mut record: PostRecord = serde_json::from_str(&json)?;
                record.is_published = published;
                table.insert(&key, serde_json::to_string(&record)?.as_str())?;
                true
            }
            None => false,
        }
    };
    write_txn.commit()?;
    Ok(found)
}

/// Moves every listed post into the trash: stamps `deleted_at` and clears the
/// publish and pin flags. A post that is already trashed counts as affected
/// (the operation is idempotent); an unknown id does not. All writes share
/// one transaction, there is no per-id rollback.
pub fn soft_delete_records(
    db: &Database,
    ids: &[Uuid],
    deleted_at: DateTime<Utc>,
) -> Result<usize, DbError> {
    let write_txn = db.begin_write()?;
    let mut affected = 0;
    {
        let mut table = write_txn.open_table(POSTS)?;
        for id in ids {
            let key = id.into_bytes();
            let existing = {
                let guard = table.get(&key)?;
                guard.map(|g| g.value().to_string())
            };
            let json = match existing {
                Some(json) => json,
                None => continue,
            };
            let mut record: PostRecord = serde_json::from_str(&json)?;
            if record.deleted_at.is_none() {
                record.deleted_at = Some(deleted_at);
                record.is_published = false;
                record.is_pinned = false;
                table.insert(&key, serde_json::to_string(&record)?.as_str())?;
            }
            affected += 1;
        }
    }
    write_txn.commit()?;
    Ok(affected)
}

/// Clears `deleted_at` on every listed post. The publish and pin flags were
/// cleared when the post was trashed and stay cleared: a restored post comes
/// back as an unpublished, unpinned draft.
pub fn restore_records(db: &Database, ids: &[Uuid]) -> Result<usize, DbError> {
    let write_txn = db.begin_write()?;
    let mut affected = 0;
    {
        let mut table = write_txn.open_table(POSTS)?;
        for id in ids {
            let key = id.into_bytes();
            let existing = {
                let guard = table.get(&key)?;
                guard.map(|g| g.value().to_string())
            };
            let json = match existing {
                Some(json) => json,
                None => continue,
            };
            let mut record: PostRecord = serde_json::from_str(&json)?;
            if record.deleted_at.is_some() {
                record.deleted_at = None;
                table.insert(&key, serde_json::to_string(&record)?.as_str())?;
            }
            affected += 1;
        }
    }
    write_txn.commit()?;
    Ok(affected)
}

/// Permanently removes the listed posts, whatever state they are in.
pub fn remove_records(db: &Database, ids: &[Uuid]) -> Result<usize, DbError> {
    let write_txn = db.begin_write()?;
    let mut affected = 0;
    {
        let mut table = write_txn.open_table(POSTS)?;
        for id in ids {
            let key = id.into_bytes();
            if table.remove(&key)?.is_some() {
                affected += 1;
            }
        }
    }
    write_txn.commit()?;
    Ok(affected)
}

// ====================================================================
// ========================== READ OPERATIONS =========================
// ====================================================================

fn scan_records(db: &Database) -> Result<Vec<(Uuid, PostRecord)>, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(POSTS)?;
    let mut records = Vec::new();
    for item in table.iter()? {
        let (key, value) = item?;
        let record: PostRecord = serde_json::from_str(value.value())?;
        records.push((Uuid::from_bytes(*key.value()), record));
    }
    Ok(records)
}

pub fn read_post(db: &Database, id: &str) -> Result<Option<Post>, DbError> {
    let uuid = match Uuid::parse_str(id) {
        Ok(uuid) => uuid,
        Err(_) => return Ok(None),
    };

    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(POSTS)?;
    let json = {
        let guard = table.get(&uuid.into_bytes())?;
        guard.map(|g| g.value().to_string())
    };
    match json {
        Some(json) => Ok(Some(Post {
            id: uuid.to_string(),
            record: serde_json::from_str(&json)?,
        })),
        None => Ok(None),
    }
}

/// Reads every post matching the clause conjunction, newest first.
pub fn read_posts_matching(db: &Database, clauses: &[Clause]) -> Result<Vec<Post>, DbError> {
    let mut posts: Vec<Post> = scan_records(db)?
        .into_iter()
        .filter(|(_, record)| query_plan::matches_all(clauses, record))
        .map(|(id, record)| Post { id: id.to_string(), record })
        .collect();
    posts.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
    Ok(posts)
}

/// True if a non-deleted post other than `exclude` already holds `alias`.
/// Trashed posts release their alias. This check is not atomic with the
/// write that follows it; two concurrent writers can both pass it.
pub fn alias_in_use(db: &Database, alias: &str, exclude: Option<Uuid>) -> Result<bool, DbError> {
    for (id, record) in scan_records(db)? {
        if record.deleted_at.is_none() && record.alias == alias && Some(id) != exclude {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Exact alias lookup among non-deleted posts.
pub fn find_by_alias(db: &Database, alias: &str) -> Result<Option<Post>, DbError> {
    for (id, record) in scan_records(db)? {
        if record.deleted_at.is_none() && record.alias == alias {
            return Ok(Some(Post { id: id.to_string(), record }));
        }
    }
    Ok(None)
}

/// Pre-join document count for plans with no label-name filter. Cheap: no
/// lookups, no row materialization beyond the record itself.
pub fn count_matching(db: &Database, clauses: &[Clause]) -> Result<u64, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(POSTS)?;
    let mut count = 0;
    for item in table.iter()? {
        let (_, value) = item?;
        let record: PostRecord = serde_json::from_str(value.value())?;
        if query_plan::matches_all(clauses, &record) {
            count += 1;
        }
    }
    Ok(count)
}

// ====================================================================
// ========================= PLAN EXECUTION ===========================
// ====================================================================

/// Runs the full plan including sort and pagination.
pub fn run_page_pipeline(
    db: &Database,
    conn: &Connection,
    pipeline: &[Stage],
) -> Result<Vec<JoinedPost>, DbError> {
    execute_pipeline(db, conn, pipeline, true)
}

/// Replays the same plan but only its match, lookup and post-join-filter
/// stages, and counts the surviving rows. This is the only correct total for
/// a plan whose filters depend on joined label data.
pub fn count_page_pipeline(
    db: &Database,
    conn: &Connection,
    pipeline: &[Stage],
) -> Result<u64, DbError> {
    Ok(execute_pipeline(db, conn, pipeline, false)?.len() as u64)
}

// Both entry points walk the identical stage list; `with_paging` only decides
// whether the sort/skip/limit stages take effect. Keeping a single walker is
// what guarantees the data page and the row count never diverge on filters.
fn execute_pipeline(
    db: &Database,
    conn: &Connection,
    pipeline: &[Stage],
    with_paging: bool,
) -> Result<Vec<JoinedPost>, DbError> {
    let mut rows: Vec<JoinedPost> = scan_records(db)?
        .into_iter()
        .map(|(id, record)| JoinedPost {
            id,
            record,
            category: None,
            tags: Vec::new(),
        })
        .collect();

    for stage in pipeline {
        match stage {
            Stage::Match(clauses) => {
                rows.retain(|row| query_plan::matches_all(clauses, &row.record));
            }
            Stage::LookupCategory => {
                let ids: Vec<i64> = rows.iter().filter_map(|row| row.record.category_id).collect();
                let labels = labels_db_operations::read_labels_by_ids(conn, &ids)?;
                for row in &mut rows {
                    // A dangling reference resolves to no category, not an error.
                    row.category = row
                        .record
                        .category_id
                        .and_then(|id| labels.get(&id).cloned());
                }
            }
            Stage::LookupTags => {
                let ids: Vec<i64> = rows
                    .iter()
                    .flat_map(|row| row.record.tag_ids.iter().copied())
                    .collect();
                let labels = labels_db_operations::read_labels_by_ids(conn, &ids)?;
                for row in &mut rows {
                    row.tags = row
                        .record
                        .tag_ids
                        .iter()
                        .filter_map(|id| labels.get(id).cloned())
                        .collect();
                }
            }
            Stage::MatchTagName(name) => {
                rows.retain(|row| {
                    row.tags
                        .iter()
                        .any(|label| label.kind == LabelKind::Tag && label.name == *name)
                });
            }
            Stage::MatchCategoryName(name) => {
                rows.retain(|row| {
                    row.category
                        .as_ref()
                        .map_or(false, |label| {
                            label.kind == LabelKind::Category && label.name == *name
                        })
                });
            }
            Stage::Sort(spec) => {
                if with_paging {
                    rows.sort_by(|a, b| query_plan::compare_records(spec, &a.record, &b.record));
                }
            }
            Stage::Skip(count) => {
                if with_paging {
                    let count = (*count as usize).min(rows.len());
                    rows.drain(..count);
                }
            }
            Stage::Limit(count) => {
                if with_paging {
                    rows.truncate(*count as usize);
                }
            }
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LifecycleState, PostQueryPage, SortDirection, SortField};
    use crate::setup::db_setup;
    use chrono::{TimeZone, Utc};
    use redb::backends::InMemoryBackend;

    fn test_stores() -> (Database, Connection) {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .unwrap();
        db_setup::setup_posts_db(&db).unwrap();
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_labels_db(&mut conn).unwrap();
        (db, conn)
    }

    fn record(alias: &str, created_secs: i64) -> PostRecord {
        PostRecord {
            title: format!("title {}", alias),
            content: "body".to_string(),
            description: String::new(),
            author: "author".to_string(),
            alias: alias.to_string(),
            category_id: None,
            tag_ids: Vec::new(),
            is_published: true,
            is_pinned: false,
            thumbnail: None,
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            updated_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            deleted_at: None,
        }
    }

    fn insert(db: &Database, record: &PostRecord) -> Uuid {
        let id = Uuid::new_v4();
        write_record(db, id, record).unwrap();
        id
    }

    fn published_page() -> PostQueryPage {
        PostQueryPage::default()
    }

    #[test]
    fn lookup_stages_resolve_labels_and_tolerate_dangling_refs() {
        let (db, conn) = test_stores();
        let news = labels_db_operations::create_label(&conn, "news", LabelKind::Category).unwrap();
        let rust = labels_db_operations::create_label(&conn, "rust", LabelKind::Tag).unwrap();

        let mut with_labels = record("a", 100);
        with_labels.category_id = Some(news);
        with_labels.tag_ids = vec![rust, 9999]; // second id dangles
        insert(&db, &with_labels);

        let mut dangling_category = record("b", 200);
        dangling_category.category_id = Some(8888);
        insert(&db, &dangling_category);

        let pipeline = query_plan::build_page_pipeline(&published_page(), LifecycleState::Published);
        let rows = run_page_pipeline(&db, &conn, &pipeline).unwrap();
        assert_eq!(rows.len(), 2);

        // Newest first: "b" then "a".
        assert_eq!(rows[0].record.alias, "b");
        assert!(rows[0].category.is_none());
        assert!(rows[0].tags.is_empty());

        assert_eq!(rows[1].category.as_ref().unwrap().name, "news");
        assert_eq!(rows[1].tags.len(), 1);
        assert_eq!(rows[1].tags[0].name, "rust");
    }

    #[test]
    fn tag_filter_count_matches_unpaged_row_set() {
        let (db, conn) = test_stores();
        let rust = labels_db_operations::create_label(&conn, "rust", LabelKind::Tag).unwrap();

        for i in 0..5 {
            let mut tagged = record(&format!("tagged-{}", i), 100 + i);
            tagged.tag_ids = vec![rust];
            insert(&db, &tagged);
        }
        insert(&db, &record("untagged", 50));

        let mut page = published_page();
        page.tag_name = Some("rust".to_string());
        page.page_size = 2;
        let pipeline = query_plan::build_page_pipeline(&page, LifecycleState::Published);

        assert!(query_plan::has_post_join_filter(&pipeline));
        let total = count_page_pipeline(&db, &conn, &pipeline).unwrap();
        assert_eq!(total, 5);

        // A naive pre-join count would report 6 here.
        let naive = count_matching(&db, query_plan::base_conditions(&pipeline)).unwrap();
        assert_eq!(naive, 6);

        // Page through: 2 + 2 + 1, then empty.
        let mut seen = 0;
        for page_no in 1..=4u64 {
            let mut paged = page.clone();
            paged.page_no = page_no;
            let pipeline = query_plan::build_page_pipeline(&paged, LifecycleState::Published);
            let rows = run_page_pipeline(&db, &conn, &pipeline).unwrap();
            match page_no {
                1 | 2 => assert_eq!(rows.len(), 2),
                3 => assert_eq!(rows.len(), 1),
                _ => assert!(rows.is_empty()),
            }
            seen += rows.len() as u64;
        }
        assert_eq!(seen, total);
    }

    #[test]
    fn cheap_count_agrees_with_plan_execution_when_no_label_filter() {
        let (db, conn) = test_stores();
        insert(&db, &record("a", 1));
        insert(&db, &record("b", 2));
        let mut draft = record("c", 3);
        draft.is_published = false;
        insert(&db, &draft);

        let page = published_page();
        let pipeline = query_plan::build_page_pipeline(&page, LifecycleState::Published);
        assert!(!query_plan::has_post_join_filter(&pipeline));

        let cheap = count_matching(&db, query_plan::base_conditions(&pipeline)).unwrap();
        let replayed = count_page_pipeline(&db, &conn, &pipeline).unwrap();
        assert_eq!(cheap, 2);
        assert_eq!(cheap, replayed);
    }

    #[test]
    fn pinned_rows_lead_and_ordering_is_stable_across_runs() {
        let (db, conn) = test_stores();
        insert(&db, &record("old", 100));
        let mut pinned = record("pinned", 50);
        pinned.is_pinned = true;
        insert(&db, &pinned);
        insert(&db, &record("new", 200));

        let mut page = published_page();
        page.sort_field = SortField::CreateTime;
        page.sort_direction = SortDirection::Desc;
        let pipeline = query_plan::build_page_pipeline(&page, LifecycleState::Published);

        let first: Vec<String> = run_page_pipeline(&db, &conn, &pipeline)
            .unwrap()
            .into_iter()
            .map(|row| row.record.alias)
            .collect();
        assert_eq!(first, vec!["pinned", "new", "old"]);

        let second: Vec<String> = run_page_pipeline(&db, &conn, &pipeline)
            .unwrap()
            .into_iter()
            .map(|row| row.record.alias)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn alias_scan_skips_trashed_posts_and_the_excluded_id() {
        let (db, _conn) = test_stores();
        let held = insert(&db, &record("kept-alias", 1));

        let mut trashed = record("freed-alias", 2);
        trashed.deleted_at = Some(Utc.timestamp_opt(3, 0).unwrap());
        insert(&db, &trashed);

        assert!(alias_in_use(&db, "kept-alias", None).unwrap());
        assert!(!alias_in_use(&db, "kept-alias", Some(held)).unwrap());
        assert!(!alias_in_use(&db, "freed-alias", None).unwrap());
        assert!(!alias_in_use(&db, "unknown", None).unwrap());

        assert!(find_by_alias(&db, "kept-alias").unwrap().is_some());
        assert!(find_by_alias(&db, "freed-alias").unwrap().is_none());
    }

    #[test]
    fn publish_flag_update_reports_missing_posts() {
        let (db, _conn) = test_stores();
        let id = insert(&db, &record("a", 1));

        assert!(set_publish_flag(&db, id, false).unwrap());
        let post = read_post(&db, &id.to_string()).unwrap().unwrap();
        assert!(!post.record.is_published);

        assert!(!set_publish_flag(&db, Uuid::new_v4(), true).unwrap());
    }

    #[test]
    fn read_post_returns_none_for_malformed_ids() {
        let (db, _conn) = test_stores();
        assert!(read_post(&db, "not-a-uuid").unwrap().is_none());
    }
}
