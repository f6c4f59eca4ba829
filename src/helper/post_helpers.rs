use crate::models::db_operations::posts_db_operations::{self, DbError, JoinedPost};
use crate::models::db_operations::labels_db_operations;
use crate::models::query_plan;
use crate::models::{
    LifecycleState, PagedPosts, Post, PostDetail, PostInput, PostQueryPage, PostRecord,
};
use crate::DbPool;
use chrono::Utc;
use redb::Database;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PostError {
    #[error("alias '{0}' is already taken by another post")]
    AliasConflict(String),
    #[error("post not found: {0}")]
    NotFound(String),
    #[error("batch operation affected {affected} of {requested} posts")]
    PartialBatchFailure { requested: usize, affected: usize },
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Redb Database error: {0}")]
    DocumentStore(#[from] DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

// Helper to get a connection from the pool
fn get_conn(
    pool: &DbPool,
) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, PostError> {
    pool.get().map_err(PostError::Pool)
}

fn parse_id(id: &str) -> Result<Uuid, PostError> {
    Ok(Uuid::parse_str(id).map_err(DbError::Uuid)?)
}

fn parse_ids(ids: &[String]) -> Result<Vec<Uuid>, PostError> {
    ids.iter().map(|id| parse_id(id)).collect()
}

fn dedup_tag_ids(tag_ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    tag_ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn ensure_full_batch(requested: usize, affected: usize) -> Result<(), PostError> {
    if affected < requested {
        log::warn!(
            "Batch lifecycle operation affected {} of {} posts.",
            affected,
            requested
        );
        return Err(PostError::PartialBatchFailure { requested, affected });
    }
    Ok(())
}

// ====================================================================
// ======================= LIFECYCLE OPERATIONS =======================
// ====================================================================

/// Creates a post in draft state, or published if the input asks for it.
/// The alias check and the insert are separate store operations; two
/// concurrent creates with the same alias can both pass the check.
pub fn create_post(db: &Database, input: PostInput) -> Result<Post, PostError> {
    let alias = input.alias.trim().to_string();
    if posts_db_operations::alias_in_use(db, &alias, None)? {
        return Err(PostError::AliasConflict(alias));
    }

    let now = Utc::now();
    let record = PostRecord {
        title: input.title,
        content: input.content,
        description: input.description,
        author: input.author,
        alias,
        category_id: input.category_id,
        tag_ids: dedup_tag_ids(input.tag_ids),
        is_published: input.is_published,
        is_pinned: input.is_pinned,
        thumbnail: input.thumbnail,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    let id = Uuid::new_v4();
    posts_db_operations::write_record(db, id, &record)?;
    Ok(Post {
        id: id.to_string(),
        record,
    })
}

/// Replaces the mutable fields of a post. Creation time, the trash marker
/// and the publish flag are preserved; publishing goes through
/// `set_publish_status`. The alias is re-checked against every other
/// non-deleted post.
pub fn update_post(db: &Database, id: &str, input: PostInput) -> Result<Post, PostError> {
    let uuid = parse_id(id)?;
    let existing = posts_db_operations::read_post(db, id)?
        .ok_or_else(|| PostError::NotFound(id.to_string()))?;

    let alias = input.alias.trim().to_string();
    if posts_db_operations::alias_in_use(db, &alias, Some(uuid))? {
        return Err(PostError::AliasConflict(alias));
    }

    let record = PostRecord {
        title: input.title,
        content: input.content,
        description: input.description,
        author: input.author,
        alias,
        category_id: input.category_id,
        tag_ids: dedup_tag_ids(input.tag_ids),
        is_published: existing.record.is_published,
        is_pinned: input.is_pinned,
        thumbnail: input.thumbnail,
        created_at: existing.record.created_at,
        updated_at: Utc::now(),
        deleted_at: existing.record.deleted_at,
    };

    posts_db_operations::write_record(db, uuid, &record)?;
    Ok(Post {
        id: uuid.to_string(),
        record,
    })
}

/// Writes the publish flag in place, whatever state the post is in. On a
/// trashed post the flag stays invisible to listings until the post is
/// restored.
pub fn set_publish_status(db: &Database, id: &str, published: bool) -> Result<(), PostError> {
    let uuid = parse_id(id)?;
    if !posts_db_operations::set_publish_flag(db, uuid, published)? {
        return Err(PostError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Moves a post to the trash; already-trashed posts are a no-op success.
pub fn soft_delete_post(db: &Database, id: &str) -> Result<(), PostError> {
    let uuid = parse_id(id)?;
    if posts_db_operations::soft_delete_records(db, &[uuid], Utc::now())? == 0 {
        return Err(PostError::NotFound(id.to_string()));
    }
    Ok(())
}

pub fn soft_delete_posts(db: &Database, ids: &[String]) -> Result<(), PostError> {
    let uuids = parse_ids(ids)?;
    let affected = posts_db_operations::soft_delete_records(db, &uuids, Utc::now())?;
    ensure_full_batch(uuids.len(), affected)
}

/// Brings a post back from the trash as an unpublished, unpinned draft.
/// The flags were cleared when the post was trashed and are not recovered.
pub fn restore_post(db: &Database, id: &str) -> Result<(), PostError> {
    let uuid = parse_id(id)?;
    if posts_db_operations::restore_records(db, &[uuid])? == 0 {
        return Err(PostError::NotFound(id.to_string()));
    }
    Ok(())
}

pub fn restore_posts(db: &Database, ids: &[String]) -> Result<(), PostError> {
    let uuids = parse_ids(ids)?;
    let affected = posts_db_operations::restore_records(db, &uuids)?;
    ensure_full_batch(uuids.len(), affected)
}

/// Permanently removes a post from storage, from any state.
pub fn delete_post(db: &Database, id: &str) -> Result<(), PostError> {
    let uuid = parse_id(id)?;
    if posts_db_operations::remove_records(db, &[uuid])? == 0 {
        return Err(PostError::NotFound(id.to_string()));
    }
    Ok(())
}

pub fn delete_posts(db: &Database, ids: &[String]) -> Result<(), PostError> {
    let uuids = parse_ids(ids)?;
    let affected = posts_db_operations::remove_records(db, &uuids)?;
    ensure_full_batch(uuids.len(), affected)
}

// ====================================================================
// ========================== READ OPERATIONS =========================
// ====================================================================

pub fn fetch_post_by_id(db: &Database, id: &str) -> Result<Post, PostError> {
    posts_db_operations::read_post(db, id)?.ok_or_else(|| PostError::NotFound(id.to_string()))
}

/// Fetches a post with its label references resolved. Dangling references
/// come back as an absent category or a shorter tag list, never an error.
pub fn fetch_post_detail_by_id(
    db: &Database,
    pool: &DbPool,
    id: &str,
) -> Result<PostDetail, PostError> {
    let uuid = parse_id(id)?;
    let post = fetch_post_by_id(db, id)?;
    let conn = get_conn(pool)?;

    let mut label_ids = post.record.tag_ids.clone();
    if let Some(category_id) = post.record.category_id {
        label_ids.push(category_id);
    }
    let labels = labels_db_operations::read_labels_by_ids(&conn, &label_ids)?;

    let category = post
        .record
        .category_id
        .and_then(|id| labels.get(&id).cloned());
    let tags = post
        .record
        .tag_ids
        .iter()
        .filter_map(|id| labels.get(id).cloned())
        .collect();

    Ok(JoinedPost {
        id: uuid,
        record: post.record,
        category,
        tags,
    }
    .into_detail())
}

/// Published posts whose title or description contains the keyword,
/// newest first.
pub fn fetch_posts_by_keyword(db: &Database, keyword: &str) -> Result<Vec<Post>, PostError> {
    let page = PostQueryPage {
        keyword: Some(keyword.to_string()),
        ..PostQueryPage::default()
    };
    let clauses = query_plan::build_conditions(&page, LifecycleState::Published);
    Ok(posts_db_operations::read_posts_matching(db, &clauses)?)
}

pub fn fetch_all_published(db: &Database) -> Result<Vec<Post>, PostError> {
    let clauses =
        query_plan::build_conditions(&PostQueryPage::default(), LifecycleState::Published);
    Ok(posts_db_operations::read_posts_matching(db, &clauses)?)
}

pub fn fetch_post_by_alias(db: &Database, alias: &str) -> Result<Post, PostError> {
    posts_db_operations::find_by_alias(db, alias)?
        .ok_or_else(|| PostError::NotFound(alias.to_string()))
}

/// One page of posts in the requested lifecycle state, with the total row
/// count reconciled against the same plan. Without a label-name filter the
/// total is a cheap pre-join count; with one, the plan's join and filter
/// stages are replayed, because eligibility then depends on joined data.
/// The count and the fetch are two store reads, not a snapshot; a write
/// between them can shift a page boundary by one.
pub fn fetch_post_page(
    db: &Database,
    pool: &DbPool,
    page: &PostQueryPage,
    state: LifecycleState,
) -> Result<PagedPosts, PostError> {
    let conn = get_conn(pool)?;
    let pipeline = query_plan::build_page_pipeline(page, state);

    let total = if query_plan::has_post_join_filter(&pipeline) {
        posts_db_operations::count_page_pipeline(db, &conn, &pipeline)?
    } else {
        posts_db_operations::count_matching(db, query_plan::base_conditions(&pipeline))?
    };

    let items = posts_db_operations::run_page_pipeline(db, &conn, &pipeline)?
        .into_iter()
        .map(JoinedPost::into_detail)
        .collect();

    Ok(PagedPosts { items, total })
}
