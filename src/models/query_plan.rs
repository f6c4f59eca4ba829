use std::cmp::Ordering;

use crate::models::{LifecycleState, PostQueryPage, PostRecord, SortDirection, SortField};

/// One conjunct of the base filter. A filter is the AND of all its clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Deleted(bool),
    Published(bool),
    /// Case-insensitive substring match against title OR description. The
    /// needle is lowercased once at build time.
    TitleOrDescriptionLike(String),
}

impl Clause {
    pub fn matches(&self, record: &PostRecord) -> bool {
        match self {
            Clause::Deleted(expected) => record.deleted_at.is_some() == *expected,
            Clause::Published(expected) => record.is_published == *expected,
            Clause::TitleOrDescriptionLike(needle) => {
                record.title.to_lowercase().contains(needle)
                    || record.description.to_lowercase().contains(needle)
            }
        }
    }
}

pub fn matches_all(clauses: &[Clause], record: &PostRecord) -> bool {
    clauses.iter().all(|clause| clause.matches(record))
}

/// Builds the base filter for a list request. A blank keyword contributes no
/// clause at all, it does not become a clause that matches nothing.
pub fn build_conditions(page: &PostQueryPage, state: LifecycleState) -> Vec<Clause> {
    let mut clauses = match state {
        LifecycleState::Draft => vec![Clause::Deleted(false), Clause::Published(false)],
        LifecycleState::Published => vec![Clause::Deleted(false), Clause::Published(true)],
        LifecycleState::Trashed => vec![Clause::Deleted(true)],
    };
    if let Some(keyword) = page.keyword.as_deref() {
        let keyword = keyword.trim();
        if !keyword.is_empty() {
            clauses.push(Clause::TitleOrDescriptionLike(keyword.to_lowercase()));
        }
    }
    clauses
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Total order over records: pinned posts first, then the requested field and
/// direction, then creation time descending as the final tie-break. The last
/// step makes pagination deterministic even when the sort field ties.
pub fn compare_records(spec: &SortSpec, a: &PostRecord, b: &PostRecord) -> Ordering {
    b.is_pinned
        .cmp(&a.is_pinned)
        .then_with(|| {
            let by_field = match spec.field {
                SortField::CreateTime => a.created_at.cmp(&b.created_at),
                SortField::UpdateTime => a.updated_at.cmp(&b.updated_at),
                SortField::Title => a.title.cmp(&b.title),
            };
            match spec.direction {
                SortDirection::Asc => by_field,
                SortDirection::Desc => by_field.reverse(),
            }
        })
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// One step of a query plan. A plan is an ordered list of stages; both the
/// data fetch and the row count consume the same list, which is what keeps
/// page contents and the reported total consistent with each other.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Vec<Clause>),
    LookupCategory,
    LookupTags,
    /// Keep rows whose joined tags contain a tag label with this exact name.
    MatchTagName(String),
    /// Keep rows whose joined category is a category label with this exact name.
    MatchCategoryName(String),
    Sort(SortSpec),
    Skip(u64),
    Limit(u64),
}

/// Builds the full plan for one page of a list request.
pub fn build_page_pipeline(page: &PostQueryPage, state: LifecycleState) -> Vec<Stage> {
    let mut pipeline = vec![
        Stage::Match(build_conditions(page, state)),
        Stage::LookupCategory,
        Stage::LookupTags,
    ];
    if let Some(tag_name) = non_blank(page.tag_name.as_deref()) {
        pipeline.push(Stage::MatchTagName(tag_name));
    }
    if let Some(category_name) = non_blank(page.category_name.as_deref()) {
        pipeline.push(Stage::MatchCategoryName(category_name));
    }
    pipeline.push(Stage::Sort(SortSpec {
        field: page.sort_field,
        direction: page.sort_direction,
    }));
    pipeline.push(Stage::Skip(page.page_no.saturating_sub(1) * page.page_size));
    pipeline.push(Stage::Limit(page.page_size));
    pipeline
}

/// True when the plan filters on joined label data. A plain document count
/// would be wrong for such a plan: a record can pass the base filter and
/// still be dropped by a post-join stage, so the count has to replay the
/// joins instead.
pub fn has_post_join_filter(pipeline: &[Stage]) -> bool {
    pipeline
        .iter()
        .any(|stage| matches!(stage, Stage::MatchTagName(_) | Stage::MatchCategoryName(_)))
}

/// The base filter clauses of a plan, for the cheap pre-join count path.
pub fn base_conditions(pipeline: &[Stage]) -> &[Clause] {
    pipeline
        .iter()
        .find_map(|stage| match stage {
            Stage::Match(clauses) => Some(clauses.as_slice()),
            _ => None,
        })
        .unwrap_or(&[])
}

fn non_blank(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
