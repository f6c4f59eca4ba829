

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two label flavors. A post carries at most one category label and any
/// number of tag labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Category,
    Tag,
}

impl LabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Category => "category",
            LabelKind::Tag => "tag",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "category" => Some(LabelKind::Category),
            "tag" => Some(LabelKind::Tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub kind: LabelKind,
}

/// The stored shape of a post. The identifier lives in the table key, not in
/// the document itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub title: String,
    pub content: String,
    pub description: String,
    pub author: String,
    pub alias: String,
    pub category_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub is_published: bool,
    pub is_pinned: bool,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub record: PostRecord,
}

/// Caller-supplied fields for create/update. Identifier, timestamps and the
/// trash marker are owned by the lifecycle operations, never by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub description: String,
    pub author: String,
    pub alias: String,
    pub category_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub is_published: bool,
    pub is_pinned: bool,
    pub thumbnail: Option<String>,
}

/// Read-only projection of a post with its label references resolved.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: String,
    pub title: String,
    pub content: String,
    pub description: String,
    pub author: String,
    pub alias: String,
    pub category: Option<Label>,
    pub tags: Vec<Label>,
    pub is_published: bool,
    pub is_pinned: bool,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Which of the three states a list request is asking for. The state is
/// derived from `deleted_at`/`is_published` on the record, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Draft,
    Published,
    Trashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    CreateTime,
    UpdateTime,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One page request as decoded by the transport layer. `page_no` is 1-based;
/// the transport layer rejects zero or negative page parameters before they
/// reach this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct PostQueryPage {
    pub page_no: u64,
    pub page_size: u64,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub keyword: Option<String>,
    pub tag_name: Option<String>,
    pub category_name: Option<String>,
}

impl Default for PostQueryPage {
    fn default() -> Self {
        PostQueryPage {
            page_no: 1,
            page_size: 10,
            sort_field: SortField::CreateTime,
            sort_direction: SortDirection::Desc,
            keyword: None,
            tag_name: None,
            category_name: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PagedPosts {
    pub items: Vec<PostDetail>,
    pub total: u64,
}

pub mod db_operations;
pub mod query_plan;
