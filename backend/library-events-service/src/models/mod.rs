/// Library domain models
///
/// Items (books) never carry a visibility flag. Who can see an item is derived
/// from the collections containing it and the shares on those collections.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A book in the shared library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: None,
            description: None,
            cover_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// A named, owned set of items (a collection)
///
/// The staging grouping is the per-user landing area for uploads. It cannot be
/// deleted; items leave it through a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Grouping {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub is_staging: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Grouping {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            is_staging: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn staging(owner_id: Uuid) -> Self {
        Self {
            is_staging: true,
            ..Self::new(owner_id, "Staging")
        }
    }
}

/// Explicit grant of a grouping's items to one additional user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub grouping_id: Uuid,
    pub grantee_id: Uuid,
}

/// The set of users entitled to see an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Item belongs to no grouping; everyone can see it
    Public,
    /// Owners and grantees across every grouping containing the item
    Restricted(BTreeSet<Uuid>),
}

impl Audience {
    pub fn is_public(&self) -> bool {
        matches!(self, Audience::Public)
    }

    pub fn includes(&self, user_id: Uuid) -> bool {
        match self {
            Audience::Public => true,
            Audience::Restricted(members) => members.contains(&user_id),
        }
    }

    /// Members of a restricted audience; empty for public items
    pub fn members(&self) -> BTreeSet<Uuid> {
        match self {
            Audience::Public => BTreeSet::new(),
            Audience::Restricted(members) => members.clone(),
        }
    }
}

// ============================================================================
// Request payloads
// ============================================================================

/// Upload of a new book; it lands in the uploader's staging collection
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItemRequest {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

impl UploadItemRequest {
    pub fn into_item(self) -> Item {
        let mut item = Item::new(self.title);
        item.author = self.author;
        item.description = self.description;
        item.cover_url = self.cover_url;
        item
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupingRequest {
    pub name: String,
    #[serde(default)]
    pub item_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupingRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemsRequest {
    pub item_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub grantee_id: Uuid,
}

/// Release of staged uploads
///
/// Each item leaves the caller's staging grouping and joins `grouping_ids`.
/// An empty target list publishes the items.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub item_ids: Vec<Uuid>,
    #[serde(default)]
    pub grouping_ids: Vec<Uuid>,
}
