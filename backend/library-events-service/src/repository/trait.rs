use crate::models::{Grouping, Item, Share};
use thiserror::Error;
use uuid::Uuid;

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: Uuid },

    #[error("staging collection {0} cannot be deleted")]
    StagingProtected(Uuid),

    #[error("item {item_id} is not staged in collection {grouping_id}")]
    NotStaged { item_id: Uuid, grouping_id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Authoritative store for items, collections and shares.
///
/// Every mutation must be committed when the call returns; the visibility
/// tracker resolves audiences against the post-commit state right after.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Insert or replace an item
    async fn upsert_item(&self, item: Item) -> RepositoryResult<Item>;

    async fn get_item(&self, item_id: Uuid) -> RepositoryResult<Option<Item>>;

    async fn get_grouping(&self, grouping_id: Uuid) -> RepositoryResult<Option<Grouping>>;

    /// The owner's staging collection, if one has been provisioned
    async fn staging_grouping(&self, owner_id: Uuid) -> RepositoryResult<Option<Grouping>>;

    /// Every collection currently containing the item
    async fn groupings_containing(&self, item_id: Uuid) -> RepositoryResult<Vec<Grouping>>;

    async fn grouping_item_ids(&self, grouping_id: Uuid) -> RepositoryResult<Vec<Uuid>>;

    /// Users granted access to the collection through shares
    async fn grantees(&self, grouping_id: Uuid) -> RepositoryResult<Vec<Uuid>>;

    async fn create_grouping(&self, grouping: Grouping) -> RepositoryResult<Grouping>;

    /// The owner's staging collection, created in the same atomic step if
    /// missing. The flag is true when this call created it.
    async fn ensure_staging_grouping(&self, owner_id: Uuid) -> RepositoryResult<(Grouping, bool)>;

    async fn rename_grouping(&self, grouping_id: Uuid, name: String) -> RepositoryResult<Grouping>;

    /// Delete a non-staging collection together with its memberships and shares
    async fn delete_grouping(&self, grouping_id: Uuid) -> RepositoryResult<()>;

    /// Returns false when the item was already a member
    async fn add_item(&self, grouping_id: Uuid, item_id: Uuid) -> RepositoryResult<bool>;

    /// Returns false when the item was not a member
    async fn remove_item(&self, grouping_id: Uuid, item_id: Uuid) -> RepositoryResult<bool>;

    /// Move a staged item out of `staging_id` into `targets` in one commit
    async fn release_item(
        &self,
        staging_id: Uuid,
        item_id: Uuid,
        targets: Vec<Uuid>,
    ) -> RepositoryResult<()>;

    /// Returns false when the share already existed
    async fn add_share(&self, share: Share) -> RepositoryResult<bool>;

    /// Returns false when there was no such share
    async fn remove_share(&self, share: Share) -> RepositoryResult<bool>;

    async fn health_check(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
