use crate::models::Audience;
use crate::repository::{LibraryRepository, RepositoryResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Computes who may currently see an item.
///
/// The resolver keeps no history: callers that need a before/after diff
/// resolve once before the store mutation and once after it commits.
#[derive(Clone)]
pub struct MembershipResolver {
    repo: Arc<dyn LibraryRepository>,
}

impl MembershipResolver {
    pub fn new(repo: Arc<dyn LibraryRepository>) -> Self {
        Self { repo }
    }

    /// Owner plus grantees of every collection containing the item, or
    /// `Public` when no collection contains it.
    pub async fn audience(&self, item_id: Uuid) -> RepositoryResult<Audience> {
        let groupings = self.repo.groupings_containing(item_id).await?;
        if groupings.is_empty() {
            return Ok(Audience::Public);
        }

        let mut members = BTreeSet::new();
        for grouping in groupings {
            members.insert(grouping.owner_id);
            members.extend(self.repo.grantees(grouping.id).await?);
        }
        Ok(Audience::Restricted(members))
    }

    /// Resolve several items, keeping each item's failure separate
    pub async fn audiences(&self, item_ids: &[Uuid]) -> Vec<(Uuid, RepositoryResult<Audience>)> {
        let mut resolved = Vec::with_capacity(item_ids.len());
        for &item_id in item_ids {
            resolved.push((item_id, self.audience(item_id).await));
        }
        resolved
    }
}
