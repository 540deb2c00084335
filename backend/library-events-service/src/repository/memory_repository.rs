use super::r#trait::{LibraryRepository, RepositoryError, RepositoryResult};
use crate::models::{Grouping, Item, Share};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct LibraryState {
    items: HashMap<Uuid, Item>,
    groupings: HashMap<Uuid, Grouping>,
    // grouping_id -> item ids
    memberships: HashMap<Uuid, BTreeSet<Uuid>>,
    shares: HashSet<Share>,
}

impl LibraryState {
    fn require_grouping(&self, grouping_id: Uuid) -> RepositoryResult<&Grouping> {
        self.groupings
            .get(&grouping_id)
            .ok_or(RepositoryError::NotFound {
                resource: "collection",
                id: grouping_id,
            })
    }

    fn require_item(&self, item_id: Uuid) -> RepositoryResult<&Item> {
        self.items.get(&item_id).ok_or(RepositoryError::NotFound {
            resource: "item",
            id: item_id,
        })
    }

    fn touch(&mut self, grouping_id: Uuid) {
        if let Some(grouping) = self.groupings.get_mut(&grouping_id) {
            grouping.updated_at = Utc::now();
        }
    }
}

/// Process-local library store used for development and tests.
///
/// A single write lock covers each mutation, so every call is committed
/// atomically with respect to concurrent readers.
#[derive(Default)]
pub struct InMemoryLibraryRepository {
    state: RwLock<LibraryState>,
}

impl InMemoryLibraryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LibraryRepository for InMemoryLibraryRepository {
    async fn upsert_item(&self, item: Item) -> RepositoryResult<Item> {
        let mut state = self.state.write().await;
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, item_id: Uuid) -> RepositoryResult<Option<Item>> {
        Ok(self.state.read().await.items.get(&item_id).cloned())
    }

    async fn get_grouping(&self, grouping_id: Uuid) -> RepositoryResult<Option<Grouping>> {
        Ok(self.state.read().await.groupings.get(&grouping_id).cloned())
    }

    async fn staging_grouping(&self, owner_id: Uuid) -> RepositoryResult<Option<Grouping>> {
        let state = self.state.read().await;
        Ok(state
            .groupings
            .values()
            .find(|g| g.is_staging && g.owner_id == owner_id)
            .cloned())
    }

    async fn groupings_containing(&self, item_id: Uuid) -> RepositoryResult<Vec<Grouping>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|(_, items)| items.contains(&item_id))
            .filter_map(|(grouping_id, _)| state.groupings.get(grouping_id).cloned())
            .collect())
    }

    async fn grouping_item_ids(&self, grouping_id: Uuid) -> RepositoryResult<Vec<Uuid>> {
        let state = self.state.read().await;
        state.require_grouping(grouping_id)?;
        Ok(state
            .memberships
            .get(&grouping_id)
            .map(|items| items.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn grantees(&self, grouping_id: Uuid) -> RepositoryResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .shares
            .iter()
            .filter(|s| s.grouping_id == grouping_id)
            .map(|s| s.grantee_id)
            .collect())
    }

    async fn create_grouping(&self, grouping: Grouping) -> RepositoryResult<Grouping> {
        let mut state = self.state.write().await;
        state.memberships.entry(grouping.id).or_default();
        state.groupings.insert(grouping.id, grouping.clone());
        Ok(grouping)
    }

    async fn ensure_staging_grouping(&self, owner_id: Uuid) -> RepositoryResult<(Grouping, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .groupings
            .values()
            .find(|g| g.is_staging && g.owner_id == owner_id)
        {
            return Ok((existing.clone(), false));
        }

        let staging = Grouping::staging(owner_id);
        state.memberships.entry(staging.id).or_default();
        state.groupings.insert(staging.id, staging.clone());
        Ok((staging, true))
    }

    async fn rename_grouping(&self, grouping_id: Uuid, name: String) -> RepositoryResult<Grouping> {
        let mut state = self.state.write().await;
        state.require_grouping(grouping_id)?;
        state.touch(grouping_id);
        let grouping = state
            .groupings
            .get_mut(&grouping_id)
            .ok_or(RepositoryError::NotFound {
                resource: "collection",
                id: grouping_id,
            })?;
        grouping.name = name;
        Ok(grouping.clone())
    }

    async fn delete_grouping(&self, grouping_id: Uuid) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if state.require_grouping(grouping_id)?.is_staging {
            return Err(RepositoryError::StagingProtected(grouping_id));
        }
        state.groupings.remove(&grouping_id);
        state.memberships.remove(&grouping_id);
        state.shares.retain(|s| s.grouping_id != grouping_id);
        Ok(())
    }

    async fn add_item(&self, grouping_id: Uuid, item_id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        state.require_grouping(grouping_id)?;
        state.require_item(item_id)?;
        let added = state
            .memberships
            .entry(grouping_id)
            .or_default()
            .insert(item_id);
        if added {
            state.touch(grouping_id);
        }
        Ok(added)
    }

    async fn remove_item(&self, grouping_id: Uuid, item_id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        state.require_grouping(grouping_id)?;
        let removed = state
            .memberships
            .get_mut(&grouping_id)
            .map(|items| items.remove(&item_id))
            .unwrap_or(false);
        if removed {
            state.touch(grouping_id);
        }
        Ok(removed)
    }

    async fn release_item(
        &self,
        staging_id: Uuid,
        item_id: Uuid,
        targets: Vec<Uuid>,
    ) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let staged = state
            .memberships
            .get(&staging_id)
            .is_some_and(|items| items.contains(&item_id));
        if !staged {
            return Err(RepositoryError::NotStaged {
                item_id,
                grouping_id: staging_id,
            });
        }
        for target in &targets {
            state.require_grouping(*target)?;
        }

        if let Some(items) = state.memberships.get_mut(&staging_id) {
            items.remove(&item_id);
        }
        for target in targets {
            state.memberships.entry(target).or_default().insert(item_id);
            state.touch(target);
        }
        state.touch(staging_id);
        Ok(())
    }

    async fn add_share(&self, share: Share) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        state.require_grouping(share.grouping_id)?;
        Ok(state.shares.insert(share))
    }

    async fn remove_share(&self, share: Share) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        state.require_grouping(share.grouping_id)?;
        Ok(state.shares.remove(&share))
    }
}
