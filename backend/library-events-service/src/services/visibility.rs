//! Collection mutations with visibility tracking.
//!
//! Every mutation resolves each affected item's audience before the store
//! call and again after it commits, classifies the difference, then emits the
//! mutation's audit events followed by the per-item visibility events.
//! Classification always uses the item's full collection membership, so an
//! item that stays reachable through a second collection is left untouched.

use super::fanout::EventFanout;
use super::membership::MembershipResolver;
use crate::metrics;
use crate::models::{Audience, Grouping, Item, Share};
use crate::push::messages::{GroupingRemoved, GroupingSummary, MembershipChange};
use crate::push::PushEvent;
use crate::repository::{LibraryRepository, RepositoryError, RepositoryResult};
use chrono::Utc;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a mutation did to one item's visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityTransition {
    Unchanged,
    /// Public before, restricted to `audience` now
    BecameRestricted { audience: BTreeSet<Uuid> },
    /// Restricted to `previous_audience` before, public now
    BecamePublic { previous_audience: BTreeSet<Uuid> },
    /// A share let this user see the (still restricted) item
    AccessGranted { user_id: Uuid },
    /// Removing a share hid the (still restricted) item from this user
    AccessRevoked { user_id: Uuid },
}

impl VisibilityTransition {
    /// Compare two audiences of the same item.
    ///
    /// Only the public/restricted edges count; a restricted item whose member
    /// set changed is `Unchanged` here.
    pub fn classify(before: &Audience, after: &Audience) -> Self {
        match (before, after) {
            (Audience::Public, Audience::Restricted(audience)) => {
                VisibilityTransition::BecameRestricted {
                    audience: audience.clone(),
                }
            }
            (Audience::Restricted(previous), Audience::Public) => {
                VisibilityTransition::BecamePublic {
                    previous_audience: previous.clone(),
                }
            }
            _ => VisibilityTransition::Unchanged,
        }
    }

    /// Classify a share change for a single grantee
    pub fn classify_for(user_id: Uuid, before: &Audience, after: &Audience) -> Self {
        match (before.includes(user_id), after.includes(user_id)) {
            (false, true) => VisibilityTransition::AccessGranted { user_id },
            (true, false) => VisibilityTransition::AccessRevoked { user_id },
            _ => VisibilityTransition::Unchanged,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VisibilityTransition::Unchanged => "unchanged",
            VisibilityTransition::BecameRestricted { .. } => "became_restricted",
            VisibilityTransition::BecamePublic { .. } => "became_public",
            VisibilityTransition::AccessGranted { .. } => "access_granted",
            VisibilityTransition::AccessRevoked { .. } => "access_revoked",
        }
    }
}

fn serialize_label<S: Serializer>(
    transition: &VisibilityTransition,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(transition.label())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub item_id: Uuid,
    #[serde(serialize_with = "serialize_label")]
    pub transition: VisibilityTransition,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub item_id: Uuid,
    pub reason: String,
}

/// Per-item results of one mutation
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransitionReport {
    pub succeeded: Vec<ItemOutcome>,
    pub failed: Vec<ItemFailure>,
}

impl TransitionReport {
    pub fn outcome(&self, item_id: Uuid) -> Option<&VisibilityTransition> {
        self.succeeded
            .iter()
            .find(|o| o.item_id == item_id)
            .map(|o| &o.transition)
    }

    fn succeed(&mut self, item_id: Uuid, transition: VisibilityTransition) {
        metrics::transition_recorded(transition.label());
        self.succeeded.push(ItemOutcome {
            item_id,
            transition,
        });
    }

    fn fail(&mut self, item_id: Uuid, reason: impl ToString) {
        let reason = reason.to_string();
        metrics::resolution_failed();
        warn!(item_id = %item_id, "skipping visibility notification: {}", reason);
        self.failed.push(ItemFailure { item_id, reason });
    }
}

/// Frames waiting for the mutation's audit event to go out first
enum Notice {
    Restricted { item_id: Uuid, audience: BTreeSet<Uuid> },
    Public { item: Item, previous_audience: BTreeSet<Uuid> },
    GrantedTo { user_id: Uuid, item: Item },
    RevokedFrom { user_id: Uuid, item_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingChange {
    pub grouping: Grouping,
    pub report: TransitionReport,
}

/// Runs collection mutations against the store and notifies connected
/// clients about the resulting visibility changes.
pub struct VisibilityTracker {
    repo: Arc<dyn LibraryRepository>,
    resolver: MembershipResolver,
    fanout: Arc<EventFanout>,
}

impl VisibilityTracker {
    pub fn new(repo: Arc<dyn LibraryRepository>, fanout: Arc<EventFanout>) -> Self {
        Self {
            resolver: MembershipResolver::new(repo.clone()),
            repo,
            fanout,
        }
    }

    pub fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    async fn require_grouping(&self, grouping_id: Uuid) -> RepositoryResult<Grouping> {
        self.repo
            .get_grouping(grouping_id)
            .await?
            .ok_or(RepositoryError::NotFound {
                resource: "collection",
                id: grouping_id,
            })
    }

    /// Create an empty collection, then add `item_ids` one by one
    pub async fn create_grouping(
        &self,
        actor_id: Uuid,
        name: String,
        item_ids: Vec<Uuid>,
    ) -> RepositoryResult<GroupingChange> {
        let grouping = self.repo.create_grouping(Grouping::new(actor_id, name)).await?;
        info!(grouping_id = %grouping.id, owner_id = %actor_id, "collection created");

        self.fanout
            .publish_audit(PushEvent::GroupingCreated(GroupingSummary::new(&grouping, actor_id)));

        let report = if item_ids.is_empty() {
            TransitionReport::default()
        } else {
            self.add_items_after_commit(actor_id, grouping.id, item_ids).await
        };

        Ok(GroupingChange { grouping, report })
    }

    pub async fn rename_grouping(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
        name: String,
    ) -> RepositoryResult<Grouping> {
        let grouping = self.repo.rename_grouping(grouping_id, name).await?;
        self.fanout
            .publish_audit(PushEvent::GroupingUpdated(GroupingSummary::new(&grouping, actor_id)));
        Ok(grouping)
    }

    /// `add_items` for a caller whose own write already committed; a
    /// rejected batch lands in the report instead of failing the call.
    async fn add_items_after_commit(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
        item_ids: Vec<Uuid>,
    ) -> TransitionReport {
        match self.add_items(actor_id, grouping_id, item_ids.clone()).await {
            Ok(report) => report,
            Err(e) => {
                let reason = e.to_string();
                let mut report = TransitionReport::default();
                for item_id in dedup(item_ids) {
                    report.fail(item_id, &reason);
                }
                report
            }
        }
    }

    /// Add items to a collection.
    ///
    /// An item that was public becomes restricted to the collection's
    /// audience; every other item only appears in the audit event.
    pub async fn add_items(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
        item_ids: Vec<Uuid>,
    ) -> RepositoryResult<TransitionReport> {
        self.require_grouping(grouping_id).await?;

        let mut report = TransitionReport::default();
        let mut notices = Vec::new();
        let mut added = Vec::new();

        for item_id in dedup(item_ids) {
            let before = self.resolver.audience(item_id).await;

            match self.repo.add_item(grouping_id, item_id).await {
                Ok(true) => added.push(item_id),
                Ok(false) => {
                    report.succeed(item_id, VisibilityTransition::Unchanged);
                    continue;
                }
                Err(e) => {
                    report.fail(item_id, e);
                    continue;
                }
            }

            self.classify_committed(item_id, before, &mut report, &mut notices)
                .await;
        }

        if !added.is_empty() {
            self.fanout
                .publish_audit(PushEvent::ItemAddedToGrouping(MembershipChange {
                    grouping_id,
                    item_ids: added,
                    actor_id,
                }));
        }
        self.emit(notices);

        info!(
            grouping_id = %grouping_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "items added to collection"
        );
        Ok(report)
    }

    /// Remove one item from a collection.
    ///
    /// The item becomes public only if no other collection still holds it.
    pub async fn remove_item(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
        item_id: Uuid,
    ) -> RepositoryResult<TransitionReport> {
        self.require_grouping(grouping_id).await?;

        let mut report = TransitionReport::default();
        let mut notices = Vec::new();

        let before = self.resolver.audience(item_id).await;
        if !self.repo.remove_item(grouping_id, item_id).await? {
            report.succeed(item_id, VisibilityTransition::Unchanged);
            return Ok(report);
        }

        self.classify_committed(item_id, before, &mut report, &mut notices)
            .await;

        self.fanout
            .publish_audit(PushEvent::ItemRemovedFromGrouping(MembershipChange {
                grouping_id,
                item_ids: vec![item_id],
                actor_id,
            }));
        self.emit(notices);

        Ok(report)
    }

    /// Delete a non-staging collection.
    ///
    /// Each former member is classified on its own; only items left in no
    /// collection become public.
    pub async fn delete_grouping(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
    ) -> RepositoryResult<TransitionReport> {
        let grouping = self.require_grouping(grouping_id).await?;
        if grouping.is_staging {
            return Err(RepositoryError::StagingProtected(grouping_id));
        }

        let item_ids = self.repo.grouping_item_ids(grouping_id).await?;
        let befores = self.resolver.audiences(&item_ids).await;

        self.repo.delete_grouping(grouping_id).await?;
        info!(grouping_id = %grouping_id, items = item_ids.len(), "collection deleted");

        let mut report = TransitionReport::default();
        let mut notices = Vec::new();
        for (item_id, before) in befores {
            self.classify_committed(item_id, before, &mut report, &mut notices)
                .await;
        }

        self.fanout
            .publish_audit(PushEvent::GroupingDeleted(GroupingRemoved {
                id: grouping.id,
                owner_id: grouping.owner_id,
                actor_id,
                deleted_at: Utc::now(),
            }));
        self.emit(notices);

        Ok(report)
    }

    /// Store a new upload and place it in the uploader's staging collection,
    /// creating that collection on first use.
    pub async fn stage_upload(
        &self,
        actor_id: Uuid,
        item: Item,
    ) -> RepositoryResult<(Item, TransitionReport)> {
        let (staging, created) = self.repo.ensure_staging_grouping(actor_id).await?;
        if created {
            info!(grouping_id = %staging.id, owner_id = %actor_id, "staging collection created");
            self.fanout.publish_audit(PushEvent::GroupingCreated(GroupingSummary::new(
                &staging, actor_id,
            )));
        }

        let item = self.repo.upsert_item(item).await?;
        let report = self
            .add_items_after_commit(actor_id, staging.id, vec![item.id])
            .await;
        Ok((item, report))
    }

    /// Move staged uploads out of the actor's staging collection into
    /// `targets`. With no targets the items become public.
    pub async fn release_staged(
        &self,
        actor_id: Uuid,
        item_ids: Vec<Uuid>,
        targets: Vec<Uuid>,
    ) -> RepositoryResult<TransitionReport> {
        let staging = self
            .repo
            .staging_grouping(actor_id)
            .await?
            .ok_or(RepositoryError::NotFound {
                resource: "staging collection",
                id: actor_id,
            })?;
        let targets = dedup(targets);
        for &target in &targets {
            self.require_grouping(target).await?;
        }

        let mut report = TransitionReport::default();
        let mut notices = Vec::new();
        let mut released = Vec::new();

        for item_id in dedup(item_ids) {
            let before = self.resolver.audience(item_id).await;

            if let Err(e) = self
                .repo
                .release_item(staging.id, item_id, targets.clone())
                .await
            {
                report.fail(item_id, e);
                continue;
            }
            released.push(item_id);

            self.classify_committed(item_id, before, &mut report, &mut notices)
                .await;
        }

        if !released.is_empty() {
            self.fanout
                .publish_audit(PushEvent::ItemRemovedFromGrouping(MembershipChange {
                    grouping_id: staging.id,
                    item_ids: released.clone(),
                    actor_id,
                }));
            for &target in &targets {
                self.fanout
                    .publish_audit(PushEvent::ItemAddedToGrouping(MembershipChange {
                        grouping_id: target,
                        item_ids: released.clone(),
                        actor_id,
                    }));
            }
        }
        self.emit(notices);

        info!(
            staging_id = %staging.id,
            released = released.len(),
            failed = report.failed.len(),
            "staged items released"
        );
        Ok(report)
    }

    /// Share a collection; the grantee is told about every item it could
    /// not see before.
    pub async fn share_grouping(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
        grantee_id: Uuid,
    ) -> RepositoryResult<TransitionReport> {
        let share = Share {
            grouping_id,
            grantee_id,
        };
        self.change_share(actor_id, share, true).await
    }

    /// Revoke a share; the ex-grantee drops every item no other collection
    /// still shows it.
    pub async fn unshare_grouping(
        &self,
        actor_id: Uuid,
        grouping_id: Uuid,
        grantee_id: Uuid,
    ) -> RepositoryResult<TransitionReport> {
        let share = Share {
            grouping_id,
            grantee_id,
        };
        self.change_share(actor_id, share, false).await
    }

    async fn change_share(
        &self,
        actor_id: Uuid,
        share: Share,
        granting: bool,
    ) -> RepositoryResult<TransitionReport> {
        let grouping = self.require_grouping(share.grouping_id).await?;

        let item_ids = self.repo.grouping_item_ids(share.grouping_id).await?;
        let befores = self.resolver.audiences(&item_ids).await;

        let changed = if granting {
            self.repo.add_share(share).await?
        } else {
            self.repo.remove_share(share).await?
        };

        let mut report = TransitionReport::default();
        if !changed {
            return Ok(report);
        }

        let mut notices = Vec::new();
        for (item_id, before) in befores {
            let before = match before {
                Ok(audience) => audience,
                Err(e) => {
                    report.fail(item_id, e);
                    continue;
                }
            };
            let after = match self.resolver.audience(item_id).await {
                Ok(audience) => audience,
                Err(e) => {
                    report.fail(item_id, e);
                    continue;
                }
            };

            let transition = VisibilityTransition::classify_for(share.grantee_id, &before, &after);
            match &transition {
                VisibilityTransition::AccessGranted { user_id } => {
                    match self.snapshot(item_id).await {
                        Ok(item) => notices.push(Notice::GrantedTo {
                            user_id: *user_id,
                            item,
                        }),
                        Err(reason) => {
                            report.fail(item_id, reason);
                            continue;
                        }
                    }
                }
                VisibilityTransition::AccessRevoked { user_id } => {
                    notices.push(Notice::RevokedFrom {
                        user_id: *user_id,
                        item_id,
                    })
                }
                _ => {}
            }
            report.succeed(item_id, transition);
        }

        self.fanout.publish_audit(PushEvent::GroupingUpdated(GroupingSummary::new(
            &grouping, actor_id,
        )));
        self.emit(notices);

        info!(
            grouping_id = %share.grouping_id,
            grantee_id = %share.grantee_id,
            granting,
            "collection share changed"
        );
        Ok(report)
    }

    /// Resolve the post-commit audience, classify, and queue any notice
    async fn classify_committed(
        &self,
        item_id: Uuid,
        before: RepositoryResult<Audience>,
        report: &mut TransitionReport,
        notices: &mut Vec<Notice>,
    ) {
        let before = match before {
            Ok(audience) => audience,
            Err(e) => {
                report.fail(item_id, e);
                return;
            }
        };
        let after = match self.resolver.audience(item_id).await {
            Ok(audience) => audience,
            Err(e) => {
                report.fail(item_id, e);
                return;
            }
        };

        let transition = VisibilityTransition::classify(&before, &after);
        debug!(
            item_id = %item_id,
            public = after.is_public(),
            audience = after.members().len(),
            transition = transition.label(),
            "item classified"
        );
        match &transition {
            VisibilityTransition::BecameRestricted { audience } => {
                notices.push(Notice::Restricted {
                    item_id,
                    audience: audience.clone(),
                });
            }
            VisibilityTransition::BecamePublic { previous_audience } => {
                match self.snapshot(item_id).await {
                    Ok(item) => notices.push(Notice::Public {
                        item,
                        previous_audience: previous_audience.clone(),
                    }),
                    Err(reason) => {
                        report.fail(item_id, reason);
                        return;
                    }
                }
            }
            _ => {}
        }
        report.succeed(item_id, transition);
    }

    async fn snapshot(&self, item_id: Uuid) -> Result<Item, String> {
        match self.repo.get_item(item_id).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => Err(format!("item {} no longer exists", item_id)),
            Err(e) => Err(e.to_string()),
        }
    }

    fn emit(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Restricted { item_id, audience } => {
                    self.fanout.item_became_restricted(item_id, &audience);
                }
                Notice::Public {
                    item,
                    previous_audience,
                } => {
                    self.fanout.item_became_public(item, &previous_audience);
                }
                Notice::GrantedTo { user_id, item } => {
                    self.fanout.item_granted_to(user_id, item);
                }
                Notice::RevokedFrom { user_id, item_id } => {
                    self.fanout.item_revoked_from(user_id, item_id);
                }
            }
        }
    }
}

/// Drop repeated ids, keeping first-seen order
fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
