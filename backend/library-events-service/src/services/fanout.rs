use crate::metrics;
use crate::models::Item;
use crate::push::{ConnectionRegistry, DeliveryReport, ItemTombstone, PushEnvelope, PushEvent};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Who receives audit events describing collection mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAudience {
    #[default]
    Admins,
    All,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FanoutConfig {
    pub audit_audience: AuditAudience,
    /// Also send grant notices to users who could already see the item
    pub notify_previous_audience_on_publish: bool,
}

/// Turns mutation summaries and visibility changes into push frames and
/// picks the audience for each.
///
/// Each event is encoded once, stamped with the next envelope version, and
/// handed to the registry. Delivery never blocks.
///
/// Versions are unique across the process, not monotonic per connection.
/// Frames from one mutation arrive in version order, but two concurrent
/// mutations may interleave, so a connection can see v(n+1) before v(n).
pub struct EventFanout {
    registry: ConnectionRegistry,
    config: FanoutConfig,
    version: AtomicU64,
}

impl EventFanout {
    pub fn new(registry: ConnectionRegistry, config: FanoutConfig) -> Self {
        Self {
            registry,
            config,
            version: AtomicU64::new(0),
        }
    }

    /// Last envelope version handed out
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Claims the next version; unique even when callers race
    fn encode(&self, event: PushEvent) -> Option<(&'static str, Bytes)> {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = PushEnvelope::new(version, event);
        match envelope.to_frame() {
            Ok(frame) => Some((envelope.kind(), frame)),
            Err(e) => {
                tracing::error!(kind = envelope.kind(), "failed to encode push event: {}", e);
                None
            }
        }
    }

    fn record(kind: &'static str, report: DeliveryReport) -> DeliveryReport {
        metrics::frames_delivered(kind, report.delivered);
        report
    }

    /// Audit event describing a collection mutation
    pub fn publish_audit(&self, event: PushEvent) -> DeliveryReport {
        debug_assert!(event.is_audit(), "{} is not an audit event", event.kind());
        let Some((kind, frame)) = self.encode(event) else {
            return DeliveryReport::default();
        };
        let report = match self.config.audit_audience {
            AuditAudience::Admins => self.registry.send_to_admins(&frame),
            AuditAudience::All => self.registry.send_to_all(&frame),
        };
        Self::record(kind, report)
    }

    /// Item left the public state; everyone outside the new audience drops it
    pub fn item_became_restricted(
        &self,
        item_id: Uuid,
        audience: &BTreeSet<Uuid>,
    ) -> DeliveryReport {
        let event = PushEvent::ItemBecameInvisible(ItemTombstone::now(item_id));
        let Some((kind, frame)) = self.encode(event) else {
            return DeliveryReport::default();
        };
        Self::record(kind, self.registry.send_to_complement(audience, &frame))
    }

    /// Item became public; users outside the old audience materialize it
    pub fn item_became_public(
        &self,
        item: Item,
        previous_audience: &BTreeSet<Uuid>,
    ) -> DeliveryReport {
        let Some((kind, frame)) = self.encode(PushEvent::ItemBecameVisible(item)) else {
            return DeliveryReport::default();
        };
        let report = if self.config.notify_previous_audience_on_publish {
            self.registry.send_to_all(&frame)
        } else {
            self.registry.send_to_complement(previous_audience, &frame)
        };
        Self::record(kind, report)
    }

    /// One user gained sight of a restricted item through a share
    pub fn item_granted_to(&self, user_id: Uuid, item: Item) -> DeliveryReport {
        let Some((kind, frame)) = self.encode(PushEvent::ItemBecameVisible(item)) else {
            return DeliveryReport::default();
        };
        Self::record(kind, self.registry.send_to(user_id, &frame))
    }

    /// One user lost sight of a restricted item through an unshare
    pub fn item_revoked_from(&self, user_id: Uuid, item_id: Uuid) -> DeliveryReport {
        let event = PushEvent::ItemBecameInvisible(ItemTombstone::now(item_id));
        let Some((kind, frame)) = self.encode(event) else {
            return DeliveryReport::default();
        };
        Self::record(kind, self.registry.send_to(user_id, &frame))
    }
}
