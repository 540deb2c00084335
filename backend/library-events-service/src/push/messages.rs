/// Push event types and their wire encoding
///
/// Every event travels as one server-sent-events frame:
///
/// ```text
/// id: <version>
/// event: <kind>
/// data: {"version":<version>,"kind":"<kind>","payload":{...}}
/// ```
use crate::models::{Grouping, Item};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a collection for audit events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupingSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub is_staging: bool,
    pub actor_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl GroupingSummary {
    pub fn new(grouping: &Grouping, actor_id: Uuid) -> Self {
        Self {
            id: grouping.id,
            owner_id: grouping.owner_id,
            name: grouping.name.clone(),
            is_staging: grouping.is_staging,
            actor_id,
            updated_at: grouping.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupingRemoved {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub actor_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

/// Items entering or leaving one collection in a single mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub grouping_id: Uuid,
    pub item_ids: Vec<Uuid>,
    pub actor_id: Uuid,
}

/// Minimal payload telling a client to drop an item it can no longer see
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemTombstone {
    pub id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

impl ItemTombstone {
    pub fn now(id: Uuid) -> Self {
        Self {
            id,
            deleted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum PushEvent {
    GroupingCreated(GroupingSummary),
    GroupingUpdated(GroupingSummary),
    GroupingDeleted(GroupingRemoved),
    ItemAddedToGrouping(MembershipChange),
    ItemRemovedFromGrouping(MembershipChange),
    /// Full snapshot so the client can materialize the item
    ItemBecameVisible(Item),
    ItemBecameInvisible(ItemTombstone),
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::GroupingCreated(_) => "grouping_created",
            PushEvent::GroupingUpdated(_) => "grouping_updated",
            PushEvent::GroupingDeleted(_) => "grouping_deleted",
            PushEvent::ItemAddedToGrouping(_) => "item_added_to_grouping",
            PushEvent::ItemRemovedFromGrouping(_) => "item_removed_from_grouping",
            PushEvent::ItemBecameVisible(_) => "item_became_visible",
            PushEvent::ItemBecameInvisible(_) => "item_became_invisible",
        }
    }

    /// Audit events describe a mutation; the rest change what a user can see
    pub fn is_audit(&self) -> bool {
        !matches!(
            self,
            PushEvent::ItemBecameVisible(_) | PushEvent::ItemBecameInvisible(_)
        )
    }
}

/// Versioned wrapper around a push event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushEnvelope {
    pub version: u64,
    #[serde(flatten)]
    pub event: PushEvent,
}

impl PushEnvelope {
    pub fn new(version: u64, event: PushEvent) -> Self {
        Self { version, event }
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }

    /// Encode as a single self-delimited SSE frame
    pub fn to_frame(&self) -> Result<Bytes, serde_json::Error> {
        let data = serde_json::to_string(self)?;
        Ok(Bytes::from(format!(
            "id: {}\nevent: {}\ndata: {}\n\n",
            self.version,
            self.kind(),
            data
        )))
    }
}

/// First frame on every stream, carrying the connection id
pub fn connected_frame(connection_id: Uuid) -> Bytes {
    let data = serde_json::json!({
        "connectionId": connection_id,
        "timestamp": Utc::now().timestamp(),
    });
    Bytes::from(format!("event: connected\ndata: {}\n\n", data))
}

/// SSE comment line; ignored by clients, keeps proxies from idling out
pub fn heartbeat_frame() -> Bytes {
    Bytes::from_static(b": ping\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstone_frame_layout() {
        let item_id = Uuid::new_v4();
        let event = PushEvent::ItemBecameInvisible(ItemTombstone::now(item_id));
        let envelope = PushEnvelope::new(7, event);

        let frame = envelope.to_frame().unwrap();
        let text = std::str::from_utf8(&frame).unwrap();

        assert!(text.starts_with("id: 7\nevent: item_became_invisible\ndata: "));
        assert!(text.ends_with("\n\n"));

        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(json["version"], 7);
        assert_eq!(json["kind"], "item_became_invisible");
        assert_eq!(json["payload"]["id"], item_id.to_string());
        assert!(json["payload"]["deletedAt"].is_string());
    }

    #[test]
    fn test_grant_carries_full_snapshot() {
        let item = Item::new("Middlemarch").with_author("George Eliot");
        let envelope = PushEnvelope::new(1, PushEvent::ItemBecameVisible(item.clone()));

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["payload"]["title"], "Middlemarch");
        assert_eq!(json["payload"]["author"], "George Eliot");
        assert!(json["payload"]["createdAt"].is_string());
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let event = PushEvent::ItemAddedToGrouping(MembershipChange {
            grouping_id: Uuid::new_v4(),
            item_ids: vec![Uuid::new_v4()],
            actor_id: Uuid::new_v4(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], event.kind());
        assert!(event.is_audit());
        assert!(!PushEvent::ItemBecameInvisible(ItemTombstone::now(Uuid::new_v4())).is_audit());
    }

    #[test]
    fn test_connected_and_heartbeat_frames() {
        let id = Uuid::new_v4();
        let connected = connected_frame(id);
        let text = std::str::from_utf8(&connected).unwrap();
        assert!(text.starts_with("event: connected\n"));
        assert!(text.contains(&id.to_string()));

        assert_eq!(&heartbeat_frame()[..], b": ping\n\n");
    }
}
