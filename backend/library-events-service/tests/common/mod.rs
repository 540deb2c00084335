#![allow(dead_code)]

use bytes::Bytes;
use library_events_service::models::{Grouping, Item, Share};
use library_events_service::push::{ConnectionRegistry, Role};
use library_events_service::repository::{InMemoryLibraryRepository, LibraryRepository};
use library_events_service::services::{EventFanout, FanoutConfig, VisibilityTracker};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-memory store, registry and tracker wired the way `AppState` wires them
pub struct Harness {
    pub repo: Arc<InMemoryLibraryRepository>,
    pub registry: ConnectionRegistry,
    pub fanout: Arc<EventFanout>,
    pub tracker: Arc<VisibilityTracker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FanoutConfig::default())
    }

    pub fn with_config(config: FanoutConfig) -> Self {
        let repo = Arc::new(InMemoryLibraryRepository::new());
        let registry = ConnectionRegistry::default();
        let fanout = Arc::new(EventFanout::new(registry.clone(), config));
        let tracker = Arc::new(VisibilityTracker::new(repo.clone(), fanout.clone()));
        Self {
            repo,
            registry,
            fanout,
            tracker,
        }
    }

    pub async fn item(&self, title: &str) -> Item {
        self.repo.upsert_item(Item::new(title)).await.unwrap()
    }

    pub async fn grouping(&self, owner: Uuid, name: &str) -> Grouping {
        self.repo
            .create_grouping(Grouping::new(owner, name))
            .await
            .unwrap()
    }

    /// Set up membership without emitting anything
    pub async fn place(&self, grouping: &Grouping, item: &Item) {
        self.repo.add_item(grouping.id, item.id).await.unwrap();
    }

    pub async fn share(&self, grouping: &Grouping, grantee: Uuid) {
        self.repo
            .add_share(Share {
                grouping_id: grouping.id,
                grantee_id: grantee,
            })
            .await
            .unwrap();
    }

    pub fn connect(&self, user: Uuid) -> mpsc::Receiver<Bytes> {
        self.registry.subscribe(user, Role::User).1
    }

    pub fn connect_admin(&self, user: Uuid) -> mpsc::Receiver<Bytes> {
        self.registry.subscribe(user, Role::Admin).1
    }
}

/// One decoded push frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u64,
    pub kind: String,
    pub data: serde_json::Value,
}

pub fn parse(frame: &Bytes) -> Frame {
    let text = std::str::from_utf8(frame).unwrap();
    let mut version = 0;
    let mut kind = String::new();
    let mut data = serde_json::Value::Null;
    for line in text.lines() {
        if let Some(v) = line.strip_prefix("id: ") {
            version = v.parse().unwrap();
        } else if let Some(k) = line.strip_prefix("event: ") {
            kind = k.to_string();
        } else if let Some(d) = line.strip_prefix("data: ") {
            data = serde_json::from_str(d).unwrap();
        }
    }
    Frame {
        version,
        kind,
        data,
    }
}

/// Every frame already queued on a connection
pub fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(parse(&frame));
    }
    frames
}

pub fn kinds(frames: &[Frame]) -> Vec<&str> {
    frames.iter().map(|f| f.kind.as_str()).collect()
}
