use crate::config::Config;
use crate::push::ConnectionRegistry;
use crate::repository::LibraryRepository;
use crate::services::{EventFanout, VisibilityTracker};
use std::sync::Arc;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn LibraryRepository>,
    pub registry: ConnectionRegistry,
    pub tracker: Arc<VisibilityTracker>,
}

impl AppState {
    pub fn new(repo: Arc<dyn LibraryRepository>, config: &Config) -> Self {
        let registry = ConnectionRegistry::new(config.push_channel_capacity);
        let fanout = Arc::new(EventFanout::new(registry.clone(), config.fanout()));
        let tracker = Arc::new(VisibilityTracker::new(repo.clone(), fanout));
        Self {
            repo,
            registry,
            tracker,
        }
    }
}
