//! # Core Context
//!
//! Explicit service wiring constructed once per process and passed by
//! reference into operations. There is no ambient global state: every
//! collaborator an operation needs arrives through this context.

use std::sync::Arc;

use crate::config::RundownConfig;
use crate::events::EventPublisher;
use crate::ingest::blueprint::ShowStyle;
use crate::queue::SerializedQueue;
use crate::store::DocumentStore;
use crate::timeline::TimelinePublisher;

#[derive(Clone)]
pub struct CoreContext {
    pub store: DocumentStore,
    pub queue: Arc<SerializedQueue>,
    pub blueprint: Arc<dyn ShowStyle>,
    pub timeline: Arc<dyn TimelinePublisher>,
    pub events: EventPublisher,
    pub config: Arc<RundownConfig>,
}

impl CoreContext {
    pub fn new(
        store: DocumentStore,
        blueprint: Arc<dyn ShowStyle>,
        timeline: Arc<dyn TimelinePublisher>,
        config: RundownConfig,
    ) -> Self {
        let event_channel_capacity = config.event_channel_capacity;
        Self {
            store,
            queue: Arc::new(SerializedQueue::new()),
            blueprint,
            timeline,
            events: EventPublisher::new(event_channel_capacity),
            config: Arc::new(config),
        }
    }
}
