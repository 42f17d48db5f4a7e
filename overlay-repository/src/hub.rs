//! In-process change hub.
//!
//! Consumers (projections, websocket sessions) subscribe either to every
//! change or to a single record. Record channels are created lazily.
//! Channels without receivers are pruned on every broadcast to that record
//! and on every new record subscription, so ids that are never written
//! again do not pile up.

use dashmap::DashMap;
use overlay_models::{
    domain::prelude::SubscriptionTopic,
    event::{ChangeSubscription, OverlayChange},
    ChangeHub,
};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct OVChangeHub {
    capacity: usize,
    /// Channel for `*` subscribers.
    all: broadcast::Sender<Arc<OverlayChange>>,
    /// Per-record channels.
    records: Arc<DashMap<i32, broadcast::Sender<Arc<OverlayChange>>>>,
}

impl OVChangeHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _rx) = broadcast::channel(capacity);
        Self {
            capacity,
            all,
            records: Arc::new(DashMap::new()),
        }
    }
}

impl Default for OVChangeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeHub for OVChangeHub {
    fn subscribe(&self, topic: SubscriptionTopic) -> ChangeSubscription {
        let rx = match topic {
            SubscriptionTopic::All => self.all.subscribe(),
            SubscriptionTopic::Record(id) => {
                self.records.retain(|_, tx| tx.receiver_count() > 0);
                self.records
                    .entry(id)
                    .or_insert_with(|| {
                        let (tx, _rx) = broadcast::channel(self.capacity);
                        tx
                    })
                    .value()
                    .subscribe()
            }
        };
        ChangeSubscription::new(topic, rx)
    }

    fn broadcast(&self, change: OverlayChange) {
        let id = change.record.id;
        let change = Arc::new(change);
        // Send errors only mean nobody is listening.
        let _ = self.all.send(Arc::clone(&change));
        if let Some(entry) = self.records.get(&id) {
            let _ = entry.send(change);
        }
        self.records.remove_if(&id, |_, tx| tx.receiver_count() == 0);
    }
}
