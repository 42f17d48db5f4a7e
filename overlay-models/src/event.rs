//! Change notifications published by the overlay store after a commit.

use crate::{
    domain::prelude::{OverlayRecord, SubscriptionTopic},
    enums::overlay::ChangeAction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

/// One committed mutation of the overlays collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayChange {
    pub action: ChangeAction,
    pub record: OverlayRecord,
}

impl OverlayChange {
    pub fn new(action: ChangeAction, record: OverlayRecord) -> Self {
        Self { action, record }
    }
}

/// Live handle on the change feed. Dropping it unsubscribes.
pub struct ChangeSubscription {
    topic: SubscriptionTopic,
    rx: broadcast::Receiver<Arc<OverlayChange>>,
}

impl ChangeSubscription {
    pub fn new(topic: SubscriptionTopic, rx: broadcast::Receiver<Arc<OverlayChange>>) -> Self {
        Self { topic, rx }
    }

    #[inline]
    pub fn topic(&self) -> SubscriptionTopic {
        self.topic
    }

    /// Wait for the next change matching the topic.
    ///
    /// `RecvError::Lagged` means notifications were dropped and the caller
    /// should re-fetch; `RecvError::Closed` means the hub is gone.
    pub async fn recv(&mut self) -> Result<Arc<OverlayChange>, RecvError> {
        loop {
            let change = self.rx.recv().await?;
            if self.topic.matches(change.record.id) {
                return Ok(change);
            }
        }
    }

    /// Non-blocking variant of [`ChangeSubscription::recv`].
    pub fn try_recv(&mut self) -> Result<Arc<OverlayChange>, TryRecvError> {
        loop {
            let change = self.rx.try_recv()?;
            if self.topic.matches(change.record.id) {
                return Ok(change);
            }
        }
    }
}
