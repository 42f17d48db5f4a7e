//! Live synchronization of projections with the overlay store.
//!
//! A projection never patches its state from a notification payload. Every
//! notification (and every lag) triggers a full re-fetch whose result
//! replaces the projection's state wholesale.

use async_trait::async_trait;
use overlay_error::{storage::StorageError, StorageResult};
use overlay_models::{domain::prelude::SubscriptionTopic, OverlayStore};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// View state rebuilt from the store on every change.
#[async_trait]
pub trait LiveProjection: Send + 'static {
    type Snapshot: Send + 'static;

    /// Read everything the projection needs. Runs without the projection lock.
    async fn fetch(store: &dyn OverlayStore) -> StorageResult<Self::Snapshot>;

    /// Swap in a freshly fetched snapshot.
    fn replace(&mut self, snapshot: Self::Snapshot);

    /// A fetch failed for a reason other than cancellation.
    fn fetch_failed(&mut self, _error: &StorageError) {}
}

/// Keep `projection` in sync until `cancel` fires or the change feed closes.
///
/// The subscription is taken before the first fetch so no change between
/// the two is lost. `on_update` runs with the projection locked after every
/// replace or reported failure.
#[instrument(name = "live-sync", skip_all)]
pub async fn run_live<P, F>(
    store: Arc<dyn OverlayStore>,
    projection: Arc<Mutex<P>>,
    cancel: CancellationToken,
    mut on_update: F,
) where
    P: LiveProjection,
    F: FnMut(&P) + Send,
{
    let mut subscription = store.subscribe(SubscriptionTopic::All);

    if !refresh(store.as_ref(), &projection, &cancel, &mut on_update).await {
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = subscription.recv() => match res {
                Ok(change) => debug!(action = ?change.action, overlay_id = change.record.id, "Overlay changed"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Change feed lagged, re-fetching"),
                Err(RecvError::Closed) => {
                    debug!("Change feed closed");
                    break;
                }
            }
        }
        if !refresh(store.as_ref(), &projection, &cancel, &mut on_update).await {
            break;
        }
    }
    debug!("Live sync stopped");
}

/// Fetch and replace once. Returns `false` when cancelled.
async fn refresh<P, F>(
    store: &dyn OverlayStore,
    projection: &Mutex<P>,
    cancel: &CancellationToken,
    on_update: &mut F,
) -> bool
where
    P: LiveProjection,
    F: FnMut(&P) + Send,
{
    let result = tokio::select! {
        _ = cancel.cancelled() => return false,
        res = P::fetch(store) => res,
    };

    let mut guard = projection.lock().await;
    match result {
        Ok(snapshot) => guard.replace(snapshot),
        Err(e) if e.is_abort() => {
            debug!("Fetch cancelled");
            return true;
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch overlays");
            guard.fetch_failed(&e);
        }
    }
    on_update(&guard);
    true
}
