//! In-memory overlay store for projection tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use overlay_error::{storage::StorageError, StorageResult};
use overlay_models::{
    domain::prelude::{
        build_asset_url, AssetField, AssetUrlOptions, ImageAsset, NewOverlay, OverlayPatch,
        OverlayQuery, OverlayRecord, SubscriptionTopic,
    },
    enums::overlay::ChangeAction,
    event::{ChangeSubscription, OverlayChange},
    OverlayStore,
};
use serde_json::Value as Json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::{broadcast, RwLock, RwLockWriteGuard};

struct Inner {
    records: Vec<OverlayRecord>,
    next_id: i32,
    tick: i64,
    list_error: Option<StorageError>,
    update_error: Option<StorageError>,
}

/// Enforces the single-active rule the way the update hook does.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<Arc<OverlayChange>>,
    updates: AtomicUsize,
    create_gate: RwLock<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner {
                records: Vec::new(),
                next_id: 1,
                tick: 0,
                list_error: None,
                update_error: None,
            }),
            tx,
            updates: AtomicUsize::new(0),
            create_gate: RwLock::new(()),
        }
    }

    /// Stall every `create` until the returned guard is dropped.
    pub async fn hold_creates(&self) -> RwLockWriteGuard<'_, ()> {
        self.create_gate.write().await
    }

    /// Make every following `list` fail with `error` (or succeed again with `None`).
    pub fn fail_lists_with(&self, error: Option<StorageError>) {
        self.inner.lock().unwrap().list_error = error;
    }

    pub fn fail_updates_with(&self, error: Option<StorageError>) {
        self.inner.lock().unwrap().update_error = error;
    }

    /// Number of successful updates so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Force a record's `active` flag and timestamp without running the single-active rule.
    pub fn force_active(&self, id: i32, updated_offset_secs: i64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.records.iter_mut().find(|r| r.id == id) {
            record.active = true;
            record.updated_at = Utc::now() + Duration::seconds(updated_offset_secs);
        }
    }

    fn publish(&self, action: ChangeAction, record: OverlayRecord) {
        let _ = self.tx.send(Arc::new(OverlayChange::new(action, record)));
    }
}

#[async_trait]
impl OverlayStore for MemoryStore {
    async fn list(&self, query: &OverlayQuery) -> StorageResult<Vec<OverlayRecord>> {
        let inner = self.inner.lock().unwrap();
        if let Some(e) = &inner.list_error {
            return Err(e.clone());
        }
        let mut records: Vec<OverlayRecord> = inner
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        query.sort_records(&mut records);
        Ok(records)
    }

    async fn get(&self, id: i32) -> StorageResult<Option<OverlayRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn create(&self, payload: NewOverlay) -> StorageResult<OverlayRecord> {
        let _open = self.create_gate.read().await;
        payload
            .check()
            .map_err(|msg| StorageError::InvalidPayload(msg.into()))?;
        let payload = payload.normalized();
        let record = {
            let mut inner = self.inner.lock().unwrap();
            inner.tick += 1;
            let at = Utc::now() + Duration::milliseconds(inner.tick);
            let (image, image_mime) = match payload.image {
                Some(image) => (Some(image.file_name), Some(image.mime)),
                None => (None, None),
            };
            let record = OverlayRecord {
                id: inner.next_id,
                short_description: payload.short_description,
                overlay_type: payload.overlay_type,
                component_name: payload.component_name,
                image,
                image_mime,
                active: false,
                parameters: Json::Object(payload.parameters),
                created_at: at,
                updated_at: at,
            };
            inner.next_id += 1;
            inner.records.push(record.clone());
            record
        };
        self.publish(ChangeAction::Create, record.clone());
        Ok(record)
    }

    async fn update(&self, id: i32, patch: OverlayPatch) -> StorageResult<OverlayRecord> {
        let record = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(e) = &inner.update_error {
                return Err(e.clone());
            }
            inner.tick += 1;
            let at = Utc::now() + Duration::milliseconds(inner.tick);
            let record = inner
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| StorageError::EntityNotFound(format!("overlay {id}")))?;
            if let Some(description) = patch.short_description {
                record.short_description = description;
            }
            if let Some(name) = patch.component_name {
                record.component_name = name;
            }
            if let Some(active) = patch.active {
                record.active = active;
            }
            if let Some(parameters) = patch.parameters {
                record.parameters = Json::Object(parameters);
            }
            record.updated_at = at;
            let record = record.clone();
            if record.active {
                for other in inner.records.iter_mut().filter(|r| r.id != id) {
                    other.active = false;
                }
            }
            record
        };
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.publish(ChangeAction::Update, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: i32) -> StorageResult<()> {
        let record = {
            let mut inner = self.inner.lock().unwrap();
            let idx = inner
                .records
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| StorageError::EntityNotFound(format!("overlay {id}")))?;
            inner.records.remove(idx)
        };
        self.publish(ChangeAction::Delete, record);
        Ok(())
    }

    fn subscribe(&self, topic: SubscriptionTopic) -> ChangeSubscription {
        ChangeSubscription::new(topic, self.tx.subscribe())
    }

    fn asset_url(
        &self,
        record: &OverlayRecord,
        field: AssetField,
        options: &AssetUrlOptions,
    ) -> Option<String> {
        build_asset_url(record, field, options)
    }

    async fn image(&self, _id: i32) -> StorageResult<Option<ImageAsset>> {
        Ok(None)
    }
}
