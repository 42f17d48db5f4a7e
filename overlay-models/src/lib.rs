pub mod constants;
pub mod domain;
pub mod entities;
pub mod enums;
pub mod event;
pub mod settings;
pub mod web;

use crate::{
    domain::prelude::{
        AssetField, AssetUrlOptions, ImageAsset, NewOverlay, OverlayPatch, OverlayQuery,
        OverlayRecord, SubscriptionTopic,
    },
    event::{ChangeSubscription, OverlayChange},
};
use async_trait::async_trait;
use overlay_error::{init::InitContextError, storage::StorageError, OVResult, StorageResult};
use sea_orm::{DatabaseConnection, DatabaseTransaction};
use settings::Settings;
use std::sync::Arc;

/// Database management interface.
///
/// This trait defines the core database operations including initialization,
/// connection management, and cleanup.
#[async_trait]
pub trait DbManager: Send + Sync + 'static {
    /// Initializes the database manager with the provided settings.
    ///
    /// # Arguments
    /// * `settings` - The service configuration settings
    ///
    /// # Returns
    /// An Arc-wrapped instance of the database manager
    async fn init(settings: &Settings) -> OVResult<Arc<Self>, InitContextError>
    where
        Self: Sized;

    /// Retrieves a database connection from the connection pool.
    fn get_connection(&self) -> OVResult<DatabaseConnection, StorageError>;

    /// Gracefully closes all database connections and performs cleanup.
    async fn close(&self) -> OVResult<()>;
}

/// Web server interface.
#[async_trait]
pub trait WebServer: Send + Sync + 'static {
    /// Binds and starts the web server.
    ///
    /// # Arguments
    /// * `settings` - The service configuration settings
    /// * `store` - The overlay store every route and session works against
    async fn init(
        settings: &Settings,
        store: Arc<dyn OverlayStore>,
    ) -> OVResult<Arc<Self>, InitContextError>
    where
        Self: Sized;

    /// Gracefully stops the web server.
    async fn stop(&self) -> OVResult<()>;
}

/// Record store for overlays.
///
/// Admin and viewer projections consume the store only through this trait.
/// Every successful mutation is followed by exactly one [`OverlayChange`]
/// on the feed returned by [`OverlayStore::subscribe`].
#[async_trait]
pub trait OverlayStore: Send + Sync + 'static {
    /// List records matching the query's filters, in the query's order.
    async fn list(&self, query: &OverlayQuery) -> StorageResult<Vec<OverlayRecord>>;

    async fn get(&self, id: i32) -> StorageResult<Option<OverlayRecord>>;

    /// Create a record. New records are always inactive.
    async fn create(&self, payload: NewOverlay) -> StorageResult<OverlayRecord>;

    /// Apply a partial update, run every update hook inside the same
    /// transaction, commit, then notify.
    async fn update(&self, id: i32, patch: OverlayPatch) -> StorageResult<OverlayRecord>;

    async fn delete(&self, id: i32) -> StorageResult<()>;

    /// Subscribe to committed changes. Drop the subscription to unsubscribe.
    fn subscribe(&self, topic: SubscriptionTopic) -> ChangeSubscription;

    /// URL under which a file field of the record is served.
    fn asset_url(
        &self,
        record: &OverlayRecord,
        field: AssetField,
        options: &AssetUrlOptions,
    ) -> Option<String>;

    /// Stored image of a record, if it has one.
    async fn image(&self, id: i32) -> StorageResult<Option<ImageAsset>>;
}

/// Hook run on every record update, inside the update transaction.
///
/// The transaction is the raw escape hatch: statements issued on it commit
/// or roll back together with the triggering update.
#[async_trait]
pub trait RecordHook: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Called after the update was applied and before it commits.
    /// An error rolls the whole update back.
    async fn on_update_execute(
        &self,
        txn: &DatabaseTransaction,
        record: &OverlayRecord,
    ) -> StorageResult<()>;
}

/// In-process fan-out of committed changes.
pub trait ChangeHub: Send + Sync + 'static {
    /// Subscribe to changes on a topic.
    fn subscribe(&self, topic: SubscriptionTopic) -> ChangeSubscription;

    /// Best-effort delivery to every current subscriber of the change's topics.
    fn broadcast(&self, change: OverlayChange);
}
