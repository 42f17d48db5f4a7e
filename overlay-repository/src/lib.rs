mod hooks;
mod hub;

pub use hooks::SingleActiveHook;
pub use hub::OVChangeHub;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use overlay_error::{storage::StorageError, StorageResult};
use overlay_models::{
    domain::{
        overlay::{COMPONENT_NAME_REQUIRED, DESCRIPTION_REQUIRED, DESCRIPTION_TOO_LONG},
        prelude::{
            build_asset_url, AssetField, AssetUrlOptions, ImageAsset, NewOverlay, OverlayPatch,
            OverlayQuery, OverlayRecord, SortDirection, SortField, SubscriptionTopic,
        },
    },
    constants::MAX_DESCRIPTION_LEN,
    entities::prelude::{Overlay, OverlayActiveModel, OverlayColumn},
    enums::overlay::{ChangeAction, OverlayType},
    event::{ChangeSubscription, OverlayChange},
    ChangeHub, OverlayStore, RecordHook,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, Order, QueryFilter, QueryOrder, QueryTrait, Set, TransactionTrait,
};
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Timestamps are kept at millisecond precision so stored text sorts chronologically.
#[inline]
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn sort_column(field: SortField) -> OverlayColumn {
    match field {
        SortField::Id => OverlayColumn::Id,
        SortField::Created => OverlayColumn::CreatedAt,
        SortField::Updated => OverlayColumn::UpdatedAt,
        SortField::ShortDescription => OverlayColumn::ShortDescription,
        SortField::Type => OverlayColumn::OverlayType,
        SortField::ComponentName => OverlayColumn::ComponentName,
        SortField::Active => OverlayColumn::Active,
    }
}

fn not_found(id: i32) -> StorageError {
    StorageError::EntityNotFound(format!("overlay {id}"))
}

/// SQLite backed overlay store.
///
/// Mutations publish to the change hub only after they commit. Updates run
/// every registered [`RecordHook`] inside the update transaction.
pub struct OverlayRepository {
    db: DatabaseConnection,
    hub: Arc<dyn ChangeHub>,
    hooks: Vec<Arc<dyn RecordHook>>,
}

impl OverlayRepository {
    pub fn new(db: DatabaseConnection, hub: Arc<dyn ChangeHub>) -> Self {
        Self {
            db,
            hub,
            hooks: Vec::new(),
        }
    }

    /// Register an update hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn RecordHook>) -> Self {
        info!(hook = hook.name(), "Registered overlay update hook");
        self.hooks.push(hook);
        self
    }

    #[inline]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn publish(&self, action: ChangeAction, record: OverlayRecord) {
        self.hub.broadcast(OverlayChange::new(action, record));
    }
}

#[async_trait]
impl OverlayStore for OverlayRepository {
    #[instrument(name = "overlay-list", skip_all)]
    async fn list(&self, query: &OverlayQuery) -> StorageResult<Vec<OverlayRecord>> {
        let mut select = Overlay::find()
            .apply_if(query.active, |q, active| {
                q.filter(OverlayColumn::Active.eq(active))
            })
            .apply_if(query.overlay_type, |q, overlay_type| {
                q.filter(OverlayColumn::OverlayType.eq(overlay_type))
            })
            .apply_if(query.component_name.as_ref(), |q, name| {
                q.filter(OverlayColumn::ComponentName.eq(name.as_str()))
            });

        for key in &query.sort {
            let order = match key.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            select = select.order_by(sort_column(key.field), order);
        }
        if !query.sort.iter().any(|key| key.field == SortField::Id) {
            select = select.order_by(OverlayColumn::Id, Order::Asc);
        }

        Ok(select
            .into_partial_model::<OverlayRecord>()
            .all(&self.db)
            .await?)
    }

    async fn get(&self, id: i32) -> StorageResult<Option<OverlayRecord>> {
        Ok(Overlay::find_by_id(id)
            .into_partial_model::<OverlayRecord>()
            .one(&self.db)
            .await?)
    }

    #[instrument(name = "overlay-create", skip_all)]
    async fn create(&self, payload: NewOverlay) -> StorageResult<OverlayRecord> {
        payload
            .check()
            .map_err(|msg| StorageError::InvalidPayload(msg.to_string()))?;
        let payload = payload.normalized();
        let at = now();
        let (image, image_mime, image_bytes) = match payload.image {
            Some(image) => (Some(image.file_name), Some(image.mime), Some(image.bytes)),
            None => (None, None, None),
        };

        let model = OverlayActiveModel {
            id: NotSet,
            short_description: Set(payload.short_description),
            overlay_type: Set(payload.overlay_type),
            component_name: Set(payload.component_name),
            image: Set(image),
            image_mime: Set(image_mime),
            image_bytes: Set(image_bytes),
            active: Set(false),
            parameters: Set(Json::Object(payload.parameters)),
            created_at: Set(at),
            updated_at: Set(at),
        }
        .insert(&self.db)
        .await?;

        let record = OverlayRecord::from(model);
        info!(overlay_id = record.id, "Overlay created");
        self.publish(ChangeAction::Create, record.clone());
        Ok(record)
    }

    #[instrument(name = "overlay-update", skip(self, patch), fields(overlay_id = id))]
    async fn update(&self, id: i32, patch: OverlayPatch) -> StorageResult<OverlayRecord> {
        let txn = self.db.begin().await?;
        let current = Overlay::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(id))?;
        let overlay_type = current.overlay_type;
        let mut model = current.into_active_model();

        if let Some(description) = patch.short_description {
            let description = description.trim();
            if description.is_empty() {
                return Err(StorageError::InvalidPayload(DESCRIPTION_REQUIRED.into()));
            }
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(StorageError::InvalidPayload(DESCRIPTION_TOO_LONG.into()));
            }
            model.short_description = Set(description.to_string());
        }
        if let Some(name) = patch.component_name {
            let name = name.trim();
            match overlay_type {
                OverlayType::Component if name.is_empty() => {
                    return Err(StorageError::InvalidPayload(COMPONENT_NAME_REQUIRED.into()));
                }
                OverlayType::Image if !name.is_empty() => {
                    return Err(StorageError::InvalidPayload(
                        "Image overlays have no component name".into(),
                    ));
                }
                _ => model.component_name = Set(name.to_string()),
            }
        }
        if let Some(active) = patch.active {
            model.active = Set(active);
        }
        if let Some(parameters) = patch.parameters {
            model.parameters = Set(Json::Object(parameters));
        }
        model.updated_at = Set(now());

        let record = OverlayRecord::from(model.update(&txn).await?);

        for hook in &self.hooks {
            if let Err(e) = hook.on_update_execute(&txn, &record).await {
                warn!(hook = hook.name(), error = %e, "Update hook failed, rolling back");
                return Err(match e {
                    StorageError::HookFailed { .. } => e,
                    other => StorageError::HookFailed {
                        hook: hook.name().to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        }

        txn.commit().await?;
        self.publish(ChangeAction::Update, record.clone());
        Ok(record)
    }

    #[instrument(name = "overlay-delete", skip(self), fields(overlay_id = id))]
    async fn delete(&self, id: i32) -> StorageResult<()> {
        let record = self.get(id).await?.ok_or_else(|| not_found(id))?;
        let res = Overlay::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(not_found(id));
        }
        info!("Overlay deleted");
        self.publish(ChangeAction::Delete, record);
        Ok(())
    }

    fn subscribe(&self, topic: SubscriptionTopic) -> ChangeSubscription {
        self.hub.subscribe(topic)
    }

    fn asset_url(
        &self,
        record: &OverlayRecord,
        field: AssetField,
        options: &AssetUrlOptions,
    ) -> Option<String> {
        build_asset_url(record, field, options)
    }

    async fn image(&self, id: i32) -> StorageResult<Option<ImageAsset>> {
        let Some(model) = Overlay::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };
        Ok(match (model.image, model.image_mime, model.image_bytes) {
            (Some(file_name), Some(mime), Some(bytes)) => Some(ImageAsset {
                file_name,
                mime,
                bytes,
                updated_at: model.updated_at,
            }),
            _ => None,
        })
    }
}
