use async_trait::async_trait;
use overlay_error::StorageResult;
use overlay_models::{
    domain::prelude::OverlayRecord,
    entities::prelude::{Overlay, OverlayColumn},
    RecordHook,
};
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use tracing::{debug, instrument};

/// Keeps at most one overlay active.
///
/// When an update leaves a record active, every other active record is
/// switched off on the same transaction. Other rows are left alone
/// otherwise, so re-activating the sole active record changes nothing else
/// and deleting it promotes nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleActiveHook;

#[async_trait]
impl RecordHook for SingleActiveHook {
    fn name(&self) -> &'static str {
        "single-active"
    }

    #[instrument(name = "hook-single-active", skip_all, fields(overlay_id = record.id))]
    async fn on_update_execute(
        &self,
        txn: &DatabaseTransaction,
        record: &OverlayRecord,
    ) -> StorageResult<()> {
        if !record.active {
            return Ok(());
        }

        let res = Overlay::update_many()
            .col_expr(OverlayColumn::Active, Expr::value(false))
            .filter(OverlayColumn::Id.ne(record.id))
            .filter(OverlayColumn::Active.eq(true))
            .exec(txn)
            .await?;

        if res.rows_affected > 0 {
            debug!(deactivated = res.rows_affected, "Deactivated previously active overlays");
        }
        Ok(())
    }
}
