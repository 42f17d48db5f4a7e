use super::Overlays;
use sea_orm_migration::{prelude::*, schema::pk_auto};
use tracing::{info, instrument};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    #[instrument(name = "migrate-create-overlays", skip_all)]
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(create_overlays_table()).await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_overlays_active_updated_at")
                    .table(Overlays::Table)
                    .col(Overlays::Active)
                    .col(Overlays::UpdatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        info!("Created table `overlays`");
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Overlays::Table).if_exists().to_owned())
            .await
    }
}

fn create_overlays_table() -> TableCreateStatement {
    Table::create()
        .table(Overlays::Table)
        .if_not_exists()
        .col(pk_auto(Overlays::Id))
        .col(
            ColumnDef::new(Overlays::ShortDescription)
                .string_len(256)
                .not_null()
                .comment("Short description shown in the admin list"),
        )
        .col(
            ColumnDef::new(Overlays::Type)
                .string_len(32)
                .not_null()
                .comment("image | component"),
        )
        .col(
            ColumnDef::new(Overlays::ComponentName)
                .string_len(128)
                .not_null()
                .default("")
                .comment("Widget name for component overlays"),
        )
        .col(
            ColumnDef::new(Overlays::Image)
                .string_len(255)
                .null()
                .comment("Image file name"),
        )
        .col(
            ColumnDef::new(Overlays::ImageMime)
                .string_len(64)
                .null()
                .comment("Image MIME type"),
        )
        .col(
            ColumnDef::new(Overlays::ImageBytes)
                .binary()
                .null()
                .comment("Image bytes (BLOB)"),
        )
        .col(
            ColumnDef::new(Overlays::Active)
                .boolean()
                .not_null()
                .default(false)
                .comment("At most one row is active"),
        )
        .col(
            ColumnDef::new(Overlays::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .comment("Created at"),
        )
        .col(
            ColumnDef::new(Overlays::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .comment("Updated at"),
        )
        .to_owned()
}
