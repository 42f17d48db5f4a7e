use super::Overlays;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.has_column("overlays", "parameters").await? {
            return Ok(());
        }
        manager
            .alter_table(
                Table::alter()
                    .table(Overlays::Table)
                    .add_column(
                        ColumnDef::new(Overlays::Parameters)
                            .json()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Overlays::Table)
                    .drop_column(Overlays::Parameters)
                    .to_owned(),
            )
            .await
    }
}
