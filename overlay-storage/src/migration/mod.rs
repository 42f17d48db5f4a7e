pub use sea_orm_migration::prelude::*;

mod m20250813_000001_create_overlays;
mod m20251112_000002_add_overlay_parameters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250813_000001_create_overlays::Migration),
            Box::new(m20251112_000002_add_overlay_parameters::Migration),
        ]
    }
}

/// Identifiers of the overlays table.
#[derive(DeriveIden)]
pub(crate) enum Overlays {
    Table,
    Id,
    ShortDescription,
    Type,
    ComponentName,
    Image,
    ImageMime,
    ImageBytes,
    Active,
    Parameters,
    CreatedAt,
    UpdatedAt,
}
