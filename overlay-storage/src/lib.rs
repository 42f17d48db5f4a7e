mod migration;
mod sql;

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use overlay_error::{init::InitContextError, storage::StorageError, OVResult};
use overlay_models::{
    settings::{Settings, Sqlite},
    DbManager,
};
use sea_orm::DatabaseConnection;
use sql::sqlite;
use std::sync::Arc;
use tracing::{info, instrument};

/// Open the database described by `config` and bring its schema up to date.
pub async fn connect(config: &Sqlite) -> OVResult<DatabaseConnection> {
    let db = sqlite::init_db(config).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Database manager owning the SQLite pool
pub struct OVDbManager {
    db_conn: Option<DatabaseConnection>,
}

#[async_trait]
impl DbManager for OVDbManager {
    #[inline]
    #[instrument(name = "init-db-manager", skip_all)]
    async fn init(settings: &Settings) -> OVResult<Arc<Self>, InitContextError> {
        let db_conn = {
            let db = sqlite::init_db(&settings.db.sqlite).await.map_err(|e| {
                InitContextError::Primitive(format!("Failed to init SQLite database: {e}"))
            })?;

            Migrator::up(&db, None).await.map_err(|e| {
                InitContextError::Primitive(format!("Failed to migrate SQLite database: {e}"))
            })?;

            db
        };

        let db_manager = Arc::new(OVDbManager {
            db_conn: Some(db_conn),
        });

        info!("Database manager initialized successfully");
        Ok(db_manager)
    }

    #[inline]
    fn get_connection(&self) -> OVResult<DatabaseConnection, StorageError> {
        self.db_conn
            .as_ref()
            .ok_or(StorageError::StorageUnavailable)
            .cloned()
    }

    #[inline]
    #[instrument(name = "db_close", skip_all)]
    async fn close(&self) -> OVResult<()> {
        info!("🛑 Closing database connections...");
        if let Some(db) = &self.db_conn {
            db.clone().close().await?;
        }
        info!("✅ Database connections closed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, DbBackend, Statement};

    #[tokio::test]
    async fn test_memory_database_is_migrated() {
        let db = connect(&Sqlite::memory()).await.unwrap();
        let row = db
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS n FROM overlays WHERE active = 1".to_string(),
            ))
            .await
            .unwrap()
            .unwrap();
        let n: i64 = row.try_get("", "n").unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = connect(&Sqlite::memory()).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let pending = Migrator::get_pending_migrations(&db).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_manager_lifecycle() {
        let settings = Settings::from_inner(overlay_models::settings::Inner {
            db: overlay_models::settings::Db {
                sqlite: Sqlite::memory(),
            },
            ..Default::default()
        });
        let manager = OVDbManager::init(&settings).await.unwrap();
        assert!(manager.get_connection().is_ok());
        manager.close().await.unwrap();
    }
}
