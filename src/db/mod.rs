use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QuerySelect, Set, Statement,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::client::storage::{KeyValueStore, StorageError};
use crate::entities::{local_storage, prelude::LocalStorageEntry};

pub mod migrator;

/// SQLite-backed local storage: the native counterpart of the browser's
/// `localStorage` used by the app shell.
#[derive(Clone)]
pub struct LocalStorage {
    pub conn: DatabaseConnection,
}

impl LocalStorage {
    pub async fn open(db_url: &str) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");
        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        // Every pooled connection to `:memory:` would see its own database.
        opt.max_connections(if in_memory { 1 } else { 4 })
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!("Local storage opened at {}", db_url);

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = LocalStorageEntry::find_by_id(key.to_string())
            .one(&self.conn)
            .await?;
        Ok(row.map(|m| m.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let active_model = local_storage::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(chrono::Utc::now().to_rfc3339()),
        };

        LocalStorageEntry::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(local_storage::Column::Key)
                    .update_columns([
                        local_storage::Column::Value,
                        local_storage::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        LocalStorageEntry::delete_many()
            .filter(local_storage::Column::Key.eq(key))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let keys: Vec<String> = LocalStorageEntry::find()
            .select_only()
            .column(local_storage::Column::Key)
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(keys)
    }
}
