use std::sync::Arc;

pub use caja_core::{LedgerStore, LedgerTx, StorageError};
pub use caja_memory::InMemoryStorage;
pub use caja_postgres::PostgresStorage;
pub use caja_sqlite::SqliteStorage;

use crate::config::{StorageBackend, StorageConfig};

/// Opens the backend named in the configuration. Schemas are created if missing.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn LedgerStore>, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageBackend::Sqlite => {
            tracing::info!(path = %config.path, "Using SQLite storage");
            Ok(Arc::new(SqliteStorage::new(&config.path)?))
        }
        StorageBackend::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StorageError::Other("storage.url is required for the postgres backend".to_string()))?;
            tracing::info!("Using PostgreSQL storage");
            Ok(Arc::new(PostgresStorage::new(url)?))
        }
    }
}
