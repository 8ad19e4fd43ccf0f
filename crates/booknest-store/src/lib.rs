pub mod memory;
pub mod surreal;

pub use memory::MemoryStore;
pub use surreal::SurrealStore;

use std::sync::Arc;

use booknest_core::config::{DatabaseBackend, DatabaseConfig};
use booknest_core::{Result, Store};
use tracing::info;

/// Opens the backend selected in configuration.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        DatabaseBackend::Memory => {
            info!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseBackend::SurrealDb => Ok(Arc::new(SurrealStore::connect(&config.surrealdb).await?)),
    }
}
