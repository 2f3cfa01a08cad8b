//! Catalog application library
//!
//! Wires the catalog module, its storage engine and the HTTP server together.

pub mod modules;
pub mod utils;

use std::sync::Arc;

use anyhow::Context;
use catalog_db::{MemoryStorage, Storage};
use catalog_kernel::settings::{Settings, StorageEngine, StorageSettings};
use catalog_kernel::{InitCtx, ModuleRegistry};

/// Re-export commonly used types
pub use modules::*;

/// Open the configured storage engine, preloading the snapshot when one is set.
pub async fn build_storage(settings: &StorageSettings) -> anyhow::Result<Arc<dyn Storage>> {
    match settings.engine {
        StorageEngine::Memory => {
            let storage = match &settings.snapshot_path {
                Some(path) => MemoryStorage::from_snapshot(path)
                    .await
                    .with_context(|| format!("failed to load snapshot {}", path.display()))?,
                None => MemoryStorage::new(),
            };
            tracing::info!(
                engine = ?settings.engine,
                snapshot = ?settings.snapshot_path,
                "storage ready"
            );
            Ok(Arc::new(storage))
        }
    }
}

/// Registry holding every application module over `storage`
pub fn build_registry(storage: Arc<dyn Storage>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    register_all(&mut registry, storage);
    registry
}

/// Run the service until Ctrl-C: init and start modules, serve HTTP, stop modules.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let storage = build_storage(&settings.storage).await?;
    let registry = build_registry(storage);
    let ctx = InitCtx { settings };

    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    let served = catalog_http::start_server(&registry, settings).await;

    registry.stop_all().await?;
    served
}
