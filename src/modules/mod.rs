pub mod catalog;

use std::sync::Arc;

use catalog_db::Storage;
use catalog_kernel::ModuleRegistry;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, storage: Arc<dyn Storage>) {
    registry.register(catalog::create_module(storage));
}
