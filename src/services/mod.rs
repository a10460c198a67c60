pub mod api;
pub mod loader;
pub mod memory_api;
