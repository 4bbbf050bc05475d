pub mod blob_uploader;
pub mod canvas_pool;
pub mod collage_composer;
pub mod collage_types;
pub mod config;
pub mod cover_orchestrator;
pub mod cover_renderer;
pub mod handlers_collage;
pub mod handlers_health;
pub mod image_cache;
pub mod image_loader;
pub mod image_store;
pub mod layout_selector;
pub mod scheduler;
pub mod warp_helpers;
