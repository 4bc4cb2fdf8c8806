pub mod error;
pub mod json_bridge;
pub mod profile;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use profile::{ProfileStore, default_base_dir, list_profiles, load_settings, save_settings};
pub use store::Store;
