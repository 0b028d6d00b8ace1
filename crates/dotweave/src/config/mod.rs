pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, validate_path};
pub use schema::{expand_home, Config, Entry, CONFIG_VERSION};
