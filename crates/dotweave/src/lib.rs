pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod merge;
pub mod platform;
pub mod reconcile;
pub mod sanitize;
pub mod state;
pub mod storage;
pub mod template;

pub use config::{load_config, Config, Entry};
pub use error::{ConfigError, DotweaveError, Result, StorageError, TemplateError};
pub use logging::{init_logging, LogOptions};
pub use merge::{three_way_merge, MergeResult};
pub use platform::Platform;
pub use reconcile::{
    reconcile_config, CancelToken, ReconcileOptions, ReconcileSummary, Reconciler,
};
pub use state::{MemoryRenderStore, RenderRecord, RenderStore, SqliteRenderStore};
pub use template::TemplateEngine;
