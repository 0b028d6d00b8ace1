//! Process-wide log setup.
//!
//! Library code logs through the `log` macros and `tracing` spans. This wires
//! both into one `tracing_subscriber` registry writing to stderr.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::error::{DotweaveError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
}

impl LogOptions {
    fn default_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default level.
///
/// Fails if a logger or subscriber is already installed.
pub fn init_logging(options: LogOptions) -> Result<()> {
    tracing_log::LogTracer::init()
        .map_err(|e| DotweaveError::Logging(format!("log bridge: {}", e)))?;

    let filter = EnvFilter::builder()
        .with_default_directive(options.default_level().into())
        .from_env_lossy();
    let registry = Registry::default().with(filter);

    let installed = if options.json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)),
        )
    };

    installed.map_err(|e| DotweaveError::Logging(e.to_string()))?;

    log::debug!(
        "Logging initialized (verbose={}, json={})",
        options.verbose,
        options.json
    );
    Ok(())
}
