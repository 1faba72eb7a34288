//! simuran - multi-region neural recordings and batch analysis.
//!
//! Experiments are described by manifests, discovered into a
//! [`Collection`] of lazily loading [`Recording`]s, and analysed in batch
//! by [`pipeline::run`], which isolates every per-recording failure into a
//! row of the returned [`ResultTable`].

pub mod analysis;
pub mod collection;
pub mod config;
pub mod error;
pub mod formats;
pub mod models;
pub mod pipeline;
pub mod recording;
pub mod report;

#[cfg(test)]
mod test_support;

pub use analysis::{AnalysisRegistry, CancelToken, Capability, MethodContext, Requirements, ResultFields};
pub use collection::{discover, BatchDescription, Collection};
pub use config::{Config, LoggingConfig};
pub use error::{
    AnalysisError, ConcurrentModificationError, DataError, DiscoveryError, Error, RegistryError, Result,
    SchemaError,
};
pub use formats::{FnAdapter, FormatAdapter, FormatRegistry, SampleArray};
pub use models::{ChannelEntry, ChannelMap, Dtype, Experiment, Geometry, Parameters, SignalKey, SignalMeta};
pub use pipeline::{run, run_batch, ResultRow, ResultTable, RunConfig, TaskStatus};
pub use recording::{LoadState, Recording, Signal, SignalView};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Log level for the given verbosity flags.
pub fn log_level(verbose: bool, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install a compact global `tracing` subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    install_subscriber(log_level(verbose, quiet))
}

/// Install the global subscriber described by a `[logging]` config section.
pub fn init_logging_from(config: &LoggingConfig) -> anyhow::Result<()> {
    install_subscriber(config.level())
}

fn install_subscriber(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}
