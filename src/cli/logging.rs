//! Diagnostic logging through `tracing`
//!
//! Operator-facing output goes through [`Console`](crate::cli::output::Console);
//! this is only for `-v` and `RUST_LOG` diagnostics on stderr.

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::{fmt::MakeWriter, EnvFilter, FmtSubscriber};

/// `-v` forces debug; otherwise `RUST_LOG`, falling back to warnings only
pub fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Subscriber writing to `writer`, styled only when `color` is set
pub fn subscriber<W>(verbose: bool, color: bool, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    FmtSubscriber::builder()
        .with_env_filter(filter(verbose))
        .with_ansi(color)
        .with_writer(writer)
        .finish()
}

/// Install the stderr subscriber for the whole process
pub fn init(verbose: bool, color: bool) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(subscriber(verbose, color, std::io::stderr))
}
