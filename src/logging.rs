//! Tracing setup for the `autotidy` binary. The library never installs a
//! subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "autotidy=info";

/// How chatty the binary should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Verbosity::Verbose,
            (false, true) => Verbosity::Quiet,
            (false, false) => Verbosity::Normal,
        }
    }

    fn default_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "autotidy=warn",
            Verbosity::Normal => DEFAULT_LOG_FILTER,
            Verbosity::Verbose => "autotidy=debug",
        }
    }
}

/// Installs a stderr fmt layer filtered by `RUST_LOG`, or by `verbosity`
/// when `RUST_LOG` is unset.
///
/// Returns an error message if a global subscriber is already installed.
pub fn init_logging(verbosity: Verbosity) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}
