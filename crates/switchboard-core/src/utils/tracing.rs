use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise the
/// level is `warn`, or `debug` (minus HTTP and database noise) when `debug`
/// is true.
/// Output goes to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(debug: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug,sqlx=warn,hyper=warn,hyper_util=warn,reqwest=warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .try_init()
        .map_err(|e| Error::Configuration(format!("Failed to initialize tracing: {e}")))
}
