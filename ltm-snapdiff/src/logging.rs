use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` overrides the default filter; `verbose` raises the default
/// from `info` to `debug`. Later calls are no-ops.
pub fn init(format: LogFormat, verbose: bool) {
    INIT_ONCE.call_once(|| {
        let default = if verbose {
            "ltm_snapdiff=debug,tmsh_diff_core=debug"
        } else {
            "ltm_snapdiff=info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false);
        let _ = match format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
    });
}
