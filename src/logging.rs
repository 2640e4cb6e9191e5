//! Logging setup

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

const DEFAULT_LOG_DIRECTIVES: &str = "claimdash=info";

/// Install the stderr subscriber once. `RUST_LOG` overrides the default
/// filter; `verbose` raises it to debug.
pub fn init(verbose: bool) {
    LOGGER_INIT.get_or_init(|| {
        let default = if verbose {
            "claimdash=debug"
        } else {
            DEFAULT_LOG_DIRECTIVES
        };
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default));

        // try_init: a subscriber installed by a test harness is not an error
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init();
    });
}
