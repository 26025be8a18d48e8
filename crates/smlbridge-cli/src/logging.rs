//! Tracing setup.

use smlbridge_core::config::env_vars;

// targets match by prefix, so `smlbridge` covers every workspace crate
const DEFAULT_FILTER: &str = "smlbridge=info,sml2mqtt=info";
const VERBOSE_FILTER: &str = "smlbridge=debug,sml2mqtt=debug";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the defaults. Set `SMLBRIDGE_LOG_JSON=true` for
/// JSON lines.
pub fn init(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}
