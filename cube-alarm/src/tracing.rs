//! Logging setup and the crate-wide tracing prelude.
//!
//! Modules pull the macros in with `use crate::tracing::prelude::*;` so the
//! logging backend can change without touching call sites.

use time::macros::format_description;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Logs go to journald when the process was started by systemd (detected
/// through `JOURNAL_STREAM`), otherwise to stdout with local timestamps.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_journald_or_stdout() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if std::env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable, logging to stdout: {e}"),
        }
    }

    let timer = fmt::time::LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(timer))
        .init();
}
