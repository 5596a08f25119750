//! Tracing setup and re-exports.
//!
//! Binaries call [`init`] once at startup. Library modules import the
//! macros through [`prelude`]:
//!
//! ```ignore
//! use crate::tracing::prelude::*;
//! ```

use ::tracing_subscriber::EnvFilter;
use ::tracing_subscriber::layer::SubscriberExt;
use ::tracing_subscriber::util::SubscriberInitExt;

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

/// Initialize the global subscriber.
///
/// Filtering comes from `SLUICE_LOG` (default `info`). Output goes to
/// stderr with local wall-clock timestamps; setting `SLUICE_LOG_JOURNALD`
/// adds a journald layer when the socket is available.
pub fn init() {
    let filter = EnvFilter::try_from_env("SLUICE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let timer = ::tracing_subscriber::fmt::time::LocalTime::new(time::macros::format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let fmt_layer = ::tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer);

    let registry = ::tracing_subscriber::registry().with(filter).with(fmt_layer);

    if std::env::var_os("SLUICE_LOG_JOURNALD").is_some() {
        match ::tracing_journald::layer() {
            Ok(journald) => {
                registry.with(journald).init();
            }
            Err(err) => {
                registry.init();
                ::tracing::warn!(error = %err, "journald unavailable, logging to stderr only");
            }
        }
    } else {
        registry.init();
    }
}
