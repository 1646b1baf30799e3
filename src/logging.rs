//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the embedding program. These helpers install one that honours
//! `RUST_LOG` (default `info`) in either text or JSON form. A host that
//! already owns the global subscriber keeps it.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, with the current span.
    Json,
}

/// What the first initialization call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscriber {
    /// Our subscriber is now the global default.
    Installed(LogFormat),
    /// Another subscriber was already set; events go there.
    External,
}

static SUBSCRIBER: OnceCell<Subscriber> = OnceCell::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn install(format: LogFormat) -> Subscriber {
    let registry = tracing_subscriber::registry().with(env_filter());
    let installed = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_thread_ids(true)
                    .with_current_span(true),
            )
            .try_init(),
    };
    match installed {
        Ok(()) => {
            info!(?format, "abispack tracing initialized");
            Subscriber::Installed(format)
        }
        Err(error) => {
            debug!(%error, "Keeping the host's tracing subscriber");
            Subscriber::External
        }
    }
}

/// Install the global subscriber in `format`.
///
/// Only the first call in a process has an effect; later calls return what
/// the first one found, whatever format they ask for.
pub fn init_tracing_with(format: LogFormat) -> Subscriber {
    *SUBSCRIBER.get_or_init(|| install(format))
}

pub fn init_tracing() -> Subscriber {
    init_tracing_with(LogFormat::Text)
}

pub fn init_tracing_json() -> Subscriber {
    init_tracing_with(LogFormat::Json)
}

/// Install the subscriber from Python; returns `True` when abispack's own
/// subscriber is the active one.
#[cfg(feature = "python-ext")]
#[pyo3::prelude::pyfunction]
#[pyo3(signature = (json = false))]
pub fn init_logging(json: bool) -> pyo3::PyResult<bool> {
    let format = if json { LogFormat::Json } else { LogFormat::Text };
    Ok(matches!(init_tracing_with(format), Subscriber::Installed(_)))
}

/// Log an error with the operation it interrupted, then yield it.
#[macro_export]
macro_rules! log_error {
    ($err:expr, $operation:expr) => {{
        let e = $err;
        tracing::error!(error = %e, operation = $operation, "abispack operation failed");
        e
    }};
}
