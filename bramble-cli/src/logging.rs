//! Diagnostics bootstrap for the bramble binary.
//!
//! All diagnostics flow through `tracing` to stderr, keeping stdout free
//! for command output. `RUST_LOG` controls verbosity and
//! `BRAMBLE_LOG_FORMAT` switches between compact terminal output and one
//! JSON object per event for log shippers.

use std::{env, str::FromStr};

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

const FORMAT_ENV: &str = "BRAMBLE_LOG_FORMAT";

/// Verbosity applied when `RUST_LOG` is unset: quiet dependencies, the
/// bramble crates at `info`.
const DEFAULT_FILTER: &str = "warn,bramble_core=info,bramble_cli=info";

/// Output shapes for diagnostics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
    /// Single-line output for terminals.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = SetupError;

    fn from_str(raw: &str) -> Result<Self, SetupError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(SetupError::UnknownFormat {
                requested: other.to_owned(),
            }),
        }
    }
}

/// Failures while wiring up diagnostics.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The format variable named an unsupported shape.
    #[error("BRAMBLE_LOG_FORMAT must be `compact` or `json`, not `{requested}`")]
    UnknownFormat {
        /// Value the environment supplied.
        requested: String,
    },
    /// Another subscriber already owns the global dispatcher.
    #[error("a tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Installs the global `tracing` subscriber and bridges the `log` facade
/// into it. Called once, first thing, by `main`.
///
/// # Errors
/// [`SetupError::UnknownFormat`] for an unusable `BRAMBLE_LOG_FORMAT`;
/// [`SetupError::AlreadyInstalled`] when some other subscriber won the
/// global slot.
pub fn setup() -> Result<(), SetupError> {
    let format = match env::var(FORMAT_ENV) {
        Ok(raw) => raw.parse()?,
        Err(env::VarError::NotPresent) => LogFormat::default(),
        Err(env::VarError::NotUnicode(_)) => {
            return Err(SetupError::UnknownFormat {
                requested: "<non-utf8>".to_owned(),
            });
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|_| SetupError::AlreadyInstalled)?;

    // Best-effort: dependencies speaking the `log` facade join the same
    // stream, and a pre-existing logger keeps the slot.
    let _ = LogTracer::init();
    Ok(())
}
