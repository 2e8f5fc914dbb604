//! Error types for the bramble core library.
//!
//! Defines the error enum exposed by the public API, a stable code surface
//! for machine consumers, and a convenient result alias.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Stable codes describing [`CoreError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CoreErrorCode {
    /// An underlying file operation failed.
    Io,
    /// A fixed-size table reached its capacity.
    Capacity,
    /// An arena byte budget was exhausted.
    OutOfMemory,
    /// A per-node width or memory limit was exceeded; recoverable by
    /// deferring the vertex.
    BudgetExceeded,
    /// An internal invariant was violated; indicates a bug.
    Invariant,
}

impl CoreErrorCode {
    /// Return the stable machine-readable representation of this code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Io => "BRAMBLE_IO",
            Self::Capacity => "BRAMBLE_CAPACITY",
            Self::OutOfMemory => "BRAMBLE_OUT_OF_MEMORY",
            Self::BudgetExceeded => "BRAMBLE_BUDGET_EXCEEDED",
            Self::Invariant => "BRAMBLE_INVARIANT",
        }
    }
}

impl fmt::Display for CoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced by tree construction, storage and partitioning.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    /// An underlying file operation failed.
    #[error("i/o on `{path}` failed: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The node table reached its fixed capacity.
    #[error("node table is full ({cap} nodes)")]
    Capacity {
        /// Configured maximum node count.
        cap: usize,
    },
    /// An arena byte budget was exhausted.
    #[error("arena budget of {budget} bytes exhausted in the {table} table")]
    OutOfMemory {
        /// Which packed table ran out.
        table: &'static str,
        /// Configured budget in bytes.
        budget: usize,
    },
    /// A single node exceeded its width or memory bound. The caller may
    /// delete the node and defer its vertex.
    #[error("node budget of {max_len} entries exceeded")]
    BudgetExceeded {
        /// Bound that was crossed.
        max_len: usize,
    },
    /// An internal invariant was violated.
    #[error("invariant violated: {detail}")]
    Invariant {
        /// Human-readable description of the broken invariant.
        detail: String,
    },
}

impl CoreError {
    /// Retrieve the stable [`CoreErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> CoreErrorCode {
        match self {
            Self::Io { .. } => CoreErrorCode::Io,
            Self::Capacity { .. } => CoreErrorCode::Capacity,
            Self::OutOfMemory { .. } => CoreErrorCode::OutOfMemory,
            Self::BudgetExceeded { .. } => CoreErrorCode::BudgetExceeded,
            Self::Invariant { .. } => CoreErrorCode::Invariant,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = std::result::Result<T, CoreError>;
