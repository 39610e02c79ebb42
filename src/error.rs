// src/error.rs
//! Error types for pool operations with advanced conversion support

use std::fmt;

/// Errors that can occur during pool and ring-buffer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Non-blocking read found nothing available (L1 miss, L2 empty).
    Empty,
    /// Non-blocking write found no room (L1 full, L2 full).
    Full,
    /// A blocking read or write exceeded its configured timeout.
    DeadlineExceeded,
    /// The ring buffer (or the pool built on it) has been closed.
    ///
    /// Sticky: once set, every subsequent operation returns this.
    Eof,
    /// Pool construction was attempted with an inconsistent configuration.
    InvalidConfig(String),
    /// The user-supplied allocator produced a value that fails the handle check.
    InvalidAllocator,
    /// Caller attempted to `put` the sentinel "empty" value back into the pool.
    InvalidObject,
    /// L2 is already at `hard_limit`; growth was requested but could not proceed.
    GrowthBlocked,
    /// The pool has been closed; this operation cannot proceed.
    Closed,
}

impl PoolError {
    /// Terminal errors are sticky and propagate to the caller; soft protocol
    /// conditions (`Empty`, `Full`, `GrowthBlocked`) never escape the core on
    /// their own and instead drive internal control flow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PoolError::Eof
                | PoolError::InvalidConfig(_)
                | PoolError::InvalidAllocator
                | PoolError::InvalidObject
                | PoolError::Closed
        )
    }

    /// `true` for protocol conditions that drive internal control flow and
    /// never escape the core to a caller — the facade converts these into
    /// the sentinel empty value instead of returning them. Notably this
    /// excludes [`PoolError::DeadlineExceeded`]: a timeout is surfaced to
    /// whichever caller configured it, even though it is also non-sticky.
    pub fn is_soft(&self) -> bool {
        matches!(self, PoolError::Empty | PoolError::Full | PoolError::GrowthBlocked)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "pool/ring buffer is empty"),
            Self::Full => write!(f, "pool/ring buffer is full"),
            Self::DeadlineExceeded => write!(f, "blocking operation exceeded its deadline"),
            Self::Eof => write!(f, "ring buffer is closed"),
            Self::InvalidConfig(msg) => write!(f, "invalid pool configuration: {}", msg),
            Self::InvalidAllocator => write!(f, "allocator produced an invalid handle"),
            Self::InvalidObject => write!(f, "attempted to store the sentinel empty value"),
            Self::GrowthBlocked => write!(f, "L2 capacity is pinned at the hard limit"),
            Self::Closed => write!(f, "pool is closed"),
        }
    }
}

impl std::error::Error for PoolError {}

// ============================================================================
// ADVANCED ERROR CONVERSION - makes the pool usable with any error type
// ============================================================================

/// Convert [`PoolError`] to [`std::io::Error`].
impl From<PoolError> for std::io::Error {
    fn from(err: PoolError) -> Self {
        use std::io::ErrorKind;
        match err {
            PoolError::Full => std::io::Error::new(ErrorKind::WriteZero, err),
            PoolError::Empty => std::io::Error::new(ErrorKind::WouldBlock, err),
            PoolError::Eof | PoolError::Closed => {
                std::io::Error::new(ErrorKind::UnexpectedEof, err)
            }
            PoolError::DeadlineExceeded => std::io::Error::new(ErrorKind::TimedOut, err),
            _ => std::io::Error::other(err),
        }
    }
}

/// Convert [`std::io::Error`] to [`PoolError`].
impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::WouldBlock => PoolError::Empty,
            ErrorKind::TimedOut => PoolError::DeadlineExceeded,
            ErrorKind::UnexpectedEof => PoolError::Eof,
            _ => PoolError::InvalidConfig(err.to_string()),
        }
    }
}

/// Convert [`PoolError`] to `anyhow::Error`.
#[cfg(feature = "anyhow")]
impl From<PoolError> for anyhow::Error {
    fn from(err: PoolError) -> Self {
        anyhow::anyhow!("{}", err)
    }
}

/// Allow using `?` with `anyhow::Error` inside pool-facing code.
#[cfg(feature = "anyhow")]
impl From<anyhow::Error> for PoolError {
    fn from(err: anyhow::Error) -> Self {
        PoolError::InvalidConfig(err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for pool operations.
///
/// Note: when bridging to other `Result` types (like `anyhow::Result`),
/// either qualify the type (`pool::Result<T>`) or use the conversion traits.
pub type Result<T> = std::result::Result<T, PoolError>;

// ============================================================================
// EXTENSION TRAIT FOR EASY CONVERSION
// ============================================================================

/// Extension trait for converting `Result<T, PoolError>` into other error types.
pub trait ResultExt<T> {
    /// Convert to `anyhow::Result`.
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T>;

    /// Convert to `std::io::Result`.
    fn into_io(self) -> std::io::Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| e.into())
    }

    fn into_io(self) -> std::io::Result<T> {
        self.map_err(|e| e.into())
    }
}

// ============================================================================
// HELPER MACROS FOR ERROR HANDLING
// ============================================================================

/// Convenience macro for converting pool operations to any `Result` type.
///
/// Requires an explicit target error type as the second argument so the
/// conversion is unambiguous — necessary because error types like
/// `anyhow::Error` have multiple overlapping `From` impls.
#[macro_export]
macro_rules! pool_op {
    ($expr:expr, $target:ty) => {
        $expr.map_err(|e: $crate::PoolError| -> $target { e.into() })
    };
    ($expr:expr) => {
        $expr.map_err(|e: $crate::PoolError| -> std::io::Error { e.into() })
    };
}

/// Try a pool operation with automatic error conversion.
#[macro_export]
macro_rules! pool_try {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => return Err(e.into()),
        }
    };
}
