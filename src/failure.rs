//! The failure and result types of this crate.
//!
//! The table supports fallible allocation. Any operation which may allocate
//! memory comes in two versions:
//!
//! - A fallible `try_xxx` version, which returns a `Result` with [`Failure`]
//!   as the error type.
//! - A convenience `xxx` version, which invokes the `try_xxx` version and
//!   panics in case of error.
//!
//! Out-of-range slot indices and inconsistent hash/equality strategies are
//! caller bugs, not data conditions; those are reported by panicking, never
//! through [`Failure`].

use core::fmt;

/// Failure type for operations that allocate.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Failure {
    /// The requested number of slots cannot be represented.
    CapacityOverflow,
    /// The allocator could not provide the backing slot array.
    OutOfMemory,
}

impl core::error::Error for Failure {}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result type for operations that allocate.
pub type Result<T> = core::result::Result<T, Failure>;
