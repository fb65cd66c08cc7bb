//! File locking primitives for the beads system.
//!
//! Two kinds of lock are needed: a plain exclusive advisory lock over the
//! store file ([`file_lock::StoreLock`]), and a PID-tracking lockfile with
//! stale-owner reclamation for daemon startup and auto-start serialization
//! ([`pid_lock::PidLock`]).

pub mod error;
pub mod file_lock;
pub mod pid_lock;

pub use error::{LockError, Result};
pub use file_lock::StoreLock;
pub use pid_lock::PidLock;
