//! Serialization Primitives
//!
//! One global lock serializes every call into the filesystem collaborator,
//! which is not assumed to be concurrency-safe. This trades filesystem
//! throughput for correctness system-wide.
//!
//! # Ordering discipline
//! - Never acquired before user-memory validation has finished
//! - Never held across a validation fault or a block on console input
//! - Descriptor-table locks, when needed, are taken *before* this lock

use spin::{Mutex, MutexGuard};

static FILESYS: Mutex<()> = Mutex::new(());

/// Acquire the global filesystem lock.
///
/// Every call into [`crate::hal::FileSystem`] must happen while the returned
/// guard is alive.
pub fn filesys() -> MutexGuard<'static, ()> {
    FILESYS.lock()
}
