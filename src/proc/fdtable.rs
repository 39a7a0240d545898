//! Per-Process Descriptor Table
//!
//! Maps small integer descriptors to open-file handles. One table per
//! process, guarded by the owning [`Process`](crate::Process)'s lock.
//!
//! # Design
//! - Linear scan over an owned `Vec`; descriptor counts here are small
//! - Descriptor numbers are allocated from a monotonic counter and never
//!   reused while the table lives, so a stale fd can never alias a newer file
//! - Descriptors 0 and 1 are reserved for the console and never appear here

use alloc::vec::Vec;

use crate::hal::{FileHandle, FileSystem};

/// Reserved descriptor: console input.
pub const CONSOLE_INPUT_FD: i32 = 0;
/// Reserved descriptor: console output.
pub const CONSOLE_OUTPUT_FD: i32 = 1;
/// First descriptor number handed out for files.
pub const FIRST_FILE_FD: i32 = 2;

/// One open file owned by a process.
#[derive(Debug)]
struct OpenFile {
    fd: i32,
    handle: FileHandle,
}

/// Descriptor table for one process.
#[derive(Debug)]
pub struct FdTable {
    entries: Vec<OpenFile>,
    next_fd: i32,
}

impl FdTable {
    /// Create an empty table. The first allocation yields [`FIRST_FILE_FD`].
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_fd: FIRST_FILE_FD,
        }
    }

    /// Hand out the next unused descriptor number.
    pub fn allocate(&mut self) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }

    /// Record `handle` under `fd`.
    ///
    /// `fd` must come from [`allocate`](Self::allocate); the monotonic
    /// counter guarantees it is not already present.
    pub fn insert(&mut self, fd: i32, handle: FileHandle) {
        debug_assert!(self.lookup(fd).is_none(), "descriptor {fd} already live");
        self.entries.push(OpenFile { fd, handle });
    }

    /// Look up the handle behind `fd`, if any.
    pub fn lookup(&self, fd: i32) -> Option<FileHandle> {
        self.entries.iter().find(|e| e.fd == fd).map(|e| e.handle)
    }

    /// Remove `fd`'s entry and return its handle.
    ///
    /// Removing an absent descriptor is a no-op, not an error; `close` on a
    /// junk fd relies on this.
    pub fn remove(&mut self, fd: i32) -> Option<FileHandle> {
        let idx = self.entries.iter().position(|e| e.fd == fd)?;
        Some(self.entries.swap_remove(idx).handle)
    }

    /// Close every remaining entry, leaving the table empty.
    ///
    /// Used exactly once, at process teardown, so no file handle outlives
    /// its owner no matter what the program closed. The caller holds the
    /// global filesystem lock.
    pub fn close_all(&mut self, fs: &dyn FileSystem) {
        for entry in self.entries.drain(..) {
            fs.close(entry.handle);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
