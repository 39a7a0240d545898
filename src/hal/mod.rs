//! Collaborator Interfaces
//!
//! The boundary layer touches five external subsystems: the current
//! process's page tables, the filesystem, the console, the program loader,
//! and the scheduler. Each is reached through a narrow object-safe trait so
//! the crate carries no architecture or storage code of its own.
//!
//! # Security Model
//! - `AddressSpace` only answers questions about the *current* process's
//!   mappings; no cross-process access is expressible through it
//! - `FileSystem` is not assumed concurrency-safe; every call into it must
//!   run under the global lock in [`crate::sync`]
//! - File objects are named by opaque [`FileHandle`] tokens that never leave
//!   kernel space

use crate::mm::VirtAddr;
use crate::proc::Pid;

/// Opaque token naming an open file object inside the filesystem
/// collaborator.
///
/// The boundary layer never interprets the value; it only stores it in
/// descriptor tables and hands it back on read/write/seek/tell/close.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct FileHandle(pub u64);

/// The current process's virtual address space, as seen by the memory
/// validator.
///
/// `None`/`false` answers mean the access would take a page fault.
pub trait AddressSpace: Send + Sync {
    /// Whether `addr` is mapped to a physical page for the current process.
    fn is_mapped(&self, addr: VirtAddr) -> bool;

    /// Probe-read a single byte.
    fn read_byte(&self, addr: VirtAddr) -> Option<u8>;

    /// Probe-write a single byte. Returns `false` if the write would fault.
    fn write_byte(&self, addr: VirtAddr, byte: u8) -> bool;
}

/// The storage engine.
///
/// Handles returned by [`open`](FileSystem::open) stay valid until
/// [`close`](FileSystem::close). Read/write/size return the transferred
/// byte count or size, or -1 on failure.
pub trait FileSystem: Send + Sync {
    /// Create a file of `size` bytes. `false` if it already exists or
    /// creation is denied.
    fn create(&self, path: &str, size: u64) -> bool;

    /// Remove a file by name. `false` if no such file.
    fn remove(&self, path: &str) -> bool;

    /// Open an existing file. `None` if no such file.
    fn open(&self, path: &str) -> Option<FileHandle>;

    /// Read from the handle's current position.
    fn read(&self, handle: FileHandle, buf: &mut [u8]) -> i64;

    /// Write at the handle's current position.
    fn write(&self, handle: FileHandle, buf: &[u8]) -> i64;

    /// Total file length in bytes, or -1 for a dead handle.
    fn size(&self, handle: FileHandle) -> i64;

    /// Move the handle's position to `pos`.
    fn seek(&self, handle: FileHandle, pos: u64);

    /// Current position of the handle, or -1 for a dead handle.
    fn tell(&self, handle: FileHandle) -> i64;

    /// Release the handle.
    fn close(&self, handle: FileHandle);
}

/// Raw console input/output behind the two reserved descriptors.
pub trait Console: Send + Sync {
    /// Read one character, blocking until one is available.
    fn read_char(&self) -> u8;

    /// Write a run of bytes to the console output.
    fn write_bytes(&self, bytes: &[u8]);
}

/// The program loader: starts a new process from a command line.
///
/// The loader is responsible for building the child's [`crate::Process`]
/// record via [`crate::Process::new_child`] before the child first runs, so
/// the parent's child-status record exists before the child can exit.
pub trait Spawner: Send + Sync {
    /// Start a new process. `None` if loading fails.
    fn spawn(&self, command_line: &str) -> Option<Pid>;
}

/// The scheduler's blocking channel, used by `wait`.
///
/// The protocol is register-then-block: a waiter calls
/// [`prepare_block`](Scheduler::prepare_block) while still holding the lock
/// that guards the condition it is about to sleep on, releases the lock, and
/// then calls [`block`](Scheduler::block). A [`wake`](Scheduler::wake) that
/// arrives any time after `prepare_block` makes the matching `block` return
/// immediately, so no wakeup can be lost in the unlock-to-block window.
/// Wakeups may be spurious; callers re-check their condition after every
/// return from `block`.
pub trait Scheduler: Send + Sync {
    /// Register `pid`'s intent to block. Clears any stale wake token.
    fn prepare_block(&self, pid: Pid);

    /// Suspend `pid` until a wake token arrives (or one already has since
    /// the matching `prepare_block`).
    fn block(&self, pid: Pid);

    /// Make `pid` runnable, delivering a wake token.
    fn wake(&self, pid: Pid);
}
