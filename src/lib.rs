//! trapgate - Trusted Syscall Boundary
//!
//! The layer of a small multiprogramming kernel that accepts requests from
//! untrusted user-mode programs, validates every piece of user-supplied data,
//! and routes each request to the matching kernel service.
//!
//! # What lives here
//! - User-memory validation for every address crossing the boundary
//! - The syscall dispatcher and its bounds-checked argument reader
//! - Per-process file-descriptor tables
//! - Parent/child exit-status propagation and `wait` synchronization
//!
//! # What does not
//! The scheduler, the virtual-memory subsystem, the filesystem, the program
//! loader, and the console are external collaborators reached through the
//! narrow traits in [`hal`]. The crate has no architecture dependencies and
//! no `unsafe`; it links into a bare-metal kernel and builds on a host for
//! testing unchanged.
//!
//! # Security Model
//! - Every stack slot, pointer, and buffer range is validated before use
//! - A failed validation terminates the offending process, never the kernel
//! - Whitelist dispatch: unknown call numbers get a defined error response
//! - No file handle outlives its owning process

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod hal;
pub mod mm;
pub mod proc;
pub mod sync;
pub mod syscall;
pub mod testing;

pub use proc::{Pid, Process};
pub use syscall::{Flow, Kernel, SyscallId, TrapFrame};
