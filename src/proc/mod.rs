//! Process Records and Lifecycle
//!
//! One [`Process`] record per running process: its descriptor table, its
//! child-status arena, and a weak link to its parent's arena. The record is
//! created by the loader when a process is spawned, mutated by the syscalls
//! the process issues, and torn down by [`Process::terminate`].
//!
//! # Lifetime rules
//! - A child holds only a `Weak` reference to its parent's child table, so a
//!   parent that exits first simply disappears from under it
//! - The child table itself is shared as an `Arc` between the parent and the
//!   lifecycle machinery; it is the one synchronization point between them
//! - Every file handle a process still holds is closed at teardown, whether
//!   or not the program closed its descriptors

mod children;
mod fdtable;

pub use children::ChildTable;
pub use fdtable::{FdTable, CONSOLE_INPUT_FD, CONSOLE_OUTPUT_FD, FIRST_FILE_FD};

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::fmt;

use spin::Mutex;

use crate::hal::{FileSystem, Scheduler};
use crate::sync;

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kernel-side record for one running process.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    name: String,
    /// Parent's child-status arena; dead once the parent has exited.
    parent: Weak<ChildTable>,
    /// Arena for this process's own children.
    children: Arc<ChildTable>,
    files: Mutex<FdTable>,
    exit_code: Mutex<Option<i32>>,
}

impl Process {
    /// Create a record for a process with no parent (the initial process).
    pub fn new_root(pid: Pid, name: &str) -> Arc<Self> {
        Arc::new(Self {
            pid,
            name: String::from(name),
            parent: Weak::new(),
            children: Arc::new(ChildTable::new(pid)),
            files: Mutex::new(FdTable::new()),
            exit_code: Mutex::new(None),
        })
    }

    /// Create a record for a child of `parent`, registering it as a running
    /// child in the parent's arena.
    ///
    /// The loader calls this before the child first runs, so the child's
    /// exit always finds its status record in place.
    pub fn new_child(pid: Pid, name: &str, parent: &Process) -> Arc<Self> {
        parent.children.register(pid);
        Arc::new(Self {
            pid,
            name: String::from(name),
            parent: Arc::downgrade(&parent.children),
            children: Arc::new(ChildTable::new(pid)),
            files: Mutex::new(FdTable::new()),
            exit_code: Mutex::new(None),
        })
    }

    /// This process's id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Program name, as the loader recorded it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor table.
    pub fn files(&self) -> &Mutex<FdTable> {
        &self.files
    }

    /// Arena of this process's children.
    pub fn children(&self) -> &Arc<ChildTable> {
        &self.children
    }

    /// Exit code, once the process has exited.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    /// Tear the process down: record its exit code, propagate it to the
    /// parent's status record (waking the parent if it is waiting for this
    /// pid), discard its own unreaped children, and close every descriptor
    /// it still holds.
    ///
    /// Shared by the `exit` syscall and the fatal path of the memory
    /// validator (which uses code -1).
    pub fn terminate(&self, code: i32, fs: &dyn FileSystem, sched: &dyn Scheduler) {
        log::info!("{}: exit({})", self.name, code);
        *self.exit_code.lock() = Some(code);

        if let Some(parent) = self.parent.upgrade() {
            parent.post_exit(self.pid, code, sched);
        }
        self.children.discard_all();

        let mut files = self.files.lock();
        if !files.is_empty() {
            let _fs_guard = sync::filesys();
            files.close_all(fs);
        }
    }
}
