//! Trap Frame and Argument Fetch
//!
//! The trap glue hands the dispatcher the user stack pointer it captured at
//! trap time. Everything read relative to it goes through [`ArgReader`],
//! which validates each slot's address before the slot is read - no raw
//! offset arithmetic on the stack pointer happens anywhere else.

use crate::hal::AddressSpace;
use crate::mm::VirtAddr;

use super::validate::{read_word, Access, Fault};
use super::WORD_SIZE;

/// CPU state captured when a user process traps into the kernel.
///
/// Only the piece the boundary layer needs: the user stack pointer the call
/// number and arguments are read from. Register file and return address stay
/// with the architecture-specific glue.
#[derive(Clone, Copy, Debug)]
pub struct TrapFrame {
    stack_pointer: VirtAddr,
}

impl TrapFrame {
    /// Capture a frame around the user stack pointer at trap time.
    pub const fn new(stack_pointer: VirtAddr) -> Self {
        Self { stack_pointer }
    }

    /// The user stack pointer.
    pub const fn stack_pointer(self) -> VirtAddr {
        self.stack_pointer
    }
}

/// Bounds-checked reader for syscall slots on the user stack.
pub(super) struct ArgReader<'a> {
    mem: &'a dyn AddressSpace,
    sp: VirtAddr,
}

impl<'a> ArgReader<'a> {
    pub(super) fn new(mem: &'a dyn AddressSpace, frame: &TrapFrame) -> Self {
        Self {
            mem,
            sp: frame.stack_pointer(),
        }
    }

    /// Validate and read the call-number slot (slot 0, at the stack pointer
    /// itself).
    pub(super) fn call_number(&self) -> Result<u64, Fault> {
        read_word(self.mem, self.sp)
    }

    /// Validate and read argument slot `n` (0-based; slot n lives at
    /// `sp + (n + 1) * WORD_SIZE`).
    pub(super) fn arg(&self, n: usize) -> Result<u64, Fault> {
        let offset = (n + 1) * WORD_SIZE;
        let addr = self.sp.checked_add(offset).ok_or(Fault {
            addr: self.sp,
            access: Access::READ,
        })?;
        read_word(self.mem, addr)
    }
}
