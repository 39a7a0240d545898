//! System Call Interface
//!
//! The single entry point user-mode requests trap into, plus the validation
//! machinery that gatekeeps every user-supplied address.
//!
//! # Security Model
//! - Whitelist dispatch: only the call numbers below exist; anything else is
//!   a defined error return, never undefined behavior
//! - Every stack slot is validated before it is read, and every pointer
//!   argument is validated before it is dereferenced
//! - A failed validation terminates the offending process with exit code -1;
//!   it is not a recoverable error
//!
//! # ABI
//! The call number sits in the word at the user stack pointer at trap time;
//! arguments occupy the next consecutive words, a fixed count per call. The
//! result is handed back to the trap glue as a [`Flow`] value.

mod frame;
mod handler;
mod validate;

pub use frame::TrapFrame;
pub use handler::Kernel;
pub use validate::{Access, Fault};

/// Width of one user stack slot in bytes.
pub const WORD_SIZE: usize = 8;

/// Sentinel written to the result slot on any non-fatal failure.
pub const FAILURE: i64 = -1;

/// Longest command line / path `exec`, `create`, `remove`, and `open`
/// accept, NUL terminator included.
pub const MAX_COMMAND_LINE: usize = 256;

/// System call numbers.
///
/// Fixed ABI; renumbering breaks every user program.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u64)]
pub enum SyscallId {
    Halt = 0,
    Exit = 1,
    Exec = 2,
    Wait = 3,
    Create = 4,
    Remove = 5,
    Open = 6,
    Filesize = 7,
    Read = 8,
    Write = 9,
    Seek = 10,
    Tell = 11,
    Close = 12,
}

impl SyscallId {
    /// Decode a call-number word. `None` for anything outside the whitelist.
    pub fn from_word(word: u64) -> Option<Self> {
        Some(match word {
            0 => Self::Halt,
            1 => Self::Exit,
            2 => Self::Exec,
            3 => Self::Wait,
            4 => Self::Create,
            5 => Self::Remove,
            6 => Self::Open,
            7 => Self::Filesize,
            8 => Self::Read,
            9 => Self::Write,
            10 => Self::Seek,
            11 => Self::Tell,
            12 => Self::Close,
            _ => return None,
        })
    }

    /// Number of argument slots following the call-number slot.
    pub const fn arg_count(self) -> usize {
        match self {
            Self::Halt => 0,
            Self::Exit | Self::Exec | Self::Wait | Self::Remove | Self::Open => 1,
            Self::Filesize | Self::Tell | Self::Close => 1,
            Self::Create | Self::Seek => 2,
            Self::Read | Self::Write => 3,
        }
    }
}

/// What the trap glue should do after a syscall has been handled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flow {
    /// Write the value to the caller's return-value slot and resume it.
    Return(i64),
    /// The calling process no longer exists; schedule something else.
    Terminated,
    /// Stop the machine.
    Halt,
}
