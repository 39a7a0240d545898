//! User-Memory Validation
//!
//! Gatekeeps every address that crosses the user/kernel boundary. An address
//! is safe only if all three of the following hold:
//! 1. it falls inside the architectural user window,
//! 2. the current process's page tables map it, and
//! 3. a byte-level probe of the address succeeds.
//!
//! Checking the window alone is not enough: a validly-ranged address can
//! still be unmapped. Ranges are validated at every address, not just the
//! endpoints, because an interior page of a multi-page buffer can be
//! unmapped while both ends are fine.
//!
//! A failed validation is fatal to the *process*, never to the kernel: the
//! dispatcher converts the [`Fault`] into a forced exit with status -1.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;

use crate::hal::AddressSpace;
use crate::mm::VirtAddr;

use super::WORD_SIZE;

bitflags! {
    /// How the kernel is about to touch a user address.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// An invalid user memory access.
///
/// Carried up to the dispatcher, which terminates the offending process;
/// the faulting address is logged, never returned to user code.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Fault {
    pub addr: VirtAddr,
    pub access: Access,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {:?} access at {}", self.access, self.addr)
    }
}

/// Validate a single user address for `access`.
pub fn validate_addr(
    mem: &dyn AddressSpace,
    addr: VirtAddr,
    access: Access,
) -> Result<(), Fault> {
    let fault = Fault { addr, access };

    if !addr.is_user() {
        return Err(fault);
    }
    if !mem.is_mapped(addr) {
        return Err(fault);
    }

    // Byte-level probe. A write probe stores the byte it just read back, so
    // it is observable only as "did not fault".
    let Some(byte) = mem.read_byte(addr) else {
        return Err(fault);
    };
    if access.contains(Access::WRITE) && !mem.write_byte(addr, byte) {
        return Err(fault);
    }

    Ok(())
}

/// Validate every address in `[addr, addr + len)`.
///
/// Zero-length ranges are trivially valid. A range that wraps the address
/// space can never be valid.
pub fn validate_range(
    mem: &dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
    access: Access,
) -> Result<(), Fault> {
    if len == 0 {
        return Ok(());
    }
    // The last address must be representable; checking it first makes the
    // per-byte loop below overflow-free.
    addr.checked_add(len - 1).ok_or(Fault { addr, access })?;

    for offset in 0..len {
        let byte_addr = VirtAddr::new(addr.as_usize() + offset);
        validate_addr(mem, byte_addr, access)?;
    }
    Ok(())
}

/// Validate and read one stack slot.
pub fn read_word(mem: &dyn AddressSpace, addr: VirtAddr) -> Result<u64, Fault> {
    validate_range(mem, addr, WORD_SIZE, Access::READ)?;

    let mut word = 0u64;
    for offset in (0..WORD_SIZE).rev() {
        let byte_addr = VirtAddr::new(addr.as_usize() + offset);
        let byte = mem.read_byte(byte_addr).ok_or(Fault {
            addr: byte_addr,
            access: Access::READ,
        })?;
        word = (word << 8) | u64::from(byte);
    }
    Ok(word)
}

/// Validate `[addr, addr + len)` and copy it into kernel memory.
pub fn copy_in(mem: &dyn AddressSpace, addr: VirtAddr, len: usize) -> Result<Vec<u8>, Fault> {
    validate_range(mem, addr, len, Access::READ)?;

    let mut buf = Vec::with_capacity(len);
    for offset in 0..len {
        let byte_addr = VirtAddr::new(addr.as_usize() + offset);
        let byte = mem.read_byte(byte_addr).ok_or(Fault {
            addr: byte_addr,
            access: Access::READ,
        })?;
        buf.push(byte);
    }
    Ok(buf)
}

/// Validate `[addr, addr + buf.len())` for writing, then copy `buf` out to
/// user memory.
///
/// The whole range is validated before the first byte is stored, so a fault
/// in a later page cannot leave a partial write behind.
pub fn copy_out(mem: &dyn AddressSpace, addr: VirtAddr, buf: &[u8]) -> Result<(), Fault> {
    validate_range(mem, addr, buf.len(), Access::WRITE)?;

    for (offset, &byte) in buf.iter().enumerate() {
        let byte_addr = VirtAddr::new(addr.as_usize() + offset);
        if !mem.write_byte(byte_addr, byte) {
            return Err(Fault {
                addr: byte_addr,
                access: Access::WRITE,
            });
        }
    }
    Ok(())
}

/// Copy a NUL-terminated string out of user memory, validating each byte
/// before it is read.
///
/// A string with no terminator within `max` bytes is treated as an invalid
/// access: the unterminated walk would run off the mapping eventually, and
/// the offender dies at the boundary instead. Non-UTF-8 bytes are replaced,
/// which at worst produces a name no file can have.
pub fn read_cstr(mem: &dyn AddressSpace, addr: VirtAddr, max: usize) -> Result<String, Fault> {
    let mut bytes = Vec::new();
    for offset in 0..max {
        let byte_addr = addr.checked_add(offset).ok_or(Fault {
            addr,
            access: Access::READ,
        })?;
        validate_addr(mem, byte_addr, Access::READ)?;
        let byte = mem.read_byte(byte_addr).ok_or(Fault {
            addr: byte_addr,
            access: Access::READ,
        })?;
        if byte == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(byte);
    }
    Err(Fault {
        addr,
        access: Access::READ,
    })
}
