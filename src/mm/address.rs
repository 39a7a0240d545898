//! Virtual Address Type and User Window
//!
//! Type-safe wrapper for user virtual addresses plus the architecturally
//! fixed window user mappings may occupy.
//!
//! # Security Properties
//! - Addresses are plain values: nothing here dereferences anything
//! - Arithmetic is checked; an overflowing range can never look valid
//! - The user window is a hard architectural constant, not per-process state

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Lowest user-mappable address. The zero page stays unmapped so a null
/// pointer can never validate.
pub const USER_START: usize = PAGE_SIZE;

/// One past the highest user-mappable address (bottom half of a 48-bit
/// address space; everything above belongs to the kernel).
pub const USER_END: usize = 0x0000_8000_0000_0000;

/// A virtual address in the current process's address space.
///
/// Newtype so user-supplied integers cannot be mixed up with kernel values
/// without an explicit construction site.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Wrap a raw address value. Any value is representable; whether it is
    /// *valid* is the memory validator's question, not this type's.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Whether the address falls inside the user window.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 >= USER_START && self.0 < USER_END
    }

    /// Offset the address, or `None` on arithmetic overflow.
    #[inline]
    pub fn checked_add(self, offset: usize) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }

    /// The page number containing this address.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
