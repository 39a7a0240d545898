//! Memory Types
//!
//! Address newtype and the user address window. The actual page tables live
//! behind [`crate::hal::AddressSpace`]; this module only supplies the
//! vocabulary the validator speaks.

mod address;

pub use address::{VirtAddr, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, USER_END, USER_START};
