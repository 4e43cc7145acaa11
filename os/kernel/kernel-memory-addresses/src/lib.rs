//! # Typed 32-bit Addresses
//!
//! Zero-cost wrappers that keep virtual and physical addresses apart at compile
//! time for two-level (non-PAE) paging code.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] / [`PhysicalAddress`] | Any byte address in the respective space. |
//! | [`VirtualPage<S>`] / [`PhysicalPage<S>`] | An `S`-aligned page base. |
//! | [`PageOffset<S>`] | A byte offset inside an `S`-sized page. |
//!
//! `S` is one of the two [`PageSize`]s available with `CR4.PSE = 1`: [`Size4K`]
//! (mapped by a page-table entry) and [`Size4M`] (mapped directly by a
//! page-directory entry).
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x8040_1234);
//!
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0x8040_1000);
//! assert_eq!(off.as_u32(), 0x234);
//! assert_eq!(page.join(off), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

#[macro_use]
mod macros;

mod misaligned;
mod page_offset;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::misaligned::Misaligned;
pub use crate::page_offset::PageOffset;
pub use crate::page_size::{PageSize, Size4K, Size4M};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;
