//! # Virtual Memory Support
//!
//! 32-bit (non-PAE) paging helpers for a kernel component that inspects and
//! manipulates the mappings of a live address space.
//!
//! ## What you get
//! - Hardware-exact [`PageDirectoryEntry`] / [`PageTableEntry`] layouts and the
//!   4 KiB-aligned [`PageDirectory`] / [`PageTable`] arrays.
//! - An [`AddressSpaceId`] (the CR3 value) that is threaded explicitly through
//!   every call instead of reading ambient processor state.
//! - The **entry resolver** on [`AddressSpace`]: map in the directory or table
//!   entry that governs a virtual address, and map it out again.
//! - The **reverse address walker** ([`PageWalk`]): enumerate every virtual
//!   address of one space that maps a given physical frame.
//! - The primitives consumed from the host as traits ([`PhysMapper`], [`Mmu`],
//!   [`FrameAlloc`]).
//!
//! ## IA-32 Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ```text
//!  CR3  →  PD  →  PT  →  Physical Page
//!           │      │
//!           │      └───► PTE (Page Table Entry)     → maps 4 KiB page
//!           └──────────► PDE (Page Directory Entry) → PS=1 → 4 MiB page
//! ```
//!
//! | Level | Table name | Entry name | Description |
//! |:------|:-----------|:-----------|:------------|
//! | 1 | **PD** (Page Directory) | **PDE** | One per address space, referenced by CR3. If `PS=1`, it maps a 4 MiB page directly (leaf). |
//! | 2 | **PT** (Page Table) | **PTE** | Each entry maps a 4 KiB physical page (always a leaf). |
//!
//! ## Example
//!
//! ```rust
//! use kernel_vmem::{PageDirectoryEntry, Pde4M};
//! use kernel_memory_addresses::{PhysicalAddress, Size4M};
//!
//! let page = PhysicalAddress::new(0x0C00_0000).page::<Size4M>();
//! let pde = PageDirectoryEntry::make_4m(page, Pde4M::new_common_rw());
//! assert!(pde.present() && pde.large_page());
//! assert_eq!(pde.into_bits(), 0x0C00_0083);
//! ```

#![cfg_attr(not(any(test, doctest, feature = "sim")), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod mapped;
pub mod page_table;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod walk;

pub use crate::address_space::{AddressSpace, AddressSpaceId};
pub use crate::mapped::{Mapped, MappedPde, MappedPte};
pub use crate::page_table::pd::{
    DirectoryIndex, PageDirectory, PageDirectoryEntry, Pde, Pde4M, PdeKind, PdeView,
};
pub use crate::page_table::pt::{PageTable, PageTableEntry, TableIndex};
pub use crate::walk::PageWalk;

use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Reserves **physical** 4 KiB frames at passive level.
///
/// The implementation decides where frames come from (bootloader pool,
/// bitmap, a host allocator). Returned frames are 4 KiB aligned by type.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame, or `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame previously handed out by [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>);
}

/// Makes a physical frame temporarily addressable in the current context.
///
/// This is the general-purpose (passive level) mapping service. It may
/// allocate, fault or block, so it must never be used at elevated IRQL;
/// the DIRQL pool in `kernel-alloc` replaces it there.
///
/// Caching mode and cross-processor invalidation are properties of the host
/// implementation.
pub trait PhysMapper {
    /// Map `frame` and return a pointer to its first byte.
    ///
    /// The returned pointer is 4 KiB aligned and valid for reads and writes
    /// of 4096 bytes until the matching [`unmap_frame`](Self::unmap_frame).
    ///
    /// # Safety
    /// - Passive level only.
    /// - `frame` must be backed by memory the caller may access.
    unsafe fn map_frame(&self, frame: PhysicalPage<Size4K>) -> NonNull<u8>;

    /// Release a mapping produced by [`map_frame`](Self::map_frame).
    ///
    /// # Safety
    /// - `ptr` must come from `map_frame(frame)` on this mapper and must not
    ///   be used afterwards.
    unsafe fn unmap_frame(&self, frame: PhysicalPage<Size4K>, ptr: NonNull<u8>);
}

/// Memory-management unit primitives that are legal at any IRQL.
pub trait Mmu {
    /// Invalidate the single TLB translation for the page containing `va`.
    fn invalidate_page(&self, va: VirtualAddress);

    /// Turn a virtual address of `space` into a dereferenceable pointer.
    ///
    /// # Safety
    /// - `va` must be non-zero and currently mapped in `space`.
    /// - `space` must be the active address space on hardware.
    unsafe fn virt_to_ptr(&self, space: AddressSpaceId, va: VirtualAddress) -> NonNull<u8>;
}

/// The processor's own MMU: `invlpg` and identity pointer casts.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct HardwareMmu;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl Mmu for HardwareMmu {
    #[inline]
    fn invalidate_page(&self, va: VirtualAddress) {
        // SAFETY: `invlpg` only drops a cached translation.
        unsafe {
            core::arch::asm!(
                "invlpg [{}]",
                in(reg) va.as_u32() as usize,
                options(nostack, preserves_flags)
            );
        }
    }

    #[inline]
    unsafe fn virt_to_ptr(&self, _space: AddressSpaceId, va: VirtualAddress) -> NonNull<u8> {
        // SAFETY: the caller guarantees `va` is non-zero.
        unsafe { NonNull::new_unchecked(va.as_u32() as usize as *mut u8) }
    }
}
