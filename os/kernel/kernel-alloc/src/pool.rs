//! # DIRQL page pool
//!
//! A [`PagingContext`] owns one page table that is installed as the directory
//! entry of a 4 MiB virtual window. Slot `i` of that table maps the window
//! page `base + i * 4 KiB`. Handing out a page is a bitmap search plus one
//! entry write; returning it is one entry write, one `invlpg` and one bit
//! clear. Nothing on those paths allocates, blocks, faults or logs.
//!
//! ```text
//! window base ──► ┌────────┬────────┬────────┬─────┐
//!                 │ slot 0 │ slot 1 │ slot 2 │ ... │   (pages ≤ 1024)
//!                 └───┬────┴───┬────┴────────┴─────┘
//! bitmap          bit 0    bit 1 ...                     (set ⇔ handed out)
//! ```
//!
//! Setup and teardown ([`PagingContext::init_mapping_operations`],
//! [`PagingContext::end_mapping_operations`]) run at passive level.

use crate::config::MappingConfig;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::Cell;
use core::ptr::NonNull;
use kernel_info::memory::DIRQL_MAX_PAGES;
use kernel_memory_addresses::{PageSize, PhysicalPage, Size4K, Size4M, VirtualAddress, VirtualPage};
use kernel_vmem::{
    AddressSpace, AddressSpaceId, FrameAlloc, Mmu, PageDirectoryEntry, PageTableEntry, Pde,
    PhysMapper,
};
use log::{info, warn};

/// A DIRQL-safe arena of temporary page mappings, bound to one address space.
///
/// The context is not internally synchronized. It may be moved to the
/// processor that uses it (`Send`), but never shared (`!Sync`): give every
/// concurrent actor its own context, or wrap a shared one in an external
/// lock at passive level.
///
/// ```compile_fail
/// use kernel_alloc::PagingContext;
/// use kernel_vmem::{Mmu, PhysMapper};
///
/// fn assert_sync<T: Sync>() {}
/// fn check<P: PhysMapper + Mmu + Sync + 'static>() {
///     assert_sync::<PagingContext<'static, P>>();
/// }
/// ```
///
/// ```
/// use kernel_alloc::PagingContext;
/// use kernel_vmem::{Mmu, PhysMapper};
///
/// fn assert_send<T: Send>() {}
/// fn check<P: PhysMapper + Mmu + Sync + 'static>() {
///     assert_send::<PagingContext<'static, P>>();
/// }
/// ```
#[must_use = "a pool must be released with `end_mapping_operations`"]
pub struct PagingContext<'p, P: PhysMapper + Mmu> {
    platform: &'p P,
    space: AddressSpaceId,
    window: VirtualPage<Size4M>,
    table_frame: PhysicalPage<Size4K>,
    /// The slot table, mapped through `platform` for the context's lifetime.
    table: NonNull<PageTableEntry>,
    /// Backing frame of every slot; `frames.len()` is the page count.
    frames: Box<[PhysicalPage<Size4K>]>,
    /// One bit per slot. Padding bits past the page count stay set.
    bitmap: Box<[Cell<u8>]>,
}

// SAFETY: the slot table pointer is owned by the context and only reached
// through it; moving the context moves that ownership.
unsafe impl<P: PhysMapper + Mmu + Sync> Send for PagingContext<'_, P> {}

/// One page handed out by a [`PagingContext`].
///
/// Not `Copy`: [`PagingContext::free_page`] consumes it, so a slot is
/// returned at most once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a pool page leaks its slot; return it with `free_page`"]
pub struct PoolPage {
    va: VirtualAddress,
    ptr: NonNull<u8>,
    index: usize,
}

impl PoolPage {
    /// Where the page is mapped in the context's address space.
    #[inline]
    #[must_use]
    pub const fn virtual_address(&self) -> VirtualAddress {
        self.va
    }

    /// Dereferenceable pointer to the first byte of the page.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Slot index inside the pool.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl<'p, P: PhysMapper + Mmu> PagingContext<'p, P> {
    /// Reserve and install a pool as described by `config`.
    ///
    /// Reserves one frame for the slot table and `config.pages` backing
    /// frames from `alloc`, maps the slot table for the lifetime of the
    /// context and claims the directory entry of `config.window` in `space`.
    /// On any failure everything reserved so far is given back.
    ///
    /// Passive level only.
    ///
    /// # Errors
    /// - [`InitMappingError::InvalidPageCount`] unless `1 <= pages <= 1024`.
    /// - [`InitMappingError::InvalidWindow`] if the window starts at address zero.
    /// - [`InitMappingError::WindowInUse`] if the window's directory entry is present.
    /// - [`InitMappingError::OutOfFrames`] if `alloc` runs dry.
    pub fn init_mapping_operations<A: FrameAlloc>(
        platform: &'p P,
        alloc: &mut A,
        space: AddressSpaceId,
        config: &MappingConfig,
    ) -> Result<Self, InitMappingError> {
        let MappingConfig { pages, window } = *config;
        if pages == 0 || pages > DIRQL_MAX_PAGES {
            return Err(InitMappingError::InvalidPageCount(pages));
        }
        if window.page_number() == 0 {
            return Err(InitMappingError::InvalidWindow(window));
        }

        let resolver = AddressSpace::new(platform, space);
        let mut pde = resolver.map_in_pde(window.base());
        if pde.present() {
            warn!("DIRQL window {window} is already mapped ({:?})", *pde);
            return Err(InitMappingError::WindowInUse(window));
        }

        let table_frame = alloc.alloc_4k().ok_or(InitMappingError::OutOfFrames)?;
        let mut frames = Vec::with_capacity(pages);
        while frames.len() < pages {
            let Some(frame) = alloc.alloc_4k() else {
                warn!(
                    "Out of frames after {} of {pages} DIRQL pages; rolling back",
                    frames.len()
                );
                for frame in frames {
                    alloc.free_4k(frame);
                }
                alloc.free_4k(table_frame);
                return Err(InitMappingError::OutOfFrames);
            };
            frames.push(frame);
        }

        // SAFETY: the frame was just reserved for us.
        let table = unsafe { platform.map_frame(table_frame) }.cast::<PageTableEntry>();
        // SAFETY: the mapping covers one whole page table.
        unsafe { table.write_bytes(0, Size4K::SIZE as usize / size_of::<PageTableEntry>()) };

        *pde = PageDirectoryEntry::make_table(table_frame, Pde::new_common_rw());
        resolver.map_out_entry(pde);

        let bitmap = (0..pages.div_ceil(8))
            .map(|byte| Cell::new(padding_mask(byte, pages)))
            .collect();

        info!("DIRQL pool of {pages} pages installed at {window} (slot table {table_frame})");
        Ok(Self {
            platform,
            space,
            window,
            table_frame,
            table,
            frames: frames.into_boxed_slice(),
            bitmap,
        })
    }

    /// Release the pool: unclaim the window, drop the slot table mapping and
    /// give every frame back to `alloc`.
    ///
    /// Pages still handed out become invalid. Passive level only.
    pub fn end_mapping_operations<A: FrameAlloc>(self, alloc: &mut A) {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            warn!(
                "Releasing DIRQL pool at {} with {outstanding} pages still handed out",
                self.window
            );
        }

        let resolver = AddressSpace::new(self.platform, self.space);
        let mut pde = resolver.map_in_pde(self.window.base());
        *pde = PageDirectoryEntry::zero();
        resolver.map_out_entry(pde);
        // Flushes the cached directory entry before the table frame is reused.
        self.platform.invalidate_page(self.window.base());
        for index in (1..self.pages()).filter(|&i| self.is_in_use(i)) {
            if let Some(va) = self.page_va(index) {
                self.platform.invalidate_page(va);
            }
        }

        // SAFETY: produced by `map_frame(table_frame)` in `init_mapping_operations`.
        unsafe { self.platform.unmap_frame(self.table_frame, self.table.cast()) };
        for &frame in self.frames.iter() {
            alloc.free_4k(frame);
        }
        alloc.free_4k(self.table_frame);

        info!("DIRQL pool at {} released", self.window);
    }

    /// Hand out a page backed by one of the pool's own frames.
    ///
    /// Returns `None` when every page is in use. Never blocks, grows or
    /// faults; legal at any IRQL.
    #[must_use]
    pub fn alloc_page(&self) -> Option<PoolPage> {
        let index = self.claim_slot()?;
        // SAFETY: `claim_slot` only yields indices below the page count.
        let frame = unsafe { *self.frames.get_unchecked(index) };
        // SAFETY: the slot was just claimed.
        Some(unsafe { self.program_slot(index, frame) })
    }

    /// Hand out a page through which `frame` is temporarily addressable.
    ///
    /// Same contract as [`alloc_page`](Self::alloc_page); the slot references
    /// the caller's frame instead of a pool frame.
    #[must_use]
    pub fn map_frame(&self, frame: PhysicalPage<Size4K>) -> Option<PoolPage> {
        let index = self.claim_slot()?;
        // SAFETY: the slot was just claimed.
        Some(unsafe { self.program_slot(index, frame) })
    }

    /// Return a page to the pool.
    ///
    /// Clears the slot's present bit, invalidates its translation and clears
    /// its bitmap bit. Legal at any IRQL.
    ///
    /// `page` must come from this context. Handing in a page of another
    /// context is a contract violation that is only caught in debug builds.
    pub fn free_page(&self, page: PoolPage) {
        let delta = page.va.as_u32().wrapping_sub(self.window.base().as_u32());
        let index = (delta >> Size4K::SHIFT) as usize;
        debug_assert_eq!(index, page.index);
        debug_assert!(index < self.pages(), "page {} is not from this pool", page.va);
        debug_assert!(self.is_in_use(index), "page {} freed twice", page.va);

        // SAFETY: a page handed out by this context has an index below the
        // page count, which is at most the table size.
        unsafe {
            let slot = self.table.add(index);
            slot.write(slot.read().with_present(false));
        }
        self.platform.invalidate_page(page.va);

        // SAFETY: index < pages, so index / 8 < bitmap.len().
        let byte = unsafe { self.bitmap.get_unchecked(index / 8) };
        byte.set(byte.get() & !(1 << (index % 8)));
    }

    /// Number of pages the pool was created with.
    #[inline]
    #[must_use]
    pub fn pages(&self) -> usize {
        self.frames.len()
    }

    /// The claimed 4 MiB window.
    #[inline]
    #[must_use]
    pub const fn window(&self) -> VirtualPage<Size4M> {
        self.window
    }

    /// The address space the pool is bound to.
    #[inline]
    #[must_use]
    pub const fn address_space(&self) -> AddressSpaceId {
        self.space
    }

    /// The platform primitives the pool was created with.
    #[inline]
    #[must_use]
    pub const fn platform(&self) -> &'p P {
        self.platform
    }

    /// Virtual address of slot `index`, or `None` if out of range.
    #[must_use]
    pub fn page_va(&self, index: usize) -> Option<VirtualAddress> {
        (index < self.pages()).then(|| slot_va(self.window, index))
    }

    /// Whether slot `index` is currently handed out. Out-of-range slots are not.
    #[must_use]
    pub fn is_in_use(&self, index: usize) -> bool {
        index < self.pages()
            && self
                .bitmap
                .get(index / 8)
                .is_some_and(|byte| byte.get() & (1 << (index % 8)) != 0)
    }

    /// Number of pages currently handed out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        (0..self.pages()).filter(|&i| self.is_in_use(i)).count()
    }

    /// Find the first clear bit and set it.
    fn claim_slot(&self) -> Option<usize> {
        for (i, byte) in self.bitmap.iter().enumerate() {
            let bits = byte.get();
            if bits == u8::MAX {
                continue;
            }
            let bit = (!bits).trailing_zeros() as usize;
            byte.set(bits | (1 << bit));
            return Some(i * 8 + bit);
        }
        None
    }

    /// Point slot `index` at `frame` and return the page.
    ///
    /// # Safety
    /// `index` must be a slot claimed by the caller (below the page count).
    unsafe fn program_slot(&self, index: usize, frame: PhysicalPage<Size4K>) -> PoolPage {
        let entry = PageTableEntry::make_4k(frame, PageTableEntry::new_common_rw());
        // SAFETY: index < pages <= 1024 entries in the mapped slot table.
        unsafe { self.table.add(index).write(entry) };

        let va = slot_va(self.window, index);
        // SAFETY: the window lies above address zero and the slot was just mapped.
        let ptr = unsafe { self.platform.virt_to_ptr(self.space, va) };
        PoolPage { va, ptr, index }
    }
}

impl<P: PhysMapper + Mmu> core::fmt::Debug for PagingContext<'_, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PagingContext")
            .field("space", &self.space)
            .field("window", &self.window)
            .field("table_frame", &self.table_frame)
            .field("pages", &self.pages())
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn slot_va(window: VirtualPage<Size4M>, index: usize) -> VirtualAddress {
    VirtualAddress::new(window.base().as_u32() | ((index as u32) << Size4K::SHIFT))
}

/// Initial value of bitmap byte `byte`: bits for slots at or past `pages` are set.
#[allow(clippy::cast_possible_truncation)]
const fn padding_mask(byte: usize, pages: usize) -> u8 {
    let first = byte * 8;
    if first + 8 <= pages {
        0
    } else {
        // 1..=7 valid slots remain in this byte.
        !((1u8 << (pages - first)) - 1)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitMappingError {
    #[error("invalid DIRQL pool size of {0} pages")]
    InvalidPageCount(usize),
    #[error("the DIRQL window at {0} cannot be addressed")]
    InvalidWindow(VirtualPage<Size4M>),
    #[error("out of physical frames")]
    OutOfFrames,
    #[error("the directory entry of DIRQL window {0} is already in use")]
    WindowInUse(VirtualPage<Size4M>),
}
