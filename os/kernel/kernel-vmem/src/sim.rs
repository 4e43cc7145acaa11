//! # Software MMU for host-side tests
//!
//! We simulate physical memory as a boxed slice of 4 KiB-aligned frames.
//! Physical addresses are byte offsets from 0, so frame `n` lives at
//! `n << 12`. [`SoftMmu`] implements every primitive the paging crates consume:
//!
//! - [`PhysMapper`]: hands out pointers into the frame store and counts
//!   outstanding mappings, so tests can assert that nothing leaks.
//! - [`Mmu`]: records every invalidated address and translates virtual
//!   addresses by walking the simulated tables in software.
//! - [`FrameAlloc`] (through [`SoftFrameAlloc`]): bump allocation with an
//!   optional budget, remembering which frames were given back.
//!
//! Frame 0 is never handed out; all-zero entries therefore never alias a
//! frame a test allocated.
//!
//! This is *only* for tests. Real mappers must honor the host's mapping rules.

use crate::page_table::pd::{DirectoryIndex, PageDirectoryEntry, Pde, PdeKind};
use crate::page_table::pt::{PageTableEntry, TableIndex};
use crate::{AddressSpaceId, FrameAlloc, Mmu, PhysMapper};
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use std::sync::Mutex;

/// A 4 KiB-aligned raw frame.
#[repr(C, align(4096))]
struct Frame([u8; 4096]);

/// Simulated physical memory plus the MMU primitives operating on it.
pub struct SoftMmu {
    frames: Box<[UnsafeCell<Frame>]>,
    next_frame: AtomicU32,
    outstanding: AtomicUsize,
    mappings_made: AtomicUsize,
    invalidations: Mutex<Vec<VirtualAddress>>,
    freed: Mutex<Vec<PhysicalPage<Size4K>>>,
}

// SAFETY: frame contents are only reached through raw pointers; callers of the
// paging crates uphold the same exclusivity rules as on hardware.
unsafe impl Sync for SoftMmu {}

impl SoftMmu {
    /// Create a memory of `frames` zeroed 4 KiB frames.
    #[must_use]
    pub fn with_frames(frames: usize) -> Self {
        assert!(frames > 1, "frame 0 is reserved");
        let frames = (0..frames)
            .map(|_| UnsafeCell::new(Frame([0; 4096])))
            .collect();
        Self {
            frames,
            next_frame: AtomicU32::new(1),
            outstanding: AtomicUsize::new(0),
            mappings_made: AtomicUsize::new(0),
            invalidations: Mutex::new(Vec::new()),
            freed: Mutex::new(Vec::new()),
        }
    }

    /// Number of simulated frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Reserve the next zeroed frame.
    ///
    /// # Panics
    /// If the simulated memory is exhausted.
    #[must_use]
    pub fn alloc_frame(&self) -> PhysicalPage<Size4K> {
        self.try_alloc_frame().expect("simulated memory exhausted")
    }

    fn try_alloc_frame(&self) -> Option<PhysicalPage<Size4K>> {
        let n = self.next_frame.fetch_add(1, Ordering::Relaxed);
        ((n as usize) < self.frames.len()).then(|| PhysicalPage::from_frame_number(n))
    }

    /// A frame allocator drawing from this memory.
    #[must_use]
    pub const fn allocator(&self) -> SoftFrameAlloc<'_> {
        SoftFrameAlloc {
            mmu: self,
            budget: None,
        }
    }

    /// A frame allocator that fails after `budget` successful allocations.
    #[must_use]
    pub const fn allocator_with_budget(&self, budget: usize) -> SoftFrameAlloc<'_> {
        SoftFrameAlloc {
            mmu: self,
            budget: Some(budget),
        }
    }

    /// Create a fresh address space with an empty page directory.
    #[must_use]
    pub fn new_space(&self) -> AddressSpaceId {
        AddressSpaceId::from_page_directory(self.alloc_frame())
    }

    /// Pointer to the first byte of `frame` in the frame store.
    ///
    /// # Panics
    /// If `frame` lies outside the simulated memory.
    #[must_use]
    pub fn frame_ptr(&self, frame: PhysicalPage<Size4K>) -> NonNull<u8> {
        let cell = &self.frames[frame.frame_number() as usize];
        NonNull::new(cell.get().cast::<u8>()).expect("frame store is never null")
    }

    /// Read the 32-bit word at `pa`.
    #[must_use]
    pub fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        let (frame, offset) = pa.split::<Size4K>();
        // SAFETY: in-bounds, 4-byte aligned read from the frame store.
        unsafe {
            self.frame_ptr(frame)
                .add(offset.as_u32() as usize)
                .cast::<u32>()
                .read()
        }
    }

    /// Write the 32-bit word at `pa`.
    pub fn write_u32(&self, pa: PhysicalAddress, value: u32) {
        let (frame, offset) = pa.split::<Size4K>();
        // SAFETY: in-bounds, 4-byte aligned write to the frame store.
        unsafe {
            self.frame_ptr(frame)
                .add(offset.as_u32() as usize)
                .cast::<u32>()
                .write(value);
        }
    }

    /// Read the directory entry `index` of `space`.
    #[must_use]
    pub fn pde(&self, space: AddressSpaceId, index: DirectoryIndex) -> PageDirectoryEntry {
        let slot = Self::slot(space.page_directory(), index.byte_offset());
        PageDirectoryEntry::from_bits(self.read_u32(slot))
    }

    /// Overwrite the directory entry `index` of `space`.
    pub fn set_pde(&self, space: AddressSpaceId, index: DirectoryIndex, entry: PageDirectoryEntry) {
        self.write_u32(Self::slot(space.page_directory(), index.byte_offset()), entry.into_bits());
    }

    /// Read the entry `index` of the page table in `table`.
    #[must_use]
    pub fn pte(&self, table: PhysicalPage<Size4K>, index: TableIndex) -> PageTableEntry {
        PageTableEntry::from_bits(self.read_u32(Self::slot(table, index.byte_offset())))
    }

    /// Overwrite the entry `index` of the page table in `table`.
    pub fn set_pte(&self, table: PhysicalPage<Size4K>, index: TableIndex, entry: PageTableEntry) {
        self.write_u32(Self::slot(table, index.byte_offset()), entry.into_bits());
    }

    /// Map the 4 KiB page containing `va` to `frame`, creating the page
    /// table if the directory entry is not present yet.
    ///
    /// Returns the page table frame used.
    ///
    /// # Panics
    /// If the directory entry is a 4 MiB leaf.
    pub fn map_4k(
        &self,
        space: AddressSpaceId,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
        flags: PageTableEntry,
    ) -> PhysicalPage<Size4K> {
        let pd = DirectoryIndex::from_address(va);
        let table = match self.pde(space, pd).kind() {
            Some(PdeKind::PageTable(table, _)) => table,
            Some(PdeKind::Leaf4MiB(..)) => panic!("{va} is covered by a 4 MiB page"),
            None => {
                let table = self.alloc_frame();
                let entry = PageDirectoryEntry::make_table(table, Pde::new_common_rw());
                self.set_pde(space, pd, entry);
                table
            }
        };
        self.set_pte(table, TableIndex::from_address(va), PageTableEntry::make_4k(frame, flags));
        table
    }

    /// Map the 4 MiB page containing `va` to `page` with kernel RW flags.
    pub fn map_4m(&self, space: AddressSpaceId, va: VirtualAddress, page: PhysicalPage<Size4M>) {
        self.set_pde(
            space,
            DirectoryIndex::from_address(va),
            PageDirectoryEntry::make_4m(page, crate::Pde4M::new_common_rw()),
        );
    }

    /// Number of [`PhysMapper`] mappings not yet released.
    #[must_use]
    pub fn outstanding_mappings(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Number of [`PhysMapper`] mappings ever made.
    #[must_use]
    pub fn mappings_made(&self) -> usize {
        self.mappings_made.load(Ordering::SeqCst)
    }

    /// Every address passed to [`Mmu::invalidate_page`], in order.
    ///
    /// # Panics
    /// If a thread panicked while recording an invalidation.
    #[must_use]
    pub fn invalidations(&self) -> Vec<VirtualAddress> {
        self.invalidations.lock().expect("poisoned").clone()
    }

    /// Every frame given back through [`FrameAlloc::free_4k`], in order.
    ///
    /// # Panics
    /// If a thread panicked while recording a freed frame.
    #[must_use]
    pub fn freed_frames(&self) -> Vec<PhysicalPage<Size4K>> {
        self.freed.lock().expect("poisoned").clone()
    }

    /// Translate `va` in `space` by walking the simulated tables.
    #[must_use]
    pub fn translate(&self, space: AddressSpaceId, va: VirtualAddress) -> Option<PhysicalAddress> {
        match self.pde(space, DirectoryIndex::from_address(va)).kind()? {
            PdeKind::Leaf4MiB(page, _) => Some(page.join(va.offset::<Size4M>())),
            PdeKind::PageTable(table, _) => {
                let page = self.pte(table, TableIndex::from_address(va)).page_4k()?;
                Some(page.join(va.offset::<Size4K>()))
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn slot(frame: PhysicalPage<Size4K>, offset: usize) -> PhysicalAddress {
        PhysicalAddress::new(frame.base().as_u32() + offset as u32)
    }
}

impl PhysMapper for SoftMmu {
    unsafe fn map_frame(&self, frame: PhysicalPage<Size4K>) -> NonNull<u8> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.mappings_made.fetch_add(1, Ordering::SeqCst);
        self.frame_ptr(frame)
    }

    unsafe fn unmap_frame(&self, frame: PhysicalPage<Size4K>, ptr: NonNull<u8>) {
        assert_eq!(ptr, self.frame_ptr(frame), "unmapping a pointer of another frame");
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "unbalanced unmap of {frame}");
    }
}

impl Mmu for SoftMmu {
    fn invalidate_page(&self, va: VirtualAddress) {
        self.invalidations.lock().expect("poisoned").push(va);
    }

    unsafe fn virt_to_ptr(&self, space: AddressSpaceId, va: VirtualAddress) -> NonNull<u8> {
        let pa = self.translate(space, va).expect("address is not mapped");
        let (frame, offset) = pa.split::<Size4K>();
        // SAFETY: the offset stays inside the frame.
        unsafe { self.frame_ptr(frame).add(offset.as_u32() as usize) }
    }
}

/// [`FrameAlloc`] over a [`SoftMmu`].
pub struct SoftFrameAlloc<'a> {
    mmu: &'a SoftMmu,
    budget: Option<usize>,
}

impl FrameAlloc for SoftFrameAlloc<'_> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if let Some(budget) = self.budget.as_mut() {
            *budget = budget.checked_sub(1)?;
        }
        self.mmu.try_alloc_frame()
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        self.mmu.freed.lock().expect("poisoned").push(frame);
    }
}
