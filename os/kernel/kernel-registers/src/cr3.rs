use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K};

/// CR3 — Page-Directory Base Register (32-bit paging, PAE disabled).
///
/// Holds the physical base address of the page directory and cache-control
/// flags for page-directory accesses. The value identifies one address space.
#[bitfield(u32)]
#[derive(PartialEq, Eq, Hash)]
pub struct Cr3 {
    /// Bits 0–2 — Ignored.
    #[bits(3)]
    __ignored0: u8,

    /// Bit 3 — PWT: Page-level Write-Through for the page directory.
    pub pwt: bool,

    /// Bit 4 — PCD: Page-level Cache Disable for the page directory.
    pub pcd: bool,

    /// Bits 5–11 — Ignored.
    #[bits(7)]
    __ignored1: u8,

    /// Bits 12–31 — Page directory physical base >> 12.
    #[bits(20)]
    directory_frame: u32,
}

impl Cr3 {
    /// Create a `Cr3` value from a page directory frame and flags.
    #[must_use]
    pub const fn from_page_directory(
        directory: PhysicalPage<Size4K>,
        pwt: bool,
        pcd: bool,
    ) -> Self {
        Self::new()
            .with_pwt(pwt)
            .with_pcd(pcd)
            .with_directory_frame(directory.frame_number())
    }

    /// Return the physical frame holding the page directory.
    #[must_use]
    pub const fn page_directory(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_number(self.directory_frame())
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}
