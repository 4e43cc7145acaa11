use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// A page size supported by 32-bit paging with `CR4.PSE = 1`.
///
/// Sealed: only [`Size4K`] and [`Size4M`] exist.
pub trait PageSize:
    sealed::Sealed + Copy + Eq + Ord + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes.
    const SIZE: u32;
    /// `log2(SIZE)`: the number of offset bits in an address.
    const SHIFT: u32;
    /// Mask of the in-page offset bits.
    const OFFSET_MASK: u32 = Self::SIZE - 1;
    /// Short human-readable name, e.g. `"4K"`.
    const NAME: &'static str;
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, shift = $shift:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u32 = 1 << $shift;
            const SHIFT: u32 = $shift;
            const NAME: &'static str = $label;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::NAME)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::NAME)
            }
        }
    };
}

page_size!(
    /// 4 KiB page, mapped by a page-table entry.
    Size4K, shift = 12, "4K"
);

page_size!(
    /// 4 MiB large page, mapped directly by a page-directory entry (`PS = 1`).
    Size4M, shift = 22, "4M"
);

const _: () = {
    assert!(Size4K::SIZE == 0x1000);
    assert!(Size4M::SIZE == 0x40_0000);
};
