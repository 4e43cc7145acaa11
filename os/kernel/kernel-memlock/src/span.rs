use crate::LockError;
use core::fmt;
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress, VirtualPage};

/// A non-empty byte range `[start, start + len)` that fits the 32-bit
/// address space.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PageSpan {
    start: VirtualAddress,
    len: u32,
}

impl PageSpan {
    /// # Errors
    /// - [`LockError::EmptyRange`] if `len` is zero.
    /// - [`LockError::RangeOverflow`] if the range runs past `0xFFFF_FFFF`.
    pub const fn new(start: VirtualAddress, len: u32) -> Result<Self, LockError> {
        if len == 0 {
            return Err(LockError::EmptyRange);
        }
        // The last byte must be addressable; ending exactly at 4 GiB is fine.
        if start.checked_add(len - 1).is_none() {
            return Err(LockError::RangeOverflow { start, len });
        }
        Ok(Self { start, len })
    }

    /// First byte of the span.
    #[inline]
    #[must_use]
    pub const fn start(self) -> VirtualAddress {
        self.start
    }

    /// Length in bytes; never zero.
    #[inline]
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(self) -> u32 {
        self.len
    }

    /// Address of the last byte in the range.
    #[inline]
    #[must_use]
    pub const fn last(self) -> VirtualAddress {
        VirtualAddress::new(self.start.as_u32() + (self.len - 1))
    }

    /// Page holding the first byte.
    #[inline]
    #[must_use]
    pub const fn first_page(self) -> VirtualPage<Size4K> {
        self.start.page::<Size4K>()
    }

    /// Page holding the last byte.
    #[inline]
    #[must_use]
    pub const fn last_page(self) -> VirtualPage<Size4K> {
        self.last().page::<Size4K>()
    }

    /// Number of 4 KiB pages overlapping the range.
    #[inline]
    #[must_use]
    pub const fn page_count(self) -> u32 {
        self.last_page().page_number() - self.first_page().page_number() + 1
    }

    /// Every 4 KiB page overlapping the range, in ascending order.
    pub fn pages(self) -> impl Iterator<Item = VirtualPage<Size4K>> {
        (self.first_page().page_number()..=self.last_page().page_number())
            .map(VirtualPage::from_page_number)
    }

    /// Whether `va` lies inside the range.
    #[inline]
    #[must_use]
    pub const fn contains(self, va: VirtualAddress) -> bool {
        va.as_u32() >= self.start.as_u32() && va.as_u32() <= self.last().as_u32()
    }
}

impl fmt::Display for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, +{:#x})", self.start, self.len)
    }
}

impl fmt::Debug for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PageSpan({self}, {} page(s) of {})",
            self.page_count(),
            Size4K::SIZE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: u32, len: u32) -> PageSpan {
        PageSpan::new(VirtualAddress::new(start), len).expect("valid span")
    }

    #[test]
    fn page_counts() {
        assert_eq!(span(0x1000, 1).page_count(), 1);
        assert_eq!(span(0x1000, 0x1000).page_count(), 1);
        assert_eq!(span(0x1000, 0x1001).page_count(), 2);
        assert_eq!(span(0x1FFF, 2).page_count(), 2);
        assert_eq!(span(0x1234, 0x3000).page_count(), 4);
    }

    #[test]
    fn pages_cover_the_range() {
        let pages: Vec<_> = span(0x0040_0FFF, 0x1002).pages().map(|p| p.base().as_u32()).collect();
        assert_eq!(pages, [0x0040_0000, 0x0040_1000, 0x0040_2000]);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(
            PageSpan::new(VirtualAddress::new(0x1000), 0),
            Err(LockError::EmptyRange)
        );
    }

    #[test]
    fn top_of_address_space() {
        let top = span(0xFFFF_F000, 0x1000);
        assert_eq!(top.last().as_u32(), 0xFFFF_FFFF);
        assert_eq!(top.page_count(), 1);

        let start = VirtualAddress::new(0xFFFF_F000);
        assert_eq!(
            PageSpan::new(start, 0x1001),
            Err(LockError::RangeOverflow { start, len: 0x1001 })
        );
    }

    #[test]
    fn contains_bounds() {
        let s = span(0x2000, 0x10);
        assert!(s.contains(VirtualAddress::new(0x2000)));
        assert!(s.contains(VirtualAddress::new(0x200F)));
        assert!(!s.contains(VirtualAddress::new(0x2010)));
        assert!(!s.contains(VirtualAddress::new(0x1FFF)));
    }
}
