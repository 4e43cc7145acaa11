//! Templates for the virtual/physical twins, so both spaces get the same API
//! while staying distinct types.

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident, page = $page:ident, tag = $tag:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            #[inline]
            #[must_use]
            pub const fn zero() -> Self {
                Self(0)
            }

            #[inline]
            #[must_use]
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            /// The `S`-sized page containing this address.
            #[inline]
            #[must_use]
            pub const fn page<S: PageSize>(self) -> $page<S> {
                $page::containing_address(self)
            }

            /// The offset of this address inside its `S`-sized page.
            #[inline]
            #[must_use]
            pub const fn offset<S: PageSize>(self) -> PageOffset<S> {
                PageOffset::new(self.0 & S::OFFSET_MASK)
            }

            /// `(page, offset)`; joining them gives back `self`.
            #[inline]
            #[must_use]
            pub const fn split<S: PageSize>(self) -> ($page<S>, PageOffset<S>) {
                (self.page::<S>(), self.offset::<S>())
            }

            /// Whether the address is the base of an `S`-sized page.
            #[inline]
            #[must_use]
            pub const fn is_aligned<S: PageSize>(self) -> bool {
                self.0 & S::OFFSET_MASK == 0
            }

            /// `self + rhs`, or `None` past `0xFFFF_FFFF`.
            #[inline]
            #[must_use]
            pub const fn checked_add(self, rhs: u32) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "(0x{:08X})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(addr: $name) -> Self {
                addr.0
            }
        }
    };
}

macro_rules! page_type {
    (
        $(#[$meta:meta])*
        $name:ident of $addr:ident,
        number = $number:ident,
        from_number = $from_number:ident
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name<S: PageSize> {
            base: u32,
            _size: PhantomData<S>,
        }

        impl<S: PageSize> $name<S> {
            /// The page containing `addr` (aligns down).
            #[inline]
            #[must_use]
            pub const fn containing_address(addr: $addr) -> Self {
                Self {
                    base: addr.as_u32() & !S::OFFSET_MASK,
                    _size: PhantomData,
                }
            }

            /// The page with index `number` (`base >> S::SHIFT`).
            ///
            /// Bits that do not fit the 32-bit space are discarded.
            #[inline]
            #[must_use]
            pub const fn $from_number(number: u32) -> Self {
                Self {
                    base: number.wrapping_shl(S::SHIFT),
                    _size: PhantomData,
                }
            }

            #[inline]
            #[must_use]
            pub const fn base(self) -> $addr {
                $addr::new(self.base)
            }

            /// Page index, i.e. `base >> S::SHIFT`.
            #[inline]
            #[must_use]
            pub const fn $number(self) -> u32 {
                self.base >> S::SHIFT
            }

            /// The address `offset` bytes into this page.
            #[inline]
            #[must_use]
            pub const fn join(self, offset: PageOffset<S>) -> $addr {
                $addr::new(self.base | offset.as_u32())
            }
        }

        impl<S: PageSize> fmt::Display for $name<S> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}/{}", self.base, S::NAME)
            }
        }

        impl<S: PageSize> fmt::Debug for $name<S> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "<{}>(0x{:08X})"), S::NAME, self.base)
            }
        }

        impl<S: PageSize> TryFrom<$addr> for $name<S> {
            type Error = Misaligned;

            /// Exact conversion; fails unless `addr` is a page base.
            #[inline]
            fn try_from(addr: $addr) -> Result<Self, Misaligned> {
                if addr.is_aligned::<S>() {
                    Ok(Self::containing_address(addr))
                } else {
                    Err(Misaligned(addr.as_u32()))
                }
            }
        }

        impl<S: PageSize> From<$name<S>> for $addr {
            #[inline]
            fn from(page: $name<S>) -> Self {
                page.base()
            }
        }
    };
}
