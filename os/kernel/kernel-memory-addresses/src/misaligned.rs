use core::fmt;

/// An address is not the base of a page of the requested size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Misaligned(pub u32);

impl fmt::Display for Misaligned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} is not page aligned", self.0)
    }
}

impl core::error::Error for Misaligned {}
