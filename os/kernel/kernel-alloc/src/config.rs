//! Configuration of a DIRQL mapping pool.

use kernel_info::memory::{DIRQL_DEFAULT_PAGES, DIRQL_WINDOW};
use kernel_memory_addresses::{Size4M, VirtualPage};

/// Shape of a [`PagingContext`](crate::PagingContext).
///
/// The defaults come from [`kernel_info::memory`].
///
/// ```rust
/// use kernel_alloc::MappingConfig;
/// use kernel_memory_addresses::VirtualPage;
///
/// let config = MappingConfig::default()
///     .with_pages(64)
///     .with_window(VirtualPage::from_page_number(0x3FD));
/// assert_eq!(config.pages, 64);
/// assert_eq!(config.window.base().as_u32(), 0xFF40_0000);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MappingConfig {
    /// Number of pre-reserved 4 KiB pages, `1..=1024`.
    pub pages: usize,
    /// The 4 MiB virtual window whose directory entry the pool claims.
    pub window: VirtualPage<Size4M>,
}

impl MappingConfig {
    /// Default page count in the default window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pages: DIRQL_DEFAULT_PAGES,
            window: DIRQL_WINDOW,
        }
    }

    /// Reserve `pages` slots instead of the default.
    #[must_use]
    pub const fn with_pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    /// Place the pool in `window`; its directory entry must be unused.
    #[must_use]
    pub const fn with_window(mut self, window: VirtualPage<Size4M>) -> Self {
        self.window = window;
        self
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::new()
    }
}
