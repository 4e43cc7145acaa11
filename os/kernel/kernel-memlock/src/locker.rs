use crate::{AttachGuard, PageSpan, PinError, PinnedMemory, ProcessAttach};
use core::fmt;
use kernel_memory_addresses::VirtualAddress;
use log::{debug, warn};

/// Pins and unpins ranges of other processes.
pub struct ProcessMemoryLocker<'h, A: ProcessAttach, M: PinnedMemory> {
    attach: &'h A,
    memory: &'h M,
}

/// A range pinned by [`ProcessMemoryLocker::lock_process_memory`].
///
/// Owns the pin until passed to
/// [`ProcessMemoryLocker::unlock_process_memory`]. Dropping it instead leaks
/// the pinned pages; unlocking needs the process, so it cannot happen on drop.
#[must_use = "a pinned region must be released with `unlock_process_memory`"]
pub struct PinnedRegion<D> {
    descriptor: D,
    span: PageSpan,
}

impl<D> PinnedRegion<D> {
    /// The pinned byte range.
    #[inline]
    #[must_use]
    pub const fn span(&self) -> PageSpan {
        self.span
    }

    /// The host descriptor, e.g. to read the pinned frame numbers.
    #[inline]
    #[must_use]
    pub const fn descriptor(&self) -> &D {
        &self.descriptor
    }
}

impl<D> fmt::Debug for PinnedRegion<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedRegion")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

impl<'h, A: ProcessAttach, M: PinnedMemory> ProcessMemoryLocker<'h, A, M> {
    #[must_use]
    pub const fn new(attach: &'h A, memory: &'h M) -> Self {
        Self { attach, memory }
    }

    /// Pin `[start, start + len)` of `process` into physical memory.
    ///
    /// Attaches to `process` for the duration of the call. Either every page
    /// overlapping the range is pinned and owned by the returned region, or
    /// nothing is pinned and the descriptor is freed.
    ///
    /// # Errors
    /// - [`LockError::EmptyRange`] / [`LockError::RangeOverflow`] for an
    ///   invalid range; the process is not attached.
    /// - [`LockError::DescriptorUnavailable`] if no descriptor could be built.
    /// - [`LockError::Pin`] if any page could not be pinned.
    pub fn lock_process_memory(
        &self,
        start: VirtualAddress,
        len: u32,
        process: &A::Process,
        apc_state: &mut A::ApcState,
    ) -> Result<PinnedRegion<M::Descriptor>, LockError> {
        let span = PageSpan::new(start, len)?;
        let _attached = AttachGuard::enter(self.attach, process, apc_state);

        let Some(mut descriptor) = self.memory.build(span) else {
            warn!("No descriptor available for {span}");
            return Err(LockError::DescriptorUnavailable);
        };

        if let Err(err) = self.memory.lock_pages(&mut descriptor) {
            warn!("Failed to pin {span}: {err}");
            self.memory.free(descriptor);
            return Err(err.into());
        }

        debug!("Pinned {span} ({} pages)", span.page_count());
        Ok(PinnedRegion { descriptor, span })
    }

    /// Unpin a region returned by [`lock_process_memory`](Self::lock_process_memory)
    /// and free its descriptor.
    ///
    /// `process` must be the process the region was locked in.
    pub fn unlock_process_memory(
        &self,
        process: &A::Process,
        apc_state: &mut A::ApcState,
        region: PinnedRegion<M::Descriptor>,
    ) {
        let PinnedRegion {
            mut descriptor,
            span,
        } = region;
        let _attached = AttachGuard::enter(self.attach, process, apc_state);

        self.memory.unlock_pages(&mut descriptor);
        self.memory.free(descriptor);
        debug!("Unpinned {span}");
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("cannot lock an empty range")]
    EmptyRange,
    #[error("range of {len:#x} bytes at {start} exceeds the address space")]
    RangeOverflow { start: VirtualAddress, len: u32 },
    #[error("no pinned-memory descriptor available")]
    DescriptorUnavailable,
    #[error("pinning failed: {0}")]
    Pin(#[from] PinError),
}
