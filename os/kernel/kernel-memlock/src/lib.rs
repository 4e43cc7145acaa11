//! # Process Memory Locking
//!
//! Pins a virtual range of another process into physical memory so that its
//! page-table entries stay stable while they are inspected, and reverses the
//! pin afterwards.
//!
//! The heavy lifting is done by two host subsystems consumed as traits:
//!
//! - [`ProcessAttach`]: switch the calling thread into the target process's
//!   address space and back.
//! - [`PinnedMemory`]: build, lock, unlock and free a pinned-memory
//!   descriptor (an MDL on NT-style hosts).
//!
//! [`ProcessMemoryLocker`] sequences them: a lock either yields a
//! [`PinnedRegion`] that owns every pinned page, or fails without leaving
//! anything pinned. The region is handed back through
//! [`ProcessMemoryLocker::unlock_process_memory`], which consumes it.
//!
//! ```
//! # use kernel_memlock::PageSpan;
//! # use kernel_memory_addresses::VirtualAddress;
//! // One page plus one byte straddles a page boundary.
//! let span = PageSpan::new(VirtualAddress::new(0x0040_0000), 0x1001).unwrap();
//! assert_eq!(span.page_count(), 2);
//! ```
//!
//! Every operation here may block or fault and runs at passive level only.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod attach;
mod locker;
mod span;

pub use crate::attach::AttachGuard;
pub use crate::locker::{LockError, PinnedRegion, ProcessMemoryLocker};
pub use crate::span::PageSpan;

use kernel_memory_addresses::VirtualAddress;

/// Moves the calling thread into a process's address space and back.
///
/// Calls are always balanced: every [`attach`](Self::attach) issued by this
/// crate is followed by exactly one [`detach`](Self::detach) with the same
/// APC state, on the same thread, on every path.
pub trait ProcessAttach {
    /// Host handle of a process.
    type Process;
    /// Caller-provided storage for the state saved while attached.
    type ApcState;

    /// Attach the calling thread to `process`, saving the previous state in `apc_state`.
    fn attach(&self, process: &Self::Process, apc_state: &mut Self::ApcState);

    /// Restore the state saved by the matching [`attach`](Self::attach).
    fn detach(&self, apc_state: &mut Self::ApcState);
}

/// Pinned-memory descriptor subsystem.
///
/// All calls happen while attached to the process that owns the range.
pub trait PinnedMemory {
    /// Describes one virtual range and, once locked, the frames pinned for it.
    type Descriptor;

    /// Create a descriptor for `span`. `None` if the host cannot allocate one.
    fn build(&self, span: PageSpan) -> Option<Self::Descriptor>;

    /// Fault in and pin every page of the descriptor.
    ///
    /// Must be atomic: on error no page of the descriptor remains pinned.
    ///
    /// # Errors
    /// The reason the first failing page could not be pinned.
    fn lock_pages(&self, descriptor: &mut Self::Descriptor) -> Result<(), PinError>;

    /// Release the pages pinned by a successful [`lock_pages`](Self::lock_pages).
    fn unlock_pages(&self, descriptor: &mut Self::Descriptor);

    /// Release the descriptor itself.
    fn free(&self, descriptor: Self::Descriptor);
}

/// Why a page could not be pinned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinError {
    #[error("no valid mapping for {0}")]
    NotMapped(VirtualAddress),
    #[error("access to {0} denied")]
    AccessDenied(VirtualAddress),
    #[error("the page at {0} could not be paged in")]
    PageInFailed(VirtualAddress),
    #[error("insufficient resources to pin the range")]
    InsufficientResources,
}
