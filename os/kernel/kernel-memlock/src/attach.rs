//! Scoped process attachment.
//!
//! [`AttachGuard`] attaches on creation and detaches when dropped, so a lock
//! or unlock that bails out early still leaves the thread in its own
//! address space.
//!
//! ```
//! use kernel_memlock::{AttachGuard, ProcessAttach};
//! use std::cell::Cell;
//!
//! struct Host(Cell<u32>);
//! impl ProcessAttach for Host {
//!     type Process = ();
//!     type ApcState = ();
//!     fn attach(&self, _: &(), _: &mut ()) { self.0.set(self.0.get() + 1); }
//!     fn detach(&self, _: &mut ()) { self.0.set(self.0.get() - 1); }
//! }
//!
//! let host = Host(Cell::new(0));
//! let mut apc = ();
//! {
//!     let _attached = AttachGuard::enter(&host, &(), &mut apc);
//!     assert_eq!(host.0.get(), 1);
//! }
//! assert_eq!(host.0.get(), 0);
//! ```

use crate::ProcessAttach;

/// Keeps the calling thread attached to a process until dropped.
#[must_use = "dropping the guard detaches immediately"]
pub struct AttachGuard<'a, A: ProcessAttach> {
    host: &'a A,
    apc_state: &'a mut A::ApcState,
}

impl<'a, A: ProcessAttach> AttachGuard<'a, A> {
    /// Attach to `process`, saving the previous state in `apc_state`.
    #[inline]
    pub fn enter(host: &'a A, process: &A::Process, apc_state: &'a mut A::ApcState) -> Self {
        host.attach(process, apc_state);
        Self { host, apc_state }
    }
}

impl<A: ProcessAttach> Drop for AttachGuard<'_, A> {
    /// Detach with the state saved by [`AttachGuard::enter`].
    #[inline]
    fn drop(&mut self) {
        self.host.detach(self.apc_state);
    }
}
