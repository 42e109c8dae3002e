//! The unit of work in a system test.

use crate::error::BoxError;
use crate::synchronizer::SyncHandle;

/// A unit of test work run on its own thread.
///
/// `run` is called exactly once. Returning `Err` (or panicking) is contained
/// in the TBean's thread: the TBean simply never reports that it has run.
pub trait TBean: Send + 'static {
    /// Do the work.
    fn run(&mut self) -> Result<(), BoxError>;

    /// The synchronizable capability, if this TBean has one.
    ///
    /// When `Some`, the manager registers the TBean with its synchronizer and
    /// hands it a [`SyncHandle`] before the thread starts.
    fn as_synchronizable(&mut self) -> Option<&mut dyn Synchronizable> {
        None
    }
}

/// Capability of TBeans that record sync points.
pub trait Synchronizable {
    /// Receive the handle used to emit sync points.
    fn set_sync_handle(&mut self, handle: SyncHandle);
}

/// A TBean backed by a plain closure.
pub struct FnTBean<F> {
    work: F,
}

impl<F> FnTBean<F>
where
    F: FnMut() -> Result<(), BoxError> + Send + 'static,
{
    /// Wrap a closure.
    pub fn new(work: F) -> Self {
        Self { work }
    }
}

impl<F> TBean for FnTBean<F>
where
    F: FnMut() -> Result<(), BoxError> + Send + 'static,
{
    fn run(&mut self) -> Result<(), BoxError> {
        (self.work)()
    }
}

/// A synchronizable TBean backed by a closure that receives its [`SyncHandle`].
pub struct SyncFnTBean<F> {
    work: F,
    handle: Option<SyncHandle>,
}

impl<F> SyncFnTBean<F>
where
    F: FnMut(&SyncHandle) -> Result<(), BoxError> + Send + 'static,
{
    /// Wrap a closure.
    pub fn new(work: F) -> Self {
        Self { work, handle: None }
    }
}

impl<F> TBean for SyncFnTBean<F>
where
    F: FnMut(&SyncHandle) -> Result<(), BoxError> + Send + 'static,
{
    fn run(&mut self) -> Result<(), BoxError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or("synchronizable tbean started without a sync handle")?;
        (self.work)(handle)
    }

    fn as_synchronizable(&mut self) -> Option<&mut dyn Synchronizable> {
        Some(self)
    }
}

impl<F> Synchronizable for SyncFnTBean<F> {
    fn set_sync_handle(&mut self, handle: SyncHandle) {
        self.handle = Some(handle);
    }
}
