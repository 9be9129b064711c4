//! How a blocked waiter sleeps and how a waker gets it running again.
//!
//! The semaphore itself never decides how to block. A waiter publishes a
//! [`Park::Handle`] for itself, then calls [`Park::park`] until its request is
//! granted; the granting thread hands the handle back to [`Park::unpark`].

use core::marker::PhantomData;
use spin::{relax::Spin, RelaxStrategy};

/// Scheduler interface consumed by the semaphore slow path.
///
/// `park` is allowed to return spuriously: callers always re-check their own
/// grant flag after it returns.
pub trait Park {
    /// Identifies a parked thread. Moved from the waiter to the waker.
    type Handle: Send;

    /// Returns a handle for the calling thread.
    fn current() -> Self::Handle;

    /// Blocks the calling thread until it is notified.
    fn park();

    /// Notifies the thread identified by `handle`.
    fn unpark(handle: Self::Handle);
}

/// Busy-waits using a [`RelaxStrategy`]. Works without an OS.
pub struct SpinPark<R = Spin>(PhantomData<R>);

impl<R: RelaxStrategy> Park for SpinPark<R> {
    type Handle = ();

    #[inline(always)]
    fn current() -> Self::Handle {}

    #[inline(always)]
    fn park() {
        R::relax();
    }

    #[inline(always)]
    fn unpark(_handle: Self::Handle) {}
}

/// Sleeps through [`std::thread::park`].
#[cfg(any(test, feature = "std"))]
pub struct ThreadPark;

#[cfg(any(test, feature = "std"))]
impl Park for ThreadPark {
    type Handle = std::thread::Thread;

    fn current() -> Self::Handle {
        std::thread::current()
    }

    fn park() {
        std::thread::park();
    }

    fn unpark(handle: Self::Handle) {
        handle.unpark();
    }
}

/// Parking strategy used when none is named.
#[cfg(feature = "std")]
pub type DefaultPark = ThreadPark;

/// Parking strategy used when none is named.
#[cfg(not(feature = "std"))]
pub type DefaultPark = SpinPark;
