#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod park;
pub mod raw;
pub mod rwsem;
mod waiter;

#[cfg(any(test, feature = "std"))]
pub use park::ThreadPark;
pub use park::{DefaultPark, Park, SpinPark};
pub use raw::RawRwSemaphore;
pub use rwsem::{ReadGuard, RwSemaphore, WriteGuard};
