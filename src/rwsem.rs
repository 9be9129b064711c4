//! A fair reader/writer semaphore guarding a value. Inspired by [rwsem from linux](https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git/tree/lib/rwsem.c)

use core::{
    cell::UnsafeCell,
    fmt,
    mem,
    ops::{Deref, DerefMut},
};

use crate::{
    park::{DefaultPark, Park},
    raw::RawRwSemaphore,
};

/// A [read-write lock](https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock) that puts
/// contending threads to sleep in arrival order
///
/// Uncontended `read` and `write` cost one atomic add. Under contention the caller joins a
/// FIFO queue and parks through `P` until the lock is handed to it, so neither readers nor
/// writers can starve: a reader arriving after a queued writer waits behind that writer.
///
/// When a writer releases, every reader queued directly behind it is let in at once. A
/// writer may also [`downgrade`](WriteGuard::downgrade) to a reader without ever
/// letting go of the lock, which admits the readers queued at the head as well.
pub struct RwSemaphore<T: ?Sized, P: Park = DefaultPark> {
    raw: RawRwSemaphore<P>,
    data: UnsafeCell<T>,
}

/// Guard that provides read-only access to underlying data
pub struct ReadGuard<'a, T: ?Sized + 'a, P: Park = DefaultPark> {
    lock: &'a RwSemaphore<T, P>,
    data: &'a T,
}

/// Guard that provides read-write access to underlying data
/// WriteGuard<T> guarantees exclusive access.
pub struct WriteGuard<'a, T: ?Sized + 'a, P: Park = DefaultPark> {
    lock: &'a RwSemaphore<T, P>,
    data: &'a mut T,
}

impl<T, P: Park> RwSemaphore<T, P> {
    /// Creates a new semaphore wrapping passed data
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            raw: RawRwSemaphore::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the semaphore, returning the underlying data
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, P: Park> RwSemaphore<T, P> {
    /// Tries to acquire the semaphore for write.
    ///
    /// Returns Some(WriteGuard<T>) if it was acquired, None otherwise
    #[inline]
    pub fn try_write(&self) -> Option<WriteGuard<'_, T, P>> {
        if self.raw.try_down_write() {
            Some(WriteGuard {
                lock: self,
                data: unsafe { &mut *self.data.get() },
            })
        } else {
            None
        }
    }

    /// Tries to acquire the semaphore for read
    ///
    /// Fails while a writer holds it or anybody is queued, so it never jumps the queue.
    #[inline]
    pub fn try_read(&self) -> Option<ReadGuard<'_, T, P>> {
        if self.raw.try_down_read() {
            Some(ReadGuard {
                lock: self,
                data: unsafe { &*self.data.get() },
            })
        } else {
            None
        }
    }

    /// Acquire the semaphore for read
    ///
    /// Returns ReadGuard<T>
    ///
    /// Any number of readers may hold it at once. This function is divided into fast and slow
    /// path. Fast path is inlined, slow path is not
    #[inline(always)]
    pub fn read(&self) -> ReadGuard<'_, T, P> {
        self.raw.down_read();

        ReadGuard {
            lock: self,
            data: unsafe { &*self.data.get() },
        }
    }

    /// Acquire the semaphore for write
    ///
    /// Returns WriteGuard<T>
    ///
    /// This function is divided into fast and slow path. Fast path is inlined, slow path is not
    #[inline(always)]
    pub fn write(&self) -> WriteGuard<'_, T, P> {
        self.raw.down_write();

        WriteGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// Returns a mutable reference to the underlying data. No locking is needed, since
    /// `&mut self` proves nobody else can hold a guard
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// The semaphore backing this lock
    pub fn raw(&self) -> &RawRwSemaphore<P> {
        &self.raw
    }
}

impl<'a, T: ?Sized, P: Park> WriteGuard<'a, T, P> {
    /// Atomically turns write access into read access
    ///
    /// The lock is never released in between, so no writer can get in. Readers queued at the
    /// head are admitted alongside.
    pub fn downgrade(this: Self) -> ReadGuard<'a, T, P> {
        let lock = this.lock;
        mem::forget(this);

        unsafe { lock.raw.downgrade_write() };

        ReadGuard {
            lock,
            data: unsafe { &*lock.data.get() },
        }
    }
}

impl<T: Default, P: Park> Default for RwSemaphore<T, P> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug, P: Park> fmt::Debug for RwSemaphore<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwSemaphore");
        match self.try_read() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

impl<'a, T: ?Sized, P: Park> Drop for ReadGuard<'a, T, P> {
    #[inline(always)]
    fn drop(&mut self) {
        unsafe { self.lock.raw.up_read() };
    }
}

impl<'a, T: ?Sized, P: Park> Drop for WriteGuard<'a, T, P> {
    #[inline(always)]
    fn drop(&mut self) {
        unsafe { self.lock.raw.up_write() };
    }
}

impl<'a, T: ?Sized, P: Park> Deref for ReadGuard<'a, T, P> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<'a, T: ?Sized, P: Park> Deref for WriteGuard<'a, T, P> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<'a, T: ?Sized, P: Park> DerefMut for WriteGuard<'a, T, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

unsafe impl<T: ?Sized + Send + Sync, P: Park> Sync for RwSemaphore<T, P> {}
unsafe impl<T: ?Sized + Send, P: Park> Send for RwSemaphore<T, P> {}
