//! The raw reader/writer semaphore: one counter word plus a FIFO of sleepers.
//!
//! # Counter layout
//!
//! The low `ACTIVE_MASK` bits count active holders (each reader adds one, a
//! writer adds one). A writer additionally adds `WAITING_BIAS`, and so does a
//! non-empty wait queue. That gives:
//!
//! | count                               | meaning                             |
//! |-------------------------------------|-------------------------------------|
//! | `0`                                 | unlocked, nobody waiting            |
//! | `n > 0`                             | `n` readers, nobody waiting         |
//! | `WAITING_BIAS + 1`                  | one writer, nobody waiting          |
//! | `WAITING_BIAS`                      | unlocked, waiters queued            |
//! | `WAITING_BIAS + n`                  | `n` readers, waiters queued         |
//! | `2 * WAITING_BIAS + 1`              | one writer, waiters queued          |
//!
//! Uncontended acquire and release are a single atomic add. Everything else
//! takes the wait lock and goes through [`RawRwSemaphore::do_wake`], which
//! grants either the writer at the head of the queue or the whole run of
//! readers at the head, never skipping over anyone.

use core::{
    ptr::NonNull,
    sync::atomic::{AtomicIsize, Ordering},
};
use spin::mutex::TicketMutex;
use static_assertions::{const_assert, const_assert_eq};

use crate::{
    park::{DefaultPark, Park},
    waiter::{Mode, WaitQueue, Waiter},
};

pub const UNLOCKED_VALUE: isize = 0;
pub const ACTIVE_BIAS: isize = 1;

#[cfg(target_pointer_width = "64")]
pub const ACTIVE_MASK: isize = 0xffff_ffff;

#[cfg(not(target_pointer_width = "64"))]
pub const ACTIVE_MASK: isize = 0xffff;

pub const WAITING_BIAS: isize = -ACTIVE_MASK - 1;
pub const ACTIVE_READ_BIAS: isize = ACTIVE_BIAS;
pub const ACTIVE_WRITE_BIAS: isize = WAITING_BIAS + ACTIVE_BIAS;

const_assert!(WAITING_BIAS < 0);
const_assert!(ACTIVE_WRITE_BIAS < 0);
const_assert_eq!(WAITING_BIAS & ACTIVE_MASK, 0);
const_assert_eq!(ACTIVE_WRITE_BIAS & ACTIVE_MASK, ACTIVE_BIAS);

/// Why [`RawRwSemaphore::do_wake`] is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeScope {
    /// The last holder released. Readers or a writer may be granted.
    Any,
    /// An enqueuing thread observed no active holders.
    NoActive,
    /// The lock is held for read; only more readers may be admitted.
    ReadOwned,
}

/// A fair reader/writer semaphore without attached data.
///
/// Waiters are served strictly in arrival order. A reader that arrives while
/// a writer is queued sleeps behind that writer, and a run of readers at the
/// head of the queue is admitted together by a single counter update.
pub struct RawRwSemaphore<P: Park = DefaultPark> {
    count: AtomicIsize,
    wait_lock: TicketMutex<WaitQueue<P>>,
}

impl<P: Park> RawRwSemaphore<P> {
    /// Creates an unlocked semaphore with an empty wait queue.
    pub const fn new() -> Self {
        Self {
            count: AtomicIsize::new(UNLOCKED_VALUE),
            wait_lock: TicketMutex::new(WaitQueue::new()),
        }
    }

    /// Current raw counter value. Only meaningful as a snapshot.
    pub fn count(&self) -> isize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns true if the semaphore is held in any mode or has waiters.
    pub fn is_locked(&self) -> bool {
        self.count() != UNLOCKED_VALUE
    }

    /// Returns true if some thread is queued.
    pub fn has_waiters(&self) -> bool {
        !self.wait_lock.lock().is_empty()
    }

    /// Number of queued threads.
    pub fn waiters(&self) -> usize {
        self.wait_lock.lock().len()
    }

    #[inline(always)]
    fn update(&self, adjustment: isize, order: Ordering) -> isize {
        self.count.fetch_add(adjustment, order).wrapping_add(adjustment)
    }

    #[inline(always)]
    pub(crate) fn down_read_fast(&self) -> bool {
        self.update(ACTIVE_READ_BIAS, Ordering::Acquire) > 0
    }

    #[inline(always)]
    pub(crate) fn down_write_fast(&self) -> bool {
        self.update(ACTIVE_WRITE_BIAS, Ordering::Acquire) == ACTIVE_WRITE_BIAS
    }

    /// Acquires a read slot, sleeping while a writer holds the semaphore or
    /// anyone is queued.
    #[inline(always)]
    pub fn down_read(&self) {
        if !self.down_read_fast() {
            self.down_failed(Mode::Read);
        }
    }

    /// Acquires the write slot, sleeping while anyone else holds the
    /// semaphore or is queued.
    #[inline(always)]
    pub fn down_write(&self) {
        if !self.down_write_fast() {
            self.down_failed(Mode::Write);
        }
    }

    /// Tries to acquire a read slot without sleeping.
    pub fn try_down_read(&self) -> bool {
        let mut count = self.count.load(Ordering::Relaxed);

        while count >= 0 {
            match self.count.compare_exchange_weak(
                count,
                count + ACTIVE_READ_BIAS,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(cur) => count = cur,
            }
        }

        false
    }

    /// Tries to acquire the write slot without sleeping.
    pub fn try_down_write(&self) -> bool {
        self.count
            .compare_exchange(
                UNLOCKED_VALUE,
                ACTIVE_WRITE_BIAS,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Releases a read slot.
    ///
    /// # Safety
    ///
    /// The caller must hold a read slot acquired from this semaphore.
    #[inline(always)]
    pub unsafe fn up_read(&self) {
        let count = self.update(-ACTIVE_READ_BIAS, Ordering::Release);
        debug_assert!(
            count.wrapping_add(ACTIVE_READ_BIAS) & ACTIVE_MASK != 0,
            "rwsem: read release without an active holder"
        );

        if count < -1 && count & ACTIVE_MASK == 0 {
            self.wake();
        }
    }

    /// Releases the write slot.
    ///
    /// # Safety
    ///
    /// The caller must hold the write slot of this semaphore.
    #[inline(always)]
    pub unsafe fn up_write(&self) {
        let count = self.update(-ACTIVE_WRITE_BIAS, Ordering::Release);
        debug_assert!(
            Self::write_held(count.wrapping_add(ACTIVE_WRITE_BIAS)),
            "rwsem: write release without holding the write slot"
        );

        if count < 0 {
            self.wake();
        }
    }

    /// Turns the held write slot into a read slot and admits any readers
    /// queued at the head.
    ///
    /// # Safety
    ///
    /// The caller must hold the write slot of this semaphore. It holds a read
    /// slot afterwards.
    #[inline(always)]
    pub unsafe fn downgrade_write(&self) {
        let count = self.update(-WAITING_BIAS, Ordering::AcqRel);
        debug_assert!(
            Self::write_held(count.wrapping_add(WAITING_BIAS)),
            "rwsem: downgrade without holding the write slot"
        );

        if count < 0 {
            self.downgrade_wake();
        }
    }

    /// Whether `count` is a value seen by a thread that holds the write slot.
    /// Failed fast paths may still have their bias applied, so this only
    /// rules out counts no writer could ever see.
    #[inline(always)]
    fn write_held(count: isize) -> bool {
        count < 0 && count & ACTIVE_MASK != 0
    }

    #[cold]
    fn down_failed(&self, mode: Mode) {
        log::trace!("rwsem {:p}: {:?} contended, queueing", self, mode);

        let waiter = Waiter::<P>::new(mode, P::current());

        // SAFETY: `waiter` stays on this frame until `wait` observes the grant.
        unsafe { self.enqueue(&waiter) };
        waiter.wait();

        log::trace!("rwsem {:p}: {:?} granted", self, mode);
    }

    /// Queues `waiter` and backs out the bias its failed fast path added.
    /// Grants whatever became available if the semaphore turns out to be
    /// free, possibly `waiter` itself.
    ///
    /// # Safety
    ///
    /// The fast path for `waiter.mode()` must have just failed on this
    /// semaphore, and `waiter` must stay in place until it is granted.
    pub(crate) unsafe fn enqueue(&self, waiter: &Waiter<P>) {
        let mut adjustment = match waiter.mode() {
            Mode::Read => -ACTIVE_READ_BIAS,
            Mode::Write => -ACTIVE_WRITE_BIAS,
        };

        let mut queue = self.wait_lock.lock();

        let was_empty = queue.is_empty();
        if was_empty {
            adjustment += WAITING_BIAS;
        }
        unsafe { queue.push_back(NonNull::from(waiter)) };

        let count = self.update(adjustment, Ordering::AcqRel);

        if count == WAITING_BIAS {
            self.do_wake(&mut queue, WakeScope::NoActive);
        } else if count > WAITING_BIAS {
            // No writer is active, so the holders are readers.
            match waiter.mode() {
                // Anybody queued ahead of us that is a reader can join them.
                Mode::Write if !was_empty => {
                    self.do_wake(&mut queue, WakeScope::ReadOwned);
                }
                // Nobody is ahead of us, e.g. a writer downgraded after our
                // fast path failed.
                Mode::Read if was_empty => {
                    self.do_wake(&mut queue, WakeScope::ReadOwned);
                }
                _ => {}
            }
        }
    }

    /// Grants the head of the queue: either one writer, or every reader up
    /// to the first queued writer. Returns how many waiters were granted.
    ///
    /// Must be called with the wait lock held, which `queue` witnesses.
    pub(crate) fn do_wake(&self, queue: &mut WaitQueue<P>, scope: WakeScope) -> usize {
        let Some(front) = queue.front() else {
            return 0;
        };

        if front.mode() == Mode::Write {
            if scope == WakeScope::ReadOwned {
                return 0;
            }

            let mut adjustment = ACTIVE_WRITE_BIAS;
            if queue.is_singular() {
                adjustment -= WAITING_BIAS;
            }

            loop {
                let old = self.update(adjustment, Ordering::AcqRel).wrapping_sub(adjustment);
                if old & ACTIVE_MASK == 0 {
                    break;
                }

                // A fast path got in first. If it has already left again
                // nobody else will wake the writer, so retry.
                if self.update(-adjustment, Ordering::AcqRel) & ACTIVE_MASK != 0 {
                    return 0;
                }
            }

            if let Some(writer) = queue.pop_front() {
                // SAFETY: just unlinked under the wait lock.
                unsafe { Waiter::grant(writer) };
            }

            return 1;
        }

        // A writer may have taken the semaphore through the fast path after
        // the release that brought us here. It will wake the readers itself.
        if scope == WakeScope::Any && self.count.load(Ordering::Acquire) < WAITING_BIAS {
            return 0;
        }

        let mut woken = 0;
        let mut drained = true;
        for waiter in queue.iter() {
            if waiter.mode() == Mode::Write {
                drained = false;
                break;
            }
            woken += 1;
        }

        let mut adjustment = woken as isize * ACTIVE_READ_BIAS;
        if drained {
            adjustment -= WAITING_BIAS;
        }
        self.update(adjustment, Ordering::AcqRel);

        for _ in 0..woken {
            if let Some(reader) = queue.pop_front() {
                // SAFETY: just unlinked under the wait lock.
                unsafe { Waiter::grant(reader) };
            }
        }

        woken
    }

    /// Wakes whoever can run after a release left no active holders.
    #[cold]
    pub(crate) fn wake(&self) {
        let mut queue = self.wait_lock.lock();
        let woken = if queue.is_empty() {
            0
        } else {
            self.do_wake(&mut queue, WakeScope::Any)
        };
        drop(queue);

        log::trace!("rwsem {:p}: release woke {} waiter(s)", self, woken);
    }

    /// Admits readers queued at the head after a downgrade.
    #[cold]
    pub(crate) fn downgrade_wake(&self) {
        let mut queue = self.wait_lock.lock();
        let woken = if queue.is_empty() {
            0
        } else {
            self.do_wake(&mut queue, WakeScope::ReadOwned)
        };
        drop(queue);

        log::trace!("rwsem {:p}: downgrade woke {} reader(s)", self, woken);
    }
}

impl<P: Park> Default for RawRwSemaphore<P> {
    fn default() -> Self {
        Self::new()
    }
}
