//! Waiter records and the FIFO queue they are linked into.
//!
//! A [`Waiter`] lives on the stack of the thread that is blocked on it. The
//! queue only borrows it: a record is linked in by its owner, unlinked by
//! whoever grants it, and must not be touched after its `pending` flag is
//! cleared because the owner is then free to return and pop its frame.

use core::{
    cell::{Cell, UnsafeCell},
    ptr::NonNull,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::park::Park;

/// Access mode a waiter asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Read,
    Write,
}

pub(crate) struct Waiter<P: Park> {
    mode: Mode,
    task: UnsafeCell<Option<P::Handle>>,
    pending: AtomicBool,
    next: Cell<Option<NonNull<Waiter<P>>>>,
}

impl<P: Park> Waiter<P> {
    pub(crate) fn new(mode: Mode, task: P::Handle) -> Self {
        Self {
            mode,
            task: UnsafeCell::new(Some(task)),
            pending: AtomicBool::new(true),
            next: Cell::new(None),
        }
    }

    #[inline(always)]
    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    #[inline(always)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Blocks until the record has been granted.
    pub(crate) fn wait(&self) {
        while self.is_pending() {
            P::park();
        }
    }

    /// Hands the lock to the owner of `this` and wakes it up.
    ///
    /// # Safety
    ///
    /// `this` must point to a live record that was just unlinked from its
    /// queue while holding the queue's lock, and must not have been granted
    /// before.
    pub(crate) unsafe fn grant(this: NonNull<Self>) {
        let waiter = unsafe { this.as_ref() };
        let task = unsafe { (*waiter.task.get()).take() };

        // Once this store is visible the owner may return and `waiter` dangles.
        waiter.pending.store(false, Ordering::Release);

        if let Some(task) = task {
            P::unpark(task);
        }
    }
}

/// Intrusive FIFO of borrowed waiter records.
pub(crate) struct WaitQueue<P: Park> {
    head: Option<NonNull<Waiter<P>>>,
    tail: Option<NonNull<Waiter<P>>>,
    len: usize,
}

// Records are only reached through the queue while its lock is held.
unsafe impl<P: Park> Send for WaitQueue<P> {}

impl<P: Park> WaitQueue<P> {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// True when the queue holds exactly one record.
    #[inline(always)]
    pub(crate) fn is_singular(&self) -> bool {
        self.len == 1
    }

    pub(crate) fn front(&self) -> Option<&Waiter<P>> {
        self.head.map(|head| unsafe { &*head.as_ptr() })
    }

    /// Links `waiter` in at the tail.
    ///
    /// # Safety
    ///
    /// The record must not move or be dropped until it has been popped.
    pub(crate) unsafe fn push_back(&mut self, waiter: NonNull<Waiter<P>>) {
        unsafe { waiter.as_ref() }.next.set(None);

        match self.tail {
            Some(tail) => unsafe { tail.as_ref() }.next.set(Some(waiter)),
            None => self.head = Some(waiter),
        }

        self.tail = Some(waiter);
        self.len += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<NonNull<Waiter<P>>> {
        let head = self.head?;
        let next = unsafe { head.as_ref() }.next.take();

        self.head = next;
        if next.is_none() {
            self.tail = None;
        }
        self.len -= 1;

        Some(head)
    }

    pub(crate) fn iter(&self) -> Iter<'_, P> {
        Iter {
            next: self.head,
            _queue: self,
        }
    }
}

pub(crate) struct Iter<'a, P: Park> {
    next: Option<NonNull<Waiter<P>>>,
    _queue: &'a WaitQueue<P>,
}

impl<'a, P: Park> Iterator for Iter<'a, P> {
    type Item = &'a Waiter<P>;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = unsafe { &*self.next?.as_ptr() };
        self.next = cur.next.get();
        Some(cur)
    }
}
