use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};
use tokio::sync::Semaphore;

/// One flag per raster offset, set while the offset is queued or being handled by a worker.
///
/// Only the scanner flips an entry to `true` and only the worker that dequeued the offset
/// flips it back.
pub struct PendingSet {
    flags: Box<[Cell<bool>]>,
}

impl PendingSet {
    pub fn new(len: usize) -> Self {
        Self {
            flags: (0..len).map(|_| Cell::new(false)).collect(),
        }
    }

    /// Mark `offset` as pending. Returns `false` if it already was.
    #[inline]
    pub fn try_mark(&self, offset: usize) -> bool {
        !self.flags[offset].replace(true)
    }

    #[inline]
    pub fn clear(&self, offset: usize) {
        self.flags[offset].set(false);
    }

    #[inline]
    pub fn is_pending(&self, offset: usize) -> bool {
        self.flags[offset].get()
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|flag| flag.get()).count()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Bounded FIFO of raster offsets.
///
/// `items` holds one permit per queued offset and `slots` one per free slot, so both
/// `push` and `pop` are cancel-safe: dropping either future before it resolves leaves the
/// queue untouched.
pub struct WaitQueue {
    offsets: RefCell<VecDeque<usize>>,
    items: Semaphore,
    slots: Semaphore,
}

impl WaitQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            offsets: RefCell::new(VecDeque::with_capacity(capacity)),
            items: Semaphore::new(0),
            slots: Semaphore::new(capacity),
        }
    }

    /// Wait for a free slot and append `offset`. Returns `false` once the queue is closed.
    pub async fn push(&self, offset: usize) -> bool {
        let Ok(slot) = self.slots.acquire().await else {
            return false;
        };
        slot.forget();

        self.offsets.borrow_mut().push_back(offset);
        self.items.add_permits(1);
        true
    }

    /// Wait for the oldest offset. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<usize> {
        let item = self.items.acquire().await.ok()?;
        item.forget();
        self.take_front()
    }

    pub fn try_pop(&self) -> Option<usize> {
        let item = self.items.try_acquire().ok()?;
        item.forget();
        self.take_front()
    }

    fn take_front(&self) -> Option<usize> {
        let offset = self.offsets.borrow_mut().pop_front();
        if offset.is_some() {
            self.slots.add_permits(1);
        }
        offset
    }

    /// Wake every waiter; later pushes and pops fail.
    pub fn close(&self) {
        self.items.close();
        self.slots.close();
    }

    pub fn len(&self) -> usize {
        self.offsets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.borrow().is_empty()
    }
}
