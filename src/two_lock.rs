use std::{fmt, ptr::NonNull};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    node::{self, Node},
    ConcurrentQueue, Handle,
};

/// Two-lock queue: enqueuers serialize on the tail lock, dequeuers on the
/// head lock, and the two sides never wait for each other.
///
/// Only the head-lock holder reads a node that is about to be unlinked, so the
/// old sentinel can be freed right away.
pub struct TwoLockQueue<T> {
    head: CachePadded<Mutex<NonNull<Node<T>>>>,
    tail: CachePadded<Mutex<NonNull<Node<T>>>>,
}

unsafe impl<T: Send> Send for TwoLockQueue<T> {}
unsafe impl<T: Send> Sync for TwoLockQueue<T> {}

impl<T> TwoLockQueue<T> {
    pub fn new() -> Self {
        let sentinel = unsafe { NonNull::new_unchecked(Node::sentinel()) };
        Self {
            head: CachePadded::new(Mutex::new(sentinel)),
            tail: CachePadded::new(Mutex::new(sentinel)),
        }
    }

    pub fn enqueue(&self, data: T) {
        let node = unsafe { NonNull::new_unchecked(Node::new(data)) };
        let mut tail = self.tail.lock();
        // The tail-lock holder is the only writer of the last link.
        let linked = unsafe { Node::link(tail.as_ptr(), node.as_ptr()) };
        debug_assert!(linked, "tail node already had a successor");
        *tail = node;
    }

    pub fn dequeue(&self) -> Option<T> {
        let mut head = self.head.lock();
        let sentinel = *head;
        let next = NonNull::new(unsafe { sentinel.as_ref() }.next_ptr())?;
        *head = next;
        // `next` becomes the sentinel, so its payload slot is left empty.
        let data = unsafe { next.as_ref().take() };
        drop(head);

        drop(unsafe { Box::from_raw(sentinel.as_ptr()) });
        Some(data)
    }
}

impl<T> Default for TwoLockQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for TwoLockQueue<T> {
    fn drop(&mut self) {
        let remaining = unsafe { node::free_list(self.head.get_mut().as_ptr()) };
        if remaining > 0 {
            debug!(remaining, "dropped two-lock queue with values still queued");
        }
    }
}

impl<T> fmt::Debug for TwoLockQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoLockQueue").finish_non_exhaustive()
    }
}

impl<T: Send> ConcurrentQueue<T> for TwoLockQueue<T> {
    fn new() -> Self {
        TwoLockQueue::new()
    }

    fn register(&self) -> impl Handle<T> {
        TwoLockHandle { queue: self }
    }
}

pub struct TwoLockHandle<'q, T> {
    queue: &'q TwoLockQueue<T>,
}

impl<T: Send> Handle<T> for TwoLockHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        self.queue.enqueue(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.dequeue()
    }
}
