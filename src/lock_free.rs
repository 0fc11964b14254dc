use std::fmt;

use crossbeam_utils::CachePadded;
use haphazard::{AtomicPtr, HazardPointer};
use tracing::debug;

use crate::{
    node::{self, Node},
    ConcurrentQueue, Handle,
};

/// Michael–Scott lock-free queue.
///
/// Nodes unlinked by a dequeue are retired to the global hazard-pointer
/// domain and only freed once no thread has them protected, so stale `head`
/// or `tail` snapshots held by other threads never dangle.
pub struct LockFreeQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

unsafe impl<T: Send + Sync> Send for LockFreeQueue<T> {}
unsafe impl<T: Send + Sync> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::sentinel();
        Self {
            head: CachePadded::new(unsafe { AtomicPtr::new(sentinel) }),
            tail: CachePadded::new(unsafe { AtomicPtr::new(sentinel) }),
        }
    }
}

impl<T: Send + Sync + 'static> LockFreeQueue<T> {
    pub fn enqueue(&self, data: T) {
        let mut hp = HazardPointer::new();
        self.enqueue_with(&mut hp, data);
    }

    pub fn dequeue(&self) -> Option<T> {
        let mut hp_head = HazardPointer::new();
        let mut hp_next = HazardPointer::new();
        self.dequeue_with(&mut hp_head, &mut hp_next)
    }

    pub fn enqueue_with(&self, hp: &mut HazardPointer<'static>, data: T) {
        let new_node = Node::new(data);

        loop {
            let tail = self
                .tail
                .safe_load(hp)
                .expect("tail always points at a node");
            let tail_ptr = tail as *const Node<T> as *mut Node<T>;
            let next_ptr = tail.next_ptr();

            if tail_ptr != self.tail.load_ptr() {
                continue;
            }
            if next_ptr.is_null() {
                // `tail` is protected by `hp`, so it cannot be freed under us.
                if unsafe { Node::link(tail_ptr, new_node) } {
                    // Best effort: whoever sees the lag next will advance it.
                    let _ = unsafe { self.tail.compare_exchange_ptr(tail_ptr, new_node) };
                    return;
                }
            } else {
                // Help the partially completed enqueue
                let _ = unsafe { self.tail.compare_exchange_ptr(tail_ptr, next_ptr) };
            }
        }
    }

    pub fn dequeue_with(
        &self,
        hp_head: &mut HazardPointer<'static>,
        hp_next: &mut HazardPointer<'static>,
    ) -> Option<T> {
        loop {
            let head = self
                .head
                .safe_load(hp_head)
                .expect("head always points at a node");
            let head_ptr = head as *const Node<T> as *mut Node<T>;
            let tail_ptr = self.tail.load_ptr();
            let next_ptr = head.next_ptr();

            if head_ptr != self.head.load_ptr() {
                continue;
            }
            if head_ptr == tail_ptr {
                if next_ptr.is_null() {
                    return None;
                }
                // Tail is lagging behind a completed link
                let _ = unsafe { self.tail.compare_exchange_ptr(tail_ptr, next_ptr) };
                continue;
            }

            let Some(next) = head.next().safe_load(hp_next) else {
                continue;
            };
            let next_ptr = next as *const Node<T> as *mut Node<T>;
            // `next` is only retired after head has moved past it, so it is
            // safe to use as long as head has not moved since the protection.
            if head_ptr != self.head.load_ptr() {
                continue;
            }

            if let Ok(unlinked) = unsafe { self.head.compare_exchange_ptr(head_ptr, next_ptr) } {
                // Only the winner of the head CAS gets here for `next`, and
                // `next` stays protected by `hp_next` while we move out of it.
                let data = unsafe { next.take() };
                if let Some(unlinked) = unlinked {
                    unsafe {
                        unlinked.retire();
                    }
                }
                return Some(data);
            }
        }
    }

    pub fn register(&self) -> LockFreeHandle<'_, T> {
        LockFreeHandle::new(self)
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // Nodes retired earlier are no longer reachable from head, so this
        // never frees anything the hazard-pointer domain still owns.
        let remaining = unsafe { node::free_list(self.head.load_ptr()) };
        if remaining > 0 {
            debug!(remaining, "dropped lock-free queue with values still queued");
        }
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("head", &self.head.load_ptr())
            .field("tail", &self.tail.load_ptr())
            .finish()
    }
}

impl<T: Send + Sync + 'static> ConcurrentQueue<T> for LockFreeQueue<T> {
    fn new() -> Self {
        LockFreeQueue::new()
    }

    fn register(&self) -> impl Handle<T> {
        LockFreeHandle::new(self)
    }
}

/// Per-thread handle that keeps its hazard pointers across operations.
pub struct LockFreeHandle<'q, T> {
    hz1: HazardPointer<'static>,
    hz2: HazardPointer<'static>,
    queue: &'q LockFreeQueue<T>,
}

impl<'q, T: Send + Sync + 'static> LockFreeHandle<'q, T> {
    pub fn new(queue: &'q LockFreeQueue<T>) -> Self {
        Self {
            hz1: HazardPointer::new(),
            hz2: HazardPointer::new(),
            queue,
        }
    }

    pub fn enqueue(&mut self, data: T) {
        self.queue.enqueue_with(&mut self.hz1, data);
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.queue.dequeue_with(&mut self.hz1, &mut self.hz2)
    }
}

impl<T: Send + Sync + 'static> Handle<T> for LockFreeHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        LockFreeHandle::enqueue(self, item);
    }

    fn dequeue(&mut self) -> Option<T> {
        LockFreeHandle::dequeue(self)
    }
}

impl<T> fmt::Debug for LockFreeHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeHandle")
            .field("queue", self.queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::LockFreeQueue;
    use crate::node::Node;

    /// Links `value` after the current tail without swinging `queue.tail`,
    /// leaving the queue in the state a stalled enqueuer leaves behind.
    fn link_past_tail(queue: &LockFreeQueue<u32>, value: u32) -> *mut Node<u32> {
        let node = Node::new(value);
        unsafe { assert!(Node::link(queue.tail.load_ptr(), node)) };
        node
    }

    #[test]
    fn empty_until_enqueued() {
        let queue = LockFreeQueue::<u64>::new();
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.dequeue(), None);
        queue.enqueue(7);
        assert_eq!(queue.dequeue(), Some(7));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn refill_after_partial_drain() {
        let queue = LockFreeQueue::new();
        let mut handle = queue.register();
        (0..4).for_each(|i| handle.enqueue(i));
        assert_eq!(handle.dequeue(), Some(0));
        (4..8).for_each(|i| handle.enqueue(i));
        let drained: Vec<_> = std::iter::from_fn(|| handle.dequeue()).collect();
        assert_eq!(drained, (1..8).collect::<Vec<_>>());
        assert_eq!(handle.dequeue(), None);
    }

    #[test]
    fn inherent_and_handle_calls_mix() {
        let queue = LockFreeQueue::new();
        queue.enqueue(String::from("a"));
        let mut handle = queue.register();
        handle.enqueue(String::from("b"));
        assert_eq!(queue.dequeue().as_deref(), Some("a"));
        assert_eq!(handle.dequeue().as_deref(), Some("b"));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn enqueue_helps_lagging_tail() {
        let queue = LockFreeQueue::new();
        queue.enqueue(1);
        let stalled = link_past_tail(&queue, 2);
        assert_ne!(queue.tail.load_ptr(), stalled);

        queue.enqueue(3);
        let tail = queue.tail.load_ptr();
        assert_ne!(tail, stalled);
        assert_eq!(unsafe { (*stalled).next_ptr() }, tail);
        assert!(unsafe { (*tail).next_ptr() }.is_null());

        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn dequeue_helps_lagging_tail() {
        let queue = LockFreeQueue::new();
        assert_eq!(queue.head.load_ptr(), queue.tail.load_ptr());
        let stalled = link_past_tail(&queue, 4);

        assert_eq!(queue.dequeue(), Some(4));
        assert_eq!(queue.tail.load_ptr(), stalled);
        assert_eq!(queue.head.load_ptr(), queue.tail.load_ptr());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn drop_releases_queued_values() {
        let tracker = Arc::new(());
        let queue = LockFreeQueue::new();
        for _ in 0..10 {
            queue.enqueue(Arc::clone(&tracker));
        }
        let taken = [queue.dequeue(), queue.dequeue()];
        assert_eq!(Arc::strong_count(&tracker), 11);
        // The node that held the last taken value is the sentinel now; the
        // queue must not drop its payload slot a second time.
        drop(queue);
        assert_eq!(Arc::strong_count(&tracker), 3);
        drop(taken);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn producers_keep_their_own_order() {
        const PER_PRODUCER: usize = 1_000;
        let queue = LockFreeQueue::new();
        std::thread::scope(|s| {
            for producer in 0..4 {
                let queue = &queue;
                s.spawn(move || {
                    let mut handle = queue.register();
                    (0..PER_PRODUCER).for_each(|i| handle.enqueue((producer, i)));
                });
            }
        });

        let mut next = [0; 4];
        while let Some((producer, i)) = queue.dequeue() {
            assert_eq!(next[producer], i);
            next[producer] += 1;
        }
        assert_eq!(next, [PER_PRODUCER; 4]);
    }

    #[test]
    fn recycled_values_are_neither_lost_nor_duplicated() {
        const VALUES: usize = 2_000;
        let queue = LockFreeQueue::new();
        (0..VALUES).for_each(|i| queue.enqueue(i));

        // Every thread keeps moving values from the front to the back, which
        // retires nodes while other threads still hold snapshots of them.
        let moved = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let mut handle = queue.register();
                    while moved.fetch_add(1, Ordering::Relaxed) < VALUES * 10 {
                        if let Some(v) = handle.dequeue() {
                            handle.enqueue(v);
                        }
                    }
                });
            }
        });

        let collected = Mutex::new(Vec::with_capacity(VALUES));
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let mut handle = queue.register();
                    let local: Vec<_> = std::iter::from_fn(|| handle.dequeue()).collect();
                    collected.lock().unwrap().extend(local);
                });
            }
        });
        let mut collected = collected.into_inner().unwrap();
        collected.sort_unstable();
        assert_eq!(collected, (0..VALUES).collect::<Vec<_>>());
    }
}
