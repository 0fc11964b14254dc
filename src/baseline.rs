//! [`ConcurrentQueue`] impls for established third-party unbounded queues,
//! used as reference points in benchmarks.

use crate::{ConcurrentQueue, Handle};

/// The push/pop surface the third-party queues have in common.
trait Unbounded<T> {
    fn create() -> Self;
    fn push(&self, item: T);
    fn pop(&self) -> Option<T>;
}

impl<T> Unbounded<T> for crossbeam_queue::SegQueue<T> {
    fn create() -> Self {
        Self::new()
    }

    fn push(&self, item: T) {
        crossbeam_queue::SegQueue::push(self, item);
    }

    fn pop(&self) -> Option<T> {
        crossbeam_queue::SegQueue::pop(self)
    }
}

impl<T> Unbounded<T> for lockfree::queue::Queue<T> {
    fn create() -> Self {
        Self::new()
    }

    fn push(&self, item: T) {
        lockfree::queue::Queue::push(self, item);
    }

    fn pop(&self) -> Option<T> {
        lockfree::queue::Queue::pop(self)
    }
}

impl<T> Unbounded<T> for concurrent_queue::ConcurrentQueue<T> {
    fn create() -> Self {
        Self::unbounded()
    }

    fn push(&self, item: T) {
        // Only a closed queue rejects pushes, and nothing closes it.
        let _ = concurrent_queue::ConcurrentQueue::push(self, item);
    }

    fn pop(&self) -> Option<T> {
        concurrent_queue::ConcurrentQueue::pop(self).ok()
    }
}

/// Borrowed handle; the third-party queues keep no per-thread state.
struct Shared<'q, Q>(&'q Q);

impl<Q: Unbounded<T>, T> Handle<T> for Shared<'_, Q> {
    fn enqueue(&mut self, item: T) {
        self.0.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.0.pop()
    }
}

macro_rules! impl_concurrent_queue {
    ($($queue:ty),* $(,)?) => {
        $(
            impl<T> ConcurrentQueue<T> for $queue {
                fn new() -> Self {
                    <Self as Unbounded<T>>::create()
                }

                fn register(&self) -> impl Handle<T> {
                    Shared(self)
                }
            }
        )*
    };
}

impl_concurrent_queue!(
    crossbeam_queue::SegQueue<T>,
    lockfree::queue::Queue<T>,
    concurrent_queue::ConcurrentQueue<T>,
);
