use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{ConcurrentQueue, Handle};

/// Wraps a queue and counts successful enqueues and dequeues.
pub struct CountingQueue<Q, T> {
    queue: Q,
    enq_count: AtomicUsize,
    deq_count: AtomicUsize,
    _phantom_data: PhantomData<fn(T) -> T>,
}

impl<Q: ConcurrentQueue<T>, T> CountingQueue<Q, T> {
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            enq_count: 0.into(),
            deq_count: 0.into(),
            _phantom_data: PhantomData,
        }
    }

    pub fn enq_count(&self) -> usize {
        self.enq_count.load(Ordering::Relaxed)
    }

    pub fn deq_count(&self) -> usize {
        self.deq_count.load(Ordering::Relaxed)
    }

    /// Values enqueued but not yet dequeued. Only exact when no operation is
    /// in flight.
    pub fn len_hint(&self) -> usize {
        self.enq_count().saturating_sub(self.deq_count())
    }
}

impl<Q: ConcurrentQueue<T>, T> ConcurrentQueue<T> for CountingQueue<Q, T> {
    fn new() -> Self {
        CountingQueue::new(Q::new())
    }

    fn register(&self) -> impl Handle<T> {
        CountingHandle {
            handle: self.queue.register(),
            enq_count: &self.enq_count,
            deq_count: &self.deq_count,
        }
    }
}

impl<Q: fmt::Debug, T> fmt::Debug for CountingQueue<Q, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingQueue")
            .field("queue", &self.queue)
            .field("enq_count", &self.enq_count)
            .field("deq_count", &self.deq_count)
            .finish()
    }
}

struct CountingHandle<'q, H> {
    handle: H,
    enq_count: &'q AtomicUsize,
    deq_count: &'q AtomicUsize,
}

impl<H: Handle<T>, T> Handle<T> for CountingHandle<'_, H> {
    fn enqueue(&mut self, item: T) {
        self.handle.enqueue(item);
        self.enq_count.fetch_add(1, Ordering::Relaxed);
    }

    fn dequeue(&mut self) -> Option<T> {
        let item = self.handle.dequeue()?;
        self.deq_count.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }
}
