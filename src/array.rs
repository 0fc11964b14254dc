use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

use crate::{ConcurrentQueue, Handle};

/// Consumed slots below this count are never compacted away on dequeue.
const MIN_COMPACT: usize = 32;

/// Queue backed by a single mutex and a growable buffer.
///
/// Dequeues take from a read cursor instead of shifting the buffer; the
/// consumed prefix is cut off once it makes up half of the buffer, or before
/// an enqueue would make the buffer grow.
pub struct ArrayQueue<T> {
    inner: Mutex<Buffer<T>>,
}

struct Buffer<T> {
    items: Vec<Option<T>>,
    cursor: usize,
}

impl<T> Buffer<T> {
    fn len(&self) -> usize {
        self.items.len() - self.cursor
    }

    fn compact(&mut self) {
        trace!(
            consumed = self.cursor,
            live = self.len(),
            capacity = self.items.capacity(),
            "compacting array queue buffer"
        );
        self.items.drain(..self.cursor);
        self.cursor = 0;
    }
}

impl<T> ArrayQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Buffer {
                items: Vec::with_capacity(capacity),
                cursor: 0,
            }),
        }
    }

    pub fn enqueue(&self, data: T) {
        let mut buffer = self.inner.lock();
        if buffer.items.len() == buffer.items.capacity() && buffer.cursor > 0 {
            buffer.compact();
        }
        buffer.items.push(Some(data));
    }

    pub fn dequeue(&self) -> Option<T> {
        let mut buffer = self.inner.lock();
        let cursor = buffer.cursor;
        let data = buffer.items.get_mut(cursor)?.take();
        buffer.cursor += 1;

        if buffer.cursor == buffer.items.len() {
            buffer.items.clear();
            buffer.cursor = 0;
        } else if buffer.cursor >= MIN_COMPACT && buffer.cursor * 2 >= buffer.items.len() {
            buffer.compact();
        }
        data
    }

    /// Number of values queued at the time of the call.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ArrayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ArrayQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Send> ConcurrentQueue<T> for ArrayQueue<T> {
    fn new() -> Self {
        ArrayQueue::new()
    }

    fn register(&self) -> impl Handle<T> {
        ArrayHandle { queue: self }
    }
}

pub struct ArrayHandle<'q, T> {
    queue: &'q ArrayQueue<T>,
}

impl<T: Send> Handle<T> for ArrayHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        self.queue.enqueue(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.dequeue()
    }
}
