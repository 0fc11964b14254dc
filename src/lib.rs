//! Unbounded concurrent FIFO queues.
//!
//! Three implementations of the same producer/consumer contract:
//!
//! - [`LockFreeQueue`]: Michael–Scott queue, CAS on head/tail, hazard pointers
//!   for node reclamation.
//! - [`TwoLockQueue`]: linked list with separate head and tail locks, so
//!   enqueues never contend with dequeues.
//! - [`ArrayQueue`]: a single mutex around a growable buffer.
//!
//! Dequeuing from an empty queue returns `None` immediately; no queue blocks
//! waiting for an item.

mod node;

pub mod array;
pub mod baseline;
pub mod counting;
pub mod lock_free;
pub mod two_lock;

pub use array::ArrayQueue;
pub use counting::CountingQueue;
pub use lock_free::LockFreeQueue;
pub use two_lock::TwoLockQueue;

pub trait ConcurrentQueue<T> {
    /// Creates a new, empty queue
    fn new() -> Self
    where
        Self: Sized;

    /// Returns a thread handle to the queue, which can be used for enqueues and dequeues
    fn register(&self) -> impl Handle<T>;
}

pub trait Handle<T> {
    fn enqueue(&mut self, item: T);

    /// Returns `None` if the queue was empty at the time of the call.
    fn dequeue(&mut self) -> Option<T>;
}
