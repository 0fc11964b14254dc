use std::{mem::MaybeUninit, ptr};

use haphazard::AtomicPtr;

/// List node shared by the linked queues.
///
/// The payload is uninitialised in a sentinel, and again once a dequeue has
/// moved it out (at which point the node has become the new sentinel).
pub(crate) struct Node<T> {
    next: AtomicPtr<Node<T>>,
    data: MaybeUninit<T>,
}

impl<T> Node<T> {
    pub(crate) fn sentinel() -> *mut Self {
        Self::alloc(MaybeUninit::uninit())
    }

    pub(crate) fn new(data: T) -> *mut Self {
        Self::alloc(MaybeUninit::new(data))
    }

    fn alloc(data: MaybeUninit<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: unsafe { AtomicPtr::new(ptr::null_mut()) },
            data,
        }))
    }

    pub(crate) fn next(&self) -> &AtomicPtr<Node<T>> {
        &self.next
    }

    pub(crate) fn next_ptr(&self) -> *mut Node<T> {
        self.next.load_ptr()
    }

    /// Publishes `node` as the successor of `this`, if `this` is still the
    /// last node.
    ///
    /// Takes a raw pointer so no `&Node` is held across the CAS: once the link
    /// is visible, a dequeuer of the two-lock queue may free `this` while the
    /// CAS is still returning. Only the link field is borrowed, the same way
    /// `Arc` drops its counter.
    ///
    /// # Safety
    /// `this` must point at a live node when the call starts.
    pub(crate) unsafe fn link(this: *const Self, node: *mut Node<T>) -> bool {
        let next = &*ptr::addr_of!((*this).next);
        next.compare_exchange_ptr(ptr::null_mut(), node).is_ok()
    }

    /// Moves the payload out.
    ///
    /// # Safety
    /// The payload must be initialised and the caller must be the only one
    /// ever taking it.
    pub(crate) unsafe fn take(&self) -> T {
        ptr::read(self.data.as_ptr())
    }
}

/// Frees the chain starting at the sentinel `head`, dropping every payload
/// still in it. Returns the number of payloads dropped.
///
/// # Safety
/// No other thread may access the chain, and every node was created by
/// [`Node::sentinel`] or [`Node::new`] and not freed yet.
pub(crate) unsafe fn free_list<T>(head: *mut Node<T>) -> usize {
    let mut dropped = 0;
    let sentinel = Box::from_raw(head);
    let mut current = sentinel.next_ptr();
    drop(sentinel);
    while !current.is_null() {
        let mut node = Box::from_raw(current);
        current = node.next_ptr();
        node.data.assume_init_drop();
        dropped += 1;
    }
    dropped
}
