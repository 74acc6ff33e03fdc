//! Lock-protected FIFO shared between the local request path and message
//! handlers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct SharedQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> SharedQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // a panicking holder cannot leave the deque half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, value: T) {
        self.lock().push_back(value);
    }

    /// Removes the front value. Callers check [`len`](Self::len) first; an
    /// empty queue yields `None` rather than blocking.
    pub fn dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone> SharedQueue<T> {
    /// Copy of the current contents, front first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn fifo_order() {
        let queue = SharedQueue::new();
        queue.enqueue(3);
        queue.enqueue(1);
        queue.enqueue(2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_on_empty_does_not_block() {
        let queue: SharedQueue<u32> = SharedQueue::new();
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn duplicates_are_kept() {
        let queue = SharedQueue::new();
        queue.enqueue(7);
        queue.enqueue(7);
        assert_eq!(queue.snapshot(), vec![7, 7]);
    }

    #[test]
    fn concurrent_producers() {
        let queue = Arc::new(SharedQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.enqueue(t * 100 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
        let mut seen = queue.snapshot();
        seen.sort_unstable();
        assert_eq!(seen, (0..400).collect::<Vec<_>>());
    }
}
