//! Counting wake-up signal behind `await_entry`.

use tokio::sync::Semaphore;

/// Every [`notify`](Self::notify) stores one wake-up; every
/// [`wait`](Self::wait) consumes exactly one, suspending until one exists.
/// Wake-ups posted while nobody waits are kept.
#[derive(Debug)]
pub(crate) struct EntrySignal {
    permits: Semaphore,
}

impl EntrySignal {
    pub(crate) fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    pub(crate) fn notify(&self) {
        self.permits.add_permits(1);
    }

    pub(crate) async fn wait(&self) {
        // never closed
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}
