//! Single-assignment result slot
//!
//! Correlates an asynchronous reply with its originating request: the
//! read path fulfils the slot, the dispatcher waits on it up to the
//! message time-to-live.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

/// A write-once result slot with a bounded asynchronous read.
pub struct Future<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

struct Slot<T> {
    value: Option<T>,
    done: bool,
}

impl<T: Clone> Future<T> {
    pub fn new() -> Future<T> {
        Future {
            slot: Mutex::new(Slot { value: None, done: false }),
            notify: Notify::new(),
        }
    }

    /// Stores the result. Only the first call has any effect; later calls
    /// are no-ops.
    pub fn set(&self, value: T) {
        {
            let mut slot = self.slot.lock();
            if slot.done {
                return;
            }
            slot.value = Some(value);
            slot.done = true;
        }
        self.notify.notify_waiters();
    }

    /// Waits up to `ttl` for the result. Returns `None` on expiry; a
    /// result set after expiry is not delivered to this call.
    pub async fn get(&self, ttl: Duration) -> Option<T> {
        let result = timeout(ttl, async {
            loop {
                let mut notified = std::pin::pin!(self.notify.notified());
                notified.as_mut().enable();
                {
                    let slot = self.slot.lock();
                    if slot.done {
                        return slot.value.clone();
                    }
                }
                notified.await;
            }
        })
        .await;
        result.unwrap_or(None)
    }
}

impl<T: Clone> Default for Future<T> {
    fn default() -> Self {
        Future::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_then_get() {
        let future = Future::new();
        future.set(7u32);
        assert_eq!(future.get(Duration::from_millis(10)).await, Some(7));
    }

    #[tokio::test]
    async fn test_second_set_is_noop() {
        let future = Future::new();
        future.set(1u32);
        future.set(2u32);
        assert_eq!(future.get(Duration::from_millis(10)).await, Some(1));
    }

    #[tokio::test]
    async fn test_get_wakes_on_set() {
        let future = Arc::new(Future::new());
        let setter = future.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set(9u32);
        });
        assert_eq!(future.get(Duration::from_secs(1)).await, Some(9));
    }

    #[tokio::test]
    async fn test_ttl_expiry_beats_late_set() {
        let future = Arc::new(Future::<u32>::new());
        let result = future.get(Duration::from_millis(20)).await;
        assert_eq!(result, None);
        // a late set after expiry is silently absorbed
        future.set(5);
    }
}
