use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process async locks keyed by exchange id.
#[derive(Debug, Default, Clone)]
pub struct ExchangeLocks {
    inner: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl ExchangeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, exchange_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(exchange_id).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(AsyncMutex::new(()));
                    map.insert(exchange_id.to_string(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = ExchangeLocks::new();
        let guard = locks.lock("a").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock("a").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        let _unrelated = locks.lock("b").await;
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = ExchangeLocks::new();
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        assert!(locks.tracked() <= 1);
    }
}
