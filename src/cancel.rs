use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

// ============================================================================
// CANCELLATION TOKEN
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<RwLock<bool>>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cancel(&self) {
        let mut cancelled = self.cancelled.write().await;
        *cancelled = true;
        self.notify.notify_waiters();
    }

    pub async fn is_cancelled(&self) -> bool {
        *self.cancelled.read().await
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled().await {
            return;
        }
        notified.await;
    }

    pub async fn check(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.is_cancelled().await {
            Err("Operation cancelled".into())
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// REQUEST MANAGER
// ============================================================================

/// Tracks the cancellation token of every deliberation stream in flight.
#[derive(Default)]
pub struct RequestManager {
    active_requests: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, request_id: String) -> CancellationToken {
        let token = CancellationToken::new();
        let mut requests = self.active_requests.write().await;
        requests.insert(request_id, token.clone());
        token
    }

    pub async fn cancel(&self, request_id: &str) -> bool {
        let requests = self.active_requests.read().await;
        if let Some(token) = requests.get(request_id) {
            token.cancel().await;
            true
        } else {
            false
        }
    }

    pub async fn unregister(&self, request_id: &str) {
        let mut requests = self.active_requests.write().await;
        requests.remove(request_id);
    }

    pub async fn active_count(&self) -> usize {
        self.active_requests.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel().await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
        assert!(token.check().await.is_err());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let token = CancellationToken::new();
        token.cancel().await;
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("should not wait");
    }

    #[tokio::test]
    async fn test_request_manager() {
        let manager = RequestManager::new();
        let token = manager.register("r1".to_string()).await;
        assert_eq!(manager.active_count().await, 1);

        assert!(manager.cancel("r1").await);
        assert!(token.is_cancelled().await);
        assert!(!manager.cancel("missing").await);

        manager.unregister("r1").await;
        assert_eq!(manager.active_count().await, 0);
    }
}
