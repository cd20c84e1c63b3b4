use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use super::{BridgeError, LoginReceipt, NotifyBridge};

/// In-process stand-in for the native plugin. It becomes callable after
/// `ready_after` and only gets a subscription id after `subscribed_after`,
/// mimicking a push SDK that initializes in the background.
pub struct SimulatedBridge {
    started: Instant,
    ready_after: Duration,
    subscribed_after: Duration,
    subscription_id: String,
    external_id: Mutex<Option<String>>,
}

impl SimulatedBridge {
    pub fn new(ready_after: Duration, subscribed_after: Duration) -> Self {
        Self {
            started: Instant::now(),
            ready_after,
            subscribed_after,
            subscription_id: Uuid::new_v4().to_string(),
            external_id: Mutex::new(None),
        }
    }

    /// External id currently associated with the simulated subscription.
    pub fn external_id(&self) -> Option<String> {
        self.external_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribed(&self) -> bool {
        self.started.elapsed() >= self.subscribed_after
    }
}

#[async_trait]
impl NotifyBridge for SimulatedBridge {
    fn is_ready(&self) -> bool {
        self.started.elapsed() >= self.ready_after
    }

    async fn login(&self, external_id: &str) -> Result<LoginReceipt, BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::Unavailable);
        }
        if external_id.is_empty() {
            return Err(BridgeError::Rejected("External ID is required".into()));
        }
        *self
            .external_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(external_id.to_string());
        info!(external_id, "simulated login");
        Ok(LoginReceipt {
            player_id: self.player_id().await?,
        })
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::Unavailable);
        }
        self.external_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!("simulated logout");
        Ok(())
    }

    async fn player_id(&self) -> Result<String, BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::Unavailable);
        }
        if self.subscribed() {
            Ok(self.subscription_id.clone())
        } else {
            Ok(String::new())
        }
    }

    async fn request_permission(&self) -> Result<bool, BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::Unavailable);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_then_subscribed() {
        let bridge = SimulatedBridge::new(Duration::from_millis(100), Duration::from_millis(300));
        assert!(!bridge.is_ready());
        assert_eq!(bridge.player_id().await, Err(BridgeError::Unavailable));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(bridge.is_ready());
        assert_eq!(bridge.player_id().await.unwrap(), "");

        tokio::time::sleep(Duration::from_millis(200)).await;
        let receipt = bridge.login("user-42").await.unwrap();
        assert!(!receipt.player_id.is_empty());
        assert_eq!(bridge.external_id().as_deref(), Some("user-42"));

        bridge.logout().await.unwrap();
        assert_eq!(bridge.external_id(), None);
    }
}
