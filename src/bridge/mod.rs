//! The host-provided notification bridge, seen from the outside.
//!
//! The crate never implements push registration itself; it only calls the
//! capability surface below and probes whether it is callable yet.

mod provider;
mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use provider::{BridgeProvider, BridgeSlot, ProviderChain};
pub use simulated::SimulatedBridge;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The plugin is not registered or no longer answers.
    #[error("bridge unavailable")]
    Unavailable,
    /// The plugin answered but refused the call.
    #[error("{0}")]
    Rejected(String),
}

/// Resolved value of `login({externalId})`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginReceipt {
    /// Empty when the plugin does not report one.
    pub player_id: String,
}

#[async_trait]
pub trait NotifyBridge: Send + Sync {
    /// Capability probe: true once `login` is callable. Plugins that populate
    /// their surface asynchronously report `false` until then.
    fn is_ready(&self) -> bool {
        true
    }

    async fn login(&self, external_id: &str) -> Result<LoginReceipt, BridgeError>;

    async fn logout(&self) -> Result<(), BridgeError>;

    /// Current subscription (player) id. An empty string means the push
    /// subscription does not exist yet.
    async fn player_id(&self) -> Result<String, BridgeError>;

    /// Ask the user for notification permission; resolves to whether it was granted.
    async fn request_permission(&self) -> Result<bool, BridgeError>;
}

pub type BridgeHandle = Arc<dyn NotifyBridge>;
