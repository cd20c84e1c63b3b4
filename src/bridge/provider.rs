use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::BridgeHandle;

/// Discovery of the bridge. Implementations may return a handle that is
/// present but not ready yet; callers check [`super::NotifyBridge::is_ready`].
pub trait BridgeProvider: Send + Sync {
    fn try_acquire(&self) -> Option<BridgeHandle>;

    /// Convenience: a handle only if it is callable right now.
    fn ready(&self) -> Option<BridgeHandle> {
        self.try_acquire().filter(|bridge| bridge.is_ready())
    }
}

/// Provider filled by a one-time registration call from the native side.
#[derive(Default)]
pub struct BridgeSlot {
    inner: RwLock<Option<BridgeHandle>>,
}

impl BridgeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the bridge. Only the first registration is kept; returns
    /// whether this call installed it.
    pub fn register(&self, bridge: BridgeHandle) -> bool {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("bridge already registered; ignoring second registration");
            return false;
        }
        *slot = Some(bridge);
        debug!("bridge registered");
        true
    }
}

impl BridgeProvider for BridgeSlot {
    fn try_acquire(&self) -> Option<BridgeHandle> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Probes several discovery locations in order. A ready handle anywhere in
/// the chain wins over a merely present one earlier in the chain.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn BridgeProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn BridgeProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

impl BridgeProvider for ProviderChain {
    fn try_acquire(&self) -> Option<BridgeHandle> {
        let mut present = None;
        for provider in &self.providers {
            if let Some(bridge) = provider.try_acquire() {
                if bridge.is_ready() {
                    return Some(bridge);
                }
                present.get_or_insert(bridge);
            }
        }
        present
    }
}
