use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::bridge::{BridgeError, BridgeHandle, BridgeProvider, LoginReceipt};
use crate::config::HostConfig;
use crate::gateway::Gateway;
use crate::scheduler::Scheduler;

/// Delayed work the host schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deferred {
    WatcherPoll,
    ProbeRetry,
    LinkRetry,
    RelayPoll,
    RelayStart,
    RelayRetry,
}

/// Results of bridge calls, fed back into the event loop.
#[derive(Debug)]
pub(crate) enum Completion {
    Probe {
        value: String,
        result: Result<String, BridgeError>,
    },
    Login {
        value: String,
        subscription_id: String,
        result: Result<LoginReceipt, BridgeError>,
    },
    Logout(Result<(), BridgeError>),
    Relay {
        attempt: u32,
        result: Result<String, BridgeError>,
    },
    Permission(Result<bool, BridgeError>),
}

/// Everything the components share, owned by the event loop.
pub(crate) struct HostContext {
    pub(crate) config: HostConfig,
    pub(crate) gateway: Gateway,
    pub(crate) scheduler: Scheduler<Deferred>,
    provider: Arc<dyn BridgeProvider>,
    completions: mpsc::UnboundedSender<Completion>,
    tokio_handle: Handle,
}

impl HostContext {
    pub(crate) fn new(
        config: HostConfig,
        gateway: Gateway,
        scheduler: Scheduler<Deferred>,
        provider: Arc<dyn BridgeProvider>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            config,
            gateway,
            scheduler,
            provider,
            completions,
            tokio_handle: Handle::current(),
        }
    }

    /// The bridge, if it is present and `login` is callable.
    pub(crate) fn ready_bridge(&self) -> Option<BridgeHandle> {
        self.provider.ready()
    }

    /// Run a bridge call off the loop; its result comes back as a completion.
    pub(crate) fn spawn<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completions.clone();
        self.tokio_handle.spawn(async move {
            let _ = completions.send(call.await);
        });
    }
}
