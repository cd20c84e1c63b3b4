//! The bridge host: one owned instance per process that runs the event loop
//! for the gateway, link processor and subscription relay.

mod context;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::BridgeProvider;
use crate::config::{ConfigError, HostConfig};
use crate::gateway::{FrameSink, Gateway, GatewayCommand};
use crate::link::{AvailabilityWatcher, LinkProcessor, LinkSource};
use crate::relay::{RelayStatus, SubscriptionRelay};
use crate::scheduler::{Fired, Scheduler};

pub(crate) use context::{Completion, Deferred, HostContext};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("bridge host has stopped")]
    Closed,
}

#[derive(Debug)]
enum Command {
    Deliver { origin: String, payload: Value },
    Link(String),
    Logout,
    AnnounceBridge,
    Snapshot(oneshot::Sender<HostSnapshot>),
}

/// Point-in-time view of the host state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    pub queued: Vec<String>,
    pub in_flight: Option<String>,
    pub last_linked: Option<String>,
    pub watching: bool,
    pub relay: RelayStatus,
    pub pending_timers: usize,
}

/// Cloneable entry point into a running [`BridgeHost`].
#[derive(Debug, Clone)]
pub struct HostHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl HostHandle {
    /// Hand over a message the hosted frame posted, with its sender origin.
    pub fn deliver(&self, origin: impl Into<String>, payload: Value) -> Result<(), HostError> {
        self.send(Command::Deliver {
            origin: origin.into(),
            payload,
        })
    }

    /// Queue an identity link on behalf of the host itself.
    pub fn link(&self, external_id: impl Into<String>) -> Result<(), HostError> {
        self.send(Command::Link(external_id.into()))
    }

    pub fn logout(&self) -> Result<(), HostError> {
        self.send(Command::Logout)
    }

    /// Tell the host the bridge was just registered so it need not wait for
    /// the next poll.
    pub fn announce_bridge(&self) -> Result<(), HostError> {
        self.send(Command::AnnounceBridge)
    }

    pub async fn snapshot(&self) -> Result<HostSnapshot, HostError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| HostError::Closed)
    }

    fn send(&self, command: Command) -> Result<(), HostError> {
        self.commands.send(command).map_err(|_| HostError::Closed)
    }
}

pub struct BridgeHost {
    ctx: HostContext,
    processor: LinkProcessor,
    relay: SubscriptionRelay,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    fired_rx: mpsc::UnboundedReceiver<Fired<Deferred>>,
    permission_requested: bool,
}

impl BridgeHost {
    /// Build the host. Must be called inside a tokio runtime. The loop stops
    /// once every [`HostHandle`] is dropped.
    pub fn new(
        config: HostConfig,
        provider: Arc<dyn BridgeProvider>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(Self, HostHandle), ConfigError> {
        config.validate()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (scheduler, fired_rx) = Scheduler::new();
        let gateway = Gateway::new(config.hosted_origin.clone(), sink);
        let processor = LinkProcessor::new(AvailabilityWatcher::new(config.poll_interval));
        let ctx = HostContext::new(config, gateway, scheduler, provider, completions_tx);

        let host = Self {
            ctx,
            processor,
            relay: SubscriptionRelay::new(),
            commands_rx,
            completions_rx,
            fired_rx,
            permission_requested: false,
        };
        let handle = HostHandle {
            commands: commands_tx,
        };
        Ok((host, handle))
    }

    /// Build the host and run it on the current runtime.
    pub fn spawn(
        config: HostConfig,
        provider: Arc<dyn BridgeProvider>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(HostHandle, JoinHandle<()>), ConfigError> {
        let (host, handle) = Self::new(config, provider, sink)?;
        Ok((handle, tokio::spawn(host.run())))
    }

    pub async fn run(mut self) {
        info!(origin = %self.ctx.gateway.hosted_origin(), "bridge host started");
        if self.relay.start(&mut self.ctx) {
            self.on_bridge_ready();
        }

        loop {
            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => self.handle_completion(completion),
                Some(fired) = self.fired_rx.recv() => self.handle_timer(fired),
            }
        }

        self.ctx.scheduler.clear_all();
        info!("bridge host stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Deliver { origin, payload } => {
                match self.ctx.gateway.accept(&origin, &payload) {
                    Some(GatewayCommand::Link(request)) => {
                        self.processor.enqueue(&mut self.ctx, request);
                    }
                    Some(GatewayCommand::Logout) => self.logout(),
                    None => {}
                }
            }
            Command::Link(raw) => {
                if let Some(request) = self.ctx.gateway.link_request(&raw, LinkSource::Manual) {
                    self.processor.enqueue(&mut self.ctx, request);
                }
            }
            Command::Logout => self.logout(),
            Command::AnnounceBridge => {
                debug!("bridge announced");
                if self.relay.observe_ready(&mut self.ctx) {
                    self.on_bridge_ready();
                }
                self.processor.process_next(&mut self.ctx);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Probe { value, result } => {
                self.processor.on_probe(&mut self.ctx, value, result);
            }
            Completion::Login {
                value,
                subscription_id,
                result,
            } => {
                self.processor
                    .on_login(&mut self.ctx, value, subscription_id, result);
            }
            Completion::Logout(result) => match result {
                Ok(()) => {
                    let previous = self.processor.forget_last_linked();
                    info!(previous = ?previous, "logged out of notification bridge");
                }
                Err(err) => warn!(error = %err, "logout failed"),
            },
            Completion::Relay { attempt, result } => {
                self.relay.on_result(&mut self.ctx, attempt, result);
            }
            Completion::Permission(result) => match result {
                Ok(granted) => info!(granted, "notification permission resolved"),
                Err(err) => warn!(error = %err, "notification permission request failed"),
            },
        }
    }

    fn handle_timer(&mut self, fired: Fired<Deferred>) {
        if !self.ctx.scheduler.accept(&fired) {
            debug!(timer = %fired.id, task = ?fired.task, "dropping stale timer");
            return;
        }

        match fired.task {
            Deferred::WatcherPoll => {
                if self.processor.on_watcher_tick(&mut self.ctx, fired.id)
                    && self.relay.observe_ready(&mut self.ctx)
                {
                    self.on_bridge_ready();
                }
            }
            Deferred::ProbeRetry => self.processor.on_probe_retry(&mut self.ctx, fired.id),
            Deferred::LinkRetry => self.processor.on_link_retry(&mut self.ctx, fired.id),
            Deferred::RelayPoll | Deferred::RelayStart | Deferred::RelayRetry => {
                if self.relay.on_timer(&mut self.ctx, fired.id, fired.task) {
                    self.on_bridge_ready();
                    self.processor.process_next(&mut self.ctx);
                }
            }
        }
    }

    /// Runs once, the first time the bridge is seen ready.
    fn on_bridge_ready(&mut self) {
        info!("notification bridge ready");
        if !self.ctx.config.request_permission || self.permission_requested {
            return;
        }
        let Some(bridge) = self.ctx.ready_bridge() else {
            return;
        };
        self.permission_requested = true;
        self.ctx.spawn(async move {
            let result = bridge.request_permission().await;
            Completion::Permission(result)
        });
    }

    fn logout(&mut self) {
        let Some(bridge) = self.ctx.ready_bridge() else {
            warn!("bridge not ready; skipping logout");
            return;
        };
        info!("logging out of notification bridge");
        self.ctx.spawn(async move {
            let result = bridge.logout().await;
            Completion::Logout(result)
        });
    }

    fn snapshot(&self) -> HostSnapshot {
        let queue = self.processor.queue();
        HostSnapshot {
            queued: queue.values(),
            in_flight: self.processor.in_flight().map(str::to_string),
            last_linked: queue.last_linked().map(str::to_string),
            watching: self.processor.is_watching(),
            relay: self.relay.status(),
            pending_timers: self.ctx.scheduler.pending(),
        }
    }
}
