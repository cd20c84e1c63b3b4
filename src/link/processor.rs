use tracing::{debug, info, warn};

use super::queue::{EnqueueOutcome, LinkQueue, LinkRequest};
use super::watcher::AvailabilityWatcher;
use crate::bridge::{BridgeError, BridgeHandle, LoginReceipt};
use crate::gateway::OutboundMessage;
use crate::host::{Completion, Deferred, HostContext};
use crate::scheduler::TimerId;

/// Single-flight state. Every non-idle variant refers to the queue head.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flight {
    Idle,
    /// Waiting on `player_id()` before linking.
    Probing { value: String, attempt: u32 },
    /// Subscription id was empty; re-probe when `timer` fires.
    ProbeBackoff {
        value: String,
        attempt: u32,
        timer: TimerId,
    },
    /// Waiting on `login()`.
    Linking {
        value: String,
        subscription_id: String,
    },
}

impl Flight {
    fn value(&self) -> Option<&str> {
        match self {
            Flight::Idle => None,
            Flight::Probing { value, .. }
            | Flight::ProbeBackoff { value, .. }
            | Flight::Linking { value, .. } => Some(value),
        }
    }

    fn is_busy(&self) -> bool {
        !matches!(self, Flight::Idle)
    }
}

/// Consumes the link queue one request at a time: probe for a subscription
/// id, then `login` with the head's value.
#[derive(Debug)]
pub struct LinkProcessor {
    queue: LinkQueue,
    flight: Flight,
    watcher: AvailabilityWatcher,
    head_failures: u32,
    retry_timer: Option<TimerId>,
}

impl LinkProcessor {
    pub(crate) fn new(watcher: AvailabilityWatcher) -> Self {
        Self {
            queue: LinkQueue::new(),
            flight: Flight::Idle,
            watcher,
            head_failures: 0,
            retry_timer: None,
        }
    }

    pub fn queue(&self) -> &LinkQueue {
        &self.queue
    }

    pub fn in_flight(&self) -> Option<&str> {
        self.flight.value()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_watching()
    }

    pub(crate) fn enqueue(&mut self, ctx: &mut HostContext, request: LinkRequest) -> EnqueueOutcome {
        let value = request.value().to_string();
        let source = request.source();
        let outcome = self.queue.enqueue(request);
        match outcome {
            EnqueueOutcome::Queued { position } => {
                info!(%value, ?source, position, "queued identity link");
                self.process_next(ctx);
            }
            EnqueueOutcome::AlreadyLinked => {
                debug!(%value, "identity already linked; skipping");
            }
            EnqueueOutcome::Duplicate => {
                debug!(%value, "identity already queued; skipping");
            }
        }
        outcome
    }

    /// Start on the queue head if nothing is in flight. Safe to call from
    /// anywhere; extra calls collapse into no-ops.
    pub(crate) fn process_next(&mut self, ctx: &mut HostContext) {
        if self.flight.is_busy() {
            debug!(in_flight = ?self.flight.value(), "link already in flight");
            return;
        }
        if self.retry_timer.is_some() {
            debug!("link retry pending");
            return;
        }

        let Some(value) = self.queue.head().map(|head| head.value().to_string()) else {
            self.watcher.stop(&mut ctx.scheduler);
            return;
        };

        let Some(bridge) = ctx.ready_bridge() else {
            if self.watcher.watch(&mut ctx.scheduler, Deferred::WatcherPoll) {
                info!(%value, "bridge not ready; waiting before linking");
            }
            return;
        };

        self.watcher.stop(&mut ctx.scheduler);
        self.probe(ctx, bridge, value, 1);
    }

    /// Poll tick from the watcher. Returns `true` when this tick found the
    /// bridge ready.
    pub(crate) fn on_watcher_tick(&mut self, ctx: &mut HostContext, timer: TimerId) -> bool {
        if !self.watcher.owns(timer) {
            return false;
        }
        if self.queue.is_empty() {
            self.watcher.stop(&mut ctx.scheduler);
            return false;
        }
        if ctx.ready_bridge().is_none() {
            return false;
        }

        self.watcher.stop(&mut ctx.scheduler);
        info!("bridge became ready; resuming identity links");
        self.process_next(ctx);
        true
    }

    pub(crate) fn on_probe_retry(&mut self, ctx: &mut HostContext, timer: TimerId) {
        if !matches!(&self.flight, Flight::ProbeBackoff { timer: pending, .. } if *pending == timer) {
            return;
        }
        let Flight::ProbeBackoff { value, attempt, .. } =
            std::mem::replace(&mut self.flight, Flight::Idle)
        else {
            return;
        };

        match ctx.ready_bridge() {
            Some(bridge) => self.probe(ctx, bridge, value, attempt + 1),
            None => {
                info!(%value, "bridge went away while waiting for subscription id");
                self.process_next(ctx);
            }
        }
    }

    pub(crate) fn on_link_retry(&mut self, ctx: &mut HostContext, timer: TimerId) {
        if self.retry_timer != Some(timer) {
            return;
        }
        self.retry_timer = None;
        self.process_next(ctx);
    }

    pub(crate) fn on_probe(
        &mut self,
        ctx: &mut HostContext,
        value: String,
        result: Result<String, BridgeError>,
    ) {
        let attempt = match &self.flight {
            Flight::Probing {
                value: expected,
                attempt,
            } if *expected == value => *attempt,
            other => {
                warn!(%value, state = ?other, "ignoring stale subscription probe");
                return;
            }
        };

        let error = match result {
            Ok(id) if !id.trim().is_empty() => {
                match ctx.ready_bridge() {
                    Some(bridge) => self.link(ctx, bridge, value, id.trim().to_string()),
                    None => self.hand_to_watcher(ctx, &value),
                }
                return;
            }
            Ok(_) => None,
            Err(err) => Some(err),
        };

        if ctx.ready_bridge().is_none() {
            self.hand_to_watcher(ctx, &value);
            return;
        }

        if attempt >= ctx.config.probe_max_attempts {
            warn!(%value, attempts = attempt, error = ?error, "subscription id still unavailable");
            self.flight = Flight::Idle;
            ctx.gateway
                .post(OutboundMessage::link_failed("subscription id not available", None));
            self.record_failure(ctx, value);
            return;
        }

        debug!(%value, attempt, error = ?error, "subscription id not ready; probing again");
        let timer = ctx
            .scheduler
            .set_timeout(ctx.config.probe_retry_delay, Deferred::ProbeRetry);
        self.flight = Flight::ProbeBackoff {
            value,
            attempt,
            timer,
        };
    }

    pub(crate) fn on_login(
        &mut self,
        ctx: &mut HostContext,
        value: String,
        subscription_id: String,
        result: Result<LoginReceipt, BridgeError>,
    ) {
        if !matches!(&self.flight, Flight::Linking { value: expected, .. } if *expected == value) {
            warn!(%value, state = ?self.flight, "ignoring stale login result");
            return;
        }
        self.flight = Flight::Idle;

        match result {
            Ok(receipt) => {
                let player_id = if receipt.player_id.is_empty() {
                    subscription_id
                } else {
                    receipt.player_id
                };
                if self.queue.complete_head(&value).is_none() {
                    warn!(%value, "linked value was no longer at the queue head");
                }
                self.head_failures = 0;
                info!(%value, %player_id, "external user id linked");
                ctx.gateway
                    .post(OutboundMessage::link_succeeded(value, player_id));
                self.process_next(ctx);
            }
            Err(err) => {
                warn!(%value, error = %err, "failed to link external user id");
                ctx.gateway.post(OutboundMessage::link_failed(
                    err.to_string(),
                    Some(subscription_id),
                ));

                // a bridge that still reports ready counts the failure, whatever the error
                if ctx.ready_bridge().is_none() {
                    self.hand_to_watcher(ctx, &value);
                } else {
                    self.record_failure(ctx, value);
                }
            }
        }
    }

    pub(crate) fn forget_last_linked(&mut self) -> Option<String> {
        self.queue.forget_last_linked()
    }

    fn probe(&mut self, ctx: &mut HostContext, bridge: BridgeHandle, value: String, attempt: u32) {
        debug!(%value, attempt, "probing subscription id");
        self.flight = Flight::Probing {
            value: value.clone(),
            attempt,
        };
        ctx.spawn(async move {
            let result = bridge.player_id().await;
            Completion::Probe { value, result }
        });
    }

    fn link(&mut self, ctx: &mut HostContext, bridge: BridgeHandle, value: String, subscription_id: String) {
        info!(%value, %subscription_id, "linking external user id");
        self.flight = Flight::Linking {
            value: value.clone(),
            subscription_id: subscription_id.clone(),
        };
        ctx.spawn(async move {
            let result = bridge.login(&value).await;
            Completion::Login {
                value,
                subscription_id,
                result,
            }
        });
    }

    /// Release the flight and let the watcher wait for the bridge. The head
    /// stays queued.
    fn hand_to_watcher(&mut self, ctx: &mut HostContext, value: &str) {
        info!(%value, "bridge unavailable; keeping request queued");
        self.flight = Flight::Idle;
        self.process_next(ctx);
    }

    fn record_failure(&mut self, ctx: &mut HostContext, value: String) {
        self.head_failures += 1;
        if self.head_failures < ctx.config.link_max_attempts {
            self.schedule_retry(ctx, &value);
            return;
        }

        warn!(%value, attempts = self.head_failures, "abandoning identity link");
        self.queue.abandon_head(&value);
        self.head_failures = 0;
        self.process_next(ctx);
    }

    fn schedule_retry(&mut self, ctx: &mut HostContext, value: &str) {
        if let Some(previous) = self.retry_timer.take() {
            ctx.scheduler.clear(previous);
        }
        debug!(
            %value,
            failures = self.head_failures,
            delay_ms = ctx.config.link_retry_delay.as_millis() as u64,
            "retrying identity link later"
        );
        self.retry_timer = Some(
            ctx.scheduler
                .set_timeout(ctx.config.link_retry_delay, Deferred::LinkRetry),
        );
    }
}
