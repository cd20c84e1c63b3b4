//! One-shot relay of the push subscription id to the hosted page.

use tracing::{debug, info, warn};

use crate::bridge::BridgeError;
use crate::gateway::OutboundMessage;
use crate::host::{Completion, Deferred, HostContext};
use crate::scheduler::TimerId;

/// Externally visible relay progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    AwaitingBridge,
    Scheduled,
    Fetching { attempt: u32 },
    Backoff { attempt: u32 },
    Delivered,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    AwaitingBridge { poll: Option<TimerId> },
    Scheduled { timer: TimerId },
    Fetching { attempt: u32 },
    Backoff { attempt: u32, timer: TimerId },
    Delivered,
    Exhausted,
}

#[derive(Debug)]
pub struct SubscriptionRelay {
    state: RelayState,
}

impl Default for SubscriptionRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRelay {
    pub fn new() -> Self {
        Self {
            state: RelayState::AwaitingBridge { poll: None },
        }
    }

    pub fn status(&self) -> RelayStatus {
        match self.state {
            RelayState::AwaitingBridge { .. } => RelayStatus::AwaitingBridge,
            RelayState::Scheduled { .. } => RelayStatus::Scheduled,
            RelayState::Fetching { attempt } => RelayStatus::Fetching { attempt },
            RelayState::Backoff { attempt, .. } => RelayStatus::Backoff { attempt },
            RelayState::Delivered => RelayStatus::Delivered,
            RelayState::Exhausted => RelayStatus::Exhausted,
        }
    }

    /// Arm the relay: schedule the first fetch if the bridge is already
    /// ready, otherwise poll for it. Returns `true` if the bridge was ready.
    pub(crate) fn start(&mut self, ctx: &mut HostContext) -> bool {
        if !matches!(self.state, RelayState::AwaitingBridge { poll: None }) {
            return false;
        }
        if self.observe_ready(ctx) {
            return true;
        }
        let poll = ctx
            .scheduler
            .set_interval(ctx.config.poll_interval, Deferred::RelayPoll);
        self.state = RelayState::AwaitingBridge { poll: Some(poll) };
        false
    }

    /// Check for the bridge while still waiting on it. Returns `true` only on
    /// the transition to scheduled, i.e. the first time the bridge is seen.
    pub(crate) fn observe_ready(&mut self, ctx: &mut HostContext) -> bool {
        let RelayState::AwaitingBridge { poll } = self.state else {
            return false;
        };
        if ctx.ready_bridge().is_none() {
            return false;
        }

        if let Some(poll) = poll {
            ctx.scheduler.clear(poll);
        }
        let delay = ctx.config.relay_initial_delay;
        let timer = ctx.scheduler.set_timeout(delay, Deferred::RelayStart);
        debug!(delay_ms = delay.as_millis() as u64, "subscription id relay scheduled");
        self.state = RelayState::Scheduled { timer };
        true
    }

    /// Timer dispatch. Returns `true` if a poll tick found the bridge ready.
    pub(crate) fn on_timer(&mut self, ctx: &mut HostContext, timer: TimerId, task: Deferred) -> bool {
        match (self.state, task) {
            (RelayState::AwaitingBridge { poll: Some(poll) }, Deferred::RelayPoll) if poll == timer => {
                self.observe_ready(ctx)
            }
            (RelayState::Scheduled { timer: pending }, Deferred::RelayStart) if pending == timer => {
                self.fetch(ctx, 1);
                false
            }
            (RelayState::Backoff { attempt, timer: pending }, Deferred::RelayRetry)
                if pending == timer =>
            {
                self.fetch(ctx, attempt + 1);
                false
            }
            _ => false,
        }
    }

    pub(crate) fn on_result(
        &mut self,
        ctx: &mut HostContext,
        attempt: u32,
        result: Result<String, BridgeError>,
    ) {
        if self.state != (RelayState::Fetching { attempt }) {
            debug!(attempt, state = ?self.state, "ignoring stale relay result");
            return;
        }

        match result {
            Ok(player_id) if !player_id.trim().is_empty() => {
                let player_id = player_id.trim().to_string();
                info!(%player_id, attempt, "relaying subscription id to hosted page");
                ctx.gateway.post(OutboundMessage::player_id(player_id));
                self.state = RelayState::Delivered;
            }
            other => {
                let max_attempts = ctx.config.relay_max_attempts;
                if attempt >= max_attempts {
                    warn!(attempts = attempt, last = ?other, "giving up on subscription id relay");
                    self.state = RelayState::Exhausted;
                    return;
                }
                debug!(attempt, max_attempts, result = ?other, "subscription id not ready");
                let timer = ctx
                    .scheduler
                    .set_timeout(ctx.config.relay_retry_delay, Deferred::RelayRetry);
                self.state = RelayState::Backoff { attempt, timer };
            }
        }
    }

    fn fetch(&mut self, ctx: &mut HostContext, attempt: u32) {
        self.state = RelayState::Fetching { attempt };
        let Some(bridge) = ctx.ready_bridge() else {
            self.on_result(ctx, attempt, Err(BridgeError::Unavailable));
            return;
        };
        ctx.spawn(async move {
            let result = bridge.player_id().await;
            Completion::Relay { attempt, result }
        });
    }
}
