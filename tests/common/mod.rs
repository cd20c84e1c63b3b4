#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use notify_bridge::{
    BridgeError, BridgeHost, BridgeSlot, FrameSink, HostConfig, HostHandle, LoginReceipt,
    NotifyBridge, OutboundMessage,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

pub const ORIGIN: &str = "https://app.example";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    Login(String),
    Logout,
    PlayerId,
    RequestPermission,
}

/// Scripted bridge. Scripted results are consumed in order; once a script
/// runs dry the defaults apply.
pub struct MockBridge {
    ready: AtomicBool,
    default_player_id: Mutex<String>,
    player_ids: Mutex<VecDeque<Result<String, BridgeError>>>,
    logins: Mutex<VecDeque<Result<LoginReceipt, BridgeError>>>,
    logout_result: Mutex<Result<(), BridgeError>>,
    login_latency: Mutex<Duration>,
    vanish_on_login_failure: AtomicBool,
    calls: Mutex<Vec<BridgeCall>>,
    logins_in_flight: AtomicUsize,
    max_logins_in_flight: AtomicUsize,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            default_player_id: Mutex::new("player-1".to_string()),
            player_ids: Mutex::new(VecDeque::new()),
            logins: Mutex::new(VecDeque::new()),
            logout_result: Mutex::new(Ok(())),
            login_latency: Mutex::new(Duration::ZERO),
            vanish_on_login_failure: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            logins_in_flight: AtomicUsize::new(0),
            max_logins_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_default_player_id(&self, player_id: &str) {
        *self.default_player_id.lock().unwrap() = player_id.to_string();
    }

    pub fn script_player_ids<I>(&self, results: I)
    where
        I: IntoIterator<Item = Result<String, BridgeError>>,
    {
        self.player_ids.lock().unwrap().extend(results);
    }

    pub fn script_logins<I>(&self, results: I)
    where
        I: IntoIterator<Item = Result<LoginReceipt, BridgeError>>,
    {
        self.logins.lock().unwrap().extend(results);
    }

    pub fn set_logout_result(&self, result: Result<(), BridgeError>) {
        *self.logout_result.lock().unwrap() = result;
    }

    pub fn set_login_latency(&self, latency: Duration) {
        *self.login_latency.lock().unwrap() = latency;
    }

    pub fn vanish_on_login_failure(&self) {
        self.vanish_on_login_failure.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn logins(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BridgeCall::Login(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &BridgeCall) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    pub fn max_logins_in_flight(&self) -> usize {
        self.max_logins_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: BridgeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NotifyBridge for MockBridge {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn login(&self, external_id: &str) -> Result<LoginReceipt, BridgeError> {
        self.record(BridgeCall::Login(external_id.to_string()));
        let current = self.logins_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_logins_in_flight.fetch_max(current, Ordering::SeqCst);

        let latency = *self.login_latency.lock().unwrap();
        if !latency.is_zero() {
            sleep(latency).await;
        }

        let scripted = self.logins.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| {
            Ok(LoginReceipt {
                player_id: self.default_player_id.lock().unwrap().clone(),
            })
        });
        if result.is_err() && self.vanish_on_login_failure.load(Ordering::SeqCst) {
            self.set_ready(false);
        }
        self.logins_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        self.record(BridgeCall::Logout);
        self.logout_result.lock().unwrap().clone()
    }

    async fn player_id(&self) -> Result<String, BridgeError> {
        self.record(BridgeCall::PlayerId);
        let scripted = self.player_ids.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_player_id.lock().unwrap().clone()))
    }

    async fn request_permission(&self) -> Result<bool, BridgeError> {
        self.record(BridgeCall::RequestPermission);
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    posted: Mutex<Vec<(OutboundMessage, String)>>,
}

impl RecordingSink {
    pub fn posted(&self) -> Vec<(OutboundMessage, String)> {
        self.posted.lock().unwrap().clone()
    }

    /// Outbound messages of one `type`, as JSON.
    pub fn of_type(&self, kind: &str) -> Vec<Value> {
        self.posted()
            .into_iter()
            .map(|(message, _)| message.to_json())
            .filter(|json| json["type"] == kind)
            .collect()
    }

    pub fn link_results(&self) -> Vec<Value> {
        self.of_type("oneSignalExternalUserIdSet")
    }

    pub fn player_ids(&self) -> Vec<Value> {
        self.of_type("oneSignalPlayerId")
    }
}

impl FrameSink for RecordingSink {
    fn post(&self, message: &OutboundMessage, target_origin: &str) {
        self.posted
            .lock()
            .unwrap()
            .push((message.clone(), target_origin.to_string()));
    }
}

pub struct Harness {
    pub handle: HostHandle,
    pub slot: Arc<BridgeSlot>,
    pub sink: Arc<RecordingSink>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(config: HostConfig) -> Self {
        let slot = Arc::new(BridgeSlot::new());
        let sink = Arc::new(RecordingSink::default());
        let (handle, task) =
            BridgeHost::spawn(config, slot.clone(), sink.clone()).expect("valid config");
        Self {
            handle,
            slot,
            sink,
            task,
        }
    }

    /// Start with `bridge` already registered.
    pub fn with_bridge(config: HostConfig, bridge: &Arc<MockBridge>) -> Self {
        let harness = Self::start(config);
        harness.slot.register(bridge.clone());
        harness
    }

    pub fn send_link(&self, value: &str) {
        self.handle
            .deliver(ORIGIN, link_message(value))
            .expect("host running");
    }

    pub fn send_logout(&self) {
        self.handle
            .deliver(ORIGIN, json!({"type": "oneSignalLogout"}))
            .expect("host running");
    }
}

/// Link tests push the relay far out so it stays quiet.
pub fn test_config() -> HostConfig {
    HostConfig {
        hosted_origin: ORIGIN.to_string(),
        relay_initial_delay: Duration::from_secs(3600),
        ..HostConfig::default()
    }
}

pub fn link_message(value: &str) -> Value {
    json!({"type": "setOneSignalExternalUserId", "externalUserId": value})
}

/// Let the host drain everything that is ready without moving far in time.
pub async fn settle() {
    sleep(Duration::from_millis(1)).await;
}
