use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notify_bridge::{
    BridgeHost, BridgeSlot, FrameSink, HostConfig, HostHandle, OutboundMessage, SimulatedBridge,
};

const SIMULATED_READY_AFTER: Duration = Duration::from_millis(1200);
const SIMULATED_SUBSCRIBED_AFTER: Duration = Duration::from_millis(3000);

/// One line on stdin: a message the hosted frame posted, and its origin.
#[derive(Debug, Deserialize)]
struct Envelope {
    origin: String,
    data: Value,
}

/// Writes each outbound message as a JSON line on stdout.
struct StdoutSink;

impl FrameSink for StdoutSink {
    fn post(&self, message: &OutboundMessage, target_origin: &str) {
        let line = json!({
            "targetOrigin": target_origin,
            "message": message.to_json(),
        });
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            warn!(error = %err, "failed to write outbound message");
        }
    }
}

fn main() -> Result<()> {
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NOTIFY_BRIDGE_CONFIG").ok())
        .map(PathBuf::from)
        .or_else(HostConfig::default_path);
    let config = HostConfig::load(config_path.clone()).with_context(|| {
        format!("failed to load host configuration from {config_path:?}")
    })?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = rt.block_on(run(config));
    // a pending stdin read would otherwise hold the runtime open after Ctrl-C
    rt.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn run(config: HostConfig) -> Result<()> {
    let slot = Arc::new(BridgeSlot::new());
    let (handle, host_task) = BridgeHost::spawn(config, slot.clone(), Arc::new(StdoutSink))
        .context("invalid host configuration")?;

    slot.register(Arc::new(SimulatedBridge::new(
        SIMULATED_READY_AFTER,
        SIMULATED_SUBSCRIBED_AFTER,
    )));
    handle.announce_bridge()?;

    tokio::select! {
        result = pump_stdin(&handle) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    drop(handle);
    host_task.await.context("bridge host task failed")?;
    Ok(())
}

async fn pump_stdin(handle: &HostHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => handle.deliver(envelope.origin, envelope.data)?,
            Err(err) => warn!(error = %err, "ignoring malformed envelope"),
        }
    }
    info!("stdin closed");
    Ok(())
}
