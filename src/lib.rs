// Library exports for the host binary and tests

pub mod bridge;
pub mod config;
pub mod gateway;
mod host;
pub mod link;
pub mod relay;
pub mod scheduler;

// Re-export commonly used types for tests
pub use bridge::{
    BridgeError, BridgeHandle, BridgeProvider, BridgeSlot, LoginReceipt, NotifyBridge,
    ProviderChain, SimulatedBridge,
};
pub use config::{ConfigError, HostConfig};
pub use gateway::{FrameSink, OutboundMessage};
pub use host::{BridgeHost, HostError, HostHandle, HostSnapshot};
pub use relay::RelayStatus;
