//! Cross-context message handling between the hosted frame and the host.

mod message;
mod validate;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::link::{LinkRequest, LinkSource};

pub use message::{InboundMessage, OutboundMessage};
pub use validate::{normalize_external_id, validate_external_id, ValidationError};

/// Where outbound messages leave the crate (the frame's `postMessage`).
pub trait FrameSink: Send + Sync {
    /// Deliver `message` to the hosted frame, restricted to `target_origin`.
    fn post(&self, message: &OutboundMessage, target_origin: &str);
}

/// What a validated inbound message asks the host to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    Link(LinkRequest),
    Logout,
}

pub struct Gateway {
    hosted_origin: String,
    sink: Arc<dyn FrameSink>,
}

impl Gateway {
    pub fn new(hosted_origin: impl Into<String>, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            hosted_origin: hosted_origin.into(),
            sink,
        }
    }

    pub fn hosted_origin(&self) -> &str {
        &self.hosted_origin
    }

    /// Turn an inbound envelope into a command, or `None` if it is foreign,
    /// unknown, or fails validation.
    pub fn accept(&self, origin: &str, payload: &Value) -> Option<GatewayCommand> {
        if origin.trim_end_matches('/') != self.hosted_origin {
            debug!(%origin, "ignoring message from foreign origin");
            return None;
        }

        let Some(message) = InboundMessage::from_payload(payload) else {
            debug!("ignoring untyped message");
            return None;
        };

        match message {
            InboundMessage::SetExternalUserId { external_user_id } => {
                let raw = normalize_external_id(&external_user_id);
                self.link_request(&raw, LinkSource::Message)
                    .map(GatewayCommand::Link)
            }
            InboundMessage::Logout => Some(GatewayCommand::Logout),
            InboundMessage::Unknown => {
                debug!(kind = ?payload.get("type"), "ignoring unknown message type");
                None
            }
        }
    }

    /// Validate a raw identity value into a request, logging rejections.
    pub fn link_request(&self, raw: &str, source: LinkSource) -> Option<LinkRequest> {
        match validate_external_id(raw, &self.hosted_origin) {
            Ok(value) => Some(LinkRequest::new(value, source)),
            Err(err) => {
                warn!(value = %raw, ?source, error = %err, "rejected external user id");
                None
            }
        }
    }

    pub fn post(&self, message: OutboundMessage) {
        debug!(message = %message.to_json(), "posting to hosted frame");
        self.sink.post(&message, &self.hosted_origin);
    }
}
