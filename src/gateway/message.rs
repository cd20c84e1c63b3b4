use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages the hosted page posts to the wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "setOneSignalExternalUserId", rename_all = "camelCase")]
    SetExternalUserId {
        #[serde(default)]
        external_user_id: Value,
    },
    #[serde(rename = "oneSignalLogout")]
    Logout,
    /// Any other `type`; newer pages may send kinds this wrapper predates.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// `None` when the payload is not an object with a string `type`.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if !payload.get("type").is_some_and(Value::is_string) {
            return None;
        }
        InboundMessage::deserialize(payload).ok()
    }
}

/// Messages the wrapper posts back into the hosted frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "oneSignalExternalUserIdSet", rename_all = "camelCase")]
    ExternalUserIdSet {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
    },
    #[serde(rename = "oneSignalPlayerId", rename_all = "camelCase")]
    PlayerId { player_id: String },
}

impl OutboundMessage {
    pub fn link_succeeded(value: impl Into<String>, player_id: impl Into<String>) -> Self {
        OutboundMessage::ExternalUserIdSet {
            success: true,
            value: Some(value.into()),
            error: None,
            player_id: Some(player_id.into()),
        }
    }

    pub fn link_failed(error: impl Into<String>, player_id: Option<String>) -> Self {
        OutboundMessage::ExternalUserIdSet {
            success: false,
            value: None,
            error: Some(error.into()),
            player_id: player_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn player_id(player_id: impl Into<String>) -> Self {
        OutboundMessage::PlayerId {
            player_id: player_id.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
