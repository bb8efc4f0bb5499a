//! Control-Plane Wire Contract
//!
//! Two inbound message shapes travel from the hosting application to the
//! interception layer:
//! - `{"type": "DEBUG_STATUS"}` expects a [`StatusResponse`] in return
//! - `{"type": "SKIP_WAITING"}` is one-way
//!
//! Any other `type` decodes to [`WireMessage::Unknown`] so receivers can
//! ignore it deliberately instead of failing to parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound control message as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    /// Ask the layer to report its status on the reply channel
    DebugStatus,
    /// Force a waiting instance to become active
    SkipWaiting,
    /// Anything else; receivers ignore it
    #[serde(other)]
    Unknown,
}

impl WireMessage {
    /// Decode a JSON payload. Payloads without a `type` field are rejected,
    /// payloads with an unrecognised `type` decode to `Unknown`.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::DebugStatus => "DEBUG_STATUS",
            WireMessage::SkipWaiting => "SKIP_WAITING",
            WireMessage::Unknown => "UNKNOWN",
        }
    }
}

/// Tag carried in the `type` field of a status reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    #[serde(rename = "STATUS_RESPONSE")]
    StatusResponse,
}

/// Reply to a `DEBUG_STATUS` query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "type")]
    pub kind: StatusKind,
    /// When the reply was produced
    pub timestamp: DateTime<Utc>,
    /// Always `true`: only a running instance answers
    pub active: bool,
    /// Scope the responding instance governs
    pub scope: String,
}

impl StatusResponse {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::StatusResponse,
            timestamp: Utc::now(),
            active: true,
            scope: scope.into(),
        }
    }
}
