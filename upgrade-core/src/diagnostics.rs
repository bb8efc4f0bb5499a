//! Structured diagnostics for every interception decision and lifecycle
//! transition.
//!
//! Purely observational: records go to `tracing` and, when a sink is
//! attached, onto an mpsc channel with `try_send`. A full or closed sink is
//! dropped silently and never changes what the layer does.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Which decision point produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Insecure allowlisted URL moved to the secure scheme
    Rewritten,
    /// Secure or unrelated request forwarded as-is through its clone
    PassThrough,
    /// Primary attempt failed synchronously, original dispatched instead
    Fallback,
    /// Dispatched request settled
    Completed,
    /// Dispatched request rejected by the network
    NetworkFailure,
    /// Event failed without reaching the network
    DispatchFailure,
    Installing,
    Waiting,
    Activated,
    ClientsClaimed,
    SkipWaiting,
    ControlMessage,
}

/// One diagnostic record
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: DiagnosticKind,
    pub original_url: Option<String>,
    pub corrected_url: Option<String>,
    pub method: Option<String>,
    pub outcome: String,
}

impl DiagnosticRecord {
    pub fn new(kind: DiagnosticKind, outcome: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            original_url: None,
            corrected_url: None,
            method: None,
            outcome: outcome.into(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.original_url = Some(url.into());
        self
    }

    pub fn corrected(mut self, url: impl Into<String>) -> Self {
        self.corrected_url = Some(url.into());
        self
    }

    pub fn method(mut self, method: impl ToString) -> Self {
        self.method = Some(method.to_string());
        self
    }
}

/// Emitter shared by the interceptor, lifecycle manager and control plane
#[derive(Debug, Clone)]
pub struct Diagnostics {
    enabled: bool,
    sink: Option<mpsc::Sender<DiagnosticRecord>>,
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            sink: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn with_sink(mut self, sink: mpsc::Sender<DiagnosticRecord>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn emit(&self, record: DiagnosticRecord) {
        if !self.enabled {
            return;
        }

        info!(
            target: "upgrade_core::diagnostics",
            kind = ?record.kind,
            url = record.original_url.as_deref().unwrap_or("-"),
            corrected = record.corrected_url.as_deref().unwrap_or("-"),
            method = record.method.as_deref().unwrap_or("-"),
            "{}",
            record.outcome
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.try_send(record) {
                debug!("Diagnostic record dropped: {}", e);
            }
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(true)
    }
}
