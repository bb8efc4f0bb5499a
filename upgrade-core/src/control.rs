//! Control-plane messaging
//!
//! Out-of-band channel between the hosting application and the layer. Runs
//! independently of interception traffic: a status query is answered on the
//! spot, skip-waiting runs in its own task, unknown kinds are dropped.

use crate::diagnostics::{DiagnosticKind, DiagnosticRecord, Diagnostics};
use crate::error::ControlError;
use crate::lifecycle::LifecycleManager;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use upgrade_common::{StatusResponse, WireMessage};

/// Inbound control message
#[derive(Debug)]
pub enum ControlMessage {
    /// Report status on `reply`
    DebugStatus {
        reply: oneshot::Sender<StatusResponse>,
    },
    SkipWaiting,
    /// Unrecognised kind, ignored
    Unknown(String),
}

impl ControlMessage {
    /// Lift a wire message. A `DEBUG_STATUS` without a reply channel has
    /// nowhere to answer and is treated as unknown.
    pub fn from_wire(message: WireMessage, reply: Option<oneshot::Sender<StatusResponse>>) -> Self {
        match (message, reply) {
            (WireMessage::DebugStatus, Some(reply)) => ControlMessage::DebugStatus { reply },
            (WireMessage::SkipWaiting, _) => ControlMessage::SkipWaiting,
            (other, _) => ControlMessage::Unknown(other.kind().to_string()),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ControlMessage::DebugStatus { .. } => "DEBUG_STATUS",
            ControlMessage::SkipWaiting => "SKIP_WAITING",
            ControlMessage::Unknown(kind) => kind,
        }
    }
}

/// Message handler bound to one instance's lifecycle
pub struct ControlPlane {
    lifecycle: Arc<LifecycleManager>,
    scope: String,
    diagnostics: Diagnostics,
}

impl ControlPlane {
    pub fn new(lifecycle: Arc<LifecycleManager>, scope: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Self {
            lifecycle,
            scope: scope.into(),
            diagnostics,
        }
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse::new(self.scope.clone())
    }

    pub async fn on_message(&self, message: ControlMessage) {
        self.diagnostics.emit(DiagnosticRecord::new(
            DiagnosticKind::ControlMessage,
            message.kind().to_string(),
        ));

        match message {
            ControlMessage::DebugStatus { reply } => {
                if reply.send(self.status()).is_err() {
                    debug!("Status requester went away before the reply");
                }
            }
            ControlMessage::SkipWaiting => {
                info!("Skip-waiting requested by host");
                self.lifecycle.on_skip_waiting_command().await;
            }
            ControlMessage::Unknown(kind) => {
                debug!("Ignoring control message '{}'", kind);
            }
        }
    }

    /// Start the control loop. The loop ends when every handle is dropped.
    pub fn spawn(self: Arc<Self>, buffer: usize) -> (ControlHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ControlMessage>(buffer.max(1));
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    ControlMessage::SkipWaiting => {
                        let plane = self.clone();
                        tokio::spawn(async move {
                            plane.on_message(ControlMessage::SkipWaiting).await;
                        });
                    }
                    other => self.on_message(other).await,
                }
            }
            debug!("Control loop stopped");
        });
        (ControlHandle { tx }, task)
    }
}

/// Sending side of the control loop
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlHandle {
    pub async fn send(&self, message: ControlMessage) -> Result<(), ControlError> {
        self.tx.send(message).await.map_err(|_| ControlError::Closed)
    }

    pub async fn debug_status(&self) -> Result<StatusResponse, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlMessage::DebugStatus { reply }).await?;
        rx.await.map_err(|_| ControlError::NoReply)
    }

    pub async fn skip_waiting(&self) -> Result<(), ControlError> {
        self.send(ControlMessage::SkipWaiting).await
    }

    /// Deliver a wire message; returns the status reply for `DEBUG_STATUS`.
    pub async fn deliver(&self, message: WireMessage) -> Result<Option<StatusResponse>, ControlError> {
        match message {
            WireMessage::DebugStatus => self.debug_status().await.map(Some),
            other => {
                self.send(ControlMessage::from_wire(other, None)).await?;
                Ok(None)
            }
        }
    }
}
