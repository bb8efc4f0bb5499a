//! Lifecycle manager
//!
//! Drives one instance through `Installing → (Waiting) → Active`. State is
//! published on a `watch` channel; transitions only ever move forward. None
//! of the operations report errors: they are best-effort transitions.

use crate::clients::{ClientInfo, ClientRegistry};
use crate::diagnostics::{DiagnosticKind, DiagnosticRecord, Diagnostics};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use upgrade_common::LifecycleState;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Request skip-waiting as part of install so a fresh instance replaces
    /// its predecessor without waiting for clients to go away
    pub skip_waiting_on_install: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            skip_waiting_on_install: true,
        }
    }
}

pub struct LifecycleManager {
    instance_id: Uuid,
    state: watch::Sender<LifecycleState>,
    skip_waiting: AtomicBool,
    installed: AtomicBool,
    activation: Mutex<()>,
    policy: LifecyclePolicy,
    clients: Arc<ClientRegistry>,
    diagnostics: Diagnostics,
}

impl LifecycleManager {
    pub fn new(clients: Arc<ClientRegistry>, policy: LifecyclePolicy, diagnostics: Diagnostics) -> Self {
        let (state, _) = watch::channel(LifecycleState::Installing);
        Self {
            instance_id: Uuid::new_v4(),
            state,
            skip_waiting: AtomicBool::new(false),
            installed: AtomicBool::new(false),
            activation: Mutex::new(()),
            policy,
            clients,
            diagnostics,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Receiver that observes every transition
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Finish installing. Parks in `Waiting` when another instance still
    /// controls clients and nobody asked to skip waiting; activates otherwise.
    pub async fn on_install(&self) -> LifecycleState {
        if self.installed.swap(true, Ordering::SeqCst) {
            debug!("Instance {} already installed", self.instance_id);
            return self.state();
        }

        self.diagnostics.emit(DiagnosticRecord::new(
            DiagnosticKind::Installing,
            format!("instance {} installing", self.instance_id),
        ));

        if self.policy.skip_waiting_on_install {
            self.skip_waiting.store(true, Ordering::SeqCst);
        }

        let predecessor = self
            .clients
            .controller()
            .await
            .filter(|id| *id != self.instance_id);

        match predecessor {
            Some(previous) if !self.skip_waiting.load(Ordering::SeqCst) => {
                self.advance(LifecycleState::Waiting);
                info!(
                    "Instance {} waiting: {} still controls clients",
                    self.instance_id, previous
                );
                self.diagnostics.emit(DiagnosticRecord::new(
                    DiagnosticKind::Waiting,
                    format!("predecessor {} active", previous),
                ));
                // A skip-waiting command may have landed between the check
                // and the transition.
                if self.skip_waiting.load(Ordering::SeqCst) {
                    self.on_activate().await;
                }
            }
            _ => {
                self.on_activate().await;
            }
        }

        self.state()
    }

    /// Claim every open client, then publish `Active`. Returns the clients
    /// claimed; empty when already active.
    pub async fn on_activate(&self) -> Vec<ClientInfo> {
        let _guard = self.activation.lock().await;
        if self.is_active() {
            return Vec::new();
        }

        let claimed = self.clients.claim_all(self.instance_id).await;
        self.advance(LifecycleState::Active);
        info!(
            "Instance {} active, claimed {} client(s)",
            self.instance_id,
            claimed.len()
        );

        self.diagnostics.emit(DiagnosticRecord::new(
            DiagnosticKind::Activated,
            format!("instance {} active", self.instance_id),
        ));
        for client in &claimed {
            self.diagnostics.emit(
                DiagnosticRecord::new(DiagnosticKind::ClientsClaimed, format!("client {}", client.id))
                    .url(&client.address),
            );
        }

        claimed
    }

    /// Force a waiting instance to activate. Before install finishes the
    /// request is remembered; once active it is a no-op.
    pub async fn on_skip_waiting_command(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        let state = self.state();
        self.diagnostics.emit(DiagnosticRecord::new(
            DiagnosticKind::SkipWaiting,
            format!("skip-waiting while {}", state),
        ));

        match state {
            LifecycleState::Waiting => {
                self.on_activate().await;
            }
            LifecycleState::Installing => {
                debug!("Skip-waiting recorded; applied when install finishes");
            }
            LifecycleState::Active => {}
        }
    }

    fn advance(&self, next: LifecycleState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_advance_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }
}
