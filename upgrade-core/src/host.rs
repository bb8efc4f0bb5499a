//! Hosting-application side of the contract.
//!
//! The host registers the layer exactly once, pushes a waiting instance
//! through with `SKIP_WAITING`, and reloads itself once when the instance
//! becomes active so every outstanding fetch sees the same controller.

use crate::error::ControlError;
use crate::service::{GuardService, ServiceBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use upgrade_common::LifecycleState;

pub struct HostBinding {
    service: OnceCell<Arc<GuardService>>,
    reloaded: AtomicBool,
    on_reload: Box<dyn Fn() + Send + Sync>,
}

impl HostBinding {
    pub fn new(on_reload: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            service: OnceCell::new(),
            reloaded: AtomicBool::new(false),
            on_reload: Box::new(on_reload),
        }
    }

    /// Register the layer. Only the first call builds and installs an
    /// instance; later calls return the same one and drop their builder.
    pub async fn register(&self, builder: ServiceBuilder) -> Arc<GuardService> {
        self.service
            .get_or_init(|| builder.register())
            .await
            .clone()
    }

    pub fn service(&self) -> Option<&Arc<GuardService>> {
        self.service.get()
    }

    /// Drive the registered instance to `Active`: send `SKIP_WAITING` if it
    /// is waiting, wait for activation, then run the reload hook (once per
    /// binding).
    pub async fn ensure_active(&self) -> Result<LifecycleState, ControlError> {
        let service = self.service.get().ok_or(ControlError::Closed)?;
        let mut states = service.lifecycle().subscribe();

        if service.state() == LifecycleState::Waiting {
            info!("Instance {} is waiting; sending SKIP_WAITING", service.instance_id());
            service.control().skip_waiting().await?;
        }

        states
            .wait_for(|state| state.is_active())
            .await
            .map_err(|_| ControlError::Closed)?;

        if !self.reloaded.swap(true, Ordering::SeqCst) {
            info!("Instance {} active; reloading host", service.instance_id());
            (self.on_reload)();
        }
        Ok(LifecycleState::Active)
    }

    pub fn has_reloaded(&self) -> bool {
        self.reloaded.load(Ordering::SeqCst)
    }
}
