//! The interception layer as one explicitly-initialized service object.
//!
//! A [`GuardService`] owns the allowlist, lifecycle manager, interceptor,
//! client registry and control loop of a single instance. Build it with
//! [`GuardService::builder`] inside a Tokio runtime; [`ServiceBuilder::register`]
//! also runs install so the instance ends up `Waiting` or `Active`.

use crate::allowlist::OriginAllowlist;
use crate::clients::ClientRegistry;
use crate::config::GuardConfig;
use crate::control::{ControlHandle, ControlPlane};
use crate::diagnostics::{DiagnosticRecord, Diagnostics};
use crate::error::InterceptError;
use crate::fetch::{FetchResponse, Fetcher};
use crate::interceptor::RequestInterceptor;
use crate::lifecycle::LifecycleManager;
use crate::metrics::Metrics;
use crate::request::InterceptedRequest;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use upgrade_common::LifecycleState;
use uuid::Uuid;

pub struct GuardService {
    config: GuardConfig,
    clients: Arc<ClientRegistry>,
    lifecycle: Arc<LifecycleManager>,
    interceptor: RequestInterceptor,
    control: ControlHandle,
    control_task: JoinHandle<()>,
}

impl GuardService {
    pub fn builder(fetcher: Arc<dyn Fetcher>) -> ServiceBuilder {
        ServiceBuilder {
            fetcher,
            config: GuardConfig::default(),
            allowlist: OriginAllowlist::builtin(),
            clients: None,
            metrics: None,
            diagnostics_sink: None,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.lifecycle.instance_id()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn allowlist(&self) -> &OriginAllowlist {
        self.interceptor.allowlist()
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn interceptor(&self) -> &RequestInterceptor {
        &self.interceptor
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.interceptor.metrics()
    }

    pub fn control(&self) -> &ControlHandle {
        &self.control
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Run install for this instance
    pub async fn install(&self) -> LifecycleState {
        self.lifecycle.on_install().await
    }

    /// Whether this instance governs requests of the client at `address`.
    /// Registers the client on first sight.
    pub async fn controls(&self, address: &str) -> bool {
        if !self.lifecycle.is_active() {
            return false;
        }
        let client = self.clients.register(address).await;
        client.controller == Some(self.instance_id())
    }

    /// Intercept one outbound call
    pub async fn handle(&self, request: InterceptedRequest) -> Result<FetchResponse, InterceptError> {
        self.interceptor.intercept(request).await
    }
}

impl Drop for GuardService {
    fn drop(&mut self) {
        self.control_task.abort();
    }
}

pub struct ServiceBuilder {
    fetcher: Arc<dyn Fetcher>,
    config: GuardConfig,
    allowlist: OriginAllowlist,
    clients: Option<Arc<ClientRegistry>>,
    metrics: Option<Arc<Metrics>>,
    diagnostics_sink: Option<mpsc::Sender<DiagnosticRecord>>,
}

impl ServiceBuilder {
    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn allowlist(mut self, allowlist: OriginAllowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    /// Share a registry with a predecessor instance
    pub fn clients(mut self, clients: Arc<ClientRegistry>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn diagnostics_sink(mut self, sink: mpsc::Sender<DiagnosticRecord>) -> Self {
        self.diagnostics_sink = Some(sink);
        self
    }

    /// Assemble the service and start its control loop. The instance stays
    /// `Installing` until [`GuardService::install`] runs.
    pub fn build(self) -> Arc<GuardService> {
        let mut diagnostics = Diagnostics::new(self.config.diagnostics_enabled);
        if let Some(sink) = self.diagnostics_sink {
            diagnostics = diagnostics.with_sink(sink);
        }

        let clients = self.clients.unwrap_or_default();
        let lifecycle = Arc::new(LifecycleManager::new(
            clients.clone(),
            self.config.lifecycle,
            diagnostics.clone(),
        ));

        let mut interceptor =
            RequestInterceptor::new(self.allowlist, self.fetcher, diagnostics.clone());
        if let Some(metrics) = self.metrics {
            interceptor = interceptor.with_metrics(metrics);
        }

        let plane = Arc::new(ControlPlane::new(
            lifecycle.clone(),
            self.config.scope.clone(),
            diagnostics,
        ));
        let (control, control_task) = plane.spawn(self.config.control_buffer);

        info!(
            "Built instance {} with {} allowlisted origin(s)",
            lifecycle.instance_id(),
            interceptor.allowlist().len()
        );

        Arc::new(GuardService {
            config: self.config,
            clients,
            lifecycle,
            interceptor,
            control,
            control_task,
        })
    }

    /// Build and install
    pub async fn register(self) -> Arc<GuardService> {
        let service = self.build();
        let state = service.install().await;
        info!("Instance {} registered ({})", service.instance_id(), state);
        service
    }
}
