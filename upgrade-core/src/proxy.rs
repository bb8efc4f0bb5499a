use crate::{
    admin::{start_admin_server, AdminState},
    ca::CertificateAuthority,
    config::ProxyConfig,
    error::GuardError,
    handlers::UpgradeHandler,
    service::GuardService,
    Result,
};
use hudsucker::{certificate_authority::RcgenAuthority, rustls, ProxyBuilder};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Periodically drop clients idle for longer than `max_idle`.
pub fn spawn_client_sweep(service: Arc<GuardService>, max_idle: Duration) -> JoinHandle<()> {
    let period = (max_idle / 2).max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = service.clients().evict_idle(max_idle).await;
            if !evicted.is_empty() {
                debug!("Evicted {} idle clients", evicted.len());
            }
        }
    })
}

/// Forward proxy that puts a registered [`GuardService`] in front of its
/// clients' traffic, plus the admin API next to it.
pub struct ProxyServer {
    config: ProxyConfig,
    ca: CertificateAuthority,
    service: Arc<GuardService>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, ca: CertificateAuthority, service: Arc<GuardService>) -> Self {
        Self {
            config,
            ca,
            service,
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.config.listen_address.parse().map_err(|e| {
            GuardError::Configuration(format!(
                "Invalid listen address {}: {}",
                self.config.listen_address, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.config.listen_port))
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.listen_addr()?;
        info!(
            "Starting proxy server on {} for instance {}",
            addr,
            self.service.instance_id()
        );

        let admin_port = self.config.admin_port;
        let admin_state = AdminState {
            service: self.service.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = start_admin_server(admin_port, admin_state).await {
                error!("Admin server failed: {}", e);
            }
        });

        // Zero keeps clients forever.
        if self.config.client_idle_secs > 0 {
            spawn_client_sweep(self.service.clone(), self.config.client_idle_timeout());
        }

        // Hudsucker/Rustls expects DER, not PEM.
        let private_key = rustls::PrivateKey(self.ca.key_der());
        let ca_cert = rustls::Certificate(self.ca.cert_der()?);

        let authority = RcgenAuthority::new(private_key, ca_cert, 1000).map_err(|e| {
            GuardError::Configuration(format!("Failed to create CA authority: {}", e))
        })?;

        let proxy = ProxyBuilder::new()
            .with_addr(addr)
            .with_rustls_client()
            .with_ca(authority)
            .with_http_handler(
                UpgradeHandler::new(self.service).with_max_body_size(self.config.max_body_size),
            )
            .build();

        proxy
            .start(std::future::pending::<()>())
            .await
            .map_err(|e| GuardError::Network(format!("Proxy failed: {}", e)))?;

        Ok(())
    }
}
