//! Upgrade Guard Agent
//!
//! Registers the interception layer once, drives it to active, and puts it in
//! front of client traffic as a local forward proxy with an admin API.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use upgrade_core::{
    CertificateAuthority, GuardConfig, GuardService, HostBinding, LifecyclePolicy, ProxyConfig,
    ProxyServer, ReqwestFetcher,
};

pub mod logging;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for HTTP/HTTPS traffic
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_addr: String,

    /// Port to listen on for HTTP/HTTPS traffic
    #[arg(long, default_value_t = 8080)]
    pub listen_port: u16,

    /// Port to expose the Admin API (health/metrics/control)
    #[arg(long, default_value_t = 9091)]
    pub admin_port: u16,

    /// Directory holding the interception CA (created if missing)
    #[arg(long, default_value = "./certs")]
    pub ca_dir: PathBuf,

    /// Scope reported in status replies
    #[arg(long, default_value = "/")]
    pub scope: String,

    /// Stay waiting behind a previous instance until SKIP_WAITING arrives
    #[arg(long)]
    pub wait_for_skip: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Also write logs to this file (rotated daily)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Disable per-request diagnostic records
    #[arg(long)]
    pub no_diagnostics: bool,

    /// Outbound request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Request bodies larger than this many bytes are streamed, not buffered
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_body_size: usize,

    /// Forget clients idle for this many seconds (0 keeps them)
    #[arg(long, default_value_t = 600)]
    pub client_idle_secs: u64,
}

impl Args {
    pub fn logging_config(&self) -> logging::LoggingConfig {
        logging::LoggingConfig {
            level: self.log_level.clone(),
            json_format: self.json_logs,
            log_file: self
                .log_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            ..Default::default()
        }
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            scope: self.scope.clone(),
            diagnostics_enabled: !self.no_diagnostics,
            lifecycle: LifecyclePolicy {
                skip_waiting_on_install: !self.wait_for_skip,
            },
            ..Default::default()
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            listen_address: self.listen_addr.clone(),
            listen_port: self.listen_port,
            admin_port: self.admin_port,
            ca_dir: self.ca_dir.clone(),
            max_body_size: self.max_body_size,
            client_idle_secs: self.client_idle_secs,
        }
    }

    pub fn fetcher_config(&self) -> upgrade_core::FetcherConfig {
        upgrade_core::FetcherConfig {
            timeout_ms: self.timeout_ms,
            ..Default::default()
        }
    }
}

pub async fn run_agent(args: Args) -> Result<()> {
    // Logging should be initialized by the caller (main or test)

    tracing::info!("Starting Upgrade Guard Agent...");
    tracing::info!("  Listen: {}:{}", args.listen_addr, args.listen_port);
    tracing::info!("  Admin:  {}:{}", args.listen_addr, args.admin_port);
    tracing::info!("  CA dir: {}", args.ca_dir.display());

    let fetcher = ReqwestFetcher::new(args.fetcher_config())
        .context("Failed to build outbound HTTP client")?;

    let binding = HostBinding::new(|| {
        tracing::info!("Interception layer active; clients now see the upgraded origins");
    });
    let service = binding
        .register(GuardService::builder(Arc::new(fetcher)).config(args.guard_config()))
        .await;
    tracing::info!(
        "Instance {} registered in state {}",
        service.instance_id(),
        service.state()
    );

    binding
        .ensure_active()
        .await
        .context("Interception layer did not become active")?;

    let config = args.proxy_config();
    let ca = CertificateAuthority::new(&config.ca_dir).context("Failed to load or create CA")?;

    let proxy_server = ProxyServer::new(config, ca, service);

    tracing::info!("Starting proxy server...");
    proxy_server.run().await.context("Proxy server stopped")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["upgrade-agent"]).unwrap();
        assert_eq!(args.listen_addr, "127.0.0.1");
        assert_eq!(args.listen_port, 8080);
        assert_eq!(args.admin_port, 9091);
        assert_eq!(args.ca_dir, PathBuf::from("./certs"));

        let guard = args.guard_config();
        assert_eq!(guard.scope, "/");
        assert!(guard.diagnostics_enabled);
        assert!(guard.lifecycle.skip_waiting_on_install);

        let proxy = args.proxy_config();
        assert_eq!(proxy.max_body_size, 10 * 1024 * 1024);
        assert_eq!(proxy.client_idle_secs, 600);
    }

    #[test]
    fn test_flags_map_onto_configs() {
        let args = Args::try_parse_from([
            "upgrade-agent",
            "--listen-port",
            "18080",
            "--scope",
            "/app/",
            "--wait-for-skip",
            "--no-diagnostics",
            "--json-logs",
            "--log-file",
            "/tmp/agent/agent.log",
            "--timeout-ms",
            "2500",
            "--max-body-size",
            "65536",
            "--client-idle-secs",
            "0",
        ])
        .unwrap();

        let guard = args.guard_config();
        assert_eq!(guard.scope, "/app/");
        assert!(!guard.diagnostics_enabled);
        assert!(!guard.lifecycle.skip_waiting_on_install);

        let proxy = args.proxy_config();
        assert_eq!(proxy.listen_port, 18080);
        assert_eq!(proxy.max_body_size, 65536);
        assert_eq!(proxy.client_idle_secs, 0);
        assert_eq!(args.fetcher_config().timeout_ms, Some(2500));

        let logging = args.logging_config();
        assert!(logging.json_format);
        assert_eq!(logging.log_file.as_deref(), Some("/tmp/agent/agent.log"));
    }
}
