use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpStream;
use upgrade_core::{
    CertificateAuthority, FetcherConfig, GuardService, ProxyConfig, ProxyServer, ReqwestFetcher,
};

#[tokio::test]
async fn test_proxy_server_startup() {
    let dir = tempdir().unwrap();
    let ca = CertificateAuthority::new(dir.path()).unwrap();

    // Use a high port to avoid conflicts
    let port = 19190;

    let config = ProxyConfig {
        listen_address: "127.0.0.1".to_string(),
        listen_port: port,
        admin_port: 19191,
        ..Default::default()
    };

    let fetcher = Arc::new(ReqwestFetcher::new(FetcherConfig::default()).unwrap());
    let service = GuardService::builder(fetcher).register().await;
    let server = ProxyServer::new(config.clone(), ca, service);

    // Spawn server in background
    let _handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("Proxy server failed: {}", e);
        }
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(500)).await;

    let addr = format!("127.0.0.1:{}", port);
    match TcpStream::connect(&addr).await {
        Ok(_) => println!("Successfully connected to proxy at {}", addr),
        Err(e) => panic!("Failed to connect to proxy at {}: {}", addr, e),
    }

    let admin_port = config.admin_port;
    let health_url = format!("http://127.0.0.1:{}/health", admin_port);
    let resp = reqwest::get(&health_url).await.unwrap();
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("ok"));
    assert!(body.contains("active"));

    let metrics_url = format!("http://127.0.0.1:{}/metrics", admin_port);
    let resp = reqwest::get(&metrics_url).await.unwrap();
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("total_requests"));
    assert!(body.contains("rewrites_by_origin"));

    let control_url = format!("http://127.0.0.1:{}/control", admin_port);
    let resp = reqwest::Client::new()
        .post(&control_url)
        .body(r#"{"type":"DEBUG_STATUS"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.text().await.unwrap().contains("STATUS_RESPONSE"));
}

#[tokio::test]
async fn test_invalid_listen_address_is_rejected() {
    let dir = tempdir().unwrap();
    let ca = CertificateAuthority::new(dir.path()).unwrap();
    let fetcher = Arc::new(ReqwestFetcher::new(FetcherConfig::default()).unwrap());
    let service = GuardService::builder(fetcher).register().await;

    let config = ProxyConfig {
        listen_address: "not-an-ip".to_string(),
        ..Default::default()
    };
    let server = ProxyServer::new(config, ca, service);

    assert!(server.listen_addr().is_err());
}

#[tokio::test]
async fn test_client_sweep_drops_idle_clients() {
    let fetcher = Arc::new(ReqwestFetcher::new(FetcherConfig::default()).unwrap());
    let service = GuardService::builder(fetcher).register().await;
    assert!(service.controls("10.1.2.3").await);
    assert_eq!(service.clients().len().await, 1);

    let sweep =
        upgrade_core::proxy::spawn_client_sweep(service.clone(), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(200)).await;
    sweep.abort();

    assert!(service.clients().is_empty().await);
    // Coming back re-registers under the active instance.
    assert!(service.controls("10.1.2.3").await);
}
