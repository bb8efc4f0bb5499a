//! Registry of clients (connected pages/peers) and the instance that
//! controls them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A client as seen by the layer
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    /// Key the client is known by (peer address for the proxy host)
    pub address: String,
    /// Instance currently governing this client's requests
    pub controller: Option<Uuid>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<String, ClientInfo>,
    controller: Option<Uuid>,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    inner: RwLock<Inner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a client, registering it on first sight, and mark it seen.
    /// Clients that appear while an instance is in control are controlled by
    /// it immediately.
    pub async fn register(&self, address: &str) -> ClientInfo {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let controller = inner.controller;
        let client = inner
            .clients
            .entry(address.to_string())
            .or_insert_with(|| ClientInfo {
                id: Uuid::new_v4(),
                address: address.to_string(),
                controller,
                first_seen: now,
                last_seen: now,
            });
        client.last_seen = now;
        client.clone()
    }

    /// Forget clients not seen within `max_idle`. A client that comes back
    /// later is registered afresh under the current controller.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<ClientInfo> {
        let max_idle = chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_idle)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.evict_seen_before(cutoff).await
    }

    pub async fn evict_seen_before(&self, cutoff: DateTime<Utc>) -> Vec<ClientInfo> {
        let mut inner = self.inner.write().await;
        let idle: Vec<String> = inner
            .clients
            .values()
            .filter(|client| client.last_seen < cutoff)
            .map(|client| client.address.clone())
            .collect();
        idle.iter()
            .filter_map(|address| inner.clients.remove(address))
            .collect()
    }

    /// Put every open client under `instance` in one step
    pub async fn claim_all(&self, instance: Uuid) -> Vec<ClientInfo> {
        let mut inner = self.inner.write().await;
        inner.controller = Some(instance);
        inner
            .clients
            .values_mut()
            .map(|client| {
                client.controller = Some(instance);
                client.clone()
            })
            .collect()
    }

    /// Instance currently in control, if any
    pub async fn controller(&self) -> Option<Uuid> {
        self.inner.read().await.controller
    }

    pub async fn list(&self) -> Vec<ClientInfo> {
        self.inner.read().await.clients.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
