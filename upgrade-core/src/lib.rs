//! Upgrade Guard Core Library
//!
//! Intercepts outbound requests of controlled clients, upgrades insecure
//! requests to allowlisted origins onto the secure scheme, and forwards
//! everything else through a clone-first fallback chain. Also hosts the
//! lifecycle, control plane and the proxy that puts it all on the wire.

pub mod allowlist;
pub mod clients;
pub mod control;
pub mod diagnostics;
pub mod fetch;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod metrics;
pub mod request;
pub mod rewrite;
pub mod service;

/// Proxy host: MITM handler, CA and admin API
pub mod admin;
pub mod ca;
pub mod handlers;
pub mod proxy;

/// Configuration types and utilities
pub mod config;

/// Error types for interception and hosting
pub mod error;

pub use allowlist::{AllowlistEntry, OriginAllowlist, DEFAULT_ORIGINS};
pub use ca::CertificateAuthority;
pub use clients::{ClientInfo, ClientRegistry};
pub use config::{GuardConfig, ProxyConfig};
pub use control::{ControlHandle, ControlMessage, ControlPlane};
pub use diagnostics::{DiagnosticKind, DiagnosticRecord, Diagnostics};
pub use error::{
    CloneError, ConfigError, ControlError, DispatchError, FallbackReason, FetchError, GuardError,
    InterceptError,
};
pub use fetch::{FetchFuture, FetchResponse, Fetcher, FetcherConfig, ReqwestFetcher};
pub use handlers::UpgradeHandler;
pub use host::HostBinding;
pub use interceptor::{DispatchTier, FallbackChain, RequestInterceptor, Route};
pub use lifecycle::{LifecycleManager, LifecyclePolicy};
pub use metrics::{Metrics, MetricsSnapshot};
pub use proxy::ProxyServer;
pub use request::{
    CredentialsPolicy, InterceptedRequest, RedirectPolicy, RequestBody, RequestHead, RequestMode,
};
pub use rewrite::{decide, RewriteDecision, Scheme};
pub use service::{GuardService, ServiceBuilder};

/// Result type alias for hosting operations
pub type Result<T> = std::result::Result<T, GuardError>;
