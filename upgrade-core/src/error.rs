//! Error types for the upgrade layer

use thiserror::Error;

/// Crate-wide error for the proxy host, CA and admin surfaces
#[derive(Debug, Error)]
pub enum GuardError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),
    /// Certificate-related errors
    #[error("Certificate error: {0}")]
    Certificate(String),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Allowlist or other static configuration rejected at load
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected static configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("allowlist entry at position {index} is empty")]
    EmptyOrigin { index: usize },

    #[error("allowlist entry '{entry}' must be host[:port] without scheme or path")]
    MalformedOrigin { entry: String },
}

/// Taking the mandatory copy of a request failed.
///
/// This never reaches the caller on its own; it triggers the single fallback
/// to the original request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloneError {
    #[error("request body has already been consumed")]
    BodyUsed,

    #[error("streaming request body cannot be duplicated")]
    StreamingBody,
}

/// Construction-time failure of a dispatch, raised before anything reaches
/// the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("request body has already been consumed")]
    BodyUsed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Rejection of a dispatched request at the network layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("redirect to {location} refused by redirect policy")]
    Redirect { location: String },
}

/// Why the primary attempt of the fallback chain did not go out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackReason {
    #[error("clone failed: {0}")]
    Clone(#[from] CloneError),

    #[error("clone dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Failure of a single interception event.
///
/// Fatal for that event only; other in-flight events and the lifecycle are
/// unaffected.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The dispatched request was rejected by the network; surfaced verbatim
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: FetchError,
    },

    /// The rewritten request could not be constructed
    #[error("could not dispatch rewritten request to {url}: {source}")]
    Dispatch {
        url: String,
        #[source]
        source: DispatchError,
    },

    /// Both the clone and the fallback to the original failed synchronously
    #[error("dispatch to {url} failed after fallback ({primary}): {source}")]
    TerminalDispatch {
        url: String,
        primary: FallbackReason,
        #[source]
        source: DispatchError,
    },
}

impl InterceptError {
    /// URL the failing request targeted
    pub fn url(&self) -> &str {
        match self {
            InterceptError::Network { url, .. }
            | InterceptError::Dispatch { url, .. }
            | InterceptError::TerminalDispatch { url, .. } => url,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, InterceptError::Network { .. })
    }
}

/// The control loop is gone or dropped the reply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("control channel closed")]
    Closed,

    #[error("status reply dropped")]
    NoReply,
}
