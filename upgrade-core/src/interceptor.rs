//! Request interceptor
//!
//! Handles one interception event per outbound call:
//! 1. an insecure URL for an allowlisted origin is rebuilt against the
//!    corrected URL and dispatched once; network failures surface unchanged
//! 2. anything else is forwarded through a [`FallbackChain`]: a mandatory
//!    clone is dispatched first, the original is dispatched at most once if
//!    that fails synchronously, and a second synchronous failure is terminal
//!
//! Every event settles exactly once through the returned `Result`.

use crate::allowlist::OriginAllowlist;
use crate::diagnostics::{DiagnosticKind, DiagnosticRecord, Diagnostics};
use crate::error::{DispatchError, FallbackReason, InterceptError};
use crate::fetch::{FetchFuture, FetchResponse, Fetcher};
use crate::metrics::Metrics;
use crate::request::InterceptedRequest;
use crate::rewrite::{matching_entry, Scheme};
use http::Method;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

/// Branch an event takes through the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Allowlisted insecure occurrence found
    Upgrade { origin: String, corrected: String },
    /// Already on the secure scheme, nothing to correct
    Secure,
    /// Neither of the above (unlisted `http://`, other schemes)
    Other,
}

/// Which tier of the chain put the request on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTier {
    Primary,
    Fallback(FallbackReason),
}

/// Both tiers failed before anything was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    pub primary: FallbackReason,
    pub source: DispatchError,
}

/// Primary attempt, single fallback, terminal error.
pub struct FallbackChain<'a> {
    fetcher: &'a dyn Fetcher,
}

impl<'a> FallbackChain<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self { fetcher }
    }

    /// Dispatch a clone of `original`, falling back to `original` itself once.
    pub fn dispatch(
        &self,
        original: InterceptedRequest,
    ) -> Result<(DispatchTier, FetchFuture), TerminalFailure> {
        let primary = original
            .try_clone()
            .map_err(FallbackReason::from)
            .and_then(|copy| self.fetcher.dispatch(copy).map_err(FallbackReason::from));

        let reason = match primary {
            Ok(future) => return Ok((DispatchTier::Primary, future)),
            Err(reason) => reason,
        };

        match self.fetcher.dispatch(original) {
            Ok(future) => Ok((DispatchTier::Fallback(reason), future)),
            Err(source) => Err(TerminalFailure {
                primary: reason,
                source,
            }),
        }
    }
}

/// Per-event dispatcher consulting the allowlist
#[derive(Clone)]
pub struct RequestInterceptor {
    allowlist: OriginAllowlist,
    fetcher: Arc<dyn Fetcher>,
    diagnostics: Diagnostics,
    metrics: Arc<Metrics>,
}

impl RequestInterceptor {
    pub fn new(allowlist: OriginAllowlist, fetcher: Arc<dyn Fetcher>, diagnostics: Diagnostics) -> Self {
        Self {
            allowlist,
            fetcher,
            diagnostics,
            metrics: Arc::new(Metrics::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn allowlist(&self) -> &OriginAllowlist {
        &self.allowlist
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn route(&self, url: &str) -> Route {
        if let Some((entry, corrected)) = matching_entry(url, &self.allowlist) {
            return Route::Upgrade {
                origin: entry.origin().to_string(),
                corrected,
            };
        }
        match Scheme::of(url) {
            Scheme::Secure => Route::Secure,
            Scheme::Insecure | Scheme::Other => Route::Other,
        }
    }

    /// Handle one interception event
    pub async fn intercept(
        &self,
        request: InterceptedRequest,
    ) -> Result<FetchResponse, InterceptError> {
        match self.route(request.url()) {
            Route::Upgrade { origin, corrected } => self.upgrade(request, origin, corrected).await,
            Route::Secure => self.forward(request, "secure").await,
            Route::Other => self.forward(request, "unmatched").await,
        }
    }

    async fn upgrade(
        &self,
        request: InterceptedRequest,
        origin: String,
        corrected: String,
    ) -> Result<FetchResponse, InterceptError> {
        let original_url = request.url().to_string();
        let method = request.method().clone();

        self.metrics.record_rewrite(&origin);
        self.diagnostics.emit(
            DiagnosticRecord::new(DiagnosticKind::Rewritten, format!("upgraded {}", origin))
                .url(&original_url)
                .corrected(&corrected)
                .method(&method),
        );

        let future = match self.fetcher.dispatch(request.retarget(corrected.clone())) {
            Ok(future) => future,
            Err(source) => {
                self.metrics.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.emit(
                    DiagnosticRecord::new(DiagnosticKind::DispatchFailure, source.to_string())
                        .url(&original_url)
                        .corrected(&corrected)
                        .method(&method),
                );
                return Err(InterceptError::Dispatch {
                    url: corrected,
                    source,
                });
            }
        };

        self.settle(future, &original_url, Some(&corrected), &method).await
    }

    async fn forward(
        &self,
        request: InterceptedRequest,
        branch: &str,
    ) -> Result<FetchResponse, InterceptError> {
        let url = request.url().to_string();
        let method = request.method().clone();

        self.metrics.passed_through.fetch_add(1, Ordering::Relaxed);
        self.diagnostics.emit(
            DiagnosticRecord::new(DiagnosticKind::PassThrough, format!("{} pass-through", branch))
                .url(&url)
                .method(&method),
        );

        let future = match FallbackChain::new(self.fetcher.as_ref()).dispatch(request) {
            Ok((DispatchTier::Primary, future)) => future,
            Ok((DispatchTier::Fallback(reason), future)) => {
                self.metrics.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!("Dispatching original request for {}: {}", url, reason);
                self.diagnostics.emit(
                    DiagnosticRecord::new(DiagnosticKind::Fallback, reason.to_string())
                        .url(&url)
                        .method(&method),
                );
                future
            }
            Err(TerminalFailure { primary, source }) => {
                self.metrics.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dispatch of {} failed after fallback: {}", url, source);
                self.diagnostics.emit(
                    DiagnosticRecord::new(
                        DiagnosticKind::DispatchFailure,
                        format!("{}; fallback: {}", primary, source),
                    )
                    .url(&url)
                    .method(&method),
                );
                return Err(InterceptError::TerminalDispatch {
                    url,
                    primary,
                    source,
                });
            }
        };

        self.settle(future, &url, None, &method).await
    }

    async fn settle(
        &self,
        future: FetchFuture,
        original_url: &str,
        corrected_url: Option<&str>,
        method: &Method,
    ) -> Result<FetchResponse, InterceptError> {
        let dispatched_url = corrected_url.unwrap_or(original_url);

        match future.await {
            Ok(response) => {
                let mut record =
                    DiagnosticRecord::new(DiagnosticKind::Completed, response.status.to_string())
                        .url(original_url)
                        .method(method);
                if let Some(corrected) = corrected_url {
                    record = record.corrected(corrected);
                }
                self.diagnostics.emit(record);
                Ok(response)
            }
            Err(source) => {
                self.metrics.network_failures.fetch_add(1, Ordering::Relaxed);
                let mut record =
                    DiagnosticRecord::new(DiagnosticKind::NetworkFailure, source.to_string())
                        .url(original_url)
                        .method(method);
                if let Some(corrected) = corrected_url {
                    record = record.corrected(corrected);
                }
                self.diagnostics.emit(record);
                Err(InterceptError::Network {
                    url: dispatched_url.to_string(),
                    source,
                })
            }
        }
    }
}
