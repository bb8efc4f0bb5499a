//! Dispatch seam between the interceptor and the network.
//!
//! A dispatch has two phases. [`Fetcher::dispatch`] builds the outbound call
//! and fails synchronously on construction problems (consumed body, invalid
//! URL); the returned future settles with the response or a network error.
//! The interceptor's fallback policy depends on telling those apart.

use crate::error::{DispatchError, FetchError};
use crate::request::{CredentialsPolicy, InterceptedRequest, RedirectPolicy, RequestBody};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{AUTHORIZATION, COOKIE, LOCATION, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Settled response of a dispatched request
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL the response came from (after redirects, if followed)
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type FetchFuture = BoxFuture<'static, Result<FetchResponse, FetchError>>;

/// Issues outbound requests on behalf of the interceptor
pub trait Fetcher: Send + Sync {
    /// Construct and start the request. `Err` means nothing was sent.
    fn dispatch(&self, request: InterceptedRequest) -> Result<FetchFuture, DispatchError>;
}

#[derive(Clone, Debug)]
pub struct FetcherConfig {
    pub user_agent: String,
    /// Ambient network timeout; `None` leaves timing to the network stack
    pub timeout_ms: Option<u64>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("upgrade-guard/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: None,
        }
    }
}

/// reqwest-backed dispatcher
#[derive(Clone)]
pub struct ReqwestFetcher {
    follow: reqwest::Client,
    no_follow: reqwest::Client,
    config: FetcherConfig,
}

impl ReqwestFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, DispatchError> {
        let follow = Self::client(&config, reqwest::redirect::Policy::default())?;
        let no_follow = Self::client(&config, reqwest::redirect::Policy::none())?;
        Ok(Self {
            follow,
            no_follow,
            config,
        })
    }

    fn client(
        config: &FetcherConfig,
        redirect: reqwest::redirect::Policy,
    ) -> Result<reqwest::Client, DispatchError> {
        let mut builder = reqwest::Client::builder().redirect(redirect);
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms.max(1)));
        }
        builder
            .build()
            .map_err(|e| DispatchError::InvalidRequest(format!("client build failed: {}", e)))
    }

    fn outbound_headers(&self, request: &InterceptedRequest) -> HeaderMap {
        let head = request.head();
        let mut headers = head.headers.clone();

        if head.credentials == CredentialsPolicy::Omit {
            headers.remove(COOKIE);
            headers.remove(AUTHORIZATION);
        }

        let suppress_referrer = head
            .referrer_policy
            .as_deref()
            .map(|p| p.eq_ignore_ascii_case("no-referrer"))
            .unwrap_or(false);
        if suppress_referrer {
            headers.remove(REFERER);
        } else if let Some(referrer) = &head.referrer {
            if !headers.contains_key(REFERER) {
                if let Ok(value) = HeaderValue::from_str(referrer) {
                    headers.insert(REFERER, value);
                }
            }
        }

        if !headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.config.user_agent) {
                headers.insert(USER_AGENT, value);
            }
        }
        headers
    }
}

impl Fetcher for ReqwestFetcher {
    fn dispatch(&self, request: InterceptedRequest) -> Result<FetchFuture, DispatchError> {
        if request.body_used() {
            return Err(DispatchError::BodyUsed);
        }

        let headers = self.outbound_headers(&request);
        let (head, body) = request.into_parts();
        let client = match head.redirect {
            RedirectPolicy::Follow => self.follow.clone(),
            RedirectPolicy::Error | RedirectPolicy::Manual => self.no_follow.clone(),
        };

        let mut builder = client
            .request(head.method.clone(), head.url.as_str())
            .headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
            RequestBody::Consumed => return Err(DispatchError::BodyUsed),
        };
        let outbound = builder
            .build()
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;

        debug!("Dispatching {} {}", head.method, head.url);
        let redirect = head.redirect;

        Ok(Box::pin(async move {
            let response = client
                .execute(outbound)
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if redirect == RedirectPolicy::Error && response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                return Err(FetchError::Redirect { location });
            }

            let url = response.url().to_string();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            Ok(FetchResponse {
                url,
                status,
                headers,
                body,
            })
        }))
    }
}
