//! Snapshot of an intercepted outbound request.
//!
//! The head (URL, method, headers, policies) is freely copyable; the body is
//! single-read. A second dispatch of the same request requires a clone taken
//! up front with [`InterceptedRequest::try_clone`].

use crate::error::CloneError;
use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, Method};
use std::pin::Pin;

/// Streaming request body; can be read exactly once
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync>>;

/// Request mode as seen by the page that issued the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` style token; unknown tokens map to `Cors`
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "navigate" => RequestMode::Navigate,
            "same-origin" => RequestMode::SameOrigin,
            "no-cors" => RequestMode::NoCors,
            _ => RequestMode::Cors,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Navigate => "navigate",
            RequestMode::SameOrigin => "same-origin",
            RequestMode::NoCors => "no-cors",
            RequestMode::Cors => "cors",
        }
    }
}

/// Whether credentials travel with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsPolicy {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// How the dispatcher treats redirects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    #[default]
    Follow,
    /// A redirect response is a network error
    Error,
    /// The redirect response itself is returned
    Manual,
}

/// Everything about a request except its body
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub credentials: CredentialsPolicy,
    pub redirect: RedirectPolicy,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
}

/// Request body
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream(BodyStream),
    /// Already read; neither clonable nor dispatchable
    Consumed,
}

impl RequestBody {
    fn try_clone(&self) -> Result<Self, CloneError> {
        match self {
            RequestBody::Empty => Ok(RequestBody::Empty),
            RequestBody::Bytes(bytes) => Ok(RequestBody::Bytes(bytes.clone())),
            RequestBody::Stream(_) => Err(CloneError::StreamingBody),
            RequestBody::Consumed => Err(CloneError::BodyUsed),
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, RequestBody::Consumed)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "Empty"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({})", bytes.len()),
            RequestBody::Stream(_) => write!(f, "Stream"),
            RequestBody::Consumed => write!(f, "Consumed"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Bytes(bytes)
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// An outbound call captured at the interception point
#[derive(Debug)]
pub struct InterceptedRequest {
    head: RequestHead,
    body: RequestBody,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            head: RequestHead {
                url: url.into(),
                method,
                headers: HeaderMap::new(),
                mode: RequestMode::default(),
                credentials: CredentialsPolicy::default(),
                redirect: RedirectPolicy::default(),
                referrer: None,
                referrer_policy: None,
            },
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.head.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.head.mode = mode;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialsPolicy) -> Self {
        self.head.credentials = credentials;
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.head.redirect = redirect;
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.head.referrer = Some(referrer.into());
        self
    }

    pub fn with_referrer_policy(mut self, policy: impl Into<String>) -> Self {
        self.head.referrer_policy = Some(policy.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.head.url
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn body_used(&self) -> bool {
        self.body.is_consumed()
    }

    /// Read the body out, leaving the request with a consumed body
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::replace(&mut self.body, RequestBody::Consumed)
    }

    /// Independent copy of this request. Fails for a consumed body and for a
    /// streaming body, which cannot be duplicated without reading it.
    pub fn try_clone(&self) -> Result<Self, CloneError> {
        Ok(Self {
            head: self.head.clone(),
            body: self.body.try_clone()?,
        })
    }

    /// Same request against another URL. Every other field and the body
    /// move over unchanged.
    pub fn retarget(mut self, url: impl Into<String>) -> Self {
        self.head.url = url.into();
        self
    }

    pub fn into_parts(self) -> (RequestHead, RequestBody) {
        (self.head, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use http::HeaderValue;

    #[test]
    fn clone_copies_head_and_buffered_body() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", HeaderValue::from_static("abc"));

        let original = InterceptedRequest::new(Method::POST, "https://a.test/save")
            .with_headers(headers)
            .with_body("payload")
            .with_credentials(CredentialsPolicy::Include)
            .with_referrer("https://a.test/");

        let copy = original.try_clone().unwrap();
        assert_eq!(copy.url(), original.url());
        assert_eq!(copy.method(), &Method::POST);
        assert_eq!(copy.headers()["x-trace"], "abc");
        assert_eq!(copy.head().credentials, CredentialsPolicy::Include);
        assert!(matches!(copy.body(), RequestBody::Bytes(b) if b.as_ref() == b"payload"));
        assert!(!original.body_used());
    }

    #[test]
    fn consumed_body_cannot_be_cloned() {
        let mut request = InterceptedRequest::new(Method::PUT, "https://a.test/").with_body("x");
        let _ = request.take_body();
        assert!(request.body_used());
        assert_eq!(request.try_clone().unwrap_err(), CloneError::BodyUsed);
    }

    #[test]
    fn streaming_body_cannot_be_cloned() {
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"chunk"))]);
        let request = InterceptedRequest::new(Method::POST, "https://a.test/")
            .with_body(RequestBody::Stream(Box::pin(chunks)));
        assert_eq!(request.try_clone().unwrap_err(), CloneError::StreamingBody);
    }

    #[test]
    fn retarget_keeps_everything_but_the_url() {
        let request = InterceptedRequest::new(Method::DELETE, "http://a.test/item/1")
            .with_mode(RequestMode::SameOrigin)
            .with_redirect(RedirectPolicy::Manual)
            .with_referrer_policy("no-referrer")
            .with_body("gone");

        let moved = request.retarget("https://a.test/item/1");
        assert_eq!(moved.url(), "https://a.test/item/1");
        assert_eq!(moved.method(), &Method::DELETE);
        assert_eq!(moved.head().mode, RequestMode::SameOrigin);
        assert_eq!(moved.head().redirect, RedirectPolicy::Manual);
        assert_eq!(moved.head().referrer_policy.as_deref(), Some("no-referrer"));
        assert!(matches!(moved.body(), RequestBody::Bytes(_)));
    }

    #[test]
    fn mode_tokens() {
        assert_eq!(RequestMode::from_token("navigate"), RequestMode::Navigate);
        assert_eq!(RequestMode::from_token("NO-CORS"), RequestMode::NoCors);
        assert_eq!(RequestMode::from_token("websocket"), RequestMode::Cors);
        assert_eq!(RequestMode::SameOrigin.as_str(), "same-origin");
    }
}
