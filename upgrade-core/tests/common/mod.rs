#![allow(dead_code)]

use bytes::Bytes;
use futures::FutureExt;
use http::{HeaderMap, Method, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use upgrade_core::{
    DispatchError, FetchError, FetchFuture, FetchResponse, Fetcher, InterceptedRequest,
    OriginAllowlist, RequestBody,
};

/// One call to [`RecordingFetcher::dispatch`], successful or not
#[derive(Debug, Clone)]
pub struct Attempt {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    /// `None` for streaming bodies
    pub body: Option<Bytes>,
    pub accepted: bool,
}

/// Fetcher double: records every dispatch attempt, fails synchronously from
/// a queue, and answers on the network with 200 or a configured error.
#[derive(Default)]
pub struct RecordingFetcher {
    attempts: Mutex<Vec<Attempt>>,
    sync_failures: Mutex<VecDeque<DispatchError>>,
    network_error: Mutex<Option<FetchError>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next dispatch synchronously with `error`
    pub fn fail_next(&self, error: DispatchError) {
        self.sync_failures.lock().unwrap().push_back(error);
    }

    /// Reject every dispatched request on the network with `error`
    pub fn reject_with(&self, error: FetchError) {
        *self.network_error.lock().unwrap() = Some(error);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> Vec<Attempt> {
        self.attempts().into_iter().filter(|a| a.accepted).collect()
    }
}

impl Fetcher for RecordingFetcher {
    fn dispatch(&self, request: InterceptedRequest) -> Result<FetchFuture, DispatchError> {
        let (head, body) = request.into_parts();
        let recorded_body = match &body {
            RequestBody::Empty => Some(Bytes::new()),
            RequestBody::Bytes(bytes) => Some(bytes.clone()),
            RequestBody::Stream(_) | RequestBody::Consumed => None,
        };

        let failure = if matches!(body, RequestBody::Consumed) {
            Some(DispatchError::BodyUsed)
        } else {
            self.sync_failures.lock().unwrap().pop_front()
        };

        self.attempts.lock().unwrap().push(Attempt {
            url: head.url.clone(),
            method: head.method.clone(),
            headers: head.headers.clone(),
            body: recorded_body.clone(),
            accepted: failure.is_none(),
        });

        if let Some(error) = failure {
            return Err(error);
        }

        let network_error = self.network_error.lock().unwrap().clone();
        let url = head.url;
        Ok(async move {
            match network_error {
                Some(error) => Err(error),
                None => Ok(FetchResponse {
                    url,
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: recorded_body.unwrap_or_default(),
                }),
            }
        }
        .boxed())
    }
}

pub fn svc_allowlist() -> OriginAllowlist {
    OriginAllowlist::new(["svc.example.com", "api.example.com:8443"]).unwrap()
}
