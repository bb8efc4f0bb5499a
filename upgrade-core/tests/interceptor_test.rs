mod common;

use bytes::Bytes;
use common::{svc_allowlist, RecordingFetcher};
use futures::stream;
use http::{HeaderMap, HeaderValue, Method};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use upgrade_core::{
    CloneError, DiagnosticKind, Diagnostics, DispatchError, FallbackReason, FetchError,
    InterceptError, InterceptedRequest, RequestInterceptor, Route,
};

fn interceptor(fetcher: &Arc<RecordingFetcher>) -> RequestInterceptor {
    RequestInterceptor::new(svc_allowlist(), fetcher.clone(), Diagnostics::disabled())
}

#[tokio::test]
async fn test_upgrade_preserves_method_headers_and_body() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    let mut headers = HeaderMap::new();
    headers.insert("x-trace", HeaderValue::from_static("42"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    let request = InterceptedRequest::new(Method::PUT, "http://svc.example.com/api/works/7")
        .with_headers(headers)
        .with_body("{\"title\":\"roof\"}");

    let response = interceptor.intercept(request).await.unwrap();
    assert_eq!(response.url, "https://svc.example.com/api/works/7");

    let attempts = fetcher.attempts();
    assert_eq!(attempts.len(), 1);
    let sent = &attempts[0];
    assert_eq!(sent.url, "https://svc.example.com/api/works/7");
    assert_eq!(sent.method, Method::PUT);
    assert_eq!(sent.headers["x-trace"], "42");
    assert_eq!(sent.headers["content-type"], "application/json");
    assert_eq!(sent.body.as_deref(), Some(&b"{\"title\":\"roof\"}"[..]));

    let snapshot = interceptor.metrics().snapshot();
    assert_eq!(snapshot.rewritten, 1);
    assert_eq!(snapshot.rewrites_by_origin.get("svc.example.com"), Some(&1));
}

#[tokio::test]
async fn test_dashboard_navigation_is_upgraded() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    interceptor
        .intercept(InterceptedRequest::get("http://svc.example.com/dashboard"))
        .await
        .unwrap();

    assert_eq!(fetcher.attempts()[0].url, "https://svc.example.com/dashboard");
}

#[tokio::test]
async fn test_origin_with_port_is_upgraded() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    interceptor
        .intercept(InterceptedRequest::get("http://api.example.com:8443/v1/items"))
        .await
        .unwrap();

    assert_eq!(fetcher.attempts()[0].url, "https://api.example.com:8443/v1/items");
}

#[tokio::test]
async fn test_unlisted_origin_is_forwarded_unchanged() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    let url = "http://cdn.other.test/lib.js";
    assert_eq!(interceptor.route(url), Route::Other);
    interceptor.intercept(InterceptedRequest::get(url)).await.unwrap();

    let attempts = fetcher.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].url, url);

    let snapshot = interceptor.metrics().snapshot();
    assert_eq!(snapshot.rewritten, 0);
    assert_eq!(snapshot.passed_through, 1);
    assert_eq!(snapshot.fallbacks, 0);
}

#[tokio::test]
async fn test_secure_request_dispatches_clone_without_fallback() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    let url = "https://svc.example.com/api/works";
    assert_eq!(interceptor.route(url), Route::Secure);

    let request = InterceptedRequest::new(Method::POST, url).with_body("payload");
    interceptor.intercept(request).await.unwrap();

    let attempts = fetcher.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].url, url);
    assert_eq!(attempts[0].body.as_deref(), Some(&b"payload"[..]));
    assert_eq!(interceptor.metrics().snapshot().fallbacks, 0);
}

#[tokio::test]
async fn test_query_string_occurrence_is_rewritten() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    let url = "https://other.test/x?ref=http://svc.example.com";
    assert!(matches!(interceptor.route(url), Route::Upgrade { .. }));
    interceptor.intercept(InterceptedRequest::get(url)).await.unwrap();

    assert_eq!(
        fetcher.attempts()[0].url,
        "https://other.test/x?ref=https://svc.example.com"
    );
}

#[tokio::test]
async fn test_streaming_body_falls_back_to_original_once() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let (tx, mut rx) = mpsc::channel(16);
    let interceptor = RequestInterceptor::new(
        svc_allowlist(),
        fetcher.clone(),
        Diagnostics::new(true).with_sink(tx),
    );

    let body = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"chunk"))]);
    let request = InterceptedRequest::new(Method::POST, "https://uploads.other.test/file")
        .with_body(upgrade_core::RequestBody::Stream(Box::pin(body)));

    interceptor.intercept(request).await.unwrap();

    // The clone never existed; only the original went out.
    let attempts = fetcher.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].accepted);
    assert!(attempts[0].body.is_none());
    assert_eq!(interceptor.metrics().snapshot().fallbacks, 1);

    let mut kinds = Vec::new();
    while let Ok(record) = rx.try_recv() {
        kinds.push(record.kind);
    }
    assert_eq!(
        kinds,
        vec![
            DiagnosticKind::PassThrough,
            DiagnosticKind::Fallback,
            DiagnosticKind::Completed
        ]
    );
}

#[tokio::test]
async fn test_clone_dispatch_failure_falls_back_exactly_once() {
    let fetcher = Arc::new(RecordingFetcher::new());
    fetcher.fail_next(DispatchError::InvalidRequest("bad header".to_string()));
    let interceptor = interceptor(&fetcher);

    let url = "https://svc.example.com/report";
    interceptor.intercept(InterceptedRequest::get(url)).await.unwrap();

    let attempts = fetcher.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].accepted);
    assert!(attempts[1].accepted);
    assert!(attempts.iter().all(|a| a.url == url));
    assert_eq!(interceptor.metrics().snapshot().fallbacks, 1);
}

#[tokio::test]
async fn test_second_sync_failure_is_terminal() {
    let fetcher = Arc::new(RecordingFetcher::new());
    fetcher.fail_next(DispatchError::InvalidRequest("first".to_string()));
    fetcher.fail_next(DispatchError::InvalidRequest("second".to_string()));
    fetcher.fail_next(DispatchError::InvalidRequest("never reached".to_string()));
    let interceptor = interceptor(&fetcher);

    let err = interceptor
        .intercept(InterceptedRequest::get("https://svc.example.com/report"))
        .await
        .unwrap_err();

    match err {
        InterceptError::TerminalDispatch {
            url,
            primary,
            source,
        } => {
            assert_eq!(url, "https://svc.example.com/report");
            assert_eq!(
                primary,
                FallbackReason::Dispatch(DispatchError::InvalidRequest("first".to_string()))
            );
            assert_eq!(source, DispatchError::InvalidRequest("second".to_string()));
        }
        other => panic!("expected terminal dispatch error, got {:?}", other),
    }
    assert_eq!(fetcher.attempts().len(), 2);
    assert_eq!(interceptor.metrics().snapshot().dispatch_failures, 1);
}

#[tokio::test]
async fn test_consumed_body_is_terminal_after_one_fallback() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    let mut request =
        InterceptedRequest::new(Method::POST, "https://svc.example.com/form").with_body("a=1");
    let _ = request.take_body();

    let err = interceptor.intercept(request).await.unwrap_err();
    match err {
        InterceptError::TerminalDispatch { primary, source, .. } => {
            assert_eq!(primary, FallbackReason::Clone(CloneError::BodyUsed));
            assert_eq!(source, DispatchError::BodyUsed);
        }
        other => panic!("expected terminal dispatch error, got {:?}", other),
    }

    // Clone failed before dispatch, so only the fallback attempt was made.
    let attempts = fetcher.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].accepted);
}

#[tokio::test]
async fn test_network_failure_on_upgrade_is_not_retried() {
    let fetcher = Arc::new(RecordingFetcher::new());
    fetcher.reject_with(FetchError::Network("connection refused".to_string()));
    let interceptor = interceptor(&fetcher);

    let err = interceptor
        .intercept(InterceptedRequest::get("http://svc.example.com/dashboard"))
        .await
        .unwrap_err();

    assert!(err.is_network());
    assert_eq!(err.url(), "https://svc.example.com/dashboard");
    assert_eq!(fetcher.attempts().len(), 1);
    assert_eq!(interceptor.metrics().network_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_network_failure_on_pass_through_is_not_retried() {
    let fetcher = Arc::new(RecordingFetcher::new());
    fetcher.reject_with(FetchError::Redirect {
        location: "https://elsewhere.test/".to_string(),
    });
    let interceptor = interceptor(&fetcher);

    let err = interceptor
        .intercept(InterceptedRequest::get("https://svc.example.com/moved"))
        .await
        .unwrap_err();

    match err {
        InterceptError::Network { url, source } => {
            assert_eq!(url, "https://svc.example.com/moved");
            assert!(matches!(source, FetchError::Redirect { .. }));
        }
        other => panic!("expected network error, got {:?}", other),
    }
    assert_eq!(fetcher.attempts().len(), 1);
    assert_eq!(interceptor.metrics().snapshot().fallbacks, 0);
}

#[tokio::test]
async fn test_rewritten_dispatch_failure_has_no_fallback() {
    let fetcher = Arc::new(RecordingFetcher::new());
    fetcher.fail_next(DispatchError::InvalidRequest("bad url".to_string()));
    let interceptor = interceptor(&fetcher);

    let err = interceptor
        .intercept(InterceptedRequest::get("http://svc.example.com/a"))
        .await
        .unwrap_err();

    assert!(matches!(err, InterceptError::Dispatch { .. }));
    assert_eq!(err.url(), "https://svc.example.com/a");
    assert_eq!(fetcher.attempts().len(), 1);
}

#[tokio::test]
async fn test_concurrent_events_settle_independently() {
    let fetcher = Arc::new(RecordingFetcher::new());
    let interceptor = interceptor(&fetcher);

    let mut handles = Vec::new();
    for i in 0..16 {
        let interceptor = interceptor.clone();
        handles.push(tokio::spawn(async move {
            let url = if i % 2 == 0 {
                format!("http://svc.example.com/item/{}", i)
            } else {
                format!("https://other.test/item/{}", i)
            };
            interceptor.intercept(InterceptedRequest::get(url)).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let snapshot = interceptor.metrics().snapshot();
    assert_eq!(snapshot.rewritten, 8);
    assert_eq!(snapshot.passed_through, 8);
    assert_eq!(fetcher.attempts().len(), 16);
}
