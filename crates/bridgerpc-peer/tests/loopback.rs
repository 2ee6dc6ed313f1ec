//! Two engines talking over in-process transports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bridgerpc_peer::{
    BridgeRpc, Headers, PeerError, RequestContext, Router, RpcConfig, UnaryRequest, Value,
};
use bridgerpc_protocol::{wire, ResponseErrorCode, ResponseStatusCode};
use bridgerpc_transport::{DuplexTransport, StreamTransport};
use bytes::Bytes;

fn echo_router() -> Router {
    let mut router = Router::new();
    router.add_unary("/test", |req: UnaryRequest| async move { Ok(req.body) });
    router
}

fn connect(server: Router, chunk_size: Option<usize>) -> (BridgeRpc, BridgeRpc) {
    connect_with(server, chunk_size, RpcConfig::default())
}

fn connect_with(
    server: Router,
    chunk_size: Option<usize>,
    client_config: RpcConfig,
) -> (BridgeRpc, BridgeRpc) {
    let (client_end, server_end) = DuplexTransport::pair_with_chunk_size(chunk_size);
    let server = BridgeRpc::new(server_end, server);
    let client = BridgeRpc::with_config(client_end, Router::new(), client_config);
    (client, server)
}

fn test_payload() -> Bytes {
    let mut map = BTreeMap::new();
    map.insert("test".to_string(), Value::from("data"));
    wire::encode_value(&Value::Map(map)).unwrap()
}

#[tokio::test]
async fn unary_echo_returns_identical_bytes() {
    let (client, _server) = connect(echo_router(), None);
    let payload = test_payload();

    let response = client.request("/test", payload.clone()).await.unwrap();

    assert_eq!(response.status, ResponseStatusCode::Success);
    assert_eq!(response.body, payload);
    let decoded = wire::decode_value(&response.body).unwrap();
    assert_eq!(decoded.get("test").and_then(Value::as_str), Some("data"));
    assert_eq!(client.awaiting_count(), 0);
}

#[tokio::test]
async fn echo_survives_tiny_transport_chunks() {
    for chunk_size in [1, 3, 7] {
        let (client, _server) = connect(echo_router(), Some(chunk_size));
        let response = client.request("/test", test_payload()).await.unwrap();
        assert_eq!(response.body, test_payload(), "chunk size {chunk_size}");
    }
}

#[tokio::test]
async fn unregistered_path_gets_no_handler_status() {
    let (client, _server) = connect(echo_router(), None);

    let response = client.request("test", test_payload()).await.unwrap();

    assert_eq!(response.status, ResponseStatusCode::NoHandlerForPath);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn streaming_exchange_with_headers_and_trailers() {
    let mut router = Router::new();
    router.add_handler("/upper", |mut ctx: RequestContext| async move {
        let mut headers = Headers::new();
        headers.insert(
            "echo".into(),
            ctx.request.header("name").cloned().unwrap_or_default(),
        );
        ctx.response
            .start(ResponseStatusCode::Success, Some(headers))
            .await?;
        let mut count = 0i64;
        while let Some(chunk) = ctx.request.next_chunk().await {
            count += 1;
            ctx.response
                .write(Bytes::from(chunk.to_ascii_uppercase()))
                .await?;
        }
        let received = ctx.request.trailers().await?;
        let mut trailers = Headers::new();
        trailers.insert("chunks".into(), count.into());
        trailers.insert(
            "sent".into(),
            received
                .and_then(|t| t.get("sent").cloned())
                .unwrap_or_default(),
        );
        ctx.response.end(Some(trailers)).await
    });
    let (client, _server) = connect(router, Some(5));

    let mut headers = Headers::new();
    headers.insert("name".into(), "bridge".into());
    let (mut request, mut response) = client
        .start_request("/upper", Some(headers))
        .await
        .unwrap();
    for part in ["alpha", "beta", "gamma"] {
        request.write(part).await.unwrap();
    }
    let mut trailers = Headers::new();
    trailers.insert("sent".into(), 3i64.into());
    request.end(Some(trailers)).await.unwrap();

    let head = response.head().await.unwrap();
    assert_eq!(head.status, ResponseStatusCode::Success);
    assert_eq!(
        head.headers.unwrap().get("echo").and_then(Value::as_str),
        Some("bridge")
    );

    let mut chunks = Vec::new();
    while let Some(chunk) = response.next_chunk().await {
        chunks.push(chunk);
    }
    assert_eq!(chunks, vec!["ALPHA", "BETA", "GAMMA"]);

    let trailers = response.trailers().await.unwrap().unwrap();
    assert_eq!(trailers.get("chunks").and_then(Value::as_i64), Some(3));
    assert_eq!(trailers.get("sent").and_then(Value::as_i64), Some(3));
}

#[tokio::test]
async fn handler_failure_becomes_error_response_naming_path() {
    let mut router = Router::new();
    router.add_unary("/fail", |_req: UnaryRequest| async move {
        Err(PeerError::handler("database unavailable"))
    });
    let (client, server) = connect(router, None);

    let err = client.request("/fail", "x").await.unwrap_err();

    match err {
        PeerError::Remote { code, message } => {
            assert_eq!(code, ResponseErrorCode::HandlerFailed);
            assert!(message.contains("/fail"), "{message}");
            assert!(message.contains("database unavailable"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(server.is_running());

    // The engine keeps serving after a failed handler.
    let err = client.request("/fail", "y").await.unwrap_err();
    assert!(matches!(err, PeerError::Remote { .. }));
}

#[tokio::test]
async fn panicking_handler_is_contained() {
    let mut router = Router::new();
    router.add_handler("/panic", |ctx: RequestContext| async move {
        if ctx.request.path() == "/panic" {
            panic!("handler bug");
        }
        Ok(())
    });
    router.add_unary("/test", |req: UnaryRequest| async move { Ok(req.body) });
    let (client, _server) = connect(router, None);

    let err = client.request("/panic", "x").await.unwrap_err();
    assert!(matches!(
        err,
        PeerError::Remote {
            code: ResponseErrorCode::HandlerFailed,
            ..
        }
    ));
    assert_eq!(client.request("/test", "ok").await.unwrap().body, "ok");
}

#[tokio::test]
async fn unfinished_response_is_completed_with_success() {
    let mut router = Router::new();
    router.add_handler("/silent", |_ctx: RequestContext| async move { Ok(()) });
    let (client, _server) = connect(router, None);

    let response = client.request("/silent", "ignored").await.unwrap();

    assert!(response.is_success());
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn concurrent_requests_are_correlated_by_id() {
    let (client, _server) = connect(echo_router(), Some(11));
    let client = Arc::new(client);

    let mut calls = Vec::new();
    for n in 0..32 {
        let client = Arc::clone(&client);
        calls.push(tokio::spawn(async move {
            let body = format!("request number {n}");
            let response = client.request("/test", body.clone()).await.unwrap();
            (body, response.body)
        }));
    }
    for call in calls {
        let (sent, received) = call.await.unwrap();
        assert_eq!(received, sent.as_bytes());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.awaiting_count(), 0);
}

#[tokio::test]
async fn unary_request_times_out() {
    let mut router = Router::new();
    router.add_handler("/never", |_ctx: RequestContext| async move {
        std::future::pending::<()>().await;
        Ok(())
    });
    let config = RpcConfig::default().with_request_timeout(Some(Duration::from_millis(100)));
    let (client, _server) = connect_with(router, None, config);

    let err = client.request("/never", "x").await.unwrap_err();

    assert!(matches!(err, PeerError::Timeout(t) if t == Duration::from_millis(100)));
    assert_eq!(client.awaiting_count(), 0);
}

#[tokio::test]
async fn probe_both_directions() {
    let (client, server) = connect(Router::new(), None);

    assert!(client.probe().await);
    assert!(server.probe_with_timeout(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn stop_propagates_and_abandons_pending_calls() {
    let mut router = Router::new();
    router.add_handler("/never", |_ctx: RequestContext| async move {
        std::future::pending::<()>().await;
        Ok(())
    });
    let config = RpcConfig::default().with_request_timeout(None);
    let (client, server) = connect_with(router, None, config);
    let client = Arc::new(client);

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.request("/never", "x").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.awaiting_count(), 1);

    client.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!client.is_running());
    assert!(!server.is_running());
    assert_eq!(client.awaiting_count(), 0);
    assert!(!client.probe_with_timeout(Duration::from_millis(20)).await);

    // Abandoned, not failed.
    let waited = tokio::time::timeout(Duration::from_millis(100), pending).await;
    assert!(waited.is_err());
}

#[tokio::test]
async fn restart_after_stop() {
    let (client, server) = connect(echo_router(), None);
    client.stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.start();
    server.start();

    let response = client.request("/test", "again").await.unwrap();
    assert_eq!(response.body, "again");
}

#[tokio::test]
async fn echo_over_byte_stream() {
    let (a, b) = tokio::io::duplex(64);
    let server = BridgeRpc::new(StreamTransport::new(b), echo_router());
    let client = BridgeRpc::new(StreamTransport::new(a), Router::new());

    let payload = Bytes::from(vec![0xAB; 10_000]);
    let response = client.request("/test", payload.clone()).await.unwrap();

    assert_eq!(response.body, payload);
    assert!(client.probe().await);
    client.shutdown().await.unwrap();
    drop(server);
}
