//! End-to-end calls against the in-process mock server

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{MockServer, Reply};
use courier::interceptor::{Chain, interceptor_fn};
use courier::{CallState, Client, Error, Request, RequestBody, callback_fn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn get(url: &str) -> Request {
    Request::builder().url(url).build().unwrap()
}

#[tokio::test]
async fn test_execute_get() {
    let server = MockServer::start(vec![Reply::status(
        200,
        "OK",
        &[("Content-Type", "text/plain")],
        b"hello",
    )])
    .await;
    let client = Client::new();

    let call = client.new_call(get(&server.url("/greeting?lang=en")));
    let response = call.execute().await.unwrap();

    assert_eq!(response.code(), 200);
    assert_eq!(response.message(), "OK");
    assert!(response.is_successful());
    let body = response.body().unwrap();
    assert_eq!(body.content_type(), Some("text/plain"));
    assert_eq!(body.string().await.unwrap(), "hello");
    assert_eq!(call.state(), CallState::Completed);

    let recorded = &server.requests()[0];
    assert_eq!(recorded.method, "GET");
    assert_eq!(recorded.target, "/greeting?lang=en");
    assert_eq!(recorded.header("Host"), Some(server.addr().to_string().as_str()));
}

#[tokio::test]
async fn test_execute_twice_fails_but_clone_runs() {
    let server = MockServer::start(vec![Reply::ok("one"), Reply::ok("two")]).await;
    let client = Client::new();

    let call = client.new_call(get(&server.url("/")));
    call.execute().await.unwrap();
    assert!(call.is_executed());

    let err = call.execute().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExecuted));
    assert!(err.is_policy_violation());

    let again = call.clone();
    assert!(!again.is_executed());
    let response = again.execute().await.unwrap();
    assert_eq!(response.body().unwrap().string().await.unwrap(), "two");
}

#[tokio::test]
async fn test_enqueue_after_execute_fails() {
    let server = MockServer::start(vec![Reply::ok("")]).await;
    let call = Client::new().new_call(get(&server.url("/")));
    call.execute().await.unwrap();

    let err = call.enqueue(callback_fn(|_| {})).unwrap_err();
    assert!(matches!(err, Error::AlreadyExecuted));
}

#[tokio::test]
async fn test_canceled_call_never_reaches_server() {
    let server = MockServer::start(vec![Reply::ok("unused")]).await;
    let call = Client::new().new_call(get(&server.url("/")));

    call.cancel();
    assert!(call.is_canceled());
    assert!(matches!(call.execute().await, Err(Error::Canceled)));
    assert_eq!(call.state(), CallState::Canceled);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn test_enqueue_delivers_response_to_callback() {
    let server = MockServer::start(vec![Reply::ok("async")]).await;
    let client = Client::new();
    let (tx, rx) = oneshot::channel();

    client
        .new_call(get(&server.url("/async")))
        .enqueue(callback_fn(move |result| {
            let _ = tx.send(result);
        }))
        .unwrap();

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.code(), 200);
    assert_eq!(response.body().unwrap().string().await.unwrap(), "async");
}

#[tokio::test]
async fn test_enqueue_delivers_failure_to_callback() {
    // Nothing listens on the port once the listener is dropped.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (tx, rx) = oneshot::channel();

    Client::new()
        .new_call(get(&format!("http://127.0.0.1:{port}/")))
        .enqueue(callback_fn(move |result| {
            let _ = tx.send(result);
        }))
        .unwrap();

    assert!(matches!(rx.await.unwrap(), Err(Error::Connect { .. })));
}

#[tokio::test]
async fn test_keep_alive_connection_is_reused() {
    let server = MockServer::start(vec![Reply::ok("a"), Reply::ok("b")]).await;
    let client = Client::new();

    for expected in ["a", "b"] {
        let response = client.new_call(get(&server.url("/"))).execute().await.unwrap();
        assert_eq!(response.body().unwrap().string().await.unwrap(), expected);
    }

    assert_eq!(server.connection_count(), 1);
    assert_eq!(client.connection_pool().connection_count(), 1);
    assert_eq!(client.connection_pool().idle_connection_count(), 1);
}

#[tokio::test]
async fn test_connection_close_is_not_pooled() {
    let server = MockServer::start(vec![
        Reply::status(200, "OK", &[("Connection", "close")], b"bye"),
        Reply::ok("fresh"),
    ])
    .await;
    let client = Client::new();

    client.new_call(get(&server.url("/"))).execute().await.unwrap();
    assert_eq!(client.connection_pool().connection_count(), 0);

    let response = client.new_call(get(&server.url("/"))).execute().await.unwrap();
    assert_eq!(response.body().unwrap().string().await.unwrap(), "fresh");
    assert_eq!(server.connection_count(), 2);
}

#[tokio::test]
async fn test_chunked_response_is_decoded_and_pooled() {
    let chunked = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let server = MockServer::start(vec![Reply::Raw(chunked.to_vec())]).await;
    let client = Client::new();

    let response = client.new_call(get(&server.url("/"))).execute().await.unwrap();

    assert_eq!(response.body().unwrap().string().await.unwrap(), "hello world");
    assert_eq!(client.connection_pool().connection_count(), 1);
}

#[tokio::test]
async fn test_body_until_eof_is_not_pooled() {
    let raw = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nstreamed until close";
    let server = MockServer::start(vec![Reply::Raw(raw.to_vec())]).await;
    let client = Client::new();

    let response = client.new_call(get(&server.url("/"))).execute().await.unwrap();

    assert_eq!(
        response.body().unwrap().string().await.unwrap(),
        "streamed until close"
    );
    assert_eq!(client.connection_pool().connection_count(), 0);
}

#[tokio::test]
async fn test_head_response_has_empty_body() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1024\r\n\r\n";
    let server = MockServer::start(vec![Reply::Raw(raw.to_vec())]).await;
    let client = Client::new();

    let request = Request::builder().url(server.url("/")).head().build().unwrap();
    let response = client.new_call(request).execute().await.unwrap();

    assert_eq!(response.header("Content-Length"), Some("1024"));
    assert!(response.body().unwrap().bytes().await.unwrap().is_empty());
    assert_eq!(server.requests()[0].method, "HEAD");
}

#[tokio::test]
async fn test_no_content_response_has_empty_body() {
    let server = MockServer::start(vec![Reply::status(204, "No Content", &[], b"")]).await;
    let response = Client::new()
        .new_call(get(&server.url("/")))
        .execute()
        .await
        .unwrap();

    assert_eq!(response.code(), 204);
    assert!(response.body().unwrap().bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_post_sends_body_with_length() {
    let server = MockServer::start(vec![Reply::status(201, "Created", &[], b"")]).await;
    let request = Request::builder()
        .url(server.url("/items"))
        .post(RequestBody::json(r#"{"name":"widget"}"#))
        .build()
        .unwrap();

    let response = Client::new().new_call(request).execute().await.unwrap();
    assert_eq!(response.code(), 201);

    let recorded = &server.requests()[0];
    assert_eq!(recorded.method, "POST");
    assert_eq!(recorded.body, br#"{"name":"widget"}"#);
    assert_eq!(recorded.header("Content-Length"), Some("17"));
    assert_eq!(
        recorded.header("Content-Type"),
        Some("application/json; charset=utf-8")
    );
}

#[tokio::test]
async fn test_stream_body_of_unknown_length_is_chunked() {
    let server = MockServer::start(vec![Reply::ok("")]).await;
    let body = RequestBody::from_reader(
        Some("application/octet-stream".to_string()),
        Cursor::new(b"streamed payload".to_vec()),
        None,
    );
    let request = Request::builder()
        .url(server.url("/upload"))
        .put(body)
        .build()
        .unwrap();

    Client::new().new_call(request).execute().await.unwrap();

    let recorded = &server.requests()[0];
    assert_eq!(recorded.header("Transfer-Encoding"), Some("chunked"));
    assert_eq!(recorded.header("Content-Length"), None);
    assert_eq!(recorded.body, b"streamed payload");
}

#[tokio::test]
async fn test_stale_connection_is_retried() {
    let server = MockServer::start(vec![Reply::Disconnect, Reply::ok("recovered")]).await;
    let client = Client::new();

    let response = client.new_call(get(&server.url("/"))).execute().await.unwrap();

    assert_eq!(response.body().unwrap().string().await.unwrap(), "recovered");
    assert_eq!(server.request_count(), 2);
    assert_eq!(server.connection_count(), 2);
}

#[tokio::test]
async fn test_retry_can_be_disabled() {
    let server = MockServer::start(vec![Reply::Disconnect, Reply::ok("unused")]).await;
    let client = Client::builder().retry_on_connection_failure(false).build();

    let err = client
        .new_call(get(&server.url("/")))
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(server.request_count(), 1);
    assert_eq!(client.connection_pool().connection_count(), 0);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start(vec![Reply::Disconnect; 10]).await;
    let client = Client::new();

    let err = client
        .new_call(get(&server.url("/")))
        .execute()
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(server.request_count(), 1 + client.config().max_retries as usize);
}

#[tokio::test]
async fn test_malformed_status_line_is_fatal() {
    let server = MockServer::start(vec![
        Reply::Raw(b"garbage\r\n\r\n".to_vec()),
        Reply::ok("unused"),
    ])
    .await;

    let err = Client::new()
        .new_call(get(&server.url("/")))
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol(_)));
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_truncated_body_is_fatal() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nabc";
    let server = MockServer::start(vec![Reply::Raw(raw.to_vec())]).await;

    let err = Client::new()
        .new_call(get(&server.url("/")))
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::TruncatedBody {
            expected: 10,
            received: 3
        }
    ));
}

#[tokio::test]
async fn test_read_timeout() {
    let server = MockServer::start(vec![Reply::Raw(Vec::new())]).await;
    let client = Client::builder()
        .read_timeout(Duration::from_millis(100))
        .retry_on_connection_failure(false)
        .build();

    let err = client
        .new_call(get(&server.url("/")))
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { operation: "read", .. }));
}

/// Serves one response whose 10-byte body arrives 2 bytes every 100ms.
async fn trickle_server(accepted: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut byte = [0u8; 1];
                while !head.ends_with(b"\r\n\r\n") {
                    if socket.read(&mut byte).await.unwrap_or(0) == 0 {
                        return;
                    }
                    head.push(byte[0]);
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n")
                    .await;
                for piece in b"0123456789".chunks(2) {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    if socket.write_all(piece).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn test_read_timeout_applies_per_read_not_per_body() {
    let accepted = Arc::new(AtomicUsize::new(0));
    let url = trickle_server(Arc::clone(&accepted)).await;
    let client = Client::builder()
        .read_timeout(Duration::from_millis(300))
        .build();

    let response = client.new_call(get(&url)).execute().await.unwrap();

    assert_eq!(response.code(), 200);
    assert_eq!(response.body().unwrap().string().await.unwrap(), "0123456789");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_https_is_unsupported() {
    let err = Client::new()
        .new_call(get("https://example.com/"))
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedScheme(_)));
}

#[tokio::test]
async fn test_network_interceptor_sees_bridged_request() {
    let server = MockServer::start(vec![Reply::ok("")]).await;
    let client = Client::builder()
        .add_network_interceptor(interceptor_fn(|chain: Chain| async move {
            assert!(chain.connection().is_some());
            assert_eq!(chain.request().header("Connection"), Some("Keep-Alive"));
            let request = chain.request().new_builder().header("X-Network", "1").build()?;
            chain.proceed(request).await
        }))
        .build();

    client.new_call(get(&server.url("/"))).execute().await.unwrap();

    assert_eq!(server.requests()[0].header("X-Network"), Some("1"));
}

#[tokio::test]
async fn test_sync_calls_are_tracked_by_dispatcher() {
    let server = MockServer::start(vec![Reply::ok("")]).await;
    let client = Client::new();

    client.new_call(get(&server.url("/"))).execute().await.unwrap();

    assert_eq!(client.dispatcher().running_calls_count(), 0);
}

#[test]
fn test_enqueue_outside_runtime_fails() {
    let client = Client::new();
    let call = client.new_call(get("http://a.test/"));

    let err = call
        .enqueue(callback_fn(|_| panic!("callback must not run")))
        .unwrap_err();

    assert!(matches!(err, Error::NoRuntime));
    assert_eq!(call.state(), CallState::Completed);
    assert!(matches!(call.enqueue(callback_fn(|_| {})), Err(Error::AlreadyExecuted)));
    assert_eq!(client.dispatcher().running_calls_count(), 0);
    assert_eq!(client.dispatcher().queued_calls_count(), 0);
}
