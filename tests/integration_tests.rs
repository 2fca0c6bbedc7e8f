use anyhow::Result;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tailon::queue::SharedQueueService;
use tailon::{build_router, AppState, MemoryService, Queue, QueueService};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server() -> Result<(SocketAddr, AppState)> {
    let queues: SharedQueueService = Arc::new(MemoryService::new());
    let state = AppState::new(queues);
    let app = build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    Ok((addr, state))
}

struct RawResponse {
    status: u16,
    body: String,
}

/// Send one HTTP/1.1 request with `Connection: close` and read the whole reply.
async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Result<RawResponse> {
    let mut stream = TcpStream::connect(addr).await?;
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Length: {}\r\n",
        method,
        path,
        addr,
        body.len()
    );
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    parse_response(&raw)
}

fn parse_response(raw: &[u8]) -> Result<RawResponse> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("incomplete response: {:?}", text))?;
    let status = head
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("missing status line"))?
        .parse()?;

    let chunked = head
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked {
        dechunk(body)?
    } else {
        body.to_string()
    };

    Ok(RawResponse { status, body })
}

fn dechunk(mut body: &str) -> Result<String> {
    let mut out = String::new();
    loop {
        let (size, rest) = body
            .split_once("\r\n")
            .ok_or_else(|| anyhow::anyhow!("bad chunk header"))?;
        let size = usize::from_str_radix(size.trim(), 16)?;
        if size == 0 {
            return Ok(out);
        }
        out.push_str(&rest[..size]);
        body = &rest[size + 2..];
    }
}

#[tokio::test]
async fn test_orders_scenario() -> Result<()> {
    let (addr, _) = start_server().await?;

    let created = request(addr, "POST", "/v1/queues", &[], r#"{"name":"orders"}"#).await?;
    assert_eq!(created.status, 201);
    assert_eq!(created.body, "");

    let written = request(
        addr,
        "POST",
        "/v1/queues/orders:write",
        &[],
        "{\"id\":1}\n{\"id\":2}\n",
    )
    .await?;
    assert_eq!(written.status, 200);

    let read = request(addr, "GET", "/v1/queues/orders:read", &[("Limit", "2")], "").await?;
    assert_eq!(read.status, 200);
    assert_eq!(read.body, "{\"id\":1}\n{\"id\":2}\n");
    Ok(())
}

#[tokio::test]
async fn test_malformed_write_scenario() -> Result<()> {
    let (addr, state) = start_server().await?;
    request(addr, "POST", "/v1/queues", &[], r#"{"name":"orders"}"#).await?;

    let written = request(addr, "POST", "/v1/queues/orders:write", &[], "{\"id\":1} not-json").await?;
    assert_eq!(written.status, 400);
    let error: serde_json::Value = serde_json::from_str(&written.body)?;
    assert_eq!(error["error"]["description"], "Malformed JSON");

    let queue = state.queues.get_queue("orders").await?;
    assert_eq!(queue.stats().len, 1);
    assert_eq!(queue.read().await?, Bytes::from_static(b"{\"id\":1}"));
    Ok(())
}

#[tokio::test]
async fn test_missing_queue_is_404() -> Result<()> {
    let (addr, _) = start_server().await?;
    let response = request(addr, "GET", "/v1/queues/does-not-exist", &[], "").await?;
    assert_eq!(response.status, 404);
    Ok(())
}

#[tokio::test]
async fn test_peer_address_recorded_for_session() -> Result<()> {
    let (addr, state) = start_server().await?;
    request(addr, "POST", "/v1/queues", &[], r#"{"name":"tail"}"#).await?;

    let reader = tokio::spawn(async move {
        request(addr, "GET", "/v1/queues/tail:read", &[("Limit", "1")], "").await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sessions = state.sessions.list();
    assert_eq!(sessions.len(), 1);
    let session = sessions.values().next().unwrap();
    assert_eq!(session.origin, "127.0.0.1");
    assert_eq!(session.queue, "tail");

    request(addr, "POST", "/v1/queues/tail:write", &[], "\"done\"").await?;
    let response = reader.await??;
    assert_eq!(response.body, "\"done\"\n");
    Ok(())
}

#[tokio::test]
async fn test_client_disconnect_ends_tail() -> Result<()> {
    let (addr, state) = start_server().await?;
    request(addr, "POST", "/v1/queues", &[], r#"{"name":"tail"}"#).await?;

    let mut stream = TcpStream::connect(addr).await?;
    let head = format!(
        "GET /v1/queues/tail:read HTTP/1.1\r\nHost: {}\r\nLimit: 1000\r\n\r\n",
        addr
    );
    stream.write_all(head.as_bytes()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.sessions.len(), 1);

    drop(stream);

    // The tail notices the closed peer at the latest when it tries to send.
    let queue = state.queues.get_queue("tail").await?;
    for _ in 0..40 {
        if state.sessions.is_empty() {
            break;
        }
        queue.write(Bytes::from_static(b"1")).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(state.sessions.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_writers_over_http() -> Result<()> {
    let (addr, state) = start_server().await?;
    request(addr, "POST", "/v1/queues", &[], r#"{"name":"fan-in"}"#).await?;

    let writers = 4;
    let per_writer = 50;
    let mut handles = Vec::new();
    for w in 0..writers {
        handles.push(tokio::spawn(async move {
            let body: String = (0..per_writer)
                .map(|i| format!("{{\"w\":{},\"i\":{}}}\n", w, i))
                .collect();
            request(addr, "POST", "/v1/queues/fan-in:write", &[], &body).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await??.status, 200);
    }

    let limit = (writers * per_writer).to_string();
    let read = request(addr, "GET", "/v1/queues/fan-in:read", &[("Limit", limit.as_str())], "").await?;
    let mut seen = std::collections::HashSet::new();
    for line in read.body.lines() {
        let value: serde_json::Value = serde_json::from_str(line)?;
        assert!(seen.insert((value["w"].as_u64(), value["i"].as_u64())));
    }
    assert_eq!(seen.len(), writers * per_writer);

    let queue = state.queues.get_queue("fan-in").await?;
    assert_eq!(queue.stats().len, 0);
    Ok(())
}
