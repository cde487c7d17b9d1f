//! Parse service delegation against a local HTTP responder.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wikidom_parser::wiki::fetch::{ContentProvider, FetchError, MemoryProvider, PageContent};
use wikidom_parser::wiki::service::{ParseService, ServiceError, ServiceOptions};
use wikidom_parser::wiki::title::Title;
use wikidom_parser::wiki::{EnvOptions, ParserPipelineFactory};

/// A wiki that is never reachable.
struct Offline;

#[async_trait]
impl ContentProvider for Offline {
    async fn fetch(&self, _title: &Title) -> Result<PageContent, FetchError> {
        Err(FetchError::Transport("connection refused".into()))
    }
}

/// Serve exactly one request with `status` and `body`; returns the base URL.
async fn respond_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{}/", addr)
}

fn service(service_url: String) -> ParseService {
    ParseService::new(
        ParserPipelineFactory::new(Arc::new(MemoryProvider::new())),
        EnvOptions::default(),
        ServiceOptions { service_url },
    )
}

#[tokio::test]
async fn test_delegated_parse_returns_body() {
    let url = respond_once("200 OK", "<p>Bar</p>").await;
    let html = service(url).parse("Bar", true).await.unwrap();
    assert_eq!(html, "<p>Bar</p>");
}

#[tokio::test]
async fn test_non_success_status_is_a_failure() {
    let url = respond_once("404 Not Found", "missing").await;
    let result = service(url).parse("Bar", true).await;
    assert!(matches!(
        result,
        Err(ServiceError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let calls: Arc<Mutex<Vec<Result<String, ServiceError>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    service(format!("http://{}/", addr))
        .parse_with_callback("Bar", true, move |result| {
            sink.lock().unwrap().push(result)
        })
        .await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], Err(ServiceError::Transport(_))));
}

#[tokio::test]
async fn test_local_parse_of_unfetchable_page_is_a_failure() {
    let service = ParseService::new(
        ParserPipelineFactory::new(Arc::new(Offline)),
        EnvOptions::default(),
        ServiceOptions::default(),
    );
    let mut calls = Vec::new();
    service
        .parse_with_callback("Bar", false, |result| calls.push(result))
        .await;
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Err(ServiceError::Fetch(message)) => assert!(message.contains("connection refused")),
        other => panic!("expected a fetch failure, got {:?}", other),
    }
}
