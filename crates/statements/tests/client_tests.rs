//! Tests for the statement service client against a mock HTTP server.

use std::sync::Mutex;

use async_trait::async_trait;
use expensa_core::errors::{Error, Result};
use expensa_core::imports::{
    read_statement_events, ImportError, SourceFile, StatementObserver, StatementProcessorTrait,
};
use expensa_statements::{StatementServiceClient, StatementServiceConfig};
use futures::StreamExt;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const EVENTS: &str = "{\"type\":\"progress\",\"percent\":40,\"message\":\"Reading pages\"}\n\
{\"type\":\"warning\",\"message\":\"Page 3 is blurry\"}\n\
{\"type\":\"result\",\"data\":[{\"title\":\"Groceries\",\"amount\":42.5,\"currency\":\"EUR\",\"date\":\"2024-03-02\"}]}\n";

#[derive(Default)]
struct CollectingObserver {
    progress: Mutex<Vec<f64>>,
    warnings: Mutex<Vec<String>>,
}

#[async_trait]
impl StatementObserver for CollectingObserver {
    async fn on_progress(&self, fraction: f64, _message: Option<String>) -> Result<()> {
        self.progress.lock().unwrap().push(fraction);
        Ok(())
    }

    async fn on_warning(&self, message: String) -> Result<()> {
        self.warnings.lock().unwrap().push(message);
        Ok(())
    }
}

fn statement_file() -> SourceFile {
    SourceFile {
        name: "march.pdf".to_string(),
        size: 8,
        media_type: "application/pdf".to_string(),
    }
}

fn client_for(server: &MockServer) -> StatementServiceClient {
    // Trailing slash must not produce "//process".
    let config = StatementServiceConfig::new(format!("{}/", server.uri()), "sk-test");
    StatementServiceClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_streams_events_from_service() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EVENTS))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let stream = client
        .process(&statement_file(), b"%PDF-1.7".to_vec())
        .await
        .unwrap();

    let observer = CollectingObserver::default();
    let transactions = read_statement_events(stream, &observer).await.unwrap();

    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].title.as_deref(), Some("Groceries"));
    assert_eq!(*observer.progress.lock().unwrap(), vec![0.4]);
    assert_eq!(
        *observer.warnings.lock().unwrap(),
        vec!["Page 3 is blurry".to_string()]
    );
}

#[tokio::test]
async fn test_uploads_file_as_multipart() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EVENTS))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let stream = client
        .process(&statement_file(), b"%PDF-1.7".to_vec())
        .await
        .unwrap();
    let body: Vec<Vec<u8>> = stream.map(|chunk| chunk.unwrap()).collect().await;
    assert!(!body.concat().is_empty());

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let content_type = request
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let sent = String::from_utf8_lossy(&request.body);
    assert!(sent.contains("name=\"file\"; filename=\"march.pdf\""));
    assert!(sent.contains("Content-Type: application/pdf"));
    assert!(sent.contains("%PDF-1.7"));
}

#[tokio::test]
async fn test_missing_media_type_falls_back_to_octet_stream() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EVENTS))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let file = SourceFile {
        media_type: String::new(),
        ..statement_file()
    };
    client.process(&file, b"%PDF-1.7".to_vec()).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let sent = String::from_utf8_lossy(&requests[0].body);
    assert!(sent.contains("Content-Type: application/octet-stream"));
}

#[tokio::test]
async fn test_non_ok_status_includes_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .respond_with(ResponseTemplate::new(422).set_body_string("Encrypted PDF"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = match client.process(&statement_file(), b"%PDF-1.7".to_vec()).await {
        Ok(_) => panic!("expected the upload to fail"),
        Err(e) => e,
    };

    match &err {
        Error::Import(ImportError::StatementService(message)) => {
            assert!(message.starts_with("HTTP 422"));
            assert!(message.contains("Encrypted PDF"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.code(), "BAD_GATEWAY");
}

#[tokio::test]
async fn test_unreachable_service_is_a_service_error() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();
    drop(mock_server);

    let client = StatementServiceClient::new(&StatementServiceConfig::new(uri, "sk-test")).unwrap();
    let result = client.process(&statement_file(), b"%PDF-1.7".to_vec()).await;

    assert!(matches!(
        result,
        Err(Error::Import(ImportError::StatementService(_)))
    ));
}

#[test]
fn test_rejects_api_key_that_is_not_a_header_value() {
    let config = StatementServiceConfig::new("http://localhost:9", "bad\nkey");

    assert!(matches!(
        StatementServiceClient::new(&config),
        Err(Error::InvalidConfigValue(_))
    ));
}
