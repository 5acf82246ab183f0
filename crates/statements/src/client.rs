//! HTTP client for the statement-processing service.
//!
//! The service takes a bank statement as a multipart upload and answers with
//! newline-delimited JSON events. The response body is handed back as a byte
//! stream so events can be read while the service is still working.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};

use expensa_core::errors::{Error, Result};
use expensa_core::imports::{ImportError, SourceFile, StatementByteStream, StatementProcessorTrait};

use crate::config::StatementServiceConfig;

/// Media type sent when the upload did not declare one.
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Longest error body quoted back to the user.
const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct StatementServiceClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderValue,
}

impl StatementServiceClient {
    /// Builds a client. Only connecting is time-limited; reading the event
    /// stream is bounded by the caller's statement timeout.
    pub fn new(config: &StatementServiceConfig) -> Result<Self> {
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| Error::InvalidConfigValue(format!("Invalid API key format: {}", e)))?;
        auth_header.set_sensitive(true);

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to initialize HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    fn process_url(&self) -> String {
        format!("{}/process", self.base_url)
    }

    fn file_part(file: &SourceFile, payload: Vec<u8>) -> Result<Part> {
        let declared = file.media_type.trim();
        let media_type = if declared.contains('/') {
            declared
        } else {
            FALLBACK_MEDIA_TYPE
        };
        Part::bytes(payload)
            .file_name(file.name.clone())
            .mime_str(media_type)
            .map_err(|e| service_error(format!("Invalid media type '{}': {}", media_type, e)))
    }
}

#[async_trait]
impl StatementProcessorTrait for StatementServiceClient {
    async fn process(&self, file: &SourceFile, payload: Vec<u8>) -> Result<StatementByteStream> {
        let url = self.process_url();
        info!(
            "[StatementService] Uploading {} ({} bytes) to {}",
            file.name,
            payload.len(),
            url
        );

        let part = Self::file_part(file, payload)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth_header.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| service_error(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(service_error(if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body)
            }));
        }

        debug!("[StatementService] Streaming events for {}", file.name);
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| service_error(format!("Response stream broke: {}", e)))
        });
        Ok(stream.boxed())
    }
}

fn service_error(message: String) -> Error {
    ImportError::StatementService(message).into()
}
