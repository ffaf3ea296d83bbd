use super::scanner::content_type;
use crate::config::UploadConfig;
use crate::error::{GlassesError, UploadError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::PathBuf;
use tracing::{debug, info};

/// One multipart photo POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub endpoint: String,
    /// Sent as `Authorization: Bearer <key>` when present
    pub api_key: Option<String>,
    pub path: PathBuf,
    pub filename: String,
    /// Milliseconds since the Unix epoch at submission
    pub timestamp_ms: i64,
}

/// Backend that accepts photos
#[async_trait]
pub trait PhotoUploader: Send + Sync {
    /// Upload and return the response body verbatim on a 2xx status
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;
}

/// `reqwest` backed uploader posting `multipart/form-data`
pub struct HttpPhotoUploader {
    client: Client,
}

impl HttpPhotoUploader {
    pub fn new(config: &UploadConfig) -> Result<Self, GlassesError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GlassesError::component("upload", e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PhotoUploader for HttpPhotoUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(&request.path)
            .await
            .map_err(|_| UploadError::FileUnreadable {
                path: request.path.clone(),
            })?;
        debug!(
            "Posting {} ({} bytes) to {}",
            request.filename,
            bytes.len(),
            request.endpoint
        );

        let photo = Part::bytes(bytes)
            .file_name(request.filename.clone())
            .mime_str(content_type(&request.path))
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let form = Form::new()
            .part("photo", photo)
            .text("timestamp", request.timestamp_ms.to_string())
            .text("filename", request.filename.clone());

        let mut builder = self.client.post(&request.endpoint).multipart(form);
        if let Some(key) = &request.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if status.is_success() {
            info!("Upload of {} accepted with {}", request.filename, status);
            Ok(body)
        } else {
            Err(UploadError::Server {
                status: status.as_u16(),
                body,
            })
        }
    }
}
