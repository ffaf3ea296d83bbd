use super::client::{PhotoUploader, UploadRequest};
use super::listener::{UploadListener, NO_FILE};
use super::record::{UploadClaim, UploadRecord};
use super::scanner::find_newest_photo;
use crate::error::{ErrorExt, UploadError};
use crate::settings::UploadSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Smallest JPEG a decoder accepts: SOI, JFIF APP0, EOI
pub const MINIMAL_JPEG: [u8; 22] = [
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
    0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

const TEST_IMAGE_NAME: &str = "test_connection.jpg";

/// Outcome of asking the pipeline to upload
#[derive(Debug)]
pub enum UploadAttempt {
    /// Another upload is in flight; nothing happened
    Skipped,
    /// Refused before any network I/O; the listener has been told
    Rejected(UploadError),
    /// Submitted; the POST runs on its own task
    Submitted(UploadTask),
}

impl UploadAttempt {
    pub fn is_submitted(&self) -> bool {
        matches!(self, UploadAttempt::Submitted(_))
    }
}

/// Handle to a running upload
#[derive(Debug)]
pub struct UploadTask {
    filename: String,
    handle: JoinHandle<Result<String, UploadError>>,
}

impl UploadTask {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Wait for the POST to finish and return the response body
    pub async fn wait(self) -> Result<String, UploadError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(UploadError::Network(format!("upload task ended: {}", e))),
        }
    }
}

/// Uploads the newest not-yet-sent photo, at most one at a time
pub struct UploadPipeline {
    record: Arc<UploadRecord>,
    settings: UploadSettings,
    uploader: Arc<dyn PhotoUploader>,
    listener: Arc<dyn UploadListener>,
    photo_dirs: Vec<PathBuf>,
}

impl UploadPipeline {
    pub fn new(
        settings: UploadSettings,
        uploader: Arc<dyn PhotoUploader>,
        listener: Arc<dyn UploadListener>,
        photo_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            record: UploadRecord::new(),
            settings,
            uploader,
            listener,
            photo_dirs,
        }
    }

    /// Capture-complete notification or fallback timer fired
    pub async fn on_capture_complete(&self) -> UploadAttempt {
        let Some(claim) = self.record.try_claim() else {
            debug!("Upload already in progress; capture trigger ignored");
            return UploadAttempt::Skipped;
        };

        if !self.settings.is_endpoint_configured() {
            return self
                .reject(claim, NO_FILE, UploadError::NotConfigured)
                .await;
        }

        let Some(photo) = find_newest_photo(&self.photo_dirs).await else {
            return self.reject(claim, NO_FILE, UploadError::NoPhotoFound).await;
        };

        let last_upload = self.record.last_upload().unwrap_or(UNIX_EPOCH);
        if photo.modified <= last_upload {
            debug!(
                "Newest photo {} is not new (modified {:?}, last upload {:?})",
                photo.filename, photo.modified, last_upload
            );
            return self
                .reject(claim, &photo.filename, UploadError::NoNewPhoto)
                .await;
        }

        self.submit(claim, photo.path, photo.filename).await
    }

    /// Manual upload of a chosen file; skips the newest/dedup checks
    pub async fn upload_specific_photo(&self, path: &Path) -> UploadAttempt {
        let Some(claim) = self.record.try_claim() else {
            debug!("Upload already in progress; manual upload ignored");
            return UploadAttempt::Skipped;
        };

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| NO_FILE.to_string());

        if !self.settings.is_endpoint_configured() {
            return self
                .reject(claim, NO_FILE, UploadError::NotConfigured)
                .await;
        }

        let readable = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !readable {
            return self
                .reject(
                    claim,
                    &filename,
                    UploadError::FileUnreadable {
                        path: path.to_path_buf(),
                    },
                )
                .await;
        }

        self.submit(claim, path.to_path_buf(), filename).await
    }

    /// Post a tiny test image to `endpoint` without touching upload state
    pub async fn test_connection(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
    ) -> Result<String, UploadError> {
        let staging = tempfile::tempdir().map_err(|e| UploadError::Network(e.to_string()))?;
        let path = staging.path().join(TEST_IMAGE_NAME);
        tokio::fs::write(&path, MINIMAL_JPEG)
            .await
            .map_err(|_| UploadError::FileUnreadable { path: path.clone() })?;

        info!("Testing connection to {}", endpoint);
        let result = self
            .uploader
            .upload(UploadRequest {
                endpoint: endpoint.to_string(),
                api_key: api_key.map(str::to_string),
                path,
                filename: TEST_IMAGE_NAME.to_string(),
                timestamp_ms: now_ms(),
            })
            .await;

        match &result {
            Ok(_) => info!("Connection test to {} succeeded", endpoint),
            Err(e) => warn!("Connection test to {} failed: {}", endpoint, e),
        }
        result
    }

    pub fn last_upload_time(&self) -> Option<SystemTime> {
        self.record.last_upload()
    }

    pub fn is_uploading(&self) -> bool {
        self.record.is_uploading()
    }

    pub fn reset_last_upload_time(&self) {
        info!("Last upload time reset");
        self.record.reset();
    }

    async fn reject(&self, claim: UploadClaim, filename: &str, err: UploadError) -> UploadAttempt {
        // Release before the listener runs so it can trigger again
        drop(claim);
        warn!("Upload not started: {}", err);
        self.listener
            .on_upload_failed(filename, &err.user_message())
            .await;
        UploadAttempt::Rejected(err)
    }

    async fn submit(&self, claim: UploadClaim, path: PathBuf, filename: String) -> UploadAttempt {
        let request = UploadRequest {
            endpoint: self.settings.api_endpoint(),
            api_key: self.settings.api_key(),
            path,
            filename: filename.clone(),
            timestamp_ms: now_ms(),
        };

        info!(
            "Uploading {} to {} (attempt {})",
            filename,
            request.endpoint,
            claim.attempt()
        );
        self.listener.on_upload_started(&filename).await;
        self.listener
            .on_upload_progress(&filename, "Uploading...")
            .await;

        let uploader = Arc::clone(&self.uploader);
        let listener = Arc::clone(&self.listener);
        let task_filename = filename.clone();

        let handle = tokio::spawn(async move {
            let result = uploader.upload(request).await;
            match &result {
                Ok(body) => {
                    claim.finish(Some(SystemTime::now()));
                    info!("Upload SUCCESS: {}", task_filename);
                    listener
                        .on_upload_success(&task_filename, Some(body.as_str()))
                        .await;
                }
                Err(e) => {
                    claim.finish(None);
                    warn!("Upload FAILED: {} - {}", task_filename, e);
                    listener
                        .on_upload_failed(&task_filename, &e.user_message())
                        .await;
                }
            }
            result
        });

        UploadAttempt::Submitted(UploadTask { filename, handle })
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
