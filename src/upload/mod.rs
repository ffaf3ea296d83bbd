//! Photo auto-upload pipeline.
//!
//! A capture trigger scans the photo directories for the newest image and
//! posts it to the configured backend unless it was already sent. At most one
//! upload is in flight at a time; failures leave the photo eligible again.

pub mod client;
pub mod listener;
pub mod pipeline;
pub mod record;
pub mod scanner;


pub use client::{HttpPhotoUploader, PhotoUploader, UploadRequest};
pub use listener::{EventBusUploadListener, UploadListener, NO_FILE};
pub use pipeline::{UploadAttempt, UploadPipeline, UploadTask, MINIMAL_JPEG};
pub use record::{UploadClaim, UploadRecord};
pub use scanner::{find_newest_photo, is_image_file, PhotoCandidate};
