use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Newest image found across the photo directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoCandidate {
    pub path: PathBuf,
    pub filename: String,
    pub modified: SystemTime,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// MIME type sent for a photo part
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Scan `dirs` and return the image with the latest modification time.
///
/// Missing or unreadable directories are skipped.
pub async fn find_newest_photo(dirs: &[PathBuf]) -> Option<PhotoCandidate> {
    let mut newest: Option<PhotoCandidate> = None;

    for dir in dirs {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping photo directory {}: {}", dir.display(), e);
                continue;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_image_file(&path) {
                continue;
            }

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };

            if newest.as_ref().map_or(true, |n| modified > n.modified) {
                newest = Some(PhotoCandidate {
                    filename: entry.file_name().to_string_lossy().into_owned(),
                    path,
                    modified,
                });
            }
        }
    }

    newest
}
