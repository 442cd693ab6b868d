//! Input loading: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium reads the document straight from memory, so unlike a path-based
//! pipeline nothing is staged on disk: local files are read, URLs are
//! downloaded, and both are checked for the `%PDF` magic before the
//! pipeline ever sees them.

use crate::error::AudiobookError;
use std::path::PathBuf;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local PDF or download one over HTTP(S).
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Vec<u8>, AudiobookError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AudiobookError::InvalidInput {
            input: input.to_string(),
        });
    }

    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };

    check_magic(&bytes, input)?;
    Ok(bytes)
}

/// Reject anything that does not start with `%PDF`.
pub fn check_magic(bytes: &[u8], source_name: &str) -> Result<(), AudiobookError> {
    if bytes.len() < PDF_MAGIC.len() || &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(AudiobookError::NotAPdf {
            source_name: source_name.to_string(),
            magic,
        });
    }
    Ok(())
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, AudiobookError> {
    let path = PathBuf::from(path_str);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(AudiobookError::PermissionDenied { path })
        }
        Err(_) => Err(AudiobookError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, AudiobookError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AudiobookError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            AudiobookError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AudiobookError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(AudiobookError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
