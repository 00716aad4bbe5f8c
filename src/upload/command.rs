//! Helper-program uploader.
//!
//! The reference [`Uploader`] implementation shells out to an external
//! program. Upload: the blob goes to the helper's standard input, the
//! MIME type and synthetic filename travel in the `DECK_UPLOAD_MIME` and
//! `DECK_UPLOAD_FILENAME` environment variables, and the helper prints
//! two lines on standard output: the public URL, then an opaque resource
//! id. Delete: the id goes in `DECK_DELETE_ID`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::UploadError;
use crate::model::image::Mime;

use super::Uploader;

/// Environment variable carrying the MIME type on upload.
pub const ENV_UPLOAD_MIME: &str = "DECK_UPLOAD_MIME";

/// Environment variable carrying the filename on upload.
pub const ENV_UPLOAD_FILENAME: &str = "DECK_UPLOAD_FILENAME";

/// Environment variable carrying the resource id on delete.
pub const ENV_DELETE_ID: &str = "DECK_DELETE_ID";

/// Uploader backed by an external helper program.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    program: PathBuf,
}

impl CommandUploader {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Uploader for CommandUploader {
    async fn upload(
        &self,
        bytes: Bytes,
        mime: Mime,
        filename: &str,
    ) -> Result<(String, String), UploadError> {
        let mut child = Command::new(&self.program)
            .env(ENV_UPLOAD_MIME, mime.as_str())
            .env(ENV_UPLOAD_FILENAME, filename)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| UploadError::Rejected {
                filename: filename.to_string(),
                reason: format!("failed to spawn {}: {e}", self.program.display()),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&bytes)
                .await
                .map_err(|e| UploadError::Rejected {
                    filename: filename.to_string(),
                    reason: format!("failed to write blob: {e}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| UploadError::Rejected {
                filename: filename.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(UploadError::Rejected {
                filename: filename.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        let url = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| UploadError::MalformedOutput("missing URL line".to_string()))?;
        let resource_id = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| UploadError::MalformedOutput("missing resource id line".to_string()))?;

        debug!(url, resource_id, "helper upload finished");
        Ok((url.to_string(), resource_id.to_string()))
    }

    async fn delete(&self, resource_id: &str) -> Result<(), UploadError> {
        let output = Command::new(&self.program)
            .env(ENV_DELETE_ID, resource_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| UploadError::Rejected {
                filename: String::new(),
                reason: format!("failed to spawn {}: {e}", self.program.display()),
            })?;

        if !output.status.success() {
            return Err(UploadError::Rejected {
                filename: String::new(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
