use crate::error::{FILE_TOO_LARGE_MESSAGE, UNSUPPORTED_TYPE_MESSAGE};
use crate::models::ALLOWED_UPLOAD_TYPES;
use crate::GatewayError;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// A client upload spooled to a temporary file for the duration of one
/// upload call. Dropping it removes the file, whichever way the call ends.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    writer: tokio::fs::File,
    file_name: String,
    content_type: String,
    size: u64,
    max_bytes: u64,
}

impl StagedUpload {
    pub fn create(
        dir: &Path,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        max_bytes: u64,
    ) -> Result<Self, GatewayError> {
        let content_type = content_type.into();
        ensure_allowed_type(&content_type)?;

        let file = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir)
            .map_err(|error| GatewayError::internal(format!("cannot stage upload: {error}")))?;
        let handle = file
            .as_file()
            .try_clone()
            .map_err(|error| GatewayError::internal(format!("cannot stage upload: {error}")))?;

        Ok(Self {
            file,
            writer: tokio::fs::File::from_std(handle),
            file_name: file_name.into(),
            content_type,
            size: 0,
            max_bytes,
        })
    }

    /// Appends a chunk, rejecting the upload once it crosses the size limit.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<(), GatewayError> {
        let next = self.size.saturating_add(bytes.len() as u64);
        if next > self.max_bytes {
            return Err(GatewayError::invalid_input(FILE_TOO_LARGE_MESSAGE));
        }
        self.writer
            .write_all(bytes)
            .await
            .map_err(|error| {
                GatewayError::internal(format!("cannot write staged upload: {error}"))
            })?;
        self.size = next;
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<(), GatewayError> {
        self.writer
            .flush()
            .await
            .map_err(|error| GatewayError::internal(format!("cannot flush staged upload: {error}")))
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, GatewayError> {
        tokio::fs::read(self.path())
            .await
            .map_err(|error| GatewayError::internal(format!("cannot read staged upload: {error}")))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

pub fn ensure_allowed_type(content_type: &str) -> Result<(), GatewayError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ALLOWED_UPLOAD_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(GatewayError::unsupported_type(UNSUPPORTED_TYPE_MESSAGE))
    }
}
