//! Multipart upload and file download on top of `ApiClient`.
//!
//! Both go through `ApiClient::execute`, so they get the same token
//! handling and refresh-and-resend as every other call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::request::{FormField, MultipartPayload, RequestDescriptor, UploadFile};
use super::{ApiClient, ApiError};

/// Temporary download target, removed on drop unless committed.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn create(destination: &Path) -> Result<Self, ApiError> {
        let file_name = destination
            .file_name()
            .ok_or_else(|| ApiError::File(format!("{} is not a file path", destination.display())))?;
        let path = destination.with_file_name(format!(".{}.part", file_name.to_string_lossy()));

        std::fs::File::create(&path)
            .map_err(|e| ApiError::File(format!("cannot create {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn write(&self, bytes: &[u8]) -> Result<(), ApiError> {
        std::fs::write(&self.path, bytes)
            .map_err(|e| ApiError::File(format!("cannot write {}: {}", self.path.display(), e)))
    }

    fn commit(mut self, destination: &Path) -> Result<(), ApiError> {
        std::fs::rename(&self.path, destination).map_err(|e| {
            ApiError::File(format!("cannot move download to {}: {}", destination.display(), e))
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial download");
            }
        }
    }
}

impl ApiClient {
    /// POST `file` plus flat form `fields` as multipart/form-data.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        file: UploadFile,
        fields: BTreeMap<String, FormField>,
    ) -> Result<T, ApiError> {
        debug!(endpoint, file = %file.file_name, size = file.bytes.len(), "Uploading file");
        let request = RequestDescriptor::post(endpoint).multipart(MultipartPayload { file, fields });
        self.execute_as(request).await
    }

    /// GET `endpoint` as raw bytes and save them at `destination`.
    ///
    /// Bytes land in a hidden `.part` file next to `destination` first; it is
    /// removed if anything fails and renamed into place otherwise.
    pub async fn download(&self, endpoint: &str, destination: &Path) -> Result<PathBuf, ApiError> {
        let partial = PartialFile::create(destination)?;

        let body = self
            .execute(RequestDescriptor::get(endpoint).expect_binary())
            .await?;
        let bytes = body.into_bytes();
        partial.write(&bytes)?;
        partial.commit(destination)?;

        debug!(endpoint, path = %destination.display(), size = bytes.len(), "Download saved");
        Ok(destination.to_path_buf())
    }
}
