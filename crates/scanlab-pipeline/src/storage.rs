//! Persistence of accepted uploads.
//!
//! # Design
//! - Stored names are generated, never taken from the client: a UTC timestamp
//!   plus a random suffix, keeping only the validated extension.
//! - Files are opened with `create_new`, so two runs can never share a path.
//! - A partially written file is removed before the error is returned.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use scanlab_config::{RetentionPolicy, StorageConfig};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::intake::AcceptedUpload;
use crate::model::StoredFile;

const NAME_PREFIX: &str = "scan";
const SUFFIX_LEN: usize = 10;
const MAX_NAME_ATTEMPTS: usize = 3;

/// Places uploads under a single working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePlacement {
    root: PathBuf,
}

/// Proof that a stored file was readable at the time of the check.
///
/// Only [`StoragePlacement::verify_readable`] builds one, so an invocation
/// assembled from it always points at a file that exists.
#[derive(Debug)]
pub struct ReadableFile<'a> {
    stored: &'a StoredFile,
}

impl ReadableFile<'_> {
    /// Absolute path of the verified file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.stored.path
    }
}

impl StoragePlacement {
    /// Placement rooted at `root`; the directory is created on first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Placement described by the storage configuration section.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.upload_dir.clone())
    }

    /// Write the upload bytes under a fresh, collision-resistant name.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the directory cannot be prepared or the file
    /// cannot be fully written and flushed.
    pub async fn place(
        &self,
        upload: &AcceptedUpload,
        bytes: &[u8],
    ) -> PipelineResult<StoredFile> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| PipelineError::storage("create_dir", self.root.clone(), source))?;
        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|source| PipelineError::storage("canonicalize", self.root.clone(), source))?;

        let extension = &upload.declared.extension;
        let mut attempt = 0;
        let (path, mut file) = loop {
            attempt += 1;
            let path = root.join(generate_name(extension));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => break (path, file),
                Err(err)
                    if err.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS =>
                {
                    debug!(path = %path.display(), "stored name collided; regenerating");
                }
                Err(source) => return Err(PipelineError::storage("open", path, source)),
            }
        };

        let written = async {
            file.write_all(bytes).await.map_err(|err| ("write", err))?;
            file.sync_all().await.map_err(|err| ("sync", err))
        }
        .await;

        if let Err((operation, source)) = written {
            drop(file);
            remove_quietly(&path).await;
            return Err(PipelineError::storage(operation, path, source));
        }

        debug!(
            path = %path.display(),
            size_bytes = upload.size_bytes,
            "stored upload"
        );
        Ok(StoredFile {
            path,
            original_name: upload.declared.original_name.clone(),
            size_bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            extension: extension.clone(),
        })
    }

    /// Confirm the stored file still exists and can be opened for reading.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the path is missing, unreadable, or not a regular file.
    pub async fn verify_readable<'a>(
        &self,
        stored: &'a StoredFile,
    ) -> PipelineResult<ReadableFile<'a>> {
        let file = fs::File::open(&stored.path)
            .await
            .map_err(|source| PipelineError::storage("verify_open", stored.path.clone(), source))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|source| {
                PipelineError::storage("verify_metadata", stored.path.clone(), source)
            })?;
        if !metadata.is_file() {
            return Err(PipelineError::storage(
                "verify_kind",
                stored.path.clone(),
                io::Error::new(io::ErrorKind::InvalidInput, "stored path is not a regular file"),
            ));
        }
        Ok(ReadableFile { stored })
    }

    /// Apply the retention policy once the response has been produced.
    pub async fn release(&self, stored: &StoredFile, retention: RetentionPolicy) {
        match retention {
            RetentionPolicy::Delete => remove_quietly(&stored.path).await,
            RetentionPolicy::Retain => {
                debug!(path = %stored.path.display(), "retaining stored upload");
            }
        }
    }
}

fn generate_name(extension: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect();
    format!("{NAME_PREFIX}-{timestamp}-{suffix}.{extension}")
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed stored upload"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove stored upload"),
    }
}
