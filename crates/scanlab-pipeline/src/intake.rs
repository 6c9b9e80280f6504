//! Upload intake checks.
//!
//! # Design
//! - Checks run in a fixed order: presence, extension, content type, size.
//! - Declared metadata can be checked on its own so transports can reject an
//!   upload before reading its body.
//! - Nothing here touches the filesystem.

use scanlab_config::IntakeConfig;

use crate::error::{PipelineError, PipelineResult, ValidationReason};
use crate::model::UploadRequest;

/// Allow-lists and size limit enforced at intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakePolicy {
    max_bytes: u64,
    extensions: Vec<String>,
    content_types: Vec<String>,
}

/// Declared metadata that passed the type checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredUpload {
    /// Final path component of the declared filename.
    pub original_name: String,
    /// Lower-cased extension without the dot.
    pub extension: String,
}

/// Upload that passed every intake check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
    /// Validated declared metadata.
    pub declared: DeclaredUpload,
    /// Size of the upload body.
    pub size_bytes: u64,
}

impl IntakePolicy {
    /// Build a policy from explicit limits. Entries are normalised to lower case.
    #[must_use]
    pub fn new<E, C>(max_bytes: u64, extensions: E, content_types: C) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            max_bytes,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            content_types: content_types
                .into_iter()
                .map(|ct| ct.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Build a policy from the intake configuration section.
    #[must_use]
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self::new(
            config.max_upload_bytes,
            &config.allowed_extensions,
            &config.allowed_content_types,
        )
    }

    /// Largest accepted upload in bytes.
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check the declared filename and content type.
    ///
    /// # Errors
    ///
    /// Returns `NoFile` when the filename is missing or blank and `BadType`
    /// when the extension or the content type is not allowed.
    pub fn check_declared(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> PipelineResult<DeclaredUpload> {
        let original_name = filename
            .map(final_component)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PipelineError::validation(ValidationReason::NoFile))?;

        let extension = extension_of(original_name);
        if !extension
            .as_deref()
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
        {
            return Err(self.bad_type("extension", extension));
        }

        let essence = content_type.map(media_type_essence);
        if !essence
            .as_deref()
            .is_some_and(|ct| self.content_types.iter().any(|allowed| allowed == ct))
        {
            return Err(self.bad_type("content_type", essence));
        }

        Ok(DeclaredUpload {
            original_name: original_name.to_string(),
            extension: extension.unwrap_or_default(),
        })
    }

    /// Check a byte count against the size limit.
    ///
    /// # Errors
    ///
    /// Returns `TooLarge` when `received_bytes` exceeds the limit.
    pub const fn check_size(&self, received_bytes: u64) -> PipelineResult<()> {
        if received_bytes > self.max_bytes {
            return Err(PipelineError::validation(ValidationReason::TooLarge {
                received_bytes,
                limit_bytes: self.max_bytes,
            }));
        }
        Ok(())
    }

    /// Run every intake check against a complete upload.
    ///
    /// # Errors
    ///
    /// Returns the first failing check. An empty body counts as no file.
    pub fn validate(&self, upload: &UploadRequest) -> PipelineResult<AcceptedUpload> {
        let declared =
            self.check_declared(upload.filename.as_deref(), upload.content_type.as_deref())?;
        if upload.bytes.is_empty() {
            return Err(PipelineError::validation(ValidationReason::NoFile));
        }
        let size_bytes = u64::try_from(upload.bytes.len()).unwrap_or(u64::MAX);
        self.check_size(size_bytes)?;
        Ok(AcceptedUpload {
            declared,
            size_bytes,
        })
    }

    fn bad_type(&self, field: &'static str, value: Option<String>) -> PipelineError {
        PipelineError::validation(ValidationReason::BadType {
            field,
            value,
            allowed_extensions: self.extensions.clone(),
        })
    }
}

/// Strip any client-supplied directories, accepting both separators.
fn final_component(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name).trim()
}

fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
