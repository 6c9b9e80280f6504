//! `scanlab analyze`: run the pipeline against a local file.

use std::path::Path;

use anyhow::anyhow;
use scanlab_config::ScanlabConfig;
use scanlab_pipeline::{Pipeline, PipelineResponse, UploadRequest};

use crate::cli::AnalyzeArgs;
use crate::error::{CliError, CliResult};
use crate::output::render_json;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub(crate) async fn handle_analyze(config: &ScanlabConfig, args: AnalyzeArgs) -> CliResult<()> {
    let upload = read_upload(&args.file, args.content_type).await?;
    let response = Pipeline::from_config(config).run(upload).await;
    render_json(&response.body())?;
    outcome(&response)
}

pub(crate) async fn read_upload(
    file: &Path,
    content_type: Option<String>,
) -> CliResult<UploadRequest> {
    let bytes = tokio::fs::read(file).await.map_err(|err| {
        CliError::failure(anyhow!("failed to read {}: {err}", file.display()))
    })?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            CliError::validation(format!("{} has no usable file name", file.display()))
        })?;
    let content_type = content_type.unwrap_or_else(|| content_type_for(file).to_string());
    Ok(UploadRequest::new(filename, content_type, bytes))
}

pub(crate) fn content_type_for(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("dcm") => "application/dicom",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

pub(crate) fn outcome(response: &PipelineResponse) -> CliResult<()> {
    match response {
        PipelineResponse::Ok(_) => Ok(()),
        PipelineResponse::Error { kind, message, .. } if kind.is_validation() => {
            Err(CliError::validation(message.clone()))
        }
        PipelineResponse::Error { kind, message, .. } => Err(CliError::failure(anyhow!(
            "{message} ({})",
            kind.as_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use scanlab_pipeline::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for(Path::new("scan.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("a/b/chest.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("head.dcm")), "application/dicom");
        assert_eq!(content_type_for(Path::new("notes")), FALLBACK_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn read_upload_uses_the_bare_file_name() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("brain.png");
        std::fs::write(&path, b"\x89PNG")?;
        let upload = read_upload(&path, None)
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(upload.filename.as_deref(), Some("brain.png"));
        assert_eq!(upload.content_type.as_deref(), Some("image/png"));
        assert_eq!(upload.bytes, b"\x89PNG");

        let overridden = read_upload(&path, Some("application/dicom".to_string()))
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(overridden.content_type.as_deref(), Some("application/dicom"));
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_file_is_a_failure() {
        let missing = read_upload(Path::new("/definitely/not/here.png"), None).await;
        assert!(matches!(missing, Err(CliError::Failure(_))));
    }

    #[test]
    fn outcome_maps_error_kinds_to_exit_codes() {
        let rejected = PipelineResponse::Error {
            kind: ErrorKind::TooLarge,
            message: "File too large. Maximum size is 50 MB".to_string(),
            http_status: 400,
        };
        assert_eq!(outcome(&rejected).err().as_ref().map(CliError::exit_code), Some(2));

        let failed = PipelineResponse::Error {
            kind: ErrorKind::Timeout,
            message: "Image processing timed out".to_string(),
            http_status: 500,
        };
        assert_eq!(outcome(&failed).err().as_ref().map(CliError::exit_code), Some(3));
    }
}
