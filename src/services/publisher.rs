use crate::services::converter::ImageFormat;
use crate::services::storage::ObjectStorage;
use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to read converted output: {0}")]
    ReadOutput(#[from] std::io::Error),

    #[error("storage upload failed: {0}")]
    Upload(anyhow::Error),
}

/// Delivers a converted file to the caller. The mode is fixed at startup:
/// either the bytes go straight back as an attachment, or they are uploaded
/// to object storage and the public URL is returned instead.
pub enum Publisher {
    Inline,
    Storage {
        storage: Arc<dyn ObjectStorage>,
        bucket: String,
        region: String,
    },
}

impl Publisher {
    pub fn inline() -> Self {
        Publisher::Inline
    }

    pub fn storage(storage: Arc<dyn ObjectStorage>, bucket: String, region: String) -> Self {
        Publisher::Storage {
            storage,
            bucket,
            region,
        }
    }

    /// Publish the converted file at `output`. `original_filename` supplies
    /// the extension for storage object keys.
    pub async fn publish(
        &self,
        output: &Path,
        format: ImageFormat,
        original_filename: &str,
    ) -> Result<Response, PublishError> {
        let data = tokio::fs::read(output).await?;

        match self {
            Publisher::Inline => {
                let attachment = output
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("converted");
                let headers = [
                    (header::CONTENT_TYPE, format!("image/{}", format.tag())),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{attachment}\""),
                    ),
                ];
                Ok((headers, data).into_response())
            }
            Publisher::Storage {
                storage,
                bucket,
                region,
            } => {
                let key = object_key(original_filename);
                storage
                    .put_object(&key, data)
                    .await
                    .map_err(PublishError::Upload)?;
                let url = format!("https://{bucket}.s3.{region}.amazonaws.com/{key}");
                info!("📤 Uploaded converted image as {}", key);
                Ok((
                    [(header::CONTENT_TYPE, "text/plain".to_string())],
                    url,
                )
                    .into_response())
            }
        }
    }
}

/// Fresh random object key carrying the original upload's extension.
fn object_key(original_filename: &str) -> String {
    let id = Uuid::new_v4();
    match Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}
