use crate::AppState;
use crate::api::error::AppError;
use crate::services::converter::ImageFormat;
use crate::services::workspace::StagedFile;
use crate::utils::validation::sanitize_filename;
use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    response::Response,
};
use serde::Deserialize;
use std::path::Path;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConvertParams {
    /// Target output format (avif, webp, jpg, jpeg, png). Defaults to avif.
    format: Option<String>,
}

#[utoipa::path(
    post,
    path = "/convert",
    params(ConvertParams),
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Multipart form with an `image` file field"
    ),
    responses(
        (status = 200, description = "Converted image bytes or storage URL"),
        (status = 400, description = "Malformed multipart body or missing image field"),
        (status = 500, description = "Conversion or publish failure")
    ),
    tag = "convert"
)]
pub async fn convert_image(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to parse multipart form: {e}")))?
    {
        if field.name().unwrap_or_default() != "image" {
            continue;
        }

        // A part without a filename is not a file upload.
        let Some(original) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let filename =
            sanitize_filename(&original).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read image field: {e}")))?;

        upload = Some((filename, data));
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("missing image file field".to_string()))?;

    if data.len() > state.config.max_upload_size {
        return Err(AppError::BadRequest(format!(
            "image exceeds maximum upload size of {} bytes",
            state.config.max_upload_size
        )));
    }

    let tag = params.format.unwrap_or_else(|| "avif".to_string());
    let format = ImageFormat::parse(&tag)?;
    let output_name = staged_output_name(&filename, format);

    let input = StagedFile::new(
        state
            .workspace
            .staging_path(&filename)
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
    );
    let output = StagedFile::new(
        state
            .workspace
            .staging_path(&output_name)
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
    );

    // Save and convert under the gate; publishing happens outside it.
    {
        let _permit = state.workspace.acquire_conversion_permit().await;

        tokio::fs::write(input.path(), &data)
            .await
            .map_err(|e| AppError::Internal(format!("failed to stage upload: {e}")))?;

        state
            .converter
            .convert(input.path(), output.path(), format)
            .await?;
    }

    let response = state
        .publisher
        .publish(output.path(), format, &filename)
        .await?;

    // Both staged files are removed when the guards drop, on every path.
    Ok(response)
}

/// Output name is the input stem with the extension swapped to the target
/// format. When the upload already carries that extension, the output gets a
/// prefix so the two staged paths stay distinct.
fn staged_output_name(input_name: &str, format: ImageFormat) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(input_name);
    let candidate = format!("{stem}.{}", format.tag());
    if candidate == input_name {
        format!("converted-{candidate}")
    } else {
        candidate
    }
}
