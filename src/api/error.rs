use crate::services::converter::ConvertError;
use crate::services::publisher::PublishError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Error processing image: {0}")]
    Conversion(#[from] ConvertError),

    #[error("Error publishing result: {0}")]
    Publish(#[from] PublishError),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // 5xx messages are passed through deliberately: conversion and
        // storage diagnostics are the operator's only window into the
        // external tool and the upload path.
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conversion(e) => {
                tracing::error!("Conversion error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error processing image: {e}"),
                )
            }
            AppError::Publish(e) => {
                tracing::error!("Publish error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error publishing result: {e}"),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
