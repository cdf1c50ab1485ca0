use anyhow::Context;
use std::env;

/// S3 delivery settings, all required when `DELIVERY_MODE=s3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

/// How converted images are returned to the caller. Selected once at
/// startup, never per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Stream the converted bytes back as an attachment.
    Inline,
    /// Upload to S3 and answer with the public object URL.
    S3(S3Config),
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Inline => "inline",
            DeliveryMode::S3(_) => "s3",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listening port (default: 8080)
    pub port: u16,

    /// Maximum upload size in bytes (default: 20 MB)
    pub max_upload_size: usize,

    /// External conversion tool invoked per request (default: "convert")
    pub convert_command: String,

    /// Result delivery mode (default: inline)
    pub delivery_mode: DeliveryMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_upload_size: 20 * 1024 * 1024, // 20 MB
            convert_command: "convert".to_string(),
            delivery_mode: DeliveryMode::Inline,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables. Missing S3 settings
    /// while `DELIVERY_MODE=s3` are a startup failure.
    pub fn from_env() -> anyhow::Result<Self> {
        let default = Self::default();

        let delivery_mode = match env::var("DELIVERY_MODE").as_deref() {
            Ok("s3") => DeliveryMode::S3(S3Config {
                access_key: env::var("AWS_ACCESS_KEY")
                    .context("AWS_ACCESS_KEY must be set when DELIVERY_MODE=s3")?,
                secret_key: env::var("AWS_SECRET_KEY")
                    .context("AWS_SECRET_KEY must be set when DELIVERY_MODE=s3")?,
                bucket: env::var("AWS_S3_BUCKET")
                    .context("AWS_S3_BUCKET must be set when DELIVERY_MODE=s3")?,
                region: env::var("AWS_REGION")
                    .context("AWS_REGION must be set when DELIVERY_MODE=s3")?,
            }),
            Ok("inline") | Err(_) => DeliveryMode::Inline,
            Ok(other) => anyhow::bail!("unknown DELIVERY_MODE: {other}"),
        };

        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            convert_command: env::var("CONVERT_COMMAND").unwrap_or(default.convert_command),

            delivery_mode,
        })
    }
}
