use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Supported output formats. Anything else is rejected before the external
/// tool is ever spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Avif,
    Webp,
    Jpg,
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn parse(tag: &str) -> Result<Self, ConvertError> {
        match tag {
            "avif" => Ok(Self::Avif),
            "webp" => Ok(Self::Webp),
            "jpg" => Ok(Self::Jpg),
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(ConvertError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Avif => "avif",
            Self::Webp => "webp",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    fn extra_args(&self) -> &'static [&'static str] {
        match self {
            Self::Avif => &[
                "-define",
                "heic:speed=8",
                "-define",
                "heic:preserve-orientation=true",
            ],
            Self::Webp => &["-define", "webp:lossless=false", "-define", "webp:method=6"],
            Self::Jpg | Self::Jpeg => &[],
            Self::Png => &[
                "-define",
                "png:compression-level=9",
                "-define",
                "png:compression-strategy=2",
            ],
        }
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("conversion tool exited with {status}: {output}")]
    ToolFailed {
        status: std::process::ExitStatus,
        output: String,
    },

    #[error("failed to run conversion tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Invokes the external conversion tool. The tool is judged solely by its
/// exit status; on failure the combined stdout+stderr is carried verbatim
/// for operator diagnosis. Output bytes are never validated here.
pub struct Converter {
    command: String,
}

impl Converter {
    pub fn new(command: String) -> Self {
        Self { command }
    }

    pub fn build_args(input: &Path, output: &Path, format: ImageFormat) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![input.as_os_str().to_os_string()];
        for flag in ["-quality", "75", "-strip", "-auto-orient"] {
            args.push(flag.into());
        }
        for flag in format.extra_args() {
            args.push((*flag).into());
        }
        args.push(output.as_os_str().to_os_string());
        args
    }

    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: ImageFormat,
    ) -> Result<(), ConvertError> {
        let args = Self::build_args(input, output, format);
        debug!(
            "converting {} -> {} via {}",
            input.display(),
            output.display(),
            self.command
        );

        let result = Command::new(&self.command).args(&args).output().await?;

        if !result.status.success() {
            let mut combined = String::from_utf8_lossy(&result.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&result.stderr));
            return Err(ConvertError::ToolFailed {
                status: result.status,
                output: combined,
            });
        }

        Ok(())
    }
}
