//! Renderer error types.

use thiserror::Error;

use crate::backend::DeviceError;
use crate::backend::ShaderStage;

/// Errors surfaced by the rendering core.
///
/// Recoverable content problems (unknown parameters, bad bucket keywords,
/// missing light shaders) are logged instead and never show up here.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("asset not found: {path}")]
    AssetNotFound { path: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid UTF-8 text")]
    InvalidText { path: String },
    #[error("failed to parse descriptor {path}: {source}")]
    Descriptor {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{effect}: {stage:?} shader missing")]
    MissingShaderStage { effect: String, stage: ShaderStage },
    #[error("cannot chain {effect}: {reason}")]
    IncompatibleEffect { effect: String, reason: String },
    #[error("invalid material {path}: {reason}")]
    InvalidMaterial { path: String, reason: String },
    #[error("pipeline reference does not name a live pipeline")]
    UnknownPipeline,
    #[error("material reference does not name a live material")]
    UnknownMaterial,
    #[error("graphics device error: {0}")]
    Device(#[from] DeviceError),
    #[error("invalid renderer configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;
