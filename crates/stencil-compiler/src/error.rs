//! Error types for the build step

use std::path::PathBuf;
use stencil_engine::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Error creating compile directory {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot list partners in {path}: {source}")]
    PartnerListing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("File selection failed in {dir}: {message}")]
    Selection { dir: PathBuf, message: String },

    #[error("No partner found in path '{file}' (expected .../partners/<name>/...)")]
    Unresolved { file: String },

    #[error("Cannot initialize template engine: {0}")]
    EngineSetup(#[source] EngineError),

    #[error("Failed to compile {file} for partner '{partner}': {source}")]
    Engine {
        file: String,
        partner: String,
        source: EngineError,
    },

    #[error("Invalid build manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn config(message: impl Into<String>) -> Self {
        BuildError::Config(message.into())
    }

    pub fn selection(dir: impl Into<PathBuf>, message: impl ToString) -> Self {
        BuildError::Selection {
            dir: dir.into(),
            message: message.to_string(),
        }
    }

    pub fn engine(file: impl Into<String>, partner: impl ToString, source: EngineError) -> Self {
        BuildError::Engine {
            file: file.into(),
            partner: partner.to_string(),
            source,
        }
    }
}
