//! Error types for the template engine

use std::path::PathBuf;
use thiserror::Error;

use crate::plugins::PluginKind;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error in {file} at line {line}: {message}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Unknown {kind} plugin '{name}' used in {file}")]
    UnknownPlugin {
        file: String,
        kind: PluginKind,
        name: String,
    },

    #[error("Template source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Cannot write compiled artifact {path}: {message}")]
    Artifact { path: PathBuf, message: String },

    #[error("Artifact serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EngineError {
    pub fn syntax(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        EngineError::Syntax {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        EngineError::Artifact {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
