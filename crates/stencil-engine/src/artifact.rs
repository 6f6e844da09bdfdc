//! On-disk compiled artifact format

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ast::Node;
use crate::error::{EngineError, Result};
use crate::plugins::PluginKind;

/// Bumped whenever the serialized layout changes
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format: u32,
    /// Template name relative to its template directory
    pub source: String,
    pub compile_id: String,
    /// Source modification time, seconds since the Unix epoch
    pub source_modified: u64,
    /// RFC 3339 timestamp in the configured UTC offset
    pub compiled_at: String,
    /// Plugins referenced by the template, sorted
    pub plugins: Vec<PluginRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginRef {
    pub kind: PluginKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub header: ArtifactHeader,
    pub nodes: Vec<Node>,
}

impl CompiledArtifact {
    /// Read a previously written artifact
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the artifact, creating parent directories.
    ///
    /// Data goes to a sibling temp file which is then renamed over `path`, so
    /// readers never observe a half-written artifact.
    pub fn write(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| EngineError::artifact(path, "artifact path has no parent directory"))?;
        std::fs::create_dir_all(parent).map_err(|e| EngineError::artifact(path, e))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::artifact(path, "artifact path has no file name"))?;
        let temp = parent.join(format!(".{file_name}.tmp"));

        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&temp, data).map_err(|e| EngineError::artifact(path, e))?;
        std::fs::rename(&temp, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            EngineError::artifact(path, e)
        })?;
        Ok(())
    }
}
