//! Build configuration.
//!
//! Settings come from an optional TOML manifest and are then overridden by
//! command-line flags. Nothing is validated here; the orchestrator checks the
//! required values before a run starts.
//!
//! ```toml
//! compile_dir = "build/templates_c"
//! plugin_dirs = ["lib/plugins"]
//! partners_dir = "partners"
//! expand_partners = true
//! utc_offset = "-05:00"
//!
//! [[fileset]]
//! dir = "templates"
//! include = ["**/*.tpl"]
//! exclude = ["legacy/**"]
//! ```

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use stencil_engine::EngineSettings;

use crate::error::{BuildError, Result};
use crate::fileset::FileSet;

/// Name of the manifest looked up in the working directory
pub const DEFAULT_MANIFEST: &str = "stencil.toml";

/// Settings for one build run
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Where compiled artifacts are written. Required.
    pub compile_dir: Option<PathBuf>,
    /// Extra plugin directories, searched in order
    pub plugin_dirs: Vec<PathBuf>,
    /// Directory whose entries name the partners. Required.
    pub partners_dir: Option<PathBuf>,
    /// Recompile every template even if its artifact is fresh
    pub force_compile: bool,
    /// Compile every template once per partner
    pub expand_partners: bool,
    /// Compare modification times when deciding staleness
    pub compile_check: bool,
    /// Offset for timestamps written into artifacts
    pub utc_offset: FixedOffset,
    /// Rule sets selecting the templates to compile. At least one is required.
    pub filesets: Vec<FileSet>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compile_dir: None,
            plugin_dirs: Vec::new(),
            partners_dir: None,
            force_compile: false,
            expand_partners: false,
            compile_check: true,
            utc_offset: Utc.fix(),
            filesets: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.compile_dir = Some(dir.into());
        self
    }

    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dirs.push(dir.into());
        self
    }

    pub fn partners_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.partners_dir = Some(dir.into());
        self
    }

    pub fn force_compile(mut self, force: bool) -> Self {
        self.force_compile = force;
        self
    }

    pub fn expand_partners(mut self, expand: bool) -> Self {
        self.expand_partners = expand;
        self
    }

    pub fn utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn fileset(mut self, fileset: FileSet) -> Self {
        self.filesets.push(fileset);
        self
    }

    /// Load a manifest file. Relative paths inside it are resolved against
    /// the manifest's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let manifest: Manifest = toml::from_str(&text).map_err(|source| BuildError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest(manifest, root)
    }

    pub fn from_manifest(manifest: Manifest, root: &Path) -> Result<Self> {
        let resolve = |p: PathBuf| if p.is_relative() { root.join(p) } else { p };

        let utc_offset = match manifest.utc_offset.as_deref() {
            Some(text) => parse_utc_offset(text)?,
            None => Utc.fix(),
        };

        Ok(Self {
            compile_dir: manifest.compile_dir.map(resolve),
            plugin_dirs: manifest.plugin_dirs.into_iter().map(resolve).collect(),
            partners_dir: manifest.partners_dir.map(resolve),
            force_compile: manifest.force_compile,
            expand_partners: manifest.expand_partners,
            compile_check: manifest.compile_check.unwrap_or(true),
            utc_offset,
            filesets: manifest.filesets.into_iter().map(|fs| fs.rebased(root)).collect(),
        })
    }

    /// Engine settings for a run writing to `compile_dir`
    pub fn engine_settings(&self, compile_dir: &Path) -> EngineSettings {
        let mut settings = EngineSettings::new(compile_dir)
            .use_sub_dirs(true)
            .force_compile(self.force_compile)
            .compile_check(self.compile_check)
            .utc_offset(self.utc_offset);
        for dir in &self.plugin_dirs {
            settings = settings.plugin_dir(dir);
        }
        settings
    }
}

/// On-disk form of [`BuildConfig`]
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub compile_dir: Option<PathBuf>,
    pub plugin_dirs: Vec<PathBuf>,
    pub partners_dir: Option<PathBuf>,
    pub force_compile: bool,
    pub expand_partners: bool,
    pub compile_check: Option<bool>,
    pub utc_offset: Option<String>,
    #[serde(rename = "fileset")]
    pub filesets: Vec<FileSet>,
}

/// Parse `Z`, `UTC`, `+HH`, `+HHMM` or `+HH:MM`
pub fn parse_utc_offset(text: &str) -> Result<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let invalid = || BuildError::config(format!("invalid UTC offset '{text}', expected +HH:MM"));
    let (sign, rest) = match text.chars().next() {
        Some('+') => (1, &text[1..]),
        Some('-') => (-1, &text[1..]),
        _ => return Err(invalid()),
    };

    let mut digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() == 2 {
        digits.push_str("00");
    }
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
