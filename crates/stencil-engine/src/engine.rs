//! The template engine: artifact naming, staleness checks and compilation

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{FixedOffset, Offset, Utc};
use sha2::{Digest, Sha256};

use crate::artifact::{ArtifactHeader, CompiledArtifact, FORMAT_VERSION, PluginRef};
use crate::ast::{self, Cond, Expr, Node, Param};
use crate::error::{EngineError, Result};
use crate::parser;
use crate::plugins::{PluginKind, PluginRegistry};

/// Settings fixed for the lifetime of an [`Engine`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Root directory for compiled artifacts
    pub compile_dir: PathBuf,
    /// Directories searched for plugin files, in order
    pub plugin_dirs: Vec<PathBuf>,
    /// Shard artifacts into hashed subdirectories instead of one flat directory
    pub use_sub_dirs: bool,
    /// Treat every artifact as stale
    pub force_compile: bool,
    /// Compare modification times; when off, any existing artifact is fresh
    pub compile_check: bool,
    /// Offset used to stamp `compiled_at` in artifact headers
    pub utc_offset: FixedOffset,
}

impl EngineSettings {
    pub fn new(compile_dir: impl Into<PathBuf>) -> Self {
        Self {
            compile_dir: compile_dir.into(),
            plugin_dirs: Vec::new(),
            use_sub_dirs: false,
            force_compile: false,
            compile_check: true,
            utc_offset: Utc.fix(),
        }
    }

    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dirs.push(dir.into());
        self
    }

    pub fn use_sub_dirs(mut self, enabled: bool) -> Self {
        self.use_sub_dirs = enabled;
        self
    }

    pub fn force_compile(mut self, force: bool) -> Self {
        self.force_compile = force;
        self
    }

    pub fn compile_check(mut self, check: bool) -> Self {
        self.compile_check = check;
        self
    }

    pub fn utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}

/// Compiles templates into artifacts under [`EngineSettings::compile_dir`].
///
/// Every operation takes the compile identity explicitly; the same template
/// compiled under two identities produces two independent artifacts.
pub struct Engine {
    settings: EngineSettings,
    plugins: PluginRegistry,
}

impl Engine {
    /// Create an engine, scanning the configured plugin directories
    pub fn new(settings: EngineSettings) -> Result<Self> {
        let mut plugins = PluginRegistry::builtin();
        for dir in &settings.plugin_dirs {
            plugins.scan_dir(dir)?;
        }
        Ok(Self { settings, plugins })
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Path of the artifact for template `name` under `compile_id`
    pub fn artifact_path(&self, name: &str, compile_id: &str) -> PathBuf {
        let name = name.replace('\\', "/");
        let hash = name_hash(&name);
        let base = name.rsplit('/').next().unwrap_or(name.as_str());
        let id = encode_compile_id(compile_id);

        if self.settings.use_sub_dirs {
            self.settings
                .compile_dir
                .join(id)
                .join(&hash[0..2])
                .join(&hash[2..4])
                .join(format!("{base}.{hash}.json"))
        } else {
            self.settings
                .compile_dir
                .join(format!("{id}%%{hash}%%{base}.json"))
        }
    }

    /// Whether `artifact` is an up-to-date compilation of `template_dir/name`
    pub fn is_compiled(&self, template_dir: &Path, name: &str, artifact: &Path) -> Result<bool> {
        if self.settings.force_compile {
            return Ok(false);
        }

        let artifact_meta = match std::fs::metadata(artifact) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if !self.settings.compile_check {
            return Ok(true);
        }

        let source_meta = match std::fs::metadata(template_dir.join(name)) {
            Ok(meta) => meta,
            // let compilation report the missing source
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        Ok(artifact_meta.modified()? >= source_meta.modified()?)
    }

    /// Compile `template_dir/name` and write the artifact to `artifact`
    pub fn compile_resource(
        &self,
        template_dir: &Path,
        name: &str,
        compile_id: &str,
        artifact: &Path,
    ) -> Result<()> {
        let source_path = template_dir.join(name);
        let source = match std::fs::read_to_string(&source_path) {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::SourceNotFound(source_path));
            }
            Err(e) => return Err(e.into()),
        };

        let source_modified = std::fs::metadata(&source_path)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let compiled = self.compile_source(name, compile_id, &source, source_modified)?;
        compiled.write(artifact)?;

        tracing::trace!("Wrote {}", artifact.display());
        Ok(())
    }

    /// Compile template text without touching the filesystem
    pub fn compile_source(
        &self,
        name: &str,
        compile_id: &str,
        source: &str,
        source_modified: u64,
    ) -> Result<CompiledArtifact> {
        let plugins = &self.plugins;
        let nodes = parser::parse(source, &|tag| plugins.is_block(tag))
            .map_err(|e| EngineError::syntax(name, e.line, e.message))?;

        let used = used_plugins(&nodes);
        if let Some(missing) = used.iter().find(|p| plugins.lookup(p.kind, &p.name).is_none()) {
            return Err(EngineError::UnknownPlugin {
                file: name.to_string(),
                kind: missing.kind,
                name: missing.name.clone(),
            });
        }

        Ok(CompiledArtifact {
            header: ArtifactHeader {
                format: FORMAT_VERSION,
                source: name.to_string(),
                compile_id: compile_id.to_string(),
                source_modified,
                compiled_at: Utc::now().with_timezone(&self.settings.utc_offset).to_rfc3339(),
                plugins: used.into_iter().collect(),
            },
            nodes,
        })
    }
}

/// First 16 hex digits of the SHA-256 of a template name
fn name_hash(name: &str) -> String {
    Sha256::digest(name.as_bytes())[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Make a compile identity safe to use as a single path component
fn encode_compile_id(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn used_plugins(nodes: &[Node]) -> BTreeSet<PluginRef> {
    let mut used = BTreeSet::new();
    collect_nodes(nodes, &mut used);
    used
}

fn collect_nodes(nodes: &[Node], used: &mut BTreeSet<PluginRef>) {
    for node in nodes {
        match node {
            Node::Text { .. } => {}
            Node::Output { expr } | Node::Assign { value: expr, .. } => collect_expr(expr, used),
            Node::If { branches, otherwise } => {
                for branch in branches {
                    collect_cond(&branch.cond, used);
                    collect_nodes(&branch.body, used);
                }
                if let Some(otherwise) = otherwise {
                    collect_nodes(otherwise, used);
                }
            }
            Node::Foreach { from, body, empty, .. } => {
                collect_expr(from, used);
                collect_nodes(body, used);
                if let Some(empty) = empty {
                    collect_nodes(empty, used);
                }
            }
            Node::Include { file, params } => {
                collect_expr(file, used);
                collect_params(params, used);
            }
            Node::Call { name, params } => {
                used.insert(PluginRef { kind: PluginKind::Function, name: name.clone() });
                collect_params(params, used);
            }
            Node::Block { name, params, body } => {
                used.insert(PluginRef { kind: PluginKind::Block, name: name.clone() });
                collect_params(params, used);
                collect_nodes(body, used);
            }
        }
    }
}

fn collect_params(params: &[Param], used: &mut BTreeSet<PluginRef>) {
    for param in params {
        collect_expr(&param.value, used);
    }
}

fn collect_cond(cond: &Cond, used: &mut BTreeSet<PluginRef>) {
    match cond {
        Cond::Truthy(expr) => collect_expr(expr, used),
        Cond::Not(inner) => collect_cond(inner, used),
        Cond::Compare { lhs, rhs, .. } => {
            collect_expr(lhs, used);
            collect_expr(rhs, used);
        }
        Cond::And(a, b) | Cond::Or(a, b) => {
            collect_cond(a, used);
            collect_cond(b, used);
        }
    }
}

fn collect_expr(expr: &Expr, used: &mut BTreeSet<PluginRef>) {
    ast::visit_modifiers(expr, &mut |name| {
        used.insert(PluginRef { kind: PluginKind::Modifier, name: name.to_string() });
    });
}
