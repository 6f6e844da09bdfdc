//! Boundary between the build step and the template engine

use std::path::{Path, PathBuf};

use stencil_engine::{Engine, EngineSettings};

use crate::partner::CompileId;

/// Operations the build step needs from a template engine.
///
/// The compile identity is passed to every call; engines keep no notion of
/// a "current" partner.
pub trait CompileEngine {
    /// Where the artifact for `name` compiled under `id` lives
    fn artifact_path(&self, name: &str, id: &CompileId) -> PathBuf;

    /// True when `artifact` exists and is newer than the template source
    fn is_up_to_date(&self, template_dir: &Path, name: &str, artifact: &Path) -> stencil_engine::Result<bool>;

    /// Compile `template_dir/name` into `artifact`
    fn compile(&mut self, template_dir: &Path, name: &str, id: &CompileId, artifact: &Path) -> stencil_engine::Result<()>;
}

/// Builds the engine for a single run
pub trait EngineFactory {
    type Engine: CompileEngine;

    fn create(&self, settings: EngineSettings) -> stencil_engine::Result<Self::Engine>;
}

impl CompileEngine for Engine {
    fn artifact_path(&self, name: &str, id: &CompileId) -> PathBuf {
        Engine::artifact_path(self, name, id.as_str())
    }

    fn is_up_to_date(&self, template_dir: &Path, name: &str, artifact: &Path) -> stencil_engine::Result<bool> {
        self.is_compiled(template_dir, name, artifact)
    }

    fn compile(&mut self, template_dir: &Path, name: &str, id: &CompileId, artifact: &Path) -> stencil_engine::Result<()> {
        self.compile_resource(template_dir, name, id.as_str(), artifact)
    }
}

/// Creates the stock [`Engine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StencilEngineFactory;

impl EngineFactory for StencilEngineFactory {
    type Engine = Engine;

    fn create(&self, settings: EngineSettings) -> stencil_engine::Result<Engine> {
        Engine::new(settings)
    }
}

impl<F, E> EngineFactory for F
where
    F: Fn(EngineSettings) -> stencil_engine::Result<E>,
    E: CompileEngine,
{
    type Engine = E;

    fn create(&self, settings: EngineSettings) -> stencil_engine::Result<E> {
        self(settings)
    }
}
