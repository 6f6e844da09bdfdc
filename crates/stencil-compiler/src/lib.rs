//! Stencil build step
//!
//! Precompiles templates into per-partner artifact caches. Templates are
//! selected by [`FileSet`] rules, each one is assigned a partner (either
//! every partner in turn, or the one named in its path), and the engine is
//! invoked only for artifacts that are missing or stale.

pub mod config;
pub mod engine;
pub mod error;
pub mod fileset;
pub mod orchestrator;
pub mod partner;

pub use config::{BuildConfig, Manifest, DEFAULT_MANIFEST};
pub use engine::{CompileEngine, EngineFactory, StencilEngineFactory};
pub use error::{BuildError, Result};
pub use fileset::{FileSelection, FileSet, SelectedFiles};
pub use orchestrator::{Counters, Orchestrator};
pub use partner::{CompileId, FsPartnerSource, IdentityStrategy, PartnerSet, PartnerSource, CORE_PARTNER};
