//! Stencil template engine
//!
//! Compiles Smarty-style templates into JSON artifacts stored under a compile
//! directory. Artifacts are keyed by template name and compile identity, so a
//! single source file can be compiled once per partner without collisions.

pub mod artifact;
pub mod ast;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod plugins;

pub use artifact::{ArtifactHeader, CompiledArtifact, PluginRef, FORMAT_VERSION};
pub use engine::{Engine, EngineSettings};
pub use error::{EngineError, Result};
pub use plugins::{PluginKind, PluginOrigin, PluginRegistry};
