//! Compiler runtime contract
//!
//! A runtime exposes up to two calling conventions, matching the two Sass
//! compiler APIs. [`SassRuntime::render`] takes the legacy option shape
//! (include paths, callback importers); [`SassRuntime::compile`] takes the
//! modern one (load paths, URL importers). A runtime may implement only one;
//! the other reports [`CompileError::Unsupported`].

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{ApiMode, OutputStyle};
use crate::importer::{FileImporter, LegacyImporter};
use std::sync::Arc;

mod native;

pub use native::GrassRuntime;

/// Errors reported by a compiler runtime
#[derive(Debug, Error)]
pub enum CompileError {
    /// The stylesheet failed to compile
    #[error("{0}")]
    Sass(String),

    /// An importer failed while resolving an import
    #[error("importer failed while resolving \"{url}\": {source}")]
    Importer {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// The runtime does not implement the requested API
    #[error("sass runtime `{runtime}` does not support the {api} API")]
    Unsupported { runtime: String, api: ApiMode },

    /// The compile task could not be driven to completion
    #[error("sass compile task failed: {0}")]
    Task(String),
}

/// Options of the legacy `render` call
#[derive(Debug, Clone)]
pub struct LegacyRenderOptions {
    /// Path of the stylesheet, used for relative imports and error messages
    pub file: PathBuf,
    /// Stylesheet source (already prefixed with any global data)
    pub data: String,
    pub indented_syntax: bool,
    pub include_paths: Vec<PathBuf>,
    pub importer: Vec<Arc<dyn LegacyImporter>>,
    pub output_style: OutputStyle,
    pub source_map: bool,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of the legacy `render` call
#[derive(Debug, Clone, Default)]
pub struct LegacyRenderResult {
    pub css: String,
    pub map: Option<String>,
    /// Every file read while compiling, entry included
    pub included_files: Vec<PathBuf>,
}

/// Stylesheet syntax for the modern `compile` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Syntax {
    #[default]
    Scss,
    /// Whitespace-significant syntax
    Indented,
    Css,
}

/// Options of the modern `compile` call
#[derive(Debug, Clone)]
pub struct ModernCompileOptions {
    /// URL (path) of the stylesheet
    pub url: PathBuf,
    pub source: String,
    pub syntax: Syntax,
    pub load_paths: Vec<PathBuf>,
    pub importers: Vec<Arc<dyn FileImporter>>,
    pub style: OutputStyle,
    pub source_map: bool,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of the modern `compile` call
#[derive(Debug, Clone, Default)]
pub struct ModernCompileResult {
    pub css: String,
    pub source_map: Option<String>,
    /// Every stylesheet loaded while compiling, entry included
    pub loaded_urls: Vec<PathBuf>,
}

/// A Sass compiler implementation
#[async_trait]
pub trait SassRuntime: Send + Sync + Debug {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Legacy API
    async fn render(&self, options: LegacyRenderOptions) -> Result<LegacyRenderResult, CompileError> {
        let _ = options;
        Err(CompileError::Unsupported {
            runtime: self.name().to_string(),
            api: ApiMode::Legacy,
        })
    }

    /// Modern API
    async fn compile(&self, options: ModernCompileOptions) -> Result<ModernCompileResult, CompileError> {
        let _ = options;
        Err(CompileError::Unsupported {
            runtime: self.name().to_string(),
            api: ApiMode::Modern,
        })
    }
}
