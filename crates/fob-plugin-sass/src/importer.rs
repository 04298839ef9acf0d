//! Import resolution strategies handed to the Sass compiler
//!
//! Two incompatible importer shapes exist, mirroring the two compiler APIs:
//!
//! - [`LegacyImporter`]: asynchronous, may return a file or inline contents, and
//!   may decline (`Ok(None)`) so the next importer is consulted.
//! - [`FileImporter`]: the modern shape, a pure URL rewrite from an import
//!   specifier to a file on disk.
//!
//! Every chain starts with the built-in [`NodeModuleImporter`], which resolves
//! `~package/path` specifiers through node_modules lookup. User importers follow
//! in configuration order.

use async_trait::async_trait;
use oxc_resolver::{ResolveOptions, Resolver};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use crate::config::ApiMode;

/// Result of a legacy importer that accepted an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyImport {
    /// Load the stylesheet from this path
    File(PathBuf),
    /// Use these contents as the stylesheet
    Contents { contents: String, indented: bool },
}

/// Callback-style importer of the legacy compiler API
#[async_trait]
pub trait LegacyImporter: Send + Sync + Debug {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Resolve `url` imported from `prev`, or return `Ok(None)` to decline
    async fn import(&self, url: &str, prev: &Path) -> anyhow::Result<Option<LegacyImport>>;
}

/// URL-rewrite importer of the modern compiler API
pub trait FileImporter: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Map `url` to a file on disk, or return `Ok(None)` to decline
    fn find_file_url(&self, url: &str, containing: Option<&Path>) -> anyhow::Result<Option<PathBuf>>;
}

/// A user-supplied importer tagged with the API shape it implements
#[derive(Debug, Clone)]
pub enum Importer {
    Legacy(Arc<dyn LegacyImporter>),
    Modern(Arc<dyn FileImporter>),
}

impl Importer {
    pub fn api(&self) -> ApiMode {
        match self {
            Importer::Legacy(_) => ApiMode::Legacy,
            Importer::Modern(_) => ApiMode::Modern,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Importer::Legacy(importer) => importer.name(),
            Importer::Modern(importer) => importer.name(),
        }
    }
}

/// Ordered importer chain of one API shape
#[derive(Debug, Clone)]
pub enum ImporterChain {
    Legacy(Vec<Arc<dyn LegacyImporter>>),
    Modern(Vec<Arc<dyn FileImporter>>),
}

/// What the chain decided for a single specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nobody claimed the specifier, the compiler resolves it unchanged
    Unchanged,
    File(PathBuf),
    Contents { contents: String, indented: bool },
}

impl ImporterChain {
    pub fn len(&self) -> usize {
        match self {
            ImporterChain::Legacy(importers) => importers.len(),
            ImporterChain::Modern(importers) => importers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk the chain for one specifier.
    ///
    /// Legacy importers are awaited one after another; the next importer only
    /// runs once the previous one has declined.
    pub async fn resolve(&self, url: &str, prev: &Path) -> anyhow::Result<Resolution> {
        if !is_importable(url) {
            return Ok(Resolution::Unchanged);
        }

        match self {
            ImporterChain::Legacy(importers) => {
                for importer in importers {
                    if let Some(import) = importer.import(url, prev).await? {
                        trace!(importer = importer.name(), url, "import resolved");
                        return Ok(match import {
                            LegacyImport::File(path) => Resolution::File(path),
                            LegacyImport::Contents { contents, indented } => {
                                Resolution::Contents { contents, indented }
                            }
                        });
                    }
                }
                Ok(Resolution::Unchanged)
            }
            ImporterChain::Modern(importers) => self.resolve_modern(importers, url, prev),
        }
    }

    /// Synchronous walk, used where the compiler calls back without an async context.
    ///
    /// Legacy importers are driven to completion on `handle`.
    pub fn resolve_blocking(
        &self,
        handle: &tokio::runtime::Handle,
        url: &str,
        prev: &Path,
    ) -> anyhow::Result<Resolution> {
        match self {
            ImporterChain::Legacy(_) => handle.block_on(self.resolve(url, prev)),
            ImporterChain::Modern(importers) => {
                if !is_importable(url) {
                    return Ok(Resolution::Unchanged);
                }
                self.resolve_modern(importers, url, prev)
            }
        }
    }

    fn resolve_modern(
        &self,
        importers: &[Arc<dyn FileImporter>],
        url: &str,
        prev: &Path,
    ) -> anyhow::Result<Resolution> {
        for importer in importers {
            if let Some(path) = importer.find_file_url(url, Some(prev))? {
                trace!(importer = importer.name(), url, "import resolved");
                return Ok(Resolution::File(path));
            }
        }
        Ok(Resolution::Unchanged)
    }
}

/// Specifiers that are never offered to importers
fn is_importable(url: &str) -> bool {
    !(url.starts_with("sass:")
        || url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
        || url.starts_with("url("))
}

/// Built-in importer resolving `~package/path` through node_modules
///
/// The `~` prefix is stripped and the rest is resolved from the importing
/// file's directory, trying the stylesheet extensions. An unresolvable
/// specifier is declined, which lets later importers try it and otherwise
/// hands the original specifier to the compiler untouched.
pub struct NodeModuleImporter {
    resolver: Resolver,
}

impl Debug for NodeModuleImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeModuleImporter").finish_non_exhaustive()
    }
}

impl Default for NodeModuleImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeModuleImporter {
    pub fn new() -> Self {
        let resolver = Resolver::new(ResolveOptions {
            extensions: vec![".scss".into(), ".sass".into(), ".css".into()],
            main_fields: vec!["sass".into(), "style".into(), "main".into()],
            condition_names: vec!["sass".into(), "style".into(), "default".into()],
            ..Default::default()
        });
        Self { resolver }
    }

    /// Package specifier behind a `~` prefix, if `url` uses the convention
    fn package_specifier(url: &str) -> Option<&str> {
        let rest = url.strip_prefix('~')?;
        let first = rest.chars().next()?;
        if first == '/' || first.is_whitespace() {
            return None;
        }
        Some(rest)
    }

    /// Resolve `url` relative to the directory of `importer`
    pub fn resolve(&self, url: &str, importer: &Path) -> Option<PathBuf> {
        let specifier = Self::package_specifier(url)?;
        let base_dir = if importer.is_dir() {
            importer
        } else {
            importer.parent().unwrap_or(importer)
        };

        match self.resolver.resolve(base_dir, specifier) {
            Ok(resolution) => Some(resolution.path().to_path_buf()),
            Err(err) => {
                trace!(url, base = %base_dir.display(), error = ?err, "node module lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl LegacyImporter for NodeModuleImporter {
    fn name(&self) -> &str {
        "node-modules"
    }

    async fn import(&self, url: &str, prev: &Path) -> anyhow::Result<Option<LegacyImport>> {
        Ok(self.resolve(url, prev).map(LegacyImport::File))
    }
}

impl FileImporter for NodeModuleImporter {
    fn name(&self) -> &str {
        "node-modules"
    }

    fn find_file_url(&self, url: &str, containing: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
        let Some(containing) = containing else {
            return Ok(None);
        };
        Ok(self.resolve(url, containing))
    }
}
