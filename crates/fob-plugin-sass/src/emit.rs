//! End-of-build aggregation of compiled CSS
//!
//! Runs once per written bundle. The registry's records are concatenated in
//! order and sent to the configured [`OutputTarget`]:
//!
//! ```text
//! Path(p)      → write p (relative to cwd), creating parent directories
//! Callback(h)  → h.write(css, records)
//! Derived      → `<entry chunk>.css` asset added to the bundle
//! Inline       → nothing, CSS already lives in each module
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{OutputTarget, ResolvedOptions};
use crate::error::{Result, SassPluginError};
use crate::registry::{StyleRecord, StyleRegistry};

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

/// Receives the aggregated CSS when the output is a callback
#[async_trait]
pub trait OutputHandler: Send + Sync {
    async fn write(&self, css: String, styles: Vec<StyleRecord>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> OutputHandler for F
where
    F: Fn(String, Vec<StyleRecord>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn write(&self, css: String, styles: Vec<StyleRecord>) -> anyhow::Result<()> {
        (self)(css, styles).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Nothing to emit
    Skipped,
    /// CSS written to this file
    Written(PathBuf),
    /// CSS handed to the output callback
    Delegated,
    /// CSS to add to the bundle under `file_name`
    Asset { file_name: String, css: String },
}

/// Aggregate the registry and dispatch it per `options.output`.
///
/// `entry_file_name` is the bundle-relative file name of the first entry chunk,
/// used to derive the stylesheet name for [`OutputTarget::Derived`].
pub async fn emit_styles(
    options: &ResolvedOptions,
    registry: &StyleRegistry,
    entry_file_name: Option<&str>,
) -> Result<EmitOutcome> {
    if options.insert {
        debug!("[fob-sass] insert mode, CSS is injected at runtime");
        return Ok(EmitOutcome::Skipped);
    }
    if !options.output.is_enabled() {
        return Ok(EmitOutcome::Skipped);
    }

    let records = registry.records();
    let css: String = records.iter().map(|r| r.content.as_str()).collect();

    match &options.output {
        OutputTarget::Inline => Ok(EmitOutcome::Skipped),
        OutputTarget::Path(path) => {
            let destination = resolve_against(&options.cwd, path);
            write_css(&destination, &css).await?;
            info!(
                "[fob-sass] wrote {} ({} bytes from {} stylesheets)",
                destination.display(),
                css.len(),
                records.len()
            );
            Ok(EmitOutcome::Written(destination))
        }
        OutputTarget::Callback(handler) => {
            debug!("[fob-sass] handing {} stylesheets to output callback", records.len());
            handler
                .write(css, records)
                .await
                .map_err(SassPluginError::Output)?;
            Ok(EmitOutcome::Delegated)
        }
        OutputTarget::Derived => match entry_file_name {
            Some(entry) => Ok(EmitOutcome::Asset {
                file_name: derive_css_path(entry),
                css,
            }),
            None => {
                warn!("[fob-sass] output is enabled but the bundle has no entry chunk to name the stylesheet after");
                Ok(EmitOutcome::Skipped)
            }
        },
    }
}

/// Stylesheet name for a script output: `dist/bundle.js` → `dist/bundle.css`
pub fn derive_css_path(file_name: &str) -> String {
    let path = Path::new(file_name);
    let is_script = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext));

    let stem = if is_script {
        path.with_extension("")
    } else {
        path.to_path_buf()
    };
    format!("{}.css", stem.to_string_lossy())
}

fn resolve_against(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

async fn write_css(destination: &Path, css: &str) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(destination, css).await?;
    Ok(())
}
