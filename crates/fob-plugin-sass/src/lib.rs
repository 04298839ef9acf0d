//! Rolldown plugin for Sass
//!
//! Compiles `.scss` / `.sass` modules during the build and turns each into a
//! JavaScript module. Depending on configuration the CSS is:
//!
//! - inlined as the module's default export (default),
//! - injected into the page at runtime through a `<style>` element (`insert`),
//! - or aggregated across the build into one stylesheet (`output`).
//!
//! ## Architecture
//!
//! ```text
//! .scss/.sass → transform() → Compiler (legacy | modern) → processor → StyleRegistry
//!                                                                         ↓
//!                                     generate_bundle() → emit_styles → file / callback / asset
//! ```
//!
//! The default compiler runtime is [grass](https://github.com/connorskees/grass),
//! any [`SassRuntime`] can be plugged in instead.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fob_plugin_sass::{FobSassPlugin, SassOptions, SassPluginOptions};
//! use std::sync::Arc;
//!
//! let plugin = Arc::new(FobSassPlugin::with_options(
//!     SassPluginOptions::new()
//!         .with_output("dist/styles.css")
//!         .with_sass_options(SassOptions::new().with_data("$brand: #336699;")),
//! ));
//! ```

use rolldown_common::{ModuleType, Output, OutputAsset};
use rolldown_plugin::{
    HookGenerateBundleArgs, HookLoadArgs, HookLoadOutput, HookLoadReturn, HookNoopReturn,
    HookResolveIdArgs, HookResolveIdOutput, HookResolveIdReturn, HookTransformArgs, HookTransformOutput,
    HookTransformReturn, HookUsage, Plugin, PluginContext, SharedTransformPluginContext,
};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

mod compiler;
mod config;
mod emit;
mod error;
mod importer;
mod insert_style;
mod processor;
mod registry;
pub mod runtime;
mod transform;

pub use compiler::{CompileOutput, CompileRequest, Compiler};
pub use config::{
    ApiMode, ModuleFilter, OneOrMany, OutputConfig, OutputStyle, OutputTarget, ResolvedOptions,
    SassOptions, SassOptionsConfig, SassPluginConfig, SassPluginOptions,
};
pub use emit::{derive_css_path, emit_styles, EmitOutcome, OutputHandler};
pub use error::{Result, SassPluginError, MISSING_CSS_MESSAGE};
pub use importer::{
    FileImporter, Importer, ImporterChain, LegacyImport, LegacyImporter, NodeModuleImporter, Resolution,
};
pub use insert_style::{INSERT_STYLE_ID, INSERT_STYLE_SOURCE};
pub use processor::{ProcessedCss, Processor};
pub use registry::{StyleRecord, StyleRegistry};
pub use runtime::{GrassRuntime, SassRuntime};
pub use transform::{SassTransformer, TransformedModule};

/// Rolldown plugin that compiles Sass stylesheets
///
/// Each instance owns its [`StyleRegistry`], so several instances with
/// different configurations can run in one process without sharing styles.
#[derive(Debug, Clone)]
pub struct FobSassPlugin {
    options: Arc<ResolvedOptions>,
    transformer: SassTransformer,
}

impl FobSassPlugin {
    /// Plugin with default options
    pub fn new() -> Self {
        Self::with_options(SassPluginOptions::default())
    }

    pub fn with_options(options: SassPluginOptions) -> Self {
        let options = Arc::new(ResolvedOptions::from(options));
        let transformer = SassTransformer::new(Arc::clone(&options), StyleRegistry::new());
        Self {
            options,
            transformer,
        }
    }

    /// Build from an untyped config value, such as a plugin entry of a JSON config
    pub fn from_config_value(value: serde_json::Value) -> Result<Self> {
        Ok(Self::with_options(SassPluginOptions::from_value(value)?))
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub fn transformer(&self) -> &SassTransformer {
        &self.transformer
    }

    /// Compiled styles recorded so far, in aggregation order
    pub fn styles(&self) -> Vec<StyleRecord> {
        self.transformer.registry().records()
    }
}

impl Default for FobSassPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for FobSassPlugin {
    fn name(&self) -> Cow<'static, str> {
        "fob-sass".into()
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::ResolveId | HookUsage::Load | HookUsage::Transform | HookUsage::GenerateBundle
    }

    /// Resolves the style-injection helper's virtual id
    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs<'_>,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let is_helper = insert_style::is_insert_style_id(args.specifier);

        async move {
            if !is_helper {
                return Ok(None);
            }
            Ok(Some(HookResolveIdOutput {
                id: INSERT_STYLE_ID.into(),
                ..Default::default()
            }))
        }
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let is_helper = insert_style::is_insert_style_id(args.id);

        async move {
            if !is_helper {
                return Ok(None);
            }
            Ok(Some(HookLoadOutput {
                code: INSERT_STYLE_SOURCE.into(),
                module_type: Some(ModuleType::Js),
                ..Default::default()
            }))
        }
    }

    /// Compiles claimed stylesheets into JavaScript modules
    ///
    /// Files the stylesheet imported are registered as watch files so that
    /// editing a partial rebuilds the module that uses it.
    fn transform(
        &self,
        ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let id = args.id.to_string();
        let code = args.code.to_string();
        let transformer = self.transformer.clone();

        async move {
            let Some(module) = transformer.transform(&code, &id).await? else {
                return Ok(None);
            };

            for dependency in &module.dependencies {
                ctx.add_watch_file(&dependency.to_string_lossy());
            }

            let map = module.map.and_then(|json| {
                match oxc_sourcemap::SourceMap::from_json_string(&json) {
                    Ok(map) => Some(map),
                    Err(err) => {
                        debug!("[fob-sass] dropping unreadable source map for {}: {:?}", id, err);
                        None
                    }
                }
            });

            Ok(Some(HookTransformOutput {
                code: Some(module.code),
                map,
                side_effects: None,
                module_type: Some(ModuleType::Js),
            }))
        }
    }

    /// Emits the aggregated stylesheet once the bundle is written
    fn generate_bundle(
        &self,
        _ctx: &PluginContext,
        args: &mut HookGenerateBundleArgs<'_>,
    ) -> impl std::future::Future<Output = HookNoopReturn> + Send {
        let options = Arc::clone(&self.options);
        let registry = self.transformer.registry().clone();

        async move {
            if !args.is_write {
                return Ok(());
            }

            let entry = args.bundle.iter().find_map(|output| match output {
                Output::Chunk(chunk) if chunk.is_entry => Some(chunk.filename.to_string()),
                _ => None,
            });

            if let EmitOutcome::Asset { file_name, css } =
                emit_styles(&options, &registry, entry.as_deref()).await?
            {
                debug!("[fob-sass] adding {} to the bundle", file_name);
                let asset = OutputAsset {
                    names: vec![],
                    original_file_names: vec![],
                    filename: file_name.into(),
                    source: css.into_bytes().into(),
                };
                args.bundle.push(Output::Asset(Arc::new(asset)));
            }

            Ok(())
        }
    }
}
