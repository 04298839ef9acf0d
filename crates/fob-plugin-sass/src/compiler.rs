//! One compile entry point over both runtime APIs
//!
//! [`Compiler`] is built once per plugin. The selected [`ApiMode`] decides the
//! importer chain shape and which runtime call is made; the transform stage only
//! ever sees [`Compiler::compile`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ApiMode, OutputStyle, ResolvedOptions};
use crate::error::{Result, SassPluginError};
use crate::importer::{FileImporter, Importer, ImporterChain, LegacyImporter, NodeModuleImporter};
use crate::runtime::{LegacyRenderOptions, ModernCompileOptions, SassRuntime, Syntax};

/// A single stylesheet to compile
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub file: PathBuf,
    /// Full source, preamble included
    pub data: String,
    pub indented: bool,
    pub include_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub css: String,
    pub source_map: Option<String>,
    /// Files read while compiling
    pub dependencies: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Compiler {
    runtime: Arc<dyn SassRuntime>,
    chain: ImporterChain,
    output_style: OutputStyle,
    source_map: bool,
    extra: serde_json::Map<String, serde_json::Value>,
    /// First configured importer whose API differs from the selected one
    mismatch: Option<(String, ApiMode)>,
}

impl Compiler {
    pub fn new(options: &ResolvedOptions) -> Self {
        let builtin = Arc::new(NodeModuleImporter::new());
        let importers = &options.options.importers;
        let mismatch = importers
            .iter()
            .find(|importer| importer.api() != options.api)
            .map(|importer| (importer.name().to_string(), importer.api()));

        let chain = match options.api {
            ApiMode::Legacy => {
                let builtin: Arc<dyn LegacyImporter> = builtin;
                let mut chain = vec![builtin];
                chain.extend(importers.iter().filter_map(|importer| match importer {
                    Importer::Legacy(importer) => Some(Arc::clone(importer)),
                    Importer::Modern(_) => None,
                }));
                ImporterChain::Legacy(chain)
            }
            ApiMode::Modern => {
                let builtin: Arc<dyn FileImporter> = builtin;
                let mut chain = vec![builtin];
                chain.extend(importers.iter().filter_map(|importer| match importer {
                    Importer::Modern(importer) => Some(Arc::clone(importer)),
                    Importer::Legacy(_) => None,
                }));
                ImporterChain::Modern(chain)
            }
        };

        Self {
            runtime: Arc::clone(&options.runtime),
            chain,
            output_style: options.options.output_style,
            source_map: options.options.source_map,
            extra: options.options.extra.clone(),
            mismatch,
        }
    }

    pub fn api(&self) -> ApiMode {
        match self.chain {
            ImporterChain::Legacy(_) => ApiMode::Legacy,
            ImporterChain::Modern(_) => ApiMode::Modern,
        }
    }

    /// Fails when an importer of the other API shape was configured
    pub fn validate(&self) -> Result<()> {
        match &self.mismatch {
            Some((name, found)) => Err(SassPluginError::importer_api_mismatch(
                name.clone(),
                self.api(),
                *found,
            )),
            None => Ok(()),
        }
    }

    pub async fn compile(&self, request: CompileRequest) -> Result<CompileOutput> {
        self.validate()?;

        match &self.chain {
            ImporterChain::Legacy(importers) => {
                let result = self
                    .runtime
                    .render(LegacyRenderOptions {
                        file: request.file,
                        data: request.data,
                        indented_syntax: request.indented,
                        include_paths: request.include_paths,
                        importer: importers.clone(),
                        output_style: self.output_style,
                        source_map: self.source_map,
                        extra: self.extra.clone(),
                    })
                    .await?;

                Ok(CompileOutput {
                    css: result.css,
                    source_map: result.map,
                    dependencies: result.included_files,
                })
            }
            ImporterChain::Modern(importers) => {
                let syntax = modern_syntax(&request.file, request.indented);
                let result = self
                    .runtime
                    .compile(ModernCompileOptions {
                        url: request.file,
                        source: request.data,
                        syntax,
                        load_paths: request.include_paths,
                        importers: importers.clone(),
                        style: self.output_style,
                        source_map: self.source_map,
                        extra: self.extra.clone(),
                    })
                    .await?;

                Ok(CompileOutput {
                    css: result.css,
                    source_map: result.source_map,
                    dependencies: result.loaded_urls,
                })
            }
        }
    }
}

fn modern_syntax(file: &Path, indented: bool) -> Syntax {
    if indented {
        return Syntax::Indented;
    }
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("css") => Syntax::Css,
        _ => Syntax::Scss,
    }
}
