//! Per-module transform: Sass source in, JavaScript module out
//!
//! ```text
//! filter → reserve slot → compile → (empty? drop record)
//!        → processor → fill slot → render `export default ...;`
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::compiler::{CompileOutput, CompileRequest, Compiler};
use crate::config::ResolvedOptions;
use crate::error::{Result, SassPluginError};
use crate::insert_style::{self, INSERT_STYLE_BINDING};
use crate::processor::ProcessedCss;
use crate::registry::StyleRegistry;

/// Generated JavaScript for one stylesheet module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    pub code: String,
    /// Source map JSON from the runtime, only when source maps were requested
    pub map: Option<String>,
    /// Files the stylesheet pulled in, excluding itself
    pub dependencies: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SassTransformer {
    options: Arc<ResolvedOptions>,
    compiler: Arc<Compiler>,
    registry: StyleRegistry,
}

impl SassTransformer {
    pub fn new(options: Arc<ResolvedOptions>, registry: StyleRegistry) -> Self {
        let compiler = Arc::new(Compiler::new(&options));
        Self {
            options,
            compiler,
            registry,
        }
    }

    pub fn registry(&self) -> &StyleRegistry {
        &self.registry
    }

    pub fn claims(&self, id: &str) -> bool {
        self.options.filter.matches(id)
    }

    /// Compile `code` of module `id`, or `Ok(None)` when the filter rejects it
    pub async fn transform(&self, code: &str, id: &str) -> Result<Option<TransformedModule>> {
        if !self.claims(id) {
            trace!("[fob-sass] skipping {}", id);
            return Ok(None);
        }

        let reserved = self.registry.reserve(id);
        let result = self.compile_module(code, id).await;
        if result.is_err() && reserved {
            self.registry.release(id);
        }
        result.map(Some)
    }

    async fn compile_module(&self, code: &str, id: &str) -> Result<TransformedModule> {
        let file = PathBuf::from(id);
        let request = CompileRequest {
            data: with_preamble(self.options.options.data.as_deref(), code),
            indented: is_indented(&file),
            include_paths: self.include_paths(&file),
            file: file.clone(),
        };

        let CompileOutput {
            css,
            source_map,
            dependencies,
        } = self.compiler.compile(request).await?;

        let dependencies: Vec<PathBuf> = dependencies.into_iter().filter(|dep| dep != &file).collect();
        let map = if self.options.options.source_map {
            source_map
        } else {
            None
        };

        let css = css.trim();
        if css.is_empty() {
            debug!("[fob-sass] {} compiled to empty CSS", id);
            self.registry.remove(id);
            return Ok(TransformedModule {
                code: "export default \"\";\n".to_string(),
                map,
                dependencies,
            });
        }

        let processed = match &self.options.processor {
            Some(processor) => {
                let value = processor
                    .process(css.to_string(), id.to_string())
                    .await
                    .map_err(SassPluginError::Processor)?;
                ProcessedCss::from_value(value, id)?
            }
            None => ProcessedCss::PlainCss(css.to_string()),
        };
        let (css, exports) = processed.into_parts();

        let module_code = self.render_module(id, &css, &exports)?;
        debug!(
            "[fob-sass] compiled {} ({} → {} bytes, {} dependencies)",
            id,
            code.len(),
            css.len(),
            dependencies.len()
        );
        self.registry.fill(id, css);

        Ok(TransformedModule {
            code: module_code,
            map,
            dependencies,
        })
    }

    /// Importing file's directory, then cwd, then configured paths
    fn include_paths(&self, file: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let candidates = file
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::iter::once(self.options.cwd.clone()))
            .chain(self.options.options.include_paths.iter().map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    self.options.cwd.join(path)
                }
            }));

        for candidate in candidates {
            if !candidate.as_os_str().is_empty() && !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
        paths
    }

    fn render_module(&self, id: &str, css: &str, exports: &Map<String, Value>) -> Result<String> {
        let mut code = String::new();
        let literal = js_literal(id, css)?;

        let default_export = if self.options.insert {
            code.push_str(&insert_style::import_statement());
            format!("{INSERT_STYLE_BINDING}({literal})")
        } else if !self.options.output.is_enabled() {
            literal
        } else {
            "\"\"".to_string()
        };
        code.push_str(&format!("export default {default_export};\n"));

        for (name, value) in exports {
            code.push_str(&format!("export const {name} = {};\n", js_literal(id, value)?));
        }
        Ok(code)
    }
}

fn with_preamble(preamble: Option<&str>, code: &str) -> String {
    match preamble {
        None | Some("") => code.to_string(),
        Some(preamble) if preamble.ends_with('\n') => format!("{preamble}{code}"),
        Some(preamble) => format!("{preamble}\n{code}"),
    }
}

fn is_indented(file: &Path) -> bool {
    file.extension().is_some_and(|ext| ext == "sass")
}

fn js_literal(id: &str, value: &(impl Serialize + ?Sized)) -> Result<String> {
    serde_json::to_string(value).map_err(|source| SassPluginError::Codegen {
        module_id: id.to_string(),
        source,
    })
}
