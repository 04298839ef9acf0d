//! Sass plugin configuration
//!
//! [`SassPluginOptions`] is the builder users hand to the plugin. It is resolved
//! once, at plugin construction, into an immutable [`ResolvedOptions`] shared by
//! the transform and emission stages.
//!
//! A serde model, [`SassPluginConfig`], covers the subset of options that can
//! live in a JSON/TOML config file (everything except functions and runtimes).

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::emit::OutputHandler;
use crate::error::{Result, SassPluginError};
use crate::importer::Importer;
use crate::processor::Processor;
use crate::runtime::{GrassRuntime, SassRuntime};

/// Which calling convention of the compiler runtime to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// Callback-style `render` with legacy importers
    #[default]
    Legacy,
    /// Promise-style `compile` with URL-rewrite importers
    Modern,
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiMode::Legacy => write!(f, "legacy"),
            ApiMode::Modern => write!(f, "modern"),
        }
    }
}

/// CSS output style requested from the compiler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

/// Where the aggregated CSS of a build goes
#[derive(Clone, Default)]
pub enum OutputTarget {
    /// Keep CSS inline as each module's default export, emit nothing
    #[default]
    Inline,
    /// Write next to the bundle, named after the bundle's output file
    Derived,
    /// Write to this exact path
    Path(PathBuf),
    /// Hand the CSS and the style records to a callback
    Callback(Arc<dyn OutputHandler>),
}

impl OutputTarget {
    /// Whether CSS is aggregated into a separate artifact
    pub fn is_enabled(&self) -> bool {
        !matches!(self, OutputTarget::Inline)
    }
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Inline => write!(f, "Inline"),
            OutputTarget::Derived => write!(f, "Derived"),
            OutputTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            OutputTarget::Callback(_) => write!(f, "Callback(<fn>)"),
        }
    }
}

impl From<bool> for OutputTarget {
    fn from(enabled: bool) -> Self {
        if enabled {
            OutputTarget::Derived
        } else {
            OutputTarget::Inline
        }
    }
}

impl From<&str> for OutputTarget {
    fn from(path: &str) -> Self {
        OutputTarget::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for OutputTarget {
    fn from(path: PathBuf) -> Self {
        OutputTarget::Path(path)
    }
}

/// Options forwarded to the compiler runtime
#[derive(Debug, Clone, Default)]
pub struct SassOptions {
    /// Prepended to every stylesheet before compilation
    pub data: Option<String>,
    /// Extra directories searched by `@import` / `@use`
    pub include_paths: Vec<PathBuf>,
    pub output_style: OutputStyle,
    /// Ask the runtime for a source map
    pub source_map: bool,
    /// User importers, consulted after the built-in node_modules importer
    pub importers: Vec<Importer>,
    /// Runtime-specific keys, passed through untouched
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SassOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    pub fn with_output_style(mut self, style: OutputStyle) -> Self {
        self.output_style = style;
        self
    }

    pub fn with_source_map(mut self, enabled: bool) -> Self {
        self.source_map = enabled;
        self
    }

    pub fn with_importer(mut self, importer: Importer) -> Self {
        self.importers.push(importer);
        self
    }
}

/// User-facing plugin options
#[derive(Clone)]
pub struct SassPluginOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub api: ApiMode,
    /// Inject CSS at runtime through a `<style>` element
    pub insert: bool,
    pub output: OutputTarget,
    pub processor: Option<Arc<dyn Processor>>,
    pub runtime: Arc<dyn SassRuntime>,
    pub options: SassOptions,
    /// Base for relative filter patterns, include paths and output paths
    pub cwd: PathBuf,
}

impl fmt::Debug for SassPluginOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SassPluginOptions")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("api", &self.api)
            .field("insert", &self.insert)
            .field("output", &self.output)
            .field("processor", &self.processor.as_ref().map(|_| "<fn>"))
            .field("runtime", &self.runtime)
            .field("options", &self.options)
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl Default for SassPluginOptions {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
            api: ApiMode::default(),
            insert: false,
            output: OutputTarget::Inline,
            processor: None,
            runtime: Arc::new(GrassRuntime::new()),
            options: SassOptions::default(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

fn default_include() -> Vec<String> {
    vec!["**/*.sass".to_string(), "**/*.scss".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec!["node_modules/**".to_string()]
}

impl SassPluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the include patterns
    pub fn with_include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the exclude patterns
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Append an include pattern.
    ///
    /// While the list still equals the defaults they are dropped first, so a
    /// chain of `include` calls starting from [`SassPluginOptions::new`] yields
    /// exactly the chained patterns. Use [`SassPluginOptions::with_include`] to
    /// keep the defaults alongside custom patterns.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        if self.include == default_include() {
            self.include.clear();
        }
        self.include.push(pattern.into());
        self
    }

    /// Append an exclude pattern, dropping the defaults first like
    /// [`SassPluginOptions::include`]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        if self.exclude == default_exclude() {
            self.exclude.clear();
        }
        self.exclude.push(pattern.into());
        self
    }

    pub fn with_api(mut self, api: ApiMode) -> Self {
        self.api = api;
        self
    }

    pub fn with_insert(mut self, insert: bool) -> Self {
        self.insert = insert;
        self
    }

    pub fn with_output(mut self, output: impl Into<OutputTarget>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_output_handler(mut self, handler: impl OutputHandler + 'static) -> Self {
        self.output = OutputTarget::Callback(Arc::new(handler));
        self
    }

    pub fn with_processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn SassRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_sass_options(mut self, options: SassOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Build options from a deserialized config, filling the gaps with defaults
    pub fn from_config(config: SassPluginConfig) -> Self {
        let mut options = Self::default();
        if let Some(include) = config.include {
            options.include = include.into_vec();
        }
        if let Some(exclude) = config.exclude {
            options.exclude = exclude.into_vec();
        }
        if let Some(api) = config.api {
            options.api = api;
        }
        options.insert = config.insert;
        options.output = match config.output {
            OutputConfig::Enabled(enabled) => enabled.into(),
            OutputConfig::Path(path) => OutputTarget::Path(path),
        };
        if let Some(cwd) = config.cwd {
            options.cwd = cwd;
        }

        let sass = config.options;
        options.options = SassOptions {
            data: sass.data,
            include_paths: sass.include_paths,
            output_style: sass.output_style,
            source_map: sass.source_map,
            importers: Vec::new(),
            extra: sass.extra,
        };
        options
    }

    /// Build options from an untyped JSON value (missing value means defaults)
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: SassPluginConfig = serde_json::from_value(value)
            .map_err(|e| SassPluginError::invalid_config(e.to_string()))?;
        Ok(Self::from_config(config))
    }
}

/// Serializable plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SassPluginConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiMode>,
    #[serde(default)]
    pub insert: bool,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub options: SassOptionsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

/// A single pattern or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(pattern) => vec![pattern],
            OneOrMany::Many(patterns) => patterns,
        }
    }
}

/// `output` as it appears in config files: a flag or a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputConfig {
    Enabled(bool),
    Path(PathBuf),
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig::Enabled(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SassOptionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, alias = "loadPaths")]
    pub include_paths: Vec<PathBuf>,
    #[serde(default, alias = "style")]
    pub output_style: OutputStyle,
    #[serde(default)]
    pub source_map: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Include/exclude filter over bundler module ids
///
/// Patterns that are absolute or start with `**` are matched as written; other
/// patterns are anchored at `cwd`. Ids containing a NUL byte belong to virtual
/// modules and are never claimed.
#[derive(Debug, Clone)]
pub struct ModuleFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl ModuleFilter {
    pub fn new(include: &[String], exclude: &[String], cwd: &Path) -> Self {
        Self {
            include: compile_patterns(include, cwd),
            exclude: compile_patterns(exclude, cwd),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        if id.contains('\0') {
            return false;
        }

        let normalized = id.replace('\\', "/");
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        if self
            .exclude
            .iter()
            .any(|p| p.matches_with(&normalized, options))
        {
            return false;
        }

        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(&normalized, options))
    }
}

fn compile_patterns(patterns: &[String], cwd: &Path) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| {
            let anchored = anchor_pattern(raw, cwd);
            match Pattern::new(&anchored) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    warn!(pattern = %raw, error = %err, "[fob-sass] ignoring invalid filter pattern");
                    None
                }
            }
        })
        .collect()
}

fn anchor_pattern(pattern: &str, cwd: &Path) -> String {
    let pattern = pattern.replace('\\', "/");
    if pattern.starts_with("**") || Path::new(&pattern).is_absolute() {
        return pattern;
    }
    let base = cwd.to_string_lossy().replace('\\', "/");
    let relative = pattern.trim_start_matches("./");
    format!(
        "{}/{}",
        Pattern::escape(base.trim_end_matches('/')),
        relative
    )
}

/// Options resolved once per plugin instance
#[derive(Clone)]
pub struct ResolvedOptions {
    pub filter: ModuleFilter,
    pub api: ApiMode,
    pub insert: bool,
    pub output: OutputTarget,
    pub processor: Option<Arc<dyn Processor>>,
    pub runtime: Arc<dyn SassRuntime>,
    pub options: SassOptions,
    pub cwd: PathBuf,
}

impl fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("filter", &self.filter)
            .field("api", &self.api)
            .field("insert", &self.insert)
            .field("output", &self.output)
            .field("processor", &self.processor.as_ref().map(|_| "<fn>"))
            .field("runtime", &self.runtime)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl From<SassPluginOptions> for ResolvedOptions {
    fn from(options: SassPluginOptions) -> Self {
        Self {
            filter: ModuleFilter::new(&options.include, &options.exclude, &options.cwd),
            api: options.api,
            insert: options.insert,
            output: options.output,
            processor: options.processor,
            runtime: options.runtime,
            options: options.options,
            cwd: options.cwd,
        }
    }
}
