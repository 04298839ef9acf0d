//! Default runtime backed by the grass compiler
//!
//! grass has no importer hooks of its own, only a pluggable filesystem. Importers
//! are applied by rewriting the import specifiers of every stylesheet before grass
//! sees it: the entry source is rewritten up front and served from memory under
//! its own path, nested stylesheets are rewritten as grass reads them through
//! [`SessionFs`]. Importer-provided contents are rewritten the same way and
//! served as in-memory files under a reserved root.
//!
//! grass is synchronous, so compilation runs on a blocking thread. Legacy
//! importers are async and are driven from that thread on the captured runtime
//! handle.

use async_trait::async_trait;
use grass::{InputSyntax, Options};
use indexmap::IndexSet;
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use tokio::runtime::Handle;
use tracing::debug;

use super::{
    CompileError, LegacyRenderOptions, LegacyRenderResult, ModernCompileOptions,
    ModernCompileResult, SassRuntime, Syntax,
};
use crate::config::OutputStyle;
use crate::importer::{ImporterChain, Resolution};

const VIRTUAL_ROOT: &str = "/__fob_sass__/virtual";

static IMPORT_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@(?:import|use|forward)\s+((?:"[^"\n]*"|'[^'\n]*')(?:\s*,\s*(?:"[^"\n]*"|'[^'\n]*'))*)"#,
    )
    .expect("import rule regex is valid")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\n]*)"|'([^'\n]*)'"#).expect("quoted regex is valid"));

/// In-process Sass runtime using [grass](https://github.com/connorskees/grass)
#[derive(Debug, Clone, Default)]
pub struct GrassRuntime {}

impl GrassRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SassRuntime for GrassRuntime {
    fn name(&self) -> &str {
        "grass"
    }

    async fn render(&self, options: LegacyRenderOptions) -> Result<LegacyRenderResult, CompileError> {
        let syntax = if options.indented_syntax {
            Syntax::Indented
        } else {
            Syntax::Scss
        };
        if options.source_map {
            debug!("[fob-sass] grass does not emit source maps; continuing without one");
        }

        let output = compile_with_grass(GrassJob {
            file: options.file,
            source: options.data,
            syntax,
            load_paths: options.include_paths,
            chain: ImporterChain::Legacy(options.importer),
            style: options.output_style,
            quiet: is_quiet(&options.extra),
        })
        .await?;

        Ok(LegacyRenderResult {
            css: output.css,
            map: None,
            included_files: output.loaded,
        })
    }

    async fn compile(&self, options: ModernCompileOptions) -> Result<ModernCompileResult, CompileError> {
        if options.source_map {
            debug!("[fob-sass] grass does not emit source maps; continuing without one");
        }

        let output = compile_with_grass(GrassJob {
            file: options.url,
            source: options.source,
            syntax: options.syntax,
            load_paths: options.load_paths,
            chain: ImporterChain::Modern(options.importers),
            style: options.style,
            quiet: is_quiet(&options.extra),
        })
        .await?;

        Ok(ModernCompileResult {
            css: output.css,
            source_map: None,
            loaded_urls: output.loaded,
        })
    }
}

fn is_quiet(extra: &serde_json::Map<String, serde_json::Value>) -> bool {
    ["quiet", "quietDeps"]
        .iter()
        .any(|key| extra.get(*key).and_then(|v| v.as_bool()).unwrap_or(false))
}

struct GrassJob {
    file: PathBuf,
    source: String,
    syntax: Syntax,
    load_paths: Vec<PathBuf>,
    chain: ImporterChain,
    style: OutputStyle,
    quiet: bool,
}

struct GrassOutput {
    css: String,
    loaded: Vec<PathBuf>,
}

async fn compile_with_grass(job: GrassJob) -> Result<GrassOutput, CompileError> {
    let GrassJob {
        file,
        source,
        syntax,
        load_paths,
        chain,
        style,
        quiet,
    } = job;

    let handle = Handle::try_current().map_err(|e| CompileError::Task(e.to_string()))?;
    let session = Arc::new(CompileSession::new(chain, handle));
    let task_session = Arc::clone(&session);

    let compiled = tokio::task::spawn_blocking(move || {
        // The entry is served from memory under its own path so grass resolves
        // relative imports against the module's directory.
        let source = task_session.rewrite(&source, &file, false)?;
        task_session.record(&file);
        task_session.virtual_files.lock().insert(file.clone(), source);

        let fs = SessionFs {
            session: &task_session,
        };
        let options = Options::default()
            .fs(&fs)
            .load_paths(load_paths.as_slice())
            .input_syntax(match syntax {
                Syntax::Scss => InputSyntax::Scss,
                Syntax::Indented => InputSyntax::Sass,
                Syntax::Css => InputSyntax::Css,
            })
            .style(match style {
                OutputStyle::Expanded => grass::OutputStyle::Expanded,
                OutputStyle::Compressed => grass::OutputStyle::Compressed,
            })
            .quiet(quiet);

        Ok::<_, CompileError>(grass::from_path(&file, &options).map_err(|e| e.to_string()))
    })
    .await
    .map_err(|e| CompileError::Task(e.to_string()))??;

    match compiled {
        Ok(css) => Ok(GrassOutput {
            css,
            loaded: session.loaded(),
        }),
        // An importer failure inside the filesystem adapter surfaces from grass as
        // an opaque read error; report the importer's own error instead.
        Err(message) => Err(session.take_failure().unwrap_or(CompileError::Sass(message))),
    }
}

/// State shared by one compilation
struct CompileSession {
    chain: ImporterChain,
    handle: Handle,
    virtual_files: Mutex<FxHashMap<PathBuf, String>>,
    loaded: Mutex<IndexSet<PathBuf>>,
    failure: Mutex<Option<CompileError>>,
    next_virtual: AtomicUsize,
}

impl CompileSession {
    fn new(chain: ImporterChain, handle: Handle) -> Self {
        Self {
            chain,
            handle,
            virtual_files: Mutex::new(FxHashMap::default()),
            loaded: Mutex::new(IndexSet::new()),
            failure: Mutex::new(None),
            next_virtual: AtomicUsize::new(0),
        }
    }

    fn record(&self, path: &Path) {
        self.loaded.lock().insert(path.to_path_buf());
    }

    fn loaded(&self) -> Vec<PathBuf> {
        self.loaded.lock().iter().cloned().collect()
    }

    fn take_failure(&self) -> Option<CompileError> {
        self.failure.lock().take()
    }

    /// Run every import specifier in `source` through the importer chain.
    ///
    /// `file` is the stylesheet `source` was written in. With `anchor_relative`,
    /// relative specifiers nobody claimed are pinned to that file's directory,
    /// which importer-provided contents need since they are served from
    /// [`VIRTUAL_ROOT`].
    fn rewrite(&self, source: &str, file: &Path, anchor_relative: bool) -> Result<String, CompileError> {
        let mut replacements = Vec::new();
        for (range, url) in find_specifiers(source) {
            let resolution = self
                .chain
                .resolve_blocking(&self.handle, &url, file)
                .map_err(|source| CompileError::Importer { url: url.clone(), source })?;
            let replacement = match resolution {
                Resolution::Unchanged if anchor_relative => anchored(&url, file),
                Resolution::Unchanged => None,
                Resolution::File(path) => Some(path_to_specifier(&path)),
                Resolution::Contents { contents, indented } => {
                    // Nested imports of the contents resolve as if written in `file`
                    let contents = self.rewrite(&contents, file, true)?;
                    let path = self.virtual_path(&url, indented);
                    let specifier = path_to_specifier(&path);
                    self.virtual_files.lock().insert(path, contents);
                    Some(specifier)
                }
            };
            if let Some(replacement) = replacement {
                replacements.push((range, replacement));
            }
        }
        Ok(apply_replacements(source, replacements))
    }

    /// In-memory location for importer-provided contents.
    ///
    /// Keeps the specifier's basename so `@use` namespaces stay the same.
    fn virtual_path(&self, url: &str, indented: bool) -> PathBuf {
        let n = self.next_virtual.fetch_add(1, Ordering::Relaxed);
        let base = url.rsplit(['/', ':']).next().unwrap_or(url);
        let stem: String = Path::new(base)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .trim_start_matches(['~', '_'])
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        let stem = if stem.is_empty() { "import".to_string() } else { stem };
        let ext = if indented { "sass" } else { "scss" };
        Path::new(VIRTUAL_ROOT).join(n.to_string()).join(format!("{stem}.{ext}"))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(contents) = self.virtual_files.lock().get(path) {
            return Ok(contents.clone().into_bytes());
        }

        let bytes = std::fs::read(path)?;
        self.record(path);

        let Ok(source) = String::from_utf8(bytes) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8", path.display()),
            ));
        };

        match self.rewrite(&source, path, false) {
            Ok(rewritten) => Ok(rewritten.into_bytes()),
            Err(err) => {
                let message = err.to_string();
                *self.failure.lock() = Some(err);
                Err(io::Error::other(message))
            }
        }
    }
}

/// `grass::Fs` adapter over a [`CompileSession`]
struct SessionFs<'a> {
    session: &'a CompileSession,
}

impl std::fmt::Debug for SessionFs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFs")
            .field("virtual_files", &self.session.virtual_files.lock().len())
            .finish()
    }
}

impl grass::Fs for SessionFs<'_> {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.session.virtual_files.lock().contains_key(path) || path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.session.read(path)
    }
}

/// Quoted specifiers of `@import`, `@use` and `@forward` rules, in source order
fn find_specifiers(source: &str) -> Vec<(Range<usize>, String)> {
    let mut specifiers = Vec::new();
    for rule in IMPORT_RULE.captures_iter(source) {
        let Some(list) = rule.get(1) else {
            continue;
        };
        for quoted in QUOTED.captures_iter(list.as_str()) {
            let Some(inner) = quoted.get(1).or_else(|| quoted.get(2)) else {
                continue;
            };
            let start = list.start() + inner.start();
            let end = list.start() + inner.end();
            specifiers.push((start..end, inner.as_str().to_string()));
        }
    }
    specifiers
}

fn apply_replacements(source: &str, replacements: Vec<(Range<usize>, String)>) -> String {
    if replacements.is_empty() {
        return source.to_string();
    }

    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;
    for (range, replacement) in replacements {
        output.push_str(&source[cursor..range.start]);
        output.push_str(&replacement);
        cursor = range.end;
    }
    output.push_str(&source[cursor..]);
    output
}

/// `url` joined onto the directory of `file`, for plain relative specifiers
fn anchored(url: &str, file: &Path) -> Option<String> {
    let plain = !url.is_empty()
        && !url.starts_with(['/', '~'])
        && !url.contains(':')
        && !url.ends_with(".css");
    if !plain {
        return None;
    }
    file.parent().map(|dir| path_to_specifier(&dir.join(url)))
}

fn path_to_specifier(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::{LegacyImport, LegacyImporter, NodeModuleImporter};
    use std::fs;
    use tempfile::TempDir;

    fn legacy_options(file: PathBuf, data: &str) -> LegacyRenderOptions {
        LegacyRenderOptions {
            include_paths: vec![file.parent().unwrap().to_path_buf()],
            file,
            data: data.to_string(),
            indented_syntax: false,
            importer: vec![Arc::new(NodeModuleImporter::new())],
            output_style: OutputStyle::Expanded,
            source_map: false,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_find_specifiers() {
        let source = r#"@use "sass:math";
@import 'a', "b/c";
.x { color: red; }
@forward "~pkg/theme";"#;
        let urls: Vec<String> = find_specifiers(source).into_iter().map(|(_, u)| u).collect();
        assert_eq!(urls, vec!["sass:math", "a", "b/c", "~pkg/theme"]);
    }

    #[test]
    fn test_apply_replacements_keeps_surroundings() {
        let source = r#"@import "~pkg/a"; .x{}"#;
        let specs = find_specifiers(source);
        let replaced = apply_replacements(
            source,
            specs.into_iter().map(|(r, _)| (r, "/abs/a.scss".to_string())).collect(),
        );
        assert_eq!(replaced, r#"@import "/abs/a.scss"; .x{}"#);
    }

    #[tokio::test]
    async fn test_render_reports_included_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_vars.scss"), "$gap: 4px;").unwrap();
        let entry = dir.path().join("main.scss");
        let data = "@import 'vars';\n.grid { gap: $gap; }";
        fs::write(&entry, data).unwrap();

        let result = GrassRuntime::new()
            .render(legacy_options(entry.clone(), data))
            .await
            .unwrap();

        assert!(result.css.contains("gap: 4px"));
        assert!(result.map.is_none());
        assert_eq!(result.included_files[0], entry);
        assert!(result.included_files.iter().any(|p| p.ends_with("_vars.scss")));
    }

    #[tokio::test]
    async fn test_explicit_extension_resolves_beside_module() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/vars.scss"), "$c: red;").unwrap();
        let entry = dir.path().join("src/a.scss");

        let mut options = legacy_options(entry, "@import 'vars.scss';\na { color: $c; }");
        options.include_paths.clear();

        let result = GrassRuntime::new().render(options).await.unwrap();
        assert!(result.css.contains("color: red"), "{}", result.css);
    }

    #[tokio::test]
    async fn test_module_directory_wins_over_load_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("shared")).unwrap();
        fs::write(dir.path().join("src/_shade.scss"), "$c: red;").unwrap();
        fs::write(dir.path().join("shared/_shade.scss"), "$c: blue;").unwrap();
        let entry = dir.path().join("src/a.scss");

        let mut options = legacy_options(entry, "@import 'shade';\na { color: $c; }");
        options.include_paths = vec![dir.path().join("shared")];

        let result = GrassRuntime::new().render(options).await.unwrap();
        assert!(result.css.contains("color: red"));
        assert!(result.included_files.iter().any(|p| p.ends_with("src/_shade.scss")));
    }

    #[tokio::test]
    async fn test_error_location_names_module() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("broken.scss");
        let err = GrassRuntime::new()
            .render(legacy_options(entry, "@import 'nowhere.scss';"))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("broken.scss"), "{message}");
        assert!(!message.contains("stdin"), "{message}");
    }

    /// Serves fixed contents for exact urls
    #[derive(Debug)]
    struct Inline(&'static [(&'static str, &'static str)]);

    #[async_trait]
    impl LegacyImporter for Inline {
        fn name(&self) -> &str {
            "inline"
        }

        async fn import(&self, url: &str, _prev: &Path) -> anyhow::Result<Option<LegacyImport>> {
            Ok(self
                .0
                .iter()
                .find(|(candidate, _)| *candidate == url)
                .map(|(_, contents)| LegacyImport::Contents {
                    contents: contents.to_string(),
                    indented: false,
                }))
        }
    }

    #[tokio::test]
    async fn test_importer_contents_are_served() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("main.scss");
        let data = "@import 'virtual:tokens';\na { color: $accent; }";

        let mut options = legacy_options(entry, data);
        options
            .importer
            .push(Arc::new(Inline(&[("virtual:tokens", "$accent: orange;")])));

        let result = GrassRuntime::new().render(options).await.unwrap();
        assert!(result.css.contains("color: orange"));
    }

    #[tokio::test]
    async fn test_importer_contents_go_through_the_chain() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/theme")).unwrap();
        fs::write(dir.path().join("node_modules/theme/package.json"), r#"{"name":"theme"}"#).unwrap();
        fs::write(dir.path().join("node_modules/theme/colors.scss"), "$brand: teal;").unwrap();
        fs::write(dir.path().join("_spacing.scss"), "$gap: 2px;").unwrap();
        let entry = dir.path().join("main.scss");
        let data = "@import 'virtual:tokens';\na { color: $brand; gap: $gap; }";

        let mut options = legacy_options(entry, data);
        options.importer.push(Arc::new(Inline(&[(
            "virtual:tokens",
            "@import '~theme/colors';\n@import 'spacing';",
        )])));

        let result = GrassRuntime::new().render(options).await.unwrap();
        assert!(result.css.contains("color: teal"), "{}", result.css);
        assert!(result.css.contains("gap: 2px"), "{}", result.css);
        assert!(result
            .included_files
            .iter()
            .any(|p| p.ends_with("node_modules/theme/colors.scss")));
    }

    #[test]
    fn test_anchored_skips_non_relative_urls() {
        let file = Path::new("/p/src/a.scss");
        assert_eq!(anchored("b/c", file).as_deref(), Some("/p/src/b/c"));
        assert_eq!(anchored("sass:math", file), None);
        assert_eq!(anchored("~pkg/x", file), None);
        assert_eq!(anchored("/abs/x", file), None);
        assert_eq!(anchored("plain.css", file), None);
    }

    #[tokio::test]
    async fn test_syntax_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("broken.scss");
        let err = GrassRuntime::new()
            .render(legacy_options(entry, ".a { color: $missing; }"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::Sass(_)));
    }

    #[tokio::test]
    async fn test_modern_indented_syntax() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("nav.sass");
        let result = GrassRuntime::new()
            .compile(ModernCompileOptions {
                url: entry,
                source: "nav\n  ul\n    margin: 0\n".to_string(),
                syntax: Syntax::Indented,
                load_paths: vec![dir.path().to_path_buf()],
                importers: vec![Arc::new(NodeModuleImporter::new())],
                style: OutputStyle::Compressed,
                source_map: true,
                extra: Default::default(),
            })
            .await
            .unwrap();

        assert_eq!(result.css.trim(), "nav ul{margin:0}");
        assert!(result.source_map.is_none());
    }
}
