//! Shared test utilities for fob-plugin-sass tests

#![allow(dead_code)]

use async_trait::async_trait;
use fob_plugin_sass::runtime::{CompileError, LegacyRenderOptions, LegacyRenderResult};
use fob_plugin_sass::{ResolvedOptions, SassPluginOptions, SassRuntime, SassTransformer, StyleRegistry};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Transformer over `options` with a fresh registry
pub fn transformer(options: SassPluginOptions) -> SassTransformer {
    let resolved: ResolvedOptions = options.into();
    SassTransformer::new(Arc::new(resolved), StyleRegistry::new())
}

/// Write `files` (relative path, contents) under a new temp directory
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, contents).unwrap();
    }
    dir
}

pub fn id(dir: &Path, relative: &str) -> String {
    dir.join(relative).to_string_lossy().into_owned()
}

/// Legacy-only runtime that echoes the source back as CSS after a delay
///
/// A source containing `@error` fails with the rest of that line as message.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    delays: Vec<(String, Duration)>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay compiles of files whose path ends with `suffix`
    pub fn delay(mut self, suffix: &str, millis: u64) -> Self {
        self.delays.push((suffix.to_string(), Duration::from_millis(millis)));
        self
    }

    pub fn shared(self) -> Arc<dyn SassRuntime> {
        Arc::new(self)
    }
}

#[async_trait]
impl SassRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn render(&self, options: LegacyRenderOptions) -> Result<LegacyRenderResult, CompileError> {
        let file: PathBuf = options.file.clone();
        let delay = self
            .delays
            .iter()
            .find(|(suffix, _)| file.to_string_lossy().ends_with(suffix.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = options.data.split("@error").nth(1) {
            return Err(CompileError::Sass(message.trim().to_string()));
        }

        Ok(LegacyRenderResult {
            css: options.data,
            map: None,
            included_files: vec![file],
        })
    }
}
