//! Integration tests for end-of-build aggregation.
//!
//! Modules are compiled through the transformer first, then emitted with
//! [`emit_styles`], the same sequence the `generate_bundle` hook runs.

use fob_plugin_sass::{
    derive_css_path, emit_styles, EmitOutcome, OutputStyle, SassOptions, SassPluginOptions, StyleRecord,
};
use parking_lot::Mutex;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod helpers;
use helpers::{id, project, transformer};

fn compressed() -> SassOptions {
    SassOptions::new().with_output_style(OutputStyle::Compressed)
}

#[tokio::test]
async fn test_written_file_concatenates_in_import_order() {
    let dir = project(&[]);
    let options = SassPluginOptions::new()
        .with_cwd(dir.path())
        .with_output("dist/app.css")
        .with_sass_options(compressed());
    let t = transformer(options.clone());

    t.transform("a { x: 1; }", &id(dir.path(), "src/a.scss")).await.unwrap();
    t.transform("b { x: 2; }", &id(dir.path(), "src/b.scss")).await.unwrap();

    let outcome = emit_styles(&options.into(), t.registry(), Some("main.js"))
        .await
        .unwrap();

    let written = dir.path().join("dist/app.css");
    assert_eq!(outcome, EmitOutcome::Written(written.clone()));
    assert_eq!(fs::read_to_string(written).unwrap(), "a{x:1}b{x:2}");
}

#[tokio::test]
async fn test_rebuild_does_not_duplicate_output() {
    let dir = project(&[]);
    let options = SassPluginOptions::new()
        .with_cwd(dir.path())
        .with_output("app.css")
        .with_sass_options(compressed());
    let t = transformer(options.clone());
    let a = id(dir.path(), "a.scss");

    t.transform("a { x: 1; }", &a).await.unwrap();
    t.transform("b { x: 2; }", &id(dir.path(), "b.scss")).await.unwrap();
    t.transform("a { x: 3; }", &a).await.unwrap();

    emit_styles(&options.into(), t.registry(), None).await.unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("app.css")).unwrap(),
        "a{x:3}b{x:2}"
    );
}

#[tokio::test]
async fn test_insert_mode_never_calls_output_callback() {
    let dir = project(&[]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let options = SassPluginOptions::new()
        .with_cwd(dir.path())
        .with_insert(true)
        .with_output_handler(move |_css: String, _styles: Vec<StyleRecord>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(()) }
        });
    let t = transformer(options.clone());

    let module = t
        .transform("a { x: 1; }", &id(dir.path(), "a.scss"))
        .await
        .unwrap()
        .unwrap();
    assert!(module.code.contains("___$insertStyle("));

    let outcome = emit_styles(&options.into(), t.registry(), Some("main.js"))
        .await
        .unwrap();
    assert_eq!(outcome, EmitOutcome::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_output_callback_owns_emission() {
    let dir = project(&[]);
    let received = Arc::new(Mutex::new(None));
    let sink = received.clone();
    let options = SassPluginOptions::new()
        .with_cwd(dir.path())
        .with_sass_options(compressed())
        .with_output_handler(move |css: String, styles: Vec<StyleRecord>| {
            let sink = sink.clone();
            async move {
                *sink.lock() = Some((css, styles));
                Ok::<_, anyhow::Error>(())
            }
        });
    let t = transformer(options.clone());
    let a = id(dir.path(), "a.scss");

    t.transform("a { x: 1; }", &a).await.unwrap();
    let outcome = emit_styles(&options.into(), t.registry(), Some("main.js"))
        .await
        .unwrap();

    assert_eq!(outcome, EmitOutcome::Delegated);
    let (css, styles) = received.lock().take().unwrap();
    assert_eq!(css, "a{x:1}");
    assert_eq!(
        styles,
        vec![StyleRecord {
            id: a,
            content: "a{x:1}".to_string()
        }]
    );
}

#[tokio::test]
async fn test_output_callback_error_fails_emission() {
    let options = SassPluginOptions::new().with_output_handler(|_css: String, _styles: Vec<StyleRecord>| async {
        Err::<(), _>(anyhow::anyhow!("disk full"))
    });
    let t = transformer(options.clone());

    let err = emit_styles(&options.into(), t.registry(), None).await.unwrap_err();
    assert_eq!(err.to_string(), "disk full");
}

#[tokio::test]
async fn test_output_true_derives_name_from_bundle() {
    let dir = project(&[]);
    let options = SassPluginOptions::new()
        .with_cwd(dir.path())
        .with_output(true)
        .with_sass_options(compressed());
    let t = transformer(options.clone());

    t.transform("a { x: 1; }", &id(dir.path(), "a.scss")).await.unwrap();
    let outcome = emit_styles(&options.into(), t.registry(), Some("bundle.js"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        EmitOutcome::Asset {
            file_name: "bundle.css".to_string(),
            css: "a{x:1}".to_string()
        }
    );
    assert_eq!(derive_css_path("dist/bundle.js"), "dist/bundle.css");
}

#[tokio::test]
async fn test_inline_mode_produces_no_artifact() {
    let dir = project(&[]);
    let options = SassPluginOptions::new().with_cwd(dir.path());
    let t = transformer(options.clone());

    let module = t
        .transform("a { x: 1; }", &id(dir.path(), "a.scss"))
        .await
        .unwrap()
        .unwrap();
    assert!(module.code.starts_with("export default \"a {"));

    let outcome = emit_styles(&options.into(), t.registry(), Some("bundle.js"))
        .await
        .unwrap();
    assert_eq!(outcome, EmitOutcome::Skipped);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
