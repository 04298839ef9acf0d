//! Post-processing of compiled CSS
//!
//! A processor receives the compiled CSS and the module id and returns either a
//! replacement CSS string or an object `{ "css": ..., ...exports }`. The result
//! is normalized into [`ProcessedCss`] right after the call returns.
//!
//! Every key besides `css` becomes an `export const` of the generated module, so
//! keys must be valid JavaScript identifiers. CSS Modules style names such as
//! `my-class` have to be grouped under a single key instead.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;

use crate::error::{Result, SassPluginError};

/// User hook run on every compiled stylesheet
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, css: String, id: String) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> Processor for F
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn process(&self, css: String, id: String) -> anyhow::Result<Value> {
        (self)(css, id).await
    }
}

/// Normalized processor result
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedCss {
    PlainCss(String),
    /// CSS plus named values exported from the generated module
    CssWithExports(String, Map<String, Value>),
}

impl ProcessedCss {
    pub fn from_value(value: Value, module_id: &str) -> Result<Self> {
        match value {
            Value::String(css) => Ok(ProcessedCss::PlainCss(css)),
            Value::Object(mut fields) => match fields.remove("css") {
                Some(Value::String(css)) => {
                    if let Some(name) = fields.keys().find(|name| !is_export_name(name)) {
                        return Err(SassPluginError::invalid_export_name(module_id, name.as_str()));
                    }
                    Ok(ProcessedCss::CssWithExports(css, fields))
                }
                _ => Err(SassPluginError::missing_css_property(module_id)),
            },
            other => Err(SassPluginError::invalid_processor_result(
                module_id,
                value_kind(&other),
            )),
        }
    }

    pub fn css(&self) -> &str {
        match self {
            ProcessedCss::PlainCss(css) | ProcessedCss::CssWithExports(css, _) => css,
        }
    }

    pub fn into_parts(self) -> (String, Map<String, Value>) {
        match self {
            ProcessedCss::PlainCss(css) => (css, Map::new()),
            ProcessedCss::CssWithExports(css, exports) => (css, exports),
        }
    }
}

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can follow `export const` in a module
fn is_export_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
