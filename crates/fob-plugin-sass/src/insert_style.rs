//! Runtime helper that injects compiled CSS into the document
//!
//! Served as a virtual module; generated stylesheet modules import it when
//! `insert` is enabled.

/// Virtual module id of the helper (NUL-prefixed so no other plugin claims it)
pub const INSERT_STYLE_ID: &str = "\0fob-sass:insert-style";

/// Local binding the generated modules import the helper under
pub const INSERT_STYLE_BINDING: &str = "___$insertStyle";

pub const INSERT_STYLE_SOURCE: &str = r#"export default function insertStyle(css) {
  if (!css || typeof document === 'undefined') {
    return css;
  }

  const style = document.createElement('style');
  style.setAttribute('type', 'text/css');
  style.innerHTML = css;
  document.head.appendChild(style);
  return css;
}
"#;

pub fn is_insert_style_id(id: &str) -> bool {
    id == INSERT_STYLE_ID
}

/// `import` line that binds the helper in a generated module
pub fn import_statement() -> String {
    // The id contains a NUL byte, which a JSON string literal escapes.
    let specifier = serde_json::Value::from(INSERT_STYLE_ID).to_string();
    format!("import {INSERT_STYLE_BINDING} from {specifier};\n")
}
