//! Error types for the Sass plugin

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ApiMode;
use crate::runtime::CompileError;

/// Message shown when a processor returns an object without a string `css` field.
pub const MISSING_CSS_MESSAGE: &str = "You need to return the styles using the 'css' property. \
     A processor must return either a CSS string or an object of the shape { css, ...exports }";

pub type Result<T> = std::result::Result<T, SassPluginError>;

/// Errors that can occur while compiling or emitting stylesheets
#[derive(Error, Debug, Diagnostic)]
pub enum SassPluginError {
    /// Processor returned an object without a string `css` field
    #[error("{}", MISSING_CSS_MESSAGE)]
    #[diagnostic(
        code(fob::sass::missing_css_property),
        help("Return `{{ \"css\": \"...\" }}` or a plain string from the processor")
    )]
    MissingCssProperty { module_id: String },

    /// Processor returned something that is neither a string nor an object
    #[error("processor returned an unsupported value for {module_id}: expected a string or an object, got {found}")]
    #[diagnostic(code(fob::sass::invalid_processor_result))]
    InvalidProcessorResult { module_id: String, found: String },

    /// Processor export key cannot be emitted as `export const <name>`
    #[error("processor export `{name}` for {module_id} is not a valid JavaScript identifier")]
    #[diagnostic(
        code(fob::sass::invalid_export_name),
        help("Group names that are not identifiers under one key, e.g. `{{ \"css\": ..., \"classes\": {{ \"my-class\": ... }} }}`")
    )]
    InvalidExportName { module_id: String, name: String },

    /// Generated module code could not be serialized
    #[error("failed to serialize generated module for {module_id}: {source}")]
    #[diagnostic(code(fob::sass::codegen))]
    Codegen {
        module_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// An importer of the other API shape was configured
    #[error("importer `{importer}` uses the {found} importer API but the plugin is configured for the {expected} API")]
    #[diagnostic(
        code(fob::sass::importer_api_mismatch),
        help("Use `Importer::Legacy` with `ApiMode::Legacy` and `Importer::Modern` with `ApiMode::Modern`")
    )]
    ImporterApiMismatch {
        importer: String,
        expected: ApiMode,
        found: ApiMode,
    },

    /// Plugin configuration could not be deserialized
    #[error("invalid sass plugin config: {message}")]
    #[diagnostic(code(fob::sass::invalid_config))]
    InvalidConfig { message: String },

    #[error(transparent)]
    #[diagnostic(code(fob::sass::compile))]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(code(fob::sass::processor))]
    Processor(anyhow::Error),

    #[error(transparent)]
    #[diagnostic(code(fob::sass::output))]
    Output(anyhow::Error),

    #[error(transparent)]
    #[diagnostic(code(fob::sass::io))]
    Io(#[from] std::io::Error),
}

impl SassPluginError {
    pub fn missing_css_property(module_id: impl Into<String>) -> Self {
        Self::MissingCssProperty {
            module_id: module_id.into(),
        }
    }

    pub fn invalid_processor_result(module_id: impl Into<String>, found: impl Into<String>) -> Self {
        Self::InvalidProcessorResult {
            module_id: module_id.into(),
            found: found.into(),
        }
    }

    pub fn invalid_export_name(module_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::InvalidExportName {
            module_id: module_id.into(),
            name: name.into(),
        }
    }

    pub fn importer_api_mismatch(importer: impl Into<String>, expected: ApiMode, found: ApiMode) -> Self {
        Self::ImporterApiMismatch {
            importer: importer.into(),
            expected,
            found,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error stems from plugin misconfiguration rather than the stylesheet
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCssProperty { .. }
                | Self::InvalidProcessorResult { .. }
                | Self::InvalidExportName { .. }
                | Self::ImporterApiMismatch { .. }
                | Self::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_css_message_is_fixed() {
        let err = SassPluginError::missing_css_property("/src/a.scss");
        assert!(err
            .to_string()
            .starts_with("You need to return the styles using the 'css' property"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_compile_error_is_transparent() {
        let err: SassPluginError = CompileError::Sass("Error: expected \";\".".to_string()).into();
        assert_eq!(err.to_string(), "Error: expected \";\".");
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_codegen_error_names_module() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SassPluginError::Codegen {
            module_id: "/src/a.scss".to_string(),
            source,
        };
        assert!(err.to_string().contains("/src/a.scss"));
        assert!(!err.is_configuration_error());
        assert!(!matches!(err, SassPluginError::Processor(_)));
    }

    #[test]
    fn test_mismatch_names_both_apis() {
        let err = SassPluginError::importer_api_mismatch("aliases", ApiMode::Modern, ApiMode::Legacy);
        let msg = err.to_string();
        assert!(msg.contains("legacy importer API"));
        assert!(msg.contains("modern API"));
    }
}
