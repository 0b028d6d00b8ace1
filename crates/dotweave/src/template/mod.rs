//! Template engine for dotfile templates.
//!
//! Templates use Go text/template syntax (`{{ .Hostname }}`,
//! `{{ if eq .OS "linux" }}...{{ end }}`, `{{ .User | toUpper }}`) evaluated
//! against a [`Platform`] snapshot. Rendering is pure: the same source and
//! platform always produce the same bytes.

mod exec;
pub mod funcs;
mod lexer;
pub mod naming;
mod parser;
pub mod value;

pub use funcs::{FuncRegistry, TemplateFunc, TextTransform};
pub use naming::{
    backup_path, conflict_path, is_conflict_file, is_generated_file, is_rendered_file,
    is_template_file, rendered_path, target_name,
};
pub use value::Value;

use crate::error::TemplateError;
use crate::platform::Platform;

use exec::Executor;

pub struct TemplateEngine {
    context: Value,
    funcs: FuncRegistry,
}

impl TemplateEngine {
    pub fn new(platform: &Platform) -> Self {
        Self::with_funcs(platform, FuncRegistry::builtin())
    }

    pub fn with_funcs(platform: &Platform, funcs: FuncRegistry) -> Self {
        Self {
            context: Value::from(platform),
            funcs,
        }
    }

    /// Registers additional functions on top of the built-ins.
    pub fn funcs_mut(&mut self) -> &mut FuncRegistry {
        &mut self.funcs
    }

    /// Renders template bytes. Sources without `{{` are returned unchanged,
    /// which keeps binary files intact.
    pub fn render(&self, name: &str, source: &[u8]) -> Result<Vec<u8>, TemplateError> {
        if !has_delimiters(source) {
            return Ok(source.to_vec());
        }

        let text = std::str::from_utf8(source).map_err(|e| TemplateError::Parse {
            name: name.to_string(),
            line: 1,
            message: format!("template is not valid UTF-8: {}", e),
        })?;

        self.render_str(name, text).map(String::into_bytes)
    }

    pub fn render_str(&self, name: &str, source: &str) -> Result<String, TemplateError> {
        if !source.contains("{{") {
            return Ok(source.to_string());
        }
        let nodes = parser::parse(name, source)?;
        Executor::new(name, &self.context, &self.funcs).execute(&nodes)
    }
}

/// One-shot render with the built-in function set.
pub fn render(platform: &Platform, name: &str, source: &[u8]) -> Result<Vec<u8>, TemplateError> {
    TemplateEngine::new(platform).render(name, source)
}

/// Whether the bytes contain a template action opener.
pub fn has_delimiters(source: &[u8]) -> bool {
    lexer::has_delimiters(source)
}
