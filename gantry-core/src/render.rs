// Renderer boundary: template resolution and output production
//
// Templates may be named (resolved against registered templates, then
// template directories, then built-in fallbacks), inline text, or
// callables. The dispatch core only depends on the `Renderer` trait;
// richer template engines plug in behind it.

use crate::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// The variable map handed to a renderer.
pub type Vars = HashMap<String, Value>;

/// A callable template.
pub type TemplateFn = Arc<dyn Fn(&Vars) -> String + Send + Sync>;

/// A reference to renderable content.
#[derive(Clone)]
pub enum Template {
    /// A named template, resolved by the renderer.
    Name(String),
    /// Literal template text.
    Inline(String),
    /// A function producing output from the variable map.
    Func(TemplateFn),
}

impl Template {
    /// Reference a template by name.
    pub fn name(name: impl Into<String>) -> Self {
        Template::Name(name.into())
    }

    /// Wrap literal template text.
    pub fn inline(text: impl Into<String>) -> Self {
        Template::Inline(text.into())
    }

    /// Wrap a template function.
    pub fn func(f: impl Fn(&Vars) -> String + Send + Sync + 'static) -> Self {
        Template::Func(Arc::new(f))
    }
}

impl From<&str> for Template {
    fn from(name: &str) -> Self {
        Template::Name(name.to_string())
    }
}

impl From<String> for Template {
    fn from(name: String) -> Self {
        Template::Name(name)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Name(name) => write!(f, "Template::Name({:?})", name),
            Template::Inline(_) => write!(f, "Template::Inline(..)"),
            Template::Func(_) => write!(f, "Template::Func(..)"),
        }
    }
}

/// Produces output from a template reference and a variable map.
pub trait Renderer: Send + Sync {
    /// Render a template with the given variables.
    ///
    /// Returns `Error::TemplateNotFound` when a named template cannot be
    /// resolved.
    fn render(&self, template: &Template, vars: &Vars) -> Result<String, Error>;
}

/// Fallback bodies for templates every app is expected to have.
fn builtin_template(name: &str) -> Option<&'static str> {
    match name {
        "404" => Some("<h1>404 Not Found</h1>\n<p>No route matched {{url}}.</p>\n"),
        "error" => Some("<h1>500 Internal Server Error</h1>\n<p>{{error}}</p>\n"),
        "debug" => Some("<pre>{{output}}</pre>\n"),
        _ => None,
    }
}

/// Substitute `{{key}}` markers from the variable map.
fn substitute(text: &str, vars: &Vars) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        let marker = format!("{{{{{}}}}}", key);
        if out.contains(&marker) {
            out = out.replace(&marker, &value_display(value));
        }
    }
    out
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve a named template against registered entries, template
/// directories, and built-ins, in that order.
fn resolve_named(
    name: &str,
    templates: &HashMap<String, Template>,
    template_dirs: &[PathBuf],
) -> Result<Template, Error> {
    if let Some(template) = templates.get(name) {
        return Ok(template.clone());
    }
    for dir in template_dirs {
        let path = dir.join(name);
        if path.is_file() {
            return fs::read_to_string(&path)
                .map(Template::Inline)
                .map_err(|e| Error::Render(format!("failed to read {}: {}", path.display(), e)));
        }
    }
    if let Some(text) = builtin_template(name) {
        return Ok(Template::Inline(text.to_string()));
    }
    Err(Error::TemplateNotFound(name.to_string()))
}

/// Renders templates with `{{key}}` substitution from the variable map.
pub struct TextRenderer {
    template_dirs: Vec<PathBuf>,
    templates: HashMap<String, Template>,
}

impl TextRenderer {
    /// Create a renderer over the given template directories.
    pub fn new(template_dirs: Vec<PathBuf>) -> Self {
        Self {
            template_dirs,
            templates: HashMap::new(),
        }
    }

    /// Register a template under a name, shadowing directory lookups.
    pub fn register(mut self, name: impl Into<String>, template: impl Into<Template>) -> Self {
        self.templates.insert(name.into(), template.into());
        self
    }
}

impl Renderer for TextRenderer {
    fn render(&self, template: &Template, vars: &Vars) -> Result<String, Error> {
        match template {
            Template::Name(name) => {
                match resolve_named(name, &self.templates, &self.template_dirs)? {
                    Template::Name(other) => Err(Error::Render(format!(
                        "template {} resolves to another name: {}",
                        name, other
                    ))),
                    Template::Inline(text) => Ok(substitute(&text, vars)),
                    Template::Func(f) => Ok(f(vars)),
                }
            }
            Template::Inline(text) => Ok(substitute(text, vars)),
            Template::Func(f) => Ok(f(vars)),
        }
    }
}

/// Renders template content verbatim, without substitution.
pub struct PlainRenderer {
    template_dirs: Vec<PathBuf>,
    templates: HashMap<String, Template>,
}

impl PlainRenderer {
    pub fn new(template_dirs: Vec<PathBuf>) -> Self {
        Self {
            template_dirs,
            templates: HashMap::new(),
        }
    }

    pub fn register(mut self, name: impl Into<String>, template: impl Into<Template>) -> Self {
        self.templates.insert(name.into(), template.into());
        self
    }
}

impl Renderer for PlainRenderer {
    fn render(&self, template: &Template, vars: &Vars) -> Result<String, Error> {
        match template {
            Template::Name(name) => {
                match resolve_named(name, &self.templates, &self.template_dirs)? {
                    Template::Name(other) => Err(Error::Render(format!(
                        "template {} resolves to another name: {}",
                        name, other
                    ))),
                    Template::Inline(text) => Ok(text),
                    Template::Func(f) => Ok(f(vars)),
                }
            }
            Template::Inline(text) => Ok(text.clone()),
            Template::Func(f) => Ok(f(vars)),
        }
    }
}

/// Serializes the variable map as pretty-printed JSON, ignoring the
/// template reference.
pub struct JsonRenderer;

impl JsonRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for JsonRenderer {
    fn render(&self, _template: &Template, vars: &Vars) -> Result<String, Error> {
        serde_json::to_string_pretty(vars).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> Vars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_substitution() {
        let renderer = TextRenderer::new(vec![]).register("hello", Template::inline("Hi {{name}}!"));
        let out = renderer
            .render(&Template::name("hello"), &vars(&[("name", json!("Ada"))]))
            .unwrap();
        assert_eq!(out, "Hi Ada!");
    }

    #[test]
    fn test_missing_template() {
        let renderer = TextRenderer::new(vec![]);
        let result = renderer.render(&Template::name("nope"), &Vars::new());
        assert!(matches!(result, Err(Error::TemplateNotFound(_))));
    }

    #[test]
    fn test_builtin_404() {
        let renderer = TextRenderer::new(vec![]);
        let out = renderer
            .render(&Template::name("404"), &vars(&[("url", json!("/missing"))]))
            .unwrap();
        assert!(out.contains("404 Not Found"));
        assert!(out.contains("/missing"));
    }

    #[test]
    fn test_callable_template() {
        let renderer = TextRenderer::new(vec![]);
        let template = Template::func(|vars| format!("{} vars", vars.len()));
        let out = renderer.render(&template, &Vars::new()).unwrap();
        assert_eq!(out, "0 vars");
    }

    #[test]
    fn test_plain_renderer_no_substitution() {
        let renderer = PlainRenderer::new(vec![]).register("raw", Template::inline("{{name}}"));
        let out = renderer
            .render(&Template::name("raw"), &vars(&[("name", json!("Ada"))]))
            .unwrap();
        assert_eq!(out, "{{name}}");
    }

    #[test]
    fn test_json_renderer() {
        let renderer = JsonRenderer::new();
        let out = renderer
            .render(&Template::name("ignored"), &vars(&[("user", json!("Owen"))]))
            .unwrap();
        assert!(out.contains("\"user\""));
        assert!(out.contains("\"Owen\""));
    }
}
