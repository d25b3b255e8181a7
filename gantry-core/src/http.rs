// Request and response state shared across the dispatch chain

use crate::render::{Renderer, Template, Vars};
use crate::{Error, HttpStatus};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The inbound request: a mutable field map seeded with `url`, narrowed
/// through `match_url` during fluid sub-routing, and extended by matcher
/// captures and handlers.
///
/// `Request` is a cheap handle; clones share one underlying state so the
/// matcher loop, handler chain, and mounted sub-apps all see the same
/// mutations.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RwLock<RequestState>>,
}

struct RequestState {
    method: String,
    fields: HashMap<String, Value>,
    headers: HashMap<String, String>,
}

impl Request {
    /// Create a GET request for the given URL path.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_method(url, "GET")
    }

    /// Create a request with an explicit HTTP method.
    pub fn with_method(url: impl Into<String>, method: impl Into<String>) -> Self {
        let mut fields = HashMap::new();
        fields.insert("url".to_string(), Value::String(url.into()));
        Self {
            inner: Arc::new(RwLock::new(RequestState {
                method: method.into().to_uppercase(),
                fields,
                headers: HashMap::new(),
            })),
        }
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().fields.get(key).cloned()
    }

    /// Get a field value as a string, if it is one.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Set a field value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().fields.insert(key.into(), value.into());
    }

    /// Remove a field, returning its prior value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().fields.remove(key)
    }

    /// The full request path this request was created with.
    pub fn url(&self) -> String {
        self.get_str("url").unwrap_or_default()
    }

    /// The unmatched URL remainder written by a fluid prefix match.
    pub fn match_url(&self) -> Option<String> {
        self.get_str("match_url")
    }

    /// The URL portion routes should match against: the fluid remainder
    /// if one has been recorded, otherwise the full URL.
    pub fn match_target(&self) -> String {
        self.match_url().unwrap_or_else(|| self.url())
    }

    /// The HTTP method, uppercased.
    pub fn method(&self) -> String {
        self.inner.read().method.clone()
    }

    /// Replace the HTTP method.
    pub fn set_method(&self, method: impl Into<String>) {
        self.inner.write().method = method.into().to_uppercase();
    }

    /// Get a header value. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.read().headers.get(&name.to_lowercase()).cloned()
    }

    /// Set a header value.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.inner
            .write()
            .headers
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Snapshot of all fields.
    pub fn fields(&self) -> HashMap<String, Value> {
        self.inner.read().fields.clone()
    }
}

/// The outbound response: named output variables plus the property bag
/// (renderer, status, output ownership) and the handler output sink.
///
/// Like [`Request`], this is a shared handle; a parent app hands the same
/// response down to mounted sub-apps.
#[derive(Clone)]
pub struct Response {
    inner: Arc<RwLock<ResponseState>>,
}

struct ResponseState {
    vars: Vars,
    headers: HashMap<String, String>,
    status: HttpStatus,
    renderer: Arc<dyn Renderer>,
    did_output: bool,
    sink: String,
}

impl Response {
    /// Create a response wired to a renderer.
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ResponseState {
                vars: Vars::new(),
                headers: HashMap::new(),
                status: HttpStatus::Ok,
                renderer,
                did_output: false,
                sink: String::new(),
            })),
        }
    }

    /// Assign an output variable for rendering.
    pub fn assign(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.inner.write().vars.insert(key.into(), value.into());
        self
    }

    /// Serialize a value and assign it as an output variable.
    pub fn assign_json<T: serde::Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&Self, Error> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.inner.write().vars.insert(key.into(), value);
        Ok(self)
    }

    /// Get an assigned output variable.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().vars.get(key).cloned()
    }

    /// Snapshot of all assigned variables.
    pub fn vars(&self) -> Vars {
        self.inner.read().vars.clone()
    }

    /// The response status.
    pub fn status(&self) -> HttpStatus {
        self.inner.read().status
    }

    /// Set the response status.
    pub fn set_status(&self, status: HttpStatus) -> &Self {
        self.inner.write().status = status;
        self
    }

    /// Get a response header.
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.read().headers.get(&name.to_lowercase()).cloned()
    }

    /// Set a response header.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.inner
            .write()
            .headers
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Replace the renderer used by `render` and `partial`.
    pub fn set_renderer(&self, renderer: Arc<dyn Renderer>) -> &Self {
        self.inner.write().renderer = renderer;
        self
    }

    /// The renderer currently wired to this response.
    pub fn renderer(&self) -> Arc<dyn Renderer> {
        self.inner.read().renderer.clone()
    }

    /// Claim output ownership. Returns true for the first caller only;
    /// the owning dispatch is the one that emits 404/500 fallbacks.
    pub fn claim_output(&self) -> bool {
        let mut state = self.inner.write();
        if state.did_output {
            false
        } else {
            state.did_output = true;
            true
        }
    }

    /// Whether output ownership has been claimed.
    pub fn did_output(&self) -> bool {
        self.inner.read().did_output
    }

    /// Append to the output sink. Handlers that produce incidental output
    /// instead of returning a body write here; the route run loop drains
    /// the sink per handler.
    pub fn write(&self, text: &str) -> &Self {
        self.inner.write().sink.push_str(text);
        self
    }

    /// Open a capture scope, returning its start marker.
    pub fn begin_capture(&self) -> usize {
        self.inner.read().sink.len()
    }

    /// Close a capture scope, draining everything written since `start`.
    pub fn end_capture(&self, start: usize) -> String {
        let mut state = self.inner.write();
        let start = start.min(state.sink.len());
        state.sink.split_off(start)
    }

    /// Render the assigned variables through the wired renderer.
    pub fn render(&self, template: impl Into<Template>) -> Result<String, Error> {
        let (renderer, vars) = {
            let state = self.inner.read();
            (state.renderer.clone(), state.vars.clone())
        };
        renderer.render(&template.into(), &vars)
    }

    /// Render a partial view with explicit variables, ignoring the
    /// assigned ones.
    pub fn partial(&self, template: impl Into<Template>, vars: &Vars) -> Result<String, Error> {
        self.renderer().render(&template.into(), vars)
    }

    /// Render a list of templates in order, each optionally wrapped.
    /// The wrapper receives the rendered content as a `content` variable.
    pub fn build(
        &self,
        templates: &[Template],
        wrapper: Option<&Template>,
    ) -> Result<String, Error> {
        let mut output = String::new();
        for template in templates {
            let mut content = self.render(template.clone())?;
            if let Some(wrapper) = wrapper {
                let mut vars = Vars::new();
                vars.insert("content".to_string(), Value::String(content));
                content = self.partial(wrapper.clone(), &vars)?;
            }
            output.push_str(&content);
        }
        Ok(output)
    }

    /// Redirect to a URL: sets a Found status and Location header, and
    /// writes a short body so the handler chain short-circuits.
    pub fn redirect(&self, url: &str) -> &Self {
        self.set_status(HttpStatus::Found);
        self.set_header("Location", url);
        self.write(&format!("Redirecting to {}\n", url));
        self
    }
}
