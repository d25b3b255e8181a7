// A named binding between a URL matcher and an ordered handler chain

use crate::handler::Handler;
use crate::matcher::{FieldValidator, RouteMatcher};
use crate::negotiation::{Accept, MediaType};
use crate::render::Vars;
use crate::{App, Error, Request};
use serde_json::Value;
use std::sync::Arc;
use tracing::{trace, warn};

/// A whole-request validator: receives the request, the URL portion being
/// matched, and the route itself. Returning false skips the route.
pub type RouteValidator = Arc<dyn Fn(&Request, &str, &Route) -> bool + Send + Sync>;

/// One registered route: a matcher, its handler chain, whole-request
/// validators, and declared output media types.
///
/// Method and content-type filters are ordinary validators appended to
/// the same ordered list, evaluated short-circuit; the first failure
/// skips the route without error.
pub struct Route {
    pub name: String,
    matcher: RouteMatcher,
    handlers: Vec<Handler>,
    validators: Vec<RouteValidator>,
    media_types: Vec<MediaType>,
}

impl Route {
    /// Create a route around a matcher.
    pub fn new(name: impl Into<String>, matcher: RouteMatcher) -> Self {
        Self {
            name: name.into(),
            matcher,
            handlers: Vec::new(),
            validators: Vec::new(),
            media_types: Vec::new(),
        }
    }

    /// Append a handler to the chain. Mounting a sub-app switches the
    /// matcher to fluid prefix matching.
    pub fn add_handler(&mut self, handler: impl Into<Handler>) -> &mut Self {
        let handler = handler.into();
        if handler.is_sub_app() {
            self.matcher.set_fluid(true);
        }
        self.handlers.push(handler);
        self
    }

    /// Append a whole-request validator.
    pub fn validate(
        &mut self,
        validator: impl Fn(&Request, &str, &Route) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Forward field validators to the matcher.
    pub fn validate_fields<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<FieldValidator>,
    {
        self.matcher.validate_fields(fields);
        self
    }

    /// Register a converter for a captured field.
    pub fn convert(
        &mut self,
        field: &str,
        f: impl Fn(Option<&Value>, &str) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.matcher.convert(field, f);
        self
    }

    /// Restrict the route to the given HTTP methods, comma-separated.
    pub fn via(&mut self, methods: impl Into<String>) -> &mut Self {
        let allowed: Vec<String> = methods
            .into()
            .split(',')
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        self.validate(move |request, _url, _route| allowed.contains(&request.method()))
    }

    /// Restrict the route to GET requests.
    pub fn get(&mut self) -> &mut Self {
        self.via("GET")
    }

    /// Restrict the route to POST requests.
    pub fn post(&mut self) -> &mut Self {
        self.via("POST")
    }

    /// Declare an acceptable output MIME type for content negotiation.
    pub fn content_type(&mut self, mime: &str) -> &mut Self {
        match MediaType::parse(mime) {
            Some(media_type) => self.media_types.push(media_type),
            None => warn!(mime, route = %self.name, "ignoring unparseable media type"),
        }
        self
    }

    /// The negotiated quality of this route's declared media types
    /// (default `text/html`) against the request's Accept header. A
    /// missing header behaves as `*/*`.
    pub fn match_type(&self, request: &Request) -> f32 {
        let declared = if self.media_types.is_empty() {
            vec![MediaType::html()]
        } else {
            self.media_types.clone()
        };
        let accept = request
            .header("accept")
            .map(|h| Accept::parse(&h))
            .unwrap_or_default();
        declared
            .iter()
            .map(|mt| accept.quality_for(mt))
            .fold(0.0f32, f32::max)
    }

    /// Test this route against the unmatched URL portion of the request.
    ///
    /// On a structural match, captured fields are written into the
    /// request before whole-request validators run; a fluid match then
    /// narrows the request's `match_url` to the unconsumed suffix.
    pub fn matches(&self, request: &Request) -> Result<bool, Error> {
        let target = request.match_target();
        let mut captures = match self.matcher.matches(&target)? {
            Some(captures) => captures,
            None => return Ok(false),
        };

        let rest = match captures.remove("match_url") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        for (key, value) in captures {
            request.set(key, value);
        }

        for validator in &self.validators {
            if !validator(request, &target, self) {
                trace!(route = %self.name, url = %target, "validator rejected route");
                return Ok(false);
            }
        }

        if self.matcher.fluid() {
            if let Some(rest) = rest {
                request.set("match_url", rest);
            }
        }

        trace!(route = %self.name, url = %target, "route matched");
        Ok(true)
    }

    /// Execute the handler chain in order.
    ///
    /// Each handler runs inside its own capture scope; if it returns no
    /// body, whatever it wrote to the response sink stands in. The first
    /// non-empty result short-circuits the remaining handlers, so early
    /// handlers can act as guards for later ones.
    pub fn run(&self, app: &App) -> Result<Option<String>, Error> {
        let response = app.response()?;
        for (idx, handler) in self.handlers.iter().enumerate() {
            let scope = response.begin_capture();
            let result = app.invoke_handler(handler);
            let captured = response.end_capture(scope);
            let body = result?;

            let effective = match body {
                Some(body) if !body.is_empty() => body,
                _ => captured,
            };
            if !effective.is_empty() {
                trace!(route = %self.name, handler = idx, "handler produced output");
                return Ok(Some(effective));
            }
        }
        Ok(None)
    }

    /// Build a URL for this route from a variable map.
    pub fn build(&self, vars: &Vars) -> Result<String, Error> {
        self.matcher.build(vars)
    }

    /// The matcher's original template or regex text.
    pub fn source(&self) -> &str {
        self.matcher.source()
    }

    /// The declared output media types.
    pub fn media_types(&self) -> &[MediaType] {
        &self.media_types
    }
}
