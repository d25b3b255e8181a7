//! The application: named routes, a service container, and the
//! match/validate/dispatch loop.
//!
//! An `App` owns routes in registration order, selects the best match for
//! a request (content negotiation breaks ties between routes sharing one
//! pattern), runs global middleware, and executes the matched route's
//! handler chain. An `App` can itself be mounted as a handler inside
//! another app's route; the child then matches only the URL remainder the
//! parent's fluid route left unconsumed.
//!
//! # Examples
//!
//! ```
//! use gantry_core::{App, Handler};
//!
//! let mut app = App::new();
//! app.route("hello", "/hello/:name", Handler::from_fn(|ctx| {
//!     let name = ctx.request()?.get_str("name").unwrap_or_default();
//!     Ok(Some(format!("Hello {}!", name)))
//! })).unwrap();
//!
//! let (status, body) = app.simulate("/hello/world").unwrap();
//! assert_eq!(body, "Hello world!");
//! # assert_eq!(status.code(), 200);
//! ```

use crate::container::{ServiceContainer, ServiceValue};
use crate::handler::{Context, Handler, HandlerFn};
use crate::matcher::IntoMatcher;
use crate::registry::{HandlerRegistry, RouteDef};
use crate::render::{Renderer, TextRenderer, Vars};
use crate::route::Route;
use crate::{Error, HttpStatus, Request, Response};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// A routing/dispatch application.
pub struct App {
    routes: Vec<Route>,
    middleware: Vec<(String, HandlerFn)>,
    services: ServiceContainer,
    registry: HandlerRegistry,
    template_dirs: Vec<PathBuf>,
    matched: RwLock<Option<usize>>,
}

impl App {
    /// Create an app with the default `request`, `response`, and
    /// `renderer` services registered as shared objects.
    pub fn new() -> Self {
        let app = Self {
            routes: Vec::new(),
            middleware: Vec::new(),
            services: ServiceContainer::new(),
            registry: HandlerRegistry::new(),
            template_dirs: Vec::new(),
            matched: RwLock::new(None),
        };

        app.services.share("renderer", |app, _args| {
            let renderer: Arc<dyn Renderer> = Arc::new(TextRenderer::new(app.template_dirs.clone()));
            Arc::new(renderer) as ServiceValue
        });

        // The first invocation may carry a preset, used when a parent app
        // hands its request/response down to a mounted child.
        app.services.share("request", |_app, args| {
            if let Some(preset) = args.first().and_then(|a| a.clone().downcast::<Request>().ok()) {
                return Arc::new((*preset).clone()) as ServiceValue;
            }
            Arc::new(Request::new("/")) as ServiceValue
        });

        app.services.share("response", |app, args| {
            if let Some(preset) = args.first().and_then(|a| a.clone().downcast::<Response>().ok()) {
                return Arc::new((*preset).clone()) as ServiceValue;
            }
            let renderer = app
                .renderer()
                .unwrap_or_else(|_| Arc::new(TextRenderer::new(app.template_dirs.clone())));
            Arc::new(Response::new(renderer)) as ServiceValue
        });

        app
    }

    /// Create an app around a prebuilt handler registry.
    pub fn with_registry(registry: HandlerRegistry) -> Self {
        let mut app = Self::new();
        app.registry = registry;
        app
    }

    /// Add a directory the default renderer resolves templates in.
    pub fn add_template_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.template_dirs.push(dir.into());
        self
    }

    /// The configured template directories.
    pub fn template_dirs(&self) -> &[PathBuf] {
        &self.template_dirs
    }

    /// Create a named route. A string pattern is parsed as a segment
    /// template; matchers pass through unchanged. Re-registering a name
    /// replaces the prior route in place.
    ///
    /// Returns the route for fluent configuration
    /// (`.validate_fields(..)`, `.via(..)`, `.convert(..)`,
    /// `.add_handler(..)`).
    pub fn route(
        &mut self,
        name: impl Into<String>,
        matcher: impl IntoMatcher,
        handler: impl Into<Handler>,
    ) -> Result<&mut Route, Error> {
        let name = name.into();
        let mut route = Route::new(name.clone(), matcher.into_matcher()?);
        route.add_handler(handler);
        debug!(route = %name, pattern = %route.source(), "registering route");

        if let Some(pos) = self.routes.iter().position(|r| r.name == name) {
            self.routes[pos] = route;
            Ok(&mut self.routes[pos])
        } else {
            self.routes.push(route);
            let last = self.routes.len() - 1;
            Ok(&mut self.routes[last])
        }
    }

    /// Register a middleware handler, run unconditionally before the
    /// matched route in registration order.
    pub fn middleware(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Context<'_>) -> Result<Option<String>, Error> + Send + Sync + 'static,
    ) -> &mut Self {
        let key = format!("{}.{}", name.into(), self.middleware.len());
        self.middleware.push((key, Arc::new(f)));
        self
    }

    /// Look up a route by name.
    pub fn get_route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// Build a URL for a named route. Unknown routes and matchers that do
    /// not support building yield an empty string; a missing build
    /// variable is an error.
    pub fn get_url(&self, name: &str, vars: &Vars) -> Result<String, Error> {
        match self.get_route(name) {
            Some(route) => route.build(vars),
            None => Ok(String::new()),
        }
    }

    /// The route the current dispatch matched, if any.
    pub fn matched_route(&self) -> Option<&Route> {
        let idx = (*self.matched.read())?;
        self.routes.get(idx)
    }

    /// Register a shared (memoize-once) service.
    pub fn share(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync + 'static,
    ) -> &Self {
        self.services.share(name, factory);
        self
    }

    /// Register an on-demand (recompute-every-call) service.
    pub fn demand(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync + 'static,
    ) -> &Self {
        self.services.demand(name, factory);
        self
    }

    /// Invoke a named service with arguments.
    pub fn invoke_service(&self, name: &str, args: &[ServiceValue]) -> Result<ServiceValue, Error> {
        self.services.invoke(name, self, args)
    }

    /// The underlying service container.
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// Register a handler under a stable identity for `Handler::Named`
    /// references.
    pub fn register_handler(
        &mut self,
        id: impl Into<String>,
        f: impl Fn(&Context<'_>) -> Result<Option<String>, Error> + Send + Sync + 'static,
    ) -> &mut Self {
        self.registry.register(id, f);
        self
    }

    /// Mount a declarative route table against the handler registry.
    pub fn mount_table(&mut self, table: &[RouteDef]) -> Result<(), Error> {
        for def in table {
            let route = self.route(def.name, def.pattern, Handler::named(def.handler))?;
            if let Some(methods) = def.methods {
                route.via(methods);
            }
        }
        Ok(())
    }

    /// The current request, resolved through the service container.
    pub fn request(&self) -> Result<Request, Error> {
        self.service_as::<Request>("request", &[])
    }

    /// Resolve the request service with a preset, used to seed a dispatch
    /// or hand a parent's request to a mounted child.
    pub fn request_with(&self, preset: Request) -> Result<Request, Error> {
        let arg: ServiceValue = Arc::new(preset);
        self.service_as::<Request>("request", &[arg])
    }

    /// The current response, resolved through the service container.
    pub fn response(&self) -> Result<Response, Error> {
        self.service_as::<Response>("response", &[])
    }

    /// Resolve the response service with a preset.
    pub fn response_with(&self, preset: Response) -> Result<Response, Error> {
        let arg: ServiceValue = Arc::new(preset);
        self.service_as::<Response>("response", &[arg])
    }

    /// The default renderer service.
    pub fn renderer(&self) -> Result<Arc<dyn Renderer>, Error> {
        let value = self.services.invoke("renderer", self, &[])?;
        value
            .downcast::<Arc<dyn Renderer>>()
            .map(|arc| (*arc).clone())
            .map_err(|_| Error::ServiceType("renderer".to_string()))
    }

    fn service_as<T: Clone + 'static + Send + Sync>(
        &self,
        name: &str,
        args: &[ServiceValue],
    ) -> Result<T, Error> {
        let value = self.services.invoke(name, self, args)?;
        value
            .downcast::<T>()
            .map(|arc| (*arc).clone())
            .map_err(|_| Error::ServiceType(name.to_string()))
    }

    /// Invoke one handler-chain step.
    pub(crate) fn invoke_handler(&self, handler: &Handler) -> Result<Option<String>, Error> {
        match handler {
            Handler::Func(f) => f(&Context::new(self)),
            Handler::SubApp(sub) => sub.run_mounted(self),
            Handler::Named(id) => {
                let f = self
                    .registry
                    .get(id)
                    .ok_or_else(|| Error::HandlerResolution(id.clone()))?;
                f(&Context::new(self))
            }
        }
    }

    /// Run as a mounted handler: adopt the parent's request (already
    /// narrowed to the unconsumed suffix by the parent's fluid route) and
    /// response, then run this app's own matching loop.
    pub(crate) fn run_mounted(&self, parent: &App) -> Result<Option<String>, Error> {
        self.request_with(parent.request()?)?;
        self.response_with(parent.response()?)?;
        self.run()
    }

    /// Run one dispatch: select the best-matching route, execute
    /// middleware and the route's handler chain, and fall back to a 404
    /// body when nothing matched.
    ///
    /// The invocation that claims output ownership (the outermost one for
    /// this response) is the single error boundary: every error that
    /// propagates out of matching or handling is converted there into a
    /// 500-rendered body. Nested invocations bubble output and errors to
    /// their parent instead.
    pub fn run(&self) -> Result<Option<String>, Error> {
        let response = self.response()?;
        let owns_output = response.claim_output();

        match self.dispatch() {
            Ok(Some(output)) => Ok(Some(output)),
            Ok(None) if owns_output => {
                debug!("no route matched, emitting 404");
                response.set_status(HttpStatus::NotFound);
                if let Ok(request) = self.request() {
                    response.assign("url", request.url());
                }
                let body = response.render("404").unwrap_or_else(|e| {
                    error!(error = %e, "failed to render 404 template");
                    HttpStatus::NotFound.status_line()
                });
                Ok(Some(body))
            }
            Ok(None) => Ok(None),
            Err(e) if owns_output => {
                error!(error = %e, "dispatch failed");
                response.assign("error", e.to_string());
                response.set_status(HttpStatus::InternalServerError);
                let body = response.render("error").unwrap_or_else(|render_err| {
                    error!(error = %render_err, "failed to render error template");
                    format!("{}\n{}", HttpStatus::InternalServerError.status_line(), e)
                });
                Ok(Some(body))
            }
            Err(e) => Err(e),
        }
    }

    fn dispatch(&self) -> Result<Option<String>, Error> {
        let request = self.request()?;
        *self.matched.write() = None;

        let mut best: Option<usize> = None;
        for (idx, route) in self.routes.iter().enumerate() {
            if !route.matches(&request)? {
                continue;
            }
            let replace = match best {
                None => true,
                Some(current) => {
                    // Routes sharing one pattern are disambiguated purely
                    // by negotiated content-type quality, never by
                    // registration order.
                    let current = &self.routes[current];
                    route.match_type(&request) > current.match_type(&request)
                        && current.source() == route.source()
                }
            };
            if replace {
                best = Some(idx);
            }
        }
        *self.matched.write() = best;

        let Some(idx) = best else {
            trace!(url = %request.match_target(), "no route matched");
            return Ok(None);
        };
        let route = &self.routes[idx];
        debug!(route = %route.name, url = %request.url(), "dispatching");

        for (name, mw) in &self.middleware {
            trace!(middleware = %name, "running middleware");
            mw(&Context::new(self))?;
        }

        let output = route.run(self)?;
        Ok(output.filter(|s| !s.is_empty()))
    }

    /// Dispatch a prebuilt request, returning the response status and
    /// body. One app instance serves one request; later calls reuse the
    /// already-memoized request/response services.
    pub fn handle(&self, request: Request) -> Result<(HttpStatus, String), Error> {
        let request = self.request_with(request)?;
        trace!(url = %request.url(), method = %request.method(), "handling request");
        let output = self.run()?;
        let response = self.response()?;
        Ok((response.status(), output.unwrap_or_default()))
    }

    /// Simulate a GET request for a URL.
    pub fn simulate(&self, url: &str) -> Result<(HttpStatus, String), Error> {
        self.handle(Request::new(url))
    }

    /// Simulate a request with an explicit method.
    pub fn simulate_with_method(
        &self,
        url: &str,
        method: &str,
    ) -> Result<(HttpStatus, String), Error> {
        self.handle(Request::with_method(url, method))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Handler;

    #[test]
    fn test_basic_dispatch() {
        let mut app = App::new();
        app.route("home", "/", Handler::from_fn(|_ctx| Ok(Some("welcome".to_string()))))
            .unwrap();

        let (status, body) = app.simulate("/").unwrap();
        assert_eq!(status, HttpStatus::Ok);
        assert_eq!(body, "welcome");
    }

    #[test]
    fn test_unmatched_produces_404() {
        let app = App::new();
        let (status, body) = app.simulate("/nowhere").unwrap();
        assert_eq!(status, HttpStatus::NotFound);
        assert!(body.contains("404"));
    }

    #[test]
    fn test_route_replaces_by_name() {
        let mut app = App::new();
        app.route("page", "/a", Handler::from_fn(|_| Ok(Some("first".to_string()))))
            .unwrap();
        app.route("page", "/b", Handler::from_fn(|_| Ok(Some("second".to_string()))))
            .unwrap();

        assert!(app.get_route("page").is_some());
        let (_, body) = app.simulate("/b").unwrap();
        assert_eq!(body, "second");
        assert_eq!(app.routes.len(), 1);
    }

    #[test]
    fn test_middleware_runs_before_route() {
        let mut app = App::new();
        app.middleware("stamp", |ctx| {
            ctx.response()?.assign("stamp", "seen");
            Ok(None)
        });
        app.route(
            "home",
            "/",
            Handler::from_fn(|ctx| {
                let stamp = ctx.response()?.get("stamp");
                Ok(Some(format!("stamp={}", stamp.and_then(|v| v.as_str().map(String::from)).unwrap_or_default())))
            }),
        )
        .unwrap();

        let (_, body) = app.simulate("/").unwrap();
        assert_eq!(body, "stamp=seen");
    }

    #[test]
    fn test_get_url_for_unknown_route() {
        let app = App::new();
        assert_eq!(app.get_url("missing", &Vars::new()).unwrap(), "");
    }
}
