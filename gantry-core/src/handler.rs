// Handler types and the context they execute in
//
// Parameter injection is decided by the handler itself: every handler
// receives a Context exposing the app, request, and response, instead of
// the dispatcher inspecting parameter types per invocation.

use crate::container::ServiceValue;
use crate::{App, Error, Request, Response};
use std::sync::Arc;

/// The uniform handler signature.
///
/// A handler returns `Ok(Some(body))` to produce output directly,
/// `Ok(None)` to defer to whatever it wrote to the response sink, or
/// `Err` to abort the request into the 500 path.
pub type HandlerFn = Arc<dyn Fn(&Context<'_>) -> Result<Option<String>, Error> + Send + Sync>;

/// One step in a route's handler chain.
#[derive(Clone)]
pub enum Handler {
    /// A plain function handler.
    Func(HandlerFn),
    /// A nested app, mounted fluidly under the route's prefix.
    SubApp(Arc<App>),
    /// A handler registered by name in the app's handler registry,
    /// resolved at dispatch time. An unknown name fails the request.
    Named(String),
}

impl Handler {
    /// Wrap a function as a handler.
    pub fn from_fn(
        f: impl Fn(&Context<'_>) -> Result<Option<String>, Error> + Send + Sync + 'static,
    ) -> Self {
        Handler::Func(Arc::new(f))
    }

    /// Reference a registry handler by its stable identity.
    pub fn named(id: impl Into<String>) -> Self {
        Handler::Named(id.into())
    }

    /// Whether this handler is a mounted sub-app.
    pub fn is_sub_app(&self) -> bool {
        matches!(self, Handler::SubApp(_))
    }
}

impl From<App> for Handler {
    fn from(app: App) -> Self {
        Handler::SubApp(Arc::new(app))
    }
}

impl From<Arc<App>> for Handler {
    fn from(app: Arc<App>) -> Self {
        Handler::SubApp(app)
    }
}

/// What a handler sees while executing: accessors for the dispatching
/// app and its request/response services.
pub struct Context<'a> {
    app: &'a App,
}

impl<'a> Context<'a> {
    pub(crate) fn new(app: &'a App) -> Self {
        Self { app }
    }

    /// The dispatching app.
    pub fn app(&self) -> &App {
        self.app
    }

    /// The current request, resolved through the service container.
    pub fn request(&self) -> Result<Request, Error> {
        self.app.request()
    }

    /// The current response, resolved through the service container.
    pub fn response(&self) -> Result<Response, Error> {
        self.app.response()
    }

    /// Invoke a named service with arguments.
    pub fn service(&self, name: &str, args: &[ServiceValue]) -> Result<ServiceValue, Error> {
        self.app.invoke_service(name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_invocation() {
        let app = App::new();
        let handler = Handler::from_fn(|_ctx| Ok(Some("hello".to_string())));
        let result = app.invoke_handler(&handler).unwrap();
        assert_eq!(result.as_deref(), Some("hello"));
    }

    #[test]
    fn test_named_handler_unresolvable() {
        let app = App::new();
        let handler = Handler::named("missing");
        assert!(matches!(
            app.invoke_handler(&handler),
            Err(Error::HandlerResolution(_))
        ));
    }

    #[test]
    fn test_sub_app_detection() {
        let handler = Handler::from(App::new());
        assert!(handler.is_sub_app());
        assert!(!Handler::from_fn(|_| Ok(None)).is_sub_app());
    }

    #[test]
    fn test_context_exposes_services() {
        let app = App::new();
        let ctx = Context::new(&app);
        let request = ctx.request().unwrap();
        assert_eq!(request.url(), "/");
        assert!(ctx.response().is_ok());
    }
}
