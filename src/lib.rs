// Gantry - a request-routing and dispatch micro-framework
//
// This facade re-exports the dispatch core: URL matchers, routes with
// ordered handler chains, fluid sub-app mounting, and the lazy
// dependency-injection container.

pub use gantry_core::*;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        App, Context, Error, FieldValidator, Handler, HandlerRegistry, HttpStatus, MediaType,
        RegexMatcher, Renderer, Request, Response, Route, RouteDef, RouteMatcher, Template,
    };
}
