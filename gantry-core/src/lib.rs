// Core library for the Gantry dispatch framework
// Routing, handler chains, dependency injection, and the renderer boundary

pub mod app;
pub mod container;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod matcher;
pub mod negotiation;
pub mod registry;
pub mod render;
pub mod route;
pub mod status;

// Re-export commonly used types
pub use app::App;
pub use container::{DiObject, ServiceContainer, ServiceFactory, ServiceValue};
pub use error::Error;
pub use handler::{Context, Handler, HandlerFn};
pub use http::{Request, Response};
pub use matcher::{FieldValidator, IntoMatcher, RegexMatcher, RouteMatcher, Segment};
pub use negotiation::{Accept, MediaType};
pub use registry::{HandlerRegistry, RouteDef};
pub use render::{JsonRenderer, PlainRenderer, Renderer, Template, TextRenderer, Vars};
pub use route::{Route, RouteValidator};
pub use status::HttpStatus;
