// Error types for the Gantry dispatch core

use crate::HttpStatus;
use thiserror::Error;

/// Errors that can escape the matching/dispatch machinery.
///
/// Structural and field-level match failures are not errors; they are
/// ordinary non-matches handled inside the route loop. Everything here
/// propagates until the outermost dispatch boundary converts it into a
/// 500 response.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed route template: {0}")]
    Matcher(String),

    #[error("missing build variable: {0}")]
    MissingBuildVar(String),

    #[error("handler not resolvable: {0}")]
    HandlerResolution(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service has unexpected type: {0}")]
    ServiceType(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status this error surfaces as when it reaches the
    /// top-level dispatch boundary. Match failures never become errors,
    /// so everything that does escape is a server-side fault.
    pub fn status(&self) -> HttpStatus {
        HttpStatus::InternalServerError
    }
}
