// Explicit handler registration: stable identities and declarative route tables
//
// Replaces runtime scanning/reflection: handlers are registered under
// stable string identities on the app, and route tables are plain data
// mounted in one call.

use crate::handler::{Context, HandlerFn};
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registry of handlers keyed by stable identity.
///
/// `Handler::Named` entries in route chains resolve here at dispatch
/// time. All routes naming the same identity share the one registered
/// entry, so a stateful handler can carry state between chain steps.
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under an identity, replacing any prior entry.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        f: impl Fn(&Context<'_>) -> Result<Option<String>, Error> + Send + Sync + 'static,
    ) -> &mut Self {
        let id = id.into();
        debug!(handler = %id, "registering handler");
        self.handlers.insert(id, Arc::new(f));
        self
    }

    /// Look up a handler by identity.
    pub fn get(&self, id: &str) -> Option<HandlerFn> {
        self.handlers.get(id).cloned()
    }

    /// Check whether an identity is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One row of a declarative route table.
///
/// Mounted with `App::mount_table`, producing the same registrations an
/// imperative `route` + `via` sequence would.
#[derive(Debug, Clone, Copy)]
pub struct RouteDef {
    /// Route name.
    pub name: &'static str,
    /// Segment template for the URL.
    pub pattern: &'static str,
    /// Optional comma-separated method allow-list.
    pub methods: Option<&'static str>,
    /// Identity of the handler in the app's registry.
    pub handler: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = HandlerRegistry::new();
        registry.register("pages.home", |_ctx| Ok(Some("home".to_string())));

        assert!(registry.contains("pages.home"));
        assert!(registry.get("pages.home").is_some());
        assert!(registry.get("pages.missing").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register("h", |_ctx| Ok(Some("first".to_string())));
        registry.register("h", |_ctx| Ok(Some("second".to_string())));

        let app = crate::App::new();
        let ctx_result = registry.get("h").unwrap()(&crate::handler::Context::new(&app));
        assert_eq!(ctx_result.unwrap().as_deref(), Some("second"));
    }
}
