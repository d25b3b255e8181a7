// Dependency injection: lazily-invoked named services with two lifetimes

use crate::{App, Error};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A type-erased service instance.
pub type ServiceValue = Arc<dyn Any + Send + Sync>;

/// A service factory. Receives the owning app and the invocation
/// arguments, and produces the service instance.
pub type ServiceFactory = Arc<dyn Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync>;

/// A lazy value holder wrapping a service factory.
///
/// A `shared` object runs its factory at most once and returns the same
/// instance on every later invocation, regardless of arguments. An
/// on-demand object re-runs the factory on every invocation with the
/// arguments given.
pub struct DiObject {
    factory: ServiceFactory,
    shared: bool,
    cached: OnceCell<ServiceValue>,
}

impl DiObject {
    /// Create a holder with an explicit lifetime policy.
    pub fn new(factory: ServiceFactory, shared: bool) -> Self {
        Self {
            factory,
            shared,
            cached: OnceCell::new(),
        }
    }

    /// Create a memoize-once holder.
    pub fn shared(
        factory: impl Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(Arc::new(factory), true)
    }

    /// Create a recompute-every-call holder.
    pub fn demand(
        factory: impl Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(Arc::new(factory), false)
    }

    /// Whether this holder memoizes its first result.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Invoke the factory, honoring the lifetime policy.
    pub fn invoke(&self, app: &App, args: &[ServiceValue]) -> ServiceValue {
        if self.shared {
            self.cached
                .get_or_init(|| (self.factory)(app, args))
                .clone()
        } else {
            (self.factory)(app, args)
        }
    }
}

/// A named registry of [`DiObject`]s.
///
/// Lookup is explicit: `resolve` returns the holder, `invoke` runs it.
pub struct ServiceContainer {
    objects: RwLock<HashMap<String, Arc<DiObject>>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Register a shared (memoize-once) service.
    pub fn share(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync + 'static,
    ) {
        self.insert(name, DiObject::shared(factory));
    }

    /// Register an on-demand (recompute-every-call) service.
    pub fn demand(
        &self,
        name: impl Into<String>,
        factory: impl Fn(&App, &[ServiceValue]) -> ServiceValue + Send + Sync + 'static,
    ) {
        self.insert(name, DiObject::demand(factory));
    }

    /// Register a holder under a name, replacing any prior registration.
    pub fn insert(&self, name: impl Into<String>, object: DiObject) {
        let name = name.into();
        debug!(service = %name, shared = object.is_shared(), "registering service");
        self.objects.write().insert(name, Arc::new(object));
    }

    /// Resolve a holder by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<DiObject>, Error> {
        trace!(service = name, "resolving service");
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// Resolve and invoke a service in one step.
    pub fn invoke(&self, name: &str, app: &App, args: &[ServiceValue]) -> Result<ServiceValue, Error> {
        Ok(self.resolve(name)?.invoke(app, args))
    }

    /// Check whether a service is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.objects.read().contains_key(name)
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_shared_invokes_factory_once() {
        let app = App::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let object = DiObject::shared(move |_app, _args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(7usize) as ServiceValue
        });

        let first = object.invoke(&app, &[]);
        let second = object.invoke(&app, &[Arc::new(99usize) as ServiceValue]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_demand_reinvokes_factory() {
        let app = App::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let object = DiObject::demand(move |_app, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(args.len()) as ServiceValue
        });

        let first = object.invoke(&app, &[]);
        let second = object.invoke(&app, &[Arc::new(1usize) as ServiceValue]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*first.downcast::<usize>().unwrap(), 0);
        assert_eq!(*second.downcast::<usize>().unwrap(), 1);
    }

    #[test]
    fn test_container_resolve_unknown() {
        let container = ServiceContainer::new();
        assert!(matches!(
            container.resolve("missing"),
            Err(Error::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_container_replace_registration() {
        let app = App::new();
        let container = ServiceContainer::new();
        container.share("x", |_app, _args| Arc::new(1u32) as ServiceValue);
        container.share("x", |_app, _args| Arc::new(2u32) as ServiceValue);

        let value = container.invoke("x", &app, &[]).unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 2);
    }
}
