//! The application object: a path-keyed service registry plus app-level
//! hooks.
//!
//! Registering a service applies the method interceptor exactly once — the
//! returned [`ServiceHandle`] is the wrapped service, and the same handle is
//! what [`App::service`] hands back for nested calls. There is no way to
//! re-wrap an already-wrapped service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::hooks::hook::{Hook, Stage};
use crate::hooks::registry::HookMap;
use crate::pipeline::ServiceHandle;
use crate::service::{Service, Verb};

struct AppInner {
    services: RwLock<HashMap<String, Arc<ServiceHandle>>>,
    hooks: HookMap,
}

/// The host application: named services plus app-level hooks that wrap
/// every service's calls.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Create an empty app with the hook capability installed.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppInner {
                services: RwLock::new(HashMap::new()),
                hooks: HookMap::new(),
            }),
        }
    }

    /// Register a service under a path, wrapping its declared verbs with the
    /// hook pipeline. Re-registering a path replaces the previous handle.
    pub fn register(&self, path: impl Into<String>, service: Arc<dyn Service>) -> Arc<ServiceHandle> {
        let path = path.into();
        let handle = Arc::new(ServiceHandle::new(self.clone(), path.clone(), service));
        self.inner
            .services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.clone(), Arc::clone(&handle));
        tracing::debug!(path = %path, "registered service");
        handle
    }

    /// Look up a registered service.
    pub fn service(&self, path: &str) -> Option<Arc<ServiceHandle>> {
        self.inner
            .services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// The paths of all registered services.
    pub fn paths(&self) -> Vec<String> {
        self.inner
            .services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// App-level hook storage.
    pub fn hooks(&self) -> &HookMap {
        &self.inner.hooks
    }

    /// Register an app-level before hook for one verb.
    pub fn before(&self, verb: Verb, hook: Arc<dyn Hook>) -> &Self {
        self.inner.hooks.register(Stage::Before, Some(verb), hook);
        self
    }

    /// Register an app-level before hook for all verbs.
    pub fn before_all(&self, hook: Arc<dyn Hook>) -> &Self {
        self.inner.hooks.register(Stage::Before, None, hook);
        self
    }

    /// Register an app-level after hook for one verb.
    pub fn after(&self, verb: Verb, hook: Arc<dyn Hook>) -> &Self {
        self.inner.hooks.register(Stage::After, Some(verb), hook);
        self
    }

    /// Register an app-level after hook for all verbs.
    pub fn after_all(&self, hook: Arc<dyn Hook>) -> &Self {
        self.inner.hooks.register(Stage::After, None, hook);
        self
    }

    /// Register an app-level error hook for one verb.
    pub fn on_error(&self, verb: Verb, hook: Arc<dyn Hook>) -> &Self {
        self.inner.hooks.register(Stage::Error, Some(verb), hook);
        self
    }

    /// Register an app-level error hook for all verbs.
    pub fn on_error_all(&self, hook: Arc<dyn Hook>) -> &Self {
        self.inner.hooks.register(Stage::Error, None, hook);
        self
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("services", &self.paths())
            .field("hooks", &self.hooks().count())
            .finish()
    }
}
