//! Per-target hook storage and the lookup/merge rules.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::hooks::hook::{Hook, Stage};
use crate::service::Verb;

/// Hook storage for one target (the app, or an individual service).
///
/// Three buckets (`before`, `after`, `error`), each keyed by verb or the
/// "all methods" wildcard (`None`). Registration is synchronous and
/// append-only; hooks run in registration order and there is no removal.
pub struct HookMap {
    hooks: RwLock<HashMap<(Stage, Option<Verb>), Vec<Arc<dyn Hook>>>>,
}

impl HookMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Append a hook for a stage, keyed by verb or the wildcard.
    pub fn register(&self, stage: Stage, verb: Option<Verb>, hook: Arc<dyn Hook>) {
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry((stage, verb))
            .or_default()
            .push(hook);
        tracing::debug!(stage = %stage, verb = ?verb.map(|v| v.as_str()), "registered hook");
    }

    /// Total number of registered hooks across all buckets.
    pub fn count(&self) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    /// The ordered hooks for one stage and verb: wildcard hooks first, then
    /// verb-specific, each in registration order.
    pub(crate) fn lookup(&self, stage: Stage, verb: Verb) -> Vec<Arc<dyn Hook>> {
        let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Arc<dyn Hook>> = hooks
            .get(&(stage, None))
            .map(|v| v.to_vec())
            .unwrap_or_default();
        if let Some(specific) = hooks.get(&(stage, Some(verb))) {
            out.extend(specific.iter().cloned());
        }
        out
    }
}

impl Default for HookMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMap").field("count", &self.count()).finish()
    }
}

/// Merge app-level and service-level hooks into one ordered sequence.
///
/// `before` runs app hooks first (outer policy establishes context top-down);
/// `after` and `error` reverse the order so service hooks unwind first and
/// app hooks last.
pub(crate) fn collect_hooks(
    app: &HookMap,
    service: &HookMap,
    stage: Stage,
    verb: Verb,
    app_last: bool,
) -> Vec<Arc<dyn Hook>> {
    let app_hooks = app.lookup(stage, verb);
    let service_hooks = service.lookup(stage, verb);
    if app_last {
        service_hooks.into_iter().chain(app_hooks).collect()
    } else {
        app_hooks.into_iter().chain(service_hooks).collect()
    }
}
