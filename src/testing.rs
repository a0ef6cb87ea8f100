//! Test stubs for exercising the pipeline without real services.
//!
//! Provides:
//! - [`MemoryService`]: an id-keyed in-memory service (direct completion)
//! - [`CallbackService`]: a service that settles through its [`Completion`]
//!   handle instead of returning a value
//! - [`RecordingHook`]: appends a label to a shared log when run
//!
//! Use these in tests instead of creating ad-hoc stub implementations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ServiceError;
use crate::hooks::hook::{Hook, HookContext, HookResult};
use crate::service::{Completion, MethodResult, Params, Service, Verb};

fn key_of(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An id-keyed in-memory service over [`Value`] records.
///
/// Implements all six verbs with direct (returned) completion. Counts
/// underlying invocations so tests can assert that a short-circuited call
/// never reached the service.
pub struct MemoryService {
    items: RwLock<BTreeMap<String, Value>>,
    next_id: AtomicU64,
    calls: AtomicU32,
}

impl MemoryService {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of times any verb reached the underlying store.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for MemoryService {
    async fn find(&self, _params: Params, _done: Completion) -> MethodResult {
        self.hit();
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(Some(Value::Array(items.values().cloned().collect())))
    }

    async fn get(&self, id: Value, _params: Params, _done: Completion) -> MethodResult {
        self.hit();
        let key = key_of(&id);
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        match items.get(&key) {
            Some(item) => Ok(Some(item.clone())),
            None => Err(ServiceError::NotFound { id: key }),
        }
    }

    async fn create(&self, mut data: Value, _params: Params, _done: Completion) -> MethodResult {
        self.hit();
        let id = match data.get("id") {
            Some(id) => id.clone(),
            None => {
                let id = json!(self.next_id.fetch_add(1, Ordering::Relaxed));
                data["id"] = id.clone();
                id
            }
        };
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_of(&id), data.clone());
        Ok(Some(data))
    }

    async fn update(
        &self,
        id: Value,
        mut data: Value,
        _params: Params,
        _done: Completion,
    ) -> MethodResult {
        self.hit();
        data["id"] = id.clone();
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_of(&id), data.clone());
        Ok(Some(data))
    }

    async fn patch(
        &self,
        id: Value,
        data: Value,
        _params: Params,
        _done: Completion,
    ) -> MethodResult {
        self.hit();
        let key = key_of(&id);
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let existing = items
            .get_mut(&key)
            .ok_or(ServiceError::NotFound { id: key })?;
        if let (Some(target), Some(patch)) = (existing.as_object_mut(), data.as_object()) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(Some(existing.clone()))
    }

    async fn remove(&self, id: Value, _params: Params, _done: Completion) -> MethodResult {
        self.hit();
        let key = key_of(&id);
        let removed = self
            .items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key)
            .ok_or(ServiceError::NotFound { id: key })?;
        Ok(Some(removed))
    }
}

/// A service that settles every call through its [`Completion`] handle from
/// a spawned task, exercising the callback-style convention end to end.
pub struct CallbackService {
    response: Value,
}

impl CallbackService {
    /// Create a service that answers every verb with `response`.
    pub fn new(response: Value) -> Self {
        Self { response }
    }
}

#[async_trait]
impl Service for CallbackService {
    fn methods(&self) -> Vec<Verb> {
        vec![Verb::Find, Verb::Get]
    }

    async fn find(&self, _params: Params, done: Completion) -> MethodResult {
        let response = self.response.clone();
        tokio::spawn(async move {
            done.resolve(response);
        });
        Ok(None)
    }

    async fn get(&self, id: Value, _params: Params, done: Completion) -> MethodResult {
        let mut response = self.response.clone();
        if let Some(obj) = response.as_object_mut() {
            obj.insert("id".to_string(), id);
        }
        done.resolve(response);
        Ok(None)
    }
}

struct RecordingHookInner {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Hook for RecordingHookInner {
    async fn run(&self, _ctx: HookContext) -> HookResult {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(self.label.clone());
        Ok(None)
    }
}

/// A hook that appends its label to a shared log, for asserting execution
/// order.
pub struct RecordingHook;

impl RecordingHook {
    /// Create a shared, initially empty log.
    pub fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// A hook that pushes `label` onto `log` each time it runs.
    pub fn new(label: impl Into<String>, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Hook> {
        Arc::new(RecordingHookInner {
            label: label.into(),
            log: Arc::clone(log),
        })
    }
}

/// Snapshot a recording log as plain strings.
pub fn recorded(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
