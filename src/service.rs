//! The service trait, the closed verb set, and the completion adapter.
//!
//! A [`Service`] exposes up to six verbs (`find`, `get`, `create`, `update`,
//! `patch`, `remove`). Each verb method may finish in one of two ways:
//!
//! - **direct**: return `Ok(Some(value))` or `Err(error)`;
//! - **via the handle**: call [`Completion::resolve`] or
//!   [`Completion::reject`] and return `Ok(None)`.
//!
//! The [`dispatch`] adapter normalizes both into a single outcome, honoring
//! only the first settlement.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ServiceError;
use crate::trace::TraceLog;

/// The closed set of method names the pipeline intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl Verb {
    /// All verbs, in canonical order.
    pub const ALL: [Verb; 6] = [
        Verb::Find,
        Verb::Get,
        Verb::Create,
        Verb::Update,
        Verb::Patch,
        Verb::Remove,
    ];

    /// The lowercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Find => "find",
            Verb::Get => "get",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Remove => "remove",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find" => Ok(Verb::Find),
            "get" => Ok(Verb::Get),
            "create" => Ok(Verb::Create),
            "update" => Ok(Verb::Update),
            "patch" => Ok(Verb::Patch),
            "remove" => Ok(Verb::Remove),
            other => Err(ServiceError::InvalidParameters(format!(
                "unknown method name: {other}"
            ))),
        }
    }
}

/// Caller-supplied parameters for one call.
///
/// The trace marker slot is how an enclosing pipeline hands its trace log to
/// a nested call; the interceptor takes it out before any hook or service
/// method sees the params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Params {
    /// Free-form query object.
    pub query: Value,
    #[serde(skip)]
    pub(crate) trace: Option<Arc<TraceLog>>,
}

impl Params {
    /// Empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Params with a query object.
    pub fn with_query(query: Value) -> Self {
        Self {
            query,
            trace: None,
        }
    }

    pub(crate) fn take_trace(&mut self) -> Option<Arc<TraceLog>> {
        self.trace.take()
    }
}

/// Positional arguments for one verb call, reconstructed from the hook
/// context before the underlying method is invoked.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub id: Option<Value>,
    pub data: Option<Value>,
    pub params: Params,
}

/// Outcome of a settled method call.
pub type Outcome = Result<Value, ServiceError>;

/// What a service method returns: `Ok(Some(value))` or `Err(e)` for direct
/// completion, `Ok(None)` when the method settles (or will settle) through
/// its [`Completion`] handle instead.
pub type MethodResult = Result<Option<Value>, ServiceError>;

/// Settle-once completion handle handed to every service method.
///
/// Cloneable so a method can move it into a spawned task and settle later.
/// Only the first settlement is honored; subsequent calls are ignored.
#[derive(Debug, Clone)]
pub struct Completion {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Settle with a successful result. Returns false if already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns false if already settled.
    pub fn reject(&self, error: ServiceError) -> bool {
        self.settle(Err(error))
    }

    /// Whether a settlement has already been made.
    pub fn is_settled(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    fn settle(&self, outcome: Outcome) -> bool {
        let sender = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// A named service exposing the fixed verb set.
///
/// Default method bodies report [`ServiceError::MethodNotSupported`];
/// implementors override the verbs they provide and declare them in
/// [`methods`](Service::methods) so wrappers are only installed for methods
/// that exist.
#[async_trait]
pub trait Service: Send + Sync {
    /// The verbs this service implements.
    fn methods(&self) -> Vec<Verb> {
        Verb::ALL.to_vec()
    }

    async fn find(&self, _params: Params, _done: Completion) -> MethodResult {
        Err(ServiceError::MethodNotSupported { verb: Verb::Find })
    }

    async fn get(&self, _id: Value, _params: Params, _done: Completion) -> MethodResult {
        Err(ServiceError::MethodNotSupported { verb: Verb::Get })
    }

    async fn create(&self, _data: Value, _params: Params, _done: Completion) -> MethodResult {
        Err(ServiceError::MethodNotSupported { verb: Verb::Create })
    }

    async fn update(
        &self,
        _id: Value,
        _data: Value,
        _params: Params,
        _done: Completion,
    ) -> MethodResult {
        Err(ServiceError::MethodNotSupported { verb: Verb::Update })
    }

    async fn patch(
        &self,
        _id: Value,
        _data: Value,
        _params: Params,
        _done: Completion,
    ) -> MethodResult {
        Err(ServiceError::MethodNotSupported { verb: Verb::Patch })
    }

    async fn remove(&self, _id: Value, _params: Params, _done: Completion) -> MethodResult {
        Err(ServiceError::MethodNotSupported { verb: Verb::Remove })
    }
}

/// Invoke `verb` on `service`, normalizing both completion conventions.
///
/// A settlement delivered through the handle while the method ran wins over
/// the returned value, even when the return is an error. `Ok(None)` without
/// a settlement awaits the handle; if every clone of the handle was dropped
/// unsettled this reports [`ServiceError::Unsettled`] instead of pending
/// forever.
pub(crate) async fn dispatch(service: &dyn Service, verb: Verb, args: CallArgs) -> Outcome {
    let (done, mut rx) = Completion::channel();
    let CallArgs { id, data, params } = args;

    let returned = match verb {
        Verb::Find => service.find(params, done).await,
        Verb::Get => {
            let id = id.ok_or(ServiceError::MissingId { verb })?;
            service.get(id, params, done).await
        }
        Verb::Create => {
            let data = data.ok_or(ServiceError::MissingData { verb })?;
            service.create(data, params, done).await
        }
        Verb::Update => {
            let id = id.ok_or(ServiceError::MissingId { verb })?;
            let data = data.ok_or(ServiceError::MissingData { verb })?;
            service.update(id, data, params, done).await
        }
        Verb::Patch => {
            let id = id.ok_or(ServiceError::MissingId { verb })?;
            let data = data.ok_or(ServiceError::MissingData { verb })?;
            service.patch(id, data, params, done).await
        }
        Verb::Remove => {
            let id = id.ok_or(ServiceError::MissingId { verb })?;
            service.remove(id, params, done).await
        }
    };

    // First settlement wins. `try_recv` consumes the channel when it
    // observes `Closed`, so remember that instead of polling `rx` again.
    let early = match rx.try_recv() {
        Ok(outcome) => return outcome,
        Err(e) => e,
    };

    match returned? {
        Some(value) => Ok(value),
        None => match early {
            oneshot::error::TryRecvError::Closed => Err(ServiceError::Unsettled),
            oneshot::error::TryRecvError::Empty => {
                rx.await.map_err(|_| ServiceError::Unsettled)?
            }
        },
    }
}
