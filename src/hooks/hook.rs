//! Core hook types: stages, the per-call context, and the hook trait.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::app::App;
use crate::error::PipelineError;
use crate::pipeline::{ScopedApp, ScopedService};
use crate::service::{CallArgs, Params, Verb};
use crate::trace::TraceHandle;

/// Pipeline stages a hook can be attached to.
///
/// A context only ever moves `Before → After` or `Before → Error`, driven by
/// the engine; hooks never change the stage themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Before,
    After,
    Error,
}

impl Stage {
    /// The lowercase stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Before => "before",
            Stage::After => "after",
            Stage::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-call record threaded through one pipeline execution.
///
/// Each hook receives its own clone and may return a modified clone to
/// replace the current context; the engine itself derives the after/error
/// variants by copy-and-update, so no context value is ever shared mutably
/// across an await point.
#[derive(Debug, Clone)]
pub struct HookContext {
    verb: Verb,
    stage: Stage,
    /// Entity id, present for `get`, `update`, `patch` and `remove`.
    pub id: Option<Value>,
    /// Payload, present for `create`, `update` and `patch`.
    pub data: Option<Value>,
    pub params: Params,
    /// Once set during the before chain, remaining before hooks and the
    /// underlying method call are skipped.
    pub result: Option<Value>,
    /// Populated on the error stage only. Error hooks may replace it; the
    /// final value becomes the caller's error unless a result is set.
    pub error: Option<PipelineError>,
    original: Option<Box<HookContext>>,
    path: String,
    app: App,
    trace: TraceHandle,
}

impl HookContext {
    pub(crate) fn new(
        verb: Verb,
        args: CallArgs,
        app: App,
        path: String,
        trace: TraceHandle,
    ) -> Self {
        Self {
            verb,
            stage: Stage::Before,
            id: args.id,
            data: args.data,
            params: args.params,
            result: None,
            error: None,
            original: None,
            path,
            app,
            trace,
        }
    }

    /// The verb being invoked.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The stage this context is in.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The path the service is registered under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// On the error stage, the context that was active when the failure
    /// occurred (its stage tells whether a before hook, the method, or an
    /// after hook failed).
    pub fn original(&self) -> Option<&HookContext> {
        self.original.as_deref()
    }

    /// The trace handle for this call.
    pub fn trace(&self) -> &TraceHandle {
        &self.trace
    }

    /// An app view whose service lookups chain the current trace into any
    /// call made on the returned handles.
    pub fn app(&self) -> ScopedApp {
        ScopedApp::new(self.app.clone(), Arc::clone(self.trace.log()))
    }

    /// The service this call targets, scoped so nested calls inherit the
    /// current trace.
    pub fn service(&self) -> crate::error::Result<ScopedService> {
        self.app().service(&self.path)
    }

    /// Rebuild the positional arguments from the (possibly hook-modified)
    /// context fields.
    pub(crate) fn make_args(&self) -> CallArgs {
        CallArgs {
            id: self.id.clone(),
            data: self.data.clone(),
            params: self.params.clone(),
        }
    }

    /// Derive the after-stage variant.
    pub(crate) fn into_after(mut self) -> Self {
        self.stage = Stage::After;
        self
    }

    /// Derive the error-stage variant, retaining the failing context as
    /// `original` for inspection by error hooks.
    pub(crate) fn into_error(self, error: PipelineError) -> Self {
        let original = self.clone();
        Self {
            stage: Stage::Error,
            result: None,
            error: Some(error),
            original: Some(Box::new(original)),
            ..self
        }
    }
}

/// What a hook returns: `Ok(None)` leaves the context unchanged,
/// `Ok(Some(ctx))` replaces it, `Err` diverts the call to the error chain.
///
/// The error type is [`PipelineError`] so a hook can propagate the failure
/// of a nested call with `?` as easily as its own
/// [`HookError`](crate::error::HookError).
pub type HookResult = Result<Option<HookContext>, PipelineError>;

/// A before/after/error interceptor attached to a verb (or all verbs).
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, ctx: HookContext) -> HookResult;
}

struct FnHook<F> {
    f: F,
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(HookContext) -> BoxFuture<'static, HookResult> + Send + Sync,
{
    async fn run(&self, ctx: HookContext) -> HookResult {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as a registrable hook.
///
/// ```no_run
/// use hookline::{hook_fn, App, Verb};
///
/// let app = App::new();
/// app.before(
///     Verb::Create,
///     hook_fn(|mut ctx| async move {
///         ctx.params.query["checked"] = serde_json::json!(true);
///         Ok(Some(ctx))
///     }),
/// );
/// ```
pub fn hook_fn<F, Fut>(f: F) -> Arc<dyn Hook>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HookResult> + Send + 'static,
{
    Arc::new(FnHook {
        f: move |ctx: HookContext| f(ctx).boxed(),
    })
}
