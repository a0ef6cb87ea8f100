//! The method interceptor: wraps a service's verbs with the hook pipeline.
//!
//! A [`ServiceHandle`] is created once per registered service. Each verb
//! entry point builds a fresh hook context, drives
//! `before → method → after` (diverting to `error` on any failure), and
//! records the call's lifecycle into its trace log.

use std::sync::Arc;

use serde_json::Value;

use crate::app::App;
use crate::error::{PipelineError, Result, ServiceError};
use crate::hooks::hook::{Hook, HookContext, Stage};
use crate::hooks::process::{run_chain, ChainFailure};
use crate::hooks::registry::{collect_hooks, HookMap};
use crate::service::{dispatch, CallArgs, Params, Service, Verb};
use crate::trace::{TraceHandle, TraceKind, TraceLog};

/// The merged, ordered hook sequences for one call, resolved up front so
/// hooks registered mid-flight do not alter a running pipeline.
struct HookPlan {
    before: Vec<Arc<dyn Hook>>,
    after: Vec<Arc<dyn Hook>>,
    error: Vec<Arc<dyn Hook>>,
}

impl HookPlan {
    fn build(app: &HookMap, service: &HookMap, verb: Verb) -> Self {
        Self {
            before: collect_hooks(app, service, Stage::Before, verb, false),
            after: collect_hooks(app, service, Stage::After, verb, true),
            error: collect_hooks(app, service, Stage::Error, verb, true),
        }
    }
}

/// A registered service wrapped with the hook pipeline.
///
/// External signature matches the underlying service verb for verb; the
/// wrapper owns the inner implementation by value, so invoking the real
/// method never depends on runtime shape inspection.
pub struct ServiceHandle {
    app: App,
    path: String,
    methods: Vec<Verb>,
    hooks: HookMap,
    inner: Arc<dyn Service>,
}

impl ServiceHandle {
    pub(crate) fn new(app: App, path: String, inner: Arc<dyn Service>) -> Self {
        Self {
            app,
            path,
            methods: inner.methods(),
            hooks: HookMap::new(),
            inner,
        }
    }

    /// The path this service is registered under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Service-level hook storage.
    pub fn hooks(&self) -> &HookMap {
        &self.hooks
    }

    /// Register a service-level before hook for one verb.
    pub fn before(&self, verb: Verb, hook: Arc<dyn Hook>) -> &Self {
        self.hooks.register(Stage::Before, Some(verb), hook);
        self
    }

    /// Register a service-level before hook for all verbs.
    pub fn before_all(&self, hook: Arc<dyn Hook>) -> &Self {
        self.hooks.register(Stage::Before, None, hook);
        self
    }

    /// Register a service-level after hook for one verb.
    pub fn after(&self, verb: Verb, hook: Arc<dyn Hook>) -> &Self {
        self.hooks.register(Stage::After, Some(verb), hook);
        self
    }

    /// Register a service-level after hook for all verbs.
    pub fn after_all(&self, hook: Arc<dyn Hook>) -> &Self {
        self.hooks.register(Stage::After, None, hook);
        self
    }

    /// Register a service-level error hook for one verb.
    pub fn on_error(&self, verb: Verb, hook: Arc<dyn Hook>) -> &Self {
        self.hooks.register(Stage::Error, Some(verb), hook);
        self
    }

    /// Register a service-level error hook for all verbs.
    pub fn on_error_all(&self, hook: Arc<dyn Hook>) -> &Self {
        self.hooks.register(Stage::Error, None, hook);
        self
    }

    pub async fn find(&self, params: Params) -> Result<Value> {
        self.execute(
            Verb::Find,
            CallArgs {
                params,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get(&self, id: Value, params: Params) -> Result<Value> {
        self.execute(
            Verb::Get,
            CallArgs {
                id: Some(id),
                data: None,
                params,
            },
        )
        .await
    }

    pub async fn create(&self, data: Value, params: Params) -> Result<Value> {
        self.execute(
            Verb::Create,
            CallArgs {
                id: None,
                data: Some(data),
                params,
            },
        )
        .await
    }

    pub async fn update(&self, id: Value, data: Value, params: Params) -> Result<Value> {
        self.execute(
            Verb::Update,
            CallArgs {
                id: Some(id),
                data: Some(data),
                params,
            },
        )
        .await
    }

    pub async fn patch(&self, id: Value, data: Value, params: Params) -> Result<Value> {
        self.execute(
            Verb::Patch,
            CallArgs {
                id: Some(id),
                data: Some(data),
                params,
            },
        )
        .await
    }

    pub async fn remove(&self, id: Value, params: Params) -> Result<Value> {
        self.execute(
            Verb::Remove,
            CallArgs {
                id: Some(id),
                data: None,
                params,
            },
        )
        .await
    }

    /// Run the full pipeline for one verb invocation.
    async fn execute(&self, verb: Verb, mut args: CallArgs) -> Result<Value> {
        if !self.methods.contains(&verb) {
            return Err(ServiceError::MethodNotSupported { verb }.into());
        }

        // Trace handoff: adopt an enclosing call's log or start a fresh one.
        // The marker is removed here so hooks and the method never see it.
        let trace = match args.params.take_trace() {
            Some(log) => TraceHandle::adopt(log),
            None => TraceHandle::fresh(),
        };

        let ctx = HookContext::new(verb, args, self.app.clone(), self.path.clone(), trace.clone());
        let plan = HookPlan::build(self.app.hooks(), &self.hooks, verb);

        trace.record(TraceKind::Push, &self.path, verb);
        let outcome = match self.run_stages(&plan, ctx).await {
            Ok(after_ctx) => Ok(after_ctx.result.unwrap_or(Value::Null)),
            Err(failure) => self.divert(&plan, failure).await,
        };
        trace.finish(&self.path, verb);
        outcome
    }

    /// Before chain, underlying method (unless short-circuited), after chain.
    async fn run_stages(
        &self,
        plan: &HookPlan,
        ctx: HookContext,
    ) -> std::result::Result<HookContext, ChainFailure> {
        let mut ctx = run_chain(&plan.before, ctx).await?;

        if ctx.result.is_none() {
            let args = ctx.make_args();
            ctx.trace().record(TraceKind::Call, &self.path, ctx.verb());
            match dispatch(self.inner.as_ref(), ctx.verb(), args).await {
                Ok(value) => ctx.result = Some(value),
                Err(error) => {
                    return Err(ChainFailure {
                        error: error.into(),
                        context: ctx,
                    });
                }
            }
        }

        run_chain(&plan.after, ctx.into_after()).await
    }

    /// Route a failure through the error chain. A result set by an error
    /// hook recovers the call; an error thrown by an error hook propagates
    /// unrecovered with no further interception.
    async fn divert(&self, plan: &HookPlan, failure: ChainFailure) -> Result<Value> {
        let fallback = failure.error.clone();
        let error_ctx = failure.context.into_error(failure.error);

        match run_chain(&plan.error, error_ctx).await {
            Ok(ctx) => match ctx.result {
                Some(value) => {
                    tracing::debug!(path = %self.path, "call recovered by error hook");
                    Ok(value)
                }
                None => Err(ctx.error.unwrap_or(fallback)),
            },
            Err(unrecovered) => {
                tracing::warn!(
                    path = %self.path,
                    error = %unrecovered.error,
                    "error hook failed; propagating unrecovered"
                );
                Err(unrecovered.error)
            }
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .finish()
    }
}

/// An app view carried by a hook context.
///
/// Service lookups through it return [`ScopedService`] handles that chain
/// the current trace log into any call made on them, so calls triggered
/// from within a hook join the same call tree.
#[derive(Debug, Clone)]
pub struct ScopedApp {
    app: App,
    trace: Arc<TraceLog>,
}

impl ScopedApp {
    pub(crate) fn new(app: App, trace: Arc<TraceLog>) -> Self {
        Self { app, trace }
    }

    /// Look up a registered service, scoped to the current trace.
    pub fn service(&self, path: &str) -> Result<ScopedService> {
        let handle = self
            .app
            .service(path)
            .ok_or_else(|| PipelineError::UnknownService(path.to_string()))?;
        Ok(ScopedService {
            handle,
            trace: Arc::clone(&self.trace),
        })
    }
}

/// A service handle bound to an enclosing call's trace log.
///
/// Every verb call through it re-injects the trace marker into the params,
/// so the nested pipeline adopts the log instead of starting a new one.
#[derive(Debug, Clone)]
pub struct ScopedService {
    handle: Arc<ServiceHandle>,
    trace: Arc<TraceLog>,
}

impl ScopedService {
    /// The path of the underlying service.
    pub fn path(&self) -> &str {
        self.handle.path()
    }

    fn scope(&self, mut params: Params) -> Params {
        params.trace = Some(Arc::clone(&self.trace));
        params
    }

    pub async fn find(&self, params: Params) -> Result<Value> {
        self.handle.find(self.scope(params)).await
    }

    pub async fn get(&self, id: Value, params: Params) -> Result<Value> {
        self.handle.get(id, self.scope(params)).await
    }

    pub async fn create(&self, data: Value, params: Params) -> Result<Value> {
        self.handle.create(data, self.scope(params)).await
    }

    pub async fn update(&self, id: Value, data: Value, params: Params) -> Result<Value> {
        self.handle.update(id, data, self.scope(params)).await
    }

    pub async fn patch(&self, id: Value, data: Value, params: Params) -> Result<Value> {
        self.handle.patch(id, data, self.scope(params)).await
    }

    pub async fn remove(&self, id: Value, params: Params) -> Result<Value> {
        self.handle.remove(id, self.scope(params)).await
    }
}
