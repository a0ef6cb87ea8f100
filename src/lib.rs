//! hookline — ordered before/after/error hook pipelines around service
//! method calls.
//!
//! Independent behaviors (validation, auth, logging, data shaping) attach to
//! a fixed verb set (`find`, `get`, `create`, `update`, `patch`, `remove`)
//! on many services without modifying the services themselves.
//!
//! # Architecture
//!
//! ```text
//! caller ──► ServiceHandle (per-verb wrapper)
//!              │  build HookContext, adopt or create TraceLog
//!              ├─► before hooks   (app-level first, then service-level)
//!              ├─► underlying method   (skipped if a before hook set result)
//!              ├─► after hooks    (service-level first, then app-level)
//!              ▼
//!            result ── any failure diverts to ─► error hooks (may recover)
//! ```
//!
//! Hooks run strictly sequentially; a hook may pass the context through,
//! replace it with a modified clone, or fail. Calls made from inside a hook
//! through [`HookContext::service`] or [`HookContext::app`] share the outer
//! call's trace log, so one logical request forms a single ordered event
//! stack — set `HOOKLINE_TRACE` to dump it per outermost call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hookline::{hook_fn, App, Params, Verb};
//! use hookline::testing::MemoryService;
//! use serde_json::json;
//!
//! # async fn demo() -> hookline::Result<()> {
//! let app = App::new();
//! let messages = app.register("messages", Arc::new(MemoryService::new()));
//!
//! app.before(
//!     Verb::Create,
//!     hook_fn(|mut ctx| async move {
//!         if let Some(data) = ctx.data.as_mut() {
//!             data["audited"] = json!(true);
//!         }
//!         Ok(Some(ctx))
//!     }),
//! );
//!
//! let created = messages.create(json!({ "text": "hi" }), Params::new()).await?;
//! assert_eq!(created["audited"], json!(true));
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod service;
pub mod testing;
pub mod trace;

pub use app::App;
pub use error::{HookError, PipelineError, Result, ServiceError};
pub use hooks::{hook_fn, Hook, HookContext, HookMap, HookResult, Stage};
pub use pipeline::{ScopedApp, ScopedService, ServiceHandle};
pub use service::{CallArgs, Completion, MethodResult, Params, Service, Verb};
pub use trace::{TraceEvent, TraceHandle, TraceKind, TraceLog};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::app::App;
    pub use crate::error::{HookError, PipelineError, Result, ServiceError};
    pub use crate::hooks::{hook_fn, Hook, HookContext, Stage};
    pub use crate::service::{Completion, MethodResult, Params, Service, Verb};
}
