//! Hook execution engine: the per-call context, per-target hook storage,
//! and the sequential chain runner.
//!
//! Hooks attach to one of three stages around every intercepted method call:
//!
//! - **before** — establish context top-down (app-level hooks first)
//! - **after** — unwind bottom-up (service-level hooks first)
//! - **error** — same unwind order, reached from any failure
//!
//! A before hook that sets `result` short-circuits the rest of the before
//! chain and the underlying method; an error hook that sets `result`
//! recovers the call.

pub mod hook;
pub(crate) mod process;
pub mod registry;

pub use hook::{hook_fn, Hook, HookContext, HookResult, Stage};
pub use registry::HookMap;
