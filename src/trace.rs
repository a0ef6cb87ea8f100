//! Per-call trace logs shared across nested pipeline executions.
//!
//! A [`TraceLog`] is created once per outermost wrapped call and records
//! ordered lifecycle events (`push`, `call`, `pop`) with elapsed time. Calls
//! made from inside a hook through the scoped service handles reuse the same
//! log by reference, so one outer call and all of its descendants form a
//! single ordered event stack.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::service::Verb;

/// Environment variable that enables the per-call trace dump.
pub const TRACE_ENV_VAR: &str = "HOOKLINE_TRACE";

/// Lifecycle points recorded into a trace log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// A pipeline was entered.
    Push,
    /// The underlying service method was invoked.
    Call,
    /// A pipeline is about to resolve or reject.
    Pop,
}

impl TraceKind {
    /// The lowercase event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceKind::Push => "push",
            TraceKind::Call => "call",
            TraceKind::Pop => "pop",
        }
    }
}

impl std::fmt::Display for TraceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded lifecycle event.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceKind,
    /// Path of the service the event belongs to.
    pub path: String,
    pub verb: Verb,
    /// Time since the log was created.
    pub elapsed: Duration,
}

/// Append-only event log for one outermost call and its nested descendants.
///
/// Shared by `Arc`; never copied. The stack mutex is held only for the push,
/// so concurrent stages of one call tree interleave their events in real
/// append order.
pub struct TraceLog {
    id: Uuid,
    start: Instant,
    stack: Mutex<Vec<TraceEvent>>,
}

impl TraceLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            start: Instant::now(),
            stack: Mutex::new(Vec::new()),
        })
    }

    /// Unique id of this call tree.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the recorded events, in append order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.stack
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn record(&self, kind: TraceKind, path: &str, verb: Verb) {
        let event = TraceEvent {
            kind,
            path: path.to_string(),
            verb,
            elapsed: self.start.elapsed(),
        };
        self.stack
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl std::fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLog")
            .field("id", &self.id)
            .field("events", &self.events().len())
            .finish()
    }
}

/// One pipeline execution's view of a [`TraceLog`].
///
/// `inherited` is true when the log was adopted from an enclosing call;
/// only the outermost (non-inherited) handle dumps the log on completion.
#[derive(Debug, Clone)]
pub struct TraceHandle {
    log: Arc<TraceLog>,
    inherited: bool,
}

impl TraceHandle {
    /// Create a fresh log for an outermost call.
    pub(crate) fn fresh() -> Self {
        Self {
            log: TraceLog::new(),
            inherited: false,
        }
    }

    /// Adopt the log of an enclosing call.
    pub(crate) fn adopt(log: Arc<TraceLog>) -> Self {
        Self {
            log,
            inherited: true,
        }
    }

    /// Whether this log was propagated in from an enclosing call.
    pub fn inherited(&self) -> bool {
        self.inherited
    }

    /// The shared event log.
    pub fn log(&self) -> &Arc<TraceLog> {
        &self.log
    }

    pub(crate) fn record(&self, kind: TraceKind, path: &str, verb: Verb) {
        self.log.record(kind, path, verb);
    }

    /// Record the final `pop` event and, for the outermost call, emit the
    /// collected stack when tracing is enabled.
    pub(crate) fn finish(&self, path: &str, verb: Verb) {
        self.record(TraceKind::Pop, path, verb);
        if !self.inherited && trace_enabled() {
            dump(&self.log);
        }
    }
}

/// Whether `HOOKLINE_TRACE` is set. Checked once per process.
fn trace_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os(TRACE_ENV_VAR).is_some_and(|v| !v.is_empty()))
}

/// Print the full ordered event stack to stderr. Best-effort diagnostics,
/// not a stable format.
fn dump(log: &TraceLog) {
    let events = log.events();
    eprintln!("-------------- trace {}", log.id);
    for event in &events {
        eprintln!(
            "{} {}.{} {:.6}s",
            event.kind,
            event.path,
            event.verb,
            event.elapsed.as_secs_f64()
        );
    }
    eprintln!("==============");
    tracing::debug!(trace_id = %log.id, events = events.len(), "call trace complete");
}
