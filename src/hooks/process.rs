//! Sequential hook chain execution.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::hooks::hook::{Hook, HookContext, Stage};

/// A chain aborted: the failing error plus the context that was active when
/// the failure occurred (retained as `original` on the error context).
pub(crate) struct ChainFailure {
    pub error: PipelineError,
    pub context: HookContext,
}

/// Run hooks strictly sequentially against a context.
///
/// Each hook receives a clone of the current context; `Ok(Some(ctx))`
/// replaces it, `Ok(None)` keeps it. During the before stage, a set
/// `result` short-circuits the remainder of the chain. Hook N+1 never
/// starts before hook N's outcome is known.
pub(crate) async fn run_chain(
    hooks: &[Arc<dyn Hook>],
    mut ctx: HookContext,
) -> Result<HookContext, ChainFailure> {
    for hook in hooks {
        if ctx.stage() == Stage::Before && ctx.result.is_some() {
            break;
        }
        match hook.run(ctx.clone()).await {
            Ok(Some(next)) => ctx = next,
            Ok(None) => {}
            Err(error) => {
                return Err(ChainFailure {
                    error,
                    context: ctx,
                });
            }
        }
    }
    Ok(ctx)
}
