//! End-to-end pipeline behavior: ordering, short-circuit, error diversion
//! and recovery, trace inheritance across nested calls, and the dual
//! completion convention.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hookline::testing::{recorded, CallbackService, MemoryService, RecordingHook};
use hookline::{
    hook_fn, App, Completion, HookError, MethodResult, Params, PipelineError, Service,
    ServiceError, Stage, TraceKind, TraceLog, Verb,
};
use serde_json::{json, Value};

#[tokio::test]
async fn app_before_hooks_run_before_service_before_hooks() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let log = RecordingHook::log();

    app.before(Verb::Create, RecordingHook::new("A", &log));
    messages.before(Verb::Create, RecordingHook::new("B", &log));

    messages
        .create(json!({ "text": "hi" }), Params::new())
        .await
        .unwrap();

    assert_eq!(recorded(&log), vec!["A", "B"]);
}

#[tokio::test]
async fn after_hooks_run_service_first_app_last() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let log = RecordingHook::log();

    app.after(Verb::Find, RecordingHook::new("app-after", &log));
    messages.after(Verb::Find, RecordingHook::new("service-after", &log));

    messages.find(Params::new()).await.unwrap();

    assert_eq!(recorded(&log), vec!["service-after", "app-after"]);
}

#[tokio::test]
async fn wildcard_hooks_run_before_verb_specific_hooks() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let log = RecordingHook::log();

    messages.before(Verb::Find, RecordingHook::new("specific", &log));
    messages.before_all(RecordingHook::new("all", &log));

    messages.find(Params::new()).await.unwrap();

    assert_eq!(recorded(&log), vec!["all", "specific"]);
}

#[tokio::test]
async fn before_result_skips_method_but_after_chain_still_runs() {
    let app = App::new();
    let service = Arc::new(MemoryService::new());
    let messages = app.register("messages", service.clone());
    let log = RecordingHook::log();

    messages.before(
        Verb::Get,
        hook_fn(|mut ctx| async move {
            ctx.result = Some(json!({ "id": 1 }));
            Ok(Some(ctx))
        }),
    );
    messages.before(Verb::Get, RecordingHook::new("skipped-before", &log));
    messages.after(Verb::Get, RecordingHook::new("after", &log));

    let out = messages.get(json!(1), Params::new()).await.unwrap();

    assert_eq!(out, json!({ "id": 1 }));
    assert_eq!(service.calls(), 0);
    assert_eq!(recorded(&log), vec!["after"]);
}

#[tokio::test]
async fn after_hook_error_reaches_error_hooks_with_after_stage_original() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));

    messages.after(
        Verb::Create,
        hook_fn(|_ctx| async move { Err(HookError::failed("broken after").into()) }),
    );
    {
        let seen = Arc::clone(&seen);
        messages.on_error(
            Verb::Create,
            hook_fn(move |ctx| {
                let seen = Arc::clone(&seen);
                async move {
                    let original_stage = ctx.original().map(|o| o.stage());
                    let error = ctx.error.clone().map(|e| e.to_string());
                    seen.lock().unwrap().push((original_stage, error));
                    Ok(None)
                }
            }),
        );
    }

    let err = messages
        .create(json!({ "text": "hi" }), Params::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("broken after"));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Some(Stage::After));
    assert!(seen[0].1.as_deref().unwrap().contains("broken after"));
}

#[tokio::test]
async fn error_hook_result_recovers_a_rejection() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));

    messages.on_error(
        Verb::Get,
        hook_fn(|mut ctx| async move {
            if matches!(
                ctx.error,
                Some(PipelineError::Service(ServiceError::NotFound { .. }))
            ) {
                ctx.result = Some(json!([]));
            }
            Ok(Some(ctx))
        }),
    );

    let out = messages.get(json!(404), Params::new()).await.unwrap();
    assert_eq!(out, json!([]));
}

#[tokio::test]
async fn error_hook_may_replace_the_error() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));

    messages.on_error(
        Verb::Get,
        hook_fn(|mut ctx| async move {
            ctx.error = Some(PipelineError::Hook(HookError::rejected("rewritten")));
            Ok(Some(ctx))
        }),
    );

    let err = messages.get(json!(404), Params::new()).await.unwrap_err();
    assert!(err.to_string().contains("rewritten"));
}

#[tokio::test]
async fn failing_error_hook_propagates_unrecovered() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let log = RecordingHook::log();

    messages.on_error(
        Verb::Get,
        hook_fn(|_ctx| async move { Err(HookError::failed("error hook crashed").into()) }),
    );
    messages.on_error(Verb::Get, RecordingHook::new("unreached", &log));

    let err = messages.get(json!(404), Params::new()).await.unwrap_err();

    assert!(err.to_string().contains("error hook crashed"));
    assert!(recorded(&log).is_empty());
}

#[tokio::test]
async fn method_error_original_is_the_before_stage_context() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let seen = Arc::new(Mutex::new(None));

    {
        let seen = Arc::clone(&seen);
        messages.on_error_all(hook_fn(move |ctx| {
            let seen = Arc::clone(&seen);
            async move {
                *seen.lock().unwrap() = ctx.original().map(|o| o.stage());
                Ok(None)
            }
        }));
    }

    messages.get(json!(404), Params::new()).await.unwrap_err();
    assert_eq!(*seen.lock().unwrap(), Some(Stage::Before));
}

#[tokio::test]
async fn nested_call_shares_the_trace_log_and_is_inherited() {
    let app = App::new();
    app.register("messages", Arc::new(MemoryService::new()));
    let users = app.register("users", Arc::new(MemoryService::new()));

    let outer_log: Arc<Mutex<Option<Arc<TraceLog>>>> = Arc::new(Mutex::new(None));
    let child_inherited = Arc::new(Mutex::new(None));

    // The before hook on users.create writes an audit record through the
    // scoped app so the nested messages.create joins the same trace.
    {
        let outer_log = Arc::clone(&outer_log);
        users.before(
            Verb::Create,
            hook_fn(move |ctx| {
                let outer_log = Arc::clone(&outer_log);
                async move {
                    *outer_log.lock().unwrap() = Some(Arc::clone(ctx.trace().log()));
                    let messages = ctx.app().service("messages")?;
                    messages
                        .create(json!({ "audit": ctx.path() }), Params::new())
                        .await?;
                    Ok(None)
                }
            }),
        );
    }
    {
        let child_inherited = Arc::clone(&child_inherited);
        app.before(
            Verb::Create,
            hook_fn(move |ctx| {
                let child_inherited = Arc::clone(&child_inherited);
                async move {
                    if ctx.path() == "messages" {
                        *child_inherited.lock().unwrap() = Some(ctx.trace().inherited());
                    }
                    Ok(None)
                }
            }),
        );
    }

    users
        .create(json!({ "name": "ada" }), Params::new())
        .await
        .unwrap();

    assert_eq!(*child_inherited.lock().unwrap(), Some(true));

    let log = outer_log.lock().unwrap().clone().unwrap();
    let events: Vec<(TraceKind, String)> = log
        .events()
        .iter()
        .map(|e| (e.kind, e.path.clone()))
        .collect();
    assert_eq!(
        events,
        vec![
            (TraceKind::Push, "users".to_string()),
            (TraceKind::Push, "messages".to_string()),
            (TraceKind::Call, "messages".to_string()),
            (TraceKind::Pop, "messages".to_string()),
            (TraceKind::Call, "users".to_string()),
            (TraceKind::Pop, "users".to_string()),
        ]
    );
}

#[tokio::test]
async fn independent_calls_get_independent_trace_logs() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));
    let logs = Arc::new(Mutex::new(Vec::new()));

    {
        let logs = Arc::clone(&logs);
        messages.before_all(hook_fn(move |ctx| {
            let logs = Arc::clone(&logs);
            async move {
                logs.lock().unwrap().push(ctx.trace().log().id());
                assert!(!ctx.trace().inherited());
                Ok(None)
            }
        }));
    }

    messages.find(Params::new()).await.unwrap();
    messages.find(Params::new()).await.unwrap();

    let logs = logs.lock().unwrap();
    assert_eq!(logs.len(), 2);
    assert_ne!(logs[0], logs[1]);
}

#[tokio::test]
async fn handle_and_direct_completion_are_equivalent_to_hooks() {
    let app = App::new();
    let direct = app.register("direct", Arc::new(MemoryService::new()));
    let callback = app.register("callback", Arc::new(CallbackService::new(json!({}))));
    let seen = Arc::new(Mutex::new(Vec::new()));

    {
        let seen = Arc::clone(&seen);
        app.after(
            Verb::Get,
            hook_fn(move |ctx| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock()
                        .unwrap()
                        .push((ctx.stage(), ctx.result.clone().unwrap()["id"].clone()));
                    Ok(None)
                }
            }),
        );
    }

    direct
        .create(json!({ "id": 7, "text": "x" }), Params::new())
        .await
        .unwrap();
    let from_direct = direct.get(json!(7), Params::new()).await.unwrap();
    let from_callback = callback.get(json!(7), Params::new()).await.unwrap();

    assert_eq!(from_direct["id"], from_callback["id"]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (Stage::After, json!(7)));
    assert_eq!(seen[1], (Stage::After, json!(7)));
}

#[tokio::test]
async fn double_settlement_resolves_exactly_once_first_writer_wins() {
    struct BothWays;

    #[async_trait]
    impl Service for BothWays {
        async fn find(&self, _params: Params, done: Completion) -> MethodResult {
            done.resolve(json!("handle"));
            Ok(Some(json!("returned")))
        }
    }

    let app = App::new();
    let both = app.register("both", Arc::new(BothWays));
    let results = Arc::new(Mutex::new(Vec::new()));

    {
        let results = Arc::clone(&results);
        both.after(
            Verb::Find,
            hook_fn(move |ctx| {
                let results = Arc::clone(&results);
                async move {
                    results.lock().unwrap().push(ctx.result.clone());
                    Ok(None)
                }
            }),
        );
    }

    let out = both.find(Params::new()).await.unwrap();

    assert_eq!(out, json!("handle"));
    // The after chain ran exactly once, with the first settlement.
    assert_eq!(*results.lock().unwrap(), vec![Some(json!("handle"))]);
}

#[tokio::test]
async fn before_hooks_can_reshape_the_call() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));

    app.before(
        Verb::Create,
        hook_fn(|mut ctx| async move {
            if let Some(data) = ctx.data.as_mut() {
                data["stamped"] = json!(true);
            }
            Ok(Some(ctx))
        }),
    );

    let created = messages
        .create(json!({ "text": "hi" }), Params::new())
        .await
        .unwrap();
    assert_eq!(created["stamped"], json!(true));

    // The stored record reflects the hook-modified data, not the raw input.
    let fetched = messages
        .get(created["id"].clone(), Params::new())
        .await
        .unwrap();
    assert_eq!(fetched["stamped"], json!(true));
}

#[tokio::test]
async fn after_hooks_can_shape_the_result() {
    let app = App::new();
    let messages = app.register("messages", Arc::new(MemoryService::new()));

    messages
        .create(json!({ "id": 1, "text": "a", "secret": "s" }), Params::new())
        .await
        .unwrap();

    messages.after(
        Verb::Get,
        hook_fn(|mut ctx| async move {
            if let Some(Value::Object(obj)) = ctx.result.as_mut() {
                obj.remove("secret");
            }
            Ok(Some(ctx))
        }),
    );

    let out = messages.get(json!(1), Params::new()).await.unwrap();
    assert_eq!(out.get("secret"), None);
    assert_eq!(out["text"], json!("a"));
}
