//! Lifecycle hook dispatch (spec §4.5).
//!
//! A failing hook is caught, logged, and never changes the owning
//! segment's/ride's recorded status — mirrored after
//! `role_orchestration::executor`'s pattern of catching executor errors
//! into a `warn!` without poisoning the overall batch result.

use std::time::Duration;

use kite_model::{CompleteHook, ExecutionContext, FailureHook, RuntimeError, SuccessHook};

use crate::obs;

pub async fn run_on_success(
    hook: Option<&SuccessHook>,
    ctx: &ExecutionContext,
    run_id: &str,
    owner: &str,
    grace: Duration,
) {
    let Some(hook) = hook else { return };
    guard(hook(ctx.clone()), grace, run_id, owner, "onSuccess").await;
}

pub async fn run_on_failure(
    hook: Option<&FailureHook>,
    ctx: &ExecutionContext,
    error: RuntimeError,
    run_id: &str,
    owner: &str,
    grace: Duration,
) {
    let Some(hook) = hook else { return };
    guard(hook(ctx.clone(), error), grace, run_id, owner, "onFailure").await;
}

pub async fn run_on_complete(
    hook: Option<&CompleteHook>,
    ctx: &ExecutionContext,
    success: bool,
    run_id: &str,
    owner: &str,
    grace: Duration,
) {
    let Some(hook) = hook else { return };
    guard(hook(ctx.clone(), success), grace, run_id, owner, "onComplete").await;
}

async fn guard(
    fut: impl std::future::Future<Output = Result<(), RuntimeError>>,
    grace: Duration,
    run_id: &str,
    owner: &str,
    hook_name: &str,
) {
    match tokio::time::timeout(grace, fut).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => obs::emit_hook_failure(run_id, owner, hook_name, &err),
        Err(_) => obs::emit_hook_failure(run_id, owner, hook_name, &"hook exceeded grace period"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use kite_model::{ArtifactAccess, CancellationSource, LogSink, ProcessOutput, ProcessRunner};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    struct NoopArtifacts;
    impl ArtifactAccess for NoopArtifacts {
        fn get(&self, _name: &str) -> Option<PathBuf> {
            None
        }
        fn has(&self, _name: &str) -> bool {
            false
        }
        fn list(&self) -> Vec<String> {
            Vec::new()
        }
        fn put(&self, _name: &str, _source: &Path) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    struct NoopLog;
    impl LogSink for NoopLog {
        fn write_line(&self, _message: &str) {}
    }

    struct NoopProcess;
    #[async_trait::async_trait]
    impl ProcessRunner for NoopProcess {
        async fn execute(
            &self,
            _command: &str,
            _args: &[String],
            _working_dir: &Path,
            _env: &HashMap<String, String>,
            _timeout: Option<Duration>,
            _cancel: kite_model::CancellationToken,
        ) -> Result<ProcessOutput, RuntimeError> {
            unimplemented!()
        }
    }

    fn test_ctx() -> ExecutionContext {
        let (_source, cancel) = CancellationSource::new();
        ExecutionContext::new(
            "main",
            "deadbeef",
            HashMap::new(),
            PathBuf::from("."),
            Arc::new(NoopArtifacts),
            Arc::new(NoopLog),
            Arc::new(NoopProcess),
            cancel,
            Arc::new(|_: &str| None),
            Arc::new(|_: &str, _: &str| {}),
        )
    }

    #[tokio::test]
    async fn failing_hook_is_swallowed() {
        let hook: SuccessHook = Arc::new(|_ctx| -> BoxFuture<'static, Result<(), RuntimeError>> {
            Box::pin(async {
                Err(RuntimeError::BodyFailure {
                    segment: "hook".to_string(),
                    message: "boom".to_string(),
                })
            })
        });
        run_on_success(Some(&hook), &test_ctx(), "run-1", "seg", Duration::from_secs(1)).await;
        // No panic, no propagated error: success.
    }

    #[tokio::test]
    async fn slow_hook_is_bounded_by_grace() {
        let ran = Arc::new(Mutex::new(false));
        let ran_clone = ran.clone();
        let hook: SuccessHook = Arc::new(move |_ctx| {
            let ran_clone = ran_clone.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                *ran_clone.lock().unwrap() = true;
                Ok(())
            })
        });
        run_on_success(Some(&hook), &test_ctx(), "run-1", "seg", Duration::from_millis(5)).await;
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn absent_hook_is_a_no_op() {
        run_on_complete(None, &test_ctx(), true, "run-1", "seg", Duration::from_secs(1)).await;
    }
}
