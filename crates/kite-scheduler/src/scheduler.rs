//! Level-synchronized, concurrency-bounded `Scheduler` (spec §4.2).
//!
//! Grounded on `role_orchestration::executor::execute_roles_parallel`: a
//! `tokio::sync::Semaphore` bounds concurrent tasks, a `watch`-backed flag
//! propagates cancellation to siblings, and every task's outcome is folded
//! into a shared result collection after a join barrier — here, one barrier
//! per graph level rather than one for the whole batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kite_graph::Graph;
use kite_model::{
    CancellationToken, ExecutionContext, Ride, RunResult, RuntimeError, Segment, SegmentResult, Status,
    ValidationError,
};
use tokio::sync::Semaphore;

use crate::config::SchedulerConfig;
use crate::context_assembly::ContextAssembly;
use crate::hooks;
use crate::obs;

pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Execute every level of `graph` in order, honoring `ride`'s
    /// concurrency cap override if set, then run the ride's lifecycle
    /// hooks. `cancel` may be triggered externally from another task; the
    /// scheduler observes it at level boundaries and within each segment's
    /// timeout race.
    pub async fn run(
        &self,
        graph: &Graph,
        ride: &Ride,
        assembly: &ContextAssembly,
        cancel: CancellationToken,
    ) -> RunResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let _span = obs::RideSpan::enter(&ride.name, &run_id);
        let wall_clock_start = Instant::now();
        obs::emit_ride_started(&ride.name, &run_id, graph.segments().len());

        let mut assembly = assembly.clone();
        assembly.environment.extend(ride.environment.clone());

        let max_concurrency = ride.max_concurrency.unwrap_or(self.config.max_concurrency).max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrency));

        let restored = assembly.artifacts.restore_from_manifest();
        obs::emit_manifest_restored(&run_id, restored);
        let manifest_artifacts: HashSet<String> = assembly.artifacts.list().into_iter().collect();

        let mut results: HashMap<String, SegmentResult> = HashMap::new();
        for err in graph.validate_artifacts(&manifest_artifacts) {
            if let ValidationError::MissingArtifact { segment, artifact } = err {
                results.insert(
                    segment.clone(),
                    failure_result(
                        &segment,
                        "MissingArtifact",
                        &format!("required artifact '{artifact}' has no producer and is not present in the manifest"),
                    ),
                );
            }
        }

        let levels = graph.levels().unwrap_or_default();

        for (level_index, level) in levels.iter().enumerate() {
            obs::emit_level_started(&run_id, level_index, level.len());

            if cancel.is_cancelled() {
                for name in level {
                    results.entry(name.clone()).or_insert_with(|| {
                        skipped_result(name, "Cancelled", "ride cancelled before segment started")
                    });
                }
                obs::emit_level_finished(&run_id, level_index);
                continue;
            }

            let mut handles = Vec::new();

            for name in level {
                if results.contains_key(name) {
                    continue;
                }

                let segment = graph
                    .get(name)
                    .cloned()
                    .expect("materialized segment must be present in the graph");

                if let Some(blocking_dep) = cascading_skip_reason(&segment, &results) {
                    results.insert(
                        segment.name.clone(),
                        skipped_result(
                            &segment.name,
                            "UpstreamFailure",
                            &format!("skipped: predecessor '{blocking_dep}' did not succeed"),
                        ),
                    );
                    continue;
                }

                let permit = semaphore.clone().acquire_owned();
                let assembly = assembly.clone();
                let cancel_for_task = cancel.clone();
                let run_id = run_id.clone();
                let hook_grace = self.config.hook_grace;
                let max_retries = segment.max_retries;
                let retry_delay = segment.retry_delay;
                let segment_for_task = segment.clone();

                let handle = tokio::spawn(async move {
                    let _permit = permit.await.expect("semaphore never closes");
                    let ctx = match assembly.build_context(&segment_for_task.name, cancel_for_task) {
                        Ok(ctx) => ctx,
                        Err(e) => {
                            return (
                                segment_for_task.name.clone(),
                                failure_result(
                                    &segment_for_task.name,
                                    "BodyFailure",
                                    &format!("failed to open log sink: {e}"),
                                ),
                            )
                        }
                    };
                    let result = run_segment(&segment_for_task, &ctx, &run_id, hook_grace, max_retries, retry_delay)
                        .await;
                    (segment_for_task.name.clone(), result)
                });

                handles.push(handle);
            }

            for handle in handles {
                if let Ok((name, result)) = handle.await {
                    results.insert(name, result);
                }
            }

            obs::emit_level_finished(&run_id, level_index);
        }

        if let Err(e) = assembly.artifacts.save_manifest(ride.name.clone()) {
            obs::emit_manifest_save_failed(&run_id, &e);
        }

        let mut run_result = RunResult {
            results,
            success: true,
            duration_ms: wall_clock_start.elapsed().as_millis() as u64,
        };
        run_result.recompute_success();

        run_ride_hooks(ride, &assembly, &cancel, &run_id, self.config.hook_grace, run_result.success).await;

        obs::emit_ride_finished(&ride.name, &run_id, run_result.success, run_result.duration_ms);
        run_result
    }
}

/// Returns the name of the first predecessor whose status disqualifies
/// `segment` from running, if any (spec §4.2: "at least one predecessor
/// failed or timed out").
fn cascading_skip_reason(segment: &Segment, results: &HashMap<String, SegmentResult>) -> Option<String> {
    segment.depends_on.iter().find_map(|dep| {
        results.get(dep).and_then(|r| {
            if r.status.is_failure() {
                Some(dep.clone())
            } else {
                None
            }
        })
    })
}

async fn run_segment(
    segment: &Segment,
    ctx: &ExecutionContext,
    run_id: &str,
    hook_grace: Duration,
    max_retries: u32,
    retry_delay: Duration,
) -> SegmentResult {
    let started_at = Utc::now();
    let start = Instant::now();

    if let Some(condition) = &segment.condition {
        if !condition(ctx) {
            obs::emit_segment_skipped(run_id, &segment.name, "condition evaluated to false");
            hooks::run_on_complete(
                segment.on_complete.as_ref(),
                ctx,
                true,
                run_id,
                &segment.name,
                hook_grace,
            )
            .await;
            return SegmentResult {
                name: segment.name.clone(),
                status: Status::Skipped,
                started_at,
                duration_ms: start.elapsed().as_millis() as u64,
                attempts: 0,
                error_kind: None,
                error_message: Some("condition evaluated to false".to_string()),
                output: String::new(),
            };
        }
    }

    for input in &segment.inputs {
        if !ctx.artifacts.has(input) {
            let err = RuntimeError::MissingInput {
                segment: segment.name.clone(),
                artifact: input.clone(),
            };
            return finish_failure(segment, ctx, run_id, hook_grace, started_at, start, 0, err).await;
        }
    }

    let max_attempts = max_retries + 1;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        obs::emit_segment_started(run_id, &segment.name, attempt);

        let body_result = race_with_timeout(segment, ctx).await;

        match body_result {
            Ok(()) => {
                return finish_success(segment, ctx, run_id, hook_grace, started_at, start, attempt).await;
            }
            Err(err) => {
                let kind = err.kind_tag();
                let retry_eligible = segment.retries_on(kind, err.retryable_by_default());
                if retry_eligible && attempt < max_attempts {
                    obs::emit_segment_retry(run_id, &segment.name, attempt, kind);
                    if !retry_delay.is_zero() {
                        tokio::time::sleep(retry_delay).await;
                    }
                    continue;
                }
                return finish_failure(segment, ctx, run_id, hook_grace, started_at, start, attempt, err).await;
            }
        }
    }
}

/// Races the segment body against its `timeout`, if any. Losing the race
/// drops the body future, which cooperatively cancels any in-flight I/O
/// (and, transitively, any child process spawned through the process
/// runner, which kills its child on drop).
async fn race_with_timeout(segment: &Segment, ctx: &ExecutionContext) -> Result<(), RuntimeError> {
    let body_future = (segment.body)(ctx.clone());
    let cancel = ctx.cancel.clone();

    match segment.timeout {
        Some(timeout) => {
            tokio::select! {
                result = body_future => result,
                _ = tokio::time::sleep(timeout) => Err(RuntimeError::Timeout {
                    segment: segment.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
                _ = cancel.cancelled() => Err(RuntimeError::Cancelled { segment: segment.name.clone() }),
            }
        }
        None => {
            tokio::select! {
                result = body_future => result,
                _ = cancel.cancelled() => Err(RuntimeError::Cancelled { segment: segment.name.clone() }),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn finish_success(
    segment: &Segment,
    ctx: &ExecutionContext,
    run_id: &str,
    hook_grace: Duration,
    started_at: chrono::DateTime<Utc>,
    start: Instant,
    attempts: u32,
) -> SegmentResult {
    for (name, path) in &segment.outputs {
        let resolved = if path.is_absolute() {
            path.clone()
        } else {
            ctx.workspace.join(path)
        };
        if !resolved.exists() {
            let err = RuntimeError::MissingOutput {
                segment: segment.name.clone(),
                artifact: name.clone(),
                path: path.display().to_string(),
            };
            return finish_failure(segment, ctx, run_id, hook_grace, started_at, start, attempts, err).await;
        }
        if let Err(e) = ctx.artifacts.put(name, &resolved) {
            return finish_failure(segment, ctx, run_id, hook_grace, started_at, start, attempts, e).await;
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    obs::emit_segment_succeeded(run_id, &segment.name, duration_ms);
    hooks::run_on_success(segment.on_success.as_ref(), ctx, run_id, &segment.name, hook_grace).await;
    hooks::run_on_complete(segment.on_complete.as_ref(), ctx, true, run_id, &segment.name, hook_grace).await;

    SegmentResult {
        name: segment.name.clone(),
        status: Status::Success,
        started_at,
        duration_ms,
        attempts,
        error_kind: None,
        error_message: None,
        output: String::new(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn finish_failure(
    segment: &Segment,
    ctx: &ExecutionContext,
    run_id: &str,
    hook_grace: Duration,
    started_at: chrono::DateTime<Utc>,
    start: Instant,
    attempts: u32,
    err: RuntimeError,
) -> SegmentResult {
    let status = if matches!(err, RuntimeError::Timeout { .. }) {
        Status::TimedOut
    } else {
        Status::Failure
    };
    obs::emit_segment_failed(run_id, &segment.name, err.kind_tag());
    if status == Status::TimedOut {
        obs::emit_segment_timed_out(
            run_id,
            &segment.name,
            segment.timeout.map(|d| d.as_millis() as u64).unwrap_or(0),
        );
    }

    hooks::run_on_failure(
        segment.on_failure.as_ref(),
        ctx,
        err.clone(),
        run_id,
        &segment.name,
        hook_grace,
    )
    .await;
    hooks::run_on_complete(segment.on_complete.as_ref(), ctx, false, run_id, &segment.name, hook_grace).await;

    SegmentResult {
        name: segment.name.clone(),
        status,
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
        attempts,
        error_kind: Some(err.kind_tag().to_string()),
        error_message: Some(err.to_string()),
        output: String::new(),
    }
}

fn skipped_result(name: &str, kind: &str, message: &str) -> SegmentResult {
    SegmentResult {
        name: name.to_string(),
        status: Status::Skipped,
        started_at: Utc::now(),
        duration_ms: 0,
        attempts: 0,
        error_kind: Some(kind.to_string()),
        error_message: Some(message.to_string()),
        output: String::new(),
    }
}

fn failure_result(name: &str, kind: &str, message: &str) -> SegmentResult {
    SegmentResult {
        name: name.to_string(),
        status: Status::Failure,
        started_at: Utc::now(),
        duration_ms: 0,
        attempts: 0,
        error_kind: Some(kind.to_string()),
        error_message: Some(message.to_string()),
        output: String::new(),
    }
}

async fn run_ride_hooks(
    ride: &Ride,
    assembly: &ContextAssembly,
    cancel: &CancellationToken,
    run_id: &str,
    hook_grace: Duration,
    success: bool,
) {
    let ctx = match assembly.build_context(&format!("ride:{}", ride.name), cancel.clone()) {
        Ok(ctx) => ctx,
        Err(_) => return,
    };

    if success {
        hooks::run_on_success(ride.on_success.as_ref(), &ctx, run_id, &ride.name, hook_grace).await;
    } else {
        let err = RuntimeError::BodyFailure {
            segment: ride.name.clone(),
            message: "one or more segments failed".to_string(),
        };
        hooks::run_on_failure(ride.on_failure.as_ref(), &ctx, err, run_id, &ride.name, hook_grace).await;
    }
    hooks::run_on_complete(ride.on_complete.as_ref(), &ctx, success, run_id, &ride.name, hook_grace).await;
}
