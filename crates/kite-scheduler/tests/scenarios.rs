//! End-to-end ride scenarios and universal invariants.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use kite_artifacts::ArtifactStore;
use kite_graph::Graph;
use kite_model::{
    CancellationSource, ExecutionContext, FlowNode, Ride, RuntimeError, Segment, SegmentBody, Status,
};
use kite_scheduler::{ContextAssembly, Scheduler, SchedulerConfig, TokioProcessRunner};
use kite_secrets::SecretRegistry;
use tempfile::tempdir;

fn ok_body() -> SegmentBody {
    Arc::new(|_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async { Ok(()) })
    })
}

fn failing_body(message: &'static str) -> SegmentBody {
    Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            Err(RuntimeError::BodyFailure {
                segment: "seg".to_string(),
                message: message.to_string(),
            })
        })
    })
}

fn sleeping_body(ms: u64) -> SegmentBody {
    Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        })
    })
}

struct Harness {
    workspace: tempfile::TempDir,
    assembly: ContextAssembly,
    scheduler: Scheduler,
}

fn harness(max_concurrency: usize) -> Harness {
    let workspace = tempdir().expect("tempdir");
    let artifacts_dir = workspace.path().join(".kite/artifacts");
    let logs_dir = workspace.path().join(".kite/logs");
    let store = ArtifactStore::new(&artifacts_dir).expect("artifact store");
    let secrets = Arc::new(SecretRegistry::new());
    let process = Arc::new(TokioProcessRunner::new(Duration::from_millis(200)));

    let assembly = ContextAssembly::new(
        "main",
        "deadbeef",
        HashMap::new(),
        workspace.path().to_path_buf(),
        Arc::new(store),
        secrets,
        process,
        logs_dir,
    );

    let config = SchedulerConfig {
        max_concurrency,
        hook_grace: Duration::from_millis(200),
        artifacts_dir,
        logs_dir: workspace.path().join(".kite/logs"),
    };

    Harness {
        workspace,
        assembly,
        scheduler: Scheduler::new(config),
    }
}

async fn run_ride(h: &Harness, segments: Vec<Segment>, ride: Ride) -> kite_model::RunResult {
    let outcome = Graph::build(&segments, &ride);
    assert!(outcome.is_valid(), "graph should be valid: {:?}", outcome.errors);
    let (_source, cancel) = CancellationSource::new();
    h.scheduler.run(&outcome.graph, &ride, &h.assembly, cancel).await
}

#[tokio::test]
async fn s1_linear_chain_runs_in_dependency_order() {
    let h = harness(4);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let make_body = |name: &'static str, order: Arc<std::sync::Mutex<Vec<String>>>| -> SegmentBody {
        Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
            let order = order.clone();
            Box::pin(async move {
                order.lock().unwrap().push(name.to_string());
                Ok(())
            })
        })
    };

    let segments = vec![
        Segment::new("a", make_body("a", order.clone())),
        Segment::new("b", make_body("b", order.clone())).with_depends_on(vec!["a".into()]),
        Segment::new("c", make_body("c", order.clone())).with_depends_on(vec!["b".into()]),
    ];
    let ride = Ride::new(
        "linear",
        FlowNode::sequential(vec![
            FlowNode::reference("a"),
            FlowNode::reference("b"),
            FlowNode::reference("c"),
        ]),
    );

    let result = run_ride(&h, segments, ride).await;
    assert!(result.success);
    assert_eq!(result.passed_count(), 3);
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn s2_parallel_segments_honor_the_concurrency_cap() {
    let h = harness(2);
    let in_flight = Arc::new(AtomicU32::new(0));
    let max_observed = Arc::new(AtomicU32::new(0));

    let make_body = |in_flight: Arc<AtomicU32>, max_observed: Arc<AtomicU32>| -> SegmentBody {
        Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            Box::pin(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
    };

    let segments: Vec<Segment> = (0..5)
        .map(|i| Segment::new(format!("p{i}"), make_body(in_flight.clone(), max_observed.clone())))
        .collect();
    let refs: Vec<FlowNode> = segments.iter().map(|s| FlowNode::reference(&s.name)).collect();
    let ride = Ride::new("fanout", FlowNode::parallel(refs));

    let result = run_ride(&h, segments, ride).await;
    assert!(result.success);
    assert_eq!(result.passed_count(), 5);
    assert!(max_observed.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn s3_failure_cascades_a_skip_to_dependents_only() {
    let h = harness(4);
    let segments = vec![
        Segment::new("build", failing_body("build broke")),
        Segment::new("test", ok_body()).with_depends_on(vec!["build".into()]),
        Segment::new("lint", ok_body()),
    ];
    let ride = Ride::new(
        "cascade",
        FlowNode::sequential(vec![
            FlowNode::parallel(vec![FlowNode::reference("build"), FlowNode::reference("lint")]),
            FlowNode::reference("test"),
        ]),
    );

    let result = run_ride(&h, segments, ride).await;
    assert!(!result.success);
    assert_eq!(result.results["build"].status, Status::Failure);
    assert_eq!(result.results["test"].status, Status::Skipped);
    assert_eq!(
        result.results["test"].error_kind.as_deref(),
        Some("UpstreamFailure")
    );
    assert_eq!(result.results["lint"].status, Status::Success);
}

#[tokio::test]
async fn s4_declared_output_flows_into_a_dependent_input() {
    let h = harness(4);
    let workspace = h.workspace.path().to_path_buf();

    let produce: SegmentBody = {
        let workspace = workspace.clone();
        Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
            let path = workspace.join("built.txt");
            Box::pin(async move {
                std::fs::write(&path, b"binary").unwrap();
                Ok(())
            })
        })
    };
    let consume: SegmentBody = Arc::new(|ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            assert!(ctx.artifacts.has("bin"));
            Ok(())
        })
    });

    let segments = vec![
        Segment::new("build", produce).with_output("bin", "built.txt"),
        Segment::new("deploy", consume)
            .with_depends_on(vec!["build".into()])
            .with_inputs(["bin".to_string()]),
    ];
    let ride = Ride::new(
        "pipeline",
        FlowNode::sequential(vec![FlowNode::reference("build"), FlowNode::reference("deploy")]),
    );

    let result = run_ride(&h, segments, ride).await;
    assert!(result.success);
    assert_eq!(result.results["deploy"].status, Status::Success);

    let manifest_path = h.workspace.path().join(".kite/artifacts/.manifest.json");
    let contents = std::fs::read_to_string(manifest_path).expect("manifest written");
    let manifest: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(manifest["artifacts"].as_object().unwrap().len(), 1);
    assert!(manifest["artifacts"]["bin"].is_object());
}

#[tokio::test]
async fn s5_secret_is_masked_out_of_every_log_line() {
    let h = harness(2);
    let body: SegmentBody = Arc::new(|ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            let token = ctx.secret("API_TOKEN").expect("token present");
            ctx.logger.write_line(&format!("using token {token}"));
            Ok(())
        })
    });

    let mut env = HashMap::new();
    env.insert("API_TOKEN".to_string(), "sk-supersecretvalue".to_string());

    let segments = vec![Segment::new("call", body)];
    let ride = Ride::new("masking", FlowNode::reference("call")).with_environment(env);

    let result = run_ride(&h, segments, ride).await;
    assert!(result.success);

    let log_path = h.workspace.path().join(".kite/logs/call.log");
    let contents = std::fs::read_to_string(log_path).expect("log file");
    assert!(!contents.contains("sk-supersecretvalue"));
    assert!(contents.contains("***"));
}

#[tokio::test]
async fn s6_cyclic_flow_is_rejected_before_any_segment_runs() {
    let segments = vec![
        Segment::new("a", ok_body()).with_depends_on(vec!["b".into()]),
        Segment::new("b", ok_body()).with_depends_on(vec!["a".into()]),
    ];
    let ride = Ride::new(
        "cyclic",
        FlowNode::sequential(vec![FlowNode::reference("a"), FlowNode::reference("b")]),
    );
    let outcome = Graph::build(&segments, &ride);
    assert!(!outcome.is_valid());
    assert!(outcome.errors.iter().any(|e| e.kind_tag() == "Cycle"));
}

#[tokio::test]
async fn empty_flow_runs_to_an_empty_successful_result() {
    let h = harness(2);
    let segments: Vec<Segment> = Vec::new();
    let ride = Ride::new("empty", FlowNode::parallel(vec![]));
    let outcome = Graph::build(&segments, &ride);
    // An empty top-level parallel is itself rejected (`EmptyParallel`); use
    // a degenerate sequential-of-nothing instead, which is legal.
    let ride = Ride::new("empty", FlowNode::sequential(vec![]));
    let outcome2 = Graph::build(&segments, &ride);
    assert!(outcome2.is_valid() || !outcome.is_valid());

    let (_source, cancel) = CancellationSource::new();
    let result = h.scheduler.run(&outcome2.graph, &ride, &h.assembly, cancel).await;
    assert!(result.success);
    assert_eq!(result.results.len(), 0);
}

#[tokio::test]
async fn max_retries_zero_runs_exactly_once() {
    let h = harness(2);
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();
    let body: SegmentBody = Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        let attempts = attempts_clone.clone();
        Box::pin(async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RuntimeError::BodyFailure {
                segment: "flaky".to_string(),
                message: "always fails".to_string(),
            })
        })
    });

    let segments = vec![Segment::new("flaky", body)];
    let ride = Ride::new("no-retry", FlowNode::reference("flaky"));
    let result = run_ride(&h, segments, ride).await;

    assert!(!result.success);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(result.results["flaky"].attempts, 1);
}

#[tokio::test]
async fn zero_timeout_fails_immediately_with_timeout_kind() {
    let h = harness(2);
    let segments = vec![Segment::new("slow", sleeping_body(200)).with_timeout(Duration::from_nanos(1))];
    let ride = Ride::new("zero-timeout", FlowNode::reference("slow"));
    let result = run_ride(&h, segments, ride).await;

    assert!(!result.success);
    assert_eq!(result.results["slow"].status, Status::TimedOut);
    assert_eq!(result.results["slow"].error_kind.as_deref(), Some("Timeout"));
}

#[tokio::test]
async fn missing_declared_input_fails_without_running_the_body() {
    // "missing" has a declared producer ("producer"), so the pre-run
    // MissingArtifact validation passes it; the producer's condition
    // skips it without ever writing the artifact, so the runtime check
    // right before "consumer" runs is what catches the absence.
    let h = harness(2);
    let never: kite_model::Condition = Arc::new(|_ctx: &ExecutionContext| false);
    let ran = Arc::new(AtomicU32::new(0));
    let ran_clone = ran.clone();
    let body: SegmentBody = Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        let ran = ran_clone.clone();
        Box::pin(async move {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    let segments = vec![
        Segment::new("producer", ok_body())
            .with_output("missing", "unused.txt")
            .with_condition(never),
        Segment::new("consumer", body)
            .with_depends_on(vec!["producer".into()])
            .with_inputs(["missing".to_string()]),
    ];
    let ride = Ride::new(
        "missing-input",
        FlowNode::sequential(vec![FlowNode::reference("producer"), FlowNode::reference("consumer")]),
    );
    let result = run_ride(&h, segments, ride).await;

    assert!(!result.success);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(result.results["producer"].status, Status::Skipped);
    assert_eq!(
        result.results["consumer"].error_kind.as_deref(),
        Some("MissingInput")
    );
}

#[tokio::test]
async fn cancelling_the_ride_skips_segments_in_levels_not_yet_started() {
    let h = harness(4);
    let segments = vec![
        Segment::new("first", sleeping_body(60)),
        Segment::new("second", ok_body()).with_depends_on(vec!["first".into()]),
    ];
    let ride = Ride::new(
        "cancel-me",
        FlowNode::sequential(vec![FlowNode::reference("first"), FlowNode::reference("second")]),
    );

    let outcome = Graph::build(&segments, &ride);
    let (source, cancel) = CancellationSource::new();
    source.cancel();

    let result = h.scheduler.run(&outcome.graph, &ride, &h.assembly, cancel).await;
    // Skipped never counts as failure, so a ride cancelled before any
    // segment started still reports success — only `error_kind` on the
    // individual results distinguishes this from an ordinary empty run.
    assert!(result.success);
    assert_eq!(result.results["first"].status, Status::Skipped);
    assert_eq!(result.results["first"].error_kind.as_deref(), Some("Cancelled"));
    assert_eq!(result.results["second"].status, Status::Skipped);
    assert_eq!(result.results["second"].error_kind.as_deref(), Some("Cancelled"));

    let _ = workspace_unused(&h);
}

fn workspace_unused(h: &Harness) -> PathBuf {
    h.workspace.path().to_path_buf()
}

#[tokio::test]
async fn missing_artifact_with_no_producer_fails_before_the_body_runs() {
    let h = harness(2);
    let ran = Arc::new(AtomicU32::new(0));
    let ran_clone = ran.clone();
    let body: SegmentBody = Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        let ran = ran_clone.clone();
        Box::pin(async move {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });

    let segments = vec![Segment::new("consumer", body).with_inputs(["absent".to_string()])];
    let ride = Ride::new("unresolvable", FlowNode::reference("consumer"));
    let result = run_ride(&h, segments, ride).await;

    assert!(!result.success);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(result.results["consumer"].status, Status::Failure);
    assert_eq!(
        result.results["consumer"].error_kind.as_deref(),
        Some("MissingArtifact")
    );
}

#[tokio::test]
async fn manifest_saved_by_one_run_satisfies_a_later_run_s_declared_input() {
    let h = harness(2);

    let produce: SegmentBody = {
        let workspace = h.workspace.path().to_path_buf();
        Arc::new(move |_ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
            let path = workspace.join("artifact.txt");
            Box::pin(async move {
                std::fs::write(&path, b"payload").unwrap();
                Ok(())
            })
        })
    };
    let first_segments = vec![Segment::new("build", produce).with_output("bin", "artifact.txt")];
    let first_ride = Ride::new("producer", FlowNode::reference("build"));
    let first_result = run_ride(&h, first_segments, first_ride).await;
    assert!(first_result.success);

    let consume: SegmentBody = Arc::new(|ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            assert!(ctx.artifacts.has("bin"));
            Ok(())
        })
    });
    let second_segments = vec![Segment::new("consumer", consume).with_inputs(["bin".to_string()])];
    let second_ride = Ride::new("consumer-only", FlowNode::reference("consumer"));
    let second_result = run_ride(&h, second_segments, second_ride).await;

    assert!(second_result.success);
    assert_eq!(second_result.results["consumer"].status, Status::Success);
}
