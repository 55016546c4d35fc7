//! A small built-in ride used by `kite run` and `kite graph`, standing in
//! for the out-of-scope script loader that would normally turn a ride
//! definition file into segments.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use kite_model::{ExecutionContext, FlowNode, Ride, RuntimeError, Segment, SegmentBody};

fn shell_body(command: &'static str, args: &'static [&'static str]) -> SegmentBody {
    Arc::new(move |ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            let output = ctx
                .process
                .execute(
                    command,
                    &args,
                    &ctx.workspace,
                    &std::collections::HashMap::new(),
                    Some(Duration::from_secs(30)),
                    ctx.cancel.clone(),
                )
                .await?;
            ctx.logger.write_line(&output.stdout);
            if output.exit_code != 0 {
                return Err(RuntimeError::BodyFailure {
                    segment: command.to_string(),
                    message: format!("exited with code {}", output.exit_code),
                });
            }
            Ok(())
        })
    })
}

fn write_artifact_body(relative_path: &'static str, contents: &'static str) -> SegmentBody {
    Arc::new(move |ctx: ExecutionContext| -> BoxFuture<'static, Result<(), RuntimeError>> {
        Box::pin(async move {
            ctx.write(relative_path, contents.as_bytes())
                .map_err(|e| RuntimeError::BodyFailure {
                    segment: relative_path.to_string(),
                    message: e.to_string(),
                })
        })
    })
}

/// `fetch -> [lint, unit_test] -> build -> package`, with `build` declaring
/// a `binary` artifact `package` consumes as a declared input.
pub fn sample_segments() -> Vec<Segment> {
    vec![
        Segment::new("fetch", shell_body("echo", &["fetching dependencies"]))
            .with_description("resolve and fetch dependencies"),
        Segment::new("lint", shell_body("echo", &["lint clean"]))
            .with_depends_on(vec!["fetch".to_string()]),
        Segment::new("unit_test", shell_body("echo", &["3 passed"]))
            .with_depends_on(vec!["fetch".to_string()]),
        Segment::new("build", write_artifact_body("dist/app.bin", "#!/bin/sh\necho hello\n"))
            .with_depends_on(vec!["lint".to_string(), "unit_test".to_string()])
            .with_output("binary", "dist/app.bin")
            .with_retries(2, Duration::from_millis(200)),
        Segment::new("package", shell_body("echo", &["packaged dist/app.bin"]))
            .with_depends_on(vec!["build".to_string()])
            .with_inputs(["binary".to_string()])
            .with_timeout(Duration::from_secs(10)),
    ]
}

pub fn sample_ride() -> Ride {
    Ride::new(
        "demo",
        FlowNode::sequential(vec![
            FlowNode::reference("fetch"),
            FlowNode::parallel(vec![FlowNode::reference("lint"), FlowNode::reference("unit_test")]),
            FlowNode::reference("build"),
            FlowNode::reference("package"),
        ]),
    )
    .with_max_concurrency(4)
}
