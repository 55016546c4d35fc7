//! `Segment`: an immutable unit of work with a body, dependencies, and
//! artifact contract.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::context::ExecutionContext;
use crate::error::RuntimeError;

/// `condition` (optional predicate over `ExecutionContext` -> boolean;
/// absent ⇒ always run).
pub type Condition = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// The segment's effectful body.
pub type SegmentBody =
    Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>;

/// `onSuccess`/`onComplete`-style hook taking only the context.
pub type SuccessHook =
    Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>;

/// `onFailure` hook, additionally given the error that failed the segment.
pub type FailureHook = Arc<
    dyn Fn(ExecutionContext, RuntimeError) -> BoxFuture<'static, Result<(), RuntimeError>>
        + Send
        + Sync,
>;

/// `onComplete` hook, additionally given the final success flag.
pub type CompleteHook =
    Arc<dyn Fn(ExecutionContext, bool) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>;

/// An immutable unit of work. Identity is by `name`.
#[derive(Clone)]
pub struct Segment {
    pub name: String,
    pub description: Option<String>,
    pub depends_on: Vec<String>,
    pub condition: Option<Condition>,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_on: HashSet<String>,
    pub inputs: HashSet<String>,
    pub outputs: Vec<(String, PathBuf)>,
    pub body: SegmentBody,
    pub on_success: Option<SuccessHook>,
    pub on_failure: Option<FailureHook>,
    pub on_complete: Option<CompleteHook>,
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("depends_on", &self.depends_on)
            .field("has_condition", &self.condition.is_some())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_on", &self.retry_on)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl Segment {
    /// Construct a segment with a body and all other fields at their
    /// spec-defined default ("always run", no retries, no artifact contract).
    pub fn new(name: impl Into<String>, body: SegmentBody) -> Self {
        Self {
            name: name.into(),
            description: None,
            depends_on: dedupe_preserve_order(Vec::new()),
            condition: None,
            timeout: None,
            max_retries: 0,
            retry_delay: Duration::from_secs(0),
            retry_on: HashSet::new(),
            inputs: HashSet::new(),
            outputs: Vec::new(),
            body,
            on_success: None,
            on_failure: None,
            on_complete: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Duplicates are ignored (spec §3: "duplicates ignored").
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = dedupe_preserve_order(depends_on);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_retry_on(mut self, kinds: impl IntoIterator<Item = String>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = String>) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.outputs.push((name.into(), path.into()));
        self
    }

    pub fn with_on_success(mut self, hook: SuccessHook) -> Self {
        self.on_success = Some(hook);
        self
    }

    pub fn with_on_failure(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn with_on_complete(mut self, hook: CompleteHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    /// Whether `kind` is eligible for retry given this segment's `retry_on`
    /// set: empty set means "any non-cancellation failure" (spec §3/§4.2).
    pub fn retries_on(&self, kind: &str, retryable_by_default: bool) -> bool {
        if self.retry_on.is_empty() {
            retryable_by_default
        } else {
            self.retry_on.contains(kind)
        }
    }
}

/// Optional per-reference tweaks applied when a `FlowNode::Ref` is
/// materialized into an effective `Segment`.
#[derive(Debug, Clone)]
pub struct SegmentOverrides {
    pub extra_depends_on: Vec<String>,
    pub condition: Option<Condition>,
    pub timeout: Option<Duration>,
    pub enabled: bool,
}

impl Default for SegmentOverrides {
    /// `enabled: true` — a default-constructed override set must not
    /// silently disable the segment it's applied to.
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentOverrides {
    pub fn new() -> Self {
        Self {
            extra_depends_on: Vec::new(),
            condition: None,
            timeout: None,
            enabled: true,
        }
    }
}

/// Apply `overrides` to `source`, producing the effective segment the
/// scheduler will see. `source` is never mutated.
pub fn apply_overrides(source: &Segment, overrides: &SegmentOverrides) -> Segment {
    let mut effective = source.clone();

    let mut combined = source.depends_on.clone();
    combined.extend(overrides.extra_depends_on.iter().cloned());
    effective.depends_on = dedupe_preserve_order(combined);

    if !overrides.enabled {
        let always_false: Condition = Arc::new(|_ctx: &ExecutionContext| false);
        effective.condition = Some(always_false);
    } else if let Some(cond) = &overrides.condition {
        effective.condition = Some(cond.clone());
    }

    if let Some(timeout) = overrides.timeout {
        effective.timeout = Some(timeout);
    }

    effective
}

pub(crate) fn dedupe_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}
