//! `Ride`: a named workflow composed of segments, and the `FlowNode` tree
//! describing how it composes them.

use std::collections::HashMap;
use std::fmt;

use crate::segment::{CompleteHook, FailureHook, SegmentOverrides, SuccessHook};

/// The tree describing how a ride composes its segments.
#[derive(Debug, Clone)]
pub enum FlowNode {
    /// At least one child; imposes ordering between siblings (§4.1).
    Sequential { children: Vec<FlowNode> },
    /// No additional ordering is imposed between children. Empty is
    /// rejected by validation (`EmptyParallel`).
    Parallel { children: Vec<FlowNode> },
    /// A single segment reference with optional per-reference tweaks.
    Ref {
        segment_name: String,
        overrides: SegmentOverrides,
    },
}

impl FlowNode {
    pub fn sequential(children: Vec<FlowNode>) -> Self {
        FlowNode::Sequential { children }
    }

    pub fn parallel(children: Vec<FlowNode>) -> Self {
        FlowNode::Parallel { children }
    }

    pub fn reference(segment_name: impl Into<String>) -> Self {
        FlowNode::Ref {
            segment_name: segment_name.into(),
            overrides: SegmentOverrides::new(),
        }
    }

    pub fn reference_with_overrides(
        segment_name: impl Into<String>,
        overrides: SegmentOverrides,
    ) -> Self {
        FlowNode::Ref {
            segment_name: segment_name.into(),
            overrides,
        }
    }
}

/// A named workflow: the unit a user invokes.
#[derive(Clone)]
pub struct Ride {
    pub name: String,
    pub flow: FlowNode,
    pub environment: HashMap<String, String>,
    pub max_concurrency: Option<usize>,
    pub on_success: Option<SuccessHook>,
    pub on_failure: Option<FailureHook>,
    pub on_complete: Option<CompleteHook>,
}

impl fmt::Debug for Ride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ride")
            .field("name", &self.name)
            .field("flow", &self.flow)
            .field("environment", &self.environment)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl Ride {
    pub fn new(name: impl Into<String>, flow: FlowNode) -> Self {
        Self {
            name: name.into(),
            flow,
            environment: HashMap::new(),
            max_concurrency: None,
            on_success: None,
            on_failure: None,
            on_complete: None,
        }
    }

    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
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
}
