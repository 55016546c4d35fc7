//! Kite core value types: segments, rides, flow nodes, execution context,
//! and the result records the scheduler produces.

pub mod context;
pub mod error;
pub mod ride;
pub mod segment;
pub mod status;

pub use context::{
    ArtifactAccess, CancellationSource, CancellationToken, ExecutionContext, LogSink,
    ProcessOutput, ProcessRunner, CI_INDICATOR_VARS,
};
pub use error::{KiteError, KiteResult, RuntimeError, ValidationError};
pub use ride::{FlowNode, Ride};
pub use segment::{
    apply_overrides, Condition, CompleteHook, FailureHook, Segment, SegmentBody, SegmentOverrides,
    SuccessHook,
};
pub use status::{RunResult, SegmentResult, Status};
