//! Structured observability for ride execution, in the shape of
//! `aivcs_core::obs`: a run-scoped span guard plus flat `event = "..."`
//! emission functions at `info!`/`warn!`.

use tracing::{info, warn};

/// RAII guard for the `kite.ride` span entered for the duration of
/// `Scheduler::run`.
pub struct RideSpan {
    _span: tracing::span::EnteredSpan,
}

impl RideSpan {
    pub fn enter(ride_name: &str, run_id: &str) -> Self {
        let span = tracing::info_span!("kite.ride", ride = %ride_name, run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_ride_started(ride_name: &str, run_id: &str, segment_count: usize) {
    info!(event = "ride.started", ride = %ride_name, run_id = %run_id, segment_count);
}

pub fn emit_ride_finished(ride_name: &str, run_id: &str, success: bool, duration_ms: u64) {
    info!(event = "ride.finished", ride = %ride_name, run_id = %run_id, success, duration_ms);
}

pub fn emit_level_started(run_id: &str, level_index: usize, size: usize) {
    info!(event = "level.started", run_id = %run_id, level_index, size);
}

pub fn emit_level_finished(run_id: &str, level_index: usize) {
    info!(event = "level.finished", run_id = %run_id, level_index);
}

pub fn emit_segment_started(run_id: &str, segment: &str, attempt: u32) {
    info!(event = "segment.started", run_id = %run_id, segment = %segment, attempt);
}

pub fn emit_segment_succeeded(run_id: &str, segment: &str, duration_ms: u64) {
    info!(event = "segment.succeeded", run_id = %run_id, segment = %segment, duration_ms);
}

pub fn emit_segment_failed(run_id: &str, segment: &str, kind: &str) {
    warn!(event = "segment.failed", run_id = %run_id, segment = %segment, kind = %kind);
}

pub fn emit_segment_skipped(run_id: &str, segment: &str, reason: &str) {
    info!(event = "segment.skipped", run_id = %run_id, segment = %segment, reason = %reason);
}

pub fn emit_segment_timed_out(run_id: &str, segment: &str, timeout_ms: u64) {
    warn!(event = "segment.timed_out", run_id = %run_id, segment = %segment, timeout_ms);
}

pub fn emit_segment_retry(run_id: &str, segment: &str, attempt: u32, kind: &str) {
    warn!(event = "segment.retry", run_id = %run_id, segment = %segment, attempt, kind = %kind);
}

pub fn emit_hook_failure(run_id: &str, owner: &str, hook: &str, error: &dyn std::fmt::Display) {
    warn!(event = "hook.failed", run_id = %run_id, owner = %owner, hook = %hook, error = %error);
}

pub fn emit_manifest_restored(run_id: &str, count: usize) {
    info!(event = "manifest.restored", run_id = %run_id, count);
}

pub fn emit_manifest_save_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "manifest.save_failed", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ride_span_enter_does_not_panic() {
        let _span = RideSpan::enter("demo", "run-1");
    }
}
