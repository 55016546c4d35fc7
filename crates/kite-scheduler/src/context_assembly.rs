//! Builds a fresh `ExecutionContext` per segment attempt: a per-attempt log
//! sink bound to the shared secret registry, a shared artifact store, and
//! the shared process runner. This is the "provided capability" wiring the
//! core treats as external (spec §6), done concretely here for
//! `kite-scheduler`'s own use and for the demo CLI.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use kite_artifacts::ArtifactStore;
use kite_model::{CancellationToken, ExecutionContext, ProcessRunner};
use kite_secrets::SecretRegistry;

use crate::sink::FileLogSink;

/// Holds the ride's shared collaborators, including the concrete
/// [`ArtifactStore`] handle (rather than the `ArtifactAccess` trait object
/// segment bodies see) so the scheduler and callers can drive manifest
/// restore/save directly.
#[derive(Clone)]
pub struct ContextAssembly {
    pub branch: String,
    pub commit_sha: String,
    pub environment: HashMap<String, String>,
    pub workspace: PathBuf,
    pub artifacts: Arc<ArtifactStore>,
    pub secrets: Arc<SecretRegistry>,
    pub process: Arc<dyn ProcessRunner>,
    pub logs_dir: PathBuf,
}

impl ContextAssembly {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        branch: impl Into<String>,
        commit_sha: impl Into<String>,
        environment: HashMap<String, String>,
        workspace: PathBuf,
        artifacts: Arc<ArtifactStore>,
        secrets: Arc<SecretRegistry>,
        process: Arc<dyn ProcessRunner>,
        logs_dir: PathBuf,
    ) -> Self {
        Self {
            branch: branch.into(),
            commit_sha: commit_sha.into(),
            environment,
            workspace,
            artifacts,
            secrets,
            process,
            logs_dir,
        }
    }

    /// Construct the `ExecutionContext` a single segment attempt runs with.
    /// A fresh log sink is opened (in append mode) per attempt; all other
    /// fields are shared.
    pub fn build_context(
        &self,
        segment_name: &str,
        cancel: CancellationToken,
    ) -> std::io::Result<ExecutionContext> {
        let logger = Arc::new(FileLogSink::open(&self.logs_dir, segment_name, self.secrets.clone())?);

        let environment_for_lookup = self.environment.clone();
        let secrets_lookup: Arc<dyn Fn(&str) -> Option<String> + Send + Sync> =
            Arc::new(move |key| environment_for_lookup.get(key).cloned());

        let secrets_for_register = self.secrets.clone();
        let register_secret: Arc<dyn Fn(&str, &str) + Send + Sync> =
            Arc::new(move |key, value| secrets_for_register.register(value, key));

        Ok(ExecutionContext::new(
            self.branch.clone(),
            self.commit_sha.clone(),
            self.environment.clone(),
            self.workspace.clone(),
            self.artifacts.clone(),
            logger,
            self.process.clone(),
            cancel,
            secrets_lookup,
            register_secret,
        ))
    }
}
