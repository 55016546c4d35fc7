//! `ExecutionContext` and the capability traits segment bodies are given
//! access to. Concrete implementations (artifact store, log sink, process
//! runner) live in downstream crates; this crate only defines the seams,
//! treating storage and recording as traits consumed by domain logic
//! rather than concrete types baked in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::RuntimeError;

/// Fixed set of CI indicator variables used to compute `ExecutionContext::is_ci`.
pub const CI_INDICATOR_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_HOME",
    "CIRCLECI",
    "TRAVIS",
    "BUILDKITE",
    "TEAMCITY_VERSION",
];

/// Handle to the ride-scoped artifact store, as seen by segment bodies and
/// the scheduler. Implemented concretely by `kite-artifacts::ArtifactStore`.
pub trait ArtifactAccess: Send + Sync {
    fn get(&self, name: &str) -> Option<PathBuf>;
    fn has(&self, name: &str) -> bool;
    fn list(&self) -> Vec<String>;
    /// Copy `source` (file or directory) under the store as `name`,
    /// replacing any existing entry, then register it.
    fn put(&self, name: &str, source: &Path) -> Result<(), RuntimeError>;
}

/// Per-segment log sink. Implemented concretely by `kite-scheduler`'s
/// file-backed sink, which masks text through the secret registry before
/// writing.
pub trait LogSink: Send + Sync {
    fn write_line(&self, message: &str);
}

/// Result of running an external program to completion (or until
/// cancelled/timed out), per the "provided capability" contract of spec §6.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// The embedded process runner the core treats as an external collaborator:
/// "run an external program with timeout, capture stdout+stderr, return exit
/// code". Implementations must honor `CancellationToken`.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn execute(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
        timeout: Option<std::time::Duration>,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, RuntimeError>;
}

/// Cooperative cancellation token threaded into segment bodies and every
/// capability they call (process runner, sleeps, I/O waits), per spec §9's
/// "task/thread + channel model" note for languages without first-class
/// coroutine cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled. Safe to race against a
    /// timeout or the segment body's own future via `tokio::select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owning half of a [`CancellationToken`]; held by the scheduler.
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> (Self, CancellationToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationToken { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn child_token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Presented to segment bodies, hooks, and conditions. Shared read-only by
/// all concurrently running segments in a ride, except for `artifacts`
/// (thread-safe by construction) and `logger` (rebound per segment/attempt
/// via [`ExecutionContext::with_logger`]).
#[derive(Clone)]
pub struct ExecutionContext {
    pub branch: String,
    pub commit_sha: String,
    environment: Arc<HashMap<String, String>>,
    pub workspace: PathBuf,
    pub artifacts: Arc<dyn ArtifactAccess>,
    pub logger: Arc<dyn LogSink>,
    pub process: Arc<dyn ProcessRunner>,
    pub cancel: CancellationToken,
    secrets: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
    register_secret: Arc<dyn Fn(&str, &str) + Send + Sync>,
    is_ci: bool,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        branch: impl Into<String>,
        commit_sha: impl Into<String>,
        environment: HashMap<String, String>,
        workspace: PathBuf,
        artifacts: Arc<dyn ArtifactAccess>,
        logger: Arc<dyn LogSink>,
        process: Arc<dyn ProcessRunner>,
        cancel: CancellationToken,
        secrets: Arc<dyn Fn(&str) -> Option<String> + Send + Sync>,
        register_secret: Arc<dyn Fn(&str, &str) + Send + Sync>,
    ) -> Self {
        let is_ci = CI_INDICATOR_VARS.iter().any(|k| environment.contains_key(*k));
        Self {
            branch: branch.into(),
            commit_sha: commit_sha.into(),
            environment: Arc::new(environment),
            workspace,
            artifacts,
            logger,
            process,
            cancel,
            secrets,
            register_secret,
            is_ci,
        }
    }

    /// Rebind the logger to a per-segment/per-attempt sub-sink, keeping
    /// every other field shared.
    pub fn with_logger(&self, logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            ..self.clone()
        }
    }

    pub fn is_ci(&self) -> bool {
        self.is_ci
    }

    pub fn env(&self, key: &str) -> Option<String> {
        self.environment.get(key).cloned()
    }

    pub fn require_env(&self, key: &str) -> Result<String, RuntimeError> {
        self.env(key).ok_or_else(|| RuntimeError::missing_env(key))
    }

    pub fn env_or_default(&self, key: &str, default: impl Into<String>) -> String {
        self.env(key).unwrap_or_else(|| default.into())
    }

    /// Return the value of `key` and register it in the secret registry so
    /// it is masked in all subsequent logging.
    pub fn secret(&self, key: &str) -> Option<String> {
        let value = self.env(key)?;
        (self.register_secret)(key, &value);
        Some(value)
    }

    pub fn require_secret(&self, key: &str) -> Result<String, RuntimeError> {
        self.secret(key).ok_or_else(|| RuntimeError::missing_env(key))
    }

    /// Lookup without going through `env`, used when a secret's value is
    /// already known by another channel (kept for symmetry with `secret`).
    pub fn resolve_secret(&self, key: &str) -> Option<String> {
        (self.secrets)(key)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> std::io::Result<String> {
        std::fs::read_to_string(self.resolve(path.as_ref()))
    }

    pub fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
        let resolved = self.resolve(path.as_ref());
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(resolved, contents)
    }

    pub fn append(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
        use std::io::Write;
        let resolved = self.resolve(path.as_ref());
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(resolved)?;
        f.write_all(contents.as_ref())
    }

    pub fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::copy(self.resolve(from.as_ref()), self.resolve(to.as_ref())).map(|_| ())
    }

    pub fn move_path(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::rename(self.resolve(from.as_ref()), self.resolve(to.as_ref()))
    }

    pub fn delete(&self, path: impl AsRef<Path>, recursive: bool) -> std::io::Result<()> {
        let resolved = self.resolve(path.as_ref());
        if resolved.is_dir() {
            if recursive {
                std::fs::remove_dir_all(resolved)
            } else {
                std::fs::remove_dir(resolved)
            }
        } else {
            std::fs::remove_file(resolved)
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path.as_ref()).exists()
    }

    pub fn size(&self, path: impl AsRef<Path>) -> std::io::Result<u64> {
        std::fs::metadata(self.resolve(path.as_ref())).map(|m| m.len())
    }

    pub fn list(&self, path: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
        let resolved = self.resolve(path.as_ref());
        let mut out = Vec::new();
        for entry in std::fs::read_dir(resolved)? {
            out.push(entry?.path());
        }
        Ok(out)
    }

    /// Create a uniquely-named temp file under the workspace and return its path.
    pub fn temp_file(&self, prefix: &str) -> std::io::Result<PathBuf> {
        let dir = self.workspace.join(".kite").join("tmp");
        std::fs::create_dir_all(&dir)?;
        let unique = uuid::Uuid::new_v4();
        let path = dir.join(format!("{prefix}-{unique}"));
        std::fs::write(&path, b"")?;
        Ok(path)
    }

    /// Simple glob-style find: returns workspace-relative paths under `root`
    /// whose file name matches `pattern` (supporting a single trailing `*`
    /// wildcard, which covers the common "*.log"-style cases without
    /// pulling in a dedicated globbing crate).
    pub fn glob_find(&self, root: impl AsRef<Path>, pattern: &str) -> std::io::Result<Vec<PathBuf>> {
        let resolved = self.resolve(root.as_ref());
        let mut matches = Vec::new();
        walk(&resolved, pattern, &mut matches)?;
        Ok(matches)
    }
}

fn walk(dir: &Path, pattern: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, pattern, out)?;
        } else if glob_match(pattern, &path.file_name().unwrap_or_default().to_string_lossy()) {
            out.push(path);
        }
    }
    Ok(())
}

fn glob_match(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
    }
}
