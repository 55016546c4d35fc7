//! Content-addressed-by-name artifact store with manifest persistence.
//!
//! [`ArtifactStore`] implements `kite_model::ArtifactAccess` so it can be
//! handed to an [`kite_model::ExecutionContext`] directly.

mod error;
mod manifest;
mod store;

pub use error::{ArtifactError, Result};
pub use manifest::{ArtifactKind, Manifest, ManifestEntry, MANIFEST_FILE_NAME};
pub use store::{ArtifactStore, DEFAULT_ARTIFACTS_DIR};
