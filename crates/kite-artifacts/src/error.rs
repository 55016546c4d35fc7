//! Artifact store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{0}' not found")]
    NotFound(String),

    #[error("io error for artifact '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest io error: {0}")]
    ManifestIo(#[source] std::io::Error),
}

impl ArtifactError {
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ArtifactError::NotFound(_) => "NotFound",
            ArtifactError::Io { .. } => "Io",
            ArtifactError::ManifestIo(_) => "ManifestIo",
        }
    }
}

pub type Result<T> = std::result::Result<T, ArtifactError>;
