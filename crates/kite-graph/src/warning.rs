//! Non-fatal diagnostics produced during materialization/validation.

/// A non-fatal finding surfaced alongside (but distinct from) the fatal
/// `ValidationError`s. Spec §4.1 point 2 and §5 both describe
/// warning-worthy situations that must not block a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The same segment name was materialized more than once by different
    /// flow references; the later occurrence was discarded (first-wins).
    DuplicateRef { name: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DuplicateRef { name } => {
                write!(f, "segment '{name}' referenced more than once; later occurrence discarded")
            }
        }
    }
}
