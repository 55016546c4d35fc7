//! Process-wide secret registry and text masking for Kite's logging path.

mod registry;

pub use registry::SecretRegistry;
