//! Log sink implementations.

mod file_sink;

pub use file_sink::FileLogSink;
