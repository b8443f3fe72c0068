//! Error types for the telemetry transport

use std::io;

/// A frame that could not be decoded. Dropped by the server, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Missing or non-numeric fields
    #[error("malformed frame: {0:?}")]
    Malformed(String),

    /// Declared length disagrees with the value
    #[error("declared length {declared} but value has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown command code {0}")]
    UnknownCommand(u32),

    #[error("bad instance id {0:?}")]
    BadInstanceId(String),

    #[error("frame is not valid UTF-8")]
    NotUtf8,

    /// No end marker within the accumulator limit
    #[error("no frame end within {0} bytes, accumulator reset")]
    Overflow(usize),
}

/// Telemetry server and queue errors
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Listening socket could not be set up
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Instance id outside `1..=max_instances`
    #[error("unknown instance id {0}")]
    UnknownInstance(u32),

    /// Value contains the frame end marker and cannot be sent
    #[error("value for instance {0} contains the frame end marker")]
    Unencodable(u32),

    #[error("telemetry server already running")]
    AlreadyRunning,

    /// I/O runtime could not be built
    #[error("failed to build I/O runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to spawn I/O thread: {0}")]
    Spawn(#[source] io::Error),
}
