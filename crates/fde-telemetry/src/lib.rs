//! FDE Telemetry - framed transport between diagnostic taps and agents
//!
//! Taps connect to a [`TelemetryServer`] and exchange ASCII frames. Decoded
//! frames land in per-instance FIFO queues held by a [`TelemetryHub`],
//! which agents read from and write stimulus commands into.

pub mod error;
pub mod frame;
pub mod hub;
pub mod server;

pub use error::{FrameError, TelemetryError};
pub use frame::{Command, FrameDecoder, TelemetryFrame};
pub use hub::{now_millis, TelemetryHub};
pub use server::{ServerConfig, TelemetryServer, DEFAULT_MAX_INSTANCES};
