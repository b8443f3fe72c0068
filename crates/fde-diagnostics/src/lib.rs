//! FDE Diagnostics - typed access to live diagnostic taps
//!
//! A [`DiagnosticPoint`] wraps one tap's transport queues with read,
//! trigger, gate and wait operations. A [`DiagnosticPointRegistry`] holds
//! the points of one instrumented application.

pub mod point;
pub mod registry;
pub mod value;

pub use point::{DiagnosticPoint, TriggerPolicy};
pub use registry::DiagnosticPointRegistry;
pub use value::TapValue;
