//! Per-instance frame queues
//!
//! Every instance id owns one inbound and one outbound FIFO. Each queue has
//! its own lock, so the I/O thread and agent workers only contend on the
//! instance they both touch. Queues are allocated up front for the
//! configured maximum instance count.

use crate::error::TelemetryError;
use crate::frame::{Command, TelemetryFrame};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::warn;

#[derive(Debug, Default)]
struct QueuePair {
    inbound: Mutex<VecDeque<TelemetryFrame>>,
    outbound: Mutex<VecDeque<TelemetryFrame>>,
    outbound_ready: Notify,
}

/// Shared queue state between the telemetry server and its clients
#[derive(Debug)]
pub struct TelemetryHub {
    queues: Vec<QueuePair>,
    connections: AtomicUsize,
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl TelemetryHub {
    /// Create queues for instance ids `1..=max_instances`
    #[must_use]
    pub fn new(max_instances: u32) -> Self {
        Self {
            queues: (0..max_instances).map(|_| QueuePair::default()).collect(),
            connections: AtomicUsize::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn max_instances(&self) -> u32 {
        u32::try_from(self.queues.len()).unwrap_or(u32::MAX)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, instance_id: u32) -> bool {
        self.pair(instance_id).is_some()
    }

    fn pair(&self, instance_id: u32) -> Option<&QueuePair> {
        let index = usize::try_from(instance_id).ok()?.checked_sub(1)?;
        self.queues.get(index)
    }

    fn require(&self, instance_id: u32) -> Result<&QueuePair, TelemetryError> {
        self.pair(instance_id)
            .ok_or(TelemetryError::UnknownInstance(instance_id))
    }

    /// Pending inbound frames for `instance_id`. Unknown ids report 0.
    #[must_use]
    pub fn in_queue_size(&self, instance_id: u32) -> usize {
        self.pair(instance_id).map_or(0, |q| q.inbound.lock().len())
    }

    /// Pending outbound frames for `instance_id`. Unknown ids report 0.
    #[must_use]
    pub fn out_queue_size(&self, instance_id: u32) -> usize {
        self.pair(instance_id).map_or(0, |q| q.outbound.lock().len())
    }

    /// Pop the oldest inbound frame, or the `UNDEFINED` sentinel if none is queued.
    #[must_use]
    pub fn get_packet(&self, instance_id: u32) -> TelemetryFrame {
        self.pair(instance_id)
            .and_then(|q| q.inbound.lock().pop_front())
            .unwrap_or_else(|| TelemetryFrame::undefined(instance_id))
    }

    /// Remove and return the first inbound frame matching `pred`, leaving
    /// the others in order.
    pub fn take_inbound_where<F>(&self, instance_id: u32, mut pred: F) -> Option<TelemetryFrame>
    where
        F: FnMut(&TelemetryFrame) -> bool,
    {
        let pair = self.pair(instance_id)?;
        let mut queue = pair.inbound.lock();
        let index = queue.iter().position(|f| pred(f))?;
        queue.remove(index)
    }

    /// Drop all pending inbound frames, returning how many were dropped.
    pub fn flush(&self, instance_id: u32) -> usize {
        self.pair(instance_id).map_or(0, |q| {
            let mut queue = q.inbound.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        })
    }

    /// Queue a frame for delivery to the tap with `instance_id`.
    ///
    /// # Errors
    /// `TelemetryError::UnknownInstance` for an id outside the configured range,
    /// `TelemetryError::Unencodable` for a value holding the frame end marker.
    pub fn send_packet(&self, instance_id: u32, mut frame: TelemetryFrame) -> Result<(), TelemetryError> {
        let pair = self.require(instance_id)?;
        if !frame.is_encodable() {
            warn!(instance_id, command = %frame.command, "outbound value contains frame end marker, dropped");
            return Err(TelemetryError::Unencodable(instance_id));
        }
        frame.instance_id = instance_id;
        pair.outbound.lock().push_back(frame);
        pair.outbound_ready.notify_one();
        Ok(())
    }

    /// Queue a frame received from the wire under its own instance id.
    ///
    /// Frames without a timestamp are stamped with the arrival time, except
    /// `TIMESTAMP` acknowledgements whose value carries the time.
    ///
    /// # Errors
    /// `TelemetryError::UnknownInstance` for an id outside the configured range.
    pub fn push_inbound(&self, mut frame: TelemetryFrame) -> Result<(), TelemetryError> {
        let pair = self.require(frame.instance_id)?;
        if frame.timestamp.is_none() {
            let stamped = match frame.command {
                Command::Timestamp => frame.data_value.trim().parse().ok(),
                _ => None,
            };
            frame.timestamp = Some(stamped.unwrap_or_else(now_millis));
        }
        pair.inbound.lock().push_back(frame);
        Ok(())
    }

    /// Pop the oldest outbound frame.
    pub fn pop_outbound(&self, instance_id: u32) -> Option<TelemetryFrame> {
        self.pair(instance_id)?.outbound.lock().pop_front()
    }

    /// Wakeup for new outbound frames on `instance_id`.
    pub(crate) fn outbound_signal(&self, instance_id: u32) -> Option<&Notify> {
        self.pair(instance_id).map(|q| &q.outbound_ready)
    }

    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    pub(crate) fn connection_opened(&self) -> usize {
        self.connections.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the live-connection counter, never below zero.
    pub(crate) fn connection_closed(&self) -> usize {
        let prev = self
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(crate::server::DEFAULT_MAX_INSTANCES)
    }
}
