//! Wire frames
//!
//! ```text
//! frame = "*" command "|" instanceID "|" length "|" value "|" "&"
//! ```
//!
//! All fields are ASCII decimal except `value`, whose byte length is
//! `length`. Bytes outside `*` ... `&` are line noise and skipped.

use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame start marker
pub const FRAME_START: u8 = b'*';
/// Frame end marker
pub const FRAME_END: u8 = b'&';
/// Field separator
pub const FIELD_SEPARATOR: char = '|';

/// Bytes kept while waiting for a frame end before the accumulator is reset.
const MAX_PENDING: usize = 64 * 1024;

/// Command codes shared with the deployed tap nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Command {
    Undefined = 0,
    /// Tap forwards natural traffic
    PassthroughEnabled = 1,
    /// Tap holds natural traffic and waits for stimulus (gate closed)
    TriggerEnabled = 2,
    TriggerDataValue = 3,
    TriggerEvent = 4,
    PollAgent = 5,
    SampledData = 6,
    Timestamp = 7,
}

impl Command {
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Undefined,
            1 => Self::PassthroughEnabled,
            2 => Self::TriggerEnabled,
            3 => Self::TriggerDataValue,
            4 => Self::TriggerEvent,
            5 => Self::PollAgent,
            6 => Self::SampledData,
            7 => Self::Timestamp,
            _ => return None,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undefined => "UNDEFINED",
            Self::PassthroughEnabled => "PASSTHROUGH_ENABLED",
            Self::TriggerEnabled => "TRIGGER_ENABLED",
            Self::TriggerDataValue => "TRIGGER_DATA_VALUE",
            Self::TriggerEvent => "TRIGGER_EVENT",
            Self::PollAgent => "POLL_AGENT",
            Self::SampledData => "SAMPLED_DATA",
            Self::Timestamp => "TIMESTAMP",
        };
        f.write_str(s)
    }
}

/// One unit of wire traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub command: Command,
    pub instance_id: u32,
    pub data_value: String,
    /// Milliseconds since the UNIX epoch, set when the frame is queued inbound
    pub timestamp: Option<i64>,
}

impl TelemetryFrame {
    #[must_use]
    pub fn new(command: Command, instance_id: u32, data_value: impl Into<String>) -> Self {
        Self {
            command,
            instance_id,
            data_value: data_value.into(),
            timestamp: None,
        }
    }

    /// Frame with an empty value, used for mode control and event triggers.
    #[must_use]
    pub fn control(command: Command, instance_id: u32) -> Self {
        Self::new(command, instance_id, String::new())
    }

    /// Sentinel returned when a queue is empty.
    #[must_use]
    pub fn undefined(instance_id: u32) -> Self {
        Self::control(Command::Undefined, instance_id)
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.command == Command::Undefined
    }

    /// Whether the value survives the wire. An end marker inside the value
    /// would terminate the frame early on the receiving side.
    #[inline]
    #[must_use]
    pub fn is_encodable(&self) -> bool {
        !self.data_value.as_bytes().contains(&FRAME_END)
    }

    /// Wire encoding.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "*{}|{}|{}|{}|&",
            self.command.code(),
            self.instance_id,
            self.data_value.len(),
            self.data_value
        )
    }

    /// Decode one frame body, the text between the markers.
    ///
    /// The short form `command|id|` (no length, no value) is accepted as an
    /// empty value.
    ///
    /// # Errors
    /// See [`FrameError`].
    pub fn parse_body(body: &str) -> Result<Self, FrameError> {
        let mut fields = body.splitn(4, FIELD_SEPARATOR);
        let command = fields
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FrameError::Malformed(body.to_string()))?;
        let instance = fields
            .next()
            .ok_or_else(|| FrameError::Malformed(body.to_string()))?;
        let length = fields.next();
        let value = fields.next();

        let code: u32 = command
            .trim()
            .parse()
            .map_err(|_| FrameError::Malformed(body.to_string()))?;
        let command = Command::from_code(code).ok_or(FrameError::UnknownCommand(code))?;
        let instance_id: u32 = instance
            .trim()
            .parse()
            .map_err(|_| FrameError::BadInstanceId(instance.to_string()))?;

        let data_value = match (length, value) {
            (None | Some(""), None) => String::new(),
            (Some(length), Some(value)) => {
                let value = value.strip_suffix(FIELD_SEPARATOR).unwrap_or(value);
                let declared: usize = length
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::Malformed(body.to_string()))?;
                if declared != value.len() {
                    return Err(FrameError::LengthMismatch {
                        declared,
                        actual: value.len(),
                    });
                }
                value.to_string()
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(FrameError::Malformed(body.to_string()))
            }
        };

        Ok(Self::new(command, instance_id, data_value))
    }
}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {:?}", self.command, self.instance_id, self.data_value)
    }
}

/// Incremental frame scanner over a byte stream
///
/// Bytes are accumulated across reads; a frame split over several reads is
/// decoded once its end marker arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held waiting for more input.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete frame, or `None` if more bytes are needed.
    ///
    /// A malformed frame is consumed and reported; the caller drops it and
    /// keeps calling.
    pub fn next_frame(&mut self) -> Option<Result<TelemetryFrame, FrameError>> {
        let Some(start) = self.buffer.iter().position(|&b| b == FRAME_START) else {
            self.buffer.clear();
            return None;
        };
        self.buffer.drain(..start);

        let Some(end) = self.buffer.iter().position(|&b| b == FRAME_END) else {
            if self.buffer.len() > MAX_PENDING {
                self.buffer.clear();
                return Some(Err(FrameError::Overflow(MAX_PENDING)));
            }
            return None;
        };

        let frame: Vec<u8> = self.buffer.drain(..=end).collect();
        let body = &frame[1..frame.len() - 1];
        Some(match std::str::from_utf8(body) {
            Ok(text) => TelemetryFrame::parse_body(text),
            Err(_) => Err(FrameError::NotUtf8),
        })
    }

    /// Decode everything currently buffered, keeping malformed results.
    pub fn drain_frames(&mut self) -> Vec<Result<TelemetryFrame, FrameError>> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Result<TelemetryFrame, FrameError>> {
        let mut d = FrameDecoder::new();
        d.extend(bytes);
        d.drain_frames()
    }

    #[test]
    fn encodes_full_grammar() {
        let f = TelemetryFrame::new(Command::SampledData, 1, "57.002834");
        assert_eq!(f.encode(), "*6|1|9|57.002834|&");
        assert_eq!(TelemetryFrame::control(Command::TriggerEnabled, 3).encode(), "*2|3|0||&");
    }

    #[test]
    fn decodes_two_sampled_frames() {
        let out = decode_all(b"*6|1|9|57.002834|&*6|2|15|123456789012.96|&");
        assert_eq!(out.len(), 2);
        let a = out[0].as_ref().unwrap();
        let b = out[1].as_ref().unwrap();
        assert_eq!((a.command, a.instance_id, a.data_value.as_str()), (Command::SampledData, 1, "57.002834"));
        assert_eq!((b.command, b.instance_id, b.data_value.as_str()), (Command::SampledData, 2, "123456789012.96"));
    }

    #[test]
    fn skips_noise_and_accepts_short_form() {
        let out = decode_all(b"+++*4|1|7|47.5998|&+++*4|2|15|123456789012.96|&+++*2|2|&__&");
        let frames: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data_value, "47.5998");
        assert_eq!(frames[1].instance_id, 2);
        assert_eq!(frames[2].command, Command::TriggerEnabled);
        assert!(frames[2].data_value.is_empty());
    }

    #[test]
    fn length_mismatch_does_not_corrupt_following_frame() {
        let out = decode_all(b"*6|1|4|57.002834|&*6|1|3|1.5|&");
        assert_eq!(
            out[0],
            Err(FrameError::LengthMismatch {
                declared: 4,
                actual: 9
            })
        );
        assert_eq!(out[1].as_ref().unwrap().data_value, "1.5");
    }

    #[test]
    fn incomplete_frame_waits_for_more_bytes() {
        let mut d = FrameDecoder::new();
        d.extend(b"*6|1|3|1.");
        assert!(d.next_frame().is_none());
        assert_eq!(d.pending(), 9);
        d.extend(b"5|&");
        assert_eq!(d.next_frame().unwrap().unwrap().data_value, "1.5");
        assert!(d.next_frame().is_none());
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn unknown_command_and_bad_id_are_reported() {
        let out = decode_all(b"*9|1|0||&*6|x|0||&");
        assert_eq!(out[0], Err(FrameError::UnknownCommand(9)));
        assert_eq!(out[1], Err(FrameError::BadInstanceId("x".into())));
    }

    #[test]
    fn length_without_value_is_malformed() {
        let out = decode_all(b"*6|1|5&*6|1|1|7|&");
        assert!(matches!(out[0], Err(FrameError::Malformed(_))));
        assert_eq!(out[1].as_ref().unwrap().data_value, "7");
    }

    #[test]
    fn end_marker_in_value_is_not_encodable() {
        assert!(TelemetryFrame::new(Command::SampledData, 1, "a|b").is_encodable());
        assert!(!TelemetryFrame::new(Command::TriggerDataValue, 1, "R&D").is_encodable());
    }

    #[test]
    fn value_may_contain_separator() {
        let f = TelemetryFrame::new(Command::SampledData, 4, "a|b");
        let out = decode_all(f.encode().as_bytes());
        assert_eq!(out[0].as_ref().unwrap().data_value, "a|b");
    }
}
