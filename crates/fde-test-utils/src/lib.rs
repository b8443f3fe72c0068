//! Testing utilities for FDE workspace
//!
//! Shared fixtures: a small temperature-conversion application, a deployer
//! that records plans, and a TCP client that plays the part of a tap.

#![allow(missing_docs)]

use fde_graph::{
    ControlSignal, DataKind, DeployError, Deployer, DeploymentPlan, Endpoint, GraphModel, Node,
    Port, SignalDirection, TapRequest, START_COLD, START_NODE, START_WARM,
};
use fde_telemetry::{FrameDecoder, TelemetryFrame};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sensor feeding a Fahrenheit to Celsius converter feeding a display.
///
/// ```text
/// START.COLD -> TEMPERATURE.INIT
/// TEMPERATURE.CNF/TEMP_F -> F_TO_C_CONV.REQ/F
/// F_TO_C_CONV.CNF/C -> DISPLAY.REQ/VALUE
/// ```
pub fn temperature_app() -> GraphModel {
    let mut g = GraphModel::new("temperature");
    g.ensure_start_node(true);
    g.add_node(
        Node::new("TEMPERATURE", "TEMP_SENSOR")
            .with_parameter("CHANNEL", "3")
            .with_parameter("GAIN", "1.25")
            .with_signal(ControlSignal::new("INIT", SignalDirection::Inbound))
            .with_signal(ControlSignal::new("CNF", SignalDirection::Outbound).with_port("TEMP_F"))
            .with_port(Port::output("TEMP_F", DataKind::Lreal)),
    )
    .unwrap();
    g.add_node(
        Node::new("F_TO_C_CONV", "F_TO_C")
            .with_signal(ControlSignal::new("REQ", SignalDirection::Inbound).with_port("F"))
            .with_signal(ControlSignal::new("CNF", SignalDirection::Outbound).with_port("C"))
            .with_port(Port::input("F", DataKind::Lreal).with_initial_value("32.0"))
            .with_port(Port::output("C", DataKind::Lreal)),
    )
    .unwrap();
    g.add_node(
        Node::new("DISPLAY", "HMI_DISPLAY")
            .with_signal(ControlSignal::new("REQ", SignalDirection::Inbound).with_port("VALUE"))
            .with_signal(ControlSignal::new("ALARM", SignalDirection::Outbound))
            .with_port(Port::input("VALUE", DataKind::Lreal))
            .with_port(Port::output("LEVEL", DataKind::Int)),
    )
    .unwrap();

    g.connect(
        Endpoint::new(START_NODE, START_COLD),
        Endpoint::new("TEMPERATURE", "INIT"),
    );
    g.connect(
        Endpoint::new(START_NODE, START_WARM),
        Endpoint::new("TEMPERATURE", "INIT"),
    );
    g.connect(
        Endpoint::new("TEMPERATURE", "CNF"),
        Endpoint::new("F_TO_C_CONV", "REQ"),
    );
    g.connect(
        Endpoint::new("TEMPERATURE", "TEMP_F"),
        Endpoint::new("F_TO_C_CONV", "F"),
    );
    g.connect(
        Endpoint::new("F_TO_C_CONV", "CNF"),
        Endpoint::new("DISPLAY", "REQ"),
    );
    g.connect(
        Endpoint::new("F_TO_C_CONV", "C"),
        Endpoint::new("DISPLAY", "VALUE"),
    );
    g
}

/// Taps on the converter input and output.
pub fn temperature_requests() -> Vec<TapRequest> {
    vec![
        TapRequest::new("F_TO_C_CONV", "REQ").with_port("F"),
        TapRequest::new("F_TO_C_CONV", "CNF").with_port("C"),
    ]
}

/// Deployer that keeps every plan it is given
#[derive(Debug, Clone, Default)]
pub struct RecordingDeployer {
    plans: Arc<Mutex<Vec<DeploymentPlan>>>,
}

impl RecordingDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plans(&self) -> Vec<DeploymentPlan> {
        self.plans.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.plans.lock().len()
    }
}

impl Deployer for RecordingDeployer {
    fn deploy(&self, plan: &DeploymentPlan) -> Result<(), DeployError> {
        self.plans.lock().push(plan.clone());
        Ok(())
    }
}

/// Deployer that always refuses
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingDeployer;

impl Deployer for RejectingDeployer {
    fn deploy(&self, _plan: &DeploymentPlan) -> Result<(), DeployError> {
        Err(DeployError::Rejected {
            index: 0,
            reason: "target offline".to_string(),
        })
    }
}

/// Blocking TCP client that speaks the tap side of the wire protocol
#[derive(Debug)]
pub struct TapClient {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl TapClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_nodelay(true).unwrap();
        Self {
            stream,
            decoder: FrameDecoder::new(),
        }
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    pub fn send(&mut self, frame: &TelemetryFrame) {
        self.send_raw(frame.encode().as_bytes());
    }

    /// Read until `count` frames are decoded or `timeout` elapses.
    pub fn receive(&mut self, count: usize, timeout: Duration) -> Vec<TelemetryFrame> {
        let deadline = Instant::now() + timeout;
        let mut frames = Vec::new();
        let mut buf = [0u8; 512];

        while frames.len() < count {
            while let Some(decoded) = self.decoder.next_frame() {
                if let Ok(frame) = decoded {
                    frames.push(frame);
                }
            }
            if frames.len() >= count {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.stream.set_read_timeout(Some(remaining)).unwrap();
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.decoder.extend(&buf[..n]),
                Err(_) => break,
            }
        }
        frames
    }

    pub fn close(self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
