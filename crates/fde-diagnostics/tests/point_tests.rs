//! Diagnostic points against the live transport

use fde_diagnostics::{DiagnosticPointRegistry, TapValue, TriggerPolicy};
use fde_graph::{RewritingEngine, TapConfig};
use fde_telemetry::{now_millis, Command, ServerConfig, TelemetryFrame, TelemetryHub, TelemetryServer};
use fde_test_utils::{temperature_app, temperature_requests, wait_until, TapClient};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn instrumented(hub: &Arc<TelemetryHub>, policy: TriggerPolicy) -> DiagnosticPointRegistry {
    let mut graph = temperature_app();
    let mut engine = RewritingEngine::new(TapConfig::default());
    let result = engine.instrument_all(&mut graph, &temperature_requests());
    assert!(result.is_complete());
    DiagnosticPointRegistry::from_taps(&result.taps, hub, &graph, policy)
}

#[test]
fn unacknowledged_trigger_times_out_after_single_send() {
    let hub = Arc::new(TelemetryHub::new(4));
    let registry = instrumented(&hub, TriggerPolicy::new(3, 10));
    let point = registry.map("F_TO_C_CONV", "F").unwrap();

    let started = Instant::now();
    assert!(!point.trigger_value(&TapValue::Lreal(98.6)));
    assert!(started.elapsed() >= Duration::from_millis(30));

    assert_eq!(hub.out_queue_size(point.instance_id()), 1);
    let sent = hub.pop_outbound(point.instance_id()).unwrap();
    assert_eq!(sent.command, Command::TriggerDataValue);
    assert_eq!(sent.data_value, "98.6");
}

#[test]
fn trigger_round_trip_over_socket() {
    let mut server = TelemetryServer::new(ServerConfig::default().with_max_instances(4));
    let addr = server.start("127.0.0.1", 0).unwrap();
    let hub = server.hub();
    let registry = instrumented(&hub, TriggerPolicy::new(100, 20));
    let input = registry.map("F_TO_C_CONV", "F").unwrap();
    let id = input.instance_id();

    let mut tap = TapClient::connect(addr);
    tap.send(&TelemetryFrame::control(Command::PollAgent, id));
    assert!(wait_until(WAIT, || hub.in_queue_size(id) == 1));

    let responder = std::thread::spawn(move || {
        let got = tap.receive(1, WAIT);
        tap.send(&TelemetryFrame::new(Command::Timestamp, id, now_millis().to_string()));
        (tap, got)
    });

    assert!(input.trigger_value(&TapValue::Lreal(212.0)));
    let (tap, got) = responder.join().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].command, Command::TriggerDataValue);
    assert_eq!(got[0].data_value, "212");
    assert!(input.timestamp() > 0);
    tap.close();
}

#[test]
fn sampled_output_is_read_within_threshold() {
    let mut server = TelemetryServer::new(ServerConfig::default().with_max_instances(4));
    let addr = server.start("127.0.0.1", 0).unwrap();
    let hub = server.hub();
    let registry = instrumented(&hub, TriggerPolicy::default());
    assert!(registry.bind_alias("celsius", "F_TO_C_CONV", "C"));
    let output = registry.alias("celsius").unwrap();

    let mut tap = TapClient::connect(addr);
    tap.send(&TelemetryFrame::new(Command::SampledData, output.instance_id(), "21.5"));

    assert!(output.read_wait(21.5, 0.01, 100, Duration::from_millis(10)));
    assert_eq!(output.value(), TapValue::Lreal(21.5));
    assert_eq!(output.param("GAIN"), None);
}

#[test]
fn points_read_target_parameters() {
    let hub = Arc::new(TelemetryHub::new(4));
    let mut graph = temperature_app();
    let mut engine = RewritingEngine::new(TapConfig::default());
    let result = engine.instrument_all(
        &mut graph,
        &[fde_graph::TapRequest::new("TEMPERATURE", "CNF").with_port("TEMP_F")],
    );
    let registry = DiagnosticPointRegistry::from_taps(&result.taps, &hub, &graph, TriggerPolicy::default());
    let sensor = registry.get(0).unwrap();

    assert_eq!(sensor.param_i64("CHANNEL"), 3);
    assert!((sensor.param_f64("GAIN") - 1.25).abs() < f64::EPSILON);
}
