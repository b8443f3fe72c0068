//! Telemetry server over real sockets

use fde_telemetry::{Command, ServerConfig, TelemetryFrame, TelemetryServer};
use fde_test_utils::{wait_until, TapClient};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn started() -> TelemetryServer {
    let mut server = TelemetryServer::new(ServerConfig::default().with_max_instances(4));
    server.start("127.0.0.1", 0).unwrap();
    server
}

#[test]
fn sampled_frames_land_in_their_queues() {
    let server = started();
    let hub = server.hub();
    let mut tap = TapClient::connect(server.local_addr().unwrap());

    tap.send_raw(b"*6|1|9|57.002834|&*6|2|15|123456789012.96|&");
    assert!(wait_until(WAIT, || hub.in_queue_size(1) == 1 && hub.in_queue_size(2) == 1));

    let one = hub.get_packet(1);
    let two = hub.get_packet(2);
    assert_eq!((one.command, one.data_value.as_str()), (Command::SampledData, "57.002834"));
    assert_eq!((two.command, two.data_value.as_str()), (Command::SampledData, "123456789012.96"));
    assert!(one.timestamp.is_some());
}

#[test]
fn frame_split_across_writes_is_reassembled() {
    let server = started();
    let hub = server.hub();
    let mut tap = TapClient::connect(server.local_addr().unwrap());

    tap.send_raw(b"noise*6|3|4|12.");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(hub.in_queue_size(3), 0);
    tap.send_raw(b"5|&");
    assert!(wait_until(WAIT, || hub.in_queue_size(3) == 1));
    assert_eq!(hub.get_packet(3).data_value, "12.5");
}

#[test]
fn malformed_and_out_of_range_frames_are_dropped() {
    let server = started();
    let hub = server.hub();
    let mut tap = TapClient::connect(server.local_addr().unwrap());

    tap.send_raw(b"*6|1|2|57.002834|&*6|9|1|1|&*6|0|1|1|&*6|1|1|7|&");
    assert!(wait_until(WAIT, || hub.in_queue_size(1) == 1));
    assert_eq!(hub.get_packet(1).data_value, "7");
    assert_eq!(hub.connection_count(), 1);
}

#[test]
fn write_back_follows_last_instance_read() {
    let server = started();
    let hub = server.hub();
    let mut tap = TapClient::connect(server.local_addr().unwrap());

    tap.send(&TelemetryFrame::control(Command::PollAgent, 1));
    assert!(wait_until(WAIT, || hub.in_queue_size(1) == 1));

    hub.send_packet(1, TelemetryFrame::new(Command::TriggerDataValue, 1, "42.5"))
        .unwrap();
    let got = tap.receive(1, WAIT);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].command, Command::TriggerDataValue);
    assert_eq!(got[0].data_value, "42.5");

    // Queue 2 is not drained until a frame for 2 is read on this socket.
    hub.send_packet(2, TelemetryFrame::control(Command::TriggerEvent, 2))
        .unwrap();
    assert!(tap.receive(1, Duration::from_millis(200)).is_empty());
    assert_eq!(hub.out_queue_size(2), 1);

    tap.send(&TelemetryFrame::control(Command::PollAgent, 2));
    let got = tap.receive(1, WAIT);
    assert_eq!(got[0].command, Command::TriggerEvent);
    assert_eq!(got[0].instance_id, 2);
    assert_eq!(hub.out_queue_size(2), 0);
}

#[test]
fn disconnect_decrements_connection_count() {
    let server = started();
    let hub = server.hub();
    let a = TapClient::connect(server.local_addr().unwrap());
    let b = TapClient::connect(server.local_addr().unwrap());
    assert!(wait_until(WAIT, || hub.connection_count() == 2));

    a.close();
    assert!(wait_until(WAIT, || hub.connection_count() == 1));
    b.close();
    assert!(wait_until(WAIT, || hub.connection_count() == 0));
}

#[test]
fn second_start_is_rejected_and_shutdown_is_idempotent() {
    let mut server = started();
    assert!(server.is_running());
    assert!(matches!(
        server.start("127.0.0.1", 0),
        Err(fde_telemetry::TelemetryError::AlreadyRunning)
    ));
    server.shutdown();
    assert!(!server.is_running());
    server.shutdown();
}
