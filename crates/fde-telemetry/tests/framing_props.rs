//! Framing and queue ordering properties

use fde_telemetry::{Command, FrameDecoder, TelemetryFrame, TelemetryHub};
use proptest::prelude::*;

fn command() -> impl Strategy<Value = Command> {
    (0u32..=7).prop_map(|c| Command::from_code(c).unwrap())
}

fn value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._|*-]{0,40}"
}

proptest! {
    #[test]
    fn encode_then_decode_is_identity(cmd in command(), id in 0u32..100_000, v in value()) {
        let frame = TelemetryFrame::new(cmd, id, v.clone());
        let mut decoder = FrameDecoder::new();
        decoder.extend(frame.encode().as_bytes());
        let decoded = decoder.next_frame().unwrap().unwrap();
        prop_assert_eq!(decoded.command, cmd);
        prop_assert_eq!(decoded.instance_id, id);
        prop_assert_eq!(decoded.data_value, v);
        prop_assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn split_delivery_decodes_the_same(v in value(), split in 0usize..64) {
        let bytes = TelemetryFrame::new(Command::SampledData, 7, v.clone()).encode().into_bytes();
        let at = split.min(bytes.len());
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes[..at]);
        let early = decoder.next_frame();
        decoder.extend(&bytes[at..]);
        let frame = match early {
            Some(done) => done.unwrap(),
            None => decoder.next_frame().unwrap().unwrap(),
        };
        prop_assert_eq!(frame.data_value, v);
    }

    #[test]
    fn bad_length_does_not_corrupt_neighbours(v in value(), skew in 1usize..5, next in value()) {
        let bad = format!("*6|1|{}|{}|&", v.len() + skew, v);
        let good = TelemetryFrame::new(Command::SampledData, 2, next.clone()).encode();
        let mut decoder = FrameDecoder::new();
        decoder.extend(bad.as_bytes());
        decoder.extend(good.as_bytes());

        let results = decoder.drain_frames();
        prop_assert_eq!(results.len(), 2);
        prop_assert!(results[0].is_err());
        prop_assert_eq!(&results[1].as_ref().unwrap().data_value, &next);
    }

    #[test]
    fn queues_preserve_push_order(pushes in prop::collection::vec((1u32..=4, value()), 0..60)) {
        let hub = TelemetryHub::new(4);
        for (id, v) in &pushes {
            hub.push_inbound(TelemetryFrame::new(Command::SampledData, *id, v.clone())).unwrap();
        }
        for id in 1..=4u32 {
            let expected: Vec<_> = pushes.iter().filter(|(i, _)| *i == id).map(|(_, v)| v.clone()).collect();
            prop_assert_eq!(hub.in_queue_size(id), expected.len());
            let popped: Vec<_> = (0..expected.len()).map(|_| hub.get_packet(id)).collect();
            prop_assert!(popped.iter().all(|f| f.instance_id == id));
            let values: Vec<_> = popped.into_iter().map(|f| f.data_value).collect();
            prop_assert_eq!(values, expected);
            prop_assert!(hub.get_packet(id).is_undefined());
        }
    }
}
