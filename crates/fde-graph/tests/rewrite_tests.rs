//! Rewriting engine properties

use fde_graph::{
    ControlSignal, DataKind, Endpoint, GraphModel, Node, Port, RewireCode, RewritingEngine,
    SignalDirection, TapConfig, TapRequest,
};
use proptest::prelude::*;

fn chain(len: usize) -> GraphModel {
    let mut g = GraphModel::new("chain");
    for i in 0..len {
        g.add_node(
            Node::new(format!("N{i}"), "STAGE")
                .with_signal(ControlSignal::new("REQ", SignalDirection::Inbound).with_port("IN"))
                .with_signal(ControlSignal::new("CNF", SignalDirection::Outbound).with_port("OUT"))
                .with_port(Port::input("IN", DataKind::Lreal))
                .with_port(Port::output("OUT", DataKind::Lreal)),
        )
        .unwrap();
    }
    for i in 1..len {
        g.connect(
            Endpoint::new(format!("N{}", i - 1), "CNF"),
            Endpoint::new(format!("N{i}"), "REQ"),
        );
        g.connect(
            Endpoint::new(format!("N{}", i - 1), "OUT"),
            Endpoint::new(format!("N{i}"), "IN"),
        );
    }
    g
}

#[test]
fn splice_keeps_prior_connection_as_disabled_history() {
    let mut g = chain(2);
    let before = g.connection_count();
    let mut engine = RewritingEngine::new(TapConfig::default());
    let (tap, _) = engine.insert_tap(&mut g, "N1", "IN", 100).unwrap();

    let dest = Endpoint::new("N1", "IN");
    let to_dest: Vec<_> = g
        .connections()
        .iter()
        .filter(|c| c.destination == dest)
        .collect();
    assert_eq!(to_dest.len(), 2);
    assert_eq!(to_dest.iter().filter(|c| c.enabled).count(), 1);

    let prior = to_dest.iter().find(|c| !c.enabled).unwrap();
    assert_eq!(prior.source, Endpoint::new("N0", "OUT"));
    let live = to_dest.iter().find(|c| c.enabled).unwrap();
    assert_eq!(live.source.node, tap.tap_node);

    assert!(g.connection_count() > before);
    assert!(g.validate().is_ok());
}

#[test]
fn output_port_without_bound_signal_is_event_undefined() {
    let mut g = GraphModel::new("app");
    g.add_node(
        Node::new("PUMP", "PUMP_CTL")
            .with_signal(ControlSignal::new("CNF", SignalDirection::Outbound))
            .with_port(Port::output("FLOW", DataKind::Real)),
    )
    .unwrap();
    let nodes_before = g.node_count();
    let conns_before = g.connection_count();

    let mut engine = RewritingEngine::new(TapConfig::default());
    let err = engine.insert_tap(&mut g, "PUMP", "FLOW", 100).unwrap_err();

    assert_eq!(err.code(), RewireCode::EventUndefined);
    assert_eq!(g.node_count(), nodes_before);
    assert_eq!(g.connection_count(), conns_before);
    assert_eq!(engine.issued(), 0);
}

#[test]
fn failures_do_not_consume_instance_ids() {
    let mut g = chain(3);
    let mut engine = RewritingEngine::new(TapConfig::default());
    let result = engine.instrument_all(
        &mut g,
        &[
            TapRequest::new("N0", "CNF").with_port("OUT"),
            TapRequest::new("GHOST", "REQ").with_port("IN"),
            TapRequest::new("N2", "REQ").with_port("IN"),
        ],
    );

    assert!(!result.is_complete());
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].error.code(), RewireCode::FbNotFound);
    let ids: Vec<_> = result.taps.iter().map(|t| t.instance_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

proptest! {
    #[test]
    fn instrument_all_assigns_ids_in_request_order(len in 1usize..12) {
        let mut g = chain(len);
        let requests: Vec<_> = (0..len)
            .map(|i| TapRequest::new(format!("N{i}"), "REQ").with_port("IN"))
            .collect();
        let mut engine = RewritingEngine::new(TapConfig::default());
        let result = engine.instrument_all(&mut g, &requests);

        prop_assert!(result.is_complete());
        prop_assert_eq!(result.taps.len(), len);
        for (i, tap) in result.taps.iter().enumerate() {
            prop_assert_eq!(tap.instance_id as usize, i + 1);
            prop_assert_eq!(&tap.target_node, &format!("N{i}"));
        }
        prop_assert!(g.validate().is_ok());
    }

    #[test]
    fn same_requests_give_same_graph(len in 1usize..8) {
        let requests: Vec<_> = (0..len)
            .map(|i| TapRequest::new(format!("N{i}"), "CNF").with_port("OUT"))
            .collect();

        let mut a = chain(len);
        let mut b = chain(len);
        RewritingEngine::new(TapConfig::default()).instrument_all(&mut a, &requests);
        RewritingEngine::new(TapConfig::default()).instrument_all(&mut b, &requests);
        prop_assert_eq!(a, b);
    }
}
