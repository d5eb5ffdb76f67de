use std::sync::Arc;
use std::time::Duration;

use agg80211_conformance::{check_accounting, open_config, peer, unit, OWN};
use agg80211_core::{AccessCategory, NoopStats};
use agg80211_mac::{
    ActionBody, Admission, Frame, Inbound, LinkLayer, Outbound, SessionState, TimerKey, TimerKind,
    TransmitQueue,

};
use agg80211_telemetry::PrometheusStats;

fn mgmt_actions(layer: &LinkLayer) -> Vec<&'static str> {
    layer.queue().mgmt_frames().map(|m| m.body.name()).collect()
}

#[test]
fn five_units_become_one_aggregate() {
    let p = peer(0);
    let mut queue = TransmitQueue::new(&open_config(), Arc::new(NoopStats));
    for _ in 0..5 {
        queue.enqueue_data(unit(p, 200)).unwrap();
    }

    let best_effort = queue.category(AccessCategory::BestEffort);
    assert_eq!(best_effort.len(), 1);
    let Some(Frame::Aggregate(container)) = best_effort.get(0) else {
        panic!("expected a single aggregate, got {:?}", best_effort.get(0));
    };
    assert_eq!(container.count(), 5);
    let lens: Vec<u64> = container.iter().map(|e| e.byte_len()).collect();
    for len in &lens[..4] {
        assert_eq!(len % 4, 0);
    }
    // 14-octet subframe header plus payload, padded except for the last
    assert_eq!(lens, vec![216, 216, 216, 216, 214]);
    assert_eq!(best_effort.accounting().get(&p).total, 5);
    assert_eq!(check_accounting(best_effort), Ok(()));
}

#[test]
fn threshold_crossing_negotiates_once_and_builds_blocks() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut cfg = open_config();
    cfg.aggregation.enabled = false;
    let b_addr = peer(0);
    let mut a = LinkLayer::new(OWN, cfg.clone(), Arc::new(NoopStats)).unwrap();
    let mut b = LinkLayer::new(b_addr, cfg, Arc::new(NoopStats)).unwrap();
    let now = Duration::ZERO;

    a.send(unit(b_addr, 100), now).unwrap();
    a.send(unit(b_addr, 100), now).unwrap();
    assert!(mgmt_actions(&a).is_empty());
    assert_eq!(a.sessions().state(&b_addr), SessionState::Default);

    a.send(unit(b_addr, 100), now).unwrap();
    assert_eq!(mgmt_actions(&a), vec!["ADDBA_REQ"]);
    assert_eq!(a.sessions().state(&b_addr), SessionState::WaitConfirmation);

    for _ in 0..250 {
        a.send(unit(b_addr, 100), now).unwrap();
    }
    assert_eq!(mgmt_actions(&a), vec!["ADDBA_REQ"], "request must go out exactly once");

    let Some(Outbound::Management(request)) = a.poll_transmit(now).unwrap() else {
        panic!("management frames go first");
    };
    b.receive(Inbound::Management(request), now).unwrap();
    let Some(Outbound::Management(response)) = b.poll_transmit(now).unwrap() else {
        panic!("recipient must answer");
    };
    assert!(matches!(response.body, ActionBody::AddbaResponse(ref r) if r.status == 0));
    a.receive(Inbound::Management(response), now).unwrap();

    assert_eq!(a.sessions().state(&b_addr), SessionState::SendBlock);
    assert!(a.sessions().timers().is_armed(TimerKey::new(b_addr, TimerKind::BlockTimeout)));

    let queue = a.queue().category(AccessCategory::BestEffort);
    let blocks: Vec<usize> = queue
        .iter()
        .filter_map(|f| match f {
            Frame::Block(b) => Some(b.count()),
            _ => None,
        })
        .collect();
    // 253 units: two full blocks, the remaining 53 still above the minimum
    assert_eq!(blocks, vec![100, 100, 53]);
    assert!(blocks.iter().all(|&n| (3..=100).contains(&n)));
    assert_eq!(queue.accounting().free(&b_addr), 0);
    assert_eq!(queue.accounting().blocked(&b_addr), 253);
    assert_eq!(check_accounting(queue), Ok(()));
}

fn negotiate(a: &mut LinkLayer, b: &mut LinkLayer, now: Duration) {
    let Some(Outbound::Management(request)) = a.poll_transmit(now).unwrap() else {
        panic!("management frames go first");
    };
    b.receive(Inbound::Management(request), now).unwrap();
    let Some(Outbound::Management(response)) = b.poll_transmit(now).unwrap() else {
        panic!("recipient must answer");
    };
    a.receive(Inbound::Management(response), now).unwrap();
}

fn block_sizes(layer: &LinkLayer) -> Vec<usize> {
    layer
        .queue()
        .categories()
        .flat_map(|q| q.iter())
        .filter_map(|f| match f {
            Frame::Block(b) => Some(b.count()),
            _ => None,
        })
        .collect()
}

#[test]
fn aggregated_traffic_keeps_block_bounds() {
    let cfg = open_config();
    let (min, max) = (cfg.block_ack.min_block, cfg.block_ack.max_block);
    let b_addr = peer(0);
    let now = Duration::ZERO;

    // a single A-MSDU holds five MSDUs but is one entry: too few for a block
    let mut a = LinkLayer::new(OWN, cfg.clone(), Arc::new(NoopStats)).unwrap();
    let mut b = LinkLayer::new(b_addr, cfg.clone(), Arc::new(NoopStats)).unwrap();
    for _ in 0..5 {
        a.send(unit(b_addr, 200), now).unwrap();
    }
    negotiate(&mut a, &mut b, now);
    assert_eq!(a.sessions().state(&b_addr), SessionState::SendBlock);
    assert!(block_sizes(&a).is_empty());
    assert_eq!(a.queue().category(AccessCategory::BestEffort).len(), 1);

    // enough traffic for several A-MSDUs: they are grouped, within bounds
    let mut a = LinkLayer::new(OWN, cfg.clone(), Arc::new(NoopStats)).unwrap();
    let mut b = LinkLayer::new(b_addr, cfg, Arc::new(NoopStats)).unwrap();
    for _ in 0..200 {
        a.send(unit(b_addr, 200), now).unwrap();
    }
    negotiate(&mut a, &mut b, now);
    let sizes = block_sizes(&a);
    assert!(!sizes.is_empty());
    assert!(sizes.iter().all(|&n| (min..=max).contains(&n)), "{sizes:?} outside {min}..={max}");
    for q in a.queue().categories() {
        assert_eq!(check_accounting(q), Ok(()));
    }
}

#[test]
fn admission_beyond_capacity_is_dropped_and_counted() {
    const CAPACITY: usize = 4;
    let stats = Arc::new(PrometheusStats::new().unwrap());
    let mut cfg = open_config();
    cfg.aggregation.enabled = false;
    cfg.queue.frame_capacity = CAPACITY;
    let mut queue = TransmitQueue::new(&cfg, stats.clone());

    for _ in 0..CAPACITY {
        assert_eq!(queue.enqueue_data(unit(peer(1), 64)).unwrap(), Admission::Queued);
    }
    let before = queue.counters().dropped[AccessCategory::BestEffort.index()];
    assert_eq!(queue.enqueue_data(unit(peer(1), 64)).unwrap(), Admission::Dropped);

    assert_eq!(queue.counters().dropped[AccessCategory::BestEffort.index()], before + 1);
    assert_eq!(stats.dropped(AccessCategory::BestEffort), 1);
    assert_eq!(queue.category(AccessCategory::BestEffort).len(), CAPACITY);

    // other categories keep their own budget
    let video = agg80211_mac::DataHeader::new(peer(1), OWN).with_tid(5);
    let admitted = queue.enqueue_data(agg80211_mac::DataUnit::zeroed(video, 64)).unwrap();
    assert_eq!(admitted, Admission::Queued);
}

#[test]
fn refused_negotiation_falls_back_to_plain_delivery() {
    let mut cfg = open_config();
    cfg.aggregation.enabled = false;
    let b_addr = peer(0);
    let mut a = LinkLayer::new(OWN, cfg.clone(), Arc::new(NoopStats)).unwrap();
    cfg.block_ack.enabled = false;
    let mut b = LinkLayer::new(b_addr, cfg, Arc::new(NoopStats)).unwrap();
    let now = Duration::ZERO;

    for _ in 0..5 {
        a.send(unit(b_addr, 100), now).unwrap();
    }
    let Some(Outbound::Management(request)) = a.poll_transmit(now).unwrap() else { panic!() };
    b.receive(Inbound::Management(request), now).unwrap();
    let Some(Outbound::Management(response)) = b.poll_transmit(now).unwrap() else { panic!() };
    a.receive(Inbound::Management(response), now).unwrap();

    assert_eq!(a.sessions().state(&b_addr), SessionState::Default);
    assert_eq!(a.sessions().record(&b_addr).map(|r| r.failures), Some(1));
    let mut sent = 0;
    while let Some(out) = a.poll_transmit(now).unwrap() {
        assert!(matches!(out, Outbound::Data { frame: Frame::Unit(_), .. }));
        sent += 1;
    }
    assert_eq!(sent, 5);
}
