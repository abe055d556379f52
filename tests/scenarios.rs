//! End-to-end scenarios exercised against in-process engines wired together
//! with `ChannelTransport`, so no real sockets and no timing flakiness.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use rumormesh::ports::{ChannelNetwork, FixedClock, StepRng};
use rumormesh::{EngineConfig, GossipEngine, GossipState};

type TestEngine = GossipEngine<rumormesh::ports::ChannelTransport, FixedClock, StepRng>;

fn spawn(
    net: &ChannelNetwork,
    addr: SocketAddr,
    config: EngineConfig,
    clock: FixedClock,
    received: Rc<RefCell<Vec<Vec<u8>>>>,
) -> TestEngine {
    let transport = net.transport(addr);
    GossipEngine::create(transport, clock, StepRng::new(1), config, move |data: &[u8]| {
        received.borrow_mut().push(data.to_vec());
    })
    .unwrap()
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Drain every node's inbox and flush its outbox, repeatedly, until the
/// handshake traffic generated by `join` has fully propagated. Safe to
/// over-call: an empty inbox is a no-op and one-shot envelopes (WELCOME,
/// ACK) are never resent once sent.
fn settle(nodes: &mut [&mut TestEngine]) {
    for _ in 0..6 {
        for node in nodes.iter_mut() {
            for _ in 0..10 {
                node.process_receive().unwrap();
            }
            node.process_send().unwrap();
        }
    }
}

#[test]
fn seed_only_bootstrap() {
    let net = ChannelNetwork::new();
    let received = Rc::new(RefCell::new(Vec::new()));
    let mut node = spawn(&net, addr(65000), EngineConfig::default(), FixedClock::new(0), received);

    node.join(&[]).unwrap();
    assert_eq!(node.state(), GossipState::Connected);
    assert_eq!(node.process_send().unwrap(), 0);
}

#[test]
fn two_node_join() {
    let net = ChannelNetwork::new();
    let mut a = spawn(&net, addr(65001), EngineConfig::default(), FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));
    let mut b = spawn(&net, addr(65002), EngineConfig::default(), FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));

    a.join(&[]).unwrap();
    b.join(&[addr(65001)]).unwrap();
    assert_eq!(b.state(), GossipState::Joining);

    settle(&mut [&mut a, &mut b]);

    assert_eq!(b.state(), GossipState::Connected);
    assert_eq!(a.member_count(), 1);
    assert_eq!(b.member_count(), 1);
    // the HELLO envelope was removed from B's outbound queue by the WELCOME.
    assert_eq!(b.outbound_queue_len(), 0);
}

#[test]
fn hello_ack_via_welcome_clears_only_matching_envelope() {
    let net = ChannelNetwork::new();
    let mut a = spawn(&net, addr(65003), EngineConfig::default(), FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));
    let mut b = spawn(&net, addr(65004), EngineConfig::default(), FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));

    a.join(&[]).unwrap();
    b.join(&[addr(65003)]).unwrap();
    settle(&mut [&mut a, &mut b]);

    assert_eq!(b.outbound_queue_len(), 0);
}

/// Three-node setup where A's DATA reaches C both directly and via B's
/// rebroadcast — the same vector record arriving twice, which is the
/// realistic way duplicate delivery happens in a gossip cluster.
#[test]
fn data_dedup_invokes_callback_once() {
    let net = ChannelNetwork::new();
    let mut a = spawn(&net, addr(65005), EngineConfig::default(), FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));
    let mut b = spawn(&net, addr(65006), EngineConfig::default(), FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));
    let received_c = Rc::new(RefCell::new(Vec::new()));
    let mut c = spawn(&net, addr(65007), EngineConfig::default(), FixedClock::new(0), received_c.clone());

    a.join(&[]).unwrap();
    b.join(&[addr(65005)]).unwrap();
    settle(&mut [&mut a, &mut b]);
    assert_eq!(a.member_count(), 1);

    c.join(&[addr(65005)]).unwrap();
    settle(&mut [&mut a, &mut b, &mut c]);

    assert_eq!(a.member_count(), 2);
    assert_eq!(b.member_count(), 2);
    assert_eq!(c.member_count(), 2);

    // A rumors one DATA message; with a rumor factor of 3 it reaches both
    // B and C directly in the same send pass.
    a.send_data(b"hi").unwrap();
    a.process_send().unwrap();

    // C processes A's direct copy first: delivered once.
    c.process_receive().unwrap();
    assert_eq!(received_c.borrow().len(), 1);

    // B processes its copy and rebroadcasts to its own peers (A and C) —
    // C will see this exact vector record a second time, via B.
    b.process_receive().unwrap();
    b.process_send().unwrap();
    c.process_receive().unwrap();

    assert_eq!(received_c.borrow().len(), 1, "duplicate vector record must not re-deliver");
    assert_eq!(received_c.borrow()[0], b"hi");
}

#[test]
fn unreachable_peer_is_evicted_after_retry_budget() {
    let net = ChannelNetwork::new();
    let clock = FixedClock::new(0);
    let mut lonely = spawn(
        &net,
        addr(65008),
        EngineConfig::default(),
        clock.clone(),
        Rc::new(RefCell::new(Vec::new())),
    );
    // nobody is bound at this address; the HELLO will never be acked.
    lonely.join(&[addr(59999)]).unwrap();

    assert_eq!(lonely.process_send().unwrap(), 1);
    assert_eq!(lonely.outbound_queue_len(), 1);

    for _ in 0..2 {
        clock.advance(rumormesh::config::MESSAGE_RETRY_INTERVAL_MS + 1);
        let sent = lonely.process_send().unwrap();
        assert_eq!(sent, 1);
    }

    assert_eq!(lonely.outbound_queue_len(), 0);
    // HELLO's retry budget exhausted, but state stays Joining: there was no
    // member to evict (the seed was never inserted into the member set).
    assert_eq!(lonely.state(), GossipState::Joining);
}

#[test]
fn buffer_pool_saturation_caps_slots_at_configured_size() {
    let net = ChannelNetwork::new();
    let config = EngineConfig {
        max_output_messages: 2,
    };
    let mut a = spawn(&net, addr(65011), config, FixedClock::new(0), Rc::new(RefCell::new(Vec::new())));
    let mut b = spawn(
        &net,
        addr(65012),
        EngineConfig::default(),
        FixedClock::new(0),
        Rc::new(RefCell::new(Vec::new())),
    );

    a.join(&[]).unwrap();
    b.join(&[addr(65011)]).unwrap();
    settle(&mut [&mut a, &mut b]);
    assert_eq!(a.member_count(), 1);

    // Three independent DATA messages, each needing its own buffer slot,
    // enqueued without draining the queue in between: with a pool of 2
    // slots the third enqueue must evict one of the first two rather than
    // growing the pool.
    a.send_data(b"one").unwrap();
    a.send_data(b"two").unwrap();
    a.send_data(b"three").unwrap();

    assert_eq!(a.outbound_slots_used(), 2);
    assert_eq!(a.outbound_queue_len(), 2);
}
