//! End-to-end pipeline tests on loopback sockets.

use gemini_sync::framing;
use gemini_sync::{
    classify, Broker, BridgeConfig, KinematicWorld, LifecycleSweeper, PubSubBridge, Reconciler,
    Relay, RelayConfig, SessionRegistry, SourceConfig, StateSource, WorldLink,
};
use gemini_shared::{EntityId, EntityKind, EntitySnapshot, Frame, InitFrame, Rotation, Vec3};
use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(5);

fn relay_on_loopback(forward_addr: String, max_runtime: Duration) -> Relay {
    Relay::bind(RelayConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        forward_addr,
        max_runtime,
    })
    .unwrap()
}

fn marker_delta(seq: u64) -> Frame {
    Frame::Delta(vec![EntitySnapshot {
        id: EntityId(1),
        kind: EntityKind::Vehicle,
        archetype: "vehicle.tesla.model3".to_string(),
        color: None,
        location: Vec3::new(seq as f64, 0.0, 0.0),
        rotation: Rotation::ZERO,
        velocity: Some(Vec3::ZERO),
        source_timestamp: seq as f64 * 0.02,
    }])
}

#[test]
fn test_source_relay_reconciler_end_to_end() {
    let twin_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let twin_addr = twin_listener.local_addr().unwrap();
    let twin = std::thread::spawn(move || {
        let mut reconciler = Reconciler::new(KinematicWorld::new(), WINDOW);
        reconciler.serve(&twin_listener).unwrap();
        reconciler
    });

    let relay = relay_on_loopback(twin_addr.to_string(), Duration::from_secs(30));
    let relay_addr = relay.local_addr();
    let relay_handle = std::thread::spawn(move || relay.run().unwrap());

    let mut world = KinematicWorld::with_capacity(32);
    world.populate(3, 1);
    let mut source = StateSource::new(
        world,
        SourceConfig {
            relay_addr: relay_addr.to_string(),
            tick_interval: Duration::from_millis(10),
            run_for: Some(Duration::from_millis(300)),
        },
    );
    let sent = source.run().unwrap();
    assert!(sent > 1);

    // Producer EOF tears the relay down, which closes the consumer side
    // and ends the reconciler's serve loop.
    let stats = relay_handle.join().unwrap();
    assert_eq!(stats.frames_forwarded, sent);
    assert_eq!(stats.deltas_gated, 0);

    let mut reconciler = twin.join().unwrap();
    // 3 vehicles + 1 walker, each created exactly once and updated since.
    assert_eq!(reconciler.actor_count(), 4);
    assert_eq!(reconciler.world_mut().actor_count(), 4);
    // Vehicles got collision sensors, the walker did not.
    assert_eq!(reconciler.world_mut().sensor_count(), 3);
}

#[test]
fn test_relay_preserves_frame_order() {
    let consumer_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let consumer_addr = consumer_listener.local_addr().unwrap();
    let consumer = std::thread::spawn(move || {
        let (stream, _) = consumer_listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut frames = Vec::new();
        while let Some(frame) = framing::recv_frame(&mut reader).unwrap() {
            frames.push(frame);
        }
        frames
    });

    let relay = relay_on_loopback(consumer_addr.to_string(), Duration::from_secs(30));
    let relay_addr = relay.local_addr();
    let relay_handle = std::thread::spawn(move || relay.run().unwrap());

    let sent: Vec<Frame> = std::iter::once(Frame::Init(InitFrame::new(Vec::new())))
        .chain((0..20).map(marker_delta))
        .collect();
    {
        let stream = TcpStream::connect(relay_addr).unwrap();
        let mut writer = BufWriter::new(stream);
        for frame in &sent {
            framing::send_frame(&mut writer, frame).unwrap();
        }
    } // drop closes the producer side

    let stats = relay_handle.join().unwrap();
    assert_eq!(stats.frames_forwarded as usize, sent.len());

    let received = consumer.join().unwrap();
    // Same frames, same order, nothing added or dropped.
    assert_eq!(received, sent);
}

#[test]
fn test_relay_gates_deltas_sent_before_init() {
    let consumer_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let consumer_addr = consumer_listener.local_addr().unwrap();
    let consumer = std::thread::spawn(move || {
        let (stream, _) = consumer_listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut frames = Vec::new();
        while let Some(frame) = framing::recv_frame(&mut reader).unwrap() {
            frames.push(frame);
        }
        frames
    });

    let relay = relay_on_loopback(consumer_addr.to_string(), Duration::from_secs(30));
    let relay_addr = relay.local_addr();
    let relay_handle = std::thread::spawn(move || relay.run().unwrap());

    {
        let stream = TcpStream::connect(relay_addr).unwrap();
        let mut writer = BufWriter::new(stream);
        framing::send_frame(&mut writer, &marker_delta(0)).unwrap();
        framing::send_frame(&mut writer, &Frame::Init(InitFrame::new(Vec::new()))).unwrap();
        framing::send_frame(&mut writer, &marker_delta(1)).unwrap();
    }

    let stats = relay_handle.join().unwrap();
    assert_eq!(stats.deltas_gated, 1);
    assert_eq!(stats.frames_forwarded, 2);

    let received = consumer.join().unwrap();
    assert!(received[0].is_init());
    assert_eq!(received[1], marker_delta(1));
}

#[test]
fn test_max_runtime_propagates_shutdown_frame() {
    let twin_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let twin_addr = twin_listener.local_addr().unwrap();
    let twin = std::thread::spawn(move || {
        let mut reconciler = Reconciler::new(KinematicWorld::new(), WINDOW);
        let served = reconciler.serve(&twin_listener);
        (reconciler, served)
    });

    let relay = relay_on_loopback(twin_addr.to_string(), Duration::from_millis(300));
    let relay_addr = relay.local_addr();
    let relay_handle = std::thread::spawn(move || relay.run().unwrap());

    // Producer connects, sends the init roster, then goes quiet. The
    // runtime bound must tear everything down.
    let producer = TcpStream::connect(relay_addr).unwrap();
    let mut writer = BufWriter::new(producer.try_clone().unwrap());
    framing::send_frame(&mut writer, &Frame::Init(InitFrame::new(Vec::new()))).unwrap();

    let stats = relay_handle.join().unwrap();
    assert!(stats.shutdown_sent);

    let (_reconciler, served) = twin.join().unwrap();
    // The reconciler exited through the in-band shutdown command, not an
    // error.
    served.unwrap();
    drop(writer);
    drop(producer);
}

#[test]
fn test_consumer_failure_terminates_relay() {
    let consumer_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let consumer_addr = consumer_listener.local_addr().unwrap();
    // Accept, then immediately drop the connection.
    let consumer = std::thread::spawn(move || {
        let (stream, _) = consumer_listener.accept().unwrap();
        drop(stream);
    });

    let relay = relay_on_loopback(consumer_addr.to_string(), Duration::from_secs(30));
    let relay_addr = relay.local_addr();
    let relay_handle = std::thread::spawn(move || relay.run().unwrap());

    // The relay dials the consumer once the producer connects; the
    // consumer thread then drops the accepted connection immediately.
    let stream = TcpStream::connect(relay_addr).unwrap();
    let mut writer = BufWriter::new(stream);
    framing::send_frame(&mut writer, &Frame::Init(InitFrame::new(Vec::new()))).unwrap();
    consumer.join().unwrap();
    // Keep sending deltas until the relay gives up on its dead consumer
    // and closes our connection too.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seq = 0;
    while Instant::now() < deadline {
        if framing::send_frame(&mut writer, &marker_delta(seq)).is_err() {
            break;
        }
        seq += 1;
        std::thread::sleep(Duration::from_millis(10));
    }

    // Relay terminated on its own; either side failing is terminal for
    // the pair.
    relay_handle.join().unwrap();
}

#[test]
fn test_bridge_to_session_end_to_end() {
    let broker = Broker::new();
    let bridge = PubSubBridge::bind(
        BridgeConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            topic_prefix: "fleet".to_string(),
            drop_probability: 0.0,
            injected_delay: Duration::ZERO,
            rng_seed: 1,
        },
        broker.clone(),
    )
    .unwrap();
    let bridge_addr = bridge.local_addr();
    let shutdown = bridge.shutdown_flag();
    let subscription = broker.subscribe("fleet");
    let bridge_handle = std::thread::spawn(move || bridge.run());

    let registry = SessionRegistry::new(KinematicWorld::new());
    let t0 = Instant::now();

    let mut producer = TcpStream::connect(bridge_addr).unwrap();
    producer
        .write_all(br#"{"car_id":"11","model":"vehicle.audi.tt","location":{"x":3.0,"y":0,"z":0},"rotation":{"pitch":0,"yaw":0,"roll":0},"velocity":{"x":7.0,"y":0,"z":0}}"#)
        .unwrap();
    let publication = subscription.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(publication.topic, "fleet/11");
    registry.apply(classify(&publication).unwrap(), t0);

    let actor = registry.session_actor("11").unwrap();
    assert_eq!(registry.with_world(|w| w.actor_transform(actor)).unwrap().location.x, 3.0);

    std::thread::sleep(Duration::from_millis(50));
    producer
        .write_all(br#"{"car_id":"11","location":{"x":9.0,"y":0,"z":0},"rotation":{"pitch":0,"yaw":0,"roll":0},"velocity":{"x":6.0,"y":0,"z":0}}"#)
        .unwrap();
    let publication = subscription.recv_timeout(Duration::from_secs(2)).unwrap();
    registry.apply(classify(&publication).unwrap(), t0 + Duration::from_secs(1));
    assert_eq!(registry.with_world(|w| w.actor_transform(actor)).unwrap().location.x, 9.0);

    // Idle past the timeout: the sweep evicts the session and its actor.
    let sweeper = LifecycleSweeper::new(Duration::from_secs(1), Duration::from_secs(10));
    let evicted = registry.sweep(&sweeper, t0 + Duration::from_secs(12));
    assert_eq!(evicted, 1);
    assert!(registry.is_empty());
    assert_eq!(registry.with_world(|w| w.actor_count()), 0);

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    bridge_handle.join().unwrap().unwrap();
}
