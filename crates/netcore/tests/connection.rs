use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec2;
use tessera::net::{
    Chat, ChatStyle, ConnectAck, DisconnectReason, FrameDecoder, MemoryListener, MemoryPeer,
    PlayerAppear, UserInfo, Walk,
};
use tessera::{
    ClientConfig, ClientEvent, ConnectionState, DEFAULT_PORT, MemoryTransport, NetError,
    NetworkClient, Packet, RejectReason,
};

const WAIT: Duration = Duration::from_secs(2);
const LOCAL_ID: u32 = 1;

fn fast_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.reliable.retry_interval = Duration::from_millis(30);
    config.reliable.tick_interval = Duration::from_millis(5);
    config.reliable.max_retries = 3;
    config
}

fn client_with(config: ClientConfig) -> (NetworkClient, MemoryListener) {
    let (transport, listener) = MemoryTransport::new();
    (NetworkClient::new(config, Box::new(transport)), listener)
}

/// Ticks until `done` holds for everything collected so far.
fn collect_events<F>(client: &mut NetworkClient, mut done: F) -> Vec<ClientEvent>
where
    F: FnMut(&[ClientEvent]) -> bool,
{
    let deadline = Instant::now() + WAIT;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        client.tick();
        events.extend(client.poll_events());
        if done(&events) {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    events
}

fn tick_until<F>(client: &mut NetworkClient, mut done: F) -> bool
where
    F: FnMut(&NetworkClient) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        client.tick();
        if done(client) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn connect(client: &mut NetworkClient, listener: &MemoryListener) -> MemoryPeer {
    client.connect("realm", DEFAULT_PORT, WAIT).unwrap();
    let mut peer = listener.accept(WAIT).expect("no connection attempt");
    let hello = peer.recv(WAIT).expect("no handshake");
    assert!(matches!(hello, Packet::Connect(_)));

    peer.send(&Packet::ConnectAck(ConnectAck {
        result: ConnectAck::RESULT_OK,
        server_time: 777,
        reason: String::new(),
    }))
    .unwrap();
    assert!(tick_until(client, |c| c.connection().server_time() == Some(777)));
    peer
}

fn user_info(id: u32, x: u16, y: u16) -> UserInfo {
    UserInfo {
        entity_id: id,
        level: 12,
        hp: 90,
        max_hp: 100,
        x,
        y,
        name: "aria".into(),
        ..Default::default()
    }
}

/// Receives the next reliable packet, acks it and returns its sequence and
/// inner packet.
fn recv_reliable(peer: &mut MemoryPeer, ack: bool) -> (u32, Packet) {
    let packet = peer
        .recv_matching(WAIT, |p| matches!(p, Packet::Reliable { .. }))
        .expect("no reliable packet");
    let Packet::Reliable { sequence, frame } = packet else {
        unreachable!()
    };
    if ack {
        peer.send(&Packet::Ack { sequence }).unwrap();
    }
    (sequence, Packet::decode(&frame).unwrap())
}

fn log_in(client: &mut NetworkClient, listener: &MemoryListener) -> MemoryPeer {
    let mut peer = connect(client, listener);
    client.login("aria", "hunter2", "emerald").unwrap();
    assert_eq!(client.state(), ConnectionState::Authenticating);

    let (_, account) = recv_reliable(&mut peer, true);
    match account {
        Packet::Account(account) => {
            assert_eq!(account.username, "aria");
            assert_eq!(account.password, "hunter2");
            assert_eq!(account.realm, "emerald");
        }
        other => panic!("expected account, got {other:?}"),
    }

    peer.send(&Packet::UserInfo(user_info(LOCAL_ID, 100, 100)))
        .unwrap();
    assert!(tick_until(client, |c| c.state() == ConnectionState::InGame));
    peer
}

fn appear(peer: &mut MemoryPeer, id: u32, x: u16, y: u16) {
    peer.send(&Packet::PlayerAppear(PlayerAppear {
        entity_id: id,
        x,
        y,
        direction: 0,
        name: format!("remote-{id}"),
    }))
    .unwrap();
}

fn walk(peer: &mut MemoryPeer, id: u32, x: u16, y: u16, timestamp: u32) {
    peer.send(&Packet::Walk(Walk {
        timestamp,
        entity_id: id,
        direction: 0,
        x,
        y,
        mode: Walk::MODE_WALK,
    }))
    .unwrap();
}

fn chat_from(sender_id: u32, message: &str) -> Packet {
    Packet::Chat(Chat {
        color: Chat::DEFAULT_COLOR,
        channel: Chat::CHANNEL_LOCAL,
        style: ChatStyle::BOLD,
        timestamp: 5,
        sender_id,
        recipient_id: 0,
        sender_name: "bram".into(),
        recipient_name: String::new(),
        message: message.into(),
    })
}

#[test]
fn test_connect_and_login_flow() {
    let (mut client, listener) = client_with(fast_config());
    let _peer = log_in(&mut client, &listener);

    let events = client.poll_events();
    assert_eq!(events.first(), Some(&ClientEvent::Connected));
    assert!(events.contains(&ClientEvent::PlayerLogin {
        id: LOCAL_ID,
        name: "aria".into(),
        position: Vec2::new(100.0, 100.0),
        local: true,
    }));

    let local = client.local_entity().unwrap();
    assert!(local.is_local);
    assert_eq!(client.world().profile().map(|p| p.level), Some(12));
    assert!(tick_until(&mut client, |c| c.stats().pending_reliable == 0));
}

#[test]
fn test_handshake_rejection_is_an_error() {
    let (mut client, listener) = client_with(fast_config());
    client.connect("realm", DEFAULT_PORT, WAIT).unwrap();
    let mut peer = listener.accept(WAIT).unwrap();

    peer.send(&Packet::ConnectAck(ConnectAck {
        result: 3,
        server_time: 0,
        reason: "client too old".into(),
    }))
    .unwrap();

    let events = collect_events(&mut client, |events| {
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::ConnectionFailed { .. }))
    });
    assert_eq!(client.state(), ConnectionState::Error);
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::ConnectionFailed { reason } if reason.contains("client too old")
    )));
}

#[test]
fn test_login_rejected_by_server() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = connect(&mut client, &listener);
    client.login("aria", "wrong", "emerald").unwrap();
    recv_reliable(&mut peer, true);

    peer.send(&Packet::Disconnect {
        reason: DisconnectReason::AuthenticationFailed,
    })
    .unwrap();
    assert!(tick_until(&mut client, |c| c.state() == ConnectionState::Error));

    // Retrying after a failure is allowed.
    client.connect("realm", DEFAULT_PORT, WAIT).unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test]
fn test_operations_rejected_in_wrong_state() {
    let (mut client, listener) = client_with(fast_config());
    assert!(matches!(
        client.send_chat("hi", Chat::CHANNEL_LOCAL, None),
        Err(NetError::InvalidState { .. })
    ));
    assert!(matches!(
        client.login("aria", "pw", "emerald"),
        Err(NetError::InvalidState { .. })
    ));

    let _peer = log_in(&mut client, &listener);
    assert!(matches!(
        client.connect("realm", DEFAULT_PORT, WAIT),
        Err(NetError::InvalidState { .. })
    ));
    assert!(matches!(
        client.attack(404, None),
        Err(NetError::UnknownEntity { id: 404 })
    ));
}

#[test]
fn test_late_connect_ack_is_ignored_in_game() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    peer.send(&Packet::ConnectAck(ConnectAck {
        result: 9,
        server_time: 0,
        reason: "bye".into(),
    }))
    .unwrap();
    peer.send(&Packet::Heartbeat { timestamp: 2 }).unwrap();
    assert!(
        peer.recv_matching(WAIT, |p| matches!(p, Packet::HeartbeatAck { .. }))
            .is_some()
    );

    for _ in 0..10 {
        client.tick();
    }
    assert!(client.poll_events().is_empty());
    assert_eq!(client.state(), ConnectionState::InGame);
    assert!(client.connection().is_linked());
    assert_eq!(client.connection().server_time(), Some(777));

    let sequence = client
        .send_chat("still here", Chat::CHANNEL_WORLD, None)
        .unwrap();
    let (received, _) = recv_reliable(&mut peer, true);
    assert_eq!(received, sequence);
}

#[test]
fn test_game_packets_ignored_before_in_game() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = connect(&mut client, &listener);
    client.poll_events();

    appear(&mut peer, 9, 10, 10);
    peer.send(&chat_from(9, "too early")).unwrap();
    peer.send(&Packet::Heartbeat { timestamp: 1 }).unwrap();
    assert!(
        peer.recv_matching(WAIT, |p| matches!(p, Packet::HeartbeatAck { .. }))
            .is_some()
    );

    for _ in 0..10 {
        client.tick();
    }
    assert!(client.poll_events().is_empty());
    assert!(client.entity(9).is_none());
    assert_eq!(client.stats().network.packets_received, 4);
}

#[test]
fn test_remote_player_movement() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    appear(&mut peer, 2, 101, 100);
    walk(&mut peer, 2, 101, 100, 1_000);
    walk(&mut peer, 2, 105, 100, 2_000);
    walk(&mut peer, 2, 160, 100, 2_100);
    // Older than the last applied movement.
    walk(&mut peer, 2, 103, 100, 1_500);

    let events = collect_events(&mut client, |events| {
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::MovementRejected { .. }))
    });
    let moves: Vec<Vec2> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::PlayerMoved { id: 2, position } => Some(*position),
            _ => None,
        })
        .collect();
    assert_eq!(moves, vec![Vec2::new(101.0, 100.0), Vec2::new(105.0, 100.0)]);
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::MovementRejected {
            id: 2,
            reason: RejectReason::TooFast { .. }
        }
    )));

    for _ in 0..5 {
        client.tick();
    }
    let remote = client.entity(2).unwrap();
    assert_eq!(remote.position, Vec2::new(105.0, 100.0));
    assert_eq!(remote.velocity, Vec2::new(4.0, 0.0));
    assert_eq!(client.observers(LOCAL_ID), vec![2]);
    assert_eq!(client.stats().suspicious.get(&2), Some(&1));

    let pose = client
        .interpolated_state(2, Instant::now() + Duration::from_secs(1))
        .unwrap();
    assert_eq!(pose.position, Vec2::new(105.0, 100.0));

    peer.send(&Packet::PlayerDisappear { entity_id: 2 }).unwrap();
    let events = collect_events(&mut client, |events| !events.is_empty());
    assert_eq!(events, vec![ClientEvent::PlayerLogout { id: 2 }]);
    assert!(client.observers(LOCAL_ID).is_empty());
    assert!(client.interpolated_state(2, Instant::now()).is_none());
}

#[test]
fn test_first_walk_after_appear_cannot_teleport() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    appear(&mut peer, 4, 50, 50);
    walk(&mut peer, 4, 90, 50, 10);

    let events = collect_events(&mut client, |events| {
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::MovementRejected { .. }))
    });
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::MovementRejected {
            id: 4,
            reason: RejectReason::TooFast { .. }
        }
    )));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ClientEvent::PlayerMoved { id: 4, .. }))
    );
    assert_eq!(client.entity(4).unwrap().position, Vec2::new(50.0, 50.0));
}

#[test]
fn test_repeated_violations_flag_suspicious_activity() {
    let mut config = fast_config();
    config.anticheat.suspicious_threshold = 2;
    let (mut client, listener) = client_with(config);
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    appear(&mut peer, 3, 50, 50);
    walk(&mut peer, 3, 50, 50, 100);
    for step in 1..=3u32 {
        walk(&mut peer, 3, 50 + 100 * step as u16, 50, 100 + step * 10);
    }

    let events = collect_events(&mut client, |events| {
        events
            .iter()
            .filter(|e| matches!(e, ClientEvent::MovementRejected { .. }))
            .count()
            == 3
    });
    let flagged: Vec<&ClientEvent> = events
        .iter()
        .filter(|e| matches!(e, ClientEvent::SuspiciousActivity { .. }))
        .collect();
    assert_eq!(
        flagged,
        vec![&ClientEvent::SuspiciousActivity {
            id: 3,
            violations: 2
        }]
    );
    assert_eq!(client.entity(3).unwrap().position, Vec2::new(50.0, 50.0));
}

#[test]
fn test_duplicate_reliable_applied_once_acked_twice() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    let wrapped = Packet::Reliable {
        sequence: 7,
        frame: chat_from(2, "once only").encode(),
    };
    peer.send(&wrapped).unwrap();
    peer.send(&wrapped).unwrap();

    let mut acks = 0;
    let deadline = Instant::now() + WAIT;
    while acks < 2 && Instant::now() < deadline {
        if let Some(Packet::Ack { sequence }) =
            peer.recv_matching(WAIT, |p| matches!(p, Packet::Ack { .. }))
        {
            assert_eq!(sequence, 7);
            acks += 1;
        }
    }
    assert_eq!(acks, 2);

    let events = collect_events(&mut client, |_| false);
    let chats = events
        .iter()
        .filter(|e| matches!(e, ClientEvent::ChatMessage { text, .. } if text == "once only"))
        .count();
    assert_eq!(chats, 1);
    assert_eq!(client.stats().network.duplicates, 1);
}

#[test]
fn test_unknown_packet_does_not_break_framing() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    let mut unknown = Vec::new();
    unknown.extend_from_slice(&10u16.to_le_bytes());
    unknown.extend_from_slice(&0x0099u16.to_le_bytes());
    unknown.extend_from_slice(&[0xAB; 6]);
    unknown.extend_from_slice(&chat_from(2, "still in sync").encode());
    peer.send_raw(&unknown).unwrap();

    let events = collect_events(&mut client, |events| !events.is_empty());
    assert_eq!(
        events,
        vec![ClientEvent::ChatMessage {
            sender_id: 2,
            sender: "bram".into(),
            channel: Chat::CHANNEL_LOCAL,
            text: "still in sync".into(),
        }]
    );
    assert_eq!(client.stats().network.decode_errors, 1);
    assert_eq!(client.state(), ConnectionState::InGame);
}

#[test]
fn test_acked_reliable_is_not_retransmitted() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);

    let sequence = client
        .send_chat("hello", Chat::CHANNEL_WORLD, None)
        .unwrap();
    let (received, inner) = recv_reliable(&mut peer, true);
    assert_eq!(received, sequence);
    assert!(matches!(inner, Packet::Chat(chat) if chat.message == "hello"));

    assert!(tick_until(&mut client, |c| c.stats().pending_reliable == 0));
    assert!(
        peer.recv_matching(Duration::from_millis(200), |p| matches!(
            p,
            Packet::Reliable { sequence: s, .. } if *s == sequence
        ))
        .is_none()
    );
    assert_eq!(client.stats().network.retransmissions, 0);

    // A late second ack is harmless.
    peer.send(&Packet::Ack { sequence }).unwrap();
    for _ in 0..5 {
        client.tick();
    }
    assert_eq!(client.state(), ConnectionState::InGame);
}

#[test]
fn test_unacked_reliable_retried_then_lost() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    client.poll_events();

    let sequence = client.use_item(0xFEED, 1, [1, 2, 3]).unwrap();

    let mut copies = 0;
    let mut lost = false;
    let deadline = Instant::now() + WAIT;
    while !lost && Instant::now() < deadline {
        if peer
            .recv_matching(Duration::from_millis(10), |p| matches!(
                p,
                Packet::Reliable { sequence: s, .. } if *s == sequence
            ))
            .is_some()
        {
            copies += 1;
        }
        client.tick();
        lost = client
            .poll_events()
            .contains(&ClientEvent::DeliveryLost { sequence });
    }

    // Drain any copy still in flight when the loss was reported.
    while peer
        .recv_matching(Duration::from_millis(20), |p| matches!(
            p,
            Packet::Reliable { sequence: s, .. } if *s == sequence
        ))
        .is_some()
    {
        copies += 1;
    }

    assert!(lost);
    assert_eq!(copies, 4);
    let stats = client.stats();
    assert_eq!(stats.network.retransmissions, 3);
    assert_eq!(stats.network.packets_lost, 1);
    assert_eq!(stats.pending_reliable, 0);
    assert_eq!(client.state(), ConnectionState::InGame);
}

#[test]
fn test_disconnect_clears_everything_and_is_idempotent() {
    let (mut client, listener) = client_with(fast_config());
    let mut peer = log_in(&mut client, &listener);
    appear(&mut peer, 2, 101, 100);
    assert!(tick_until(&mut client, |c| c.entity(2).is_some()));
    client.poll_events();

    assert!(client.disconnect());
    assert!(!client.disconnect());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.entities().count(), 0);
    assert!(!client.dispatcher_mut().has_handler(tessera::PacketId::Walk));

    let stats = client.stats();
    assert_eq!(stats.aoi_objects, 0);
    assert_eq!(stats.pending_reliable, 0);
    assert_eq!(stats.inbound_queued, 0);

    assert_eq!(
        client.poll_events(),
        vec![ClientEvent::Disconnected {
            reason: "disconnected by client".into()
        }]
    );
    assert!(
        peer.recv_matching(WAIT, |p| matches!(p, Packet::Disconnect { .. }))
            .is_some()
    );
}

#[test]
fn test_transport_loss_triggers_auto_reconnect() {
    let mut config = fast_config();
    config.reconnect.enabled = true;
    config.reconnect.delay = Duration::from_millis(20);
    let (mut client, listener) = client_with(config);
    let peer = log_in(&mut client, &listener);
    client.poll_events();

    peer.close();
    let events = collect_events(&mut client, |events| {
        events.contains(&ClientEvent::Connected)
    });

    assert!(matches!(
        events.first(),
        Some(ClientEvent::Disconnected { .. })
    ));
    assert!(events.contains(&ClientEvent::Connected));
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.local_entity().is_none());

    let mut second = listener.accept(WAIT).expect("no reconnect attempt");
    assert!(matches!(second.recv(WAIT), Some(Packet::Connect(_))));
}

#[test]
fn test_reconnect_uses_last_endpoint() {
    let (mut client, listener) = client_with(fast_config());
    assert!(matches!(client.reconnect(), Err(NetError::NotConnected)));

    let _first = connect(&mut client, &listener);
    client.reconnect().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.connection().endpoint().map(|e| e.port), Some(DEFAULT_PORT));
    assert!(listener.accept(WAIT).is_some());
}

#[test]
fn test_connect_default_uses_configured_timeout() {
    let mut config = fast_config();
    config.connection.connect_timeout = Duration::from_millis(1_500);
    let (mut client, listener) = client_with(config);

    client.connect_default("realm", DEFAULT_PORT).unwrap();
    let endpoint = client.connection().endpoint().unwrap();
    assert_eq!(endpoint.host, "realm");
    assert_eq!(endpoint.timeout, Duration::from_millis(1_500));
    assert!(listener.accept(WAIT).is_some());
}

#[test]
fn test_connect_refused() {
    let mut client = NetworkClient::new(fast_config(), Box::new(MemoryTransport::refusing()));
    assert!(client.connect("realm", DEFAULT_PORT, WAIT).is_err());
    assert_eq!(client.state(), ConnectionState::Error);
    assert!(matches!(
        client.poll_events().as_slice(),
        [ClientEvent::ConnectionFailed { .. }]
    ));
}

#[test]
fn test_tcp_loopback_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(WAIT)).unwrap();
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 512];
        let mut received = Vec::new();
        let mut acked = false;

        loop {
            while let Ok(Some(packet)) = decoder.next_frame() {
                received.push(packet);
            }
            if received
                .iter()
                .any(|p| matches!(p, Packet::Disconnect { .. }))
            {
                break;
            }
            if !acked && received.iter().any(|p| matches!(p, Packet::Connect(_))) {
                let ack = Packet::ConnectAck(ConnectAck {
                    result: ConnectAck::RESULT_OK,
                    server_time: 4242,
                    reason: String::new(),
                });
                stream.write_all(&ack.encode()).unwrap();
                acked = true;
            }
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => decoder.push(&buf[..n]),
            }
        }
        received
    });

    let mut client = NetworkClient::with_tcp(fast_config());
    client.connect("127.0.0.1", port, WAIT).unwrap();
    assert!(tick_until(&mut client, |c| c.connection().server_time() == Some(4242)));
    assert!(client.disconnect());

    let received = server.join().unwrap();
    assert!(matches!(received.first(), Some(Packet::Connect(_))));
    assert!(received.contains(&Packet::Disconnect {
        reason: DisconnectReason::Graceful
    }));
}

#[test]
fn test_sends_do_not_block_when_server_stops_reading() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let _ = release_rx.recv_timeout(Duration::from_secs(10));
        drop(stream);
    });

    let mut config = fast_config();
    config.connection.write_timeout = Duration::from_secs(1);
    config.connection.outbound_queue_capacity = 8;
    let mut client = NetworkClient::with_tcp(config);
    client.connect("127.0.0.1", port, WAIT).unwrap();

    let packet = chat_from(LOCAL_ID, &"x".repeat(250));
    let started = Instant::now();
    let mut full = false;
    for _ in 0..200_000 {
        match client.connection().send(&packet) {
            Ok(()) => {}
            Err(NetError::OutboundFull) => {
                full = true;
                break;
            }
            Err(other) => panic!("unexpected send error: {other}"),
        }
    }
    assert!(full);
    assert!(started.elapsed() < Duration::from_secs(5));

    let started = Instant::now();
    assert!(client.disconnect());
    assert!(started.elapsed() < WAIT);

    release_tx.send(()).unwrap();
    server.join().unwrap();
}
