//! End-to-end forwarder tests against real local sockets (spec.md §8
//! scenario C and boundary behaviors 10-11).

use logforge_forward::pool::ForwarderAction;
use logforge_forward::target::Target;
use logforge_core::{Action, ActionOutcome};
use logforge_protocol::config::{FramingMode, ForwarderConfig, TransportProtocol};
use logforge_protocol::defaults::MAX_UDP_PAYLOAD;
use logforge_protocol::types::{Facility, Pri, Severity};
use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::time::Duration;

fn msg(body: &str) -> logforge_protocol::types::Message {
    logforge_protocol::types::Message::construct("host", Pri::new(Facility::User, Severity::Info), body)
}

/// spec.md §8 scenario C: pool with one target down, one target up ->
/// messages still commit via the healthy target instead of failing the
/// whole action.
#[test]
fn pool_fails_over_to_the_healthy_target() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = stream.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
        }
    });

    let cfg = ForwarderConfig {
        protocol: TransportProtocol::Tcp,
        framing: FramingMode::OctetStuffing { delimiter: b'\n' },
        targets: vec!["127.0.0.1".into(), "127.0.0.1".into()],
        ports: vec![1, addr.port()],
        send_buffer_cap: 1,
        ..ForwarderConfig::default()
    };
    let action = ForwarderAction::new("fwd-pool", cfg);
    let message = msg("failover check");

    let mut committed = false;
    for _ in 0..5 {
        if action.process(&message) == ActionOutcome::Committed {
            committed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(committed, "pool should commit via the one reachable target");
}

/// spec.md §8 boundary behavior 11: TCP send-buffer batching holds
/// writes below the configured cap and flushes once the cap is reached.
#[test]
fn tcp_send_buffer_batches_until_cap_then_flushes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let received = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        buf
    });

    let cfg = ForwarderConfig {
        protocol: TransportProtocol::Tcp,
        framing: FramingMode::OctetStuffing { delimiter: b'\n' },
        send_buffer_cap: 16_000,
        ..ForwarderConfig::default()
    };
    let target = Target::new("127.0.0.1", addr.port(), cfg);

    // Each frame is ~1001 bytes (1000-byte body + delimiter); 16 of them
    // sit under the 16000-byte cap and must NOT reach the peer until the
    // 17th send pushes the buffer over the cap and flushes it.
    let body = vec![b'x'; 1000];
    for _ in 0..16 {
        target.send(&body).unwrap();
    }
    // Give the (non-existent, since nothing was flushed) peer a moment;
    // it should see nothing yet.
    std::thread::sleep(Duration::from_millis(50));

    for _ in 0..1 {
        target.send(&body).unwrap();
    }
    target.flush().unwrap();

    let bytes = received.join().unwrap();
    assert_eq!(bytes.len(), 17 * 1001);
}

/// spec.md §8 boundary behavior 10: a UDP payload over the 65507-byte
/// ceiling is truncated to fit rather than failing the send.
#[test]
fn udp_oversize_datagram_is_truncated_to_the_ceiling() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let cfg = ForwarderConfig {
        protocol: TransportProtocol::Udp,
        framing: FramingMode::OctetStuffing { delimiter: b'\n' },
        ..ForwarderConfig::default()
    };
    let target = Target::new("127.0.0.1", addr.port(), cfg);

    let oversized = vec![b'y'; MAX_UDP_PAYLOAD + 500];
    target.send(&oversized).unwrap();

    let mut buf = vec![0u8; MAX_UDP_PAYLOAD + 1000];
    let (n, _) = socket.recv_from(&mut buf).unwrap();
    assert!(n <= MAX_UDP_PAYLOAD, "datagram must be truncated to the UDP ceiling, got {n}");
}
