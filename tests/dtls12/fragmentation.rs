//! Handshake and data over a small MTU.

use std::time::Instant;

use dtls_core::message::CipherSuite;
use dtls_core::{Config, Dtls};

use crate::common::*;

const MTU: usize = 200;

fn small_mtu_config(suite: CipherSuite) -> std::sync::Arc<Config> {
    std::sync::Arc::new(
        Config::builder()
            .mtu(MTU)
            .max_queue_tx(100)
            .max_queue_rx(100)
            .cipher_suites(&[suite])
            .build()
            .unwrap(),
    )
}

/// `(length, fragment_offset, fragment_length)` of every epoch 0 handshake fragment.
fn fragment_ranges(datagrams: &[Vec<u8>]) -> Vec<(u8, u32, u32, u32)> {
    let u24 = |b: &[u8]| u32::from_be_bytes([0, b[0], b[1], b[2]]);
    datagrams
        .iter()
        .flat_map(|d| split_records(d))
        .filter(|(h, _)| h.ctype == HANDSHAKE && h.epoch == 0)
        .map(|(_, f)| (f[0], u24(&f[1..4]), u24(&f[6..9]), u24(&f[9..12])))
        .collect()
}

#[test]
fn dtls12_handshake_fragments_within_mtu() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let config = small_mtu_config(CipherSuite::DHE_RSA_AES128_GCM_SHA256);
    let (mut client, mut server) = new_pair(config.clone(), config, now);

    let log = run_handshake(&mut client, &mut server, now);

    for datagram in log.client.packets.iter().chain(&log.server.packets) {
        assert!(datagram.len() <= MTU, "datagram of {} bytes", datagram.len());
    }

    // Certificate and ServerKeyExchange do not fit one record.
    let ranges = fragment_ranges(&log.server.packets);
    for msg_type in [CERTIFICATE, SERVER_KEY_EXCHANGE] {
        let fragments: Vec<_> = ranges.iter().filter(|r| r.0 == msg_type).collect();
        assert!(fragments.len() > 1, "type {} not fragmented", msg_type);

        // Contiguous, in order, covering the whole message.
        let total = fragments[0].1;
        let mut expected_offset = 0;
        for (_, length, offset, fragment_length) in fragments {
            assert_eq!(*length, total);
            assert_eq!(*offset, expected_offset);
            expected_offset += fragment_length;
        }
        assert_eq!(expected_offset, total);
    }

    assert_eq!(log.client.peer_cert.as_deref(), Some(SERVER_CERT));
}

#[test]
fn dtls12_application_data_within_mtu() {
    let now = Instant::now();
    let config = small_mtu_config(CipherSuite::RSA_AES256_GCM_SHA384);
    let (mut client, mut server) = new_pair(config.clone(), config, now);
    run_handshake(&mut client, &mut server, now);

    let payload: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
    client.send_application_data(&payload).unwrap();
    let packets = collect_packets(&mut client);
    assert!(packets.len() > 1);
    assert!(packets.iter().all(|p| p.len() <= MTU));

    deliver_packets(&packets, &mut server);
    let received = drain_outputs(&mut server).app_data;
    assert_eq!(received.len(), packets.len());
    assert_eq!(received.concat(), payload);
}

#[test]
fn dtls12_duplicated_fragments_are_harmless() {
    //! Every datagram delivered twice.

    let _ = env_logger::try_init();
    let now = Instant::now();
    let config = small_mtu_config(CipherSuite::RSA_AES128_GCM_SHA256);
    let (mut client, mut server) = new_pair(config.clone(), config, now);

    let deliver_twice = |packets: &[Vec<u8>], dest: &mut Dtls| {
        for p in packets {
            dest.handle_packet(p).unwrap();
            dest.handle_packet(p).unwrap();
        }
    };

    let mut client_connected = false;
    let mut server_connected = false;
    for _ in 0..20 {
        client.handle_timeout(now).unwrap();
        server.handle_timeout(now).unwrap();

        let c = drain_outputs(&mut client);
        client_connected |= c.connected;
        deliver_twice(&c.packets, &mut server);

        let s = drain_outputs(&mut server);
        server_connected |= s.connected;
        deliver_twice(&s.packets, &mut client);

        if client_connected && server_connected {
            break;
        }
    }

    assert!(client.is_connected());
    assert!(server.is_connected());
}
