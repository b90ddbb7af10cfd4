//! Datagrams arriving out of order during the handshake.

use std::time::Instant;

use dtls_core::message::CipherSuite;

use crate::common::*;

#[test]
fn dtls12_server_flight_reversed() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let config = dtls12_config_with_mtu(200);
    let (mut client, mut server) = new_pair(config.clone(), config, now);

    client.handle_timeout(now).unwrap();
    server.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);
    deliver_packets(&collect_packets(&mut client), &mut server);

    let mut flight4 = collect_packets(&mut server);
    assert!(flight4.len() > 2);
    flight4.reverse();

    // Nothing to answer until the ServerHello arrives last.
    for (i, datagram) in flight4.iter().enumerate() {
        client.handle_packet(datagram).unwrap();
        let out = collect_packets(&mut client);
        if i + 1 < flight4.len() {
            assert!(out.is_empty(), "answered early at {}", i);
        } else {
            assert!(handshake_types(&out).contains(&CLIENT_KEY_EXCHANGE));
            deliver_packets(&out, &mut server);
        }
    }

    let server_out = drain_outputs(&mut server);
    assert!(server_out.connected);
    deliver_packets(&server_out.packets, &mut client);
    assert!(drain_outputs(&mut client).connected);
}

#[test]
fn dtls12_finished_before_change_cipher_spec() {
    //! The epoch 1 Finished is held until the ChangeCipherSpec that
    //! precedes it arrives.

    let _ = env_logger::try_init();
    let now = Instant::now();
    let config = dtls12_config_with_suites(&[CipherSuite::RSA_AES128_GCM_SHA256]);
    let (mut client, mut server) = new_pair(config.clone(), config, now);

    client.handle_timeout(now).unwrap();
    server.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);

    // Split flight 5 into one datagram per record, swap CCS and Finished.
    let flight5 = collect_packets(&mut client);
    let mut records: Vec<Vec<u8>> = Vec::new();
    for datagram in &flight5 {
        let mut at = 0;
        for (_, fragment) in split_records(datagram) {
            let end = at + 13 + fragment.len();
            records.push(datagram[at..end].to_vec());
            at = end;
        }
    }
    let ccs = records
        .iter()
        .position(|r| r[0] == CHANGE_CIPHER_SPEC)
        .unwrap();
    let last = records.len() - 1;
    assert_eq!(ccs + 1, last);
    records.swap(ccs, last);

    deliver_packets(&records[..last], &mut server);
    assert!(!drain_outputs(&mut server).connected);

    deliver_packets(&records[last..], &mut server);
    let server_out = drain_outputs(&mut server);
    assert!(server_out.connected);

    deliver_packets(&server_out.packets, &mut client);
    assert!(drain_outputs(&mut client).connected);
}
