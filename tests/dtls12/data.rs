//! Application data after the handshake.

use std::time::Instant;

use dtls_core::Error;

use crate::common::*;

#[test]
fn dtls12_large_payload_split_into_records() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    server.send_application_data(&payload).unwrap();

    let packets = collect_packets(&mut server);
    assert_eq!(packets.len(), 5);
    assert!(packets.iter().all(|p| p.len() <= 1150));
    let headers = collect_headers(&packets);
    assert!(headers
        .iter()
        .all(|h| h.ctype == APPLICATION_DATA && h.epoch == 1));

    deliver_packets(&packets, &mut client);
    assert_eq!(drain_outputs(&mut client).app_data.concat(), payload);
}

#[test]
fn dtls12_small_records_share_a_datagram() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    for i in 0..3u8 {
        client.send_application_data(&[i; 10]).unwrap();
    }
    let packets = collect_packets(&mut client);
    assert_eq!(packets.len(), 1);
    assert_eq!(parse_records(&packets[0]).len(), 3);

    deliver_packets(&packets, &mut server);
    assert_eq!(
        drain_outputs(&mut server).app_data,
        vec![vec![0; 10], vec![1; 10], vec![2; 10]]
    );
}

#[test]
fn dtls12_transmit_queue_full_is_not_fatal() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    // Default queue holds 10 datagrams.
    let err = client.send_application_data(&vec![7; 20_000]).unwrap_err();
    assert_eq!(err, Error::TransmitQueueFull);
    assert!(!is_fatal(&err));
    assert!(client.is_connected());

    collect_packets(&mut client);
    client.send_application_data(b"after drain").unwrap();
    let packets = collect_packets(&mut client);
    deliver_packets(&packets, &mut server);
    assert!(drain_outputs(&mut server)
        .app_data
        .contains(&b"after drain".to_vec()));
}

#[test]
fn dtls12_both_directions_interleaved() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    for round in 0..10u8 {
        client.send_application_data(&[round; 100]).unwrap();
        server.send_application_data(&[round ^ 0xFF; 100]).unwrap();

        let from_client = collect_packets(&mut client);
        let from_server = collect_packets(&mut server);
        deliver_packets(&from_client, &mut server);
        deliver_packets(&from_server, &mut client);

        assert_eq!(drain_outputs(&mut server).app_data, vec![vec![round; 100]]);
        assert_eq!(
            drain_outputs(&mut client).app_data,
            vec![vec![round ^ 0xFF; 100]]
        );
    }
}
