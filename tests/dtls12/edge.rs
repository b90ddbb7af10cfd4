//! Replay, tampering, alerts and closing.

use std::time::Instant;

use dtls_core::message::{AlertDescription, AlertLevel};
use dtls_core::{Dtls, Error};

use crate::common::*;

/// An unprotected epoch 0 alert record.
fn plain_alert(level: u8, description: u8) -> Vec<u8> {
    let mut record = vec![ALERT, 0xFE, 0xFD, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
    record.extend_from_slice(&[level, description]);
    record
}

#[test]
fn dtls12_replayed_record_is_dropped() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    client.send_application_data(b"once").unwrap();
    let packets = collect_packets(&mut client);
    assert_eq!(packets.len(), 1);

    server.handle_packet(&packets[0]).unwrap();
    assert_eq!(drain_outputs(&mut server).app_data, vec![b"once".to_vec()]);

    // Same bytes again: silently ignored, session unharmed.
    server.handle_packet(&packets[0]).unwrap();
    let out = drain_outputs(&mut server);
    assert!(out.app_data.is_empty());
    assert!(out.packets.is_empty());
    assert!(server.is_connected());
}

#[test]
fn dtls12_data_after_loss_longer_than_window() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    // Default window is 64 records. All of these are lost.
    for i in 0..100u8 {
        client.send_application_data(&[i]).unwrap();
        collect_packets(&mut client);
    }

    for i in 0..5u8 {
        client.send_application_data(&[b'a' + i]).unwrap();
        deliver_packets(&collect_packets(&mut client), &mut server);
    }

    let out = drain_outputs(&mut server);
    assert_eq!(
        out.app_data,
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]
    );
    assert!(server.is_connected());
}

#[test]
fn dtls12_out_of_order_application_data_is_delivered() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    client.send_application_data(b"first").unwrap();
    let first = collect_packets(&mut client);
    client.send_application_data(b"second").unwrap();
    let second = collect_packets(&mut client);

    deliver_packets(&second, &mut server);
    deliver_packets(&first, &mut server);
    assert_eq!(
        drain_outputs(&mut server).app_data,
        vec![b"second".to_vec(), b"first".to_vec()]
    );
}

#[test]
fn dtls12_tampered_record_fails_authentication() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    client.send_application_data(b"secret").unwrap();
    let packets = collect_packets(&mut client);
    let tampered = tamper_record(&packets[0], APPLICATION_DATA, 1);

    let err = server.handle_packet(&tampered).unwrap_err();
    assert_eq!(err, Error::Authentication);
    assert!(is_fatal(&err));
    assert!(server.is_closed());
    assert!(!server.is_connected());

    // The fatal alert still goes out, protected with the old keys.
    let out = drain_outputs(&mut server);
    assert!(out.app_data.is_empty());
    let headers = collect_headers(&out.packets);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].ctype, ALERT);
    assert_eq!(headers[0].epoch, 1);

    let err = client.handle_packet(&out.packets[0]).unwrap_err();
    assert_eq!(
        err,
        Error::Alert {
            level: AlertLevel::Fatal,
            description: AlertDescription::BadRecordMac,
        }
    );
    assert!(client.is_closed());

    // The genuine record is no longer accepted either.
    assert_eq!(server.handle_packet(&packets[0]), Err(Error::Closed));
    assert_eq!(server.send_application_data(b"x"), Err(Error::Closed));
}

#[test]
fn dtls12_tampered_finished_fails_handshake() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = new_pair(dtls12_config(), dtls12_config(), now);

    client.handle_timeout(now).unwrap();
    server.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);

    let flight5 = collect_packets(&mut client);
    let mut result = Ok(());
    for datagram in &flight5 {
        let has_finished = parse_records(datagram)
            .iter()
            .any(|h| h.ctype == HANDSHAKE && h.epoch == 1);
        let datagram = if has_finished {
            tamper_record(datagram, HANDSHAKE, 1)
        } else {
            datagram.clone()
        };
        result = server.handle_packet(&datagram);
        if result.is_err() {
            break;
        }
    }

    assert_eq!(result, Err(Error::Authentication));
    assert!(server.is_closed());
    assert!(!drain_outputs(&mut server).connected);
}

#[test]
fn dtls12_application_data_needs_handshake() {
    let now = Instant::now();
    let mut client = Dtls::new_client(dtls12_config(), now).unwrap();
    client.handle_timeout(now).unwrap();

    let err = client.send_application_data(b"too early").unwrap_err();
    assert_eq!(err, Error::NotConnected);
    assert!(!is_fatal(&err));
    assert!(!client.is_closed());

    // Only the ClientHello.
    assert_eq!(handshake_types(&collect_packets(&mut client)), vec![CLIENT_HELLO]);
}

#[test]
fn dtls12_warning_alert_is_advisory() {
    let now = Instant::now();
    let mut server = Dtls::new_server(dtls12_config(), server_certificate(), now).unwrap();

    server
        .handle_packet(&plain_alert(1, AlertDescription::UserCanceled.as_u8()))
        .unwrap();
    let out = drain_outputs(&mut server);
    assert_eq!(out.warnings, vec![AlertDescription::UserCanceled]);
    assert!(!out.closed);
    assert!(!server.is_closed());
}

#[test]
fn dtls12_fatal_alert_closes() {
    let now = Instant::now();
    let mut server = Dtls::new_server(dtls12_config(), server_certificate(), now).unwrap();

    let err = server
        .handle_packet(&plain_alert(2, AlertDescription::InternalError.as_u8()))
        .unwrap_err();
    assert_eq!(
        err,
        Error::Alert {
            level: AlertLevel::Fatal,
            description: AlertDescription::InternalError,
        }
    );
    assert!(server.is_closed());
}

#[test]
fn dtls12_truncated_record_is_decode_error() {
    let now = Instant::now();
    let mut server = Dtls::new_server(dtls12_config(), server_certificate(), now).unwrap();

    let mut datagram = plain_alert(1, 0);
    datagram.truncate(10);
    let err = server.handle_packet(&datagram).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{:?}", err);
    assert!(server.is_closed());
}

#[test]
fn dtls12_oversized_handshake_length_is_rejected() {
    let now = Instant::now();
    let mut server = Dtls::new_server(dtls12_config(), server_certificate(), now).unwrap();

    // One byte of a ClientHello claiming to be 16 MiB long.
    let mut datagram = vec![HANDSHAKE, 0xFE, 0xFD, 0, 0, 0, 0, 0, 0, 0, 0, 0, 13];
    datagram.extend_from_slice(&[CLIENT_HELLO, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 1]);
    datagram.push(0xFE);
    assert_eq!(datagram.len(), 26);

    let err = server.handle_packet(&datagram).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{:?}", err);
    assert!(server.is_closed());
}

#[test]
fn dtls12_records_of_other_epochs_are_ignored() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    // An epoch 0 record after the switch, and one from far ahead.
    server
        .handle_packet(&plain_alert(2, AlertDescription::InternalError.as_u8()))
        .unwrap();
    let mut far = plain_alert(2, AlertDescription::InternalError.as_u8());
    far[4] = 7;
    server.handle_packet(&far).unwrap();
    assert!(server.is_connected());

    client.send_application_data(b"still here").unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server);
    assert_eq!(
        drain_outputs(&mut server).app_data,
        vec![b"still here".to_vec()]
    );
}

#[test]
fn dtls12_close_notify() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    client.close().unwrap();
    assert!(client.is_closed());
    assert_eq!(client.send_application_data(b"x"), Err(Error::Closed));
    // Closing twice is fine.
    client.close().unwrap();

    let packets = collect_packets(&mut client);
    let headers = collect_headers(&packets);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].ctype, ALERT);
    assert_eq!(headers[0].epoch, 1);

    deliver_packets(&packets, &mut server);
    let out = drain_outputs(&mut server);
    assert!(out.closed);
    assert!(server.is_closed());
    assert!(!server.is_connected());
    assert_eq!(server.handle_packet(&packets[0]), Err(Error::Closed));
}
