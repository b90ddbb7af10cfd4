//! DTLS 1.2 handshake tests (cookie exchange, suites, negotiation failures).

use std::time::Instant;

use dtls_core::message::{AlertDescription, AlertLevel, CipherSuite};
use dtls_core::{Dtls, Error, Role};

use crate::common::*;

const ALL_SUITES: [CipherSuite; 4] = [
    CipherSuite::RSA_AES128_GCM_SHA256,
    CipherSuite::RSA_AES256_GCM_SHA384,
    CipherSuite::DHE_RSA_AES128_GCM_SHA256,
    CipherSuite::DHE_RSA_AES256_GCM_SHA384,
];

#[test]
fn dtls12_handshake_every_suite() {
    let _ = env_logger::try_init();
    let now = Instant::now();

    for suite in ALL_SUITES {
        let config = dtls12_config_with_suites(&[suite]);
        let (mut client, mut server) = new_pair(config.clone(), config, now);
        assert_eq!(client.role(), Role::Client);
        assert_eq!(server.role(), Role::Server);

        let log = run_handshake(&mut client, &mut server, now);

        assert!(client.is_connected(), "{:?}", suite);
        assert!(server.is_connected(), "{:?}", suite);
        assert_eq!(log.client.peer_cert.as_deref(), Some(SERVER_CERT));
        assert!(log.server.peer_cert.is_none());

        client.send_application_data(b"ping").unwrap();
        deliver_packets(&collect_packets(&mut client), &mut server);
        assert_eq!(drain_outputs(&mut server).app_data, vec![b"ping".to_vec()]);

        server.send_application_data(b"pong").unwrap();
        deliver_packets(&collect_packets(&mut server), &mut client);
        assert_eq!(drain_outputs(&mut client).app_data, vec![b"pong".to_vec()]);
    }
}

#[test]
fn dtls12_cookie_exchange_flights() {
    //! ClientHello without cookie, HelloVerifyRequest, ClientHello with the
    //! cookie, then the server flight.

    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = new_pair(
        dtls12_config_with_suites(&[CipherSuite::RSA_AES128_GCM_SHA256]),
        dtls12_config(),
        now,
    );

    client.handle_timeout(now).expect("client start");
    let f1 = collect_packets(&mut client);
    assert_eq!(handshake_types(&f1), vec![CLIENT_HELLO]);
    let cookie_len_1 = client_hello_cookie(&f1[0]).len();
    assert_eq!(cookie_len_1, 0);

    deliver_packets(&f1, &mut server);
    let f2 = collect_packets(&mut server);
    assert_eq!(handshake_types(&f2), vec![HELLO_VERIFY_REQUEST]);

    deliver_packets(&f2, &mut client);
    let f3 = collect_packets(&mut client);
    assert_eq!(handshake_types(&f3), vec![CLIENT_HELLO]);
    assert_eq!(client_hello_cookie(&f3[0]).len(), 32);

    // message_seq of the second ClientHello is 1.
    let (_, fragment) = split_records(&f3[0])[0];
    assert_eq!(u16::from_be_bytes([fragment[4], fragment[5]]), 1);

    deliver_packets(&f3, &mut server);
    let f4 = collect_packets(&mut server);
    assert_eq!(
        handshake_types(&f4),
        vec![SERVER_HELLO, CERTIFICATE, SERVER_HELLO_DONE]
    );
}

#[test]
fn dtls12_dhe_flight_has_server_key_exchange() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = new_pair(
        dtls12_config_with_suites(&[CipherSuite::DHE_RSA_AES256_GCM_SHA384]),
        dtls12_config(),
        now,
    );

    let log = run_handshake(&mut client, &mut server, now);
    let types = handshake_types(&log.server.packets);
    assert_eq!(
        types,
        vec![
            HELLO_VERIFY_REQUEST,
            SERVER_HELLO,
            CERTIFICATE,
            SERVER_KEY_EXCHANGE,
            SERVER_HELLO_DONE
        ]
    );

    let client_types = handshake_types(&log.client.packets);
    assert_eq!(
        client_types,
        vec![CLIENT_HELLO, CLIENT_HELLO, CLIENT_KEY_EXCHANGE]
    );
}

#[test]
fn dtls12_server_follows_client_preference() {
    //! The server takes the first suite of the client's list it supports.

    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = new_pair(
        dtls12_config_with_suites(&[
            CipherSuite::DHE_RSA_AES128_GCM_SHA256,
            CipherSuite::RSA_AES128_GCM_SHA256,
        ]),
        dtls12_config_with_suites(&[
            CipherSuite::RSA_AES128_GCM_SHA256,
            CipherSuite::DHE_RSA_AES128_GCM_SHA256,
        ]),
        now,
    );

    let log = run_handshake(&mut client, &mut server, now);
    assert!(handshake_types(&log.server.packets).contains(&SERVER_KEY_EXCHANGE));
}

#[test]
fn dtls12_no_common_cipher_is_fatal() {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let (mut client, mut server) = new_pair(
        dtls12_config_with_suites(&[CipherSuite::RSA_AES128_GCM_SHA256]),
        dtls12_config_with_suites(&[CipherSuite::DHE_RSA_AES128_GCM_SHA256]),
        now,
    );

    client.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);

    let f3 = collect_packets(&mut client);
    let err = server.handle_packet(&f3[0]).unwrap_err();
    assert_eq!(err, Error::NoCommonCipher);
    assert!(server.is_closed());

    // The server tells the client.
    let alert = collect_packets(&mut server);
    assert_eq!(collect_headers(&alert)[0].ctype, ALERT);

    let err = client.handle_packet(&alert[0]).unwrap_err();
    assert_eq!(
        err,
        Error::Alert {
            level: AlertLevel::Fatal,
            description: AlertDescription::HandshakeFailure,
        }
    );
    assert!(client.is_closed());

    // No further I/O.
    assert_eq!(client.handle_timeout(now), Err(Error::Closed));
    assert_eq!(server.handle_packet(&f3[0]), Err(Error::Closed));
}

#[test]
fn dtls12_unusable_server_key_is_refused() {
    //! The server identity is validated at setup, not during the handshake.

    let now = Instant::now();
    let mut certificate = server_certificate();
    certificate.private_key = vec![1, 2, 3];
    let err = Dtls::new_server(dtls12_config(), certificate, now).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{:?}", err);
}

/// Cookie of a ClientHello in the first record of a datagram.
fn client_hello_cookie(datagram: &[u8]) -> Vec<u8> {
    let (_, fragment) = split_records(datagram)[0];
    // handshake header(12) + version(2) + random(32)
    let body = &fragment[12..];
    let session_id_len = body[34] as usize;
    let cookie_at = 35 + session_id_len;
    let cookie_len = body[cookie_at] as usize;
    body[cookie_at + 1..cookie_at + 1 + cookie_len].to_vec()
}
