//! DTLS 1.2 retransmission tests (lost flights, duplicate triggered resends, timeouts).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dtls_core::{Config, Dtls, Error};

use crate::common::*;

/// Jump to the instant the endpoint asked for and fire the timer.
fn fire_timer(ep: &mut Dtls, now: &mut Instant) -> Result<(), Error> {
    *now = ep.next_timeout();
    ep.handle_timeout(*now)
}

#[test]
fn dtls12_client_hello_resent_with_fresh_sequence() {
    let _ = env_logger::try_init();
    let mut now = Instant::now();
    let mut client = Dtls::new_client(dtls12_config(), now).unwrap();

    client.handle_timeout(now).unwrap();
    let first = collect_packets(&mut client);
    assert_eq!(handshake_types(&first), vec![CLIENT_HELLO]);

    // Flight lost, nothing until the timer fires.
    client.handle_timeout(now).unwrap();
    assert!(collect_packets(&mut client).is_empty());

    fire_timer(&mut client, &mut now).unwrap();
    let resend = collect_packets(&mut client);
    assert_eq!(handshake_types(&resend), vec![CLIENT_HELLO]);
    assert_epochs_and_seq_increased(&collect_headers(&first), &collect_headers(&resend));

    // Same handshake message, byte for byte.
    let (_, a) = split_records(&first[0])[0];
    let (_, b) = split_records(&resend[0])[0];
    assert_eq!(a, b);
}

#[test]
fn dtls12_lost_client_key_exchange_flight() {
    //! The server resends its flight on timeout. The client sees the
    //! duplicate ServerHelloDone and resends its own flight at once.

    let _ = env_logger::try_init();
    let mut now = Instant::now();
    let (mut client, mut server) = new_pair(dtls12_config(), dtls12_config(), now);

    client.handle_timeout(now).unwrap();
    server.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server); // ClientHello
    deliver_packets(&collect_packets(&mut server), &mut client); // HelloVerifyRequest
    deliver_packets(&collect_packets(&mut client), &mut server); // ClientHello + cookie
    server.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut server), &mut client); // ServerHello .. Done

    let lost = collect_packets(&mut client);
    assert!(handshake_types(&lost).contains(&CLIENT_KEY_EXCHANGE));

    fire_timer(&mut server, &mut now).unwrap();
    let server_resend = collect_packets(&mut server);
    assert!(handshake_types(&server_resend).contains(&SERVER_HELLO_DONE));

    deliver_packets(&server_resend, &mut client);
    let client_resend = collect_packets(&mut client);
    assert_epochs_and_seq_increased(&collect_headers(&lost), &collect_headers(&client_resend));

    deliver_packets(&client_resend, &mut server);
    assert!(drain_outputs(&mut server).connected);
}

#[test]
fn dtls12_lost_server_finished_flight() {
    //! The server has no timer for its last flight. A repeated client
    //! Finished makes it resend.

    let _ = env_logger::try_init();
    let mut now = Instant::now();
    let (mut client, mut server) = new_pair(dtls12_config(), dtls12_config(), now);

    client.handle_timeout(now).unwrap();
    server.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);
    deliver_packets(&collect_packets(&mut client), &mut server);
    deliver_packets(&collect_packets(&mut server), &mut client);
    client.handle_timeout(now).unwrap();
    deliver_packets(&collect_packets(&mut client), &mut server); // CKE, CCS, Finished

    let server_out = drain_outputs(&mut server);
    assert!(server_out.connected);
    let lost = server_out.packets;
    assert!(!lost.is_empty());

    fire_timer(&mut client, &mut now).unwrap();
    let client_resend = collect_packets(&mut client);
    let headers = collect_headers(&client_resend);
    assert!(headers.iter().any(|h| h.ctype == CHANGE_CIPHER_SPEC));
    assert!(headers.iter().any(|h| h.ctype == HANDSHAKE && h.epoch == 1));

    deliver_packets(&client_resend, &mut server);
    let server_resend = collect_packets(&mut server);
    assert_epochs_and_seq_increased(&collect_headers(&lost), &collect_headers(&server_resend));

    deliver_packets(&server_resend, &mut client);
    assert!(drain_outputs(&mut client).connected);
    assert!(client.is_connected());
}

#[test]
fn dtls12_flight_retries_exhausted() {
    let _ = env_logger::try_init();
    let mut now = Instant::now();
    let config = Arc::new(
        Config::builder()
            .flight_retries(2)
            .handshake_timeout(Duration::from_secs(600))
            .build()
            .unwrap(),
    );
    let mut client = Dtls::new_client(config, now).unwrap();
    client.handle_timeout(now).unwrap();
    collect_packets(&mut client);

    fire_timer(&mut client, &mut now).unwrap();
    assert_eq!(handshake_types(&collect_packets(&mut client)), vec![CLIENT_HELLO]);
    fire_timer(&mut client, &mut now).unwrap();
    assert_eq!(handshake_types(&collect_packets(&mut client)), vec![CLIENT_HELLO]);

    assert_eq!(
        fire_timer(&mut client, &mut now),
        Err(Error::Timeout("flight"))
    );
    assert!(client.is_closed());
    assert_eq!(client.handle_timeout(now), Err(Error::Closed));
}

#[test]
fn dtls12_handshake_deadline() {
    let _ = env_logger::try_init();
    let mut now = Instant::now();
    let config = Arc::new(
        Config::builder()
            .handshake_timeout(Duration::from_millis(1500))
            .build()
            .unwrap(),
    );
    let mut client = Dtls::new_client(config, now).unwrap();
    client.handle_timeout(now).unwrap();

    let result = loop {
        if let Err(e) = fire_timer(&mut client, &mut now) {
            break e;
        }
        collect_packets(&mut client);
    };
    assert_eq!(result, Error::Timeout("handshake"));
}

#[test]
fn dtls12_timers_stop_when_connected() {
    let now = Instant::now();
    let (mut client, mut server) = connected_pair(dtls12_config(), now);

    let later = now + Duration::from_secs(3600);
    client.handle_timeout(later).unwrap();
    server.handle_timeout(later).unwrap();
    assert!(collect_packets(&mut client).is_empty());
    assert!(collect_packets(&mut server).is_empty());
    assert!(client.next_timeout() > later);
}
