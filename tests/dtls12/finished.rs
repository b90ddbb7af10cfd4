//! Finished verify_data recomputed from the recorded wire bytes.
//!
//! Decrypts the ClientKeyExchange with the fixture key, derives the master
//! secret independently and checks both Finished messages against it.

use std::time::Instant;

use dtls_core::crypto::{master_secret, verify_data, CryptoContext, Hash, ServerIdentity};
use dtls_core::message::{CipherSuite, ContentType, HashAlgorithm};
use dtls_core::Role;
use rsa::Pkcs1v15Encrypt;

use crate::common::*;

struct Recorded {
    first_client_hello: Vec<u8>,
    hello_verify_request: Vec<u8>,
    /// ClientHello with cookie, ServerHello, Certificate, ServerHelloDone,
    /// ClientKeyExchange.
    transcript: Vec<u8>,
    client_random: [u8; 32],
    server_random: [u8; 32],
    encrypted_pre_master: Vec<u8>,
    client_finished: (u64, Vec<u8>),
    server_finished: (u64, Vec<u8>),
}

fn record_handshake(suite: CipherSuite) -> Recorded {
    let _ = env_logger::try_init();
    let now = Instant::now();
    let config = dtls12_config_with_suites(&[suite]);
    let (mut client, mut server) = new_pair(config.clone(), config, now);
    let log = run_handshake(&mut client, &mut server, now);

    let client_hs = handshake_records(&log.client.packets);
    let server_hs = handshake_records(&log.server.packets);

    // Client: ClientHello, ClientHello (cookie), ClientKeyExchange, Finished
    assert_eq!(client_hs.len(), 4);
    // Server: HelloVerifyRequest, ServerHello, Certificate, ServerHelloDone, Finished
    assert_eq!(server_hs.len(), 5);

    let mut transcript = Vec::new();
    transcript.extend_from_slice(&client_hs[1].1);
    for (_, m) in &server_hs[1..4] {
        transcript.extend_from_slice(m);
    }
    transcript.extend_from_slice(&client_hs[2].1);

    let client_random = client_hs[1].1[14..46].try_into().unwrap();
    let server_random = server_hs[1].1[14..46].try_into().unwrap();

    // header(12) + length(2)
    let encrypted_pre_master = client_hs[2].1[14..].to_vec();

    Recorded {
        first_client_hello: client_hs[0].1.clone(),
        hello_verify_request: server_hs[0].1.clone(),
        transcript,
        client_random,
        server_random,
        encrypted_pre_master,
        client_finished: client_hs[3].clone(),
        server_finished: server_hs[4].clone(),
    }
}

/// `(sequence number, fragment)` of all handshake records, in order.
fn handshake_records(datagrams: &[Vec<u8>]) -> Vec<(u64, Vec<u8>)> {
    datagrams
        .iter()
        .flat_map(|d| split_records(d))
        .filter(|(h, _)| h.ctype == HANDSHAKE)
        .map(|(h, f)| (h.seq, f.to_vec()))
        .collect()
}

fn check_finished(suite: CipherSuite, hash: HashAlgorithm) {
    let rec = record_handshake(suite);

    let identity = ServerIdentity::new(&server_certificate()).unwrap();
    let pre_master = identity
        .private_key()
        .decrypt(Pkcs1v15Encrypt, &rec.encrypted_pre_master)
        .unwrap();
    assert_eq!(pre_master.len(), 48);
    assert_eq!(&pre_master[..2], &[0xFE, 0xFD]);

    let master =
        master_secret(&pre_master, &rec.client_random, &rec.server_random, hash).unwrap();

    // Client Finished, as the server decrypts it.
    let server_ctx = CryptoContext::new(
        suite,
        Role::Server,
        &master,
        &rec.client_random,
        &rec.server_random,
    )
    .unwrap();
    let (seq, fragment) = &rec.client_finished;
    let client_finished = server_ctx
        .decrypt(ContentType::Handshake, 1, *seq, fragment)
        .unwrap();
    assert_eq!(client_finished.len(), 12 + 12);
    assert_eq!(client_finished[0], 20);

    let expected = verify_data(
        &master,
        "client finished",
        &Hash::digest(hash, &rec.transcript).unwrap(),
        hash,
    )
    .unwrap();
    assert_eq!(&client_finished[12..], &expected[..]);

    // With the cookie exchange in the transcript the result would differ.
    let mut with_cookie_exchange = rec.first_client_hello.clone();
    with_cookie_exchange.extend_from_slice(&rec.hello_verify_request);
    with_cookie_exchange.extend_from_slice(&rec.transcript);
    let wrong = verify_data(
        &master,
        "client finished",
        &Hash::digest(hash, &with_cookie_exchange).unwrap(),
        hash,
    )
    .unwrap();
    assert_ne!(&client_finished[12..], &wrong[..]);

    // Server Finished covers the client Finished too.
    let client_ctx = CryptoContext::new(
        suite,
        Role::Client,
        &master,
        &rec.client_random,
        &rec.server_random,
    )
    .unwrap();
    let (seq, fragment) = &rec.server_finished;
    let server_finished = client_ctx
        .decrypt(ContentType::Handshake, 1, *seq, fragment)
        .unwrap();

    let mut transcript = rec.transcript.clone();
    transcript.extend_from_slice(&client_finished);
    let expected = verify_data(
        &master,
        "server finished",
        &Hash::digest(hash, &transcript).unwrap(),
        hash,
    )
    .unwrap();
    assert_eq!(&server_finished[12..], &expected[..]);
}

#[test]
fn dtls12_finished_reproducible_aes128() {
    check_finished(CipherSuite::RSA_AES128_GCM_SHA256, HashAlgorithm::SHA256);
}

#[test]
fn dtls12_finished_reproducible_aes256() {
    check_finished(CipherSuite::RSA_AES256_GCM_SHA384, HashAlgorithm::SHA384);
}
