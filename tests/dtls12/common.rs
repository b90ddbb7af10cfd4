//! Shared helpers for DTLS 1.2 integration tests.

#![allow(unused)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use dtls_core::message::{AlertDescription, CipherSuite};
use dtls_core::{Config, Dtls, DtlsCertificate, Error, Output};

pub const SERVER_CERT: &[u8] = include_bytes!("../data/server-cert.der");
pub const SERVER_KEY: &[u8] = include_bytes!("../data/server-key.der");

/// Parsed DTLS 1.2 record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecHdr {
    pub ctype: u8,
    pub epoch: u16,
    pub seq: u64,
}

/// Content types.
pub const CHANGE_CIPHER_SPEC: u8 = 20;
pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;

/// Handshake message types (RFC 5246 / 6347).
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const HELLO_VERIFY_REQUEST: u8 = 3;
pub const CERTIFICATE: u8 = 11;
pub const SERVER_KEY_EXCHANGE: u8 = 12;
pub const SERVER_HELLO_DONE: u8 = 14;
pub const CLIENT_KEY_EXCHANGE: u8 = 16;
pub const FINISHED: u8 = 20;

/// Split a datagram into `(header, fragment)` per record.
pub fn split_records(datagram: &[u8]) -> Vec<(RecHdr, &[u8])> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let seq_bytes = [
            0u8,
            0u8,
            datagram[i + 5],
            datagram[i + 6],
            datagram[i + 7],
            datagram[i + 8],
            datagram[i + 9],
            datagram[i + 10],
        ];
        let seq = u64::from_be_bytes(seq_bytes);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        let end = (i + 13 + len).min(datagram.len());
        out.push((RecHdr { ctype, epoch, seq }, &datagram[i + 13..end]));
        i += 13 + len;
    }
    out
}

/// Parse DTLS 1.2 record headers from a datagram.
pub fn parse_records(datagram: &[u8]) -> Vec<RecHdr> {
    split_records(datagram).into_iter().map(|(h, _)| h).collect()
}

/// Collect record headers from a slice of datagrams.
pub fn collect_headers(datagrams: &[Vec<u8>]) -> Vec<RecHdr> {
    datagrams.iter().flat_map(|d| parse_records(d)).collect()
}

/// Handshake message types of the epoch 0 handshake records in a datagram.
pub fn parse_handshake_types(datagram: &[u8]) -> Vec<u8> {
    split_records(datagram)
        .into_iter()
        .filter(|(h, f)| h.ctype == HANDSHAKE && h.epoch == 0 && !f.is_empty())
        .map(|(_, f)| f[0])
        .collect()
}

/// Handshake types over several datagrams.
pub fn handshake_types(datagrams: &[Vec<u8>]) -> Vec<u8> {
    datagrams.iter().flat_map(|d| parse_handshake_types(d)).collect()
}

/// Assert that retransmitted records have the same epochs but increased sequence numbers.
pub fn assert_epochs_and_seq_increased(init: &[RecHdr], resend: &[RecHdr]) {
    assert_eq!(
        init.len(),
        resend.len(),
        "record count must match between initial and resend"
    );
    for (a, b) in init.iter().zip(resend.iter()) {
        assert_eq!(
            a.epoch, b.epoch,
            "epoch must match for the same record on resend"
        );
        assert!(
            b.seq > a.seq,
            "sequence must increase on resend: {:?} -> {:?}",
            a,
            b
        );
    }
}

/// Collected outputs from polling an endpoint to `Timeout`.
#[derive(Default, Debug)]
pub struct DrainedOutputs {
    pub packets: Vec<Vec<u8>>,
    pub connected: bool,
    pub peer_cert: Option<Vec<u8>>,
    pub app_data: Vec<Vec<u8>>,
    pub warnings: Vec<AlertDescription>,
    pub closed: bool,
    pub timeout: Option<Instant>,
}

/// Poll until `Timeout`, collecting everything.
pub fn drain_outputs(endpoint: &mut Dtls) -> DrainedOutputs {
    let mut result = DrainedOutputs::default();
    let mut buf = vec![0u8; 4096];
    loop {
        match endpoint.poll_output(&mut buf) {
            Output::Packet(p) => result.packets.push(p.to_vec()),
            Output::Connected => result.connected = true,
            Output::PeerCert(cert) => result.peer_cert = Some(cert.to_vec()),
            Output::ApplicationData(data) => result.app_data.push(data.to_vec()),
            Output::Warning(description) => result.warnings.push(description),
            Output::Closed => result.closed = true,
            Output::Timeout(t) => {
                result.timeout = Some(t);
                break;
            }
        }
    }
    result
}

/// Poll until `Timeout`, collecting only packets.
pub fn collect_packets(endpoint: &mut Dtls) -> Vec<Vec<u8>> {
    drain_outputs(endpoint).packets
}

/// Deliver a slice of packets to a destination endpoint, failing on any error.
pub fn deliver_packets(packets: &[Vec<u8>], dest: &mut Dtls) {
    for p in packets {
        dest.handle_packet(p).expect("handle_packet");
    }
}

/// Trigger a timeout by advancing time 2 seconds.
pub fn trigger_timeout(ep: &mut Dtls, now: &mut Instant) {
    *now += Duration::from_secs(2);
    ep.handle_timeout(*now).expect("handle_timeout");
}

pub fn server_certificate() -> DtlsCertificate {
    DtlsCertificate {
        certificate: SERVER_CERT.to_vec(),
        private_key: SERVER_KEY.to_vec(),
    }
}

/// Create a DTLS 1.2 config with default settings.
pub fn dtls12_config() -> Arc<Config> {
    Arc::new(Config::default())
}

/// Config restricted to the given suites.
pub fn dtls12_config_with_suites(suites: &[CipherSuite]) -> Arc<Config> {
    Arc::new(
        Config::builder()
            .cipher_suites(suites)
            .build()
            .expect("Failed to build config"),
    )
}

/// Create a DTLS 1.2 config with custom MTU.
pub fn dtls12_config_with_mtu(mtu: usize) -> Arc<Config> {
    Arc::new(
        Config::builder()
            .mtu(mtu)
            .max_queue_tx(100)
            .max_queue_rx(100)
            .build()
            .expect("Failed to build config"),
    )
}

/// A client and a server ready to go.
pub fn new_pair(client_config: Arc<Config>, server_config: Arc<Config>, now: Instant) -> (Dtls, Dtls) {
    let client = Dtls::new_client(client_config, now).expect("new client");
    let server = Dtls::new_server(server_config, server_certificate(), now).expect("new server");
    (client, server)
}

/// Everything both sides produced during a handshake.
#[derive(Default, Debug)]
pub struct HandshakeLog {
    pub client: DrainedOutputs,
    pub server: DrainedOutputs,
}

/// Shuttle packets between client and server until both are connected.
pub fn run_handshake(client: &mut Dtls, server: &mut Dtls, now: Instant) -> HandshakeLog {
    let mut log = HandshakeLog::default();

    for _ in 0..20 {
        client.handle_timeout(now).expect("client timeout");
        server.handle_timeout(now).expect("server timeout");

        let c = drain_outputs(client);
        deliver_packets(&c.packets, server);
        merge(&mut log.client, c);

        let s = drain_outputs(server);
        deliver_packets(&s.packets, client);
        merge(&mut log.server, s);

        if log.client.connected && log.server.connected {
            return log;
        }
    }

    panic!("handshake did not complete: {:?}", log);
}

fn merge(into: &mut DrainedOutputs, from: DrainedOutputs) {
    into.packets.extend(from.packets);
    into.connected |= from.connected;
    if from.peer_cert.is_some() {
        into.peer_cert = from.peer_cert;
    }
    into.app_data.extend(from.app_data);
    into.warnings.extend(from.warnings);
    into.closed |= from.closed;
    into.timeout = from.timeout;
}

/// A connected pair.
pub fn connected_pair(config: Arc<Config>, now: Instant) -> (Dtls, Dtls) {
    let _ = env_logger::try_init();
    let (mut client, mut server) = new_pair(config.clone(), config, now);
    run_handshake(&mut client, &mut server, now);
    (client, server)
}

/// Flip one bit in the first record of the given content type and epoch.
pub fn tamper_record(datagram: &[u8], ctype: u8, epoch: u16) -> Vec<u8> {
    let mut out = datagram.to_vec();
    let mut i = 0usize;
    while i + 13 <= out.len() {
        let len = u16::from_be_bytes([out[i + 11], out[i + 12]]) as usize;
        let e = u16::from_be_bytes([out[i + 3], out[i + 4]]);
        if out[i] == ctype && e == epoch && len > 0 {
            out[i + 13 + len - 1] ^= 0x01;
            return out;
        }
        i += 13 + len;
    }
    panic!("no record of type {} epoch {}", ctype, epoch);
}

pub fn is_fatal(err: &Error) -> bool {
    !matches!(err, Error::NotConnected | Error::TransmitQueueFull)
}
