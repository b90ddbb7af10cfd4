// DTLS Server Handshake Flow:
//
// 1. Client sends ClientHello (maybe without cookie)
// 2. If the cookie is missing or invalid, Server sends HelloVerifyRequest
//    (stateless cookie)
//    - Client resends ClientHello with cookie
// 3. Server sends ServerHello, Certificate, ServerKeyExchange (DHE only),
//    ServerHelloDone
// 4. Client sends ClientKeyExchange, ChangeCipherSpec, Finished
// 5. Server sends ChangeCipherSpec, Finished
// 6. Handshake complete, application data can flow

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::crypto::{rsa_decrypt_pre_master, DhKeyExchange, ServerIdentity};
use crate::engine::Engine;
use crate::message::{
    Body, Certificate, CipherSuite, ClientHello, ClientKeyExchange, CompressionMethod,
    ContentType, Cookie, DTLSRecord, DhParams, DigitallySigned, Finished, Handshake,
    HashAlgorithm, Header, HelloVerifyRequest, KeyExchangeAlgorithm, MessageType,
    ProtocolVersion, Random, ServerHello, ServerKeyExchange, SessionId, SignatureAlgorithm,
    SignatureAndHashAlgorithm,
};
use crate::reassembler::Message;
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

/// Server half of the handshake.
pub(crate) struct Server {
    state: ServerState,

    /// Certificate and key used for this peer.
    identity: Arc<ServerIdentity>,

    /// Secret for the stateless HelloVerifyRequest cookie.
    cookie_secret: [u8; 32],

    /// Our ephemeral key pair for DHE suites.
    dh: Option<DhKeyExchange>,
}

/// Current state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServerState {
    AwaitClientHello,
    HelloVerifySent,
    ServerHelloDoneSent,
    KeyExchangeReceived,
    MasterSecretDerived,
    ChangeCipherSpecReceived,
    Established,
}

/// What to do with a datagram from an address that has no session.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// A ClientHello with a valid cookie. Start a session for it.
    Accept(VerifiedHello),
    /// A ClientHello without a valid cookie. Send back this
    /// HelloVerifyRequest datagram and forget about it.
    Verify(Vec<u8>),
    /// Anything else.
    Ignore,
}

/// Sequence numbers of a ClientHello that passed the cookie check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VerifiedHello {
    pub message_seq: u16,
    pub record_seq: u64,
}

/// Check the first record of `datagram` for a ClientHello and its cookie
/// without keeping any state.
///
/// Only an unfragmented ClientHello in epoch 0 is considered.
pub(crate) fn admit(cookie_secret: &[u8; 32], datagram: &[u8]) -> Admission {
    let Ok((record, _)) = DTLSRecord::decode(datagram) else {
        return Admission::Ignore;
    };
    if record.content_type != ContentType::Handshake || record.epoch != 0 {
        return Admission::Ignore;
    }

    let Ok((_, (header, body))) = Header::parse_fragment(record.fragment) else {
        return Admission::Ignore;
    };
    if header.msg_type != MessageType::ClientHello || header.is_fragment() {
        return Admission::Ignore;
    }
    let Ok(Body::ClientHello(ch)) = Body::parse_complete(body, MessageType::ClientHello, None)
    else {
        return Admission::Ignore;
    };

    if verify_cookie(cookie_secret, &ch.random, &ch.cookie) {
        return Admission::Accept(VerifiedHello {
            message_seq: header.message_seq,
            record_seq: record.sequence_number,
        });
    }

    match hello_verify_datagram(
        cookie_secret,
        &ch.random,
        header.message_seq,
        record.sequence_number,
    ) {
        Ok(datagram) => Admission::Verify(datagram),
        Err(e) => {
            debug!("Failed to build HelloVerifyRequest: {}", e);
            Admission::Ignore
        }
    }
}

/// A HelloVerifyRequest echoing the message and record sequence of the
/// ClientHello it answers.
fn hello_verify_datagram(
    cookie_secret: &[u8; 32],
    client_random: &Random,
    message_seq: u16,
    record_seq: u64,
) -> Result<Vec<u8>, Error> {
    let cookie = compute_cookie(cookie_secret, client_random)?;
    let body = Body::HelloVerifyRequest(HelloVerifyRequest::new(cookie));

    let mut fragment = Vec::new();
    Handshake::new(message_seq, body).serialize(&mut fragment);

    let record = DTLSRecord::new(ContentType::Handshake, 0, record_seq, &fragment);
    let mut out = Vec::with_capacity(record.wire_len());
    record.serialize(&mut out);
    Ok(out)
}

impl Server {
    pub fn new(engine: &mut Engine, identity: Arc<ServerIdentity>) -> Self {
        let cookie_secret = engine.rng.random::<[u8; 32]>();
        Server {
            state: ServerState::AwaitClientHello,
            identity,
            cookie_secret,
            dh: None,
        }
    }

    /// A server whose HelloVerifyRequest already went out statelessly,
    /// keyed with the same `cookie_secret`.
    pub fn after_hello_verify(
        engine: &mut Engine,
        identity: Arc<ServerIdentity>,
        cookie_secret: [u8; 32],
        hello: VerifiedHello,
    ) -> Self {
        engine.resume_after_hello_verify(hello.message_seq, hello.record_seq);
        Server {
            state: ServerState::HelloVerifySent,
            identity,
            cookie_secret,
            dh: None,
        }
    }

    fn transition(&mut self, state: ServerState) {
        debug!("Server {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    pub fn handle_message(&mut self, engine: &mut Engine, message: Message) -> Result<(), Error> {
        use ServerState::*;

        match (self.state, message.msg_type()) {
            (AwaitClientHello | HelloVerifySent, MessageType::ClientHello) => {
                self.on_client_hello(engine, &message)
            }
            (ServerHelloDoneSent, MessageType::ClientKeyExchange) => {
                self.on_client_key_exchange(engine, &message)
            }
            (ChangeCipherSpecReceived, MessageType::Finished) => self.on_finished(engine, &message),
            (state, msg_type) => Err(Error::UnexpectedMessage(format!(
                "{:?} in server state {:?}",
                msg_type, state
            ))),
        }
    }

    /// Returns the records held for the new epoch.
    pub fn handle_change_cipher_spec(&mut self, engine: &mut Engine) -> Result<Vec<Vec<u8>>, Error> {
        match self.state {
            ServerState::MasterSecretDerived if engine.session.incoming_epoch == 0 => {
                let held = engine.change_cipher_spec_received()?;
                self.transition(ServerState::ChangeCipherSpecReceived);
                Ok(held)
            }
            // The ClientKeyExchange was reordered behind it or lost. The
            // client resends the whole flight.
            ServerState::ServerHelloDoneSent => {
                debug!("Drop ChangeCipherSpec before ClientKeyExchange");
                Ok(Vec::new())
            }
            state => Err(Error::UnexpectedMessage(format!(
                "ChangeCipherSpec in server state {:?}",
                state
            ))),
        }
    }

    fn on_client_hello(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        let body = Body::parse_complete(&message.body, message.msg_type(), None)?;
        let Body::ClientHello(ch) = body else {
            return Err(Error::Decode("ClientHello".to_string()));
        };

        if ch.client_version != ProtocolVersion::DTLS1_2 {
            return Err(Error::IllegalParameter(format!(
                "client version {:?}",
                ch.client_version
            )));
        }

        if !ch.compression_methods.contains(&CompressionMethod::Null) {
            return Err(Error::IllegalParameter(
                "client did not offer null compression".to_string(),
            ));
        }

        if !verify_cookie(&self.cookie_secret, &ch.random, &ch.cookie) {
            debug!("Invalid or missing cookie, sending HelloVerifyRequest");
            let cookie = compute_cookie(&self.cookie_secret, &ch.random)?;

            engine.flight_begin(2);
            engine.create_handshake(&Body::HelloVerifyRequest(HelloVerifyRequest::new(cookie)))?;
            // Resent only when the client repeats its ClientHello.
            engine.flight_without_timer();

            // Neither the HelloVerifyRequest nor the first ClientHello go into
            // Finished.
            engine.session.transcript_clear();

            self.transition(ServerState::HelloVerifySent);
            return Ok(());
        }

        let suite = select_suite(engine, &ch)?;
        debug!("Selected {}", suite.name());

        engine.session.client_random = Some(ch.random);
        engine.session.server_random = Some(Random::new(&mut engine.rng));
        engine.session.cipher_suite = Some(suite);
        engine.session.transcript_push(&message.canonical());

        self.send_server_hello_flight(engine)?;
        self.transition(ServerState::ServerHelloDoneSent);
        Ok(())
    }

    fn send_server_hello_flight(&mut self, engine: &mut Engine) -> Result<(), Error> {
        let suite = engine.session.suite()?;
        let (client_random, server_random) = engine.session.randoms()?;
        let Some(random) = engine.session.server_random else {
            return Err(Error::Crypto("server random missing".to_string()));
        };

        engine.flight_begin(4);

        let server_hello = ServerHello::new(random, SessionId::empty(), suite);
        engine.create_handshake(&Body::ServerHello(server_hello))?;

        let identity = Arc::clone(&self.identity);
        let certificate = Certificate::single(identity.certificate());
        engine.create_handshake(&Body::Certificate(certificate))?;

        if suite.key_exchange_algorithm() == KeyExchangeAlgorithm::DheRsa {
            let dh = DhKeyExchange::ffdhe2048(&mut engine.rng);
            let (p, g, ys) = (dh.prime(), dh.generator(), dh.public_key());
            let params = DhParams {
                p: &p,
                g: &g,
                ys: &ys,
            };

            let mut signed = Vec::with_capacity(64 + p.len() + g.len() + ys.len() + 6);
            signed.extend_from_slice(&client_random);
            signed.extend_from_slice(&server_random);
            params.serialize(&mut signed);

            let signature = identity.sign(&signed, HashAlgorithm::SHA256)?;
            let algorithm =
                SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, SignatureAlgorithm::RSA);

            let ske = ServerKeyExchange::new(params, DigitallySigned::new(algorithm, &signature));
            engine.create_handshake(&Body::ServerKeyExchange(ske))?;
            self.dh = Some(dh);
        }

        engine.create_handshake(&Body::ServerHelloDone)?;
        Ok(())
    }

    fn on_client_key_exchange(
        &mut self,
        engine: &mut Engine,
        message: &Message,
    ) -> Result<(), Error> {
        let suite = engine.session.suite()?;
        let body = Body::parse_complete(&message.body, message.msg_type(), Some(suite))?;
        let Body::ClientKeyExchange(cke) = body else {
            return Err(Error::Decode("ClientKeyExchange".to_string()));
        };

        engine.session.transcript_push(&message.canonical());
        self.transition(ServerState::KeyExchangeReceived);

        let pre_master = match cke {
            ClientKeyExchange::Rsa(encrypted) => {
                rsa_decrypt_pre_master(self.identity.private_key(), encrypted, &mut engine.rng)
            }
            ClientKeyExchange::Dh(yc) => {
                let Some(dh) = self.dh.take() else {
                    return Err(Error::UnexpectedMessage(
                        "DH ClientKeyExchange without ServerKeyExchange".to_string(),
                    ));
                };
                dh.compute_shared_secret(yc)?
            }
        };

        engine.session.derive_keys(&pre_master)?;
        drop(pre_master);

        self.transition(ServerState::MasterSecretDerived);
        Ok(())
    }

    fn on_finished(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        let suite = engine.session.suite()?;
        let body = Body::parse_complete(&message.body, message.msg_type(), Some(suite))?;
        let Body::Finished(finished) = body else {
            return Err(Error::Decode("Finished".to_string()));
        };

        let expected = engine.session.verify_data("client finished")?;
        let is_eq: bool = finished.verify_data.ct_eq(&expected).into();
        if !is_eq {
            return Err(Error::VerifyData);
        }
        engine.session.transcript_push(&message.canonical());

        engine.flight_begin(6);
        engine.send_change_cipher_spec()?;
        let verify_data = engine.session.verify_data("server finished")?;
        engine.create_handshake(&Body::Finished(Finished::new(&verify_data)))?;
        // Resent only when the client repeats its Finished.
        engine.flight_without_timer();

        engine.establish();
        self.transition(ServerState::Established);
        Ok(())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("dh", &self.dh)
            .finish()
    }
}

/// First suite in the client's order that we are configured for.
fn select_suite(engine: &Engine, ch: &ClientHello) -> Result<CipherSuite, Error> {
    let allowed = engine.config().cipher_suites();
    ch.cipher_suites
        .iter()
        .copied()
        .find(|s| allowed.contains(s))
        .ok_or(Error::NoCommonCipher)
}

fn compute_cookie(secret: &[u8], client_random: &Random) -> Result<Cookie, Error> {
    // cookie = HMAC-SHA256(secret, client_random)
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| Error::Crypto("invalid cookie secret".to_string()))?;
    mac.update(&client_random.to_bytes());
    let tag = mac.finalize().into_bytes();
    Cookie::try_new(&tag).map_err(|e| Error::Crypto(format!("cookie: {}", e)))
}

fn verify_cookie(secret: &[u8], client_random: &Random, cookie: &Cookie) -> bool {
    if cookie.len() != 32 {
        return false;
    }
    match compute_cookie(secret, client_random) {
        Ok(expected) => cookie.ct_eq(&expected).into(),
        Err(_) => false,
    }
}
