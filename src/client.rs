// DTLS Client Handshake Flow:
//
// 1. Client sends ClientHello
// 2. Server may answer with HelloVerifyRequest carrying a cookie
//    - Client resends ClientHello with the cookie
// 3. Server sends ServerHello, Certificate, ServerKeyExchange (DHE only),
//    ServerHelloDone
// 4. Client sends ClientKeyExchange, ChangeCipherSpec, Finished
// 5. Server sends ChangeCipherSpec, Finished
// 6. Handshake complete, application data can flow

use std::fmt;

use rsa::RsaPublicKey;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{extract_subject_public_key, rsa_encrypt_pre_master, rsa_pre_master_secret};
use crate::crypto::{verify_signature, DhKeyExchange};
use crate::engine::Engine;
use crate::event::LocalEvent;
use crate::message::{
    Body, ClientHello, ClientKeyExchange, CompressionMethod, Extension, ExtensionType, Finished,
    KeyExchangeAlgorithm, MessageType, ProtocolVersion, Random, ServerHello, SessionId,
    SignatureAlgorithmsExtension,
};
use crate::reassembler::Message;
use crate::Error;

/// Client half of the handshake.
pub(crate) struct Client {
    state: ClientState,

    /// Public key of the server certificate. Set by Certificate.
    server_public_key: Option<RsaPublicKey>,

    /// DHE pre-master secret, computed at ServerKeyExchange.
    dh_pre_master: Option<Zeroizing<Vec<u8>>>,

    /// Our DH public value `Yc`.
    dh_public: Option<Vec<u8>>,
}

/// Current state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientState {
    /// Waiting for the first `handle_timeout`.
    Init,
    HelloSent,
    /// ClientHello resent with the cookie.
    HelloVerified,
    ServerHelloReceived,
    CertificateReceived,
    ServerKeyExchangeReceived,
    ServerDoneReceived,
    KeyExchangeSent,
    MasterSecretDerived,
    ChangeCipherSpecSent,
    /// Awaiting the server's ChangeCipherSpec and Finished.
    FinishedSent,
    Established,
}

impl Client {
    pub fn new() -> Self {
        Client {
            state: ClientState::Init,
            server_public_key: None,
            dh_pre_master: None,
            dh_public: None,
        }
    }

    fn transition(&mut self, state: ClientState) {
        debug!("Client {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Session ready: send the first ClientHello.
    pub fn start(&mut self, engine: &mut Engine) -> Result<(), Error> {
        if self.state != ClientState::Init {
            return Ok(());
        }

        engine.session.client_random = Some(Random::new(&mut engine.rng));
        engine.flight_begin(1);
        send_client_hello(engine)?;
        self.transition(ClientState::HelloSent);
        Ok(())
    }

    pub fn handle_message(&mut self, engine: &mut Engine, message: Message) -> Result<(), Error> {
        use ClientState::*;

        match (self.state, message.msg_type()) {
            (HelloSent, MessageType::HelloVerifyRequest) => self.on_hello_verify(engine, &message),
            (HelloSent | HelloVerified, MessageType::ServerHello) => {
                self.on_server_hello(engine, &message)
            }
            (ServerHelloReceived, MessageType::Certificate) => {
                self.on_certificate(engine, &message)
            }
            (CertificateReceived, MessageType::ServerKeyExchange) => {
                self.on_server_key_exchange(engine, &message)
            }
            (CertificateReceived | ServerKeyExchangeReceived, MessageType::ServerHelloDone) => {
                self.on_server_hello_done(engine, &message)
            }
            (FinishedSent, MessageType::Finished) => self.on_finished(engine, &message),
            (state, msg_type) => Err(Error::UnexpectedMessage(format!(
                "{:?} in client state {:?}",
                msg_type, state
            ))),
        }
    }

    pub fn handle_change_cipher_spec(&mut self, engine: &mut Engine) -> Result<Vec<Vec<u8>>, Error> {
        if self.state != ClientState::FinishedSent || engine.session.incoming_epoch != 0 {
            return Err(Error::UnexpectedMessage(format!(
                "ChangeCipherSpec in client state {:?}",
                self.state
            )));
        }
        engine.change_cipher_spec_received()
    }

    fn on_hello_verify(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        let body = Body::parse_complete(&message.body, message.msg_type(), None)?;
        let Body::HelloVerifyRequest(hvr) = body else {
            return Err(Error::Decode("HelloVerifyRequest".to_string()));
        };

        debug!("Got cookie of {} bytes", hvr.cookie.len());
        engine.session.cookie = hvr.cookie;

        // Negotiation restarts, neither the first ClientHello nor the
        // HelloVerifyRequest go into Finished.
        engine.session.transcript_clear();

        engine.flight_begin(3);
        send_client_hello(engine)?;
        self.transition(ClientState::HelloVerified);
        Ok(())
    }

    fn on_server_hello(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        if message.body.len() < ServerHello::MIN_LEN {
            return Err(Error::Decode(format!(
                "ServerHello of {} bytes is shorter than {}",
                message.body.len(),
                ServerHello::MIN_LEN
            )));
        }

        // version(2) + random(32), then the session id length.
        let session_id_len = message.body[34] as usize;
        if session_id_len > SessionId::MAX_LEN {
            return Err(Error::IllegalParameter(format!(
                "session id of {} bytes",
                session_id_len
            )));
        }

        let body = Body::parse_complete(&message.body, message.msg_type(), None)?;
        let Body::ServerHello(sh) = body else {
            return Err(Error::Decode("ServerHello".to_string()));
        };

        if sh.server_version != ProtocolVersion::DTLS1_2 {
            return Err(Error::IllegalParameter(format!(
                "server version {:?}",
                sh.server_version
            )));
        }

        if !engine.config().cipher_suites().contains(&sh.cipher_suite) {
            return Err(Error::UnsupportedCipher(sh.cipher_suite.as_u16()));
        }

        if sh.compression_method != CompressionMethod::Null {
            return Err(Error::IllegalParameter(format!(
                "compression method {:?}",
                sh.compression_method
            )));
        }

        debug!("Server selected {}", sh.cipher_suite.name());

        engine.session.server_random = Some(sh.random);
        engine.session.session_id = sh.session_id;
        engine.session.cipher_suite = Some(sh.cipher_suite);
        engine.session.transcript_push(&message.canonical());

        self.transition(ClientState::ServerHelloReceived);
        Ok(())
    }

    fn on_certificate(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        let body = Body::parse_complete(&message.body, message.msg_type(), None)?;
        let Body::Certificate(certificate) = body else {
            return Err(Error::Decode("Certificate".to_string()));
        };

        let Some(first) = certificate.certificate_list.first() else {
            return Err(Error::BadCertificate("empty certificate list".to_string()));
        };

        self.server_public_key = Some(extract_subject_public_key(first)?);
        engine.push_event(LocalEvent::PeerCert(first.to_vec()));
        engine.session.transcript_push(&message.canonical());

        self.transition(ClientState::CertificateReceived);
        Ok(())
    }

    fn on_server_key_exchange(
        &mut self,
        engine: &mut Engine,
        message: &Message,
    ) -> Result<(), Error> {
        let suite = engine.session.suite()?;
        if suite.key_exchange_algorithm() != KeyExchangeAlgorithm::DheRsa {
            return Err(Error::UnexpectedMessage(format!(
                "ServerKeyExchange with {}",
                suite.name()
            )));
        }

        let body = Body::parse_complete(&message.body, message.msg_type(), Some(suite))?;
        let Body::ServerKeyExchange(ske) = body else {
            return Err(Error::Decode("ServerKeyExchange".to_string()));
        };

        let Some(public_key) = &self.server_public_key else {
            return Err(Error::UnexpectedMessage(
                "ServerKeyExchange without certificate".to_string(),
            ));
        };

        let (client_random, server_random) = engine.session.randoms()?;
        let mut signed = Vec::with_capacity(64 + message.body.len());
        signed.extend_from_slice(&client_random);
        signed.extend_from_slice(&server_random);
        ske.params.serialize(&mut signed);

        verify_signature(
            public_key,
            &signed,
            ske.signature.algorithm,
            ske.signature.signature,
        )?;

        let dh = DhKeyExchange::for_params(ske.params.p, ske.params.g, &mut engine.rng)?;
        self.dh_pre_master = Some(dh.compute_shared_secret(ske.params.ys)?);
        self.dh_public = Some(dh.public_key());
        engine.session.transcript_push(&message.canonical());

        self.transition(ClientState::ServerKeyExchangeReceived);
        Ok(())
    }

    fn on_server_hello_done(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        let suite = engine.session.suite()?;
        let kx = suite.key_exchange_algorithm();

        if kx == KeyExchangeAlgorithm::DheRsa && self.state != ClientState::ServerKeyExchangeReceived
        {
            return Err(Error::UnexpectedMessage(
                "ServerHelloDone without ServerKeyExchange".to_string(),
            ));
        }

        Body::parse_complete(&message.body, message.msg_type(), Some(suite))?;
        engine.session.transcript_push(&message.canonical());
        self.transition(ClientState::ServerDoneReceived);

        engine.flight_begin(5);

        let (exchange, pre_master) = match kx {
            KeyExchangeAlgorithm::Rsa => {
                let Some(public_key) = &self.server_public_key else {
                    return Err(Error::UnexpectedMessage(
                        "ServerHelloDone without certificate".to_string(),
                    ));
                };
                let pre_master = rsa_pre_master_secret(&mut engine.rng);
                let encrypted = rsa_encrypt_pre_master(public_key, &pre_master, &mut engine.rng)?;
                (encrypted, pre_master)
            }
            KeyExchangeAlgorithm::DheRsa => {
                let (Some(public), Some(pre_master)) =
                    (self.dh_public.take(), self.dh_pre_master.take())
                else {
                    return Err(Error::UnexpectedMessage(
                        "no DH parameters from server".to_string(),
                    ));
                };
                (public, pre_master)
            }
            KeyExchangeAlgorithm::Unknown => {
                return Err(Error::UnsupportedCipher(suite.as_u16()));
            }
        };

        let cke = match kx {
            KeyExchangeAlgorithm::DheRsa => ClientKeyExchange::Dh(&exchange),
            _ => ClientKeyExchange::Rsa(&exchange),
        };
        engine.create_handshake(&Body::ClientKeyExchange(cke))?;
        self.transition(ClientState::KeyExchangeSent);

        engine.session.derive_keys(&pre_master)?;
        drop(pre_master);
        self.transition(ClientState::MasterSecretDerived);

        engine.send_change_cipher_spec()?;
        self.transition(ClientState::ChangeCipherSpecSent);

        let verify_data = engine.session.verify_data("client finished")?;
        engine.create_handshake(&Body::Finished(Finished::new(&verify_data)))?;
        self.transition(ClientState::FinishedSent);

        Ok(())
    }

    fn on_finished(&mut self, engine: &mut Engine, message: &Message) -> Result<(), Error> {
        if engine.session.incoming_epoch == 0 {
            return Err(Error::UnexpectedMessage(
                "Finished before ChangeCipherSpec".to_string(),
            ));
        }

        let suite = engine.session.suite()?;
        let body = Body::parse_complete(&message.body, message.msg_type(), Some(suite))?;
        let Body::Finished(finished) = body else {
            return Err(Error::Decode("Finished".to_string()));
        };

        let expected = engine.session.verify_data("server finished")?;
        let is_eq: bool = finished.verify_data.ct_eq(&expected).into();
        if !is_eq {
            return Err(Error::VerifyData);
        }
        engine.session.transcript_push(&message.canonical());

        // Our last flight needs no more resends.
        engine.flight_end();
        engine.establish();
        self.transition(ClientState::Established);
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state)
            .field("has_server_key", &self.server_public_key.is_some())
            .finish()
    }
}

fn send_client_hello(engine: &mut Engine) -> Result<(), Error> {
    let Some(random) = engine.session.client_random else {
        return Err(Error::Crypto("client random missing".to_string()));
    };

    let mut signature_algorithms = Vec::new();
    SignatureAlgorithmsExtension::default().serialize(&mut signature_algorithms);

    let suites: Vec<_> = engine.config().cipher_suites().to_vec();
    let client_hello = ClientHello::new(
        random,
        SessionId::empty(),
        engine.session.cookie,
        &suites,
    )
    .with_extension(Extension::new(
        ExtensionType::SignatureAlgorithms,
        &signature_algorithms,
    ));

    engine.create_handshake(&Body::ClientHello(client_hello))
}
