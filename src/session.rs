//! Mutable protocol state of one DTLS session.

use std::fmt;

use zeroize::Zeroizing;

use crate::crypto::{CryptoContext, Hash};
use crate::message::{CipherSuite, Cookie, Random, SessionId};
use crate::window::SlidingWindow;
use crate::Error;

/// Largest record sequence number, 2^48 - 1.
const MAX_SEQUENCE: u64 = (1 << 48) - 1;

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Epochs, counters, randoms and key material of a session.
///
/// One instance per peer, owned by the engine. The write and read epochs
/// only differ between one side's ChangeCipherSpec and the other's.
pub(crate) struct Session {
    pub role: Role,

    pub outgoing_epoch: u16,
    pub incoming_epoch: u16,

    /// Record counter for epoch 0.
    ///
    /// Kept apart so a resend of an epoch 0 record after we moved on
    /// to epoch 1 never reuses a number.
    sequence_epoch_0: u64,

    /// Record counter for the current non-zero outgoing epoch.
    sequence_epoch_n: u64,

    /// Next handshake message_seq we send.
    pub handshake_seq: u16,

    pub client_random: Option<Random>,
    pub server_random: Option<Random>,
    pub cookie: Cookie,
    pub session_id: SessionId,

    /// Negotiated suite. Set by ServerHello (client) or ClientHello (server).
    pub cipher_suite: Option<CipherSuite>,

    /// Protects records of epoch 1.
    active: Option<CryptoContext>,

    /// Derived keys waiting for the first ChangeCipherSpec.
    pending: Option<CryptoContext>,

    master_secret: Option<Zeroizing<Vec<u8>>>,

    /// Canonical encodings of the handshake messages that go into Finished.
    transcript: Vec<u8>,

    /// Replay state of the current incoming epoch.
    pub window: SlidingWindow,
}

impl Session {
    pub fn new(role: Role, replay_window: u64) -> Result<Self, Error> {
        Ok(Session {
            role,
            outgoing_epoch: 0,
            incoming_epoch: 0,
            sequence_epoch_0: 0,
            sequence_epoch_n: 0,
            handshake_seq: 0,
            client_random: None,
            server_random: None,
            cookie: Cookie::empty(),
            session_id: SessionId::empty(),
            cipher_suite: None,
            active: None,
            pending: None,
            master_secret: None,
            transcript: Vec::new(),
            window: SlidingWindow::new(replay_window)?,
        })
    }

    /// Take the next record sequence number for `epoch`.
    pub fn next_sequence(&mut self, epoch: u16) -> Result<u64, Error> {
        let counter = if epoch == 0 {
            &mut self.sequence_epoch_0
        } else {
            &mut self.sequence_epoch_n
        };

        if *counter > MAX_SEQUENCE {
            return Err(Error::Crypto("record sequence number exhausted".to_string()));
        }

        let seq = *counter;
        *counter += 1;
        Ok(seq)
    }

    /// Continue epoch 0 numbering at `seq` or above.
    pub fn skip_sequence_epoch_0(&mut self, seq: u64) {
        self.sequence_epoch_0 = self.sequence_epoch_0.max(seq);
    }

    /// Take the next handshake message_seq.
    pub fn next_handshake_seq(&mut self) -> u16 {
        let seq = self.handshake_seq;
        self.handshake_seq = self.handshake_seq.wrapping_add(1);
        seq
    }

    /// Randoms as raw bytes, `(client, server)`.
    pub fn randoms(&self) -> Result<([u8; 32], [u8; 32]), Error> {
        match (&self.client_random, &self.server_random) {
            (Some(c), Some(s)) => Ok((c.to_bytes(), s.to_bytes())),
            _ => Err(Error::UnexpectedMessage(
                "randoms not yet exchanged".to_string(),
            )),
        }
    }

    pub fn suite(&self) -> Result<CipherSuite, Error> {
        self.cipher_suite
            .ok_or_else(|| Error::UnexpectedMessage("no cipher suite negotiated".to_string()))
    }

    /// Derive the master secret from a pre-master secret and build the pending keys.
    ///
    /// The pre-master secret is zeroized when the caller drops it.
    pub fn derive_keys(&mut self, pre_master: &[u8]) -> Result<(), Error> {
        let suite = self.suite()?;
        let (client_random, server_random) = self.randoms()?;

        let master = crate::crypto::master_secret(
            pre_master,
            &client_random,
            &server_random,
            suite.hash_algorithm(),
        )?;

        let context = CryptoContext::new(
            suite,
            self.role,
            &master,
            &client_random,
            &server_random,
        )?;

        self.master_secret = Some(master);
        self.pending = Some(context);
        Ok(())
    }

    /// Make the pending keys the active ones, if not already done.
    ///
    /// Called at both ChangeCipherSpecs; only the first one moves anything.
    pub fn activate_pending(&mut self) -> Result<(), Error> {
        if let Some(pending) = self.pending.take() {
            self.active = Some(pending);
        }
        if self.active.is_none() {
            return Err(Error::UnexpectedMessage(
                "ChangeCipherSpec before key exchange".to_string(),
            ));
        }
        Ok(())
    }

    /// Our ChangeCipherSpec went out.
    pub fn advance_outgoing_epoch(&mut self) -> Result<(), Error> {
        self.activate_pending()?;
        self.outgoing_epoch += 1;
        self.sequence_epoch_n = 0;
        Ok(())
    }

    /// The peer's ChangeCipherSpec arrived.
    pub fn advance_incoming_epoch(&mut self) -> Result<(), Error> {
        self.activate_pending()?;
        self.incoming_epoch += 1;
        self.window.reset(0);
        Ok(())
    }

    /// Keys for records of epoch 1 and later.
    pub fn active(&self) -> Option<&CryptoContext> {
        self.active.as_ref()
    }

    #[cfg(test)]
    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    pub fn transcript_push(&mut self, canonical: &[u8]) {
        self.transcript.extend_from_slice(canonical);
    }

    /// HelloVerifyRequest restarts negotiation.
    pub fn transcript_clear(&mut self) {
        self.transcript.clear();
    }

    /// `PRF(master_secret, label, Hash(transcript))`.
    pub fn verify_data(&self, label: &str) -> Result<Vec<u8>, Error> {
        let suite = self.suite()?;
        let Some(master) = &self.master_secret else {
            return Err(Error::UnexpectedMessage(
                "Finished before key exchange".to_string(),
            ));
        };
        let hash = Hash::digest(suite.hash_algorithm(), &self.transcript)?;
        let verify = crate::crypto::verify_data(master, label, &hash, suite.hash_algorithm())?;
        Ok(verify.to_vec())
    }

    /// The handshake is over, the master secret has no further use.
    pub fn forget_master_secret(&mut self) {
        self.master_secret = None;
    }

    /// Drop all key material. The session can not protect records after this.
    pub fn teardown(&mut self) {
        self.master_secret = None;
        self.pending = None;
        self.active = None;
        self.transcript.clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("outgoing_epoch", &self.outgoing_epoch)
            .field("incoming_epoch", &self.incoming_epoch)
            .field("handshake_seq", &self.handshake_seq)
            .field("cipher_suite", &self.cipher_suite)
            .field("has_pending", &self.pending.is_some())
            .field("has_master_secret", &self.master_secret.is_some())
            .field("transcript_len", &self.transcript.len())
            .finish()
    }
}
