//! Sans-IO DTLS 1.2 client and server.
//!
//! The protocol core never touches sockets or clocks. The caller feeds
//! datagrams with [`Dtls::handle_packet`], wakes the session with
//! [`Dtls::handle_timeout`] and drains everything the session wants to say
//! with [`Dtls::poll_output`] until it returns [`Output::Timeout`].
//!
//! Supported cipher suites, all AES-GCM with an RSA certificate:
//!
//! * `TLS_RSA_WITH_AES_128_GCM_SHA256`
//! * `TLS_RSA_WITH_AES_256_GCM_SHA384`
//! * `TLS_DHE_RSA_WITH_AES_128_GCM_SHA256`
//! * `TLS_DHE_RSA_WITH_AES_256_GCM_SHA384`
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use dtls_core::{Config, Dtls, Output};
//!
//! let mut client = Dtls::new_client(Arc::new(Config::default()), Instant::now()).unwrap();
//! client.handle_timeout(Instant::now()).unwrap();
//!
//! let mut buf = vec![0; 2048];
//! loop {
//!     match client.poll_output(&mut buf) {
//!         Output::Packet(p) => { /* send p to the server */ }
//!         Output::Timeout(_) => break,
//!         _ => {}
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Instant;

mod certificate;
mod client;
mod config;
pub mod crypto;
mod engine;
mod error;
mod event;
mod incoming;
mod listener;
pub mod message;
mod queue;
mod reassembler;
mod reorder;
mod rng;
mod server;
mod session;
mod timer;
mod util;
mod window;

pub use certificate::DtlsCertificate;
pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use listener::{Listener, PeerError};
pub use rng::SeededRng;
pub use session::Role;

use client::Client;
use crypto::ServerIdentity;
use engine::Engine;
use event::LocalEvent;
use message::{Alert, AlertDescription, AlertLevel, ContentType, DTLSRecord};
use server::{Server, VerifiedHello};

/// One DTLS association with a single peer.
#[derive(Debug)]
pub struct Dtls {
    engine: Engine,
    driver: Driver,
    closed: bool,
}

/// Role specific handshake logic on top of the shared engine.
#[derive(Debug)]
enum Driver {
    Client(Client),
    Server(Server),
}

/// What the session wants from the caller next.
#[derive(Debug)]
pub enum Output<'a> {
    /// A datagram to send to the peer.
    Packet(&'a [u8]),
    /// Call [`Dtls::handle_timeout`] at this instant. Nothing more to poll.
    Timeout(Instant),
    /// Both Finished messages verified.
    Connected,
    /// First certificate of the peer's chain, DER. Trust decisions are up to
    /// the caller.
    PeerCert(&'a [u8]),
    /// Decrypted application data.
    ApplicationData(&'a [u8]),
    /// The peer sent a warning alert. The session continues.
    Warning(AlertDescription),
    /// The peer sent close_notify. The session is closed.
    Closed,
}

impl Dtls {
    /// Start a client session.
    ///
    /// The ClientHello goes out on the first [`Dtls::handle_timeout`].
    pub fn new_client(config: Arc<Config>, now: Instant) -> Result<Self, Error> {
        let engine = Engine::new(config, Role::Client, now)?;
        Ok(Dtls {
            engine,
            driver: Driver::Client(Client::new()),
            closed: false,
        })
    }

    /// Start a server session for one peer.
    pub fn new_server(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        now: Instant,
    ) -> Result<Self, Error> {
        let identity = Arc::new(ServerIdentity::new(&certificate)?);
        Self::server_with_identity(config, identity, now)
    }

    pub(crate) fn server_with_identity(
        config: Arc<Config>,
        identity: Arc<ServerIdentity>,
        now: Instant,
    ) -> Result<Self, Error> {
        let mut engine = Engine::new(config, Role::Server, now)?;
        let server = Server::new(&mut engine, identity);
        Ok(Dtls {
            engine,
            driver: Driver::Server(server),
            closed: false,
        })
    }

    /// Server session for a ClientHello whose cookie was checked by a
    /// [`Listener`].
    pub(crate) fn server_after_hello_verify(
        config: Arc<Config>,
        identity: Arc<ServerIdentity>,
        cookie_secret: [u8; 32],
        hello: VerifiedHello,
        now: Instant,
    ) -> Result<Self, Error> {
        let mut engine = Engine::new(config, Role::Server, now)?;
        let server = Server::after_hello_verify(&mut engine, identity, cookie_secret, hello);
        Ok(Dtls {
            engine,
            driver: Driver::Server(server),
            closed: false,
        })
    }

    pub fn role(&self) -> Role {
        self.engine.session.role
    }

    /// Handshake completed and the session is not closed.
    pub fn is_connected(&self) -> bool {
        self.engine.is_established() && !self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// There is output to poll before [`Output::Timeout`].
    pub fn has_output(&self) -> bool {
        self.engine.has_output()
    }

    /// When [`Dtls::handle_timeout`] should be called next.
    pub fn next_timeout(&self) -> Instant {
        self.engine.next_timeout()
    }

    /// Process one incoming datagram.
    ///
    /// Every record in it runs through the whole receive pipeline before
    /// this returns. Any error except the non-fatal ones closes the session.
    pub fn handle_packet(&mut self, datagram: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        let result = self.process_datagram(datagram);
        self.check(result)
    }

    /// The timer requested through [`Output::Timeout`] fired.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        let result = self.process_timeout(now);
        self.check(result)
    }

    /// Next output. Drain until [`Output::Timeout`].
    ///
    /// Panics if `buf` is too small for the output.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
        self.engine.poll_output(buf)
    }

    /// Send application data, split into records that fit the MTU.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        let result = self.engine.send_application_data(data);
        self.check(result)
    }

    /// Send close_notify and close the session.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        debug!("Close session");
        let result = self.engine.send_alert(Alert::close_notify());
        self.engine.teardown();
        self.closed = true;
        result
    }

    fn process_datagram(&mut self, datagram: &[u8]) -> Result<(), Error> {
        self.process_records(datagram)?;
        if !self.closed {
            self.engine.resend_if_requested()?;
        }
        Ok(())
    }

    fn process_records(&mut self, mut input: &[u8]) -> Result<(), Error> {
        while !input.is_empty() && !self.closed {
            let (record, rest) = DTLSRecord::decode(input)?;
            input = rest;
            self.handle_record(&record)?;
        }
        Ok(())
    }

    fn handle_record(&mut self, record: &DTLSRecord) -> Result<(), Error> {
        let Some(record) = self.engine.accept_record(record)? else {
            return Ok(());
        };

        match record.content_type {
            ContentType::Handshake => {
                for message in self.engine.handshake_messages(&record)? {
                    match &mut self.driver {
                        Driver::Client(c) => c.handle_message(&mut self.engine, message)?,
                        Driver::Server(s) => s.handle_message(&mut self.engine, message)?,
                    }
                }
            }
            ContentType::ChangeCipherSpec => {
                if record.plaintext != [1] {
                    return Err(Error::Decode(format!(
                        "ChangeCipherSpec of {} bytes",
                        record.plaintext.len()
                    )));
                }
                let held = match &mut self.driver {
                    Driver::Client(c) => c.handle_change_cipher_spec(&mut self.engine)?,
                    Driver::Server(s) => s.handle_change_cipher_spec(&mut self.engine)?,
                };
                for datagram in held {
                    self.process_records(&datagram)?;
                }
            }
            ContentType::Alert => self.handle_alert(&record.plaintext)?,
            ContentType::ApplicationData => {
                if self.engine.is_established() {
                    self.engine
                        .push_event(LocalEvent::ApplicationData(record.plaintext));
                } else {
                    trace!("Drop application data before handshake completed");
                }
            }
            ContentType::Unknown(t) => trace!("Drop record of unknown content type {}", t),
        }

        Ok(())
    }

    fn handle_alert(&mut self, plaintext: &[u8]) -> Result<(), Error> {
        let (rest, alert) = Alert::parse(plaintext)?;
        if !rest.is_empty() {
            return Err(Error::Decode(format!("alert of {} bytes", plaintext.len())));
        }

        match (alert.level, alert.description) {
            (_, AlertDescription::CloseNotify) => {
                debug!("Peer sent close_notify");
                self.engine.push_event(LocalEvent::Closed);
                self.engine.teardown();
                self.closed = true;
                Ok(())
            }
            (AlertLevel::Warning, description) => {
                warn!("Peer warning alert: {}", description);
                self.engine.push_event(LocalEvent::Warning(description));
                Ok(())
            }
            (level, description) => {
                warn!("Peer alert: {:?} {}", level, description);
                Err(Error::Alert { level, description })
            }
        }
    }

    fn process_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if let Driver::Client(client) = &mut self.driver {
            client.start(&mut self.engine)?;
        }
        self.engine.handle_timeout(now)
    }

    /// Close the session on fatal errors, telling the peer when there is
    /// an alert for it.
    fn check<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(error) = &result {
            if error.is_fatal() && !self.closed {
                debug!("Fatal error: {}", error);
                if let Some(description) = error.alert_description() {
                    if let Err(e) = self.engine.send_alert(Alert::fatal(description)) {
                        debug!("Failed to queue fatal alert: {}", e);
                    }
                }
                self.engine.teardown();
                self.closed = true;
            }
        }
        result
    }
}
