//! Server side demultiplexing by peer address.
//!
//! Each peer gets its own [`Dtls`] server session, created once the peer has
//! echoed a HelloVerifyRequest cookie. Until then the listener answers
//! statelessly and keeps nothing for the peer. Nothing mutable is shared
//! between sessions; only the configuration, the certificate and the cookie
//! secret are.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::crypto::ServerIdentity;
use crate::event::copy_into;
use crate::server::{admit, Admission};
use crate::{Config, Dtls, DtlsCertificate, Error, Output, SeededRng};

/// An error of one peer's session. The session was removed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("peer {peer}: {source}")]
pub struct PeerError {
    pub peer: SocketAddr,
    #[source]
    pub source: Error,
}

/// DTLS server for many peers on one socket.
#[derive(Debug)]
pub struct Listener {
    config: Arc<Config>,
    identity: Arc<ServerIdentity>,
    /// Keys the HelloVerifyRequest cookie of every session.
    cookie_secret: [u8; 32],
    sessions: HashMap<SocketAddr, Dtls>,
    /// HelloVerifyRequests for peers without a session.
    replies: VecDeque<(SocketAddr, Vec<u8>)>,
    /// Removed sessions with output not yet polled, such as a fatal alert
    /// or the data before a close_notify.
    draining: VecDeque<(SocketAddr, Dtls)>,
}

impl Listener {
    pub fn new(config: Arc<Config>, certificate: DtlsCertificate) -> Result<Self, Error> {
        let identity = Arc::new(ServerIdentity::new(&certificate)?);
        let cookie_secret = SeededRng::new(config.rng_seed()).random::<[u8; 32]>();
        Ok(Listener {
            config,
            identity,
            cookie_secret,
            sessions: HashMap::new(),
            replies: VecDeque::new(),
            draining: VecDeque::new(),
        })
    }

    /// Route a datagram to the session of `peer`.
    ///
    /// A peer without a session only gets one by sending a ClientHello with
    /// a valid cookie. A ClientHello without one is answered with a
    /// HelloVerifyRequest, anything else is dropped.
    pub fn handle_datagram(
        &mut self,
        peer: SocketAddr,
        now: Instant,
        datagram: &[u8],
    ) -> Result<(), PeerError> {
        let dtls = match self.sessions.entry(peer) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => match admit(&self.cookie_secret, datagram) {
                Admission::Accept(hello) => {
                    debug!("New session for {}", peer);
                    let mut dtls = Dtls::server_after_hello_verify(
                        Arc::clone(&self.config),
                        Arc::clone(&self.identity),
                        self.cookie_secret,
                        hello,
                        now,
                    )
                    .map_err(|source| PeerError { peer, source })?;
                    dtls.handle_timeout(now)
                        .map_err(|source| PeerError { peer, source })?;
                    e.insert(dtls)
                }
                Admission::Verify(reply) => {
                    if self.replies.len() >= self.config.max_queue_tx() {
                        warn!("Reply queue full, drop HelloVerifyRequest to {}", peer);
                    } else {
                        trace!("HelloVerifyRequest to {}", peer);
                        self.replies.push_back((peer, reply));
                    }
                    return Ok(());
                }
                Admission::Ignore => {
                    trace!("Drop datagram of {} bytes from {}", datagram.len(), peer);
                    return Ok(());
                }
            },
        };

        match dtls.handle_packet(datagram) {
            Ok(()) => Ok(()),
            Err(source) => {
                if source.is_fatal() {
                    self.evict(peer);
                }
                Err(PeerError { peer, source })
            }
        }
    }

    /// Drive the timers of all sessions. Failed and closed sessions are
    /// removed, the failures returned. Their remaining output stays
    /// pollable.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<PeerError> {
        let mut errors = Vec::new();
        let mut remove = Vec::new();

        for (peer, dtls) in self.sessions.iter_mut() {
            if dtls.is_closed() {
                remove.push(*peer);
                continue;
            }
            if let Err(source) = dtls.handle_timeout(now) {
                remove.push(*peer);
                errors.push(PeerError {
                    peer: *peer,
                    source,
                });
            }
        }

        for peer in remove {
            self.evict(peer);
        }

        errors
    }

    /// Next output of any session, with the peer it belongs to.
    ///
    /// `None` when no session has anything to say. Unlike [`Dtls::poll_output`]
    /// this never yields [`Output::Timeout`], see [`Listener::next_timeout`].
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Option<(SocketAddr, Output<'a>)> {
        if let Some((peer, datagram)) = self.replies.pop_front() {
            return Some((peer, Output::Packet(copy_into(buf, &datagram))));
        }

        while let Some((peer, dtls)) = self.draining.front_mut() {
            if dtls.has_output() {
                let peer = *peer;
                return Some((peer, dtls.poll_output(buf)));
            }
            self.draining.pop_front();
        }

        let peer = self
            .sessions
            .iter()
            .find(|(_, dtls)| dtls.has_output())
            .map(|(peer, _)| *peer)?;

        let dtls = self.sessions.get_mut(&peer)?;
        Some((peer, dtls.poll_output(buf)))
    }

    /// Earliest timeout over all sessions.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.sessions.values().map(|d| d.next_timeout()).min()
    }

    /// Drop the session of `peer` without telling the peer.
    pub fn remove(&mut self, peer: &SocketAddr) -> Option<Dtls> {
        self.sessions.remove(peer)
    }

    pub fn session(&self, peer: &SocketAddr) -> Option<&Dtls> {
        self.sessions.get(peer)
    }

    pub fn session_mut(&mut self, peer: &SocketAddr) -> Option<&mut Dtls> {
        self.sessions.get_mut(peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict(&mut self, peer: SocketAddr) {
        if let Some(dtls) = self.sessions.remove(&peer) {
            debug!("Remove session for {}", peer);
            if dtls.has_output() {
                self.draining.push_back((peer, dtls));
            }
        }
    }
}
