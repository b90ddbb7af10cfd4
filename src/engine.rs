use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::crypto::DTLS_AEAD_OVERHEAD;
use crate::event::{copy_into, LocalEvent};
use crate::incoming::Record;
use crate::message::{Alert, Body, ContentType, DTLSRecord, Handshake, Header, MessageType};
use crate::message::ProtocolVersion;
use crate::queue::{QueueEpoch, QueueTx};
use crate::reassembler::{check_message_len, Message, Reassembler};
use crate::reorder::{Insert, ReorderBuffer};
use crate::session::{Role, Session};
use crate::timer::{Deadline, ExponentialBackoff};
use crate::{Config, Error, Output, SeededRng};

/// Returned as timeout when nothing is armed.
const DISTANT_FUTURE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Record layer, flights and timers shared by the client and server drivers.
#[derive(Debug)]
pub(crate) struct Engine {
    config: Arc<Config>,

    /// Seedable random number generator for deterministic testing
    pub(crate) rng: SeededRng,

    pub(crate) session: Session,

    /// Outgoing datagrams.
    queue_tx: QueueTx,

    /// Events for the application.
    events: VecDeque<LocalEvent>,

    /// Handshake fragments waiting for their message_seq.
    reorder: ReorderBuffer,

    reassembler: Reassembler,

    /// Records of the next epoch that arrived ahead of ChangeCipherSpec.
    next_epoch: QueueEpoch,

    /// The records that have been sent in the current flight.
    flight_saved_records: Vec<Entry>,

    /// Flight backoff
    flight_backoff: ExponentialBackoff,

    /// Timeout for the current flight
    flight_timeout: Deadline,

    /// Global timeout for the entire handshake.
    connect_timeout: Deadline,

    /// A retransmitted peer flight asks us to resend ours.
    resend_requested: bool,

    established: bool,

    /// Latest time handed to `handle_timeout`.
    last_now: Instant,
}

/// A saved plaintext record of the current flight.
#[derive(Debug)]
struct Entry {
    content_type: ContentType,
    epoch: u16,
    fragment: Vec<u8>,
}

impl Engine {
    pub fn new(config: Arc<Config>, role: Role, now: Instant) -> Result<Self, Error> {
        let mut rng = SeededRng::new(config.rng_seed());

        let flight_backoff =
            ExponentialBackoff::new(config.flight_start_rto(), config.flight_retries(), &mut rng);

        let session = Session::new(role, config.replay_window())?;
        let reorder = ReorderBuffer::new(config.max_queue_rx());

        Ok(Self {
            config,
            rng,
            session,
            queue_tx: QueueTx::new(),
            events: VecDeque::new(),
            reorder,
            reassembler: Reassembler::new(),
            next_epoch: QueueEpoch::new(),
            flight_saved_records: Vec::new(),
            flight_backoff,
            // Armed by the first flight.
            flight_timeout: Deadline::Disabled,
            connect_timeout: Deadline::Unarmed,
            resend_requested: false,
            established: false,
            last_now: now,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn push_event(&mut self, event: LocalEvent) {
        self.events.push_back(event);
    }

    pub fn has_output(&self) -> bool {
        !self.events.is_empty() || !self.queue_tx.is_empty()
    }

    /// Pick up a handshake whose HelloVerifyRequest was sent statelessly.
    ///
    /// The peer's next message is `message_seq`. Our own numbering
    /// continues from the peer's, so the ServerHello follows the
    /// HelloVerifyRequest in both message and record sequence.
    pub fn resume_after_hello_verify(&mut self, message_seq: u16, record_seq: u64) {
        self.reorder.skip_to(message_seq);
        self.session.handshake_seq = message_seq;
        self.session.skip_sequence_epoch_0(record_seq);
    }

    /// Epoch, replay and authentication checks for one decoded record.
    ///
    /// `Ok(None)` means the record was dropped or held for the next epoch.
    /// A record failing authentication is an error.
    pub fn accept_record(&mut self, record: &DTLSRecord) -> Result<Option<Record>, Error> {
        if matches!(record.version, ProtocolVersion::Unknown(_)) {
            trace!("Drop record with version {:?}", record.version);
            return Ok(None);
        }

        let incoming_epoch = self.session.incoming_epoch;

        if record.epoch != incoming_epoch {
            if record.epoch == incoming_epoch.wrapping_add(1) {
                self.hold_next_epoch(record);
            } else {
                trace!(
                    "Drop record of epoch {} (expected {})",
                    record.epoch,
                    incoming_epoch
                );
            }
            return Ok(None);
        }

        let seq = record.sequence_number;
        if !self.session.window.check(seq) {
            trace!("Drop replayed or stale record {}:{}", record.epoch, seq);
            return Ok(None);
        }

        let plaintext = if record.epoch == 0 {
            record.fragment.to_vec()
        } else {
            let Some(context) = self.session.active() else {
                return Err(Error::Crypto("no keys for epoch".to_string()));
            };
            context.decrypt(record.content_type, record.epoch, seq, record.fragment)?
        };

        // Only authenticated records move the window.
        self.session.window.mark(seq);

        Ok(Some(Record {
            content_type: record.content_type,
            epoch: record.epoch,
            sequence_number: seq,
            plaintext,
        }))
    }

    fn hold_next_epoch(&mut self, record: &DTLSRecord) {
        if self.next_epoch.len() >= self.config.max_queue_rx() {
            warn!(
                "Next epoch queue full (max {}), drop {:?}",
                self.config.max_queue_rx(),
                record
            );
            return;
        }
        trace!("Hold {:?} until ChangeCipherSpec", record);
        let mut buf = Vec::with_capacity(record.wire_len());
        record.serialize(&mut buf);
        self.next_epoch.push(buf);
    }

    /// The peer switched epochs. Returns the records held for the new epoch.
    pub fn change_cipher_spec_received(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        self.session.advance_incoming_epoch()?;
        debug!("Peer epoch now {}", self.session.incoming_epoch);
        Ok(mem::take(&mut *self.next_epoch))
    }

    /// Feed a handshake record through the reorder buffer and reassembler.
    ///
    /// Returns the messages completed by it, in message_seq order.
    pub fn handshake_messages(&mut self, record: &Record) -> Result<Vec<Message>, Error> {
        for (header, fragment) in record.fragments()? {
            if !header.is_in_range() {
                return Err(Error::FragmentRange {
                    offset: header.fragment_offset,
                    length: header.fragment_length,
                    total: header.length,
                });
            }
            check_message_len(&header)?;

            if self.reorder.is_duplicate(&header) {
                trace!(
                    "Duplicate handshake {:?} seq {}",
                    header.msg_type,
                    header.message_seq
                );
                if triggers_resend(header.msg_type) {
                    self.resend_requested = true;
                }
                continue;
            }

            if self.established {
                warn!(
                    "Drop handshake {:?} after establishment, renegotiation is not supported",
                    header.msg_type
                );
                continue;
            }

            match self.reorder.insert(header, fragment) {
                Insert::Full => warn!(
                    "Reorder buffer full (max {}): {:?}",
                    self.config.max_queue_rx(),
                    self.reorder
                ),
                Insert::Held | Insert::AlreadyHeld | Insert::Duplicate => {}
            }
        }

        let mut messages = Vec::new();
        while let Some((header, fragment)) = self.reorder.pop_ready() {
            if let Some(message) = self.reassembler.push(&header, &fragment)? {
                self.reorder.advance();
                trace!(
                    "Handshake {:?} seq {} complete",
                    message.msg_type(),
                    message.header.message_seq
                );
                messages.push(message);
            }
        }

        Ok(messages)
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.last_now = now;

        if self.connect_timeout == Deadline::Unarmed {
            debug!(
                "Handshake timeout in: {:.03}s",
                self.config.handshake_timeout().as_secs_f32()
            );
        }
        self.connect_timeout
            .arm_if_unarmed(now, self.config.handshake_timeout());

        if self.flight_timeout == Deadline::Unarmed {
            debug!(
                "Flight timeout in: {:.03}s",
                self.flight_backoff.rto().as_secs_f32()
            );
        }
        self.flight_timeout
            .arm_if_unarmed(now, self.flight_backoff.rto());

        if self.connect_timeout.has_passed(now) {
            return Err(Error::Timeout("handshake"));
        }

        if self.flight_timeout.has_passed(now) {
            if !self.flight_backoff.attempt(&mut self.rng) {
                return Err(Error::Timeout("flight"));
            }
            debug!(
                "Re-arm flight timeout due to resend in {:.03}s",
                self.flight_backoff.rto().as_secs_f32()
            );
            self.flight_timeout = Deadline::Armed(now + self.flight_backoff.rto());
            self.flight_resend("flight timeout")?;
        }

        Ok(())
    }

    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
        if let Some(event) = self.events.pop_front() {
            return event.into_output(buf);
        }

        if let Some(p) = self.queue_tx.pop_front() {
            return Output::Packet(copy_into(buf, &p));
        }

        Output::Timeout(self.next_timeout())
    }

    /// When `handle_timeout` should be called next.
    ///
    /// An unarmed deadline asks for an immediate call so it can be armed.
    pub fn next_timeout(&self) -> Instant {
        if self.connect_timeout == Deadline::Unarmed || self.flight_timeout == Deadline::Unarmed {
            return self.last_now;
        }

        match (self.connect_timeout.instant(), self.flight_timeout.instant()) {
            (Some(c), Some(f)) => c.min(f),
            (Some(c), None) => c,
            (None, Some(f)) => f,
            (None, None) => self.last_now + DISTANT_FUTURE,
        }
    }

    pub fn flight_begin(&mut self, flight_no: u8) {
        debug!("Begin flight {}", flight_no);
        self.flight_backoff.reset(&mut self.rng);
        self.flight_saved_records.clear();
        self.flight_timeout = Deadline::Unarmed;
    }

    /// The current flight is only resent when the peer repeats its own.
    pub fn flight_without_timer(&mut self) {
        self.flight_timeout = Deadline::Disabled;
    }

    /// Nothing of ours is in flight anymore.
    pub fn flight_end(&mut self) {
        self.flight_saved_records.clear();
        self.flight_timeout = Deadline::Disabled;
    }

    pub fn flight_stop_resend_timers(&mut self) {
        debug!("Stop handshake and flight timeouts");
        self.flight_timeout = Deadline::Disabled;
        self.connect_timeout = Deadline::Disabled;
    }

    fn flight_resend(&mut self, reason: &str) -> Result<(), Error> {
        if self.flight_saved_records.is_empty() {
            return Ok(());
        }
        debug!("Resending flight due to {}", reason);
        // For lifetime issues, we take the entries out of self
        let records = mem::take(&mut self.flight_saved_records);

        let mut result = Ok(());
        for entry in &records {
            result = self.create_record(entry.content_type, entry.epoch, false, &entry.fragment);
            if result.is_err() {
                break;
            }
        }

        // Put the entries back into self
        self.flight_saved_records = records;

        result
    }

    /// Resend once per datagram however many duplicates it carried.
    pub fn resend_if_requested(&mut self) -> Result<(), Error> {
        if mem::take(&mut self.resend_requested) {
            self.flight_resend("duplicate from peer")?;
        }
        Ok(())
    }

    /// Protect and queue one record, packing it into the last datagram when it fits.
    pub fn create_record(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        save_fragment: bool,
        fragment: &[u8],
    ) -> Result<(), Error> {
        if save_fragment {
            self.flight_saved_records.push(Entry {
                content_type,
                epoch,
                fragment: fragment.to_vec(),
            });
        }

        let overhead = if epoch >= 1 { DTLS_AEAD_OVERHEAD } else { 0 };
        let record_wire_len = DTLSRecord::HEADER_LEN + fragment.len() + overhead;

        let can_append = self
            .queue_tx
            .back()
            .map(|b| b.len() + record_wire_len <= self.config.mtu())
            .unwrap_or(false);

        if !can_append && self.queue_tx.len() >= self.config.max_queue_tx() {
            warn!(
                "Transmit queue full (max {}): {:?}",
                self.config.max_queue_tx(),
                self.queue_tx
            );
            return Err(Error::TransmitQueueFull);
        }

        let sequence_number = self.session.next_sequence(epoch)?;

        let protected;
        let wire_fragment = if epoch >= 1 {
            let Some(context) = self.session.active() else {
                return Err(Error::Crypto(format!("no keys for epoch {}", epoch)));
            };
            protected = context.encrypt(content_type, epoch, sequence_number, fragment)?;
            &protected[..]
        } else {
            fragment
        };

        let record = DTLSRecord::new(content_type, epoch, sequence_number, wire_fragment);

        if can_append {
            if let Some(last) = self.queue_tx.back_mut() {
                record.serialize(last);
            }
        } else {
            let mut datagram = Vec::with_capacity(self.config.mtu());
            record.serialize(&mut datagram);
            self.queue_tx.push_back(datagram);
        }

        Ok(())
    }

    /// Serialize a handshake message, add it to the transcript and send it in
    /// as many fragments as the MTU requires.
    pub fn create_handshake(&mut self, body: &Body) -> Result<(), Error> {
        let msg_type = body.msg_type();
        let message_seq = self.session.next_handshake_seq();

        let mut canonical = Vec::new();
        Handshake::new(message_seq, body.clone()).serialize(&mut canonical);
        self.session.transcript_push(&canonical);

        let body_bytes = &canonical[Header::LEN..];
        let total_len = body_bytes.len();
        let epoch = self.session.outgoing_epoch;
        let aead_overhead = if epoch >= 1 { DTLS_AEAD_OVERHEAD } else { 0 };
        let fixed_overhead = DTLSRecord::HEADER_LEN + Header::LEN + aead_overhead;

        debug!(
            "Send {:?} seq {} ({} bytes, epoch {})",
            msg_type, message_seq, total_len, epoch
        );

        let mut offset = 0;
        let mut fragment = Vec::new();

        // At least one record, even for an empty body.
        loop {
            let used_in_current = self.queue_tx.back().map(|b| b.len()).unwrap_or(0);
            let available_in_current = self.config.mtu().saturating_sub(used_in_current);

            let available_for_body = if available_in_current > fixed_overhead {
                available_in_current - fixed_overhead
            } else {
                self.config.mtu().saturating_sub(fixed_overhead)
            };

            let chunk_len = (total_len - offset).min(available_for_body);

            let header = Header {
                msg_type,
                length: total_len as u32,
                message_seq,
                fragment_offset: offset as u32,
                fragment_length: chunk_len as u32,
            };

            fragment.clear();
            header.serialize(&mut fragment);
            fragment.extend_from_slice(&body_bytes[offset..offset + chunk_len]);

            self.create_record(ContentType::Handshake, epoch, true, &fragment)?;

            offset += chunk_len;
            if offset >= total_len {
                break;
            }
        }

        Ok(())
    }

    /// Send ChangeCipherSpec and move to the next outgoing epoch.
    pub fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        let epoch = self.session.outgoing_epoch;
        self.create_record(ContentType::ChangeCipherSpec, epoch, true, &[1])?;
        self.session.advance_outgoing_epoch()?;
        debug!("Own epoch now {}", self.session.outgoing_epoch);
        Ok(())
    }

    pub fn send_alert(&mut self, alert: Alert) -> Result<(), Error> {
        let mut fragment = Vec::with_capacity(Alert::LEN);
        alert.serialize(&mut fragment);
        let epoch = self.session.outgoing_epoch;
        self.create_record(ContentType::Alert, epoch, false, &fragment)
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.established {
            return Err(Error::NotConnected);
        }

        let max_payload = self.config.mtu() - DTLSRecord::HEADER_LEN - DTLS_AEAD_OVERHEAD;
        let epoch = self.session.outgoing_epoch;

        for chunk in data.chunks(max_payload.max(1)) {
            self.create_record(ContentType::ApplicationData, epoch, false, chunk)?;
        }

        Ok(())
    }

    /// Both Finished verified.
    pub fn establish(&mut self) {
        debug!("Handshake complete");
        self.established = true;
        self.flight_stop_resend_timers();
        self.session.forget_master_secret();
        self.reassembler.clear();
        self.reorder.clear();
        self.push_event(LocalEvent::Connected);
    }

    /// Drop key material and buffers. Queued output stays pollable.
    pub fn teardown(&mut self) {
        self.flight_stop_resend_timers();
        self.flight_saved_records.clear();
        self.next_epoch.clear();
        self.reorder.clear();
        self.reassembler.clear();
        self.session.teardown();
    }
}

/// Duplicates of the last message of a peer flight mean the peer did not
/// get our answer.
fn triggers_resend(msg_type: MessageType) -> bool {
    matches!(
        msg_type,
        MessageType::ClientHello
            | MessageType::HelloVerifyRequest
            | MessageType::ServerHelloDone
            | MessageType::Finished
    )
}
