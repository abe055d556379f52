//! The gossip engine: state machine, message handlers, fanout selection,
//! and the send/retry pass. Driven synchronously by the host, which calls
//! `process_receive`, `process_send`, and `tick` from its own event loop —
//! the engine never spawns a thread or suspends itself.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::{
    EngineConfig, MESSAGE_MAX_SIZE, MESSAGE_RETRY_ATTEMPTS, MESSAGE_RETRY_INTERVAL_MS,
    MESSAGE_RUMOR_FACTOR, MEMBER_LIST_SYNC_SIZE, GOSSIP_TICK_INTERVAL_MS, PROTOCOL_VERSION,
};
use crate::envelope::OutboundQueue;
use crate::error::{Error, Result};
use crate::member::{Member, MemberSet};
use crate::message::{Message, MessageHeader, MessageType, SEQUENCE_FIELD_OFFSET};
use crate::ports::{Clock, Rng, Transport};
use crate::vector_clock::{Comparison, VectorClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipState {
    Initialized,
    Joining,
    Connected,
    Leaving,
    Disconnected,
    Destroyed,
}

/// Single-threaded gossip engine, generic over its transport, clock, and
/// RNG so it can be driven deterministically in tests.
pub struct GossipEngine<T: Transport, C: Clock, R: Rng> {
    transport: T,
    clock: C,
    rng: R,
    state: GossipState,
    self_member: Member,
    members: MemberSet,
    local_clock: VectorClock,
    queue: OutboundQueue,
    next_sequence_num: u32,
    data_counter: u32,
    recv_buf: [u8; MESSAGE_MAX_SIZE],
    on_data: Box<dyn FnMut(&[u8])>,
}

impl<T: Transport, C: Clock, R: Rng> GossipEngine<T, C, R> {
    /// Build a new engine atop an already-bound transport. The self member's
    /// address is taken from `transport.local_addr()`, so a failure there
    /// surfaces as `Error::InitFailed`.
    pub fn create(
        transport: T,
        clock: C,
        rng: R,
        config: EngineConfig,
        on_data: impl FnMut(&[u8]) + 'static,
    ) -> Result<Self> {
        let local_addr = transport.local_addr().map_err(|_| Error::InitFailed)?;
        let uid = (clock.now_ms() / 1000) as u32;
        let self_member = Member::new(PROTOCOL_VERSION, uid, local_addr);
        Ok(Self {
            transport,
            clock,
            rng,
            state: GossipState::Initialized,
            self_member,
            members: MemberSet::new(),
            local_clock: VectorClock::new(),
            queue: OutboundQueue::new(config.max_output_messages),
            next_sequence_num: 0,
            data_counter: 0,
            recv_buf: [0u8; MESSAGE_MAX_SIZE],
            on_data: Box::new(on_data),
        })
    }

    pub fn state(&self) -> GossipState {
        self.state
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn outbound_queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn outbound_slots_used(&self) -> usize {
        self.queue.occupied_slot_count()
    }

    /// Consume the engine, releasing its transport and queued envelopes.
    pub fn destroy(mut self) {
        self.state = GossipState::Destroyed;
    }

    fn next_seq(&mut self) -> u32 {
        self.next_sequence_num = self.next_sequence_num.wrapping_add(1);
        self.next_sequence_num
    }

    fn encode(&self, message: &Message) -> Result<(Vec<u8>, usize)> {
        let mut buf = vec![0u8; MESSAGE_MAX_SIZE];
        let len = message.encode(&mut buf)?;
        Ok((buf, len))
    }

    fn enqueue(
        &mut self,
        message: &Message,
        recipients: &[SocketAddr],
        max_attempts: u8,
    ) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        let (buf, len) = self.encode(message)?;
        let seqs: Vec<u32> = recipients.iter().map(|_| self.next_seq()).collect();
        self.queue.enqueue_fanout(&buf[..len], recipients, &seqs, max_attempts);
        Ok(())
    }

    /// Join the cluster. An empty seed list starts this node as a seed
    /// (immediately `Connected`); a non-empty list sends a HELLO to each
    /// seed and transitions to `Joining`.
    pub fn join(&mut self, seeds: &[SocketAddr]) -> Result<()> {
        if seeds.is_empty() {
            self.state = GossipState::Connected;
            return Ok(());
        }
        self.state = GossipState::Joining;
        let header = MessageHeader {
            message_type: MessageType::Hello,
            sequence_num: 0,
        };
        let message = Message::Hello {
            header,
            sender: self.self_member.clone(),
        };
        self.enqueue(&message, seeds, MESSAGE_RETRY_ATTEMPTS)
    }

    fn require_connected(&self) -> Result<()> {
        match self.state {
            GossipState::Connected => Ok(()),
            _ => Err(Error::BadState),
        }
    }

    fn require_joining_or_connected(&self) -> Result<()> {
        match self.state {
            GossipState::Joining | GossipState::Connected => Ok(()),
            _ => Err(Error::BadState),
        }
    }

    /// Receive and dispatch at most one datagram. Malformed datagrams are
    /// dropped silently (logged at debug level) rather than surfaced as an
    /// error — only a state violation or transport error propagates.
    pub fn process_receive(&mut self) -> Result<()> {
        self.require_joining_or_connected()?;

        let (n, from) = match self.transport.recv(&mut self.recv_buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(Error::Io(e)),
        };

        let message = match Message::decode(&self.recv_buf[..n]) {
            Ok((message, _)) => message,
            Err(e) => {
                debug!(?from, error = %e, "dropping malformed datagram");
                return Ok(());
            }
        };

        match message {
            Message::Hello { header, sender } => self.handle_hello(from, header, sender)?,
            Message::Welcome {
                hello_sequence_num,
                responder,
                ..
            } => self.handle_welcome(responder, hello_sequence_num),
            Message::MemberList { header, members } => {
                self.handle_member_list(from, header, members)?
            }
            Message::Ack {
                ack_sequence_num, ..
            } => self.handle_ack(ack_sequence_num),
            Message::Data {
                header,
                record,
                payload,
            } => self.handle_data(from, header, record, payload)?,
        }
        Ok(())
    }

    fn handle_hello(&mut self, from: SocketAddr, header: MessageHeader, sender: Member) -> Result<()> {
        if self.require_connected().is_err() {
            debug!(?from, "ignoring HELLO while not connected");
            return Ok(());
        }

        let welcome = Message::Welcome {
            header: MessageHeader {
                message_type: MessageType::Welcome,
                sequence_num: 0,
            },
            hello_sequence_num: header.sequence_num,
            responder: self.self_member.clone(),
        };
        self.enqueue(&welcome, &[from], 1)?;

        if !self.members.is_empty() {
            let existing: Vec<Member> = self.members.iter().cloned().collect();
            for chunk in existing.chunks(MEMBER_LIST_SYNC_SIZE) {
                let sync = Message::MemberList {
                    header: MessageHeader {
                        message_type: MessageType::MemberList,
                        sequence_num: 0,
                    },
                    members: chunk.to_vec(),
                };
                self.enqueue(&sync, &[from], MESSAGE_RETRY_ATTEMPTS)?;
            }

            let announce_recipients: Vec<SocketAddr> =
                existing.iter().map(|m| m.addr).collect();
            let announce = Message::MemberList {
                header: MessageHeader {
                    message_type: MessageType::MemberList,
                    sequence_num: 0,
                },
                members: vec![sender.clone()],
            };
            self.enqueue(&announce, &announce_recipients, MESSAGE_RETRY_ATTEMPTS)?;
        }

        self.members.insert(sender);
        Ok(())
    }

    fn handle_welcome(&mut self, responder: Member, hello_sequence_num: u32) {
        self.state = GossipState::Connected;
        self.members.insert(responder);
        self.queue.remove_by_sequence(hello_sequence_num);
    }

    fn handle_member_list(
        &mut self,
        from: SocketAddr,
        header: MessageHeader,
        members: Vec<Member>,
    ) -> Result<()> {
        if self.require_connected().is_err() {
            debug!(?from, "ignoring MEMBER_LIST while not connected");
            return Ok(());
        }
        for member in members {
            if member.addr != self.self_member.addr {
                self.members.insert(member);
            }
        }
        let ack = Message::Ack {
            header: MessageHeader {
                message_type: MessageType::Ack,
                sequence_num: 0,
            },
            ack_sequence_num: header.sequence_num,
        };
        self.enqueue(&ack, &[from], 1)
    }

    fn handle_ack(&mut self, ack_sequence_num: u32) {
        self.queue.remove_by_sequence(ack_sequence_num);
    }

    fn handle_data(
        &mut self,
        from: SocketAddr,
        header: MessageHeader,
        record: crate::vector_clock::VectorRecord,
        payload: Vec<u8>,
    ) -> Result<()> {
        if self.require_connected().is_err() {
            debug!(?from, "ignoring DATA while not connected");
            return Ok(());
        }

        let ack = Message::Ack {
            header: MessageHeader {
                message_type: MessageType::Ack,
                sequence_num: 0,
            },
            ack_sequence_num: header.sequence_num,
        };
        self.enqueue(&ack, &[from], 1)?;

        let comparison = self.local_clock.compare_with_record(record, true);
        if comparison != Comparison::Before {
            trace!(?from, "DATA already seen, dropping");
            return Ok(());
        }

        (self.on_data)(&payload);

        let recipients: Vec<SocketAddr> = self
            .members
            .sample(MESSAGE_RUMOR_FACTOR, &mut self.rng)
            .iter()
            .map(|m| m.addr)
            .collect();
        let rebroadcast = Message::Data {
            header: MessageHeader {
                message_type: MessageType::Data,
                sequence_num: 0,
            },
            record,
            payload,
        };
        self.enqueue(&rebroadcast, &recipients, MESSAGE_RETRY_ATTEMPTS)
    }

    /// Build and enqueue a DATA message carrying `payload`, fanned out to a
    /// random sample of known peers.
    pub fn send_data(&mut self, payload: &[u8]) -> Result<()> {
        self.require_connected()?;
        self.data_counter = self.data_counter.wrapping_add(1);
        let record = self.local_clock.set(&self.self_member, self.data_counter);
        let recipients: Vec<SocketAddr> = self
            .members
            .sample(MESSAGE_RUMOR_FACTOR, &mut self.rng)
            .iter()
            .map(|m| m.addr)
            .collect();
        let message = Message::Data {
            header: MessageHeader {
                message_type: MessageType::Data,
                sequence_num: 0,
            },
            record,
            payload: payload.to_vec(),
        };
        self.enqueue(&message, &recipients, MESSAGE_RETRY_ATTEMPTS)
    }

    /// Walk the outbound queue once, sending every envelope that is due.
    /// Envelopes that exhaust their retry budget are dropped; if they
    /// expected an ACK, their recipient is presumed unreachable and evicted
    /// from the member set. Returns the number of datagrams sent.
    pub fn process_send(&mut self) -> Result<usize> {
        self.require_joining_or_connected()?;

        let now = self.clock.now_ms();
        let mut sent = 0usize;
        let mut i = 0;
        while i < self.queue.len() {
            let (due, slot, len, recipient, seq, attempt_num, max_attempts) = {
                let envelope = &self.queue.envelopes()[i];
                let due = envelope.attempt_num == 0
                    || envelope.attempt_ts + MESSAGE_RETRY_INTERVAL_MS <= now;
                (
                    due,
                    envelope.slot,
                    envelope.len,
                    envelope.recipient,
                    envelope.sequence_num,
                    envelope.attempt_num,
                    envelope.max_attempts,
                )
            };
            if !due {
                i += 1;
                continue;
            }

            {
                let buf = self.queue.buffer_mut(slot);
                buf[SEQUENCE_FIELD_OFFSET..SEQUENCE_FIELD_OFFSET + 4]
                    .copy_from_slice(&seq.to_be_bytes());
            }
            let datagram = self.queue.buffer(slot)[..len].to_vec();
            self.transport.send_to(&datagram, recipient)?;
            sent += 1;

            let attempt_num = attempt_num + 1;
            if attempt_num >= max_attempts {
                if max_attempts > 1 {
                    if self.members.remove_by_addr(recipient).is_some() {
                        debug!(%recipient, "peer presumed unreachable after exhausting retries");
                    }
                }
                self.queue.remove_at(i);
            } else {
                let envelope = self.queue.envelope_mut(i);
                envelope.attempt_ts = now;
                envelope.attempt_num = attempt_num;
                i += 1;
            }
        }
        Ok(sent)
    }

    /// Optional periodic hook. Has no effect on engine state beyond a
    /// diagnostic log line; returns the suggested interval until the next
    /// call.
    pub fn tick(&mut self) -> Duration {
        debug!(
            queue_len = self.queue.len(),
            members = self.members.len(),
            vector_clock_len = self.local_clock.len(),
            "tick"
        );
        Duration::from_millis(GOSSIP_TICK_INTERVAL_MS)
    }
}
