//! Outbound envelopes and the shared output-buffer pool they alias.
//!
//! One encoded message may be fanned out to several recipients; rather than
//! copy the payload once per recipient, every resulting envelope points at
//! the same buffer slot and only its header's sequence-number field is
//! patched in place at send time (see `engine::GossipEngine::process_send`).

use crate::config::MESSAGE_MAX_SIZE;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub slot: usize,
    pub len: usize,
    pub recipient: SocketAddr,
    pub sequence_num: u32,
    pub attempt_ts: u64,
    pub attempt_num: u8,
    pub max_attempts: u8,
}

/// Bounded queue of pending sends over a fixed pool of `MESSAGE_MAX_SIZE`
/// buffers. A `Vec<Envelope>` stands in for the original design's manual
/// doubly-linked list — at the bounded sizes this protocol deals in, a
/// linear scan for find-by-sequence is cheap and a `Vec` needs no unsafe
/// pointer bookkeeping.
pub struct OutboundQueue {
    buffers: Vec<[u8; MESSAGE_MAX_SIZE]>,
    envelopes: Vec<Envelope>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: vec![[0u8; MESSAGE_MAX_SIZE]; capacity.max(1)],
            envelopes: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    fn occupied_slots(&self) -> Vec<bool> {
        let mut occupied = vec![false; self.buffers.len()];
        for envelope in &self.envelopes {
            occupied[envelope.slot] = true;
        }
        occupied
    }

    pub fn occupied_slot_count(&self) -> usize {
        self.occupied_slots().iter().filter(|o| **o).count()
    }

    /// Find a free slot, or evict the envelope with the highest attempt
    /// count (and every envelope aliasing its buffer) and reuse its slot.
    fn allocate_slot(&mut self) -> usize {
        let occupied = self.occupied_slots();
        if let Some(free) = occupied.iter().position(|o| !o) {
            return free;
        }
        let evict_idx = self
            .envelopes
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| e.attempt_num)
            .map(|(i, _)| i)
            .expect("pool is full, so at least one envelope exists");
        let victim_slot = self.envelopes[evict_idx].slot;
        self.envelopes.retain(|e| e.slot != victim_slot);
        victim_slot
    }

    /// Encode `bytes` into a freshly allocated slot and enqueue one envelope
    /// per `(recipient, sequence_num)` pair, all aliasing that slot.
    pub fn enqueue_fanout(
        &mut self,
        bytes: &[u8],
        recipients: &[SocketAddr],
        sequence_nums: &[u32],
        max_attempts: u8,
    ) {
        if recipients.is_empty() {
            return;
        }
        let slot = self.allocate_slot();
        self.buffers[slot][..bytes.len()].copy_from_slice(bytes);
        for (recipient, seq) in recipients.iter().zip(sequence_nums.iter()) {
            self.envelopes.push(Envelope {
                slot,
                len: bytes.len(),
                recipient: *recipient,
                sequence_num: *seq,
                attempt_ts: 0,
                attempt_num: 0,
                max_attempts,
            });
        }
    }

    pub fn remove_by_sequence(&mut self, seq: u32) -> Option<Envelope> {
        let idx = self.envelopes.iter().position(|e| e.sequence_num == seq)?;
        Some(self.envelopes.remove(idx))
    }

    pub fn remove_at(&mut self, idx: usize) -> Envelope {
        self.envelopes.remove(idx)
    }

    pub fn envelope_mut(&mut self, idx: usize) -> &mut Envelope {
        &mut self.envelopes[idx]
    }

    pub fn buffer(&self, slot: usize) -> &[u8; MESSAGE_MAX_SIZE] {
        &self.buffers[slot]
    }

    pub fn buffer_mut(&mut self, slot: usize) -> &mut [u8; MESSAGE_MAX_SIZE] {
        &mut self.buffers[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn fanout_shares_one_slot_across_recipients() {
        let mut queue = OutboundQueue::new(4);
        queue.enqueue_fanout(b"hi", &[addr(1), addr(2), addr(3)], &[10, 11, 12], 3);
        assert_eq!(queue.len(), 3);
        let slots: Vec<usize> = queue.envelopes().iter().map(|e| e.slot).collect();
        assert!(slots.iter().all(|s| *s == slots[0]));
    }

    #[test]
    fn remove_by_sequence_finds_the_right_envelope() {
        let mut queue = OutboundQueue::new(4);
        queue.enqueue_fanout(b"hi", &[addr(1)], &[42], 1);
        let removed = queue.remove_by_sequence(42).unwrap();
        assert_eq!(removed.recipient, addr(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn saturated_pool_evicts_highest_attempt_count_and_its_aliases() {
        let mut queue = OutboundQueue::new(2);
        queue.enqueue_fanout(b"a", &[addr(1), addr(2)], &[1, 2], 3); // slot 0, two aliasing envelopes
        queue.enqueue_fanout(b"x", &[addr(9)], &[9], 3); // slot 1, fills the pool
        for envelope in 0..2 {
            queue.envelope_mut(envelope).attempt_num = 5;
        }
        queue.enqueue_fanout(b"b", &[addr(3)], &[3], 3);
        // slot 0's pair (highest attempt count) is evicted together; slot 1 survives.
        assert_eq!(queue.len(), 2);
        let recipients: Vec<SocketAddr> = queue.envelopes().iter().map(|e| e.recipient).collect();
        assert!(recipients.contains(&addr(9)));
        assert!(recipients.contains(&addr(3)));
    }
}
