//! Bounded vector clock used to decide whether an inbound DATA message
//! carries information the local node has already seen.

use crate::codec::{decode_u32, encode_u32};
use crate::config::MAX_VECTOR_SIZE;
use crate::error::{Error, Result};
use crate::member::{Member, MemberId};

/// One `(member, sequence_number)` entry. Fixed 16-byte wire size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorRecord {
    pub sequence_num: u32,
    pub member_id: MemberId,
}

impl VectorRecord {
    pub const ENCODED_LEN: usize = 16;

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(Error::BufferNotEnough);
        }
        let n = encode_u32(buf, self.sequence_num)?;
        buf[n..n + 12].copy_from_slice(&self.member_id.0);
        Ok(Self::ENCODED_LEN)
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(Error::BufferNotEnough);
        }
        let (sequence_num, n) = decode_u32(buf)?;
        let mut id = [0u8; 12];
        id.copy_from_slice(&buf[n..n + 12]);
        Ok((
            VectorRecord {
                sequence_num,
                member_id: MemberId(id),
            },
            Self::ENCODED_LEN,
        ))
    }
}

/// Result of comparing two vector clocks (or a clock against a single
/// record): which one carries strictly newer information, if either does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Before,
    After,
    Equal,
    Conflict,
}

/// Ring buffer of up to `MAX_VECTOR_SIZE` `(MemberId, sequence_number)`
/// records. When full, the oldest slot is overwritten — a merge can
/// therefore be lossy, an accepted trade-off for a fixed-size wire
/// representation.
#[derive(Debug, Default)]
pub struct VectorClock {
    records: Vec<VectorRecord>,
    current_idx: usize,
}

impl VectorClock {
    pub fn new() -> Self {
        Self {
            records: Vec::with_capacity(MAX_VECTOR_SIZE),
            current_idx: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: MemberId) -> Option<usize> {
        self.records.iter().position(|r| r.member_id == id)
    }

    /// Overwrite (or insert) the record for `member` with `seq`. Returns the
    /// stored record.
    pub fn set(&mut self, member: &Member, seq: u32) -> VectorRecord {
        let id = member.id();
        if let Some(idx) = self.position(id) {
            self.records[idx].sequence_num = seq;
            return self.records[idx];
        }
        let record = VectorRecord {
            sequence_num: seq,
            member_id: id,
        };
        if self.records.len() < MAX_VECTOR_SIZE {
            self.records.push(record);
        } else {
            self.records[self.current_idx] = record;
        }
        self.current_idx = (self.current_idx + 1) % MAX_VECTOR_SIZE;
        record
    }

    /// Increment the sequence number for `member`, if a record exists.
    pub fn increment(&mut self, member: &Member) -> Option<VectorRecord> {
        let idx = self.position(member.id())?;
        self.records[idx].sequence_num += 1;
        Some(self.records[idx])
    }

    /// Compare `record` against this clock's stored sequence for the same
    /// member-id. When `merge` is set and the record is newer, adopt it.
    pub fn compare_with_record(&mut self, record: VectorRecord, merge: bool) -> Comparison {
        match self.position(record.member_id) {
            None => {
                if merge {
                    self.insert_record(record);
                }
                Comparison::Before
            }
            Some(idx) => {
                let existing = self.records[idx].sequence_num;
                match existing.cmp(&record.sequence_num) {
                    std::cmp::Ordering::Equal => Comparison::Equal,
                    std::cmp::Ordering::Greater => Comparison::After,
                    std::cmp::Ordering::Less => {
                        if merge {
                            self.records[idx].sequence_num = record.sequence_num;
                        }
                        Comparison::Before
                    }
                }
            }
        }
    }

    fn insert_record(&mut self, record: VectorRecord) {
        if self.records.len() < MAX_VECTOR_SIZE {
            self.records.push(record);
        } else {
            self.records[self.current_idx] = record;
        }
        self.current_idx = (self.current_idx + 1) % MAX_VECTOR_SIZE;
    }

    /// Compare this clock (`self`, treated as `a`) against `other` (`b`).
    /// Folds per-entry comparisons: the first non-`Equal` observation sets
    /// the running result, any subsequent disagreement flips it to
    /// `Conflict`. When `merge` is set, entries where `other` is newer (or
    /// present only in `other`) are adopted into `self`.
    pub fn compare(&mut self, other: &VectorClock, merge: bool) -> Comparison {
        let mut result: Option<Comparison> = None;
        let mut seen_in_other = 0u32;
        debug_assert!(MAX_VECTOR_SIZE <= 32);

        // Loop 2 only considers entries that existed before the merges
        // below; an entry `insert_record` just appended was never part of
        // `self`, so it can't count as `self`-only evidence of `After`.
        let original_len = self.records.len();

        for record in other.records.clone() {
            if let Some(idx) = self.position(record.member_id) {
                seen_in_other |= 1 << idx;
                let existing = self.records[idx].sequence_num;
                let step = match existing.cmp(&record.sequence_num) {
                    std::cmp::Ordering::Equal => Comparison::Equal,
                    std::cmp::Ordering::Greater => Comparison::After,
                    std::cmp::Ordering::Less => {
                        if merge {
                            self.records[idx].sequence_num = record.sequence_num;
                        }
                        Comparison::Before
                    }
                };
                result = Some(fold(result, step));
            } else {
                if merge {
                    self.insert_record(record);
                }
                result = Some(fold(result, Comparison::Before));
            }
        }

        for (idx, record) in self.records[..original_len].iter().enumerate() {
            if seen_in_other & (1 << idx) != 0 {
                continue;
            }
            let _ = record;
            result = Some(fold(result, Comparison::After));
        }

        result.unwrap_or(Comparison::Equal)
    }
}

fn fold(running: Option<Comparison>, step: Comparison) -> Comparison {
    match running {
        None => step,
        Some(Comparison::Equal) => step,
        Some(prev) if step == Comparison::Equal => prev,
        Some(prev) if prev == step => prev,
        Some(_) => Comparison::Conflict,
    }
}
