//! Member identity and the membership set.

use crate::codec::{decode_u16, decode_u32, encode_u16, encode_u32};
use crate::config::{MEMBERS_EXTENSION_FACTOR, MEMBERS_INITIAL_CAPACITY, MEMBERS_LOAD_FACTOR};
use crate::error::{Error, Result};
use crate::ports::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const FAMILY_V4: u8 = 0;
const FAMILY_V6: u8 = 1;

/// A peer known to the local node. Equality (and therefore membership-set
/// deduplication) is by `(version, uid, address)`, not by `uid` alone —
/// `uid` is a coarse birth timestamp, not a guaranteed-unique handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub version: u16,
    pub uid: u32,
    pub addr: SocketAddr,
}

impl Member {
    pub fn new(version: u16, uid: u32, addr: SocketAddr) -> Self {
        Self { version, uid, addr }
    }

    /// Stable 12-byte identifier used as a vector-clock key.
    ///
    /// Bytes 0-5 are address-family-dependent (4 bytes of address + 2 bytes
    /// of port for IPv4; the first 4 bytes of address + 2 bytes of port for
    /// IPv6 — aliasing across /32 prefixes is a known, documented weakness).
    /// Bytes 6-7 are reserved. Bytes 8-11 are the big-endian `uid`.
    pub fn id(&self) -> MemberId {
        let mut bytes = [0u8; 12];
        match self.addr.ip() {
            IpAddr::V4(v4) => {
                bytes[0..4].copy_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                bytes[0..4].copy_from_slice(&v6.octets()[0..4]);
            }
        }
        bytes[4..6].copy_from_slice(&self.addr.port().to_be_bytes());
        bytes[8..12].copy_from_slice(&self.uid.to_be_bytes());
        MemberId(bytes)
    }

    /// Encoded wire size of this member: 9 bytes of fixed fields plus 4
    /// (IPv4) or 16 (IPv6) bytes of address.
    pub fn encoded_len(&self) -> usize {
        9 + match self.addr.ip() {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 16,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.encoded_len() {
            return Err(Error::BufferNotEnough);
        }
        let mut off = 0;
        off += encode_u16(&mut buf[off..], self.version)?;
        off += encode_u32(&mut buf[off..], self.uid)?;
        match self.addr.ip() {
            IpAddr::V4(v4) => {
                buf[off] = FAMILY_V4;
                off += 1;
                off += encode_u16(&mut buf[off..], self.addr.port())?;
                buf[off..off + 4].copy_from_slice(&v4.octets());
                off += 4;
            }
            IpAddr::V6(v6) => {
                buf[off] = FAMILY_V6;
                off += 1;
                off += encode_u16(&mut buf[off..], self.addr.port())?;
                buf[off..off + 16].copy_from_slice(&v6.octets());
                off += 16;
            }
        }
        Ok(off)
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 9 {
            return Err(Error::BufferNotEnough);
        }
        let mut off = 0;
        let (version, n) = decode_u16(&buf[off..])?;
        off += n;
        let (uid, n) = decode_u32(&buf[off..])?;
        off += n;
        let family = buf[off];
        off += 1;
        let (port, n) = decode_u16(&buf[off..])?;
        off += n;
        let ip = match family {
            FAMILY_V4 => {
                if buf.len() < off + 4 {
                    return Err(Error::BufferNotEnough);
                }
                let octets = [buf[off], buf[off + 1], buf[off + 2], buf[off + 3]];
                off += 4;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            FAMILY_V6 => {
                if buf.len() < off + 16 {
                    return Err(Error::BufferNotEnough);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[off..off + 16]);
                off += 16;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return Err(Error::InvalidMessage),
        };
        Ok((
            Member {
                version,
                uid,
                addr: SocketAddr::new(ip, port),
            },
            off,
        ))
    }
}

/// 12-byte stable member identifier, used as a vector-clock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(pub [u8; 12]);

/// Bounded, deduplicating collection of known peers with reservoir-sampled
/// random selection. Backed by a plain `Vec` rather than the original
/// design's dense open-addressed array — a linear scan over at most a few
/// hundred members is cheap, and it sidesteps the stale-tail-slot bug the
/// array version is prone to on removal.
#[derive(Debug, Default)]
pub struct MemberSet {
    members: Vec<Member>,
    capacity: usize,
}

impl MemberSet {
    pub fn new() -> Self {
        Self {
            members: Vec::with_capacity(MEMBERS_INITIAL_CAPACITY),
            capacity: MEMBERS_INITIAL_CAPACITY,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Insert `member` if no equal member is already present. Returns
    /// `true` if it was newly inserted.
    pub fn insert(&mut self, member: Member) -> bool {
        if self.members.iter().any(|m| *m == member) {
            return false;
        }
        if self.members.len() as f64 >= self.capacity as f64 * MEMBERS_LOAD_FACTOR {
            self.capacity *= MEMBERS_EXTENSION_FACTOR;
        }
        self.members.push(member);
        true
    }

    /// Remove the member whose address matches `addr`. Returns the removed
    /// member, if any.
    pub fn remove_by_addr(&mut self, addr: SocketAddr) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.addr == addr)?;
        Some(self.members.remove(idx))
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&Member> {
        self.members.iter().find(|m| m.addr == addr)
    }

    /// Reservoir-sample up to `k` distinct members. Deterministic given a
    /// seeded `Rng`.
    pub fn sample(&self, k: usize, rng: &mut dyn Rng) -> Vec<Member> {
        let mut reservoir: Vec<Member> = Vec::with_capacity(k.min(self.members.len()));
        for (i, member) in self.members.iter().enumerate() {
            if i < k {
                reservoir.push(member.clone());
            } else {
                let r = (rng.next_u32() as usize) % (i + 1);
                if r < k {
                    reservoir[r] = member.clone();
                }
            }
        }
        reservoir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::StepRng;

    fn make_member(port: u16, uid: u32) -> Member {
        Member::new(1, uid, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn insert_deduplicates() {
        let mut set = MemberSet::new();
        assert!(set.insert(make_member(9000, 1)));
        assert!(!set.insert(make_member(9000, 1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_by_addr_drops_member() {
        let mut set = MemberSet::new();
        set.insert(make_member(9000, 1));
        let addr = SocketAddr::from(([127, 0, 0, 1], 9000));
        assert!(set.remove_by_addr(addr).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn member_wire_round_trip_v4() {
        let m = make_member(9000, 42);
        let mut buf = [0u8; 32];
        let n = m.encode(&mut buf).unwrap();
        assert_eq!(n, m.encoded_len());
        let (decoded, n2) = Member::decode(&buf).unwrap();
        assert_eq!(n, n2);
        assert_eq!(decoded, m);
    }

    #[test]
    fn member_id_embeds_uid_and_port() {
        let m = make_member(9000, 0xAABBCCDD);
        let id = m.id();
        assert_eq!(&id.0[8..12], &0xAABBCCDDu32.to_be_bytes());
        assert_eq!(&id.0[4..6], &9000u16.to_be_bytes());
    }

    #[test]
    fn sample_returns_all_when_fewer_than_k() {
        let mut set = MemberSet::new();
        set.insert(make_member(9000, 1));
        set.insert(make_member(9001, 2));
        let mut rng = StepRng::new(7);
        let sampled = set.sample(5, &mut rng);
        assert_eq!(sampled.len(), 2);
    }

    #[test]
    fn sample_returns_exactly_k_when_set_larger() {
        let mut set = MemberSet::new();
        for i in 0..10 {
            set.insert(make_member(9000 + i, i as u32));
        }
        let mut rng = StepRng::new(7);
        let sampled = set.sample(3, &mut rng);
        assert_eq!(sampled.len(), 3);
        let mut uids: Vec<u32> = sampled.iter().map(|m| m.uid).collect();
        uids.sort_unstable();
        uids.dedup();
        assert_eq!(uids.len(), 3);
    }

    #[test]
    fn sample_from_empty_set_is_empty() {
        let set = MemberSet::new();
        let mut rng = StepRng::new(1);
        assert!(set.sample(3, &mut rng).is_empty());
    }
}
