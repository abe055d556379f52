//! Wire message types and their manual big-endian encode/decode. Atop the
//! byte codec, the member encoding, and the vector record encoding.

use crate::codec::{decode_u16, decode_u32, encode_u16, encode_u32};
use crate::config::PROTOCOL_MAGIC;
use crate::error::{Error, Result};
use crate::member::Member;
use crate::vector_clock::VectorRecord;

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Welcome = 2,
    MemberList = 3,
    Ack = 4,
    Data = 5,
}

impl MessageType {
    fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(MessageType::Hello),
            2 => Ok(MessageType::Welcome),
            3 => Ok(MessageType::MemberList),
            4 => Ok(MessageType::Ack),
            5 => Ok(MessageType::Data),
            _ => Err(Error::InvalidMessage),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub sequence_num: u32,
}

impl MessageHeader {
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < HEADER_LEN {
            return Err(Error::BufferNotEnough);
        }
        buf[0..5].copy_from_slice(&PROTOCOL_MAGIC);
        buf[5] = self.message_type as u8;
        buf[6] = 0;
        buf[7] = 0;
        encode_u32(&mut buf[8..], self.sequence_num)?;
        Ok(HEADER_LEN)
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < HEADER_LEN {
            return Err(Error::BufferNotEnough);
        }
        if buf[0..5] != PROTOCOL_MAGIC {
            return Err(Error::InvalidMessage);
        }
        let message_type = MessageType::from_u8(buf[5])?;
        let (sequence_num, _) = decode_u32(&buf[8..])?;
        Ok((
            MessageHeader {
                message_type,
                sequence_num,
            },
            HEADER_LEN,
        ))
    }

    /// Peek at a buffer's message type tag without parsing the rest.
    pub fn peek_type(buf: &[u8]) -> Result<MessageType> {
        if buf.len() < HEADER_LEN {
            return Err(Error::BufferNotEnough);
        }
        if buf[0..5] != PROTOCOL_MAGIC {
            return Err(Error::InvalidMessage);
        }
        MessageType::from_u8(buf[5])
    }
}

/// Offset of the sequence-number field within an encoded header, used by the
/// send pass to patch a shared buffer's sequence number per recipient.
pub const SEQUENCE_FIELD_OFFSET: usize = HEADER_LEN - 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello {
        header: MessageHeader,
        sender: Member,
    },
    Welcome {
        header: MessageHeader,
        hello_sequence_num: u32,
        responder: Member,
    },
    MemberList {
        header: MessageHeader,
        members: Vec<Member>,
    },
    Ack {
        header: MessageHeader,
        ack_sequence_num: u32,
    },
    Data {
        header: MessageHeader,
        record: VectorRecord,
        payload: Vec<u8>,
    },
}

impl Message {
    pub fn header(&self) -> MessageHeader {
        match self {
            Message::Hello { header, .. }
            | Message::Welcome { header, .. }
            | Message::MemberList { header, .. }
            | Message::Ack { header, .. }
            | Message::Data { header, .. } => *header,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut off = self.header().encode(buf)?;
        match self {
            Message::Hello { sender, .. } => {
                off += sender.encode(&mut buf[off..])?;
            }
            Message::Welcome {
                hello_sequence_num,
                responder,
                ..
            } => {
                off += encode_u32(&mut buf[off..], *hello_sequence_num)?;
                off += responder.encode(&mut buf[off..])?;
            }
            Message::MemberList { members, .. } => {
                off += encode_u16(&mut buf[off..], members.len() as u16)?;
                for member in members {
                    off += member.encode(&mut buf[off..])?;
                }
            }
            Message::Ack {
                ack_sequence_num, ..
            } => {
                off += encode_u32(&mut buf[off..], *ack_sequence_num)?;
            }
            Message::Data {
                record, payload, ..
            } => {
                off += record.encode(&mut buf[off..])?;
                off += encode_u16(&mut buf[off..], payload.len() as u16)?;
                if buf.len() < off + payload.len() {
                    return Err(Error::BufferNotEnough);
                }
                buf[off..off + payload.len()].copy_from_slice(payload);
                off += payload.len();
            }
        }
        Ok(off)
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (header, mut off) = MessageHeader::decode(buf)?;
        let message = match header.message_type {
            MessageType::Hello => {
                let (sender, n) = Member::decode(&buf[off..])?;
                off += n;
                Message::Hello { header, sender }
            }
            MessageType::Welcome => {
                let (hello_sequence_num, n) = decode_u32(&buf[off..])?;
                off += n;
                let (responder, n) = Member::decode(&buf[off..])?;
                off += n;
                Message::Welcome {
                    header,
                    hello_sequence_num,
                    responder,
                }
            }
            MessageType::MemberList => {
                let (count, n) = decode_u16(&buf[off..])?;
                off += n;
                let mut members = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (member, n) = Member::decode(&buf[off..])?;
                    off += n;
                    members.push(member);
                }
                Message::MemberList { header, members }
            }
            MessageType::Ack => {
                let (ack_sequence_num, n) = decode_u32(&buf[off..])?;
                off += n;
                Message::Ack {
                    header,
                    ack_sequence_num,
                }
            }
            MessageType::Data => {
                let (record, n) = VectorRecord::decode(&buf[off..])?;
                off += n;
                let (size, n) = decode_u16(&buf[off..])?;
                off += n;
                let size = size as usize;
                if buf.len() != off + size {
                    return Err(Error::BufferNotEnough);
                }
                let payload = buf[off..off + size].to_vec();
                off += size;
                Message::Data {
                    header,
                    record,
                    payload,
                }
            }
        };
        Ok((message, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn make_member(port: u16, uid: u32) -> Member {
        Member::new(1, uid, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn header(mt: MessageType, seq: u32) -> MessageHeader {
        MessageHeader {
            message_type: mt,
            sequence_num: seq,
        }
    }

    #[test]
    fn hello_round_trips() {
        let msg = Message::Hello {
            header: header(MessageType::Hello, 1),
            sender: make_member(9000, 1),
        };
        let mut buf = [0u8; 64];
        let n = msg.encode(&mut buf).unwrap();
        let (decoded, n2) = Message::decode(&buf[..n]).unwrap();
        assert_eq!(n, n2);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn member_list_round_trips_with_multiple_members() {
        let members = vec![make_member(9000, 1), make_member(9001, 2), make_member(9002, 3)];
        let msg = Message::MemberList {
            header: header(MessageType::MemberList, 7),
            members,
        };
        let mut buf = [0u8; 256];
        let n = msg.encode(&mut buf).unwrap();
        let (decoded, n2) = Message::decode(&buf[..n]).unwrap();
        assert_eq!(n, n2);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn data_round_trips() {
        let record = VectorRecord {
            sequence_num: 3,
            member_id: make_member(9000, 1).id(),
        };
        let msg = Message::Data {
            header: header(MessageType::Data, 11),
            record,
            payload: b"hello cluster".to_vec(),
        };
        let mut buf = [0u8; 128];
        let n = msg.encode(&mut buf).unwrap();
        let (decoded, n2) = Message::decode(&buf[..n]).unwrap();
        assert_eq!(n, n2);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = [0u8; 12];
        assert!(matches!(MessageHeader::decode(&buf), Err(Error::InvalidMessage)));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut buf = [0u8; 12];
        buf[0..5].copy_from_slice(&PROTOCOL_MAGIC);
        buf[5] = 0xFF;
        assert!(matches!(MessageHeader::decode(&buf), Err(Error::InvalidMessage)));
    }

    #[test]
    fn rejects_header_only_buffer_for_payload_type() {
        let header_only = {
            let mut buf = [0u8; 12];
            MessageHeader {
                message_type: MessageType::Hello,
                sequence_num: 0,
            }
            .encode(&mut buf)
            .unwrap();
            buf
        };
        assert!(matches!(Message::decode(&header_only), Err(Error::BufferNotEnough)));
    }

    #[test]
    fn data_requires_exact_payload_size() {
        let record = VectorRecord {
            sequence_num: 1,
            member_id: make_member(9000, 1).id(),
        };
        let msg = Message::Data {
            header: header(MessageType::Data, 1),
            record,
            payload: b"abc".to_vec(),
        };
        let mut buf = [0u8; 64];
        let n = msg.encode(&mut buf).unwrap();
        assert!(matches!(Message::decode(&buf[..n - 1]), Err(Error::BufferNotEnough)));
    }
}
