//! Binary encoding for [`Packet`].
//!
//! Layout is `{ length: u16, packet_type: u16 }` followed by the payload, all
//! little-endian. Fixed-width text fields are zero padded and never read past
//! their width; short strings carry a one byte length prefix.

use super::protocol::{
    Account, Action, CONNECT_RESERVED_LEN, Chat, ChatStyle, Connect, ConnectAck, DisconnectReason,
    HEADER_SIZE, ItemAction, MAX_PACKET_SIZE, MESSAGE_LEN, NAME_LEN, PASSWORD_LEN, Packet,
    PacketHeader, PacketId, PlayerAppear, REALM_LEN, USERNAME_LEN, UserInfo, Walk,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated header: {available} of 4 bytes")]
    TruncatedHeader { available: usize },
    #[error("length mismatch: header declares {declared} bytes, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("unknown packet type {packet_type:#06x} ({length} bytes)")]
    UnknownType { packet_type: u16, length: usize },
    #[error("{packet} payload truncated: needed {needed} more bytes, {remaining} left")]
    TruncatedPayload {
        packet: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("{packet} payload has {extra} trailing bytes")]
    TrailingBytes { packet: &'static str, extra: usize },
}

impl DecodeError {
    /// A declared length shorter than the header cannot be skipped, so the
    /// stream position is lost for good.
    pub fn breaks_framing(&self) -> bool {
        matches!(self, DecodeError::LengthMismatch { declared, .. } if *declared < HEADER_SIZE)
    }
}

#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// Writes `text` into exactly `width` bytes, truncating on a char boundary.
    pub fn put_fixed_str(&mut self, text: &str, width: usize) {
        let bytes = truncate_utf8(text, width);
        self.buf.extend_from_slice(bytes);
        self.put_zeros(width - bytes.len());
    }

    pub fn put_short_str(&mut self, text: &str) {
        let bytes = truncate_utf8(text, u8::MAX as usize);
        self.put_u8(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

fn truncate_utf8(text: &str, max: usize) -> &[u8] {
    if text.len() <= max {
        return text.as_bytes();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text.as_bytes()[..end]
}

/// Bounds-checked cursor over one packet payload.
#[derive(Debug)]
pub struct ByteReader<'a> {
    packet: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(packet: &'static str, data: &'a [u8]) -> Self {
        Self {
            packet,
            data,
            pos: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < count {
            return Err(DecodeError::TruncatedPayload {
                packet: self.packet,
                needed: count,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        self.take_array().map(u64::from_le_bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        self.take(count).map(|_| ())
    }

    pub fn fixed_str(&mut self, width: usize) -> Result<String, DecodeError> {
        let field = self.take(width)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Ok(String::from_utf8_lossy(&field[..end]).into_owned())
    }

    pub fn short_str(&mut self) -> Result<String, DecodeError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(DecodeError::TrailingBytes {
                packet: self.packet,
                extra,
            }),
        }
    }
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(64);
        w.put_u16(0);
        w.put_u16(self.id().as_u16());
        self.encode_payload(&mut w);

        let mut bytes = w.into_inner();
        debug_assert!(bytes.len() <= MAX_PACKET_SIZE, "packet exceeds u16 length");
        let header = PacketHeader::new(self.id().as_u16(), bytes.len() - HEADER_SIZE);
        bytes[..2].copy_from_slice(&header.length.to_le_bytes());
        bytes
    }

    fn encode_payload(&self, w: &mut ByteWriter) {
        match self {
            Packet::Connect(p) => {
                w.put_u32(p.timestamp);
                w.put_u32(p.client_version);
                w.put_zeros(CONNECT_RESERVED_LEN);
            }
            Packet::ConnectAck(p) => {
                w.put_u8(p.result);
                w.put_u32(p.server_time);
                w.put_short_str(&p.reason);
            }
            Packet::Account(p) => {
                w.put_fixed_str(&p.username, USERNAME_LEN);
                w.put_fixed_str(&p.password, PASSWORD_LEN);
                w.put_fixed_str(&p.realm, REALM_LEN);
            }
            Packet::UserInfo(p) => {
                w.put_u32(p.entity_id);
                w.put_u16(p.body);
                w.put_u16(p.hair);
                w.put_u16(p.level);
                w.put_u32(p.hp);
                w.put_u32(p.max_hp);
                w.put_u32(p.mp);
                w.put_u32(p.max_mp);
                w.put_u16(p.x);
                w.put_u16(p.y);
                w.put_u16(p.direction);
                w.put_u16(p.map_id);
                w.put_fixed_str(&p.name, NAME_LEN);
            }
            Packet::Walk(p) => {
                w.put_u32(p.timestamp);
                w.put_u32(p.entity_id);
                w.put_u16(p.direction);
                w.put_u16(p.x);
                w.put_u16(p.y);
                w.put_u8(p.mode);
            }
            Packet::ItemAction(p) => {
                w.put_u32(p.timestamp);
                w.put_u16(p.action);
                w.put_u64(p.item_uid);
                for param in p.params {
                    w.put_u32(param);
                }
            }
            Packet::Chat(p) => {
                w.put_u32(p.color);
                w.put_u32(p.channel);
                w.put_u8(p.style.bits());
                w.put_u32(p.timestamp);
                w.put_u32(p.sender_id);
                w.put_u32(p.recipient_id);
                w.put_fixed_str(&p.sender_name, NAME_LEN);
                w.put_fixed_str(&p.recipient_name, NAME_LEN);
                w.put_fixed_str(&p.message, MESSAGE_LEN);
            }
            Packet::Action(p) => {
                w.put_u32(p.timestamp);
                w.put_u32(p.entity_id);
                w.put_u32(p.target_id);
                w.put_u16(p.x);
                w.put_u16(p.y);
                w.put_u16(p.direction);
                w.put_u16(p.action);
                w.put_u32(p.data);
            }
            Packet::PlayerAppear(p) => {
                w.put_u32(p.entity_id);
                w.put_u16(p.x);
                w.put_u16(p.y);
                w.put_u16(p.direction);
                w.put_fixed_str(&p.name, NAME_LEN);
            }
            Packet::PlayerDisappear { entity_id } => w.put_u32(*entity_id),
            Packet::Heartbeat { timestamp } | Packet::HeartbeatAck { timestamp } => {
                w.put_u32(*timestamp)
            }
            Packet::Reliable { sequence, frame } => {
                w.put_u32(*sequence);
                w.put_bytes(frame);
            }
            Packet::Ack { sequence } => w.put_u32(*sequence),
            Packet::Disconnect { reason } => w.put_u8(reason.as_u8()),
        }
    }

    /// Decodes exactly one frame; `bytes` must hold the whole frame and nothing else.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let header = PacketHeader::peek(bytes).ok_or(DecodeError::TruncatedHeader {
            available: bytes.len(),
        })?;

        let declared = header.length as usize;
        if declared < HEADER_SIZE || declared != bytes.len() {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let id = PacketId::try_from(header.packet_type).map_err(|packet_type| {
            DecodeError::UnknownType {
                packet_type,
                length: declared,
            }
        })?;

        let mut r = ByteReader::new(id.name(), &bytes[HEADER_SIZE..]);
        let packet = Self::decode_payload(id, &mut r)?;
        r.finish()?;
        Ok(packet)
    }

    fn decode_payload(id: PacketId, r: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let packet = match id {
            PacketId::Connect => {
                let packet = Packet::Connect(Connect {
                    timestamp: r.u32()?,
                    client_version: r.u32()?,
                });
                r.skip(CONNECT_RESERVED_LEN)?;
                packet
            }
            PacketId::ConnectAck => Packet::ConnectAck(ConnectAck {
                result: r.u8()?,
                server_time: r.u32()?,
                reason: r.short_str()?,
            }),
            PacketId::Account => Packet::Account(Account {
                username: r.fixed_str(USERNAME_LEN)?,
                password: r.fixed_str(PASSWORD_LEN)?,
                realm: r.fixed_str(REALM_LEN)?,
            }),
            PacketId::UserInfo => Packet::UserInfo(UserInfo {
                entity_id: r.u32()?,
                body: r.u16()?,
                hair: r.u16()?,
                level: r.u16()?,
                hp: r.u32()?,
                max_hp: r.u32()?,
                mp: r.u32()?,
                max_mp: r.u32()?,
                x: r.u16()?,
                y: r.u16()?,
                direction: r.u16()?,
                map_id: r.u16()?,
                name: r.fixed_str(NAME_LEN)?,
            }),
            PacketId::Walk => Packet::Walk(Walk {
                timestamp: r.u32()?,
                entity_id: r.u32()?,
                direction: r.u16()?,
                x: r.u16()?,
                y: r.u16()?,
                mode: r.u8()?,
            }),
            PacketId::ItemAction => Packet::ItemAction(ItemAction {
                timestamp: r.u32()?,
                action: r.u16()?,
                item_uid: r.u64()?,
                params: [r.u32()?, r.u32()?, r.u32()?],
            }),
            PacketId::Chat => Packet::Chat(Chat {
                color: r.u32()?,
                channel: r.u32()?,
                style: ChatStyle::from_bits_retain(r.u8()?),
                timestamp: r.u32()?,
                sender_id: r.u32()?,
                recipient_id: r.u32()?,
                sender_name: r.fixed_str(NAME_LEN)?,
                recipient_name: r.fixed_str(NAME_LEN)?,
                message: r.fixed_str(MESSAGE_LEN)?,
            }),
            PacketId::Action => Packet::Action(Action {
                timestamp: r.u32()?,
                entity_id: r.u32()?,
                target_id: r.u32()?,
                x: r.u16()?,
                y: r.u16()?,
                direction: r.u16()?,
                action: r.u16()?,
                data: r.u32()?,
            }),
            PacketId::PlayerAppear => Packet::PlayerAppear(PlayerAppear {
                entity_id: r.u32()?,
                x: r.u16()?,
                y: r.u16()?,
                direction: r.u16()?,
                name: r.fixed_str(NAME_LEN)?,
            }),
            PacketId::PlayerDisappear => Packet::PlayerDisappear {
                entity_id: r.u32()?,
            },
            PacketId::Heartbeat => Packet::Heartbeat {
                timestamp: r.u32()?,
            },
            PacketId::HeartbeatAck => Packet::HeartbeatAck {
                timestamp: r.u32()?,
            },
            PacketId::Reliable => Packet::Reliable {
                sequence: r.u32()?,
                frame: r.rest().to_vec(),
            },
            PacketId::Ack => Packet::Ack { sequence: r.u32()? },
            PacketId::Disconnect => Packet::Disconnect {
                reason: DisconnectReason::from_u8(r.u8()?),
            },
        };
        Ok(packet)
    }
}

/// Splits an inbound byte stream into frames.
///
/// A frame that fails to decode is still consumed by its declared length, so
/// the frames behind it decode normally.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    broken: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if !self.broken {
            self.buffer.extend_from_slice(bytes);
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// `Ok(None)` means more bytes are needed. An error drops one frame
    /// unless [`DecodeError::breaks_framing`] holds, after which the decoder
    /// refuses further input.
    pub fn next_frame(&mut self) -> Result<Option<Packet>, DecodeError> {
        let Some(header) = PacketHeader::peek(&self.buffer) else {
            return Ok(None);
        };

        let length = header.length as usize;
        if length < HEADER_SIZE {
            self.broken = true;
            let actual = self.buffer.len();
            self.buffer.clear();
            return Err(DecodeError::LengthMismatch {
                declared: length,
                actual,
            });
        }

        if self.buffer.len() < length {
            return Ok(None);
        }

        let result = Packet::decode(&self.buffer[..length]);
        self.buffer.drain(..length);
        result.map(Some)
    }
}
