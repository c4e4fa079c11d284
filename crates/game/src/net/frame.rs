//! Datagram framing used by [`super::endpoint::NetworkEndpoint`].

use super::codec::{DecodeError, EncodeError, WireReader, WireWriter};
use super::transport::Channel;

pub const FRAME_MAGIC: u32 = 0x5453_4854;
pub const MAX_FRAME_PAYLOAD: usize = 1200;
pub const PAYLOAD_FRAME_OVERHEAD: usize = 4 + 1 + 1 + 4 + 4 + 4 + 2;
pub const MAX_DATAGRAM_SIZE: usize = PAYLOAD_FRAME_OVERHEAD + MAX_FRAME_PAYLOAD;

const KIND_CONNECT_REQUEST: u8 = 0x10;
const KIND_CONNECT_ACCEPT: u8 = 0x11;
const KIND_CONNECT_DENIED: u8 = 0x12;
const KIND_DISCONNECT: u8 = 0x13;
const KIND_PAYLOAD: u8 = 0x14;
const KIND_ACK: u8 = 0x15;
const KIND_KEEPALIVE: u8 = 0x16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    ConnectRequest {
        salt: u64,
    },
    ConnectAccept {
        salt: u64,
    },
    ConnectDenied {
        salt: u64,
    },
    Disconnect,
    /// `sequence` is 0 on the unreliable channel.
    Payload {
        channel: Channel,
        sequence: u32,
        ack: u32,
        ack_bits: u32,
        payload: Vec<u8>,
    },
    Ack {
        ack: u32,
        ack_bits: u32,
    },
    Keepalive,
}

impl Frame {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frame::ConnectRequest { .. } => "connect-request",
            Frame::ConnectAccept { .. } => "connect-accept",
            Frame::ConnectDenied { .. } => "connect-denied",
            Frame::Disconnect => "disconnect",
            Frame::Payload { .. } => "payload",
            Frame::Ack { .. } => "ack",
            Frame::Keepalive => "keepalive",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut writer = WireWriter::with_capacity(PAYLOAD_FRAME_OVERHEAD);
        writer.write_u32(FRAME_MAGIC);

        match self {
            Frame::ConnectRequest { salt } => {
                writer.write_u8(KIND_CONNECT_REQUEST);
                writer.write_u64(*salt);
            }
            Frame::ConnectAccept { salt } => {
                writer.write_u8(KIND_CONNECT_ACCEPT);
                writer.write_u64(*salt);
            }
            Frame::ConnectDenied { salt } => {
                writer.write_u8(KIND_CONNECT_DENIED);
                writer.write_u64(*salt);
            }
            Frame::Disconnect => writer.write_u8(KIND_DISCONNECT),
            Frame::Payload {
                channel,
                sequence,
                ack,
                ack_bits,
                payload,
            } => {
                writer.write_u8(KIND_PAYLOAD);
                writer.write_u8((*channel).into());
                writer.write_u32(*sequence);
                writer.write_u32(*ack);
                writer.write_u32(*ack_bits);
                writer.write_prefixed_bytes(payload)?;
            }
            Frame::Ack { ack, ack_bits } => {
                writer.write_u8(KIND_ACK);
                writer.write_u32(*ack);
                writer.write_u32(*ack_bits);
            }
            Frame::Keepalive => writer.write_u8(KIND_KEEPALIVE),
        }

        Ok(writer.finish())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(bytes);
        if reader.remaining() == 0 {
            return Err(DecodeError::Empty);
        }

        let magic = reader.read_u32()?;
        if magic != FRAME_MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }

        let frame = match reader.read_u8()? {
            KIND_CONNECT_REQUEST => Frame::ConnectRequest {
                salt: reader.read_u64()?,
            },
            KIND_CONNECT_ACCEPT => Frame::ConnectAccept {
                salt: reader.read_u64()?,
            },
            KIND_CONNECT_DENIED => Frame::ConnectDenied {
                salt: reader.read_u64()?,
            },
            KIND_DISCONNECT => Frame::Disconnect,
            KIND_PAYLOAD => {
                let channel_id = reader.read_u8()?;
                let channel =
                    Channel::from_id(channel_id).ok_or(DecodeError::InvalidChannel(channel_id))?;
                Frame::Payload {
                    channel,
                    sequence: reader.read_u32()?,
                    ack: reader.read_u32()?,
                    ack_bits: reader.read_u32()?,
                    payload: reader.read_prefixed_bytes()?.to_vec(),
                }
            }
            KIND_ACK => Frame::Ack {
                ack: reader.read_u32()?,
                ack_bits: reader.read_u32()?,
            },
            KIND_KEEPALIVE => Frame::Keepalive,
            other => return Err(DecodeError::UnknownKind(other)),
        };

        reader.finish()?;
        Ok(frame)
    }
}
