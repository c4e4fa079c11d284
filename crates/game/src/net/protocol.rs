use glam::Vec3;

use super::codec::{DecodeError, EncodeError, WireReader, WireWriter};

pub type Tick = u32;
pub type PlayerId = u32;

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_MAX_PEERS: usize = 32;
pub const TICK_RATE: u32 = 64;

/// Encoded size of a `ClientInput` packet, discriminant included.
pub const INPUT_PACKET_SIZE: usize = 1 + 4 + 4 + 4 + 4 + 1 + 1 + 4 + 4;
/// Encoded size of one `EntityState`.
pub const ENTITY_STATE_SIZE: usize = 4 + 12 + 12 + 4 + 4;
/// Discriminant, tick and entity count.
pub const SNAPSHOT_HEADER_SIZE: usize = 1 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    ClientInput = 0x01,
    Snapshot = 0x02,
    Event = 0x03,
    Rpc = 0x04,
}

impl PacketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::ClientInput => "client-input",
            PacketKind::Snapshot => "snapshot",
            PacketKind::Event => "event",
            PacketKind::Rpc => "rpc",
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketKind::ClientInput),
            0x02 => Ok(PacketKind::Snapshot),
            0x03 => Ok(PacketKind::Event),
            0x04 => Ok(PacketKind::Rpc),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

/// One tick of player intent. `seq` mirrors `tick` and is what the server
/// uses to spot replays.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub tick: Tick,
    pub seq: u32,
    pub forward: f32,
    pub right: f32,
    pub jump: bool,
    pub fire: bool,
    pub yaw: f32,
    pub pitch: f32,
}

impl InputState {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            seq: tick,
            ..Default::default()
        }
    }

    pub fn with_movement(mut self, forward: f32, right: f32) -> Self {
        self.forward = forward;
        self.right = right;
        self
    }

    fn write(&self, writer: &mut WireWriter) {
        writer.write_u32(self.tick);
        writer.write_u32(self.seq);
        writer.write_f32(self.forward);
        writer.write_f32(self.right);
        writer.write_bool(self.jump);
        writer.write_bool(self.fire);
        writer.write_f32(self.yaw);
        writer.write_f32(self.pitch);
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            tick: reader.read_u32()?,
            seq: reader.read_u32()?,
            forward: reader.read_f32()?,
            right: reader.read_f32()?,
            jump: reader.read_bool()?,
            fire: reader.read_bool()?,
            yaw: reader.read_f32()?,
            pitch: reader.read_f32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityState {
    pub id: PlayerId,
    pub pos: Vec3,
    pub vel: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl EntityState {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    fn write(&self, writer: &mut WireWriter) {
        writer.write_u32(self.id);
        writer.write_vec3(self.pos);
        writer.write_vec3(self.vel);
        writer.write_f32(self.yaw);
        writer.write_f32(self.pitch);
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: reader.read_u32()?,
            pos: reader.read_vec3()?,
            vel: reader.read_vec3()?,
            yaw: reader.read_f32()?,
            pitch: reader.read_f32()?,
        })
    }
}

/// Authoritative state computed from the input stamped `tick`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub tick: Tick,
    pub entities: Vec<EntityState>,
}

impl Snapshot {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            entities: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity: EntityState) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entity(&self, id: PlayerId) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn encoded_len(&self) -> usize {
        SNAPSHOT_HEADER_SIZE + self.entities.len() * ENTITY_STATE_SIZE
    }
}

fn entity_count(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::TooManyEntities(len))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    ClientInput(InputState),
    Snapshot(Snapshot),
    /// Reserved kind, payload kept opaque.
    Event(Vec<u8>),
    /// Reserved kind, payload kept opaque.
    Rpc(Vec<u8>),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::ClientInput(_) => PacketKind::ClientInput,
            Packet::Snapshot(_) => PacketKind::Snapshot,
            Packet::Event(_) => PacketKind::Event,
            Packet::Rpc(_) => PacketKind::Rpc,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let capacity = match self {
            Packet::ClientInput(_) => INPUT_PACKET_SIZE,
            Packet::Snapshot(snapshot) => snapshot.encoded_len(),
            Packet::Event(bytes) | Packet::Rpc(bytes) => 1 + bytes.len(),
        };
        let mut writer = WireWriter::with_capacity(capacity);
        writer.write_u8(self.kind() as u8);

        match self {
            Packet::ClientInput(input) => input.write(&mut writer),
            Packet::Snapshot(snapshot) => {
                writer.write_u32(snapshot.tick);
                writer.write_u32(entity_count(snapshot.entities.len())?);
                for entity in &snapshot.entities {
                    entity.write(&mut writer);
                }
            }
            Packet::Event(bytes) | Packet::Rpc(bytes) => writer.write_slice(bytes),
        }

        Ok(writer.finish())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(bytes);
        if reader.remaining() == 0 {
            return Err(DecodeError::Empty);
        }

        let packet = match PacketKind::try_from(reader.read_u8()?)? {
            PacketKind::ClientInput => Packet::ClientInput(InputState::read(&mut reader)?),
            PacketKind::Snapshot => {
                let tick = reader.read_u32()?;
                let count = reader.read_u32()?;
                if count as usize > reader.remaining() / ENTITY_STATE_SIZE {
                    return Err(DecodeError::TooManyEntities(count));
                }
                let mut entities = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entities.push(EntityState::read(&mut reader)?);
                }
                Packet::Snapshot(Snapshot { tick, entities })
            }
            PacketKind::Event => Packet::Event(reader.rest().to_vec()),
            PacketKind::Rpc => Packet::Rpc(reader.rest().to_vec()),
        };

        reader.finish()?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> InputState {
        InputState {
            tick: 42,
            seq: 42,
            forward: 1.0,
            right: -0.5,
            jump: true,
            fire: false,
            yaw: 1.25,
            pitch: -0.3,
        }
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot::new(42).with_entity(EntityState {
            id: 3,
            pos: Vec3::new(0.078125, 0.0, -1.5),
            vel: Vec3::new(5.0, 0.0, 0.0),
            yaw: 0.5,
            pitch: 0.1,
        })
    }

    #[test]
    fn test_input_round_trip() {
        let packet = Packet::ClientInput(sample_input());
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), INPUT_PACKET_SIZE);
        assert_eq!(bytes.len(), 27);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let packet = Packet::Snapshot(sample_snapshot());
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), 45);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_empty_snapshot_round_trip() {
        let packet = Packet::Snapshot(Snapshot::new(9));
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), SNAPSHOT_HEADER_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_input_byte_layout() {
        let input = InputState::new(1).with_movement(1.0, 0.0);
        let bytes = Packet::ClientInput(input).encode().unwrap();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..5], &[1, 0, 0, 0]);
        assert_eq!(&bytes[5..9], &[1, 0, 0, 0]);
        assert_eq!(&bytes[9..13], &1.0f32.to_le_bytes());
        assert_eq!(bytes[17], 0);
        assert_eq!(bytes[18], 0);
    }

    #[test]
    fn test_floats_round_trip_bit_exact() {
        let mut input = sample_input();
        input.yaw = f32::MIN_POSITIVE / 2.0;
        input.pitch = -0.0;
        let bytes = Packet::ClientInput(input).encode().unwrap();
        let decoded = match Packet::decode(&bytes).unwrap() {
            Packet::ClientInput(decoded) => decoded,
            other => panic!("unexpected packet {other:?}"),
        };
        assert_eq!(decoded.yaw.to_bits(), input.yaw.to_bits());
        assert_eq!(decoded.pitch.to_bits(), input.pitch.to_bits());
    }

    #[test]
    fn test_every_truncation_fails() {
        for packet in [
            Packet::ClientInput(sample_input()),
            Packet::Snapshot(sample_snapshot()),
        ] {
            let bytes = packet.encode().unwrap();
            for len in 0..bytes.len() {
                assert!(
                    Packet::decode(&bytes[..len]).is_err(),
                    "{:?} prefix of {len} bytes decoded",
                    packet.kind()
                );
            }
        }
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(Packet::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(
            Packet::decode(&[0x7f, 1, 2, 3]),
            Err(DecodeError::UnknownKind(0x7f))
        );
        assert_eq!(Packet::decode(&[0x00]), Err(DecodeError::UnknownKind(0)));
    }

    #[test]
    fn test_reserved_kinds_keep_payload() {
        assert_eq!(
            Packet::decode(&[0x03, 9, 8]).unwrap(),
            Packet::Event(vec![9, 8])
        );
        assert_eq!(Packet::decode(&[0x04]).unwrap(), Packet::Rpc(Vec::new()));
        assert_eq!(Packet::Rpc(vec![5]).encode().unwrap(), vec![0x04, 5]);
    }

    #[test]
    fn test_entity_count_larger_than_buffer() {
        let mut bytes = vec![0x02];
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(
            Packet::decode(&bytes),
            Err(DecodeError::TooManyEntities(u32::MAX))
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_entity_count_beyond_u32_is_refused() {
        let len = u32::MAX as usize + 1;
        assert_eq!(entity_count(len), Err(EncodeError::TooManyEntities(len)));
        assert_eq!(entity_count(u32::MAX as usize), Ok(u32::MAX));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Packet::ClientInput(sample_input()).encode().unwrap();
        bytes.push(0);
        assert_eq!(Packet::decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut bytes = Packet::ClientInput(sample_input()).encode().unwrap();
        bytes[17] = 2;
        assert_eq!(Packet::decode(&bytes), Err(DecodeError::InvalidBool(2)));
    }

    #[test]
    fn test_snapshot_entity_lookup() {
        let snapshot = sample_snapshot();
        assert!(snapshot.entity(3).is_some());
        assert!(snapshot.entity(4).is_none());
    }
}
