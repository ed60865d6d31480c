//! Replayable packet sources.
//!
//! The pass controller traverses a capture up to three times, so every
//! [`CaptureSource`] must yield the same packets in the same order on each
//! call to [`CaptureSource::packets`].
//!
//! [`PacketLog`] is the on-disk container produced by the capture front end:
//!
//! ```text
//! "AAPL" | version u16 | frame*
//! frame = opcode u16 | timestamp u32 | length u32 | payload[length]
//! ```
//!
//! All integers are little-endian.

use crate::error::{Error, Result};
use crate::record::FieldCursor;
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// Magic prefix of a packet log file
pub const PACKET_LOG_MAGIC: &[u8; 4] = b"AAPL";

/// Current packet log format version
pub const PACKET_LOG_VERSION: u16 = 1;

/// One game-protocol packet as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Protocol opcode
    pub opcode: u16,
    /// Payload following the opcode
    pub payload: Bytes,
    /// Capture time in unix seconds
    pub captured_at: u64,
}

impl RawPacket {
    /// Creates a new packet
    pub fn new(opcode: u16, payload: impl Into<Bytes>, captured_at: u64) -> Self {
        Self {
            opcode,
            payload: payload.into(),
            captured_at,
        }
    }
}

/// An ordered, replayable sequence of packets
pub trait CaptureSource {
    /// Iterate the packets in capture order
    fn packets(&self) -> Box<dyn Iterator<Item = &RawPacket> + '_>;
}

impl CaptureSource for [RawPacket] {
    fn packets(&self) -> Box<dyn Iterator<Item = &RawPacket> + '_> {
        Box::new(self.iter())
    }
}

impl CaptureSource for Vec<RawPacket> {
    fn packets(&self) -> Box<dyn Iterator<Item = &RawPacket> + '_> {
        Box::new(self.iter())
    }
}

/// Packets loaded from a packet log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketLog {
    packets: Vec<RawPacket>,
}

impl PacketLog {
    /// Wraps already captured packets
    pub fn new(packets: Vec<RawPacket>) -> Self {
        Self { packets }
    }

    /// Returns true if `data` starts with the packet log magic
    pub fn is_packet_log(data: &[u8]) -> bool {
        data.starts_with(PACKET_LOG_MAGIC)
    }

    /// Parses a packet log
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = FieldCursor::new(data);

        let magic = cursor
            .read_bytes(PACKET_LOG_MAGIC.len())
            .map_err(|_| Error::invalid_capture_log(0, "file too short for header"))?;
        if magic != PACKET_LOG_MAGIC {
            return Err(Error::invalid_capture_log(0, "bad magic"));
        }
        let version = cursor
            .read_u16()
            .map_err(|_| Error::invalid_capture_log(4, "file too short for header"))?;
        if version != PACKET_LOG_VERSION {
            return Err(Error::invalid_capture_log(
                4,
                format!("unsupported version {}", version),
            ));
        }

        let mut packets = Vec::new();
        while !cursor.is_exhausted() {
            let frame_start = cursor.position();
            let packet = Self::read_frame(&mut cursor).map_err(|e| {
                Error::invalid_capture_log(frame_start, format!("truncated frame: {}", e))
            })?;
            packets.push(packet);
        }

        debug!("Loaded {} packets from packet log", packets.len());
        Ok(Self { packets })
    }

    fn read_frame(cursor: &mut FieldCursor<'_>) -> Result<RawPacket> {
        let opcode = cursor.read_u16()?;
        let captured_at = u64::from(cursor.read_u32()?);
        let length = cursor.read_u32()? as usize;
        let payload = Bytes::copy_from_slice(cursor.read_bytes(length)?);
        Ok(RawPacket {
            opcode,
            payload,
            captured_at,
        })
    }

    /// Reads and parses a packet log file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_bytes(&data)
    }

    /// Serializes the log.
    ///
    /// Fails if a timestamp or payload length does not fit the 32-bit frame
    /// fields.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body: usize = self.packets.iter().map(|p| 10 + p.payload.len()).sum();
        let mut out = Vec::with_capacity(6 + body);
        out.extend_from_slice(PACKET_LOG_MAGIC);
        out.extend_from_slice(&PACKET_LOG_VERSION.to_le_bytes());
        for packet in &self.packets {
            let frame_start = out.len();
            let timestamp = u32::try_from(packet.captured_at).map_err(|_| {
                Error::invalid_capture_log(
                    frame_start,
                    format!("timestamp {} does not fit in 32 bits", packet.captured_at),
                )
            })?;
            let length = u32::try_from(packet.payload.len()).map_err(|_| {
                Error::invalid_capture_log(
                    frame_start,
                    format!("payload of {} bytes is too long", packet.payload.len()),
                )
            })?;
            out.extend_from_slice(&packet.opcode.to_le_bytes());
            out.extend_from_slice(&timestamp.to_le_bytes());
            out.extend_from_slice(&length.to_le_bytes());
            out.extend_from_slice(&packet.payload);
        }
        Ok(out)
    }

    /// Number of packets in the log
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Returns true if the log holds no packets
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl CaptureSource for PacketLog {
    fn packets(&self) -> Box<dyn Iterator<Item = &RawPacket> + '_> {
        Box::new(self.packets.iter())
    }
}

impl FromIterator<RawPacket> for PacketLog {
    fn from_iter<I: IntoIterator<Item = RawPacket>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> PacketLog {
        PacketLog::new(vec![
            RawPacket::new(0x2348, vec![1u8, 2, 3], 1_536_700_000),
            RawPacket::new(0x0042, Vec::<u8>::new(), 1_536_700_001),
            RawPacket::new(0x9999, vec![0xFFu8; 300], 1_536_700_002),
        ])
    }

    #[test]
    fn test_log_roundtrip() {
        let log = sample();
        let bytes = log.encode().unwrap();
        assert!(PacketLog::is_packet_log(&bytes));
        assert_eq!(PacketLog::from_bytes(&bytes).unwrap(), log);
    }

    #[test]
    fn test_empty_log() {
        let bytes = PacketLog::default().encode().unwrap();
        assert_eq!(bytes.len(), 6);
        assert!(PacketLog::from_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let err = PacketLog::from_bytes(b"PCAP\x01\x00").unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_bad_version() {
        let err = PacketLog::from_bytes(b"AAPL\x07\x00").unwrap_err();
        assert!(err.to_string().contains("unsupported version 7"));
    }

    #[test]
    fn test_truncated_frame_reports_frame_offset() {
        let mut bytes = sample().encode().unwrap();
        bytes.truncate(bytes.len() - 1);
        match PacketLog::from_bytes(&bytes) {
            Err(Error::InvalidCaptureLog { offset, .. }) => {
                // third frame starts after two headers and three payload bytes
                assert_eq!(offset, 6 + 10 + 3 + 10);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_past_32_bits_is_rejected() {
        let mut packets = sample().packets().cloned().collect::<Vec<_>>();
        packets[1].captured_at = u64::from(u32::MAX) + 1;
        match PacketLog::new(packets).encode() {
            Err(Error::InvalidCaptureLog { offset, details }) => {
                assert_eq!(offset, 6 + 10 + 3);
                assert!(details.contains("4294967296"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let last = RawPacket::new(1, vec![0u8; 120], u64::from(u32::MAX));
        let bytes = PacketLog::new(vec![last.clone()]).encode().unwrap();
        assert_eq!(PacketLog::from_bytes(&bytes).unwrap().packets().next(), Some(&last));
    }

    #[test]
    fn test_replay_is_identical() {
        let log = sample();
        let first: Vec<_> = log.packets().cloned().collect();
        let second: Vec<_> = log.packets().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.aapl");
        std::fs::write(&path, sample().encode().unwrap()).unwrap();
        assert_eq!(PacketLog::from_file(&path).unwrap().len(), 3);

        let missing = PacketLog::from_file(dir.path().join("missing.aapl"));
        assert!(matches!(missing, Err(Error::FileRead { .. })));
    }
}
