//! Ability record decoding.
//!
//! A record payload is a fixed header followed by two capped requirement
//! lists, a second block of fixed fields and finally a list of special
//! ability (SPA) slots:
//!
//! ```text
//! desc_id i32 | 0x01 u8 | hotkey_sid i32 | hotkey_sid2 i32 | title_sid i32
//! desc_sid2 i32 | req_level u32 | cost u32 | aa_id u32 | rank u32
//! skill_count u32 | skill u32 * n
//! rank_count u32  | rank u32 * n
//! type u32 | spell_id i32 | 0x01 u32 | ability_timer u32 | reuse_time u32
//! class_mask (4 bytes, see ClassMaskLayout) | max_rank u32
//! prev_desc_sid i32 | next_desc_sid i32 | total_cost u32 | unknown [10]
//! expansion u32 | category i32 | unknown [4] | expansion2 u32
//! max_activation_level u32 | is_glyph u8 | spa_count u32
//! (spa i32, base1 i32, base2 i32, slot i32) * spa_count
//! ```

mod cursor;

use crate::capture::RawPacket;
use crate::error::{Error, MalformedReason, Result};
use tracing::{debug, trace, warn};

pub use cursor::FieldCursor;

/// Requirement lists at or above this length mark a misaligned record
pub const MAX_REQUIREMENTS: u32 = 5;

/// Default cap on the number of SPA slots in one record
pub const MAX_SPA_SLOTS: u32 = 32;

/// Value of the marker fields that precede the hotkey and ability timer ids
const MARKER: u32 = 1;

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// One prerequisite of an ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// Ability or skill that must be owned
    pub ability_id: u32,
    /// Minimum rank of that ability
    pub rank: u32,
}

/// One special ability effect slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaSlot {
    /// Effect type
    pub spa: i32,
    /// First effect magnitude
    pub base1: i32,
    /// Second effect magnitude
    pub base2: i32,
    /// Slot index within the ability
    pub slot: i32,
}

/// A decoded ability record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbilityRecord {
    /// Description id
    pub desc_id: i32,
    /// First hotkey string id
    pub hotkey_sid: i32,
    /// Second hotkey string id
    pub hotkey_sid2: i32,
    /// Title string id, never `-1` in a decoded record
    pub title_sid: i32,
    /// Secondary description string id
    pub desc_sid2: i32,
    /// Character level required to purchase
    pub req_level: u32,
    /// Cost of this rank
    pub cost: u32,
    /// Ability id, the key of the result mapping
    pub aa_id: u32,
    /// Rank of this record
    pub rank: u32,
    /// Prerequisites, most specific first
    pub requirements: Vec<Requirement>,
    /// Ability type
    pub kind: u32,
    /// Spell cast on activation, `-1` for passives
    pub spell_id: i32,
    /// Shared ability timer id
    pub ability_timer: u32,
    /// Reuse time in seconds
    pub reuse_time: u32,
    /// Class bitmask after layout decoding
    pub class_mask: u32,
    /// The four class mask bytes as read from the wire
    pub class_mask_raw: u32,
    /// Highest rank of the ability
    pub max_rank: u32,
    /// Description id of the previous rank
    pub prev_desc_sid: i32,
    /// Description id of the next rank
    pub next_desc_sid: i32,
    /// Cumulative cost up to this rank
    pub total_cost: u32,
    /// Expansion id
    pub expansion: u32,
    /// Category id
    pub category: i32,
    /// Required expansion, not always set
    pub expansion2: u32,
    /// Highest character level that can use the ability
    pub max_activation_level: u32,
    /// Glyph flag
    pub is_glyph: bool,
    /// Effect slots in wire order
    pub spa_slots: Vec<SpaSlot>,
    /// Capture timestamp of the packet this record came from (unix seconds)
    pub captured_at: u64,
}

impl AbilityRecord {
    /// Required ability ids, paired positionally with [`Self::required_ranks`]
    pub fn required_skills(&self) -> impl Iterator<Item = u32> + '_ {
        self.requirements.iter().map(|r| r.ability_id)
    }

    /// Required ranks, paired positionally with [`Self::required_skills`]
    pub fn required_ranks(&self) -> impl Iterator<Item = u32> + '_ {
        self.requirements.iter().map(|r| r.rank)
    }

    /// Encodes the record in wire layout.
    ///
    /// Unknown padding is written as zeros and the class mask is written from
    /// [`Self::class_mask_raw`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160 + self.spa_slots.len() * 16);
        out.extend_from_slice(&self.desc_id.to_le_bytes());
        out.push(MARKER as u8);
        for v in [self.hotkey_sid, self.hotkey_sid2, self.title_sid, self.desc_sid2] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [self.req_level, self.cost, self.aa_id, self.rank] {
            put_u32(&mut out, v);
        }

        // Decoding reverses encounter order
        put_u32(&mut out, self.requirements.len() as u32);
        for req in self.requirements.iter().rev() {
            put_u32(&mut out, req.ability_id);
        }
        put_u32(&mut out, self.requirements.len() as u32);
        for req in self.requirements.iter().rev() {
            put_u32(&mut out, req.rank);
        }

        put_u32(&mut out, self.kind);
        out.extend_from_slice(&self.spell_id.to_le_bytes());
        put_u32(&mut out, MARKER);
        for v in [
            self.ability_timer,
            self.reuse_time,
            self.class_mask_raw,
            self.max_rank,
        ] {
            put_u32(&mut out, v);
        }
        out.extend_from_slice(&self.prev_desc_sid.to_le_bytes());
        out.extend_from_slice(&self.next_desc_sid.to_le_bytes());
        put_u32(&mut out, self.total_cost);
        out.extend_from_slice(&[0u8; 10]);
        put_u32(&mut out, self.expansion);
        out.extend_from_slice(&self.category.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        put_u32(&mut out, self.expansion2);
        put_u32(&mut out, self.max_activation_level);
        out.push(u8::from(self.is_glyph));

        put_u32(&mut out, self.spa_slots.len() as u32);
        for slot in &self.spa_slots {
            for v in [slot.spa, slot.base1, slot.base2, slot.slot] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }
}

/// How the four class mask bytes are interpreted.
///
/// The two known protocol revisions agree whenever the high half is 0 or 1,
/// so a high half above 1 marks the record as ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassMaskLayout {
    /// One 32-bit mask shifted right by one bit
    #[default]
    Packed32,
    /// A 16-bit class mask followed by a 16-bit berserker flag
    Split16,
}

impl ClassMaskLayout {
    /// Reads the mask, returning `(raw, decoded)`
    fn read(self, cursor: &mut FieldCursor<'_>) -> Result<(u32, u32)> {
        match self {
            Self::Packed32 => {
                let raw = cursor.read_u32()?;
                Ok((raw, self.decode(raw)))
            }
            Self::Split16 => {
                let classes = cursor.read_u16()?;
                let berserker = cursor.read_u16()?;
                let raw = u32::from(classes) | (u32::from(berserker) << 16);
                Ok((raw, self.decode(raw)))
            }
        }
    }

    /// Converts the raw wire value into the external class bitmask
    pub fn decode(self, raw: u32) -> u32 {
        match self {
            Self::Packed32 => raw >> 1,
            Self::Split16 => {
                let classes = raw & 0xFFFF;
                let berserker = raw >> 16;
                (classes >> 1) + if berserker != 0 { 32768 } else { 0 }
            }
        }
    }

    /// Returns true when the two layouts disagree on `raw`
    pub fn is_ambiguous(raw: u32) -> bool {
        raw >> 16 > 1
    }
}

/// Configuration for the record decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Class mask interpretation
    pub class_mask: ClassMaskLayout,
    /// Requirement counts at or above this value are rejected
    pub max_requirements: u32,
    /// SPA slot counts above this value are rejected
    pub max_spa_slots: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            class_mask: ClassMaskLayout::default(),
            max_requirements: MAX_REQUIREMENTS,
            max_spa_slots: MAX_SPA_SLOTS,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the class mask layout
    pub fn class_mask(mut self, layout: ClassMaskLayout) -> Self {
        self.class_mask = layout;
        self
    }

    /// Sets the SPA slot cap
    pub fn max_spa_slots(mut self, max: u32) -> Self {
        self.max_spa_slots = max;
        self
    }
}

/// Result of decoding one packet
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A structurally valid record
    Success(AbilityRecord),
    /// The payload is not a usable record
    Malformed(Error),
    /// The packet does not carry the target opcode
    NotApplicable,
}

impl DecodeOutcome {
    /// Returns the record if decoding succeeded
    pub fn into_record(self) -> Option<AbilityRecord> {
        match self {
            Self::Success(record) => Some(record),
            _ => None,
        }
    }

    /// Returns true for [`DecodeOutcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for [`DecodeOutcome::Malformed`]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Decodes ability record payloads
#[derive(Debug, Clone, Default)]
pub struct RecordDecoder {
    config: DecoderConfig,
}

impl RecordDecoder {
    /// Creates a decoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes `packet` if it carries `opcode`
    pub fn decode_packet(&self, packet: &RawPacket, opcode: u16) -> DecodeOutcome {
        if packet.opcode != opcode {
            return DecodeOutcome::NotApplicable;
        }
        match self.decode(&packet.payload) {
            DecodeOutcome::Success(mut record) => {
                record.captured_at = packet.captured_at;
                DecodeOutcome::Success(record)
            }
            other => other,
        }
    }

    /// Decodes one payload
    pub fn decode(&self, payload: &[u8]) -> DecodeOutcome {
        let mut cursor = FieldCursor::new(payload);
        match self.parse(&mut cursor) {
            Ok(record) => {
                if !cursor.is_exhausted() {
                    trace!(
                        "{} trailing bytes after record {}",
                        cursor.remaining(),
                        record.aa_id
                    );
                }
                DecodeOutcome::Success(record)
            }
            Err(e) => {
                trace!("Rejected payload of {} bytes: {}", payload.len(), e);
                DecodeOutcome::Malformed(e)
            }
        }
    }

    /// Reads a capped list of u32 values, keeping encounter order
    fn read_capped_list(&self, cursor: &mut FieldCursor<'_>) -> Result<Vec<u32>> {
        let count = cursor.read_u32()?;
        if count >= self.config.max_requirements {
            return Err(Error::malformed(MalformedReason::TooManyRequirements {
                count,
            }));
        }
        (0..count).map(|_| cursor.read_u32()).collect()
    }

    fn parse(&self, cursor: &mut FieldCursor<'_>) -> Result<AbilityRecord> {
        let mut record = AbilityRecord {
            desc_id: cursor.read_i32()?,
            ..AbilityRecord::default()
        };

        let marker = cursor.read_u8()?;
        if u32::from(marker) != MARKER {
            trace!("Unexpected marker byte {:#04x}", marker);
        }

        record.hotkey_sid = cursor.read_i32()?;
        record.hotkey_sid2 = cursor.read_i32()?;
        record.title_sid = cursor.read_i32()?;
        record.desc_sid2 = cursor.read_i32()?;
        record.req_level = cursor.read_u32()?;
        record.cost = cursor.read_u32()?;
        record.aa_id = cursor.read_u32()?;
        record.rank = cursor.read_u32()?;

        let skills = self.read_capped_list(cursor)?;
        let ranks = self.read_capped_list(cursor)?;
        if skills.len() != ranks.len() {
            debug!(
                "Requirement lists out of step on ability {} ({} skills, {} ranks)",
                record.aa_id,
                skills.len(),
                ranks.len()
            );
        }
        // Each list drops zeros and reverses on its own, pairs stop at the shorter list
        let skills = skills.into_iter().filter(|&v| v != 0).rev();
        let ranks = ranks.into_iter().filter(|&v| v != 0).rev();
        record.requirements = skills
            .zip(ranks)
            .map(|(ability_id, rank)| Requirement { ability_id, rank })
            .collect();

        record.kind = cursor.read_u32()?;
        record.spell_id = cursor.read_i32()?;
        cursor.skip(4)?;
        record.ability_timer = cursor.read_u32()?;
        record.reuse_time = cursor.read_u32()?;

        let (raw, mask) = self.config.class_mask.read(cursor)?;
        if ClassMaskLayout::is_ambiguous(raw) {
            warn!(
                "Ambiguous class mask {:#010x} on ability {}, decoded as {:?}",
                raw, record.aa_id, self.config.class_mask
            );
        }
        record.class_mask_raw = raw;
        record.class_mask = mask;

        record.max_rank = cursor.read_u32()?;
        record.prev_desc_sid = cursor.read_i32()?;
        record.next_desc_sid = cursor.read_i32()?;
        record.total_cost = cursor.read_u32()?;
        cursor.skip(10)?;
        record.expansion = cursor.read_u32()?;
        record.category = cursor.read_i32()?;
        cursor.skip(4)?;
        record.expansion2 = cursor.read_u32()?;
        record.max_activation_level = cursor.read_u32()?;
        record.is_glyph = cursor.read_u8()? != 0;

        let spa_count = cursor.read_u32()?;
        if spa_count > self.config.max_spa_slots {
            return Err(Error::malformed(MalformedReason::TooManySpaSlots {
                count: spa_count,
            }));
        }
        record.spa_slots = (0..spa_count)
            .map(|_| -> Result<SpaSlot> {
                Ok(SpaSlot {
                    spa: cursor.read_i32()?,
                    base1: cursor.read_i32()?,
                    base2: cursor.read_i32()?,
                    slot: cursor.read_i32()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if record.title_sid == -1 {
            return Err(Error::malformed(MalformedReason::MissingTitle));
        }

        Ok(record)
    }
}
