//! Extensible record writing traits.
//!
//! This module provides the [`RecordWriter`] trait for customizing how
//! decoded records are written to output. [`Report`](super::Report) walks
//! its entries in key order and calls the hooks below for each one.

use crate::record::{AbilityRecord, Requirement, SpaSlot};
use chrono::{DateTime, Utc};
use std::fmt::{Result, Write};

/// A record together with its resolved strings
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    /// Report key, `"<title>-<rank>"`
    pub key: &'a str,
    /// The decoded record
    pub record: &'a AbilityRecord,
    /// Resolved title
    pub title: Option<&'a str>,
    /// Resolved description
    pub description: Option<&'a str>,
    /// Resolved spell name
    pub spell: Option<&'a str>,
}

/// Trait for writing records to output.
///
/// Every hook defaults to a no-op, so implementors only override what they
/// need.
pub trait RecordWriter {
    /// Start of a record
    fn write_record(&mut self, view: &RecordView<'_>) -> Result {
        let _ = view;
        Ok(())
    }

    /// One prerequisite, most specific first
    fn write_requirement(&mut self, requirement: &Requirement) -> Result {
        let _ = requirement;
        Ok(())
    }

    /// One effect slot, in wire order
    fn write_spa_slot(&mut self, slot: &SpaSlot) -> Result {
        let _ = slot;
        Ok(())
    }

    /// End of a record
    fn end_record(&mut self, view: &RecordView<'_>) -> Result {
        let _ = view;
        Ok(())
    }
}

/// A no-op writer that discards all output
pub struct NullWriter;

impl RecordWriter for NullWriter {}

/// A writer that collects statistics about the records
#[derive(Debug, Default)]
pub struct StatsWriter {
    /// Number of records
    pub record_count: usize,
    /// Number of requirements
    pub requirement_count: usize,
    /// Number of effect slots
    pub spa_slot_count: usize,
    /// Records whose title did not resolve
    pub unresolved_titles: usize,
    /// Records whose description did not resolve
    pub unresolved_descriptions: usize,
}

impl RecordWriter for StatsWriter {
    fn write_record(&mut self, view: &RecordView<'_>) -> Result {
        self.record_count += 1;
        if view.title.is_none() {
            self.unresolved_titles += 1;
        }
        if view.description.is_none() {
            self.unresolved_descriptions += 1;
        }
        Ok(())
    }

    fn write_requirement(&mut self, _requirement: &Requirement) -> Result {
        self.requirement_count += 1;
        Ok(())
    }

    fn write_spa_slot(&mut self, _slot: &SpaSlot) -> Result {
        self.spa_slot_count += 1;
        Ok(())
    }
}

/// Writes one human-readable block per record
pub struct BlockWriter<'a, W: Write> {
    writer: &'a mut W,
    indent_str: &'a str,
}

impl<'a, W: Write> BlockWriter<'a, W> {
    /// Creates a block writer with two-space indentation
    pub fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            indent_str: "  ",
        }
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) -> Result {
        self.writer.write_str(self.indent_str)?;
        self.writer.write_fmt(args)?;
        self.writer.write_char('\n')
    }
}

impl<W: Write> RecordWriter for BlockWriter<'_, W> {
    fn write_record(&mut self, view: &RecordView<'_>) -> Result {
        let r = view.record;
        writeln!(self.writer, "{}", view.key)?;
        self.line(format_args!("Ability ID: {}  Rank: {} / {}", r.aa_id, r.rank, r.max_rank))?;
        match view.description {
            Some(text) => self.line(format_args!("Description: {}", text))?,
            None => self.line(format_args!("Description: <not found: {}>", r.desc_sid2))?,
        }
        self.line(format_args!(
            "Required Level: {}  Cost: {}  Total Cost: {}",
            r.req_level, r.cost, r.total_cost
        ))?;
        self.line(format_args!("Classes: {:#06x}", r.class_mask))?;
        self.line(format_args!(
            "Expansion: {}  Category: {}  Type: {}",
            r.expansion, r.category, r.kind
        ))?;
        if r.spell_id > 0 {
            match view.spell {
                Some(name) => self.line(format_args!("Spell: {} ({})", name, r.spell_id))?,
                None => self.line(format_args!("Spell: <not found: {}>", r.spell_id))?,
            }
            self.line(format_args!(
                "Reuse Time: {}s  Timer: {}",
                r.reuse_time, r.ability_timer
            ))?;
        }
        if r.max_activation_level > 0 {
            self.line(format_args!("Max Level: {}", r.max_activation_level))?;
        }
        if r.is_glyph {
            self.line(format_args!("Glyph"))?;
        }
        Ok(())
    }

    fn write_requirement(&mut self, requirement: &Requirement) -> Result {
        self.line(format_args!(
            "Requires: ability {} rank {}",
            requirement.ability_id, requirement.rank
        ))
    }

    fn write_spa_slot(&mut self, slot: &SpaSlot) -> Result {
        self.line(format_args!(
            "Slot {}: SPA {} base1 {} base2 {}",
            slot.slot, slot.spa, slot.base1, slot.base2
        ))
    }

    fn end_record(&mut self, _view: &RecordView<'_>) -> Result {
        self.writer.write_char('\n')
    }
}

/// Writes one caret-separated line per record in the spell parser AA layout
pub struct ExportWriter<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ExportWriter<'a, W> {
    /// Creates an export writer
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<W: Write> RecordWriter for ExportWriter<'_, W> {
    fn write_record(&mut self, view: &RecordView<'_>) -> Result {
        let r = view.record;
        let fields: [&dyn std::fmt::Display; 17] = [
            &r.desc_id,
            &r.aa_id,
            &r.prev_desc_sid,
            &r.title_sid,
            &r.desc_sid2,
            &r.rank,
            &r.max_rank,
            &r.class_mask,
            &r.req_level,
            &r.cost,
            &r.total_cost,
            &r.spell_id,
            &r.reuse_time,
            &r.ability_timer,
            &r.kind,
            &r.expansion,
            &r.category,
        ];
        for field in fields {
            write!(self.writer, "{}^", field)?;
        }
        writeln!(
            self.writer,
            "{}^{}^{}",
            spa_csv(r),
            requirement_csv(r),
            capture_date(r.captured_at)
        )
    }
}

fn spa_csv(record: &AbilityRecord) -> String {
    record
        .spa_slots
        .iter()
        .flat_map(|s| [s.spa, s.base1, s.base2, s.slot])
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn requirement_csv(record: &AbilityRecord) -> String {
    if record.requirements.is_empty() {
        return "0,0".to_string();
    }
    record
        .requirements
        .iter()
        .map(|r| format!("{},{}", r.ability_id, r.rank))
        .collect::<Vec<_>>()
        .join(",")
}

/// Capture date as `YYYY-MM-DD` in UTC
fn capture_date(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> AbilityRecord {
        AbilityRecord {
            desc_id: 8125,
            aa_id: 4700,
            prev_desc_sid: -1,
            title_sid: 8125,
            desc_sid2: 8125,
            rank: 1,
            max_rank: 4,
            class_mask: 65535,
            req_level: 107,
            cost: 1,
            total_cost: 1,
            spell_id: -1,
            kind: 1,
            expansion: 23,
            category: -1,
            requirements: vec![Requirement {
                ability_id: 12,
                rank: 3,
            }],
            spa_slots: vec![SpaSlot {
                spa: 363,
                base1: 1,
                base2: 0,
                slot: 1,
            }],
            captured_at: 1_536_700_000,
            ..AbilityRecord::default()
        }
    }

    fn view(record: &AbilityRecord) -> RecordView<'_> {
        RecordView {
            key: "Battle Ready-01",
            record,
            title: Some("Battle Ready"),
            description: None,
            spell: None,
        }
    }

    #[test]
    fn test_null_writer() {
        let record = record();
        let mut writer = NullWriter;
        assert!(writer.write_record(&view(&record)).is_ok());
    }

    #[test]
    fn test_stats_writer() {
        let record = record();
        let mut writer = StatsWriter::default();
        writer.write_record(&view(&record)).unwrap();
        writer.write_spa_slot(&record.spa_slots[0]).unwrap();
        writer.write_requirement(&record.requirements[0]).unwrap();

        assert_eq!(writer.record_count, 1);
        assert_eq!(writer.spa_slot_count, 1);
        assert_eq!(writer.requirement_count, 1);
        assert_eq!(writer.unresolved_titles, 0);
        assert_eq!(writer.unresolved_descriptions, 1);
    }

    #[test]
    fn test_export_line() {
        let record = record();
        let mut out = String::new();
        ExportWriter::new(&mut out)
            .write_record(&view(&record))
            .unwrap();
        assert_eq!(
            out,
            "8125^4700^-1^8125^8125^1^4^65535^107^1^1^-1^0^0^1^23^-1^363,1,0,1^12,3^2018-09-11\n"
        );
    }

    #[test]
    fn test_export_without_requirements() {
        let mut record = record();
        record.requirements.clear();
        record.spa_slots.clear();
        let mut out = String::new();
        ExportWriter::new(&mut out)
            .write_record(&view(&record))
            .unwrap();
        assert!(out.ends_with("^-1^^0,0^2018-09-11\n"));
    }

    #[test]
    fn test_block_writer() {
        let record = record();
        let view = view(&record);
        let mut out = String::new();
        {
            let mut writer = BlockWriter::new(&mut out);
            writer.write_record(&view).unwrap();
            writer.write_requirement(&record.requirements[0]).unwrap();
            writer.write_spa_slot(&record.spa_slots[0]).unwrap();
            writer.end_record(&view).unwrap();
        }
        assert!(out.starts_with("Battle Ready-01\n  Ability ID: 4700  Rank: 1 / 4\n"));
        assert!(out.contains("  Description: <not found: 8125>\n"));
        assert!(out.contains("  Requires: ability 12 rank 3\n"));
        assert!(out.contains("  Slot 1: SPA 363 base1 1 base2 0\n"));
        assert!(!out.contains("Spell:"));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn test_capture_date() {
        assert_eq!(capture_date(0), "1970-01-01");
        assert_eq!(capture_date(1_536_700_000), "2018-09-11");
    }
}
