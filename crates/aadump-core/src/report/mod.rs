//! Rendering decoded records into the text report.
//!
//! Records are keyed by `"<title>-<2-digit rank>"` and always written in
//! ascending key order; downstream consumers of the report depend on both.

mod strings;
mod writer;

use crate::error::{Error, Result};
use crate::record::AbilityRecord;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use tracing::debug;

pub use strings::{SpellTable, StringTable};
pub use writer::{BlockWriter, ExportWriter, NullWriter, RecordView, RecordWriter, StatsWriter};

/// Output layout of the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One human-readable block per record
    #[default]
    Blocks,
    /// One caret-separated line per record
    Export,
}

/// Decoded records prepared for output
#[derive(Debug, Clone, Default)]
pub struct Report {
    strings: StringTable,
    spells: SpellTable,
    entries: BTreeMap<String, AbilityRecord>,
}

impl Report {
    /// Creates an empty report resolving names through the given tables
    pub fn new(strings: StringTable, spells: SpellTable) -> Self {
        Self {
            strings,
            spells,
            entries: BTreeMap::new(),
        }
    }

    /// Report key for a record
    pub fn key_for(&self, record: &AbilityRecord) -> String {
        match self.strings.title(record.title_sid) {
            Some(title) => format!("{}-{:02}", title, record.rank),
            None => format!("Unknown Title {}-{:02}", record.title_sid, record.rank),
        }
    }

    /// Adds one record, replacing any record with the same key
    pub fn insert(&mut self, record: AbilityRecord) {
        let key = self.key_for(&record);
        if let Some(previous) = self.entries.insert(key, record) {
            debug!("Replaced report entry for ability {}", previous.aa_id);
        }
    }

    /// Adds records in order
    pub fn extend(&mut self, records: impl IntoIterator<Item = AbilityRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Keys in output order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the report has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walks every entry in key order
    pub fn visit(&self, writer: &mut dyn RecordWriter) -> std::fmt::Result {
        for (key, record) in &self.entries {
            let view = RecordView {
                key,
                record,
                title: self.strings.title(record.title_sid),
                description: self.strings.description(record.desc_sid2),
                spell: self.spells.name(record.spell_id),
            };
            writer.write_record(&view)?;
            for requirement in &record.requirements {
                writer.write_requirement(requirement)?;
            }
            for slot in &record.spa_slots {
                writer.write_spa_slot(slot)?;
            }
            writer.end_record(&view)?;
        }
        Ok(())
    }

    /// Writes the report to a formatter
    pub fn write_to(&self, w: &mut impl FmtWrite, format: ReportFormat) -> std::fmt::Result {
        match format {
            ReportFormat::Blocks => self.visit(&mut BlockWriter::new(w)),
            ReportFormat::Export => self.visit(&mut ExportWriter::new(w)),
        }
    }

    /// Renders the report as a string
    pub fn render(&self, format: ReportFormat) -> std::result::Result<String, std::fmt::Error> {
        let mut output = String::new();
        self.write_to(&mut output, format)?;
        Ok(output)
    }

    /// Collects statistics over every entry
    pub fn stats(&self) -> StatsWriter {
        let mut stats = StatsWriter::default();
        // StatsWriter hooks never fail
        let _ = self.visit(&mut stats);
        stats
    }

    /// Renders the report and writes it to `path`
    pub fn write_file(&self, path: impl AsRef<Path>, format: ReportFormat) -> Result<()> {
        let path = path.as_ref();
        let content = self.render(format).map_err(|_| Error::Render { path: path.into() })?;
        std::fs::write(path, content).map_err(|e| Error::file_write(path, e))
    }
}
