//! Game string and spell name tables.
//!
//! Both files are caret separated text shipped with the game client:
//!
//! ```text
//! dbstr_us.txt:  16366^1^Sorcerer's Vengeance^0^
//! spells_us.txt: 2754^Frenzied Burnout I^...
//! ```
//!
//! A lookup miss is `None`, never an empty string, so the report can tell an
//! unresolved id from a blank one.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// dbstr kind of ability titles
const KIND_TITLE: u32 = 1;

/// dbstr kind of ability descriptions
const KIND_DESCRIPTION: u32 = 4;

/// Titles and descriptions from `dbstr_us.txt`
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    titles: HashMap<i32, String>,
    descriptions: HashMap<i32, String>,
}

impl StringTable {
    /// Parses dbstr text, ignoring lines that do not fit the format
    pub fn parse(text: &str) -> Self {
        let mut table = Self::default();
        for line in text.lines() {
            let mut fields = line.trim_end_matches('\r').split('^');
            let (Some(id), Some(kind), Some(value)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let (Ok(id), Ok(kind)) = (id.parse::<i32>(), kind.parse::<u32>()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match kind {
                KIND_TITLE => {
                    table.titles.insert(id, value.to_string());
                }
                KIND_DESCRIPTION => {
                    table.descriptions.insert(id, value.to_string());
                }
                _ => {}
            }
        }
        table
    }

    /// Reads and parses a dbstr file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let table = Self::parse(&text);
        if table.titles.is_empty() {
            warn!("No titles found in {}", path.display());
        }
        debug!(
            "Loaded {} titles and {} descriptions from {}",
            table.titles.len(),
            table.descriptions.len(),
            path.display()
        );
        Ok(table)
    }

    /// Title text for a string id
    pub fn title(&self, id: i32) -> Option<&str> {
        self.titles.get(&id).map(String::as_str)
    }

    /// Description text for a string id
    pub fn description(&self, id: i32) -> Option<&str> {
        self.descriptions.get(&id).map(String::as_str)
    }

    /// Number of titles
    pub fn title_count(&self) -> usize {
        self.titles.len()
    }

    /// Number of descriptions
    pub fn description_count(&self) -> usize {
        self.descriptions.len()
    }
}

/// Spell names from `spells_us.txt`
#[derive(Debug, Clone, Default)]
pub struct SpellTable {
    names: HashMap<i32, String>,
}

impl SpellTable {
    /// Parses spell text, ignoring lines that do not fit the format
    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('^');
                let id = fields.next()?.parse::<i32>().ok()?;
                let name = fields.next()?.trim_end_matches('\r');
                (!name.is_empty()).then(|| (id, name.to_string()))
            })
            .collect();
        Self { names }
    }

    /// Reads and parses a spells file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let table = Self::parse(&text);
        if table.names.is_empty() {
            warn!("No spells found in {}", path.display());
        }
        debug!("Loaded {} spells from {}", table.names.len(), path.display());
        Ok(table)
    }

    /// Spell name for a spell id
    pub fn name(&self, id: i32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Number of spells
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no spells were loaded
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DBSTR: &str = "16366^1^Sorcerer's Vengeance^0^\r\n\
                         16366^4^Channels your rage.^0^\n\
                         8125^1^Battle Ready^0^\n\
                         garbage line\n\
                         12^7^Some other kind^0^\n\
                         13^1^^0^\n";

    #[test]
    fn test_parse_dbstr() {
        let table = StringTable::parse(DBSTR);
        assert_eq!(table.title(16366), Some("Sorcerer's Vengeance"));
        assert_eq!(table.description(16366), Some("Channels your rage."));
        assert_eq!(table.title(8125), Some("Battle Ready"));
        assert_eq!(table.title(12), None);
        assert_eq!(table.title(13), None);
        assert_eq!(table.title_count(), 2);
        assert_eq!(table.description_count(), 1);
    }

    #[test]
    fn test_parse_spells() {
        let table = SpellTable::parse("2754^Frenzied Burnout I^0^1\r\nbad^line\n17^Light Healing^\n");
        assert_eq!(table.name(2754), Some("Frenzied Burnout I"));
        assert_eq!(table.name(17), Some("Light Healing"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.name(1), None);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StringTable::from_file(dir.path().join("dbstr_us.txt")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spells_us.txt");
        std::fs::write(&path, "2754^Frenzied Burnout I^\n").unwrap();
        assert_eq!(SpellTable::from_file(&path).unwrap().len(), 1);
    }
}
