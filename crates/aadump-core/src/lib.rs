//! # aadump-core
//!
//! A library for recovering Alternate Advancement (AA) ability records from
//! game client packet captures.
//!
//! This crate provides the core functionality for:
//! - Replaying captured packets from a packet log
//! - Locating the AA table opcode by signature matching when it has moved
//! - Decoding AA records from their binary wire layout
//! - Rendering the recovered records into a sorted text report
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`capture`]: Captured packets and the packet log format
//! - [`discovery`]: Signature library and opcode discovery
//! - [`record`]: Field cursor and record decoder
//! - [`pass`]: Multi-pass controller tying discovery and decoding together
//! - [`report`]: String tables and report writers
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use aadump_core::{PacketLog, PassController, Report, ReportFormat, SpellTable, StringTable};
//!
//! let capture = PacketLog::from_file("session.aapl")?;
//! let result = PassController::new().run(&capture)?;
//!
//! let mut report = Report::new(StringTable::from_file("dbstr_us.txt")?, SpellTable::default());
//! report.extend(result.records.into_values());
//! report.write_file("aainfo.txt", ReportFormat::Blocks)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`CaptureSource`]: Feed packets from any capture backend
//! - [`RecordWriter`]: Customize how records are written
//! - [`SignatureLibrary`]: Supply signatures for other abilities
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod capture;
pub mod discovery;
pub mod error;
pub mod pass;
pub mod record;
pub mod report;

// Re-export primary types for convenience
pub use capture::{CaptureSource, PacketLog, RawPacket};
pub use discovery::{DiscoveryConfig, OpcodeDiscovery, Signature, SignatureLibrary};
pub use error::{Error, MalformedReason, Result};
pub use pass::{ControllerConfig, PassController, PassReport, PassState, Termination};
pub use record::{AbilityRecord, ClassMaskLayout, DecodeOutcome, DecoderConfig, RecordDecoder};
pub use report::{
    NullWriter, RecordWriter, Report, ReportFormat, SpellTable, StatsWriter, StringTable,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
