//! Multi-pass traversal of a capture.
//!
//! ```text
//! UsingKnownOpcode(op) --records--> Done(Success)
//!        | empty
//!        v
//!   Discovering --none--> Done(OpcodeNotFound)
//!        | confirmed op'
//!        v
//!  ReDecoding(op') --records--> Done(Success)
//!        | empty
//!        v
//!  Done(FormatChanged)
//! ```
//!
//! Every traversal starts from an empty result mapping and, when discovering,
//! an empty tally. Nothing from a failed pass survives into the next one.

use crate::capture::CaptureSource;
use crate::discovery::{DiscoveryConfig, OpcodeDiscovery, ScanUpdate, SignatureLibrary};
use crate::error::{Error, Result};
use crate::record::{AbilityRecord, ClassMaskLayout, DecodeOutcome, DecoderConfig, RecordDecoder};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

/// Opcode of the AA table packet when the capture tooling was last verified
pub const DEFAULT_AA_OPCODE: u16 = 0x2348;

/// Configuration for the pass controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Opcode tried before discovery; `None` starts opcode-blind
    pub default_opcode: Option<u16>,
    /// Record decoder settings
    pub decoder: DecoderConfig,
    /// Discovery settings
    pub discovery: DiscoveryConfig,
    /// Signatures used during discovery
    pub signatures: SignatureLibrary,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_opcode: Some(DEFAULT_AA_OPCODE),
            decoder: DecoderConfig::default(),
            discovery: DiscoveryConfig::default(),
            signatures: SignatureLibrary::builtin(),
        }
    }
}

impl ControllerConfig {
    /// Creates a new controller config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the opcode tried before discovery
    pub fn default_opcode(mut self, opcode: Option<u16>) -> Self {
        self.default_opcode = opcode;
        self
    }

    /// Sets the record decoder settings
    pub fn decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }

    /// Sets the discovery settings
    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Sets the discovery signatures
    pub fn signatures(mut self, signatures: SignatureLibrary) -> Self {
        self.signatures = signatures;
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Records were decoded with `opcode`
    Success {
        /// Opcode the records were decoded with
        opcode: u16,
    },
    /// Discovery never confirmed an opcode
    OpcodeNotFound,
    /// An opcode was confirmed but no record decoded with it
    FormatChanged {
        /// The confirmed opcode
        opcode: u16,
    },
}

impl Termination {
    /// Returns true for [`Termination::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Controller state between traversals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Next traversal decodes with the configured opcode
    UsingKnownOpcode(u16),
    /// Next traversal scans for signatures
    Discovering,
    /// Next traversal decodes with a freshly confirmed opcode
    ReDecoding(u16),
    /// No further traversals
    Done(Termination),
}

/// Statistics for one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Opcode decoded with, `None` for a discovery traversal
    pub opcode: Option<u16>,
    /// Packets visited
    pub packets: usize,
    /// Packets carrying the target opcode
    pub matched: usize,
    /// Records decoded
    pub decoded: usize,
    /// Packets rejected by the decoder
    pub malformed: usize,
    /// Records whose class mask reads differently under the other layout
    pub ambiguous_class_masks: usize,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Opcode the records were decoded with
    pub opcode: u16,
    /// Records keyed by ability id
    pub records: BTreeMap<u32, AbilityRecord>,
    /// One summary per traversal, in order
    pub passes: Vec<PassSummary>,
}

/// Drives the discover, decode and validate loop over a capture
#[derive(Debug)]
pub struct PassController {
    config: ControllerConfig,
    decoder: RecordDecoder,
    discovery: OpcodeDiscovery,
    state: PassState,
    results: BTreeMap<u32, AbilityRecord>,
    passes: Vec<PassSummary>,
}

impl Default for PassController {
    fn default() -> Self {
        Self::new()
    }
}

impl PassController {
    /// Creates a controller with default configuration
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    /// Creates a controller with custom configuration
    pub fn with_config(config: ControllerConfig) -> Self {
        let decoder = RecordDecoder::with_config(config.decoder.clone());
        let discovery =
            OpcodeDiscovery::with_config(config.signatures.clone(), config.discovery.clone());
        let state = Self::initial_state(&config);
        Self {
            config,
            decoder,
            discovery,
            state,
            results: BTreeMap::new(),
            passes: Vec::new(),
        }
    }

    fn initial_state(config: &ControllerConfig) -> PassState {
        match config.default_opcode {
            Some(opcode) => PassState::UsingKnownOpcode(opcode),
            None => PassState::Discovering,
        }
    }

    /// Current state
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Records held by the most recent decode traversal
    pub fn results(&self) -> &BTreeMap<u32, AbilityRecord> {
        &self.results
    }

    /// Summaries of the traversals run so far
    pub fn passes(&self) -> &[PassSummary] {
        &self.passes
    }

    /// Returns to the cold starting state
    pub fn reset(&mut self) {
        self.state = Self::initial_state(&self.config);
        self.results.clear();
        self.discovery.reset();
        self.passes.clear();
    }

    /// Runs one traversal for the current state and transitions
    pub fn step<S>(&mut self, source: &S) -> PassState
    where
        S: CaptureSource + ?Sized,
    {
        let current = self.state;
        self.state = match current {
            PassState::UsingKnownOpcode(opcode) => {
                self.decode_pass(opcode, source);
                if self.results.is_empty() {
                    info!(
                        "No AAs found using opcode {:#06x}, searching for updated opcode",
                        opcode
                    );
                    PassState::Discovering
                } else {
                    PassState::Done(Termination::Success { opcode })
                }
            }
            PassState::Discovering => match self.discover_pass(source) {
                Some(opcode) => {
                    info!(
                        "Found likely opcode {:#06x}, trying to parse AA data again",
                        opcode
                    );
                    PassState::ReDecoding(opcode)
                }
                None => {
                    warn!("Could not find opcode, giving up");
                    PassState::Done(Termination::OpcodeNotFound)
                }
            },
            PassState::ReDecoding(opcode) => {
                self.decode_pass(opcode, source);
                if self.results.is_empty() {
                    warn!("AA format has most likely changed and can not be parsed");
                    PassState::Done(Termination::FormatChanged { opcode })
                } else {
                    PassState::Done(Termination::Success { opcode })
                }
            }
            done @ PassState::Done(_) => done,
        };
        self.state
    }

    /// Runs from a cold state until done
    pub fn run<S>(&mut self, source: &S) -> Result<PassReport>
    where
        S: CaptureSource + ?Sized,
    {
        self.reset();
        let termination = loop {
            if let PassState::Done(termination) = self.step(source) {
                break termination;
            }
        };

        match termination {
            Termination::Success { opcode } => Ok(PassReport {
                opcode,
                records: std::mem::take(&mut self.results),
                passes: self.passes.clone(),
            }),
            Termination::OpcodeNotFound => Err(Error::OpcodeNotFound),
            Termination::FormatChanged { opcode } => Err(Error::NoRecordsDecoded { opcode }),
        }
    }

    fn decode_pass<S>(&mut self, opcode: u16, source: &S)
    where
        S: CaptureSource + ?Sized,
    {
        self.results.clear();
        let mut summary = PassSummary {
            opcode: Some(opcode),
            ..PassSummary::default()
        };

        for packet in source.packets() {
            summary.packets += 1;
            match self.decoder.decode_packet(packet, opcode) {
                DecodeOutcome::Success(record) => {
                    summary.matched += 1;
                    summary.decoded += 1;
                    if ClassMaskLayout::is_ambiguous(record.class_mask_raw) {
                        summary.ambiguous_class_masks += 1;
                    }
                    trace!("Decoded ability {} rank {}", record.aa_id, record.rank);
                    self.results.insert(record.aa_id, record);
                }
                DecodeOutcome::Malformed(e) => {
                    summary.matched += 1;
                    summary.malformed += 1;
                    debug!("Skipping packet at {}: {}", packet.captured_at, e);
                }
                DecodeOutcome::NotApplicable => {}
            }
        }

        debug!(
            "Decode pass with {:#06x}: {} packets, {} matched, {} decoded, {} malformed",
            opcode, summary.packets, summary.matched, summary.decoded, summary.malformed
        );
        if summary.ambiguous_class_masks > 0 {
            warn!(
                "{} records have class masks that differ between layouts",
                summary.ambiguous_class_masks
            );
        }
        self.passes.push(summary);
    }

    fn discover_pass<S>(&mut self, source: &S) -> Option<u16>
    where
        S: CaptureSource + ?Sized,
    {
        self.results.clear();
        self.discovery.reset();
        let mut summary = PassSummary::default();

        for packet in source.packets() {
            summary.packets += 1;
            match self.discovery.scan(packet.opcode, &packet.payload) {
                ScanUpdate::Confirmed(_) => {
                    summary.matched += 1;
                    break;
                }
                ScanUpdate::Matched { .. } => summary.matched += 1,
                ScanUpdate::Skipped | ScanUpdate::NoMatch => {}
            }
        }

        if self.discovery.confirmed().is_none() {
            for candidate in self.discovery.candidates().iter().take(3) {
                debug!(
                    "Unconfirmed candidate {:#06x} with {} matches",
                    candidate.opcode, candidate.match_count
                );
            }
        }
        self.passes.push(summary);
        self.discovery.confirmed()
    }
}
