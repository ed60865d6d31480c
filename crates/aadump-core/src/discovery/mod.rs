//! Opcode discovery by signature matching.
//!
//! ## Algorithm Overview
//!
//! 1. Skip payloads too small to hold a full record
//! 2. Slide every signature across the payload looking for an exact match
//! 3. Credit the packet's opcode once per signature found
//! 4. Confirm the first opcode whose tally reaches the corroboration threshold
//!
//! A single match can be coincidence, so one packet with one signature never
//! confirms an opcode on its own.

mod signature;

use std::collections::HashMap;
use tracing::{debug, info, trace};

pub use signature::{Signature, SignatureLibrary};

/// Payloads shorter than this cannot hold a full record
pub const MIN_PAYLOAD_LEN: usize = 100;

/// Signature matches needed before an opcode is trusted
pub const CORROBORATION_THRESHOLD: usize = 2;

/// Configuration for opcode discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Payloads shorter than this are skipped
    pub min_payload_len: usize,
    /// Matches required to confirm an opcode
    pub threshold: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_payload_len: MIN_PAYLOAD_LEN,
            threshold: CORROBORATION_THRESHOLD,
        }
    }
}

impl DiscoveryConfig {
    /// Creates a new discovery config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum payload length
    pub fn min_payload_len(mut self, len: usize) -> Self {
        self.min_payload_len = len;
        self
    }

    /// Sets the corroboration threshold (at least 1)
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }
}

/// Running tally for one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeCandidate {
    /// The opcode
    pub opcode: u16,
    /// Signature matches credited to it
    pub match_count: usize,
}

/// Effect of scanning one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanUpdate {
    /// Payload too short, or an opcode is already confirmed
    Skipped,
    /// No signature found
    NoMatch,
    /// Signatures found, threshold not yet reached
    Matched {
        /// The credited opcode
        opcode: u16,
        /// Its tally after this packet
        match_count: usize,
    },
    /// This packet pushed `opcode` over the threshold
    Confirmed(u16),
}

/// Accumulates signature matches across one discovery pass
#[derive(Debug, Clone)]
pub struct OpcodeDiscovery {
    library: SignatureLibrary,
    config: DiscoveryConfig,
    tally: HashMap<u16, usize>,
    confirmed: Option<u16>,
}

impl Default for OpcodeDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl OpcodeDiscovery {
    /// Creates an engine over the built-in signatures
    pub fn new() -> Self {
        Self::with_config(SignatureLibrary::builtin(), DiscoveryConfig::default())
    }

    /// Creates an engine with a custom library and configuration
    pub fn with_config(library: SignatureLibrary, config: DiscoveryConfig) -> Self {
        Self {
            library,
            config,
            tally: HashMap::new(),
            confirmed: None,
        }
    }

    /// Clears the tally and any confirmed opcode
    pub fn reset(&mut self) {
        self.tally.clear();
        self.confirmed = None;
    }

    /// The confirmed opcode, if any
    pub fn confirmed(&self) -> Option<u16> {
        self.confirmed
    }

    /// Current tallies, highest first
    pub fn candidates(&self) -> Vec<OpcodeCandidate> {
        let mut candidates: Vec<_> = self
            .tally
            .iter()
            .map(|(&opcode, &match_count)| OpcodeCandidate {
                opcode,
                match_count,
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then(a.opcode.cmp(&b.opcode))
        });
        candidates
    }

    /// Scans one packet payload
    pub fn scan(&mut self, opcode: u16, payload: &[u8]) -> ScanUpdate {
        if self.confirmed.is_some() || payload.len() < self.config.min_payload_len {
            return ScanUpdate::Skipped;
        }

        let mut matches = 0;
        for signature in self.library.iter() {
            if let Some(offset) = signature.find_in(payload) {
                trace!(
                    "Signature '{}' at offset {} of opcode {:#06x}",
                    signature.name,
                    offset,
                    opcode
                );
                matches += 1;
            }
        }
        if matches == 0 {
            return ScanUpdate::NoMatch;
        }

        let match_count = self.tally.entry(opcode).or_insert(0);
        *match_count += matches;
        let match_count = *match_count;

        if match_count >= self.config.threshold {
            info!(
                "Confirmed opcode {:#06x} after {} signature matches",
                opcode, match_count
            );
            self.confirmed = Some(opcode);
            ScanUpdate::Confirmed(opcode)
        } else {
            debug!(
                "Opcode {:#06x} has {} of {} signature matches",
                opcode, match_count, self.config.threshold
            );
            ScanUpdate::Matched {
                opcode,
                match_count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn battle_ready_1() -> Vec<u8> {
        SignatureLibrary::builtin().iter().next().unwrap().bytes.to_vec()
    }

    fn padded(signature: &[u8], at: usize) -> Vec<u8> {
        let mut payload = vec![0xEE; 120];
        payload[at..at + signature.len()].copy_from_slice(signature);
        payload
    }

    #[test]
    fn test_short_payload_skipped() {
        let mut discovery = OpcodeDiscovery::new();
        let mut payload = battle_ready_1();
        payload.resize(99, 0);
        assert_eq!(discovery.scan(7, &payload), ScanUpdate::Skipped);
        assert!(discovery.candidates().is_empty());
    }

    #[test]
    fn test_single_match_not_trusted() {
        let mut discovery = OpcodeDiscovery::new();
        assert_eq!(
            discovery.scan(7, &padded(&battle_ready_1(), 0)),
            ScanUpdate::Matched {
                opcode: 7,
                match_count: 1
            }
        );
        assert_eq!(discovery.confirmed(), None);
    }

    #[test]
    fn test_two_packets_confirm() {
        let mut discovery = OpcodeDiscovery::new();
        discovery.scan(7, &padded(&battle_ready_1(), 3));
        assert_eq!(
            discovery.scan(7, &padded(&battle_ready_1(), 80)),
            ScanUpdate::Confirmed(7)
        );
        assert_eq!(discovery.confirmed(), Some(7));
    }

    #[test]
    fn test_two_signatures_in_one_packet_confirm() {
        let library = SignatureLibrary::builtin();
        let sigs: Vec<_> = library.iter().collect();
        let mut payload = padded(&sigs[0].bytes, 0);
        payload[50..70].copy_from_slice(&sigs[5].bytes);

        let mut discovery = OpcodeDiscovery::new();
        assert_eq!(discovery.scan(0x9999, &payload), ScanUpdate::Confirmed(0x9999));
    }

    #[test]
    fn test_first_confirmed_wins() {
        let mut discovery = OpcodeDiscovery::with_config(
            SignatureLibrary::builtin(),
            DiscoveryConfig::new().threshold(1),
        );
        let payload = padded(&battle_ready_1(), 10);
        assert_eq!(discovery.scan(1, &payload), ScanUpdate::Confirmed(1));
        assert_eq!(discovery.scan(2, &payload), ScanUpdate::Skipped);
        assert_eq!(discovery.confirmed(), Some(1));
    }

    #[test]
    fn test_corroboration_prefers_repeated_opcode() {
        let mut discovery = OpcodeDiscovery::new();
        let payload = padded(&battle_ready_1(), 0);
        discovery.scan(0xAAAA, &payload);
        discovery.scan(0xBBBB, &payload);
        discovery.scan(0xBBBB, &payload);
        assert_eq!(discovery.confirmed(), Some(0xBBBB));
        assert_eq!(
            discovery.candidates()[0],
            OpcodeCandidate {
                opcode: 0xBBBB,
                match_count: 2
            }
        );
    }

    #[test]
    fn test_reset() {
        let mut discovery = OpcodeDiscovery::new();
        let payload = padded(&battle_ready_1(), 0);
        discovery.scan(1, &payload);
        discovery.scan(1, &payload);
        discovery.reset();
        assert_eq!(discovery.confirmed(), None);
        assert!(discovery.candidates().is_empty());
    }

    proptest! {
        #[test]
        fn prop_short_payloads_never_match(
            opcode in any::<u16>(),
            data in prop::collection::vec(any::<u8>(), 0..MIN_PAYLOAD_LEN),
            signature_at in 0usize..80,
        ) {
            let mut discovery = OpcodeDiscovery::new();
            let mut payload = data;
            // plant a real signature when it fits, it must still be ignored
            let sig = battle_ready_1();
            if signature_at + sig.len() <= payload.len() {
                payload[signature_at..signature_at + sig.len()].copy_from_slice(&sig);
            }
            prop_assert_eq!(discovery.scan(opcode, &payload), ScanUpdate::Skipped);
            prop_assert!(discovery.candidates().is_empty());
        }
    }
}
