//! Known-good record fingerprints.
//!
//! Each signature is the SPA section header of a rank record that every
//! character receives: the slot count followed by the complete first slot.
//! These bytes have not drifted between protocol revisions.

use std::borrow::Cow;

/// A byte sequence that appears verbatim inside a genuine record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Ability and rank the bytes were taken from
    pub name: Cow<'static, str>,
    /// Bytes to match
    pub bytes: Cow<'static, [u8]>,
}

impl Signature {
    /// Creates a signature from static data
    pub const fn from_static(name: &'static str, bytes: &'static [u8]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            bytes: Cow::Borrowed(bytes),
        }
    }

    /// Creates a signature from owned data
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            bytes: Cow::Owned(bytes.into()),
        }
    }

    /// Number of bytes in the signature
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true for a zero-length signature
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset of the first occurrence in `haystack`
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        haystack
            .windows(self.bytes.len())
            .position(|window| window == &*self.bytes)
    }
}

/// Built-in signatures, spa_count = 1 followed by {spa, base1, base2, slot}
static WELL_KNOWN: [Signature; 8] = [
    Signature::from_static(
        "Battle Ready 1",
        &[1, 0, 0, 0, 107, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Battle Ready 2",
        &[1, 0, 0, 0, 107, 1, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Battle Ready 3",
        &[1, 0, 0, 0, 107, 1, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Battle Ready 4",
        &[1, 0, 0, 0, 107, 1, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Banestrike 1",
        &[16, 0, 0, 0, 83, 1, 0, 0, 40, 0, 0, 0, 36, 147, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Packrat 1",
        &[1, 0, 0, 0, 221, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Packrat 11",
        &[1, 0, 0, 0, 221, 0, 0, 0, 33, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
    Signature::from_static(
        "Innate Lung Capacity 1",
        &[1, 0, 0, 0, 246, 0, 0, 0, 110, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0],
    ),
];

/// Ordered, immutable set of signatures
#[derive(Debug, Clone)]
pub struct SignatureLibrary {
    signatures: Vec<Signature>,
}

impl Default for SignatureLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SignatureLibrary {
    /// The built-in well-known ability signatures
    pub fn builtin() -> Self {
        Self {
            signatures: WELL_KNOWN.to_vec(),
        }
    }

    /// A library of caller-supplied signatures; empty ones are dropped
    pub fn new(signatures: impl IntoIterator<Item = Signature>) -> Self {
        Self {
            signatures: signatures.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    /// Iterate the signatures in order
    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    /// Number of signatures
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns true if the library has no signatures
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
