use crate::encoding::Encoding;

/// How a byte sequence classifies under an encoding.
///
/// `Unknown` is only ever a cache state. It is never handed out by the public
/// accessors on a rope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CodeRange {
    Unknown = 0,
    SevenBit = 1,
    Valid = 2,
    Broken = 3,
}

impl CodeRange {
    /// Combine the code ranges of two adjacent pieces of the same encoding.
    pub fn join(self, other: CodeRange) -> CodeRange {
        use CodeRange::*;
        match (self, other) {
            (Unknown, _) | (_, Unknown) => Unknown,
            (Broken, _) | (_, Broken) => Broken,
            (SevenBit, SevenBit) => SevenBit,
            _ => Valid,
        }
    }

    pub fn is_known(self) -> bool { self != CodeRange::Unknown }

    /// True when every character ends cleanly, so byte offsets at piece
    /// boundaries are character boundaries.
    pub fn is_clean(self) -> bool {
        matches!(self, CodeRange::SevenBit | CodeRange::Valid)
    }

    /// A cached code range is consistent with a fresh classification if it
    /// is unknown or identical.
    pub fn refines(self, cached: CodeRange) -> bool {
        cached == CodeRange::Unknown || cached == self
    }

    #[inline]
    pub(crate) fn from_u8(v: u8) -> CodeRange {
        match v {
            1 => CodeRange::SevenBit,
            2 => CodeRange::Valid,
            3 => CodeRange::Broken,
            _ => CodeRange::Unknown,
        }
    }
}

/// Classify `bytes[start..end]` under `enc`, returning the code range and the
/// character length.
///
/// Bytes that can't start a character are counted as one character each, so
/// broken input still has a well defined length.
pub fn classify(enc: &Encoding, bytes: &[u8], start: usize, end: usize) -> (CodeRange, usize) {
    let window = &bytes[start..end];

    if enc.is_ascii_compatible() && window.is_ascii() {
        return (CodeRange::SevenBit, window.len());
    }

    if enc.is_single_byte() {
        // One byte, one character. Only US-ASCII rejects any of them.
        let cr = if enc.accepts_high_bytes() { CodeRange::Valid } else { CodeRange::Broken };
        return (cr, window.len());
    }

    if enc.is_utf8() {
        if let Ok(s) = std::str::from_utf8(window) {
            return (CodeRange::Valid, str_indices::chars::count(s));
        }
    }

    let mut p = start;
    let mut chars = 0;
    let mut broken = false;
    while p < end {
        if enc.is_ascii_compatible() && bytes[p] < 0x80 {
            p += 1;
        } else {
            match enc.char_length(bytes, p, end).found_len() {
                Some(n) => p += n,
                None => {
                    broken = true;
                    p += 1;
                }
            }
        }
        chars += 1;
    }

    (if broken { CodeRange::Broken } else { CodeRange::Valid }, chars)
}
