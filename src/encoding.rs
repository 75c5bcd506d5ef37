//! The encoding registry.
//!
//! Encodings are statics and are compared by address: two `&Encoding` are the
//! same encoding iff they point at the same registry entry.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;

use crate::error::{Result, RopeError};
use crate::mbclen::CharLen;

#[derive(Debug, Clone, Copy)]
enum Codec {
    /// Bytes 0x00..0x80 only.
    Ascii,
    /// Every byte is a character.
    Byte,
    Utf8,
    Utf16 { big_endian: bool },
}

pub struct Encoding {
    index: usize,
    name: &'static str,
    aliases: &'static [&'static str],
    min_len: usize,
    max_len: usize,
    ascii_compatible: bool,
    codec: Codec,
}

pub static US_ASCII: Encoding = Encoding {
    index: 0,
    name: "US-ASCII",
    aliases: &["ASCII", "ANSI_X3.4-1968", "646"],
    min_len: 1,
    max_len: 1,
    ascii_compatible: true,
    codec: Codec::Ascii,
};

pub static ASCII_8BIT: Encoding = Encoding {
    index: 1,
    name: "ASCII-8BIT",
    aliases: &["BINARY"],
    min_len: 1,
    max_len: 1,
    ascii_compatible: true,
    codec: Codec::Byte,
};

pub static ISO_8859_1: Encoding = Encoding {
    index: 2,
    name: "ISO-8859-1",
    aliases: &["ISO8859-1"],
    min_len: 1,
    max_len: 1,
    ascii_compatible: true,
    codec: Codec::Byte,
};

pub static UTF_8: Encoding = Encoding {
    index: 3,
    name: "UTF-8",
    aliases: &["CP65001"],
    min_len: 1,
    max_len: 4,
    ascii_compatible: true,
    codec: Codec::Utf8,
};

pub static UTF_16LE: Encoding = Encoding {
    index: 4,
    name: "UTF-16LE",
    aliases: &[],
    min_len: 2,
    max_len: 4,
    ascii_compatible: false,
    codec: Codec::Utf16 { big_endian: false },
};

pub static UTF_16BE: Encoding = Encoding {
    index: 5,
    name: "UTF-16BE",
    aliases: &["UCS-2BE"],
    min_len: 2,
    max_len: 4,
    ascii_compatible: false,
    codec: Codec::Utf16 { big_endian: true },
};

static REGISTRY: [&Encoding; 6] = [&US_ASCII, &ASCII_8BIT, &ISO_8859_1, &UTF_8, &UTF_16LE, &UTF_16BE];

pub(crate) const NUM_ENCODINGS: usize = REGISTRY.len();

#[inline]
fn is_utf8_continuation(b: u8) -> bool { b & 0xC0 == 0x80 }

impl Encoding {
    /// Look up an encoding by name or alias, ignoring ASCII case.
    pub fn find(name: &str) -> Result<&'static Encoding> {
        REGISTRY.iter()
            .copied()
            .find(|e| e.name.eq_ignore_ascii_case(name)
                || e.aliases.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .ok_or_else(|| RopeError::UnknownEncoding { name: name.to_string() })
    }

    pub fn all() -> &'static [&'static Encoding] { &REGISTRY }

    pub fn name(&self) -> &'static str { self.name }
    pub fn aliases(&self) -> &'static [&'static str] { self.aliases }
    pub fn min_len(&self) -> usize { self.min_len }
    pub fn max_len(&self) -> usize { self.max_len }
    pub fn is_ascii_compatible(&self) -> bool { self.ascii_compatible }
    pub fn is_single_byte(&self) -> bool { self.max_len == 1 }
    pub fn is_utf8(&self) -> bool { matches!(self.codec, Codec::Utf8) }

    pub(crate) fn index(&self) -> usize { self.index }

    /// False only for US-ASCII, where bytes 0x80 and up aren't characters.
    pub(crate) fn accepts_high_bytes(&self) -> bool { !matches!(self.codec, Codec::Ascii) }

    /// Measure the character starting at `p`, looking no further than `end`.
    ///
    /// `p <= end <= bytes.len()` must hold.
    pub fn char_length(&self, bytes: &[u8], p: usize, end: usize) -> CharLen {
        debug_assert!(p <= end && end <= bytes.len());
        if p >= end {
            return CharLen::need_more(self.min_len);
        }

        match self.codec {
            Codec::Byte => CharLen::found(1),
            Codec::Ascii => {
                if bytes[p] < 0x80 { CharLen::found(1) } else { CharLen::INVALID }
            }
            Codec::Utf8 => utf8_char_length(bytes, p, end),
            Codec::Utf16 { big_endian } => utf16_char_length(bytes, p, end, big_endian),
        }
    }

    /// Step back from `p` to the first byte of the character containing it.
    ///
    /// Never returns an offset below `start`. When no character head can be
    /// found at or after `start`, `p` itself is returned.
    pub fn left_adjust_char_head(&self, bytes: &[u8], start: usize, p: usize, end: usize) -> usize {
        if p <= start || p >= end {
            return p;
        }

        match self.codec {
            Codec::Ascii | Codec::Byte => p,
            Codec::Utf8 => {
                let mut q = p;
                while q > start && is_utf8_continuation(bytes[q]) { q -= 1; }
                if is_utf8_continuation(bytes[q]) { p } else { q }
            }
            Codec::Utf16 { big_endian } => {
                let q = p - (p - start) % 2;
                if q + 2 > end || q < start + 2 {
                    return q;
                }
                let unit = utf16_unit(bytes, q, big_endian);
                let prev = utf16_unit(bytes, q - 2, big_endian);
                if (0xDC00..=0xDFFF).contains(&unit) && (0xD800..=0xDBFF).contains(&prev) {
                    q - 2
                } else {
                    q
                }
            }
        }
    }

    /// Decode the complete character at `p` to its code point.
    pub fn decode(&self, bytes: &[u8], p: usize, end: usize) -> Option<u32> {
        let len = self.char_length(bytes, p, end).found_len()?;
        let c = &bytes[p..p + len];

        Some(match self.codec {
            Codec::Ascii | Codec::Byte => c[0] as u32,
            Codec::Utf8 => match len {
                1 => c[0] as u32,
                2 => ((c[0] as u32 & 0x1F) << 6) | (c[1] as u32 & 0x3F),
                3 => ((c[0] as u32 & 0x0F) << 12) | ((c[1] as u32 & 0x3F) << 6) | (c[2] as u32 & 0x3F),
                _ => ((c[0] as u32 & 0x07) << 18) | ((c[1] as u32 & 0x3F) << 12)
                    | ((c[2] as u32 & 0x3F) << 6) | (c[3] as u32 & 0x3F),
            },
            Codec::Utf16 { big_endian } => {
                let hi = utf16_unit(bytes, p, big_endian) as u32;
                if len == 2 {
                    hi
                } else {
                    let lo = utf16_unit(bytes, p + 2, big_endian) as u32;
                    0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
                }
            }
        })
    }
}

fn utf8_char_length(bytes: &[u8], p: usize, end: usize) -> CharLen {
    // Second-byte ranges exclude overlongs, surrogates and anything past U+10FFFF.
    let (len, lo, hi) = match bytes[p] {
        0x00..=0x7F => return CharLen::found(1),
        0xC2..=0xDF => (2, 0x80, 0xBF),
        0xE0 => (3, 0xA0, 0xBF),
        0xE1..=0xEC | 0xEE..=0xEF => (3, 0x80, 0xBF),
        0xED => (3, 0x80, 0x9F),
        0xF0 => (4, 0x90, 0xBF),
        0xF1..=0xF3 => (4, 0x80, 0xBF),
        0xF4 => (4, 0x80, 0x8F),
        _ => return CharLen::INVALID,
    };

    let avail = end - p;
    for i in 1..len {
        if i >= avail {
            return CharLen::need_more(len - avail);
        }
        let b = bytes[p + i];
        let (l, h) = if i == 1 { (lo, hi) } else { (0x80, 0xBF) };
        if b < l || b > h {
            return CharLen::INVALID;
        }
    }
    CharLen::found(len)
}

#[inline]
fn utf16_unit(bytes: &[u8], p: usize, big_endian: bool) -> u16 {
    let pair = [bytes[p], bytes[p + 1]];
    if big_endian { u16::from_be_bytes(pair) } else { u16::from_le_bytes(pair) }
}

fn utf16_char_length(bytes: &[u8], p: usize, end: usize, big_endian: bool) -> CharLen {
    let avail = end - p;
    if avail < 2 {
        return CharLen::need_more(2 - avail);
    }

    match utf16_unit(bytes, p, big_endian) {
        0xD800..=0xDBFF => {
            if avail < 4 {
                return CharLen::need_more(4 - avail);
            }
            if (0xDC00..=0xDFFF).contains(&utf16_unit(bytes, p + 2, big_endian)) {
                CharLen::found(4)
            } else {
                CharLen::INVALID
            }
        }
        0xDC00..=0xDFFF => CharLen::INVALID,
        _ => CharLen::found(2),
    }
}

impl PartialEq for Encoding {
    fn eq(&self, other: &Self) -> bool { ptr::eq(self, other) }
}

impl Eq for Encoding {}

impl Hash for Encoding {
    fn hash<H: Hasher>(&self, state: &mut H) { self.index.hash(state) }
}

impl fmt::Debug for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encoding({})", self.name)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
