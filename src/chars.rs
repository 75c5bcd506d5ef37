//! Character measuring and decoding helpers.
//!
//! These work on a byte window `bytes[p..end]` plus whatever is already known
//! about the window's code range, which lets 7-bit text skip the encoding
//! entirely.

use crate::code_range::CodeRange;
use crate::encoding::Encoding;
use crate::error::{Result, RopeError};
use crate::mbclen::CharLen;
use crate::rope::Rope;

/// Measure the character at `p`. Text known to be 7-bit is one byte per
/// character.
pub fn character_length_at(enc: &Encoding, cr: CodeRange, bytes: &[u8], p: usize, end: usize) -> CharLen {
    if cr == CodeRange::SevenBit && p < end {
        return CharLen::found(1);
    }
    enc.char_length(bytes, p, end)
}

/// Same as [`character_length_at`]. Reports need-more and invalid as such.
pub fn precise_mbclen(enc: &Encoding, cr: CodeRange, bytes: &[u8], p: usize, end: usize) -> CharLen {
    character_length_at(enc, cr, bytes, p, end)
}

/// Recovering variant. Where no complete character is found, steps over as
/// many bytes as the shortest character would take, clipped to the window.
pub fn mbclen(enc: &Encoding, cr: CodeRange, bytes: &[u8], p: usize, end: usize) -> usize {
    match character_length_at(enc, cr, bytes, p, end).found_len() {
        Some(n) => n,
        None => enc.min_len().min(end.saturating_sub(p)),
    }
}

/// Decode the character at `p`.
pub fn codepoint_at(enc: &Encoding, cr: CodeRange, bytes: &[u8], p: usize, end: usize) -> Result<u32> {
    let r = character_length_at(enc, cr, bytes, p, end);
    if let Some(needed) = r.need_more_len() {
        return Err(RopeError::IncompleteCharacter { encoding: enc.name(), offset: p, needed });
    }
    if !r.is_found() {
        return Err(RopeError::InvalidByteSequence { encoding: enc.name(), offset: p });
    }

    if cr == CodeRange::SevenBit {
        return Ok(bytes[p] as u32);
    }
    enc.decode(bytes, p, end)
        .ok_or(RopeError::InvalidByteSequence { encoding: enc.name(), offset: p })
}

/// Byte length and code point of the first character of `rope`, read as
/// `enc`.
pub fn codepoint_len(rope: &Rope, enc: &'static Encoding) -> Result<(usize, u32)> {
    let cr = if std::ptr::eq(rope.encoding(), enc) { rope.code_range() } else { CodeRange::Unknown };
    let bytes = rope.bytes();
    let end = bytes.len();

    let len = character_length_at(enc, cr, bytes, 0, end).found_len()
        .ok_or(RopeError::InvalidByteSequence { encoding: enc.name(), offset: 0 })?;
    Ok((len, codepoint_at(enc, cr, bytes, 0, end)?))
}

/// The first byte of the character containing `p`, never before `start`.
pub fn left_char_head(enc: &Encoding, bytes: &[u8], start: usize, p: usize, end: usize) -> usize {
    enc.left_adjust_char_head(bytes, start, p, end)
}

/// Length of the contents as a C string: the offset of the first zero byte,
/// or the byte length if there is none.
pub fn byte_pointer_size(rope: &Rope) -> usize {
    let mut offset = 0;
    for chunk in rope.chunks() {
        if let Some(i) = chunk.iter().position(|&b| b == 0) {
            return offset + i;
        }
        offset += chunk.len();
    }
    offset
}
