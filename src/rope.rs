// A rope here is an immutable, structurally shared byte sequence which knows
// its encoding. Nodes are one of five variants (leaf, concat, substring,
// repeat, native) behind a single Arc'd struct. The shared fields live on the
// struct and each operation dispatches once on the variant.
//
// Nodes never change after construction except for their caches (character
// length, code range, hash, materialized bytes). Every cache starts unknown and
// is filled by whoever needs it first. The computations are pure so racing
// fillers agree; the first publish wins.

use std::cmp::{max, min};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};

use crate::code_range::{classify, CodeRange};
use crate::config;
use crate::encoding::{Encoding, ASCII_8BIT, NUM_ENCODINGS, UTF_8};
use crate::error::{Result, RopeError};
use crate::hash::RopeHasher;
use crate::iter::Chunks;
use crate::native::{NativeBuffer, NativeRope};

const UNKNOWN_LEN: usize = usize::MAX;

/// Which variant a rope node is. Purely informational: two ropes with the same
/// encoding and bytes are equal regardless of shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RopeKind {
    Leaf,
    Concat,
    Substring,
    Repeat,
    Native,
}

pub(crate) enum Variant {
    Leaf,
    Concat { left: Rope, right: Rope },
    Substring { child: Rope, offset: usize },
    Repeat { child: Rope, times: usize },
    Native(Arc<NativeBuffer>),
}

pub(crate) struct Node {
    pub(crate) encoding: &'static Encoding,
    pub(crate) len: usize,
    pub(crate) depth: usize,

    // Caches.
    char_len: AtomicUsize,
    code_range: AtomicU8,
    hash: AtomicU64, // 0 means not computed yet.
    raw: OnceLock<Arc<[u8]>>,

    pub(crate) variant: Variant,
}

impl Node {
    pub(crate) fn new(
        encoding: &'static Encoding,
        len: usize,
        depth: usize,
        code_range: CodeRange,
        char_len: Option<usize>,
        raw: Option<Arc<[u8]>>,
        variant: Variant,
    ) -> Node {
        Node {
            encoding,
            len,
            depth,
            char_len: AtomicUsize::new(char_len.unwrap_or(UNKNOWN_LEN)),
            code_range: AtomicU8::new(code_range as u8),
            hash: AtomicU64::new(0),
            raw: raw.map_or_else(OnceLock::new, OnceLock::from),
            variant,
        }
    }
}

/// A handle to an immutable rope node. Cloning is cheap.
#[derive(Clone)]
pub struct Rope(pub(crate) Arc<Node>);

#[allow(clippy::declare_interior_mutable_const)]
const NO_ROPE: OnceLock<Rope> = OnceLock::new();
static EMPTY: [OnceLock<Rope>; NUM_ENCODINGS] = [NO_ROPE; NUM_ENCODINGS];
static NUL: OnceLock<Rope> = OnceLock::new();

#[inline]
fn same_encoding(a: &Rope, enc: &Encoding) -> bool {
    ptr::eq(a.0.encoding, enc)
}

impl Rope {
    pub(crate) fn from_node(node: Node) -> Rope {
        Rope(Arc::new(node))
    }

    /// Build a leaf from `bytes`. The code range and character length are
    /// computed straight away.
    pub fn leaf<B: Into<Arc<[u8]>>>(bytes: B, encoding: &'static Encoding) -> Rope {
        Rope::leaf_with(bytes.into(), encoding, CodeRange::Unknown, None)
    }

    /// Build a leaf when the caller may already know the code range and
    /// character length. Anything unknown is computed eagerly.
    pub(crate) fn leaf_with(bytes: Arc<[u8]>, encoding: &'static Encoding,
                            code_range: CodeRange, char_len: Option<usize>) -> Rope {
        let (code_range, char_len) = match (code_range, char_len) {
            (cr, Some(n)) if cr.is_known() => (cr, n),
            _ => classify(encoding, &bytes, 0, bytes.len()),
        };
        Rope::from_node(Node::new(encoding, bytes.len(), 1, code_range, Some(char_len),
                                  Some(bytes), Variant::Leaf))
    }

    /// The canonical empty rope for `encoding`.
    pub fn empty(encoding: &'static Encoding) -> Rope {
        EMPTY[encoding.index()]
            .get_or_init(|| Rope::leaf(Vec::new(), encoding))
            .clone()
    }

    /// A single zero byte. Used to pad strings that grow.
    pub(crate) fn nul() -> Rope {
        NUL.get_or_init(|| Rope::leaf(&[0u8][..], &ASCII_8BIT)).clone()
    }

    pub fn encoding(&self) -> &'static Encoding { self.0.encoding }

    pub fn len_bytes(&self) -> usize { self.0.len }

    pub fn is_empty(&self) -> bool { self.0.len == 0 }

    pub fn depth(&self) -> usize { self.0.depth }

    pub fn kind(&self) -> RopeKind {
        match self.0.variant {
            Variant::Leaf => RopeKind::Leaf,
            Variant::Concat { .. } => RopeKind::Concat,
            Variant::Substring { .. } => RopeKind::Substring,
            Variant::Repeat { .. } => RopeKind::Repeat,
            Variant::Native(_) => RopeKind::Native,
        }
    }

    pub fn is_native(&self) -> bool { matches!(self.0.variant, Variant::Native(_)) }

    pub fn as_native(&self) -> Option<NativeRope> {
        match &self.0.variant {
            Variant::Native(buffer) => Some(NativeRope::from_parts(self.clone(), buffer.clone())),
            _ => None,
        }
    }

    /// True if `bytes()` won't have to walk the structure.
    pub fn is_materialized(&self) -> bool {
        self.raw_bytes().is_some()
    }

    pub(crate) fn raw_bytes(&self) -> Option<&[u8]> {
        match &self.0.variant {
            Variant::Native(_) => Some(self.materialize()),
            _ => self.0.raw.get().map(|b| &b[..]),
        }
    }

    fn materialize(&self) -> &Arc<[u8]> {
        self.0.raw.get_or_init(|| match &self.0.variant {
            // Native nodes read their buffer once and stick with that.
            Variant::Native(buf) => buf.snapshot(self.0.len),
            _ => {
                trace!(len = self.0.len, depth = self.0.depth, kind = ?self.kind(), "materializing rope");
                self.to_vec().into()
            }
        })
    }

    /// The contents as one contiguous slice. The first call on a composite
    /// rope flattens it and the result is kept on the node.
    pub fn bytes(&self) -> &[u8] {
        self.materialize()
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        self.materialize().clone()
    }

    /// Copy the contents out without caching a flattened copy on the node.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len);
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Iterate over the contents in order as a series of slices.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks::new(self, 0, self.0.len)
    }

    pub(crate) fn chunks_in(&self, start: usize, end: usize) -> Chunks<'_> {
        debug_assert!(start <= end && end <= self.0.len);
        Chunks::new(self, start, end)
    }

    pub fn get_byte(&self, index: usize) -> Result<u8> {
        if index >= self.0.len {
            return Err(RopeError::IndexOutOfBounds { index, limit: self.0.len });
        }
        Ok(self.byte_at(index))
    }

    pub(crate) fn byte_at(&self, mut index: usize) -> u8 {
        let mut rope = self;
        loop {
            if let Some(raw) = rope.raw_bytes() {
                return raw[index];
            }
            match &rope.0.variant {
                Variant::Concat { left, right } => {
                    if index < left.0.len {
                        rope = left;
                    } else {
                        index -= left.0.len;
                        rope = right;
                    }
                }
                Variant::Substring { child, offset } => {
                    index += offset;
                    rope = child;
                }
                Variant::Repeat { child, .. } => {
                    index %= child.0.len;
                    rope = child;
                }
                Variant::Leaf | Variant::Native(_) => unreachable!("leaves are always materialized"),
            }
        }
    }

    /// The code range if it has been worked out already. Unlike
    /// [`Rope::code_range`] this never scans.
    pub fn cached_code_range(&self) -> CodeRange {
        CodeRange::from_u8(self.0.code_range.load(Ordering::Acquire))
    }

    pub fn cached_char_len(&self) -> Option<usize> {
        match self.0.char_len.load(Ordering::Acquire) {
            UNKNOWN_LEN => None,
            n => Some(n),
        }
    }

    fn publish_code_range(&self, cr: CodeRange) -> CodeRange {
        match self.0.code_range.compare_exchange(CodeRange::Unknown as u8, cr as u8,
                                                 Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => cr,
            Err(existing) => CodeRange::from_u8(existing),
        }
    }

    fn publish_char_len(&self, n: usize) -> usize {
        match self.0.char_len.compare_exchange(UNKNOWN_LEN, n, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => n,
            Err(existing) => existing,
        }
    }

    fn scan(&self) -> (CodeRange, usize) {
        let (cr, n) = classify(self.0.encoding, self.bytes(), 0, self.0.len);
        (self.publish_code_range(cr), self.publish_char_len(n))
    }

    pub fn code_range(&self) -> CodeRange {
        let cached = self.cached_code_range();
        if cached.is_known() {
            return cached;
        }

        let enc = self.0.encoding;
        let cr = match &self.0.variant {
            Variant::Concat { left, right } if same_encoding(left, enc) && same_encoding(right, enc) => {
                let joined = left.code_range().join(right.code_range());
                if !joined.is_clean() {
                    // A broken piece can be healed by its neighbour, so only
                    // a fresh scan is trustworthy.
                    return self.scan().0;
                }
                joined
            }
            Variant::Repeat { child, .. } if same_encoding(child, enc) && child.code_range().is_clean() => {
                child.code_range()
            }
            _ => return self.scan().0,
        };
        self.publish_code_range(cr)
    }

    pub fn len_chars(&self) -> usize {
        if let Some(n) = self.cached_char_len() {
            return n;
        }

        let enc = self.0.encoding;
        let n = if enc.is_single_byte() {
            self.0.len
        } else {
            match &self.0.variant {
                Variant::Concat { left, right }
                    if same_encoding(left, enc) && same_encoding(right, enc)
                        && left.code_range().is_clean() && right.code_range().is_clean() => {
                    left.len_chars() + right.len_chars()
                }
                Variant::Repeat { child, times }
                    if same_encoding(child, enc) && child.code_range().is_clean() => {
                    child.len_chars() * times
                }
                _ => return self.scan().1,
            }
        };
        self.publish_char_len(n)
    }

    /// True when every character is a single byte, so character and byte
    /// offsets coincide.
    pub fn single_byte_optimizable(&self) -> bool {
        self.0.encoding.is_single_byte() || self.code_range() == CodeRange::SevenBit
    }

    pub fn hash_code(&self) -> u64 {
        let cached = self.0.hash.load(Ordering::Acquire);
        if cached != 0 {
            return cached;
        }

        let mut hasher = RopeHasher::new();
        for chunk in self.chunks() {
            hasher.write(chunk);
        }
        let h = hasher.finish();
        match self.0.hash.compare_exchange(0, h, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => h,
            Err(existing) => existing,
        }
    }

    /// Byte offset of the start of character `char_idx`. Passing the
    /// character length gives the byte length.
    pub fn char_to_byte(&self, char_idx: usize) -> Result<usize> {
        let len = self.0.len;
        if self.single_byte_optimizable() {
            return if char_idx <= len {
                Ok(char_idx)
            } else {
                Err(RopeError::IndexOutOfBounds { index: char_idx, limit: len })
            };
        }

        let char_len = self.len_chars();
        if char_idx > char_len {
            return Err(RopeError::IndexOutOfBounds { index: char_idx, limit: char_len });
        }

        let enc = self.0.encoding;
        let bytes = self.bytes();
        if enc.is_utf8() && self.code_range() == CodeRange::Valid {
            // SAFETY: a valid code range under UTF-8 means well formed UTF-8.
            let s = unsafe { std::str::from_utf8_unchecked(bytes) };
            return Ok(str_indices::chars::to_byte_idx(s, char_idx));
        }

        let mut p = 0;
        for _ in 0..char_idx {
            p += enc.char_length(bytes, p, len).found_len().unwrap_or(1);
        }
        Ok(p)
    }

    /// Index of the character containing byte `byte_idx`.
    pub fn byte_to_char(&self, byte_idx: usize) -> Result<usize> {
        let len = self.0.len;
        if byte_idx > len {
            return Err(RopeError::IndexOutOfBounds { index: byte_idx, limit: len });
        }
        if self.single_byte_optimizable() {
            return Ok(byte_idx);
        }

        let enc = self.0.encoding;
        let bytes = self.bytes();
        if enc.is_utf8() && self.code_range() == CodeRange::Valid {
            // SAFETY: as above.
            let s = unsafe { std::str::from_utf8_unchecked(bytes) };
            return Ok(str_indices::chars::from_byte_idx(s, byte_idx));
        }

        // Step character by character the same way char_to_byte does, so a
        // stray byte in broken input counts as its own character.
        let mut p = 0;
        let mut chars = 0;
        while p < len {
            let step = enc.char_length(bytes, p, len).found_len().unwrap_or(1);
            if p + step > byte_idx {
                break;
            }
            p += step;
            chars += 1;
        }
        Ok(chars)
    }

    /// The same bytes tagged with another encoding. Leaves share their storage.
    pub fn with_encoding(&self, encoding: &'static Encoding) -> Rope {
        if same_encoding(self, encoding) {
            return self.managed();
        }

        let (cr, char_len) = if self.cached_code_range() == CodeRange::SevenBit && encoding.is_ascii_compatible() {
            (CodeRange::SevenBit, Some(self.0.len))
        } else {
            (CodeRange::Unknown, None)
        };
        Rope::leaf_with(self.shared_bytes(), encoding, cr, char_len)
    }

    /// A rope that doesn't share a native buffer. Nothing built from a native
    /// rope may point into its buffer, not even a plain handle to the same
    /// node.
    pub(crate) fn managed(&self) -> Rope {
        match &self.0.variant {
            Variant::Native(_) => Rope::leaf_with(self.shared_bytes(), self.0.encoding,
                                                  self.cached_code_range(), self.cached_char_len()),
            _ => self.clone(),
        }
    }

    pub fn concat(left: &Rope, right: &Rope, encoding: &'static Encoding) -> Result<Rope> {
        if left.is_empty() {
            return Ok(right.managed().with_encoding(encoding));
        }
        if right.is_empty() {
            return Ok(left.managed().with_encoding(encoding));
        }

        let cfg = config::get();
        let len = left.0.len.checked_add(right.0.len)
            .filter(|&n| n <= cfg.max_byte_length)
            .ok_or(RopeError::Overflow { lhs: left.0.len, rhs: right.0.len, limit: cfg.max_byte_length })?;

        let (cr, char_len) = concat_metrics(left, right, encoding, len);

        if len < cfg.flatten_threshold && left.is_materialized() && right.is_materialized() {
            let mut bytes = Vec::with_capacity(len);
            bytes.extend_from_slice(left.bytes());
            bytes.extend_from_slice(right.bytes());
            return Ok(Rope::leaf_with(bytes.into(), encoding, cr, char_len));
        }

        let depth = 1 + max(left.0.depth, right.0.depth);
        if depth > cfg.max_depth {
            debug!(depth, len, "concatenation too deep, flattening");
            let mut bytes = Vec::with_capacity(len);
            bytes.extend(left.chunks().chain(right.chunks()).flatten());
            return Ok(Rope::leaf_with(bytes.into(), encoding, cr, char_len));
        }

        Ok(Rope::from_node(Node::new(encoding, len, depth, cr, char_len, None, Variant::Concat {
            left: left.managed(),
            right: right.managed(),
        })))
    }

    pub fn substring(&self, offset: usize, length: usize) -> Result<Rope> {
        let len = self.0.len;
        if offset.checked_add(length).map_or(true, |end| end > len) {
            return Err(RopeError::OutOfBounds { offset, length, byte_length: len });
        }
        if length == 0 {
            return Ok(Rope::empty(self.0.encoding));
        }
        if offset == 0 && length == len {
            return Ok(self.managed());
        }

        let enc = self.0.encoding;
        match &self.0.variant {
            Variant::Substring { child, offset: inner } => {
                return child.substring(inner + offset, length);
            }
            Variant::Concat { left, right } => {
                let split = left.0.len;
                if offset + length <= split {
                    return Ok(left.substring(offset, length)?.with_encoding(enc));
                }
                if offset >= split {
                    return Ok(right.substring(offset - split, length)?.with_encoding(enc));
                }
            }
            Variant::Repeat { child, .. } => {
                let start = offset % child.0.len;
                if start + length <= child.0.len {
                    return child.substring(start, length);
                }
            }
            Variant::Leaf | Variant::Native(_) => {}
        }

        let (cr, char_len) = if self.cached_code_range() == CodeRange::SevenBit {
            (CodeRange::SevenBit, Some(length))
        } else if enc.is_single_byte() {
            (CodeRange::Unknown, Some(length))
        } else {
            (CodeRange::Unknown, None)
        };

        if length < config::get().substring_copy_threshold || self.is_native() {
            let bytes: Vec<u8> = self.chunks_in(offset, offset + length).flatten().copied().collect();
            return Ok(Rope::leaf_with(bytes.into(), enc, cr, char_len));
        }

        Ok(Rope::from_node(Node::new(enc, length, self.0.depth + 1, cr, char_len, None,
                                     Variant::Substring { child: self.clone(), offset })))
    }

    pub fn repeat(&self, times: usize) -> Result<Rope> {
        if times == 0 || self.is_empty() {
            return Ok(Rope::empty(self.0.encoding));
        }
        if times == 1 {
            return Ok(self.managed());
        }

        let cfg = config::get();
        let len = self.0.len.checked_mul(times)
            .filter(|&n| n <= cfg.max_byte_length)
            .ok_or(RopeError::Overflow { lhs: self.0.len, rhs: times, limit: cfg.max_byte_length })?;

        if let Variant::Repeat { child, times: inner } = &self.0.variant {
            // len fits, so inner * times does too.
            return child.repeat(inner * times);
        }

        let enc = self.0.encoding;
        let (cr, char_len) = match self.cached_code_range() {
            CodeRange::SevenBit => (CodeRange::SevenBit, Some(len)),
            CodeRange::Valid => (CodeRange::Valid, self.cached_char_len().map(|n| n * times)),
            _ if enc.is_single_byte() => (CodeRange::Unknown, Some(len)),
            _ => (CodeRange::Unknown, None),
        };

        if len < cfg.flatten_threshold && self.is_materialized() {
            return Ok(Rope::leaf_with(self.bytes().repeat(times).into(), enc, cr, char_len));
        }

        Ok(Rope::from_node(Node::new(enc, len, self.0.depth + 1, cr, char_len, None,
                                     Variant::Repeat { child: self.managed(), times })))
    }

    /// A copy of this rope with the byte at `index` replaced.
    pub fn with_byte_set(&self, index: usize, value: u8) -> Result<Rope> {
        let len = self.0.len;
        if index >= len {
            return Err(RopeError::IndexOutOfBounds { index, limit: len });
        }

        let mut bytes = self.to_vec();
        bytes[index] = value;
        let (cr, char_len) = if self.cached_code_range() == CodeRange::SevenBit && value < 0x80 {
            (CodeRange::SevenBit, Some(len))
        } else {
            (CodeRange::Unknown, None)
        };
        Ok(Rope::leaf_with(bytes.into(), self.0.encoding, cr, char_len))
    }
}

/// Code range and character length of `left ++ right` under `encoding`, as far
/// as they can be told without scanning.
fn concat_metrics(left: &Rope, right: &Rope, encoding: &'static Encoding, len: usize)
                  -> (CodeRange, Option<usize>) {
    let lcr = left.cached_code_range();
    let rcr = right.cached_code_range();

    if same_encoding(left, encoding) && same_encoding(right, encoding) {
        match lcr.join(rcr) {
            CodeRange::SevenBit => (CodeRange::SevenBit, Some(len)),
            CodeRange::Valid => {
                let chars = left.cached_char_len().zip(right.cached_char_len()).map(|(l, r)| l + r);
                (CodeRange::Valid, chars)
            }
            // Broken halves may heal each other. Leave it to a rescan.
            _ if encoding.is_single_byte() => (CodeRange::Unknown, Some(len)),
            _ => (CodeRange::Unknown, None),
        }
    } else if encoding.is_ascii_compatible() && lcr == CodeRange::SevenBit && rcr == CodeRange::SevenBit {
        (CodeRange::SevenBit, Some(len))
    } else if encoding.is_single_byte() {
        (CodeRange::Unknown, Some(len))
    } else {
        (CodeRange::Unknown, None)
    }
}

impl PartialEq for Rope {
    // Walk both chunk streams side by side, comparing as much as lines up each
    // step. Avoids flattening either side.
    fn eq(&self, other: &Rope) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if !same_encoding(self, other.0.encoding) || self.0.len != other.0.len {
            return false;
        }
        let (ha, hb) = (self.0.hash.load(Ordering::Acquire), other.0.hash.load(Ordering::Acquire));
        if ha != 0 && hb != 0 && ha != hb {
            return false;
        }

        let mut other_iter = other.chunks();
        let mut os: &[u8] = &[];

        for mut s in self.chunks() {
            while !s.is_empty() {
                if os.is_empty() {
                    match other_iter.next() {
                        Some(next) => os = next,
                        None => return false,
                    }
                    continue;
                }

                let amt = min(s.len(), os.len());
                let (s_start, s_rem) = s.split_at(amt);
                let (os_start, os_rem) = os.split_at(amt);
                if s_start != os_start {
                    return false;
                }

                s = s_rem;
                os = os_rem;
            }
        }

        true
    }
}

impl Eq for Rope {}

impl Hash for Rope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Debug for Rope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: Vec<u8> = self.chunks().flatten().take(32).copied().collect();
        f.debug_struct("Rope")
            .field("kind", &self.kind())
            .field("encoding", &self.0.encoding.name())
            .field("len", &self.0.len)
            .field("code_range", &self.cached_code_range())
            .field("bytes", &String::from_utf8_lossy(&preview))
            .finish()
    }
}

impl From<&str> for Rope {
    fn from(s: &str) -> Self {
        Rope::leaf(s.as_bytes(), &UTF_8)
    }
}

impl From<String> for Rope {
    fn from(s: String) -> Self {
        Rope::leaf(s.into_bytes(), &UTF_8)
    }
}

impl From<&[u8]> for Rope {
    fn from(bytes: &[u8]) -> Self {
        Rope::leaf(bytes, &ASCII_8BIT)
    }
}

impl From<Vec<u8>> for Rope {
    fn from(bytes: Vec<u8>) -> Self {
        Rope::leaf(bytes, &ASCII_8BIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{ISO_8859_1, US_ASCII, UTF_16LE};

    fn big(c: u8, n: usize) -> Rope {
        Rope::leaf(vec![c; n], &UTF_8)
    }

    #[test]
    fn leaf_metrics() {
        let r = Rope::leaf(&b"hello"[..], &US_ASCII);
        assert_eq!(r.kind(), RopeKind::Leaf);
        assert_eq!(r.depth(), 1);
        assert_eq!(r.len_bytes(), 5);
        assert_eq!(r.len_chars(), 5);
        assert_eq!(r.code_range(), CodeRange::SevenBit);
        assert!(r.single_byte_optimizable());
        assert!(r.is_materialized());

        let r = Rope::from("Hello せかい!");
        assert_eq!(r.len_bytes(), 16);
        assert_eq!(r.len_chars(), 10);
        assert_eq!(r.code_range(), CodeRange::Valid);
        assert!(!r.single_byte_optimizable());

        let r = Rope::leaf(vec![0xE9, 0xFF], &ISO_8859_1);
        assert_eq!(r.len_chars(), 2);
        assert!(r.single_byte_optimizable());
    }

    #[test]
    fn empty_is_canonical() {
        let a = Rope::empty(&UTF_8);
        let b = Rope::from("x").substring(0, 0).unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert!(!Arc::ptr_eq(&a.0, &Rope::empty(&ASCII_8BIT).0));
        assert_eq!(a.code_range(), CodeRange::SevenBit);
    }

    #[test]
    fn small_concat_is_flattened() {
        let r = Rope::concat(&Rope::from("foo"), &Rope::from("bar"), &UTF_8).unwrap();
        assert_eq!(r.kind(), RopeKind::Leaf);
        assert_eq!(r.bytes(), b"foobar");
        assert_eq!(r.code_range(), CodeRange::SevenBit);
    }

    #[test]
    fn large_concat_is_a_node() {
        let l = big(b'a', 100);
        let r = big(b'b', 100);
        let c = Rope::concat(&l, &r, &UTF_8).unwrap();
        assert_eq!(c.kind(), RopeKind::Concat);
        assert_eq!(c.depth(), 2);
        assert_eq!(c.len_bytes(), 200);
        assert!(!c.is_materialized());
        assert_eq!(c.cached_char_len(), Some(200));
        assert_eq!(c.get_byte(99).unwrap(), b'a');
        assert_eq!(c.get_byte(100).unwrap(), b'b');
        assert!(c.get_byte(200).is_err());
        assert_eq!(&c.bytes()[98..102], b"aabb");
        assert!(c.is_materialized());
    }

    #[test]
    fn concat_with_empty_returns_other() {
        let r = big(b'x', 200);
        let c = Rope::concat(&Rope::empty(&UTF_8), &r, &UTF_8).unwrap();
        assert!(Arc::ptr_eq(&c.0, &r.0));
        let c = Rope::concat(&r, &Rope::empty(&UTF_8), &UTF_8).unwrap();
        assert!(Arc::ptr_eq(&c.0, &r.0));

        let c = Rope::concat(&Rope::empty(&UTF_8), &r, &ASCII_8BIT).unwrap();
        assert!(ptr::eq(c.encoding(), &ASCII_8BIT));
        assert_eq!(c, r.with_encoding(&ASCII_8BIT));
    }

    #[test]
    fn broken_halves_can_heal() {
        let l = Rope::leaf(vec![0xC3], &UTF_8);
        let r = Rope::leaf(vec![0xA9], &UTF_8);
        assert_eq!(l.code_range(), CodeRange::Broken);
        let c = Rope::concat(&l, &r, &UTF_8).unwrap();
        assert_eq!(c.code_range(), CodeRange::Valid);
        assert_eq!(c.len_chars(), 1);
    }

    #[test]
    fn deep_concat_is_flattened() {
        let piece = big(b'z', 200);
        let mut r = piece.clone();
        for _ in 0..200 {
            r = Rope::concat(&r, &piece, &UTF_8).unwrap();
            assert!(r.depth() <= config::get().max_depth);
        }
        assert_eq!(r.len_bytes(), 201 * 200);
        assert!(r.bytes().iter().all(|&b| b == b'z'));
    }

    #[test]
    fn concat_overflow() {
        let max = config::get().max_byte_length;
        let a = big(b'a', 200).repeat(max / 200).unwrap();
        let err = Rope::concat(&a, &big(b'b', 200), &UTF_8).unwrap_err();
        assert!(matches!(err, RopeError::Overflow { .. }));
    }

    #[test]
    fn substring_shapes() {
        let r = big(b'q', 300);
        let s = r.substring(10, 100).unwrap();
        assert_eq!(s.kind(), RopeKind::Substring);
        assert_eq!(s.depth(), 2);
        assert_eq!(s.code_range(), CodeRange::SevenBit);

        // Substring of substring collapses onto the original.
        let ss = s.substring(5, 50).unwrap();
        assert_eq!(ss.kind(), RopeKind::Substring);
        assert_eq!(ss.depth(), 2);
        assert_eq!(ss, r.substring(15, 50).unwrap());

        // Short ones are copied.
        let small = r.substring(1, 3).unwrap();
        assert_eq!(small.kind(), RopeKind::Leaf);

        // The whole thing is the thing itself.
        assert!(Arc::ptr_eq(&r.substring(0, 300).unwrap().0, &r.0));

        assert_eq!(r.substring(299, 2).unwrap_err(),
                   RopeError::OutOfBounds { offset: 299, length: 2, byte_length: 300 });
        assert!(r.substring(usize::MAX, 2).is_err());
    }

    #[test]
    fn substring_descends_into_concat_and_repeat() {
        let c = Rope::concat(&big(b'a', 100), &big(b'b', 100), &UTF_8).unwrap();
        let s = c.substring(150, 40).unwrap();
        assert_eq!(s.kind(), RopeKind::Substring);
        assert_eq!(s.bytes(), &[b'b'; 40][..]);

        let straddle = c.substring(90, 20).unwrap();
        assert_eq!(straddle.bytes(), b"aaaaaaaaaabbbbbbbbbb");

        let rep = Rope::from("0123456789").repeat(100).unwrap();
        assert_eq!(rep.substring(13, 4).unwrap().bytes(), b"3456");
        assert_eq!(rep.substring(18, 4).unwrap().bytes(), b"8901");
    }

    #[test]
    fn substring_of_multibyte_needs_rescan() {
        let text = "せかい".repeat(30);
        let r = Rope::from(text.as_str());
        let s = r.substring(3, 60).unwrap();
        assert_eq!(s.cached_code_range(), CodeRange::Unknown);
        assert_eq!(s.code_range(), CodeRange::Valid);
        assert_eq!(s.len_chars(), 20);

        let broken = r.substring(1, 60).unwrap();
        assert_eq!(broken.code_range(), CodeRange::Broken);
    }

    #[test]
    fn repeat_shapes() {
        let r = Rope::from("ab");
        assert_eq!(r.repeat(0).unwrap(), Rope::empty(&UTF_8));
        assert!(Arc::ptr_eq(&r.repeat(1).unwrap().0, &r.0));

        let small = r.repeat(3).unwrap();
        assert_eq!(small.kind(), RopeKind::Leaf);
        assert_eq!(small.bytes(), b"ababab");

        let long = r.repeat(1000).unwrap();
        assert_eq!(long.kind(), RopeKind::Repeat);
        assert_eq!(long.len_bytes(), 2000);
        assert_eq!(long.len_chars(), 2000);
        assert_eq!(long.get_byte(1001).unwrap(), b'b');

        // Repeat of repeat collapses.
        let longer = long.repeat(3).unwrap();
        assert_eq!(longer.kind(), RopeKind::Repeat);
        assert_eq!(longer.depth(), 2);
        assert_eq!(longer.len_bytes(), 6000);

        let e = Rope::from("é").repeat(100).unwrap();
        assert_eq!(e.code_range(), CodeRange::Valid);
        assert_eq!(e.len_chars(), 100);

        let err = r.repeat(usize::MAX).unwrap_err();
        assert_eq!(err, RopeError::Overflow { lhs: 2, rhs: usize::MAX, limit: config::get().max_byte_length });
    }

    #[test]
    fn char_and_byte_offsets() {
        let r = Rope::from("Hello せかい!");
        assert_eq!(r.char_to_byte(6).unwrap(), 6);
        assert_eq!(r.char_to_byte(7).unwrap(), 9);
        assert_eq!(r.char_to_byte(10).unwrap(), 16);
        assert!(r.char_to_byte(11).is_err());
        assert_eq!(r.byte_to_char(7).unwrap(), 6);
        assert_eq!(r.byte_to_char(9).unwrap(), 7);
        assert_eq!(r.byte_to_char(16).unwrap(), 10);

        let broken = Rope::leaf(vec![b'a', 0xC3, b'b'], &UTF_8);
        assert_eq!(broken.len_chars(), 3);
        assert_eq!(broken.char_to_byte(2).unwrap(), 2);
        assert_eq!(broken.byte_to_char(2).unwrap(), 2);

        // A stray continuation byte is a character of its own, not part of
        // the one before it.
        let stray = Rope::leaf(vec![0xC3, 0xA9, 0x80, b'x'], &UTF_8);
        assert_eq!(stray.code_range(), CodeRange::Broken);
        assert_eq!(stray.len_chars(), 3);
        assert_eq!(stray.byte_to_char(1).unwrap(), 0);
        assert_eq!(stray.byte_to_char(2).unwrap(), 1);
        assert_eq!(stray.byte_to_char(3).unwrap(), 2);
        assert_eq!(stray.byte_to_char(4).unwrap(), 3);
        assert_eq!(stray.char_to_byte(2).unwrap(), 3);

        let le: Vec<u8> = "ab".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let wide = Rope::leaf(le, &UTF_16LE);
        assert_eq!(wide.char_to_byte(1).unwrap(), 2);
        assert_eq!(wide.byte_to_char(3).unwrap(), 1);
    }

    #[test]
    fn with_encoding_shares_leaf_bytes() {
        let r = Rope::from("abc");
        let b = r.with_encoding(&ASCII_8BIT);
        assert!(ptr::eq(r.bytes().as_ptr(), b.bytes().as_ptr()));
        assert_eq!(b.code_range(), CodeRange::SevenBit);
        assert_ne!(r, b);
    }

    #[test]
    fn equality_ignores_shape() {
        let flat = Rope::from("ab".repeat(100));
        let rep = Rope::from("ab").repeat(100).unwrap();
        let cat = Rope::concat(&Rope::from("ab".repeat(60)), &Rope::from("ab".repeat(40)), &UTF_8).unwrap();
        assert_eq!(flat, rep);
        assert_eq!(rep, cat);
        assert_eq!(flat.hash_code(), rep.hash_code());
        assert_eq!(cat.hash_code(), rep.hash_code());
        assert_ne!(flat, Rope::from("ba".repeat(100)));
    }

    #[test]
    fn set_byte_copies() {
        let r = Rope::from("abc");
        let s = r.with_byte_set(1, b'z').unwrap();
        assert_eq!(r.bytes(), b"abc");
        assert_eq!(s.bytes(), b"azc");
        assert_eq!(s.code_range(), CodeRange::SevenBit);
        let t = r.with_byte_set(0, 0xFF).unwrap();
        assert_eq!(t.code_range(), CodeRange::Broken);
        assert!(r.with_byte_set(3, 0).is_err());
    }
}
