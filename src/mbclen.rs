//! The result of measuring one character.
//!
//! Outside code (C extensions in particular) passes this around as a bare
//! signed integer, so the three outcomes are packed into one `i32`:
//!
//! * `n > 0` - a complete character of `n` bytes was found.
//! * `-1` - the bytes are not a valid character.
//! * `n < -1` - the bytes are a valid prefix and `-1 - n` more bytes are needed.
//!
//! The free functions mirror the `MBCLEN_*` macros and work on the raw integer.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharLen(i32);

impl CharLen {
    pub const INVALID: CharLen = CharLen(-1);

    #[inline]
    pub fn found(len: usize) -> Self {
        debug_assert!(len > 0);
        CharLen(len as i32)
    }

    #[inline]
    pub fn need_more(len: usize) -> Self {
        debug_assert!(len > 0);
        CharLen(-1 - len as i32)
    }

    #[inline]
    pub fn from_raw(raw: i32) -> Self { CharLen(raw) }

    #[inline]
    pub fn raw(self) -> i32 { self.0 }

    #[inline]
    pub fn is_found(self) -> bool { charfound_p(self.0) }

    /// Byte length of the character, if one was found.
    #[inline]
    pub fn found_len(self) -> Option<usize> {
        if self.is_found() { Some(charfound_len(self.0) as usize) } else { None }
    }

    #[inline]
    pub fn needs_more(self) -> bool { needmore_p(self.0) }

    #[inline]
    pub fn need_more_len(self) -> Option<usize> {
        if self.needs_more() { Some(needmore_len(self.0) as usize) } else { None }
    }

    #[inline]
    pub fn is_invalid(self) -> bool { invalid_p(self.0) }
}

impl fmt::Debug for CharLen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.found_len() {
            write!(f, "Found({})", n)
        } else if let Some(n) = self.need_more_len() {
            write!(f, "NeedMore({})", n)
        } else {
            f.write_str("Invalid")
        }
    }
}

impl From<CharLen> for i32 {
    fn from(r: CharLen) -> i32 { r.0 }
}

#[inline]
pub fn charfound_p(r: i32) -> bool { 0 < r }

#[inline]
pub fn charfound_len(r: i32) -> i32 { r }

#[inline]
pub fn needmore_p(r: i32) -> bool { r < -1 }

#[inline]
pub fn needmore_len(r: i32) -> i32 { -1 - r }

#[inline]
pub fn invalid_p(r: i32) -> bool { r == -1 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let r = CharLen::found(3);
        assert_eq!(r.raw(), 3);
        assert!(r.is_found() && !r.needs_more() && !r.is_invalid());
        assert_eq!(r.found_len(), Some(3));

        let r = CharLen::need_more(2);
        assert_eq!(r.raw(), -3);
        assert!(needmore_p(r.raw()));
        assert_eq!(needmore_len(r.raw()), 2);
        assert_eq!(r.found_len(), None);

        assert!(invalid_p(CharLen::INVALID.raw()));
        assert!(!charfound_p(CharLen::INVALID.raw()));
        assert!(!needmore_p(CharLen::INVALID.raw()));
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", CharLen::found(1)), "Found(1)");
        assert_eq!(format!("{:?}", CharLen::need_more(1)), "NeedMore(1)");
        assert_eq!(format!("{:?}", CharLen::INVALID), "Invalid");
    }
}
