//! # mbrope
//!
//! Immutable byte ropes which know their character encoding.
//!
//! A [`Rope`] is a cheap-to-clone handle to a tree of leaves, concatenations,
//! substrings and repeats. Building a rope out of others doesn't copy bytes
//! (past a small size threshold), and each node lazily caches its character
//! length, [`CodeRange`] and hash, so most questions about a rope are answered
//! once.
//!
//! [`RopeString`] is the mutable side: a string whose only state is the rope it
//! currently points at. Edits swap in a new rope atomically. A string can also
//! be moved into a [`NativeRope`], a NUL terminated buffer with a stable address
//! for code which wants a raw pointer.
//!
//! ```
//! use mbrope::{CodeRange, Rope, RopeString, UTF_8};
//!
//! let s = RopeString::new(Rope::from("Hello"));
//! s.append(&Rope::from(" せかい")).unwrap();
//! assert_eq!(s.len_chars(), 9);
//! assert_eq!(s.code_range(), CodeRange::Valid);
//!
//! let r = s.rope().substring(6, 3).unwrap();
//! assert_eq!(r.bytes(), "せ".as_bytes());
//! assert!(std::ptr::eq(r.encoding(), &UTF_8));
//! ```

mod chars;
mod code_range;
pub mod config;
mod encoding;
mod error;
mod finalizer;
mod hash;
mod iter;
mod mbclen;
mod native;
mod rope;
mod string;

pub use chars::{byte_pointer_size, character_length_at, codepoint_at, codepoint_len, left_char_head,
                mbclen, precise_mbclen};
pub use code_range::{classify, CodeRange};
pub use config::Config;
pub use encoding::{Encoding, ASCII_8BIT, ISO_8859_1, US_ASCII, UTF_16BE, UTF_16LE, UTF_8};
pub use error::{ErrorKind, Result, RopeError};
pub use finalizer::{BufferState, FinalizationService, Release, Ticket};
pub use iter::Chunks;
pub use mbclen::{charfound_len, charfound_p, invalid_p, needmore_len, needmore_p, CharLen};
pub use native::NativeRope;
pub use rope::{Rope, RopeKind};
pub use string::RopeString;
