use std::cmp::min;
use std::iter::FusedIterator;

use crate::rope::{Rope, Variant};

enum Frame<'a> {
    /// Bytes `start..end` of `rope`.
    Window { rope: &'a Rope, start: usize, end: usize },
    /// Positions `pos..end` of a repeat whose unit is `child`.
    Repeat { child: &'a Rope, pos: usize, end: usize },
}

/// A content iterator yields the bytes of a rope as a series of slices, in
/// order. It borrows from whatever storage already exists and never flattens
/// anything.
///
/// The yielded slices are never empty.
pub struct Chunks<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> Chunks<'a> {
    pub(crate) fn new(rope: &'a Rope, start: usize, end: usize) -> Self {
        Chunks {
            stack: vec![Frame::Window { rope, start, end }],
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Window { rope, start, end } => {
                    if start >= end { continue; }

                    if let Some(raw) = rope.raw_bytes() {
                        return Some(&raw[start..end]);
                    }

                    match &rope.0.variant {
                        Variant::Concat { left, right } => {
                            let split = left.len_bytes();
                            // Right goes on first so the left side pops first.
                            if end > split {
                                self.stack.push(Frame::Window {
                                    rope: right,
                                    start: start.saturating_sub(split),
                                    end: end - split,
                                });
                            }
                            if start < split {
                                self.stack.push(Frame::Window { rope: left, start, end: min(end, split) });
                            }
                        }
                        Variant::Substring { child, offset } => {
                            self.stack.push(Frame::Window {
                                rope: child,
                                start: offset + start,
                                end: offset + end,
                            });
                        }
                        Variant::Repeat { child, .. } => {
                            self.stack.push(Frame::Repeat { child, pos: start, end });
                        }
                        Variant::Leaf | Variant::Native(_) => unreachable!("leaves are always materialized"),
                    }
                }
                Frame::Repeat { child, pos, end } => {
                    if pos >= end { continue; }

                    let unit = child.len_bytes();
                    let s = pos % unit;
                    let e = min(unit, s + (end - pos));
                    let next = pos + (e - s);
                    if next < end {
                        self.stack.push(Frame::Repeat { child, pos: next, end });
                    }
                    self.stack.push(Frame::Window { rope: child, start: s, end: e });
                }
            }
        }

        None
    }
}

impl<'a> FusedIterator for Chunks<'a> {}

#[cfg(test)]
mod tests {
    use crate::encoding::UTF_8;
    use crate::rope::Rope;

    fn collect(r: &Rope) -> Vec<Vec<u8>> {
        r.chunks().map(|c| c.to_vec()).collect()
    }

    #[test]
    fn leaf_is_one_chunk() {
        let r = Rope::from("hi there");
        assert_eq!(collect(&r), vec![b"hi there".to_vec()]);
        assert_eq!(Rope::empty(&UTF_8).chunks().count(), 0);
    }

    #[test]
    fn composite_chunks_follow_structure() {
        let a = Rope::from("a".repeat(100));
        let b = Rope::from("b".repeat(100));
        let c = Rope::concat(&a, &b, &UTF_8).unwrap();
        let chunks = collect(&c);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], vec![b'a'; 100]);
        assert_eq!(chunks[1], vec![b'b'; 100]);

        let s = c.substring(50, 100).unwrap();
        let chunks = collect(&s);
        assert_eq!(chunks, vec![vec![b'a'; 50], vec![b'b'; 50]]);
    }

    #[test]
    fn repeat_chunks_wrap() {
        let unit = Rope::from("0123456789".repeat(4));
        let r = unit.repeat(10).unwrap();
        assert_eq!(r.chunks().count(), 10);
        assert!(r.chunks().all(|c| c.len() == 40));

        let s = r.substring(35, 50).unwrap();
        let lens: Vec<usize> = s.chunks().map(|c| c.len()).collect();
        assert_eq!(lens, vec![5, 40, 5]);
        assert_eq!(s.to_vec(), r.to_vec()[35..85].to_vec());
    }
}
