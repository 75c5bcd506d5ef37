// The mutable string handle. Its only state is the current rope, held in an
// ArcSwap so readers always see a whole rope, old or new. Every edit builds a
// new rope from the current one and swaps it in, retrying if another thread
// swapped first. Native ropes are the exception: their bytes are written in
// place and a fresh node over the same buffer is swapped in.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use tracing::debug;

use crate::chars;
use crate::code_range::CodeRange;
use crate::encoding::Encoding;
use crate::error::Result;
use crate::finalizer::FinalizationService;
use crate::native::NativeRope;
use crate::rope::{Node, Rope, Variant};

pub struct RopeString {
    rope: ArcSwap<Node>,
    finalizer: Arc<FinalizationService>,
}

impl RopeString {
    pub fn new(rope: Rope) -> Self {
        Self::with_finalizer(rope, FinalizationService::global().clone())
    }

    /// A string whose native buffers are released through `finalizer`.
    pub fn with_finalizer(rope: Rope, finalizer: Arc<FinalizationService>) -> Self {
        RopeString { rope: ArcSwap::new(rope.0), finalizer }
    }

    /// The current rope.
    pub fn rope(&self) -> Rope {
        Rope(self.rope.load_full())
    }

    pub fn set_rope(&self, rope: Rope) {
        self.rope.store(rope.0);
    }

    /// Replace the rope with `f(current)`. If another thread swapped in
    /// between, `f` runs again on the newer rope.
    fn update<F>(&self, f: F) -> Result<Rope>
        where F: Fn(&Rope) -> Result<Rope>
    {
        let mut current = self.rope.load_full();
        loop {
            let next = f(&Rope(current.clone()))?;
            let prev = self.rope.compare_and_swap(&current, next.0.clone());
            if Arc::ptr_eq(&prev, &current) {
                return Ok(next);
            }
            current = Guard::into_inner(prev);
        }
    }

    pub fn encoding(&self) -> &'static Encoding { self.rope().encoding() }

    pub fn len_bytes(&self) -> usize { self.rope().len_bytes() }

    pub fn len_chars(&self) -> usize { self.rope().len_chars() }

    pub fn code_range(&self) -> CodeRange { self.rope().code_range() }

    pub fn to_vec(&self) -> Vec<u8> { self.rope().to_vec() }

    pub fn append(&self, other: &Rope) -> Result<()> {
        self.update(|rope| Rope::concat(rope, other, rope.encoding()))?;
        Ok(())
    }

    /// Append raw bytes, taken to be in the string's encoding.
    pub fn append_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let other: Arc<[u8]> = bytes.into();
        self.update(|rope| {
            Rope::concat(rope, &Rope::leaf(other.clone(), rope.encoding()), rope.encoding())
        })?;
        Ok(())
    }

    pub fn substring(&self, offset: usize, length: usize) -> Result<()> {
        self.update(|rope| rope.substring(offset, length))?;
        Ok(())
    }

    /// Make the string `len` bytes long, truncating or padding with zeros.
    pub fn resize(&self, len: usize) -> Result<()> {
        if let Some(native) = self.rope().as_native() {
            let resized = if len <= native.capacity() {
                native.resize_in_place(len)?
            } else {
                debug!(from = native.capacity(), to = len, "growing native buffer");
                let grown = native.reallocate(len)?;
                grown.resize_in_place(len)?
            };
            self.set_rope(resized.into_rope());
            return Ok(());
        }

        self.update(|rope| resize_managed(rope, len))?;
        Ok(())
    }

    /// Write one byte. Native strings are changed in place; anything else gets
    /// a fresh leaf.
    pub fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        if let Some(mut native) = self.rope().as_native() {
            native.set_byte(index, value)?;
            self.set_rope(native.into_rope());
            return Ok(());
        }
        self.update(|rope| rope.with_byte_set(index, value))?;
        Ok(())
    }

    /// Read a byte the way a pointer into the string would. Native strings can
    /// be read anywhere in their buffer. Otherwise positions past the end read
    /// as zero.
    pub fn get_byte(&self, index: usize) -> Result<u8> {
        let rope = self.rope();
        match rope.as_native() {
            Some(native) => native.get_byte(index),
            None if index < rope.len_bytes() => Ok(rope.byte_at(index)),
            None => Ok(0),
        }
    }

    pub fn is_native(&self) -> bool { self.rope().is_native() }

    /// Move the contents into a native buffer, if they aren't already.
    ///
    /// The returned handle shares the string's buffer. Content written through
    /// it reaches the string's rope on the next [`RopeString::set_len`].
    pub fn to_native(&self) -> Result<NativeRope> {
        let rope = self.rope();
        if let Some(native) = rope.as_native() {
            return Ok(native);
        }

        let native = NativeRope::from_rope_in(&rope, &self.finalizer)?;
        debug!(len = native.len_bytes(), address = native.address(), "string converted to native");
        let prev = self.rope.compare_and_swap(&rope.0, native.rope().0.clone());
        if Arc::ptr_eq(&prev, &rope.0) {
            Ok(native)
        } else {
            // Someone else replaced the rope meanwhile. Start over from theirs.
            drop(prev);
            self.to_native()
        }
    }

    pub fn address(&self) -> Result<usize> {
        Ok(self.to_native()?.address())
    }

    pub fn capacity(&self) -> Result<usize> {
        Ok(self.to_native()?.capacity())
    }

    /// Declare the first `len` bytes of the native buffer to be the contents.
    pub fn set_len(&self, len: usize) -> Result<()> {
        let native = self.to_native()?.with_byte_length(len)?;
        self.set_rope(native.into_rope());
        Ok(())
    }

    /// Make sure the native buffer can hold `capacity` bytes.
    pub fn reserve(&self, capacity: usize) -> Result<()> {
        let native = self.to_native()?;
        if native.capacity() < capacity {
            debug!(from = native.capacity(), to = capacity, "reserving native capacity");
            self.set_rope(native.reallocate(capacity)?.into_rope());
        }
        Ok(())
    }

    pub fn byte_pointer_size(&self) -> usize {
        chars::byte_pointer_size(&self.rope())
    }
}

fn resize_managed(rope: &Rope, len: usize) -> Result<Rope> {
    let current = rope.len_bytes();
    if len <= current {
        return rope.substring(0, len);
    }

    let enc = rope.encoding();
    let mut base = rope.clone();

    // If the bytes just past a substring's window are zeros in its parent, a
    // wider window over the parent already reads as the padded string.
    if let Variant::Substring { child, offset } = &rope.0.variant {
        let window_end = offset + current;
        let reach = (child.len_bytes() - window_end).min(len - current);
        let zeros = child.chunks_in(window_end, window_end + reach)
            .flatten()
            .take_while(|&&b| b == 0)
            .count();
        if zeros > 0 {
            base = child.substring(*offset, current + zeros)?;
        }
    }

    let missing = len - base.len_bytes();
    if missing == 0 {
        return Ok(base);
    }
    Rope::concat(&base, &Rope::nul().repeat(missing)?, enc)
}

impl fmt::Debug for RopeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RopeString").field("rope", &self.rope()).finish()
    }
}

impl From<Rope> for RopeString {
    fn from(rope: Rope) -> Self { RopeString::new(rope) }
}

impl Clone for RopeString {
    fn clone(&self) -> Self {
        // The copy starts out sharing the rope. A native buffer can't be
        // shared, so the copy gets a managed snapshot of it instead.
        RopeString::with_finalizer(self.rope().managed(), self.finalizer.clone())
    }
}
