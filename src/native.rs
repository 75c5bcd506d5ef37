// Native ropes are backed by a raw, address-stable allocation which outside
// code can read and write through a pointer. The buffer holds C bytes: the
// first L are the rope's contents, byte L is always zero, and whatever lies
// beyond is spare capacity.
//
// Once shared, the buffer is only touched one byte at a time through atomics,
// so a write never aliases a `&[u8]`. A native rope node reads its contents out
// of the buffer once, the first time they are needed, and keeps that copy.
// Writes through a `NativeRope` rebind it to a fresh node over the same buffer.
// Composite ropes never point into a native buffer; they copy it out first.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::code_range::CodeRange;
use crate::encoding::Encoding;
use crate::error::{Result, RopeError};
use crate::finalizer::{BufferState, FinalizationService};
use crate::rope::{Node, Rope, Variant};

#[derive(Clone, Copy)]
struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

// Plain bytes. Ownership can move to the finalizer's thread.
unsafe impl Send for Allocation {}

impl Allocation {
    fn zeroed(size: usize) -> Result<Allocation> {
        debug_assert!(size > 0);
        let layout = Layout::from_size_align(size, 1)
            .map_err(|_| RopeError::Overflow { lhs: size, rhs: 0, limit: isize::MAX as usize })?;
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| handle_alloc_error(layout));
        Ok(Allocation { ptr, layout })
    }

    unsafe fn release(self) {
        dealloc(self.ptr.as_ptr(), self.layout);
    }
}

pub(crate) struct NativeBuffer {
    alloc: Allocation,
    service: Arc<FinalizationService>,
}

// Shared access goes through `AtomicU8`, never through plain references.
unsafe impl Send for NativeBuffer {}
unsafe impl Sync for NativeBuffer {}

impl NativeBuffer {
    fn new(size: usize, service: Arc<FinalizationService>) -> Result<Self> {
        Ok(NativeBuffer { alloc: Allocation::zeroed(size)?, service })
    }

    #[inline]
    pub(crate) fn size(&self) -> usize { self.alloc.layout.size() }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 { self.alloc.ptr.as_ptr() }

    #[inline]
    fn cell(&self, i: usize) -> &AtomicU8 {
        assert!(i < self.size());
        // SAFETY: in bounds, and AtomicU8 has the same layout as u8.
        unsafe { &*(self.as_ptr().add(i) as *const AtomicU8) }
    }

    #[inline]
    fn read(&self, i: usize) -> u8 {
        self.cell(i).load(Ordering::Acquire)
    }

    #[inline]
    fn write(&self, i: usize, value: u8) {
        self.cell(i).store(value, Ordering::Release)
    }

    fn fill(&self, start: usize, end: usize, value: u8) {
        for i in start..end {
            self.write(i, value);
        }
    }

    /// Copy of the first `len` bytes.
    pub(crate) fn snapshot(&self, len: usize) -> Arc<[u8]> {
        assert!(len < self.size());
        (0..len).map(|i| self.read(i)).collect()
    }

    /// Plain copy into a buffer nobody else can see yet.
    fn copy_in(&mut self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.size());
        unsafe { self.as_ptr().add(offset).copy_from_nonoverlapping(src.as_ptr(), src.len()) }
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        let alloc = self.alloc;
        let address = alloc.ptr.as_ptr() as usize;
        self.service.register(address, Box::new(move || unsafe { alloc.release() }));
    }
}

/// A rope whose bytes live in a native buffer.
#[derive(Clone)]
pub struct NativeRope {
    rope: Rope,
    buffer: Arc<NativeBuffer>,
}

impl NativeRope {
    pub(crate) fn from_parts(rope: Rope, buffer: Arc<NativeBuffer>) -> Self {
        NativeRope { rope, buffer }
    }

    /// Copy `rope` into a fresh native buffer registered with the global
    /// finalization service.
    pub fn from_rope(rope: &Rope) -> Result<NativeRope> {
        Self::from_rope_in(rope, FinalizationService::global())
    }

    pub fn from_rope_in(rope: &Rope, service: &Arc<FinalizationService>) -> Result<NativeRope> {
        Self::allocate(rope, rope.len_bytes(), service)
    }

    /// Copy `rope` into a new buffer with room for `capacity` content bytes.
    pub(crate) fn allocate(rope: &Rope, capacity: usize, service: &Arc<FinalizationService>)
                           -> Result<NativeRope> {
        let len = rope.len_bytes();
        debug_assert!(capacity >= len);
        let size = capacity.checked_add(1)
            .ok_or(RopeError::Overflow { lhs: capacity, rhs: 1, limit: isize::MAX as usize })?;

        // The source's bytes are what the buffer starts out holding, so the new
        // node can reuse them along with whatever metrics are already known.
        let contents = rope.shared_bytes();
        let mut buffer = NativeBuffer::new(size, service.clone())?;
        buffer.copy_in(0, &contents);
        let buffer = Arc::new(buffer);
        debug!(len, size, address = buffer.as_ptr() as usize, "allocated native buffer");

        Ok(Self::build(rope.encoding(), len, buffer, rope.cached_code_range(), rope.cached_char_len(),
                       Some(contents)))
    }

    fn build(encoding: &'static Encoding, len: usize, buffer: Arc<NativeBuffer>,
             code_range: CodeRange, char_len: Option<usize>, contents: Option<Arc<[u8]>>) -> NativeRope {
        let node = Node::new(encoding, len, 1, code_range, char_len, contents, Variant::Native(buffer.clone()));
        NativeRope { rope: Rope::from_node(node), buffer }
    }

    /// A fresh node over the same buffer. It reads the contents anew.
    fn rebind(&self, len: usize) -> NativeRope {
        Self::build(self.rope.encoding(), len, self.buffer.clone(), CodeRange::Unknown, None, None)
    }

    pub fn rope(&self) -> &Rope { &self.rope }

    pub fn into_rope(self) -> Rope { self.rope }

    pub fn len_bytes(&self) -> usize { self.rope.len_bytes() }

    pub fn address(&self) -> usize { self.buffer.as_ptr() as usize }

    /// Raw pointer to the buffer.
    ///
    /// Writes through it must be serialized with every other use of the
    /// buffer. Ropes that have already read their contents don't see them;
    /// call [`NativeRope::refresh`] afterwards to get one that does.
    pub fn as_mut_ptr(&self) -> *mut u8 { self.buffer.as_ptr() }

    /// Content bytes the buffer can hold. One more byte is reserved for the
    /// terminator.
    pub fn capacity(&self) -> usize { self.buffer.size() - 1 }

    /// Buffers reachable from a native rope are always active. Once the last
    /// rope goes, the buffer is handed to the finalization service.
    pub fn state(&self) -> BufferState { BufferState::Active }

    pub(crate) fn service(&self) -> &Arc<FinalizationService> { &self.buffer.service }

    /// A native rope over the same buffer whose first `len` bytes are the
    /// contents. The caller vouches that those bytes are already in place.
    ///
    /// Ropes over the buffer that have already read their contents keep
    /// them, even if the new terminator lands inside.
    pub fn with_byte_length(&self, len: usize) -> Result<NativeRope> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(RopeError::NativeCapacity { requested: len, capacity });
        }
        self.buffer.write(len, 0);
        Ok(self.rebind(len))
    }

    /// Read any byte of the buffer, including spare capacity.
    pub fn get_byte(&self, index: usize) -> Result<u8> {
        let size = self.buffer.size();
        if index >= size {
            return Err(RopeError::IndexOutOfBounds { index, limit: size });
        }
        Ok(self.buffer.read(index))
    }

    /// Write any byte of the buffer in place. A write inside the contents
    /// moves this handle onto a fresh node with no cached metrics.
    pub fn set_byte(&mut self, index: usize, value: u8) -> Result<()> {
        let size = self.buffer.size();
        if index >= size {
            return Err(RopeError::IndexOutOfBounds { index, limit: size });
        }
        self.buffer.write(index, value);
        if index < self.len_bytes() {
            self.refresh();
        }
        Ok(())
    }

    /// Forget what this handle's rope knows about the contents after they
    /// were changed through the pointer.
    pub fn refresh(&mut self) {
        self.rope = self.rebind(self.len_bytes()).rope;
    }

    /// Resize within the current capacity. New bytes read as zero.
    pub(crate) fn resize_in_place(&self, len: usize) -> Result<NativeRope> {
        let old = self.len_bytes();
        if len > old && len <= self.capacity() {
            self.buffer.fill(old, len, 0);
        }
        self.with_byte_length(len)
    }

    /// Move the contents into a new buffer with room for `capacity` bytes.
    pub(crate) fn reallocate(&self, capacity: usize) -> Result<NativeRope> {
        Self::allocate(&self.rope, capacity, self.service())
    }
}

impl fmt::Debug for NativeRope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRope")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len_bytes())
            .field("capacity", &self.capacity())
            .field("rope", &self.rope)
            .finish()
    }
}
