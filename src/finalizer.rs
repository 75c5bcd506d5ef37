//! Deferred release of native buffers.
//!
//! When the last handle to a native buffer goes away, the buffer isn't freed on
//! the spot. Its release action is queued here instead and run later, either
//! when enough releases have piled up or when someone calls
//! [`FinalizationService::drain`]. Releases run in the order they were
//! registered and each runs exactly once.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, trace};

use crate::config;

/// Action which returns a buffer's memory.
pub type Release = Box<dyn FnOnce() + Send>;

/// Where a native buffer is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Reachable from a native rope.
    Active,
    /// Unreachable, with a release action queued.
    Finalizing,
    /// Released. The address may have been reused.
    Freed,
}

/// Handed out on registration. Tickets are issued in queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

struct Pending {
    ticket: Ticket,
    address: usize,
    release: Release,
}

pub struct FinalizationService {
    queue: Mutex<VecDeque<Pending>>,
    next_ticket: AtomicU64,
    /// Every ticket below this has been released.
    released: AtomicU64,
    batch: usize,
}

static GLOBAL: OnceLock<Arc<FinalizationService>> = OnceLock::new();

impl FinalizationService {
    pub fn new() -> Self {
        Self::with_batch(config::get().finalizer_batch)
    }

    /// A service which drains inline once `batch` releases are pending. A
    /// batch of 0 or 1 releases immediately.
    pub fn with_batch(batch: usize) -> Self {
        FinalizationService {
            queue: Mutex::new(VecDeque::new()),
            next_ticket: AtomicU64::new(0),
            released: AtomicU64::new(0),
            batch: batch.max(1),
        }
    }

    /// The process-wide service. Native ropes use this unless told otherwise.
    ///
    /// It lives for the whole process and so is never dropped. Up to one batch
    /// less one of released buffers can sit in its queue until the next
    /// release fills the batch or someone calls [`FinalizationService::drain`].
    pub fn global() -> &'static Arc<FinalizationService> {
        GLOBAL.get_or_init(|| Arc::new(FinalizationService::new()))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Pending>> {
        // A release that panicked leaves the queue itself intact.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, address: usize, release: Release) -> Ticket {
        let mut queue = self.lock();
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        trace!(address, ticket = ticket.0, "queued native buffer release");
        queue.push_back(Pending { ticket, address, release });

        if queue.len() >= self.batch {
            self.drain_locked(&mut queue);
        }
        ticket
    }

    /// Run every queued release. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut queue = self.lock();
        self.drain_locked(&mut queue)
    }

    fn drain_locked(&self, queue: &mut VecDeque<Pending>) -> usize {
        let count = queue.len();
        while let Some(Pending { ticket, address, release }) = queue.pop_front() {
            release();
            trace!(address, ticket = ticket.0, "released native buffer");
            self.released.store(ticket.0 + 1, Ordering::Release);
        }
        if count > 0 {
            debug!(count, "drained finalization queue");
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Number of releases which have run so far.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    pub fn state(&self, ticket: Ticket) -> BufferState {
        if ticket.0 < self.released.load(Ordering::Acquire) {
            BufferState::Freed
        } else {
            BufferState::Finalizing
        }
    }
}

impl Default for FinalizationService {
    fn default() -> Self { Self::new() }
}

impl Drop for FinalizationService {
    fn drop(&mut self) {
        self.drain();
    }
}

impl fmt::Debug for FinalizationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizationService")
            .field("pending", &self.pending())
            .field("released", &self.released())
            .field("batch", &self.batch)
            .finish()
    }
}
