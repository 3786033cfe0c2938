//! Sandbox slot pool
//!
//! A fixed set of isolate boxes shared by all in-flight cases. A semaphore
//! bounds how many cases may hold a box at once; the mutex-guarded flags pick
//! which box. Leases release their slot when dropped, so every exit path of a
//! case (including errors and panics) returns the box to the pool.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::SandboxError;

#[derive(Debug)]
struct PoolState {
    in_use: Vec<bool>,
    /// Where the next free-slot search starts
    cursor: usize,
}

/// Fixed-size pool of sandbox slots
#[derive(Debug)]
pub struct SlotPool {
    state: Mutex<PoolState>,
    permits: Arc<Semaphore>,
    box_id_offset: u32,
}

impl SlotPool {
    /// Create a pool of `size` slots mapped to box ids `box_id_offset..box_id_offset + size`
    pub fn new(size: usize, box_id_offset: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState {
                in_use: vec![false; size],
                cursor: 0,
            }),
            permits: Arc::new(Semaphore::new(size)),
            box_id_offset,
        })
    }

    pub fn size(&self) -> usize {
        self.lock().in_use.len()
    }

    /// Number of slots currently leased
    pub fn in_use(&self) -> usize {
        self.lock().in_use.iter().filter(|used| **used).count()
    }

    /// Wait for a free slot and lease it
    pub async fn acquire(self: &Arc<Self>) -> Result<SlotLease, SandboxError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::PoolClosed)?;

        let index = {
            let mut state = self.lock();
            let size = state.in_use.len();
            // A held permit guarantees at least one free flag
            let index = (0..size)
                .map(|step| (state.cursor + step) % size)
                .find(|&i| !state.in_use[i])
                .ok_or(SandboxError::PoolClosed)?;
            state.in_use[index] = true;
            state.cursor = (index + 1) % size;
            index
        };

        debug!("Leased sandbox slot {}", index);

        Ok(SlotLease {
            pool: Arc::clone(self),
            index,
            _permit: permit,
        })
    }

    fn release(&self, index: usize) {
        let mut state = self.lock();
        state.in_use[index] = false;
        debug!("Released sandbox slot {}", index);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive lease on one sandbox slot, returned to the pool on drop
#[derive(Debug)]
pub struct SlotLease {
    pool: Arc<SlotPool>,
    index: usize,
    // Dropped after `Drop::drop` clears the flag
    _permit: OwnedSemaphorePermit,
}

impl SlotLease {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Isolate box id backing this slot
    pub fn box_id(&self) -> u32 {
        self.pool.box_id_offset + self.index as u32
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
