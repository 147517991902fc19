//! Concurrency gate: counting admission limiters for remote calls.
//!
//! Two independent [`Gate`]s bound how many text-generation and
//! image-generation calls run at once. Waiting for a slot suspends the task.
//! The slot is held by a [`GatePermit`] and released when the permit is
//! dropped, which covers success, error, and cancellation alike.

use crate::config::StorybookConfig;
use crate::error::{ServiceError, ServiceErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// A single counting limiter.
#[derive(Debug, Clone)]
pub struct Gate {
    name: &'static str,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// An acquired slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Gate {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails with [`ServiceErrorKind::Cancelled`] once the gate is closed.
    pub async fn acquire(&self) -> Result<GatePermit, ServiceError> {
        if self.semaphore.available_permits() == 0 {
            debug!("{} gate full ({}), waiting", self.name, self.capacity);
        }
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| {
                ServiceError::new(
                    ServiceErrorKind::Cancelled,
                    format!("{} gate is shut down", self.name),
                )
            })?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots held right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Refuse all current waiters and future acquisitions.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// The text and image limiters, shared by the Transformer and Illustrator.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    pub text: Gate,
    pub image: Gate,
}

impl ConcurrencyGate {
    pub fn new(text_slots: usize, image_slots: usize) -> Self {
        Self {
            text: Gate::new("text", text_slots),
            image: Gate::new("image", image_slots),
        }
    }

    pub fn from_config(config: &StorybookConfig) -> Self {
        Self::new(config.text_slots, config.image_slots)
    }

    pub fn close(&self) {
        self.text.close();
        self.image.close();
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(2, 1)
    }
}
