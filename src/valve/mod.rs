//! Pressure relief valve
//!
//! A bounded-wait admission gate. Callers wait through an injected
//! [`ValveHandler::wait`], which must have its own timeout. When a wait times
//! out and too many callers are already waiting, the valve sheds the item
//! through [`ValveHandler::relieve`] instead of letting it queue forever.
//! The threshold can be changed while callers are inside.

use crate::{CrawlError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How a valve waits, sheds, and releases items
#[async_trait]
pub trait ValveHandler<T>: Send + Sync {
    /// Bounded wait; `true` admits the item
    async fn wait(&self, item: &T) -> Result<bool>;

    /// Called once when the item is shed under pressure
    async fn relieve(&self, item: &T);

    /// Called when an admitted item leaves the valve
    async fn release(&self, item: &T);
}

/// Generic admission controller with load shedding
pub struct PressureValve<T, H> {
    handler: H,
    threshold: AtomicUsize,
    waiting: AtomicUsize,
    inside: AtomicUsize,
    disposed: AtomicBool,
    _item: std::marker::PhantomData<fn(&T)>,
}

impl<T, H> PressureValve<T, H>
where
    T: Sync,
    H: ValveHandler<T>,
{
    pub fn new(handler: H, threshold: usize) -> Self {
        Self {
            handler,
            threshold: AtomicUsize::new(threshold),
            waiting: AtomicUsize::new(0),
            inside: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            _item: std::marker::PhantomData,
        }
    }

    /// Waits for admission
    ///
    /// Returns `Ok(true)` once admitted and `Ok(false)` if the item was shed.
    /// A shed item has already been passed to [`ValveHandler::relieve`].
    pub async fn wait_to_enter(&self, item: &T) -> Result<bool> {
        self.check()?;
        self.waiting.fetch_add(1, Ordering::AcqRel);

        loop {
            let admitted = match self.handler.wait(item).await {
                Ok(admitted) => admitted,
                Err(e) => {
                    self.waiting.fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
            };

            if admitted {
                self.waiting.fetch_sub(1, Ordering::AcqRel);
                self.inside.fetch_add(1, Ordering::AcqRel);
                return Ok(true);
            }

            if self.is_disposed() {
                self.waiting.fetch_sub(1, Ordering::AcqRel);
                return Err(Self::disposed_error());
            }

            if self.waiting.load(Ordering::Acquire) >= self.threshold.load(Ordering::Acquire) {
                self.waiting.fetch_sub(1, Ordering::AcqRel);
                tracing::trace!("Valve over threshold, shedding item");
                self.handler.relieve(item).await;
                return Ok(false);
            }
        }
    }

    /// Leaves the valve after a successful [`wait_to_enter`](Self::wait_to_enter)
    pub async fn exit(&self, item: &T) -> Result<()> {
        self.check()?;
        // Saturate rather than wrap if exit is called without a matching entry
        let _ = self
            .inside
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        self.handler.release(item).await;
        Ok(())
    }

    pub fn set_threshold(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::Release);
    }

    pub fn threshold(&self) -> usize {
        self.threshold.load(Ordering::Acquire)
    }

    /// Callers currently waiting for admission
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Callers admitted and not yet exited
    pub fn inside(&self) -> usize {
        self.inside.load(Ordering::Acquire)
    }

    /// Makes every later call fail with [`CrawlError::Disposed`]
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Self::disposed_error())
        } else {
            Ok(())
        }
    }

    fn disposed_error() -> CrawlError {
        CrawlError::Disposed {
            what: "pressure valve",
        }
    }
}
