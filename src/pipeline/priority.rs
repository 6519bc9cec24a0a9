//! Priority assignment
//!
//! Priorities are computed per batch, since the useful signals (same-host
//! links, how much is already queued for a host) only mean something across a
//! batch. Lower values are fetched sooner.

use crate::state::{WorkItem, NEVER_PRIORITY};
use rand::Rng;

/// Added to links that point back at the page's own host
pub const SAME_HOST_PENALTY: u32 = 10_000;

/// Added to links that were visited before and are due again
pub const REVISIT_PENALTY: u32 = 100_000;

/// Assigns priorities to a batch in place
pub trait PriorityModel: Send + Sync {
    fn calculate(&self, items: &mut [WorkItem]);
}

/// Random base per batch plus fixed penalties
///
/// Items without a resolved IP get [`NEVER_PRIORITY`].
#[derive(Debug, Clone, Copy)]
pub struct DefaultPriorityModel {
    base_range: u32,
}

impl DefaultPriorityModel {
    pub fn new(base_range: u32) -> Self {
        Self {
            base_range: base_range.max(1),
        }
    }
}

impl Default for DefaultPriorityModel {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl PriorityModel for DefaultPriorityModel {
    fn calculate(&self, items: &mut [WorkItem]) {
        let base = rand::thread_rng().gen_range(0..self.base_range);

        for item in items.iter_mut() {
            if item.ip.is_none() {
                item.priority = NEVER_PRIORITY;
                continue;
            }

            let mut priority = base;
            if item.is_same_host_link() {
                priority = priority.saturating_add(SAME_HOST_PENALTY);
            }
            if item.revisit {
                priority = priority.saturating_add(REVISIT_PENALTY);
            }
            item.priority = priority;
        }
    }
}
