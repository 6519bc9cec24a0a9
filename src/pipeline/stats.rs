//! Pipeline counters
//!
//! Every stage bumps its own counters; a [`StatsSnapshot`] is taken for
//! logging and for the summary printed at shutdown.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by all stages
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) submitted: AtomicU64,
    pub(crate) duplicates: AtomicU64,
    pub(crate) foreign: AtomicU64,
    pub(crate) fresh: AtomicU64,
    pub(crate) enriched: AtomicU64,
    pub(crate) accepted: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) fetched: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) shed: AtomicU64,
    pub(crate) dropped: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            submitted: get(&self.submitted),
            duplicates: get(&self.duplicates),
            foreign: get(&self.foreign),
            fresh: get(&self.fresh),
            enriched: get(&self.enriched),
            accepted: get(&self.accepted),
            rejected: get(&self.rejected),
            fetched: get(&self.fetched),
            failed: get(&self.failed),
            shed: get(&self.shed),
            dropped: get(&self.dropped),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Links handed to intake
    pub submitted: u64,
    /// Links already seen recently
    pub duplicates: u64,
    /// Links whose host belongs to another node's partition
    pub foreign: u64,
    /// Links visited recently enough to skip
    pub fresh: u64,
    /// Links that made it through enrichment
    pub enriched: u64,
    /// Items accepted by validation
    pub accepted: u64,
    /// Items rejected by validation
    pub rejected: u64,
    /// Fetches that completed with a success status
    pub fetched: u64,
    /// Fetches that completed with an error status or network failure
    pub failed: u64,
    /// Items shed by the pressure valve
    pub shed: u64,
    /// Items dropped without a fetch (no IP, abandoned host, full requeue)
    pub dropped: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={} duplicates={} foreign={} fresh={} enriched={} accepted={} rejected={} fetched={} failed={} shed={} dropped={}",
            self.submitted,
            self.duplicates,
            self.foreign,
            self.fresh,
            self.enriched,
            self.accepted,
            self.rejected,
            self.fetched,
            self.failed,
            self.shed,
            self.dropped
        )
    }
}

/// Prints a summary to stdout in a formatted manner
pub fn print_summary(stats: &StatsSnapshot) {
    println!("=== Pipeline Summary ===\n");

    println!("Intake:");
    println!("  Links submitted: {}", stats.submitted);
    println!("  Duplicates: {}", stats.duplicates);
    println!("  Other partitions: {}", stats.foreign);
    println!("  Recently visited: {}", stats.fresh);
    println!("  Enriched: {}", stats.enriched);
    println!();

    println!("Validation:");
    println!("  Accepted: {}", stats.accepted);
    println!("  Rejected: {}", stats.rejected);
    println!();

    println!("Fetching:");
    println!("  Fetched: {}", stats.fetched);
    println!("  Failed: {}", stats.failed);
    println!("  Shed under pressure: {}", stats.shed);
    println!("  Dropped: {}", stats.dropped);
    println!();

    let attempted = stats.fetched + stats.failed;
    let success_rate = if attempted > 0 {
        (stats.fetched as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Success Rate: {:.1}% ({} / {} fetches)",
        success_rate, stats.fetched, attempted
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let stats = PipelineStats::new();
        PipelineStats::add(&stats.submitted, 3);
        PipelineStats::add(&stats.fetched, 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 3);
        assert_eq!(snapshot.fetched, 1);
        assert_eq!(snapshot.rejected, 0);
        assert!(snapshot.to_string().starts_with("submitted=3 "));
    }
}
