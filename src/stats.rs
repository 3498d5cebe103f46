//! Keeps track of what a [Group](crate::group::Group) is doing.
//!
//! All counters are plain atomics so that they can be updated from any task without further
//! locking. They are monotonic and only meant for monitoring - e.g. to render a status page or to
//! emit log lines.
//!
//! # Example
//!
//! ```
//! # use peercache::stats::Average;
//! let avg = Average::new();
//! avg.add(10);
//! avg.add(20);
//! avg.add(30);
//!
//! assert_eq!(avg.avg(), 20);
//! assert_eq!(avg.count(), 3);
//! ```
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fmt::format_short_duration;

/// Computes the average of a series of values (most probably durations in microseconds).
#[derive(Default)]
pub struct Average {
    total: AtomicU64,
    count: AtomicU64,
}

impl Average {
    /// Creates a new average.
    pub fn new() -> Average {
        Average::default()
    }

    /// Records another value.
    pub fn add(&self, value: u64) {
        let _ = self.total.fetch_add(value, Ordering::Relaxed);
        let _ = self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of recorded values.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the average of all recorded values or 0 if none were recorded.
    pub fn avg(&self) -> u64 {
        match self.count() {
            0 => 0,
            count => self.total.load(Ordering::Relaxed) / count,
        }
    }
}

impl Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", format_short_duration(self.avg()), self.count())
    }
}

/// Counts the lookups of a group and how they were resolved.
#[derive(Default)]
pub struct GroupStats {
    pub(crate) gets: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) loads: AtomicU64,
    pub(crate) peer_loads: AtomicU64,
    pub(crate) peer_errors: AtomicU64,
    pub(crate) local_loads: AtomicU64,
    pub(crate) loader_errors: AtomicU64,
    pub(crate) load_duration: Average,
}

pub(crate) fn increment(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

impl GroupStats {
    /// Returns the number of lookups (including the ones rejected due to an empty key).
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups answered by the local cache.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of cache misses which were actually resolved by this node - i.e.
    /// lookups which weren't collapsed onto an already running resolution.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the number of values successfully fetched from a peer.
    pub fn peer_loads(&self) -> u64 {
        self.peer_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed peer fetches (which then fell back to the local loader).
    pub fn peer_errors(&self) -> u64 {
        self.peer_errors.load(Ordering::Relaxed)
    }

    /// Returns the number of values successfully provided by the local loader.
    pub fn local_loads(&self) -> u64 {
        self.local_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed invocations of the local loader.
    pub fn loader_errors(&self) -> u64 {
        self.loader_errors.load(Ordering::Relaxed)
    }

    /// Returns the average duration of a resolution (peer fetch and/or loader) in microseconds.
    pub fn load_duration(&self) -> &Average {
        &self.load_duration
    }
}

impl Display for GroupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<30} {:>12}", "Gets", self.gets())?;
        writeln!(f, "{:<30} {:>12}", "Cache Hits", self.cache_hits())?;
        writeln!(f, "{:<30} {:>12}", "Loads", self.loads())?;
        writeln!(f, "{:<30} {:>12}", "Peer Loads", self.peer_loads())?;
        writeln!(f, "{:<30} {:>12}", "Peer Errors", self.peer_errors())?;
        writeln!(f, "{:<30} {:>12}", "Local Loads", self.local_loads())?;
        writeln!(f, "{:<30} {:>12}", "Loader Errors", self.loader_errors())?;
        writeln!(
            f,
            "{:<30} {:>12}",
            "Load Duration",
            self.load_duration.to_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::stats::{increment, Average, GroupStats};

    #[test]
    fn empty_average_is_properly_initialized() {
        let avg = Average::new();
        assert_eq!(avg.avg(), 0);
        assert_eq!(avg.count(), 0);
    }

    #[test]
    fn formatting_average_works() {
        let avg = Average::new();
        avg.add(10_123);
        assert_eq!(format!("{}", avg), "10.1 ms (1)");
    }

    #[test]
    fn counters_show_up_in_the_report() {
        let stats = GroupStats::default();
        increment(&stats.gets);
        increment(&stats.gets);
        increment(&stats.peer_errors);

        assert_eq!(stats.gets(), 2);
        let report = stats.to_string();
        assert_eq!(report.lines().next().unwrap().ends_with(" 2"), true);
        assert_eq!(report.contains("Peer Errors"), true);
    }
}
