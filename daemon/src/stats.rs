//! Frame hand-in statistics
//!
//! Counts what happened to every decoded frame: rendered, superseded by a
//! newer frame in the same cycle, or discarded by the identity filter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Why a frame never reached the shared buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// From a session that was since stopped or replaced
    StaleSession,
    /// From the handover controller
    HandoverRole,
    /// Playback not running
    NotRunning,
    /// Length does not match the current buffer
    SizeMismatch,
    /// A newer active frame arrived in the same cycle
    Superseded,
}

pub struct CycleStats {
    pub(crate) cycles: u64,
    pub(crate) frames_rendered: u64,
    pub(crate) stale: u64,
    pub(crate) handover: u64,
    pub(crate) not_running: u64,
    pub(crate) mismatched: u64,
    pub(crate) superseded: u64,

    /// Frames dropped by the streaming threads (queue full)
    frames_dropped: Arc<AtomicU64>,

    last_stats_log: Instant,
}

impl CycleStats {
    pub fn new() -> Self {
        Self {
            cycles: 0,
            frames_rendered: 0,
            stale: 0,
            handover: 0,
            not_running: 0,
            mismatched: 0,
            superseded: 0,
            frames_dropped: Arc::new(AtomicU64::new(0)),
            last_stats_log: Instant::now(),
        }
    }

    /// Get clone of the dropped counter for frame senders
    pub fn frames_dropped_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_dropped)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn record_discard(&mut self, reason: Discard) {
        let counter = match reason {
            Discard::StaleSession => &mut self.stale,
            Discard::HandoverRole => &mut self.handover,
            Discard::NotRunning => &mut self.not_running,
            Discard::SizeMismatch => &mut self.mismatched,
            Discard::Superseded => &mut self.superseded,
        };
        *counter += 1;
    }

    pub fn discarded(&self) -> u64 {
        self.stale + self.handover + self.not_running + self.mismatched + self.superseded
    }

    /// Share of delivered or dropped frames that were never shown, as percentage
    pub fn discard_rate(&self) -> f64 {
        let lost = self.discarded() + self.frames_dropped();
        let total = self.frames_rendered + lost;
        if total == 0 {
            0.0
        } else {
            (lost as f64 / total as f64) * 100.0
        }
    }

    /// Log statistics if interval has elapsed
    pub fn maybe_log_stats(&mut self, interval: Duration) {
        if self.last_stats_log.elapsed() < interval {
            return;
        }

        log::info!(
            "Cycle stats: {} cycles, {} frames rendered, {} discarded, {} dropped ({:.1}% lost)",
            self.cycles,
            self.frames_rendered,
            self.discarded(),
            self.frames_dropped(),
            self.discard_rate()
        );
        log::debug!(
            "Discards: {} stale, {} handover, {} not running, {} size mismatch, {} superseded",
            self.stale,
            self.handover,
            self.not_running,
            self.mismatched,
            self.superseded
        );

        self.last_stats_log = Instant::now();
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}
