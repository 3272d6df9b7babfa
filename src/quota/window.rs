//! Time-bucketed rolling counter.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Identifies the bucket a call was counted into, so it can be released later.
pub type BucketId = u64;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    id: BucketId,
    count: u64,
}

/// Counts events over the last `buckets * bucket_width` of wall-clock time.
///
/// Buckets are aligned to a shared `epoch`, so every window built from the
/// same epoch agrees on bucket boundaries. Idle periods simply let old
/// buckets fall off the back.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    epoch: Instant,
    bucket_width: Duration,
    buckets: u32,
    slots: VecDeque<Bucket>,
}

impl RollingWindow {
    pub fn new(epoch: Instant, bucket_width: Duration, buckets: u32) -> Self {
        Self {
            epoch,
            bucket_width: bucket_width.max(Duration::from_millis(1)),
            buckets: buckets.max(1),
            slots: VecDeque::new(),
        }
    }

    fn bucket_of(&self, now: Instant) -> BucketId {
        let elapsed = now.saturating_duration_since(self.epoch);
        (elapsed.as_nanos() / self.bucket_width.as_nanos()) as u64
    }

    fn evict(&mut self, current: BucketId) {
        let oldest = current.saturating_sub(u64::from(self.buckets) - 1);
        while self.slots.front().is_some_and(|b| b.id < oldest) {
            self.slots.pop_front();
        }
    }

    /// Count one event at `now`.
    pub fn record(&mut self, now: Instant) -> BucketId {
        let id = self.bucket_of(now);
        self.evict(id);
        match self.slots.back_mut() {
            Some(last) if last.id == id => last.count += 1,
            // Out-of-order timestamps land in the newest bucket.
            Some(last) if last.id > id => {
                last.count += 1;
                return last.id;
            }
            _ => self.slots.push_back(Bucket { id, count: 1 }),
        }
        id
    }

    /// Undo one event previously recorded into `bucket`.
    ///
    /// A no-op if the bucket already rolled out of the window.
    pub fn release(&mut self, bucket: BucketId) {
        if let Some(slot) = self.slots.iter_mut().find(|b| b.id == bucket) {
            slot.count = slot.count.saturating_sub(1);
        }
    }

    /// Events in the window ending at `now`.
    pub fn count(&mut self, now: Instant) -> u64 {
        self.evict(self.bucket_of(now));
        self.slots.iter().map(|b| b.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(epoch: Instant) -> RollingWindow {
        RollingWindow::new(epoch, Duration::from_secs(60), 60)
    }

    #[test]
    fn test_counts_within_window() {
        let epoch = Instant::now();
        let mut w = window(epoch);
        w.record(epoch);
        w.record(epoch + Duration::from_secs(30));
        w.record(epoch + Duration::from_secs(90));
        assert_eq!(w.count(epoch + Duration::from_secs(100)), 3);
    }

    #[test]
    fn test_rolls_over_by_time() {
        let epoch = Instant::now();
        let mut w = window(epoch);
        w.record(epoch);
        w.record(epoch + Duration::from_secs(1800));
        assert_eq!(w.count(epoch + Duration::from_secs(3599)), 2);
        // first bucket falls off
        assert_eq!(w.count(epoch + Duration::from_secs(3600)), 1);
        // idle for a full window
        assert_eq!(w.count(epoch + Duration::from_secs(7200)), 0);
    }

    #[test]
    fn test_release_undoes_record() {
        let epoch = Instant::now();
        let mut w = window(epoch);
        let a = w.record(epoch);
        w.record(epoch);
        w.release(a);
        assert_eq!(w.count(epoch), 1);
        w.release(a);
        w.release(a);
        assert_eq!(w.count(epoch), 0);
    }

    #[test]
    fn test_release_after_rollover_is_noop() {
        let epoch = Instant::now();
        let mut w = window(epoch);
        let old = w.record(epoch);
        let later = epoch + Duration::from_secs(4000);
        w.record(later);
        w.release(old);
        assert_eq!(w.count(later), 1);
    }
}
