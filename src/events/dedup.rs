//! Cooldown cache for schema event deduplication.
//!
//! One instance per process, owned by the top-level assembly and shared by reference.
//! Expiry is a sliding window: entries older than the cooldown are pruned lazily on each
//! access, and an entry still inside its window is never evicted.

use super::event::NormalizedSubject;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

pub struct DedupCache {
    cooldown: Duration,
    entries: Mutex<HashMap<NormalizedSubject, Instant>>,
}

impl DedupCache {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Atomically check and record `subject` at `now`.
    ///
    /// Returns `true` when the subject was accepted (no live entry existed) and `false` when it
    /// falls inside the cooldown of a previous acceptance. A rejected repeat does not extend
    /// the window.
    pub fn check_and_record(&self, subject: &NormalizedSubject, now: Instant) -> bool {
        let cooldown = self.cooldown;
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        entries.retain(|_, seen| now.saturating_duration_since(*seen) < cooldown);

        if entries.contains_key(subject) {
            trace!("Suppressing {} inside {:?} cooldown", subject, cooldown);
            return false;
        }
        entries.insert(subject.clone(), now);
        true
    }

    /// Number of live (unexpired at last access) entries
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(name: &str) -> NormalizedSubject {
        NormalizedSubject::new("public", name)
    }

    #[test]
    fn test_repeat_inside_window_is_rejected() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.check_and_record(&subject("orders"), t0));
        assert!(!cache.check_and_record(&subject("orders"), t0 + Duration::from_secs(2)));
        assert!(cache.check_and_record(&subject("orders"), t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_rejected_repeat_does_not_extend_window() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.check_and_record(&subject("orders"), t0));
        assert!(!cache.check_and_record(&subject("orders"), t0 + Duration::from_secs(4)));
        assert!(cache.check_and_record(&subject("orders"), t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_distinct_subjects_are_independent() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.check_and_record(&subject("orders"), t0));
        assert!(cache.check_and_record(&subject("customers"), t0));
        assert!(cache.check_and_record(&NormalizedSubject::new("sales", "orders"), t0));
    }

    #[test]
    fn test_expired_entries_are_pruned_but_live_ones_survive() {
        let cache = DedupCache::default();
        let t0 = Instant::now();
        for i in 0..200 {
            assert!(cache.check_and_record(&subject(&format!("old_{}", i)), t0));
        }
        let t1 = t0 + Duration::from_secs(3);
        assert!(cache.check_and_record(&subject("recent"), t1));

        // Old entries expire at t0 + 5s, "recent" is still live at t0 + 7s.
        let t2 = t0 + Duration::from_secs(7);
        assert!(!cache.check_and_record(&subject("recent"), t2));
        assert_eq!(cache.len(), 1);
    }
}
