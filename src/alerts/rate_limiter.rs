use crate::events::{NotificationRecord, Timestamp};
use chrono::Duration;
use std::collections::VecDeque;

/// Maximum number of notification records kept for accounting
pub const MAX_NOTIFICATION_RECORDS: usize = 1000;

/// Log of dispatch attempts used to enforce the hourly notification cap
///
/// Uses a sliding one-hour window over the recorded attempts. The log itself
/// is bounded by count, not by age, so statistics can look further back than
/// the rate window.
#[derive(Debug)]
pub struct NotificationLog {
    /// Maximum number of notifications allowed per hour
    max_per_hour: usize,
    /// Maximum number of records retained
    capacity: usize,
    /// Recorded attempts, oldest first
    records: VecDeque<NotificationRecord>,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(10) // Default: 10 notifications per hour
    }
}

impl NotificationLog {
    /// Create a log enforcing `max_per_hour` with the default record capacity
    pub fn new(max_per_hour: usize) -> Self {
        Self::with_capacity(max_per_hour, MAX_NOTIFICATION_RECORDS)
    }

    /// Create a log with an explicit record capacity
    ///
    /// # Arguments
    ///
    /// * `max_per_hour` - Maximum number of notifications allowed per hour
    /// * `capacity` - Maximum number of records kept; the oldest are evicted first
    pub fn with_capacity(max_per_hour: usize, capacity: usize) -> Self {
        Self {
            max_per_hour,
            capacity,
            records: VecDeque::new(),
        }
    }

    pub fn max_per_hour(&self) -> usize {
        self.max_per_hour
    }

    /// Record a dispatch attempt
    pub fn record(&mut self, record: NotificationRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Fill in the delivery counts of the newest record for `error_id`
    ///
    /// Returns `false` when no such record is retained.
    pub fn complete(&mut self, error_id: &str, successful: usize, failed: usize) -> bool {
        match self.records.iter_mut().rev().find(|r| r.error_id == error_id) {
            Some(record) => {
                record.successful = successful;
                record.failed = failed;
                true
            }
            None => false,
        }
    }

    /// Drop the newest record for `error_id`
    pub fn remove(&mut self, error_id: &str) -> bool {
        match self.records.iter().rposition(|r| r.error_id == error_id) {
            Some(index) => self.records.remove(index).is_some(),
            None => false,
        }
    }

    /// Whether the hourly cap is already reached at `now`
    pub fn is_limited(&self, now: Timestamp) -> bool {
        self.current_count(now) >= self.max_per_hour
    }

    /// Number of attempts recorded within the hour before `now`
    pub fn current_count(&self, now: Timestamp) -> usize {
        self.count_since(now - Duration::hours(1))
    }

    /// Notifications still allowed in the current window
    pub fn remaining(&self, now: Timestamp) -> usize {
        self.max_per_hour.saturating_sub(self.current_count(now))
    }

    /// Number of attempts with `timestamp > cutoff`
    pub fn count_since(&self, cutoff: Timestamp) -> usize {
        self.records
            .iter()
            .filter(|record| record.timestamp > cutoff)
            .count()
    }

    /// Attempts with `timestamp > cutoff`
    pub fn records_since(&self, cutoff: Timestamp) -> Vec<&NotificationRecord> {
        self.records
            .iter()
            .filter(|record| record.timestamp > cutoff)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest retained record
    pub fn oldest(&self) -> Option<&NotificationRecord> {
        self.records.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use chrono::Utc;

    fn attempt(error_id: &str, timestamp: Timestamp) -> NotificationRecord {
        NotificationRecord {
            error_id: error_id.to_string(),
            timestamp,
            successful: 1,
            failed: 0,
            severity: Severity::High,
            fingerprint: "fp".to_string(),
        }
    }

    #[test]
    fn test_log_allows_within_limit() {
        let mut log = NotificationLog::new(3);
        let now = Utc::now();

        for i in 0..3 {
            assert!(!log.is_limited(now));
            log.record(attempt(&i.to_string(), now));
        }

        // Fourth should be blocked
        assert!(log.is_limited(now));
        assert_eq!(log.remaining(now), 0);
    }

    #[test]
    fn test_log_sliding_window() {
        let mut log = NotificationLog::new(2);
        let now = Utc::now();

        log.record(attempt("a", now - Duration::minutes(50)));
        log.record(attempt("b", now - Duration::minutes(10)));
        assert!(log.is_limited(now));

        // 15 minutes later the first attempt has left the window
        let later = now + Duration::minutes(15);
        assert!(!log.is_limited(later));
        assert_eq!(log.current_count(later), 1);
    }

    #[test]
    fn test_log_window_boundary_is_exclusive() {
        let mut log = NotificationLog::new(1);
        let now = Utc::now();

        log.record(attempt("a", now - Duration::hours(1)));
        assert!(!log.is_limited(now));

        log.record(attempt("b", now - Duration::hours(1) + Duration::milliseconds(1)));
        assert!(log.is_limited(now));
    }

    #[test]
    fn test_log_keeps_history_beyond_window() {
        let mut log = NotificationLog::new(5);
        let now = Utc::now();

        log.record(attempt("old", now - Duration::hours(5)));
        log.record(attempt("new", now));

        assert_eq!(log.len(), 2);
        assert_eq!(log.current_count(now), 1);
        assert_eq!(log.count_since(now - Duration::hours(6)), 2);
    }

    #[test]
    fn test_complete_updates_reserved_record() {
        let mut log = NotificationLog::new(5);
        let now = Utc::now();

        let mut pending = attempt("a", now);
        pending.successful = 0;
        log.record(pending);
        assert_eq!(log.current_count(now), 1);

        assert!(log.complete("a", 2, 1));
        let record = log.records_since(now - Duration::minutes(1))[0];
        assert_eq!((record.successful, record.failed), (2, 1));
        assert!(!log.complete("missing", 1, 0));
    }

    #[test]
    fn test_remove_frees_a_slot() {
        let mut log = NotificationLog::new(1);
        let now = Utc::now();

        log.record(attempt("a", now));
        assert!(log.is_limited(now));
        assert!(log.remove("a"));
        assert!(!log.is_limited(now));
        assert!(!log.remove("a"));
    }

    #[test]
    fn test_log_capacity_evicts_oldest() {
        let mut log = NotificationLog::new(10);
        let now = Utc::now();

        for i in 0..=MAX_NOTIFICATION_RECORDS {
            log.record(attempt(&i.to_string(), now));
        }

        assert_eq!(log.len(), MAX_NOTIFICATION_RECORDS);
        assert_eq!(log.oldest().map(|r| r.error_id.as_str()), Some("1"));
    }
}
