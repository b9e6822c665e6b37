use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::events::{AssignmentEvent, BanditEvent};

use super::{cache::ShardedLruCache, AssignmentLogger, BanditLogger, LoggerError};

/// `(flag key, subject key)`
type CacheKey = (String, String);

/// Wraps a telemetry sink, forwarding only events whose outcome changed for the subject.
///
/// Assignments are keyed by `(flag, subject)` and compared on `(allocation, variation)`. Bandit
/// actions are keyed by `(flag, subject)` and compared on `(bandit, action)`. Each cache is a
/// bounded LRU; passing `None` as a cache size disables deduplication for that event kind.
///
/// An event is recorded in the cache only after the wrapped sink accepted it. Errors and panics
/// from the sink are returned as [`LoggerError`] and leave the cache untouched, so the event is
/// offered again next time.
pub struct DeduplicatingLogger<L> {
    inner: L,
    assignment_cache: Option<ShardedLruCache<CacheKey, (String, String)>>,
    bandit_cache: Option<ShardedLruCache<CacheKey, (String, String)>>,
}

impl<L: AssignmentLogger> DeduplicatingLogger<L> {
    /// Wrap `inner` with caches of the given sizes.
    pub fn new(
        inner: L,
        assignment_cache_size: Option<usize>,
        bandit_cache_size: Option<usize>,
    ) -> Self {
        DeduplicatingLogger {
            inner,
            assignment_cache: assignment_cache_size.map(ShardedLruCache::new),
            bandit_cache: bandit_cache_size.map(ShardedLruCache::new),
        }
    }
}

impl<L: AssignmentLogger> AssignmentLogger for DeduplicatingLogger<L> {
    fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError> {
        let key = (event.feature_flag.clone(), event.subject.clone());
        let value = (event.allocation.clone(), event.variation.clone());

        forward_deduplicated(self.assignment_cache.as_ref(), key, value, || {
            self.inner.log_assignment(event)
        })
    }

    fn as_bandit_logger(&self) -> Option<&dyn BanditLogger> {
        self.inner.as_bandit_logger().map(|_| self as &dyn BanditLogger)
    }
}

impl<L: AssignmentLogger> BanditLogger for DeduplicatingLogger<L> {
    fn log_bandit_action(&self, event: BanditEvent) -> Result<(), LoggerError> {
        let Some(inner) = self.inner.as_bandit_logger() else {
            return Ok(());
        };

        let key = (event.flag_key.clone(), event.subject.clone());
        let value = (event.bandit_key.clone(), event.action.clone());

        forward_deduplicated(self.bandit_cache.as_ref(), key, value, || {
            inner.log_bandit_action(event)
        })
    }
}

fn forward_deduplicated(
    cache: Option<&ShardedLruCache<CacheKey, (String, String)>>,
    key: CacheKey,
    value: (String, String),
    forward: impl FnOnce() -> Result<(), LoggerError>,
) -> Result<(), LoggerError> {
    if cache.is_some_and(|cache| cache.contains(&key, &value)) {
        return Ok(());
    }

    // No lock is held here, so a slow sink does not block other subjects.
    match catch_unwind(AssertUnwindSafe(forward)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(err),
        Err(_) => return Err("logger panicked".into()),
    }

    if let Some(cache) = cache {
        cache.insert(key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
    };

    use chrono::Utc;

    use super::DeduplicatingLogger;
    use crate::{
        events::{AssignmentEvent, BanditEvent},
        logger::{AssignmentLogger, BanditLogger, LoggerError},
    };

    #[derive(Clone, Default)]
    struct RecordingLogger {
        assignments: Arc<Mutex<Vec<AssignmentEvent>>>,
        bandit_actions: Arc<Mutex<Vec<BanditEvent>>>,
        fail: Arc<AtomicBool>,
        panic: Arc<AtomicBool>,
    }

    impl RecordingLogger {
        fn assignment_count(&self) -> usize {
            self.assignments.lock().unwrap().len()
        }

        fn bandit_count(&self) -> usize {
            self.bandit_actions.lock().unwrap().len()
        }
    }

    impl AssignmentLogger for RecordingLogger {
        fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError> {
            if self.panic.load(Ordering::SeqCst) {
                panic!("sink exploded");
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err("sink unavailable".into());
            }
            self.assignments.lock().unwrap().push(event);
            Ok(())
        }

        fn as_bandit_logger(&self) -> Option<&dyn BanditLogger> {
            Some(self)
        }
    }

    impl BanditLogger for RecordingLogger {
        fn log_bandit_action(&self, event: BanditEvent) -> Result<(), LoggerError> {
            self.bandit_actions.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn assignment(flag: &str, subject: &str, allocation: &str, variation: &str) -> AssignmentEvent {
        AssignmentEvent {
            feature_flag: flag.to_owned(),
            allocation: allocation.to_owned(),
            experiment: format!("{flag}-{allocation}"),
            variation: variation.to_owned(),
            subject: subject.to_owned(),
            subject_attributes: HashMap::new(),
            timestamp: Utc::now(),
            meta_data: HashMap::new(),
            extra_logging: HashMap::new(),
        }
    }

    fn bandit_action(flag: &str, subject: &str, action: &str) -> BanditEvent {
        BanditEvent {
            flag_key: flag.to_owned(),
            bandit_key: "bandit".to_owned(),
            subject: subject.to_owned(),
            action: action.to_owned(),
            action_probability: 0.5,
            optimality_gap: 0.0,
            model_version: "v1".to_owned(),
            timestamp: Utc::now(),
            subject_numeric_attributes: HashMap::new(),
            subject_categorical_attributes: HashMap::new(),
            action_numeric_attributes: HashMap::new(),
            action_categorical_attributes: HashMap::new(),
            meta_data: HashMap::new(),
        }
    }

    #[test]
    fn repeated_assignment_is_forwarded_once() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), Some(100), Some(100));

        logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .unwrap();
        logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .unwrap();

        assert_eq!(sink.assignment_count(), 1);
    }

    #[test]
    fn changed_outcome_is_forwarded_again() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), Some(100), Some(100));

        logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .unwrap();
        logger
            .log_assignment(assignment("flag", "alice", "alloc", "off"))
            .unwrap();
        logger
            .log_assignment(assignment("flag", "alice", "other-alloc", "off"))
            .unwrap();
        // Different subject and different flag are independent keys.
        logger
            .log_assignment(assignment("flag", "bob", "other-alloc", "off"))
            .unwrap();
        logger
            .log_assignment(assignment("flag-2", "alice", "other-alloc", "off"))
            .unwrap();

        assert_eq!(sink.assignment_count(), 5);
    }

    #[test]
    fn oscillating_outcome_is_always_forwarded() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), Some(100), Some(100));

        for variation in ["a", "b", "a", "b"] {
            logger
                .log_assignment(assignment("flag", "alice", "alloc", variation))
                .unwrap();
        }

        assert_eq!(sink.assignment_count(), 4);
    }

    #[test]
    fn disabled_cache_forwards_everything() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), None, None);

        for _ in 0..3 {
            logger
                .log_assignment(assignment("flag", "alice", "alloc", "on"))
                .unwrap();
        }

        assert_eq!(sink.assignment_count(), 3);
    }

    #[test]
    fn failed_delivery_is_not_cached() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), Some(100), Some(100));

        sink.fail.store(true, Ordering::SeqCst);
        assert!(logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .is_err());
        assert_eq!(sink.assignment_count(), 0);

        sink.fail.store(false, Ordering::SeqCst);
        logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .unwrap();
        assert_eq!(sink.assignment_count(), 1);
    }

    #[test]
    fn panicking_delivery_is_caught_and_not_cached() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), Some(100), Some(100));

        sink.panic.store(true, Ordering::SeqCst);
        assert!(logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .is_err());

        sink.panic.store(false, Ordering::SeqCst);
        logger
            .log_assignment(assignment("flag", "alice", "alloc", "on"))
            .unwrap();
        assert_eq!(sink.assignment_count(), 1);
    }

    #[test]
    fn bandit_actions_are_deduplicated() {
        let sink = RecordingLogger::default();
        let logger = DeduplicatingLogger::new(sink.clone(), Some(100), Some(100));

        let bandit_logger = logger.as_bandit_logger().unwrap();
        bandit_logger
            .log_bandit_action(bandit_action("flag", "alice", "nike"))
            .unwrap();
        bandit_logger
            .log_bandit_action(bandit_action("flag", "alice", "nike"))
            .unwrap();
        bandit_logger
            .log_bandit_action(bandit_action("flag", "alice", "adidas"))
            .unwrap();

        assert_eq!(sink.bandit_count(), 2);
    }

    #[test]
    fn bandit_capability_follows_inner_logger() {
        let logger = DeduplicatingLogger::new(|_event: AssignmentEvent| {}, Some(10), Some(10));
        assert!(logger.as_bandit_logger().is_none());

        let logger = DeduplicatingLogger::new(RecordingLogger::default(), Some(10), Some(10));
        assert!(logger.as_bandit_logger().is_some());
    }
}
