use std::time::Duration;

/// Ordering key of a scheduled event.
///
/// Events at the same instant run in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Duration,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, sequence: u64) -> Self {
        Self { time, sequence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_ordering_by_time_then_sequence() {
        let mut queue = BTreeMap::new();
        queue.insert(EventKey::new(Duration::from_millis(20), 0), "c");
        queue.insert(EventKey::new(Duration::from_millis(10), 2), "b");
        queue.insert(EventKey::new(Duration::from_millis(10), 1), "a");

        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
