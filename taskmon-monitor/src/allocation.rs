//! Weighted allocation of a parent's progress among its children.
//!
//! Every child asks for a share of its parent's 0-100 range. A positive
//! request is *hard* and is honored as-is; a request of exactly zero is
//! *soft* and splits whatever the hard requests leave over:
//!
//! ```text
//! requests: [30, 0, 20, 0]   hard_total = 50, soft_count = 2
//! actual:   [30, 25, 20, 25]
//! ```
//!
//! Over-subscription (`hard_total > 100`) scales the hard shares down to sum
//! to 100 and gives soft children nothing. Under-subscription with no soft
//! children keeps the requests, leaving room for siblings added later.

use taskmon_core::{ActivityId, UsageError, FULL_PERCENT, PERCENT_EPSILON};

/// Reject requests that are negative or not finite.
pub fn validate_percent(value: f64) -> Result<f64, UsageError> {
    if !value.is_finite() || value < 0.0 {
        return Err(UsageError::InvalidPercent { value });
    }
    Ok(value)
}

/// Compute actual shares for a set of requests, in input order.
pub fn allocate(requests: &[f64]) -> Vec<f64> {
    let is_hard = |r: f64| r > 0.0;
    let hard_total: f64 = requests.iter().copied().filter(|r| is_hard(*r)).sum();
    let soft_count = requests.iter().filter(|r| !is_hard(**r)).count();

    if hard_total > FULL_PERCENT + PERCENT_EPSILON {
        let scale = FULL_PERCENT / hard_total;
        return requests
            .iter()
            .map(|r| if is_hard(*r) { r * scale } else { 0.0 })
            .collect();
    }

    let soft_share = if soft_count > 0 {
        (FULL_PERCENT - hard_total).max(0.0) / soft_count as f64
    } else {
        0.0
    };

    requests
        .iter()
        .map(|r| if is_hard(*r) { *r } else { soft_share })
        .collect()
}

/// One child's slot in a collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub id: ActivityId,
    /// Share the child asked for; 0 means "split the remainder".
    pub requested: f64,
    /// Share the child currently holds.
    pub actual: f64,
}

/// Ordered children of one activity together with their allocations.
///
/// Every mutation recomputes all actual shares before returning.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityCollection {
    parent: ActivityId,
    entries: Vec<Allocation>,
}

impl ActivityCollection {
    pub fn new(parent: ActivityId) -> Self {
        Self {
            parent,
            entries: Vec::new(),
        }
    }

    pub fn parent(&self) -> ActivityId {
        self.parent
    }

    /// Append a child, or change its request if it is already a member.
    pub fn add(&mut self, id: ActivityId, requested: f64) -> Result<(), UsageError> {
        let requested = validate_percent(requested)?;
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.requested = requested,
            None => self.entries.push(Allocation {
                id,
                requested,
                actual: 0.0,
            }),
        }
        self.recalculate();
        Ok(())
    }

    pub fn remove(&mut self, id: ActivityId) -> Option<Allocation> {
        let index = self.position(id)?;
        let removed = self.entries.remove(index);
        self.recalculate();
        Some(removed)
    }

    /// Move a child to `index` (clamped to the end). Returns `false` if the
    /// child is not a member.
    pub fn move_to(&mut self, id: ActivityId, index: usize) -> bool {
        let Some(current) = self.position(id) else {
            return false;
        };
        let entry = self.entries.remove(current);
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        self.recalculate();
        true
    }

    fn position(&self, id: ActivityId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn recalculate(&mut self) {
        let requests: Vec<f64> = self.entries.iter().map(|e| e.requested).collect();
        for (entry, actual) in self.entries.iter_mut().zip(allocate(&requests)) {
            entry.actual = actual;
        }
        tracing::debug!(
            parent = %self.parent,
            children = self.entries.len(),
            total = self.total_actual(),
            "Allocations recalculated"
        );
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> Vec<ActivityId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn actual(&self, id: ActivityId) -> Option<f64> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.actual)
    }

    pub fn requested(&self, id: ActivityId) -> Option<f64> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.requested)
    }

    pub fn total_actual(&self) -> f64 {
        self.entries.iter().map(|e| e.actual).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ActivityId {
        ActivityId::new(raw)
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_mixed_hard_and_soft() {
        assert_close(&allocate(&[30.0, 0.0, 20.0, 0.0]), &[30.0, 25.0, 20.0, 25.0]);
    }

    #[test]
    fn test_all_soft_split_evenly() {
        assert_close(&allocate(&[0.0, 0.0, 0.0, 0.0]), &[25.0, 25.0, 25.0, 25.0]);
    }

    #[test]
    fn test_hard_overflow_scales_down() {
        assert_close(&allocate(&[80.0, 40.0, 0.0]), &[200.0 / 3.0, 100.0 / 3.0, 0.0]);
    }

    #[test]
    fn test_hard_underflow_without_soft_keeps_requests() {
        assert_close(&allocate(&[30.0, 20.0]), &[30.0, 20.0]);
    }

    #[test]
    fn test_exact_hundred_leaves_soft_empty() {
        assert_close(&allocate(&[60.0, 40.0, 0.0]), &[60.0, 40.0, 0.0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(allocate(&[]).is_empty());
    }

    #[test]
    fn test_rejects_bad_requests() {
        assert!(validate_percent(-1.0).is_err());
        assert!(validate_percent(f64::NAN).is_err());
        assert!(validate_percent(f64::INFINITY).is_err());
        assert_eq!(validate_percent(0.0), Ok(0.0));
    }

    #[test]
    fn test_collection_recalculates_on_every_mutation() {
        let mut collection = ActivityCollection::new(id(1));
        collection.add(id(2), 40.0).unwrap();
        collection.add(id(3), 0.0).unwrap();
        assert_eq!(collection.actual(id(3)), Some(60.0));

        collection.add(id(4), 0.0).unwrap();
        assert_eq!(collection.actual(id(3)), Some(30.0));
        assert_eq!(collection.actual(id(4)), Some(30.0));

        let removed = collection.remove(id(2)).unwrap();
        assert_eq!(removed.requested, 40.0);
        assert_eq!(collection.actual(id(3)), Some(50.0));
        assert!(collection.remove(id(2)).is_none());
    }

    #[test]
    fn test_collection_rejects_negative_request() {
        let mut collection = ActivityCollection::new(id(1));
        let err = collection.add(id(2), -5.0).unwrap_err();
        assert_eq!(err, UsageError::InvalidPercent { value: -5.0 });
        assert!(collection.is_empty());
    }

    #[test]
    fn test_move_to_reorders() {
        let mut collection = ActivityCollection::new(id(1));
        for raw in 2..=4 {
            collection.add(id(raw), 0.0).unwrap();
        }
        assert!(collection.move_to(id(4), 0));
        assert_eq!(collection.ids(), vec![id(4), id(2), id(3)]);
        assert!(collection.move_to(id(4), 99));
        assert_eq!(collection.ids(), vec![id(2), id(3), id(4)]);
        assert!(!collection.move_to(id(9), 0));
    }

    #[test]
    fn test_re_adding_updates_request() {
        let mut collection = ActivityCollection::new(id(1));
        collection.add(id(2), 10.0).unwrap();
        collection.add(id(2), 70.0).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.requested(id(2)), Some(70.0));
    }
}
