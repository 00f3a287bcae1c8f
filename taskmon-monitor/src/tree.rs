//! Arena holding every activity of one task run.
//!
//! Nodes refer to each other by id only: a child names its parent, a parent
//! lists its children in its allocation collection. Nothing is owned across
//! nodes, so removing a subtree never leaves a dangling reference.

use crate::activity::{Activity, ActivitySnapshot, NewActivity};
use std::collections::HashMap;
use std::time::Duration;
use taskmon_core::{ActivityId, ActivityStatus, ExecutionState, UsageError, FULL_PERCENT};

#[derive(Debug, Clone)]
pub(crate) struct ActivityTree {
    nodes: HashMap<ActivityId, Activity>,
    root: ActivityId,
}

impl ActivityTree {
    /// A tree holding only a root group.
    pub fn new(root: ActivityId, name: &str, description: &str) -> Self {
        let new_activity = NewActivity::group(name).description(description);
        let mut nodes = HashMap::new();
        nodes.insert(root, Activity::new(root, None, 0, new_activity, Duration::ZERO));
        Self { nodes, root }
    }

    pub fn root(&self) -> ActivityId {
        self.root
    }

    pub fn get(&self, id: ActivityId) -> Option<&Activity> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: ActivityId) -> Option<&mut Activity> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Register a Pending child under `parent`.
    ///
    /// Returns `Ok(false)` when the parent is missing or already completed.
    pub fn insert_child(
        &mut self,
        parent: ActivityId,
        id: ActivityId,
        percent: f64,
        new_activity: NewActivity,
        default_minimum_duration: Duration,
    ) -> Result<bool, UsageError> {
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return Ok(false);
        };
        if parent_node.is_completed() {
            return Ok(false);
        }
        parent_node.children.add(id, percent)?;
        let depth = parent_node.depth + 1;
        self.nodes.insert(
            id,
            Activity::new(id, Some(parent), depth, new_activity, default_minimum_duration),
        );
        Ok(true)
    }

    /// Remove an activity and everything below it. The root cannot be
    /// removed.
    pub fn remove_subtree(&mut self, id: ActivityId) -> usize {
        if id == self.root {
            return 0;
        }
        let Some(parent) = self.nodes.get(&id).and_then(|a| a.parent) else {
            return 0;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.remove(id);
        }

        let mut doomed = self.descendants_post_order(id);
        doomed.push(id);
        doomed
            .into_iter()
            .filter(|d| self.nodes.remove(d).is_some())
            .count()
    }

    pub fn children(&self, id: ActivityId) -> Vec<ActivityId> {
        self.nodes
            .get(&id)
            .map(|a| a.children.ids())
            .unwrap_or_default()
    }

    /// Ancestors of `id` from the root down to its parent.
    pub fn ancestors(&self, id: ActivityId) -> Vec<ActivityId> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(&id).and_then(|a| a.parent);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.nodes.get(&current).and_then(|a| a.parent);
        }
        chain.reverse();
        chain
    }

    /// Every descendant of `id`, children after their own descendants.
    pub fn descendants_post_order(&self, id: ActivityId) -> Vec<ActivityId> {
        let mut out = Vec::new();
        for child in self.children(id) {
            out.extend(self.descendants_post_order(child));
            out.push(child);
        }
        out
    }

    /// Progress of an activity: stored for leaves and completed nodes,
    /// otherwise the allocation-weighted sum of the children, capped at 100.
    pub fn relative_progress(&self, id: ActivityId) -> f64 {
        let Some(activity) = self.nodes.get(&id) else {
            return 0.0;
        };
        if activity.state == ExecutionState::Completed || !activity.has_children() {
            return activity.progress;
        }
        let derived: f64 = activity
            .children
            .iter()
            .map(|slot| slot.actual * self.relative_progress(slot.id) / FULL_PERCENT)
            .sum();
        derived.min(FULL_PERCENT)
    }

    /// Error and warning totals for an activity and all its descendants.
    pub fn subtree_counts(&self, id: ActivityId) -> (u32, u32) {
        let Some(activity) = self.nodes.get(&id) else {
            return (0, 0);
        };
        self.children(id)
            .into_iter()
            .map(|child| self.subtree_counts(child))
            .fold(
                (activity.error_count, activity.warning_count),
                |(errors, warnings), (e, w)| (errors.saturating_add(e), warnings.saturating_add(w)),
            )
    }

    /// In-progress activities below the root, depth-first in child order.
    pub fn in_progress(&self) -> Vec<ActivityStatus> {
        let mut out = Vec::new();
        self.collect_in_progress(self.root, &mut out);
        out
    }

    fn collect_in_progress(&self, id: ActivityId, out: &mut Vec<ActivityStatus>) {
        for child in self.children(id) {
            if let Some(snapshot) = self.snapshot(child) {
                if snapshot.state == ExecutionState::InProgress {
                    out.push(snapshot.to_status());
                }
            }
            self.collect_in_progress(child, out);
        }
    }

    pub fn snapshot(&self, id: ActivityId) -> Option<ActivitySnapshot> {
        let activity = self.nodes.get(&id)?;
        let slot = activity
            .parent
            .and_then(|p| self.nodes.get(&p))
            .and_then(|p| p.children.iter().find(|s| s.id == id).copied());

        Some(ActivitySnapshot {
            id,
            parent: activity.parent,
            children: activity.children.ids(),
            name: activity.name.clone(),
            description: activity.description.clone(),
            kind: activity.kind,
            state: activity.state,
            result: activity.result,
            duration_type: activity.duration_type,
            relative_progress: self.relative_progress(id),
            requested_percent: slot.map(|s| s.requested),
            allocated_percent: slot.map(|s| s.actual),
            current_count: activity.current_count,
            maximum_count: activity.maximum_count,
            error_count: activity.error_count,
            warning_count: activity.warning_count,
            started_at: activity.started_at,
            last_updated: activity.last_updated,
            ended_at: activity.ended_at,
            processing_level: activity.depth,
            status_message: activity.status_message.clone(),
            terminated: activity.terminated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ActivityId {
        ActivityId::new(raw)
    }

    fn tree_with(children: &[(u64, u64, f64)]) -> ActivityTree {
        let mut tree = ActivityTree::new(id(1), "task", "");
        for (parent, child, percent) in children {
            let new_activity = NewActivity::group(format!("a{}", child));
            assert!(tree
                .insert_child(id(*parent), id(*child), *percent, new_activity, Duration::ZERO)
                .unwrap());
        }
        tree
    }

    fn set_leaf(tree: &mut ActivityTree, raw: u64, progress: f64) {
        tree.get_mut(id(raw)).unwrap().raise_progress(progress);
    }

    #[test]
    fn test_three_level_progress() {
        // root ─┬─ 2 (60%) ─┬─ 4 (50%)
        //       │           └─ 5 (soft → 50%)
        //       └─ 3 (soft → 40%)
        let mut tree = tree_with(&[(1, 2, 60.0), (1, 3, 0.0), (2, 4, 50.0), (2, 5, 0.0)]);
        set_leaf(&mut tree, 4, 100.0);
        set_leaf(&mut tree, 5, 50.0);
        set_leaf(&mut tree, 3, 25.0);

        // node 2 = 50*1.0 + 50*0.5 = 75; root = 60*0.75 + 40*0.25 = 55
        assert!((tree.relative_progress(id(2)) - 75.0).abs() < 1e-9);
        assert!((tree.relative_progress(id(1)) - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_depths_and_ancestors() {
        let tree = tree_with(&[(1, 2, 0.0), (2, 3, 0.0)]);
        assert_eq!(tree.get(id(3)).unwrap().depth, 2);
        assert_eq!(tree.ancestors(id(3)), vec![id(1), id(2)]);
        assert!(tree.ancestors(id(1)).is_empty());
    }

    #[test]
    fn test_post_order_lists_children_before_parents() {
        let tree = tree_with(&[(1, 2, 0.0), (2, 3, 0.0), (2, 4, 0.0), (1, 5, 0.0)]);
        assert_eq!(
            tree.descendants_post_order(id(1)),
            vec![id(3), id(4), id(2), id(5)]
        );
    }

    #[test]
    fn test_insert_under_missing_or_completed_parent() {
        let mut tree = tree_with(&[(1, 2, 0.0)]);
        let new_activity = NewActivity::group("x");
        assert!(!tree
            .insert_child(id(9), id(10), 0.0, new_activity.clone(), Duration::ZERO)
            .unwrap());

        tree.get_mut(id(2)).unwrap().state = ExecutionState::Completed;
        assert!(!tree
            .insert_child(id(2), id(11), 0.0, new_activity, Duration::ZERO)
            .unwrap());
    }

    #[test]
    fn test_remove_subtree_reallocates() {
        let mut tree = tree_with(&[(1, 2, 0.0), (1, 3, 0.0), (2, 4, 0.0)]);
        assert_eq!(tree.remove_subtree(id(2)), 2);
        assert!(!tree.contains(id(4)));
        assert_eq!(tree.get(id(1)).unwrap().children.actual(id(3)), Some(100.0));
        assert_eq!(tree.remove_subtree(id(1)), 0);
    }

    #[test]
    fn test_subtree_counts() {
        let mut tree = tree_with(&[(1, 2, 0.0), (2, 3, 0.0)]);
        tree.get_mut(id(2)).unwrap().warning_count = 2;
        tree.get_mut(id(3)).unwrap().error_count = 1;
        assert_eq!(tree.subtree_counts(id(1)), (1, 2));
        assert_eq!(tree.subtree_counts(id(3)), (1, 0));
    }

    #[test]
    fn test_in_progress_is_depth_first() {
        let mut tree = tree_with(&[(1, 2, 0.0), (2, 3, 0.0), (1, 4, 0.0)]);
        for raw in [2, 3, 4] {
            tree.get_mut(id(raw)).unwrap().mark_started();
        }
        let order: Vec<ActivityId> = tree.in_progress().into_iter().map(|s| s.id).collect();
        assert_eq!(order, vec![id(2), id(3), id(4)]);
    }

    #[test]
    fn test_snapshot_carries_allocation() {
        let tree = tree_with(&[(1, 2, 30.0), (1, 3, 0.0)]);
        let snapshot = tree.snapshot(id(3)).unwrap();
        assert_eq!(snapshot.requested_percent, Some(0.0));
        assert_eq!(snapshot.allocated_percent, Some(70.0));
        assert!(tree.snapshot(id(1)).unwrap().allocated_percent.is_none());
    }
}
