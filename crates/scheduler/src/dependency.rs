//! Tracks tasks blocked on upstream work and releases them when the last
//! dependency completes.
//!
//! Only successful completion counts. A dependent of a task that fails or is
//! cancelled stays blocked until it is cancelled itself.

use std::collections::{HashMap, HashSet};

use cadence_core::TaskId;

#[derive(Debug, Default)]
pub struct DependencyResolver {
    /// Tasks that have reached COMPLETED.
    completed: HashSet<TaskId>,
    /// Blocked task -> dependencies still outstanding.
    waiting: HashMap<TaskId, HashSet<TaskId>>,
    /// Dependency -> blocked tasks waiting on it.
    dependents: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every id in `deps` has completed (vacuously for none).
    pub fn is_ready(&self, deps: &HashSet<TaskId>) -> bool {
        deps.iter().all(|dep| self.completed.contains(dep))
    }

    /// Register `id` as waiting on whichever of `deps` have not completed.
    ///
    /// Returns `false` (and registers nothing) when all of them already have.
    pub fn block(&mut self, id: TaskId, deps: &HashSet<TaskId>) -> bool {
        let remaining: HashSet<TaskId> = deps
            .iter()
            .filter(|dep| !self.completed.contains(dep))
            .copied()
            .collect();
        if remaining.is_empty() {
            return false;
        }
        for dep in &remaining {
            self.dependents.entry(*dep).or_default().insert(id);
        }
        self.waiting.insert(id, remaining);
        true
    }

    /// Record that `id` completed. Returns the tasks whose last outstanding
    /// dependency was `id`, in no particular order.
    pub fn on_task_completed(&mut self, id: TaskId) -> Vec<TaskId> {
        self.completed.insert(id);
        let Some(blocked) = self.dependents.remove(&id) else {
            return Vec::new();
        };

        let mut released = Vec::new();
        for dependent in blocked {
            let Some(remaining) = self.waiting.get_mut(&dependent) else {
                continue;
            };
            remaining.remove(&id);
            if remaining.is_empty() {
                self.waiting.remove(&dependent);
                released.push(dependent);
            }
        }
        released
    }

    /// Stop tracking a blocked task (e.g. it was cancelled).
    pub fn remove_waiting(&mut self, id: &TaskId) -> bool {
        let Some(remaining) = self.waiting.remove(id) else {
            return false;
        };
        for dep in remaining {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(id);
                if set.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
        true
    }

    pub fn is_waiting(&self, id: &TaskId) -> bool {
        self.waiting.contains_key(id)
    }

    /// Dependencies `id` is still waiting on.
    pub fn outstanding(&self, id: &TaskId) -> Option<&HashSet<TaskId>> {
        self.waiting.get(id)
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[TaskId]) -> HashSet<TaskId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn no_dependencies_is_ready() {
        let resolver = DependencyResolver::new();
        assert!(resolver.is_ready(&HashSet::new()));
    }

    #[test]
    fn released_only_after_all_dependencies() {
        let mut resolver = DependencyResolver::new();
        let (a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new());

        assert!(!resolver.is_ready(&set(&[a, b])));
        assert!(resolver.block(c, &set(&[a, b])));
        assert!(resolver.is_waiting(&c));

        assert!(resolver.on_task_completed(a).is_empty());
        assert!(resolver.is_waiting(&c));
        assert_eq!(resolver.outstanding(&c), Some(&set(&[b])));

        assert_eq!(resolver.on_task_completed(b), vec![c]);
        assert!(!resolver.is_waiting(&c));
        assert_eq!(resolver.waiting_count(), 0);
    }

    #[test]
    fn block_skips_completed_dependencies() {
        let mut resolver = DependencyResolver::new();
        let (a, b) = (TaskId::new(), TaskId::new());
        resolver.on_task_completed(a);

        assert!(resolver.is_ready(&set(&[a])));
        assert!(!resolver.block(b, &set(&[a])));
        assert!(!resolver.is_waiting(&b));
    }

    #[test]
    fn fan_out_releases_every_dependent() {
        let mut resolver = DependencyResolver::new();
        let root = TaskId::new();
        let children: Vec<TaskId> = (0..4).map(|_| TaskId::new()).collect();
        for child in &children {
            resolver.block(*child, &set(&[root]));
        }

        let mut released = resolver.on_task_completed(root);
        released.sort_by_key(|id| *id.as_uuid());
        let mut expected = children.clone();
        expected.sort_by_key(|id| *id.as_uuid());
        assert_eq!(released, expected);
    }

    #[test]
    fn removed_task_is_not_released() {
        let mut resolver = DependencyResolver::new();
        let (a, b) = (TaskId::new(), TaskId::new());
        resolver.block(b, &set(&[a]));

        assert!(resolver.remove_waiting(&b));
        assert!(!resolver.remove_waiting(&b));
        assert!(resolver.on_task_completed(a).is_empty());
    }
}
