use std::collections::{HashMap, HashSet, VecDeque};

use crate::position::Position;

/// Reverse-edge index over formula references.
///
/// `dependents[p]` holds every position whose formula reads `p`. Forward edges
/// live on the cells themselves; the sheet keeps both sides in step on every
/// committed edit.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// e.g., if A1 = B1 + C1, then dependents[B1] and dependents[C1] contain A1
    dependents: HashMap<Position, HashSet<Position>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `cell` reads every position in `refs`
    pub fn add_edges(&mut self, cell: Position, refs: &[Position]) {
        for dep in refs {
            self.dependents.entry(*dep).or_default().insert(cell);
        }
    }

    /// Forget that `cell` reads the positions in `refs`
    pub fn remove_edges(&mut self, cell: Position, refs: &[Position]) {
        for dep in refs {
            if let Some(dependents) = self.dependents.get_mut(dep) {
                dependents.remove(&cell);
                if dependents.is_empty() {
                    self.dependents.remove(dep);
                }
            }
        }
    }

    /// Swap `cell`'s outgoing edges from `old_refs` to `new_refs`
    pub fn replace_edges(&mut self, cell: Position, old_refs: &[Position], new_refs: &[Position]) {
        self.remove_edges(cell, old_refs);
        self.add_edges(cell, new_refs);
    }

    /// Cells that directly read `cell`
    pub fn direct_dependents(&self, cell: Position) -> Option<&HashSet<Position>> {
        self.dependents.get(&cell)
    }

    /// Would giving `cell` the reference set `candidate` close a cycle?
    ///
    /// `cell` reaches itself through the candidate edges exactly when some
    /// candidate is `cell` or already depends on `cell`, so this walks reverse
    /// edges outward from `cell` and stops at the first candidate found. The
    /// old outgoing edges of `cell` are never followed: reaching them would
    /// need a cycle to exist already.
    pub fn would_create_cycle(&self, cell: Position, candidate: &[Position]) -> bool {
        if candidate.is_empty() {
            return false;
        }
        let targets: HashSet<Position> = candidate.iter().copied().collect();
        if targets.contains(&cell) {
            return true;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![cell];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            if let Some(dependents) = self.direct_dependents(current) {
                for dependent in dependents {
                    if targets.contains(dependent) {
                        return true;
                    }
                    if !visited.contains(dependent) {
                        stack.push(*dependent);
                    }
                }
            }
        }

        false
    }

    /// `changed` followed by every position that depends on it, directly or
    /// transitively, in breadth-first order. Each position appears once even
    /// if the edges contain a cycle.
    pub fn invalidation_order(&self, changed: Position) -> Vec<Position> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(changed);

        while let Some(cell) = queue.pop_front() {
            if !visited.insert(cell) {
                continue;
            }
            order.push(cell);

            if let Some(dependents) = self.direct_dependents(cell) {
                for dependent in dependents {
                    if !visited.contains(dependent) {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        order
    }
}
