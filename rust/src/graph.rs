//! Task dependency graph: propagation order and cycle detection.

use rustc_hash::FxHashSet;

use crate::error::ScheduleError;
use crate::interner::{IdInterner, NodeId};
use crate::models::Task;

/// Which way a traversal follows the edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Towards dependents (successors).
    Forward,
    /// Towards dependencies (predecessors).
    Backward,
}

/// Arena of task ids with adjacency lists in both directions.
///
/// Edges to ids that are not part of the graph are dropped at build time.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: IdInterner,
    depends_on: Vec<Vec<NodeId>>,
    dependents: Vec<Vec<NodeId>>,
}

impl DependencyGraph {
    pub fn build<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let tasks: Vec<&Task> = tasks.into_iter().collect();
        let ids = IdInterner::from_sorted(tasks.iter().map(|t| t.id.as_str()));
        let mut depends_on = vec![Vec::new(); ids.len()];
        let mut dependents = vec![Vec::new(); ids.len()];

        for task in &tasks {
            let Some(node) = ids.get(&task.id) else {
                continue;
            };
            for dep in &task.depends_on {
                if let Some(pred) = ids.get(dep) {
                    depends_on[node as usize].push(pred);
                    dependents[pred as usize].push(node);
                }
            }
        }
        // Sorted adjacency keeps traversal order independent of input order
        for list in depends_on.iter_mut().chain(dependents.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            ids,
            depends_on,
            dependents,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.get(id).is_some()
    }

    fn node(&self, id: &str) -> Result<NodeId, ScheduleError> {
        self.ids
            .get(id)
            .ok_or_else(|| ScheduleError::UnknownTask(id.to_string()))
    }

    fn name(&self, node: NodeId) -> String {
        self.ids.resolve(node).unwrap_or_default().to_string()
    }

    fn edges(&self, node: NodeId, direction: Direction) -> &[NodeId] {
        match direction {
            Direction::Forward => &self.dependents[node as usize],
            Direction::Backward => &self.depends_on[node as usize],
        }
    }

    /// Direct dependencies of `id`, sorted.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Direction::Backward)
    }

    /// Direct dependents of `id`, sorted.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.neighbours(id, Direction::Forward)
    }

    fn neighbours(&self, id: &str, direction: Direction) -> Vec<String> {
        self.ids.get(id).map_or_else(Vec::new, |node| {
            self.edges(node, direction)
                .iter()
                .map(|&n| self.name(n))
                .collect()
        })
    }

    /// Transitive neighbours of `task` in propagation order.
    pub fn order(&self, task: &str, direction: Direction) -> Result<Vec<String>, ScheduleError> {
        self.order_from(&[task], direction)
    }

    /// Transitive neighbours of all `roots`, roots excluded.
    ///
    /// Forward: every task comes after all of its in-set dependencies.
    /// Backward: every task comes after all of its in-set dependents, so the
    /// nearest dependencies are visited first.
    pub fn order_from<S: AsRef<str>>(
        &self,
        roots: &[S],
        direction: Direction,
    ) -> Result<Vec<String>, ScheduleError> {
        let mut root_nodes = Vec::with_capacity(roots.len());
        for root in roots {
            root_nodes.push(self.node(root.as_ref())?);
        }
        let post = self.post_order(&root_nodes, direction)?;
        let skip: FxHashSet<NodeId> = root_nodes.iter().copied().collect();

        Ok(post
            .into_iter()
            .rev()
            .filter(|n| !skip.contains(n))
            .map(|n| self.name(n))
            .collect())
    }

    /// Fail with the first cycle reachable from `ids`.
    pub fn check_acyclic<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), ScheduleError> {
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            nodes.push(self.node(id.as_ref())?);
        }
        self.post_order(&nodes, Direction::Forward).map(|_| ())
    }

    /// Iterative DFS post-order. A back edge aborts with the cycle path.
    fn post_order(&self, roots: &[NodeId], direction: Direction) -> Result<Vec<NodeId>, ScheduleError> {
        let n = self.ids.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut post = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        for &root in roots {
            if visited[root as usize] {
                continue;
            }
            visited[root as usize] = true;
            on_stack[root as usize] = true;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let Some(&next) = self.edges(node, direction).get(frame.1) else {
                    stack.pop();
                    on_stack[node as usize] = false;
                    post.push(node);
                    continue;
                };
                frame.1 += 1;

                if on_stack[next as usize] {
                    return Err(self.cycle_error(&stack, next));
                }
                if !visited[next as usize] {
                    visited[next as usize] = true;
                    on_stack[next as usize] = true;
                    stack.push((next, 0));
                }
            }
        }

        Ok(post)
    }

    fn cycle_error(&self, stack: &[(NodeId, usize)], back_to: NodeId) -> ScheduleError {
        let from = stack
            .iter()
            .position(|(n, _)| *n == back_to)
            .unwrap_or_default();
        let mut cycle: Vec<String> = stack[from..].iter().map(|(n, _)| self.name(*n)).collect();
        cycle.push(self.name(back_to));
        ScheduleError::CyclicDependency { cycle }
    }

    /// Weakly connected components, each sorted, ordered by first id.
    pub fn components(&self) -> Vec<Vec<String>> {
        let n = self.ids.len();
        let mut seen = vec![false; n];
        let mut components = Vec::new();

        for start in 0..n as NodeId {
            if seen[start as usize] {
                continue;
            }
            seen[start as usize] = true;
            let mut members = vec![start];
            let mut frontier = vec![start];
            while let Some(node) = frontier.pop() {
                let linked = self.depends_on[node as usize]
                    .iter()
                    .chain(&self.dependents[node as usize]);
                for &next in linked {
                    if !seen[next as usize] {
                        seen[next as usize] = true;
                        members.push(next);
                        frontier.push(next);
                    }
                }
            }
            // Interned in sorted order, so sorting nodes sorts names
            members.sort_unstable();
            components.push(members.into_iter().map(|m| self.name(m)).collect());
        }

        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, 1.0).with_dependencies(deps.iter().copied())
    }

    fn diamond() -> DependencyGraph {
        // a -> b, a -> c, b -> d, c -> d
        DependencyGraph::build(&[
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
            task("lone", &[]),
        ])
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_forward_order_respects_dependencies() {
        let graph = diamond();
        let order = graph.order("a", Direction::Forward).unwrap();
        assert_eq!(order.len(), 3);
        assert!(position(&order, "b") < position(&order, "d"));
        assert!(position(&order, "c") < position(&order, "d"));
        assert!(!order.contains(&"a".to_string()));
    }

    #[test]
    fn test_backward_order_nearest_first() {
        let graph = diamond();
        let order = graph.order("d", Direction::Backward).unwrap();
        assert_eq!(order.len(), 3);
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "a"));
    }

    #[test]
    fn test_order_is_deterministic() {
        let shuffled = DependencyGraph::build(&[
            task("d", &["c", "b"]),
            task("lone", &[]),
            task("c", &["a"]),
            task("b", &["a"]),
            task("a", &[]),
        ]);
        assert_eq!(
            shuffled.order("a", Direction::Forward).unwrap(),
            diamond().order("a", Direction::Forward).unwrap()
        );
    }

    #[test]
    fn test_order_from_excludes_all_roots() {
        let graph = diamond();
        let order = graph.order_from(&["b", "c"], Direction::Forward).unwrap();
        assert_eq!(order, vec!["d".to_string()]);
    }

    #[test]
    fn test_cycle_reports_path() {
        let graph = DependencyGraph::build(&[
            task("x", &["z"]),
            task("y", &["x"]),
            task("z", &["y"]),
        ]);
        let err = graph.order("x", Direction::Forward).unwrap_err();
        match err {
            ScheduleError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["x", "y", "z", "x"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(graph.check_acyclic(&["y"]).is_err());
    }

    #[test]
    fn test_unknown_root() {
        let graph = diamond();
        assert_eq!(
            graph.order("nope", Direction::Forward),
            Err(ScheduleError::UnknownTask("nope".to_string()))
        );
    }

    #[test]
    fn test_components_and_neighbours() {
        let graph = diamond();
        let components = graph.components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0], vec!["a", "b", "c", "d"]);
        assert_eq!(components[1], vec!["lone"]);
        assert_eq!(graph.dependencies_of("d"), vec!["b", "c"]);
        assert_eq!(graph.dependents_of("a"), vec!["b", "c"]);
        assert!(graph.dependents_of("missing").is_empty());
    }
}
