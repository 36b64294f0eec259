//! Phase graph for a single pipeline.
//!
//! The graph is built once from a phase table and is immutable afterwards.
//! Building validates the structure:
//! - phase ids are unique
//! - every dependency references an existing phase
//! - there are no cycles

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::phase::Phase;

/// Index into the phase list.
pub type PhaseIndex = usize;

/// A validated directed acyclic graph of phases.
#[derive(Debug, Clone)]
pub struct PhaseGraph {
    /// Phases in declaration order
    phases: Vec<Phase>,
    index_map: HashMap<String, PhaseIndex>,
    /// index -> phases that depend on it
    forward_edges: Vec<Vec<PhaseIndex>>,
    /// index -> phases it depends on
    reverse_edges: Vec<Vec<PhaseIndex>>,
}

impl PhaseGraph {
    /// Build and validate a graph from a phase table.
    pub fn build(phases: Vec<Phase>) -> Result<Self> {
        let mut index_map = HashMap::new();
        for (i, phase) in phases.iter().enumerate() {
            if index_map.insert(phase.id.clone(), i).is_some() {
                bail!("Duplicate phase id: {}", phase.id);
            }
        }

        let mut forward_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); phases.len()];
        let mut reverse_edges: Vec<Vec<PhaseIndex>> = vec![Vec::new(); phases.len()];

        for (to_idx, phase) in phases.iter().enumerate() {
            for dep in &phase.depends_on {
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Unknown dependency '{}' in phase '{}': no phase with that id exists",
                        dep,
                        phase.id
                    )
                })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = Self {
            phases,
            index_map,
            forward_edges,
            reverse_edges,
        };
        graph.topological_indices()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn get(&self, id: &str) -> Option<&Phase> {
        self.index_map.get(id).map(|&i| &self.phases[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_map.contains_key(id)
    }

    pub fn mandatory_phases(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter().filter(|p| p.mandatory)
    }

    /// Direct dependencies of a phase.
    pub fn dependencies(&self, id: &str) -> Vec<&Phase> {
        self.index_map
            .get(id)
            .map(|&i| {
                self.reverse_edges[i]
                    .iter()
                    .map(|&d| &self.phases[d])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every phase that transitively depends on `id`, in declaration order.
    pub fn dependents(&self, id: &str) -> Vec<&Phase> {
        let Some(&start) = self.index_map.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut queue: VecDeque<PhaseIndex> = self.forward_edges[start].iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            if seen.insert(idx) {
                queue.extend(self.forward_edges[idx].iter().copied());
            }
        }

        let mut indices: Vec<_> = seen.into_iter().collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.phases[i]).collect()
    }

    /// Phases ordered so every phase follows all of its dependencies.
    pub fn topological_order(&self) -> Vec<&Phase> {
        // Validated acyclic at build time.
        self.topological_indices()
            .unwrap_or_default()
            .into_iter()
            .map(|i| &self.phases[i])
            .collect()
    }

    /// Kahn's algorithm; ties resolve in declaration order.
    fn topological_indices(&self) -> Result<Vec<PhaseIndex>> {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(|deps| deps.len()).collect();
        let mut ready: Vec<PhaseIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .rev()
            .collect();

        let mut order = Vec::with_capacity(self.phases.len());
        while let Some(idx) = ready.pop() {
            order.push(idx);
            let mut released = Vec::new();
            for &next in &self.forward_edges[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    released.push(next);
                }
            }
            ready.extend(released);
            ready.sort_unstable_by(|a, b| b.cmp(a));
        }

        if order.len() != self.phases.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| self.phases[i].id.as_str())
                .collect();
            bail!("Cycle detected among phases: {}", stuck.join(", "));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::default_phases;

    fn ids(phases: &[&Phase]) -> Vec<String> {
        phases.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_build_default_graph() {
        let graph = PhaseGraph::build(default_phases()).unwrap();
        assert_eq!(graph.len(), 5);
        assert!(graph.contains("ralph"));
        assert_eq!(ids(&graph.dependencies("deploy")), vec!["verify"]);
        assert_eq!(
            ids(&graph.dependents("build")),
            vec!["verify", "deploy", "ralph"]
        );
        assert_eq!(graph.mandatory_phases().count(), 4);
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let err = PhaseGraph::build(vec![Phase::new("a", "A"), Phase::new("a", "A again")])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate phase id: a"));
    }

    #[test]
    fn test_build_rejects_unknown_dependency() {
        let err = PhaseGraph::build(vec![Phase::new("a", "A").with_dependencies(&["ghost"])])
            .unwrap_err();
        assert!(err.to_string().contains("Unknown dependency 'ghost'"));
    }

    #[test]
    fn test_build_rejects_cycle() {
        let err = PhaseGraph::build(vec![
            Phase::new("a", "A").with_dependencies(&["c"]),
            Phase::new("b", "B").with_dependencies(&["a"]),
            Phase::new("c", "C").with_dependencies(&["b"]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("Cycle detected"));
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let graph = PhaseGraph::build(vec![
            Phase::new("p3", "Three").with_dependencies(&["p1"]),
            Phase::new("p0", "Zero"),
            Phase::new("p1", "One").with_dependencies(&["p0"]),
            Phase::optional("p2", "Two"),
        ])
        .unwrap();
        let order = ids(&graph.topological_order());
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("p0") < pos("p1"));
        assert!(pos("p1") < pos("p3"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_unknown_phase_queries_are_empty() {
        let graph = PhaseGraph::build(default_phases()).unwrap();
        assert!(graph.get("ship").is_none());
        assert!(graph.dependencies("ship").is_empty());
        assert!(graph.dependents("ship").is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = PhaseGraph::build(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.topological_order().is_empty());
    }
}
