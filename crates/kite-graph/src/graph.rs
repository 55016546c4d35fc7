//! The materialized, validated dependency graph over effective segments.
//!
//! Grounded on `aivcs_core::multi_repo::graph::RepoDependencyGraph`: Kahn's
//! algorithm for topological leveling, DFS for cycle-witness detection.

use std::collections::{HashMap, HashSet, VecDeque};

use kite_model::{Ride, Segment, ValidationError};

use crate::materialize::materialize;
use crate::warning::Warning;

/// A set of segment names that may run concurrently.
pub type Level = Vec<String>;

/// Everything produced by building a graph from a segment set and a ride.
pub struct BuildOutcome {
    pub graph: Graph,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<Warning>,
}

impl BuildOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Dense adjacency-list DAG over materialized effective segments, indexed
/// by position for cheap lookups (spec §9: "represent the DAG as a dense
/// `Segment[]` plus an adjacency list keyed by index").
pub struct Graph {
    segments: Vec<Segment>,
    index: HashMap<String, usize>,
}

impl Graph {
    /// Materialize `ride`'s flow against `available` and validate the
    /// result. Structural errors (`UnknownSegment`, `EmptyParallel`,
    /// `SelfDependency`, `Cycle`) are all collected, not short-circuited on
    /// first. `MissingArtifact` is checked separately via
    /// [`Graph::validate_artifacts`] since it depends on manifest state.
    pub fn build(available: &[Segment], ride: &Ride) -> BuildOutcome {
        let available_map: HashMap<String, Segment> = available
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();

        let result = materialize(&available_map, ride);
        let mut errors = result.errors;

        let index: HashMap<String, usize> = result
            .effective
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        let graph = Graph {
            segments: result.effective,
            index,
        };

        if let Some(cycle) = graph.find_cycle() {
            errors.push(ValidationError::Cycle { path: cycle });
        }

        BuildOutcome {
            graph,
            errors,
            warnings: result.warnings,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn get(&self, name: &str) -> Option<&Segment> {
        self.index.get(name).map(|&i| &self.segments[i])
    }

    /// For every declared input with no predecessor output and no entry in
    /// `manifest_artifacts`, report `MissingArtifact`. Fatal unless the
    /// manifest already provides the artifact (spec §7).
    pub fn validate_artifacts(&self, manifest_artifacts: &HashSet<String>) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for segment in &self.segments {
            for input in &segment.inputs {
                if manifest_artifacts.contains(input) {
                    continue;
                }
                let produced = self
                    .transitive_dependencies(&segment.name)
                    .iter()
                    .any(|dep_name| {
                        self.get(dep_name)
                            .map(|dep| dep.outputs.iter().any(|(name, _)| name == input))
                            .unwrap_or(false)
                    });
                if !produced {
                    errors.push(ValidationError::MissingArtifact {
                        segment: segment.name.clone(),
                        artifact: input.clone(),
                    });
                }
            }
        }

        errors
    }

    /// All transitive dependencies (not including `name` itself).
    pub fn transitive_dependencies(&self, name: &str) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        if let Some(seg) = self.get(name) {
            queue.extend(seg.depends_on.iter().cloned());
        }
        while let Some(current) = queue.pop_front() {
            if visited.insert(current.clone()) {
                if let Some(seg) = self.get(&current) {
                    queue.extend(seg.depends_on.iter().cloned());
                }
            }
        }
        visited
    }

    /// Topologically level the DAG via Kahn's algorithm. Ties within a
    /// level are ordered by the materialized list's insertion order for
    /// deterministic logging (spec §4.1).
    pub fn levels(&self) -> Result<Vec<Level>, ValidationError> {
        let n = self.segments.len();
        let mut in_degree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, segment) in self.segments.iter().enumerate() {
            for dep in &segment.depends_on {
                if let Some(&dep_idx) = self.index.get(dep) {
                    successors[dep_idx].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        let mut levels = Vec::new();
        let mut remaining: HashSet<usize> = (0..n).collect();
        let mut current_in_degree = in_degree.clone();

        while !remaining.is_empty() {
            let mut frontier: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| current_in_degree[i] == 0)
                .collect();
            frontier.sort_unstable();

            if frontier.is_empty() {
                let mut leftover: Vec<String> = remaining
                    .iter()
                    .map(|&i| self.segments[i].name.clone())
                    .collect();
                leftover.sort();
                return Err(ValidationError::Cycle { path: leftover });
            }

            let level_names = frontier.iter().map(|&i| self.segments[i].name.clone()).collect();
            levels.push(level_names);

            for &i in &frontier {
                remaining.remove(&i);
                for &successor in &successors[i] {
                    current_in_degree[successor] -= 1;
                }
            }
        }

        Ok(levels)
    }

    /// Longest dependency chain by segment count, for diagnostics (spec
    /// §4.1: "used by the external dry-run renderer").
    pub fn critical_path(&self) -> Vec<String> {
        let n = self.segments.len();
        let mut memo: Vec<Option<Vec<String>>> = vec![None; n];

        fn longest(graph: &Graph, i: usize, memo: &mut Vec<Option<Vec<String>>>) -> Vec<String> {
            if let Some(cached) = &memo[i] {
                return cached.clone();
            }
            let segment = &graph.segments[i];
            let mut best: Vec<String> = Vec::new();
            for dep in &segment.depends_on {
                if let Some(&dep_idx) = graph.index.get(dep) {
                    let candidate = longest(graph, dep_idx, memo);
                    if candidate.len() > best.len() {
                        best = candidate;
                    }
                }
            }
            best.push(segment.name.clone());
            memo[i] = Some(best.clone());
            best
        }

        let mut overall: Vec<String> = Vec::new();
        for i in 0..n {
            let path = longest(self, i, &mut memo);
            if path.len() > overall.len() {
                overall = path;
            }
        }
        overall
    }

    /// DFS cycle detection with witness path. Direct self-loops are left to
    /// the materializer's `SelfDependency` check and skipped here to avoid
    /// double-reporting.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let n = self.segments.len();
        let mut mark = vec![Mark::Unvisited; n];
        let mut path = Vec::new();

        fn visit(
            graph: &Graph,
            i: usize,
            mark: &mut Vec<Mark>,
            path: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            match mark[i] {
                Mark::Done => return None,
                Mark::InProgress => {
                    let start = path.iter().position(|&p| p == i).unwrap();
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&idx| graph.segments[idx].name.clone())
                        .collect();
                    cycle.push(graph.segments[i].name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {}
            }

            mark[i] = Mark::InProgress;
            path.push(i);

            for dep in &graph.segments[i].depends_on {
                if dep == &graph.segments[i].name {
                    continue; // self-dependency handled separately
                }
                if let Some(&dep_idx) = graph.index.get(dep) {
                    if let Some(cycle) = visit(graph, dep_idx, mark, path) {
                        return Some(cycle);
                    }
                }
            }

            path.pop();
            mark[i] = Mark::Done;
            None
        }

        for i in 0..n {
            if mark[i] == Mark::Unvisited {
                if let Some(cycle) = visit(self, i, &mut mark, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}
