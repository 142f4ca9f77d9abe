// SPDX-License-Identifier: MIT

//! Dependency graph and leveled execution order
//!
//! The graph maps each job name to the set of names it depends on. It is
//! built incrementally with `put`, which keeps the structure acyclic, and
//! turned into an ordered list of levels with `levels`. Every job in a
//! level only depends on jobs in earlier levels, so a level can be run
//! concurrently.

use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};

use crate::error::GraphError;

/// Ordered batches of job names; jobs in one level are independent of each other
pub type Levels = Vec<Vec<String>>;

/// Incrementally built adjacency structure over job names.
///
/// Nodes keep their insertion order, which is used to break ties when
/// ordering jobs into levels. Names that are only mentioned as dependencies
/// get a placeholder node with no dependencies of their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Forward edges: job -> jobs it depends on
    nodes: IndexMap<String, IndexSet<String>>,
    /// Jobs that must occupy a level alone
    sync: IndexSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `dependencies` into the dependency set of `name`.
    ///
    /// On error the graph is left unchanged.
    pub fn put<I, S>(&mut self, name: &str, dependencies: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        validate_dependencies(name, &dependencies)?;

        let mut candidate = self.clone();
        candidate.insert_edges(name, &dependencies);
        if let Some(cycle) = candidate.find_cycle_from(name) {
            return Err(GraphError::CircularDependency(cycle));
        }

        *self = candidate;
        Ok(())
    }

    /// Builder-style `put` for graphs assembled in one expression
    pub fn with<I, S>(mut self, name: &str, dependencies: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.put(name, dependencies)?;
        Ok(self)
    }

    /// Flag an existing job as one that must run in a level of its own
    pub fn set_sync(&mut self, name: &str, sync: bool) -> Result<(), GraphError> {
        if !self.nodes.contains_key(name) {
            return Err(GraphError::UnknownJob(name.to_string()));
        }
        if sync {
            self.sync.insert(name.to_string());
        } else {
            self.sync.shift_remove(name);
        }
        Ok(())
    }

    pub fn is_sync(&self, name: &str) -> bool {
        self.sync.contains(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Dependencies of a job
    pub fn dependencies(&self, name: &str) -> Result<&IndexSet<String>, GraphError> {
        self.nodes
            .get(name)
            .ok_or_else(|| GraphError::UnknownJob(name.to_string()))
    }

    /// Job names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute the leveled execution order.
    ///
    /// Jobs are ordered by dependency depth (ties keep insertion order), then
    /// walked while an open level is kept: a job whose dependency sits in the
    /// open level starts a new one. Finally every sync job sharing a level is
    /// moved into a level of its own just before the rest of its level.
    pub fn levels(&self) -> Levels {
        let depths = self.depths();
        let mut ordered: Vec<(usize, &String)> = self.nodes.keys().enumerate().collect();
        ordered.sort_by_key(|(index, name)| (depths[name.as_str()], *index));

        let mut levels: Levels = Vec::new();
        let mut open: IndexSet<&str> = IndexSet::new();
        for (_, name) in ordered {
            let blocked = self.nodes[name.as_str()]
                .iter()
                .any(|dep| open.contains(dep.as_str()));
            if blocked || levels.is_empty() {
                levels.push(Vec::new());
                open.clear();
            }
            if let Some(level) = levels.last_mut() {
                level.push(name.clone());
            }
            open.insert(name.as_str());
        }

        self.isolate_sync_jobs(levels)
    }

    /// Give every sync job that shares a level a level of its own
    fn isolate_sync_jobs(&self, levels: Levels) -> Levels {
        let mut isolated = Vec::with_capacity(levels.len());
        for level in levels {
            if level.len() <= 1 {
                isolated.push(level);
                continue;
            }
            let (sync, rest): (Vec<String>, Vec<String>) =
                level.into_iter().partition(|name| self.is_sync(name));
            for name in sync {
                isolated.push(vec![name]);
            }
            if !rest.is_empty() {
                isolated.push(rest);
            }
        }
        isolated
    }

    /// Longest dependency chain below each node (roots have depth 0)
    fn depths(&self) -> HashMap<&str, usize> {
        let mut depths: HashMap<&str, usize> = HashMap::with_capacity(self.nodes.len());
        for root in self.nodes.keys() {
            let mut stack: Vec<&str> = vec![root.as_str()];
            while let Some(&name) = stack.last() {
                if depths.contains_key(name) {
                    stack.pop();
                    continue;
                }
                let deps = self.nodes.get(name);
                let pending: Vec<&str> = deps
                    .into_iter()
                    .flatten()
                    .map(String::as_str)
                    .filter(|dep| !depths.contains_key(dep))
                    .collect();
                if pending.is_empty() {
                    let depth = deps
                        .into_iter()
                        .flatten()
                        .filter_map(|dep| depths.get(dep.as_str()))
                        .map(|depth| depth + 1)
                        .max()
                        .unwrap_or(0);
                    depths.insert(name, depth);
                    stack.pop();
                } else {
                    stack.extend(pending);
                }
            }
        }
        depths
    }

    /// Union the edges into the node and repair stale reverse edges
    fn insert_edges(&mut self, name: &str, dependencies: &[String]) {
        self.nodes
            .entry(name.to_string())
            .or_default()
            .extend(dependencies.iter().cloned());

        for dep in dependencies {
            let dep_deps = self.nodes.entry(dep.clone()).or_default();
            // A redefinition can leave an edge pointing back at `name`
            if dep_deps.shift_remove(name) {
                log::warn!("Dropped stale edge {} -> {}", dep, name);
            }
        }
    }

    /// Depth-first search for a path that leads back to `start`
    fn find_cycle_from(&self, start: &str) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        // Each frame holds a node and the index of its next dependency to follow
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        while let Some((node, next)) = stack.last_mut() {
            let Some(dep) = self.nodes.get(*node).and_then(|deps| deps.get_index(*next)) else {
                stack.pop();
                continue;
            };
            *next += 1;
            if dep == start {
                let mut path: Vec<String> = stack.iter().map(|(name, _)| name.to_string()).collect();
                path.push(dep.clone());
                return Some(path);
            }
            if visited.insert(dep.as_str()) {
                stack.push((dep.as_str(), 0));
            }
        }
        None
    }
}

/// A job or dependency name must not be empty, whitespace or purely numeric
pub(crate) fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && !trimmed.chars().all(|c| c.is_ascii_digit())
}

/// Reject invalid names, self-dependencies and duplicates within one call
pub(crate) fn validate_dependencies(name: &str, dependencies: &[String]) -> Result<(), GraphError> {
    if !is_valid_name(name) {
        return Err(GraphError::InvalidName {
            job: name.to_string(),
            name: name.to_string(),
        });
    }

    let mut seen = IndexSet::new();
    let mut duplicates = IndexSet::new();
    for dep in dependencies {
        if !is_valid_name(dep) {
            return Err(GraphError::InvalidName {
                job: name.to_string(),
                name: dep.clone(),
            });
        }
        if dep == name {
            return Err(GraphError::SelfDependency(name.to_string()));
        }
        if !seen.insert(dep.as_str()) {
            duplicates.insert(dep.clone());
        }
    }

    if !duplicates.is_empty() {
        return Err(GraphError::DuplicateDependency {
            job: name.to_string(),
            names: duplicates.into_iter().collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_of(levels: &Levels, name: &str) -> usize {
        levels
            .iter()
            .position(|level| level.iter().any(|n| n == name))
            .unwrap()
    }

    fn assert_valid(graph: &DependencyGraph, levels: &Levels) {
        let total: usize = levels.iter().map(|l| l.len()).sum();
        assert_eq!(total, graph.len(), "every job appears exactly once");
        for name in graph.names() {
            let level = level_of(levels, name);
            for dep in graph.dependencies(name).unwrap() {
                assert!(
                    level_of(levels, dep) < level,
                    "{} must come after {}",
                    name,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_dependency_declared_before_job_exists() {
        let graph = DependencyGraph::new().with("j0", ["j1"]).unwrap();
        assert!(graph.contains("j1"));
        assert!(graph.dependencies("j1").unwrap().is_empty());
        assert_eq!(graph.levels(), vec![vec!["j1"], vec!["j0"]]);
    }

    #[test]
    fn test_sync_jobs_isolated() {
        let mut graph = DependencyGraph::new();
        graph.put("j0", Vec::<String>::new()).unwrap();
        graph.put("j1", Vec::<String>::new()).unwrap();
        graph.put("jn", ["j0", "j1"]).unwrap();
        graph.put("jx", ["j0", "j1"]).unwrap();
        graph.set_sync("j0", true).unwrap();
        graph.set_sync("j1", true).unwrap();

        assert_eq!(
            graph.levels(),
            vec![vec!["j0"], vec!["j1"], vec!["jn", "jx"]]
        );
    }

    #[test]
    fn test_sync_job_alone_among_many_peers() {
        let mut graph = DependencyGraph::new();
        for name in ["a", "b", "c", "d", "e"] {
            graph.put(name, Vec::<String>::new()).unwrap();
        }
        graph.set_sync("c", true).unwrap();

        let levels = graph.levels();
        assert_eq!(levels, vec![vec!["c"], vec!["a", "b", "d", "e"]]);
    }

    #[test]
    fn test_put_is_idempotent() {
        let once = DependencyGraph::new().with("a", ["b"]).unwrap();
        let twice = DependencyGraph::new()
            .with("a", ["b"])
            .unwrap()
            .with("a", ["b"])
            .unwrap();
        assert_eq!(once.levels(), twice.levels());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_put_merges_dependencies() {
        let graph = DependencyGraph::new()
            .with("a", ["b"])
            .unwrap()
            .with("a", ["c"])
            .unwrap();
        let deps: Vec<&String> = graph.dependencies("a").unwrap().iter().collect();
        assert_eq!(deps, vec!["b", "c"]);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = DependencyGraph::new();
        assert_eq!(
            graph.put("a", ["a"]),
            Err(GraphError::SelfDependency("a".to_string()))
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn test_duplicate_dependencies_rejected() {
        let mut graph = DependencyGraph::new();
        assert_eq!(
            graph.put("a", ["b", "b"]),
            Err(GraphError::DuplicateDependency {
                job: "a".to_string(),
                names: vec!["b".to_string()],
            })
        );
    }

    #[test]
    fn test_invalid_dependency_names_rejected() {
        let mut graph = DependencyGraph::new();
        for bad in ["", "   ", "123"] {
            let err = graph.put("a", [bad]).unwrap_err();
            assert!(matches!(err, GraphError::InvalidName { .. }), "{:?}", bad);
        }
        assert!(graph.put("a1", ["b2"]).is_ok());
    }

    #[test]
    fn test_redefinition_repairs_reverse_edge() {
        let mut graph = DependencyGraph::new();
        graph.put("a", ["b"]).unwrap();
        graph.put("b", ["a"]).unwrap();

        assert!(graph.dependencies("a").unwrap().is_empty());
        assert_eq!(graph.levels(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_longer_cycle_rejected() {
        let mut graph = DependencyGraph::new();
        graph.put("a", ["b"]).unwrap();
        graph.put("b", ["c"]).unwrap();
        let before = graph.clone();

        let err = graph.put("c", ["a"]).unwrap_err();
        assert_eq!(
            err,
            GraphError::CircularDependency(vec![
                "c".to_string(),
                "a".to_string(),
                "b".to_string(),
                "c".to_string()
            ])
        );
        assert_eq!(graph, before);
    }

    #[test]
    fn test_unknown_job_lookup() {
        let graph = DependencyGraph::new();
        assert_eq!(
            graph.dependencies("ghost"),
            Err(GraphError::UnknownJob("ghost".to_string()))
        );
        let mut graph = graph;
        assert!(graph.set_sync("ghost", true).is_err());
    }

    #[test]
    fn test_diamond_levels() {
        let graph = DependencyGraph::new()
            .with("top", Vec::<String>::new())
            .unwrap()
            .with("left", ["top"])
            .unwrap()
            .with("right", ["top"])
            .unwrap()
            .with("bottom", ["left", "right"])
            .unwrap();

        let levels = graph.levels();
        assert_eq!(
            levels,
            vec![vec!["top"], vec!["left", "right"], vec!["bottom"]]
        );
        assert_valid(&graph, &levels);
    }

    #[test]
    fn test_levels_valid_when_dependents_inserted_first() {
        let graph = DependencyGraph::new()
            .with("report", ["aggregate", "fetch_b"])
            .unwrap()
            .with("aggregate", ["fetch_a", "fetch_b"])
            .unwrap()
            .with("fetch_a", ["config"])
            .unwrap()
            .with("fetch_b", Vec::<String>::new())
            .unwrap()
            .with("audit", Vec::<String>::new())
            .unwrap();

        let levels = graph.levels();
        assert_valid(&graph, &levels);
        assert_eq!(levels[0], vec!["fetch_b", "config", "audit"]);
    }

    #[test]
    fn test_levels_valid_for_chain_with_sync_jobs() {
        let mut graph = DependencyGraph::new();
        let names: Vec<String> = (0..12).map(|i| format!("job_{}", i)).collect();
        for (i, name) in names.iter().enumerate() {
            let deps: Vec<String> = names[..i]
                .iter()
                .filter(|_| i % 3 == 0)
                .take(2)
                .cloned()
                .collect();
            graph.put(name, deps).unwrap();
            if i % 4 == 1 {
                graph.set_sync(name, true).unwrap();
            }
        }

        let levels = graph.levels();
        assert_valid(&graph, &levels);
        for level in &levels {
            if level.iter().any(|n| graph.is_sync(n)) {
                assert_eq!(level.len(), 1);
            }
        }
    }

    #[test]
    fn test_long_chain_does_not_exhaust_stack() {
        const LENGTH: usize = 50_000;
        let mut graph = DependencyGraph::new();
        for i in (0..LENGTH).rev() {
            let deps: IndexSet<String> = (i > 0).then(|| format!("job{}", i - 1)).into_iter().collect();
            graph.nodes.insert(format!("job{}", i), deps);
        }

        let levels = graph.levels();
        assert_eq!(levels.len(), LENGTH);
        assert_eq!(levels[0], vec!["job0"]);
        assert_eq!(levels[LENGTH - 1], vec![format!("job{}", LENGTH - 1)]);
        assert!(graph.find_cycle_from(&format!("job{}", LENGTH - 1)).is_none());

        graph
            .nodes
            .get_mut("job0")
            .unwrap()
            .insert(format!("job{}", LENGTH - 1));
        let cycle = graph.find_cycle_from("job0").unwrap();
        assert_eq!(cycle.len(), LENGTH + 1);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_empty_graph_has_no_levels() {
        assert!(DependencyGraph::new().levels().is_empty());
    }
}
