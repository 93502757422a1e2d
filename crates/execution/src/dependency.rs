//! Dependency graph for resources.
//!
//! Provides the linear execution order, the dependency levels used for
//! parallel deployment, and the validation queries the planner needs.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use inframan_core::Resource;

/// A resource dependency graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Resource ids in declaration order
    ids: Vec<String>,
    /// resource -> [dependencies], deduplicated
    deps: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from planned resources.
    pub fn from_resources(resources: &[Resource]) -> Self {
        Self::from_edges(resources.iter().map(|r| (r.id.clone(), r.dependencies.clone())))
    }

    /// Build the graph from `(id, dependencies)` pairs.
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for (id, deps) in edges {
            let id = id.into();
            let mut unique = Vec::with_capacity(deps.len());
            for dep in deps {
                if !unique.contains(&dep) {
                    unique.push(dep);
                }
            }
            if !graph.deps.contains_key(&id) {
                graph.ids.push(id.clone());
            }
            graph.deps.insert(id, unique);
        }
        graph
    }

    /// Resource ids in declaration order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Declared dependencies of `id`.
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.deps.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn contains(&self, id: &str) -> bool {
        self.deps.contains_key(id)
    }

    /// Linear topological order (Kahn's algorithm, FIFO seeded in
    /// declaration order).
    ///
    /// Dependencies on unknown ids are ignored. Resources on a cycle never
    /// become ready and are left out.
    pub fn execution_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> =
            self.ids.iter().map(|id| (id.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for id in &self.ids {
            for dep in self.dependencies(id) {
                if self.contains(dep) {
                    dependents.entry(dep.as_str()).or_default().push(id.as_str());
                    *in_degree.entry(id.as_str()).or_default() += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = self
            .ids
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.ids.len());

        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());
            for next in dependents.get(current).map(|v| v.as_slice()).unwrap_or(&[]) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        order
    }

    /// Group resources into dependency levels.
    ///
    /// A resource with no dependencies is level 0; otherwise its level is one
    /// more than its deepest dependency. Unknown dependencies count as level
    /// 0. A dependency that closes a cycle also counts as level 0, so every
    /// resource lands in exactly one level even on cyclic input. Levels are
    /// returned in ascending order, members in declaration order.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut memo: HashMap<&str, usize> = HashMap::new();
        let mut path: HashSet<&str> = HashSet::new();
        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        for id in &self.ids {
            let level = self.level_of(id, &mut path, &mut memo);
            grouped.entry(level).or_default().push(id.clone());
        }

        grouped.into_values().collect()
    }

    fn level_of<'a>(
        &'a self,
        id: &'a str,
        path: &mut HashSet<&'a str>,
        memo: &mut HashMap<&'a str, usize>,
    ) -> usize {
        if path.contains(id) {
            // Back edge: cycle
            return 0;
        }
        if let Some(&level) = memo.get(id) {
            return level;
        }

        let deps = self.dependencies(id);
        if deps.is_empty() {
            memo.insert(id, 0);
            return 0;
        }

        path.insert(id);
        let deepest = deps
            .iter()
            .map(|dep| self.level_of(dep, path, memo))
            .max()
            .unwrap_or(0);
        path.remove(id);

        let level = deepest + 1;
        memo.insert(id, level);
        level
    }

    /// Find one dependency cycle, returned as a path whose first id is
    /// repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            graph: &'a DependencyGraph,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(id) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(id.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(id, Mark::Visiting);
            stack.push(id);
            for dep in graph.dependencies(id) {
                if graph.contains(dep) {
                    if let Some(cycle) = visit(graph, dep, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            marks.insert(id, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        self.ids
            .iter()
            .find_map(|id| visit(self, id, &mut marks, &mut stack))
    }

    /// `(resource, dependency)` pairs naming ids that are not in the graph.
    pub fn unknown_dependencies(&self) -> Vec<(String, String)> {
        self.ids
            .iter()
            .flat_map(|id| {
                self.dependencies(id)
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .map(move |dep| (id.clone(), dep.clone()))
            })
            .collect()
    }
}
