//! Project dependency ordering.
//!
//! Projects reference each other by name through their library lists. Names
//! that match no project are external libraries and add no edge.

use super::GraphError;
use std::collections::{BTreeSet, HashMap};

/// Directed graph over project names; an edge runs from a library project
/// to every project that links it.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    /// `dependencies[i]`: projects `i` links, in library-list order.
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph from `(name, libraries)` pairs in declaration order.
    pub fn new<'a, I>(projects: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let projects: Vec<(&str, &[String])> = projects.into_iter().collect();

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, (name, _)) in projects.iter().enumerate() {
            if index.insert(*name, i).is_some() {
                return Err(GraphError::DuplicateProject(name.to_string()));
            }
        }

        let mut dependencies = vec![Vec::new(); projects.len()];
        let mut dependents = vec![Vec::new(); projects.len()];
        for (i, (_, libraries)) in projects.iter().enumerate() {
            for library in libraries.iter() {
                if let Some(&dep) = index.get(library.as_str())
                    && !dependencies[i].contains(&dep)
                {
                    dependencies[i].push(dep);
                    dependents[dep].push(i);
                }
            }
        }

        Ok(Self {
            names: projects.iter().map(|(n, _)| n.to_string()).collect(),
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Projects that `index` links directly.
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Kahn's algorithm. Every project comes after all projects it links;
    /// among projects that are ready at the same time, declaration order
    /// wins, so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &self.dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.len() {
            let projects = (0..self.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.names[i].clone())
                .collect();
            return Err(GraphError::Cycle { projects });
        }
        Ok(order)
    }
}
