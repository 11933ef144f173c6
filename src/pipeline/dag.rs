// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! DAG (Directed Acyclic Graph) builder for step dependencies
//!
//! Builds and validates dependency graphs for pipeline steps. The execution
//! order is a topological order in which ties are broken by declaration
//! position, so a pipeline declared in dependency order runs exactly in
//! declaration order.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::errors::CrossflowError;
use crate::pipeline::Step;

/// Builder for step dependency DAGs
pub struct DagBuilder {
    graph: DiGraph<usize, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    names: Vec<String>,
}

impl DagBuilder {
    /// Build a DAG from `(name, dependencies)` pairs in declaration order
    pub fn build<'a, I>(nodes: I) -> Result<Self, CrossflowError>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let nodes: Vec<(&str, &[String])> = nodes.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut names = Vec::with_capacity(nodes.len());

        for (idx, (name, _)) in nodes.iter().enumerate() {
            let node = graph.add_node(idx);
            if name_to_index.insert(name.to_string(), node).is_some() {
                return Err(CrossflowError::DuplicateStep {
                    step: name.to_string(),
                });
            }
            names.push(name.to_string());
        }

        for (name, deps) in &nodes {
            let node = name_to_index[*name];
            for dep in deps.iter() {
                let dep_node =
                    name_to_index
                        .get(dep)
                        .ok_or_else(|| CrossflowError::UnknownDependency {
                            stage: name.to_string(),
                            dependency: dep.clone(),
                        })?;
                if !graph.contains_edge(*dep_node, node) {
                    graph.add_edge(*dep_node, node, ());
                }
            }
        }

        let builder = Self {
            graph,
            name_to_index,
            names,
        };
        builder.execution_order()?;

        Ok(builder)
    }

    /// Build a DAG over runnable steps
    pub fn from_steps(steps: &[Step]) -> Result<Self, CrossflowError> {
        Self::build(steps.iter().map(|s| (s.name(), s.dependencies())))
    }

    /// Declaration indices in execution order
    pub fn execution_order(&self) -> Result<Vec<usize>, CrossflowError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(|n| Reverse(self.graph[n]))
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            let node = NodeIndex::new(idx);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(self.graph[next]));
                }
            }
        }

        if order.len() != self.names.len() {
            return Err(CrossflowError::CircularDependency {
                stages: self.cycle_members(),
            });
        }

        Ok(order)
    }

    /// Step names in execution order
    pub fn execution_order_names(&self) -> Result<Vec<String>, CrossflowError> {
        Ok(self
            .execution_order()?
            .into_iter()
            .map(|idx| self.names[idx].clone())
            .collect())
    }

    /// Names of the steps forming the first cycle found
    fn cycle_members(&self) -> Vec<String> {
        let mut cycles: Vec<Vec<usize>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
            })
            .map(|scc| {
                let mut members: Vec<usize> = scc.into_iter().map(|n| self.graph[n]).collect();
                members.sort_unstable();
                members
            })
            .collect();
        cycles.sort();

        cycles
            .into_iter()
            .next()
            .map(|members| members.into_iter().map(|i| self.names[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Get dependencies for a step (steps that must run before it)
    pub fn dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Get dependents for a step (steps that depend on it)
    pub fn dependents(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.name_to_index.get(name)?;
        let mut idx: Vec<usize> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n])
            .collect();
        idx.sort_unstable();
        Some(idx.into_iter().map(|i| self.names[i].clone()).collect())
    }

    /// The named steps plus everything that transitively depends on them,
    /// in execution order
    pub fn with_transitive_dependents(&self, names: &[String]) -> Result<Vec<String>, CrossflowError> {
        let mut reached = vec![false; self.names.len()];

        for name in names {
            let start = self
                .name_to_index
                .get(name)
                .ok_or_else(|| CrossflowError::StepNotFound { step: name.clone() })?;
            let mut dfs = Dfs::new(&self.graph, *start);
            while let Some(node) = dfs.next(&self.graph) {
                reached[self.graph[node]] = true;
            }
        }

        Ok(self
            .execution_order()?
            .into_iter()
            .filter(|idx| reached[*idx])
            .map(|idx| self.names[idx].clone())
            .collect())
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (idx, name) in self.names.iter().enumerate() {
            out.push_str(&format!("    n{}[\"{}\"]\n", idx, name));
        }

        for edge in self.graph.raw_edges() {
            out.push_str(&format!(
                "    n{} --> n{}\n",
                self.graph[edge.source()],
                self.graph[edge.target()]
            ));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for name in &self.names {
            out.push_str(&format!("    \"{}\";\n", name));
        }

        for edge in self.graph.raw_edges() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                self.names[self.graph[edge.source()]],
                self.names[self.graph[edge.target()]]
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, steps: &[Step]) -> Result<String, CrossflowError> {
        let order = self.execution_order()?;
        let mut out = String::new();

        for (i, idx) in order.iter().enumerate() {
            let step = &steps[*idx];
            let deps = self.dependencies(step.name()).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, step.name(), step.kind()));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }
}
