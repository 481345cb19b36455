//! Dependency graph over named definitions.
//!
//! Nodes live in an arena indexed by position; an edge `a -> b` means the
//! definition of `a` refers to `b`, so `b` has to be resolved first.

use crate::symbolic::symbolic_engine::Expr;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

/// A closed dependency chain, first node repeated implicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle(pub Vec<String>);

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node index, creating it when absent.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), i);
        self.edges.push(Vec::new());
        i
    }

    /// `dependent` needs `dependency`.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let a = self.add_node(dependent);
        let b = self.add_node(dependency);
        if !self.edges[a].contains(&b) {
            self.edges[a].push(b);
        }
    }

    /// Graph whose nodes are the defined names; only references to other
    /// defined names become edges.
    pub fn from_definitions(definitions: &[(String, Expr)]) -> Self {
        let mut graph = Self::new();
        for (name, _) in definitions {
            graph.add_node(name);
        }
        for (name, expr) in definitions {
            let mut referenced = BTreeSet::new();
            expr.collect_variables(&mut referenced);
            for r in referenced {
                if graph.index.contains_key(&r) {
                    graph.add_dependency(name, &r);
                }
            }
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Node indices with every dependency before its dependents.
    /// Iterative three-colour depth-first search; a gray node met again closes a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>, Cycle> {
        let n = self.names.len();
        let mut mark = vec![Mark::White; n];
        let mut order = Vec::with_capacity(n);
        for root in 0..n {
            if mark[root] != Mark::White {
                continue;
            }
            // (node, next edge to look at)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            mark[root] = Mark::Gray;
            while let Some(&(node, next)) = stack.last() {
                if next < self.edges[node].len() {
                    let child = self.edges[node][next];
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match mark[child] {
                        Mark::White => {
                            mark[child] = Mark::Gray;
                            stack.push((child, 0));
                        }
                        Mark::Gray => {
                            let start = stack
                                .iter()
                                .position(|&(v, _)| v == child)
                                .unwrap_or(0);
                            let cycle = stack[start..]
                                .iter()
                                .map(|&(v, _)| self.names[v].clone())
                                .collect();
                            return Err(Cycle(cycle));
                        }
                        Mark::Black => {}
                    }
                } else {
                    mark[node] = Mark::Black;
                    order.push(node);
                    stack.pop();
                }
            }
        }
        Ok(order)
    }

    /// Same as [`topological_order`](Self::topological_order) but by name.
    pub fn sorted_names(&self) -> Result<Vec<String>, Cycle> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect())
    }
}
