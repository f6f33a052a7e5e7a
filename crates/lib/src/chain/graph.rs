//! Step dependency graph.
//!
//! Nodes are build steps (by position in the chain), edges run from a producer
//! to every consumer of an item it produces. The graph provides:
//! - a deterministic topological order (ties broken by registration order)
//! - parallel execution waves (groups of mutually independent steps)
//! - minimal cycle reporting

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::item::ItemId;

/// Dependency graph over the steps of a chain.
#[derive(Debug, Clone)]
pub struct StepGraph {
  graph: DiGraph<usize, ItemId>,
  nodes: Vec<NodeIndex>,
}

impl StepGraph {
  /// Create a graph with `count` unconnected steps.
  pub fn new(count: usize) -> Self {
    let mut graph = DiGraph::with_capacity(count, count);
    let nodes = (0..count).map(|i| graph.add_node(i)).collect();
    Self { graph, nodes }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Record that `consumer` depends on `producer` through `item`.
  ///
  /// Parallel edges are collapsed; the first item wins for diagnostics.
  pub fn add_dependency(&mut self, producer: usize, consumer: usize, item: ItemId) {
    let (from, to) = (self.nodes[producer], self.nodes[consumer]);
    if self.graph.find_edge(from, to).is_none() {
      self.graph.add_edge(from, to, item);
    }
  }

  /// Direct dependencies of a step, ascending.
  pub fn dependencies(&self, step: usize) -> Vec<usize> {
    self.neighbors(step, Direction::Incoming)
  }

  /// Direct dependents of a step, ascending.
  pub fn dependents(&self, step: usize) -> Vec<usize> {
    self.neighbors(step, Direction::Outgoing)
  }

  fn neighbors(&self, step: usize, dir: Direction) -> Vec<usize> {
    let mut out: Vec<usize> = self
      .graph
      .neighbors_directed(self.nodes[step], dir)
      .map(|idx| self.graph[idx])
      .collect();
    out.sort_unstable();
    out.dedup();
    out
  }

  /// Find a shortest cycle, if any.
  ///
  /// Returned hops are `(step, item)` pairs where `step` produced `item` for the
  /// next step in the list; the last hop leads back to the first step. The
  /// cycle is rotated so that it starts at its lowest step index.
  pub fn find_cycle(&self) -> Option<Vec<(usize, ItemId)>> {
    let mut best: Option<Vec<(usize, ItemId)>> = None;

    for scc in tarjan_scc(&self.graph) {
      let is_cycle = scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some();
      if !is_cycle {
        continue;
      }
      let members: HashSet<NodeIndex> = scc.iter().copied().collect();
      let mut starts: Vec<NodeIndex> = scc.clone();
      starts.sort_by_key(|idx| self.graph[*idx]);

      for start in starts {
        if let Some(cycle) = self.shortest_cycle_from(start, &members) {
          let better = match &best {
            None => true,
            Some(current) => cycle.len() < current.len(),
          };
          if better {
            best = Some(cycle);
          }
        }
      }
    }

    best
  }

  /// Breadth-first search for the shortest path from `start` back to itself.
  fn shortest_cycle_from(&self, start: NodeIndex, members: &HashSet<NodeIndex>) -> Option<Vec<(usize, ItemId)>> {
    let mut parent: HashMap<NodeIndex, (NodeIndex, ItemId)> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut seen = HashSet::from([start]);

    while let Some(current) = queue.pop_front() {
      let mut edges: Vec<_> = self.graph.edges_directed(current, Direction::Outgoing).collect();
      edges.sort_by_key(|e| self.graph[e.target()]);

      for edge in edges {
        let next = edge.target();
        if next == start {
          // Walk back from `current` to rebuild the path.
          let mut hops = vec![(self.graph[current], *edge.weight())];
          let mut cursor = current;
          while cursor != start {
            let (prev, item) = parent[&cursor];
            hops.push((self.graph[prev], item));
            cursor = prev;
          }
          hops.reverse();
          return Some(hops);
        }
        if members.contains(&next) && seen.insert(next) {
          parent.insert(next, (current, *edge.weight()));
          queue.push_back(next);
        }
      }
    }

    None
  }

  /// Topological order using Kahn's algorithm. Among ready steps the one
  /// registered first runs first, so the order is stable across builds.
  ///
  /// Returns `None` when the graph has a cycle.
  pub fn execution_order(&self) -> Option<Vec<usize>> {
    let mut in_degree: Vec<usize> = self
      .nodes
      .iter()
      .map(|&idx| self.dependencies(self.graph[idx]).len())
      .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .enumerate()
      .filter(|(_, d)| **d == 0)
      .map(|(i, _)| Reverse(i))
      .collect();

    let mut order = Vec::with_capacity(self.len());
    while let Some(Reverse(step)) = ready.pop() {
      order.push(step);
      for dependent in self.dependents(step) {
        in_degree[dependent] -= 1;
        if in_degree[dependent] == 0 {
          ready.push(Reverse(dependent));
        }
      }
    }

    (order.len() == self.len()).then_some(order)
  }

  /// Group steps into waves: every step's dependencies are in earlier waves.
  /// Steps within a wave are sorted by registration order.
  pub fn waves(&self) -> Option<Vec<Vec<usize>>> {
    let order = self.execution_order()?;
    let mut level = vec![0usize; self.len()];

    for &step in &order {
      level[step] = self
        .dependencies(step)
        .iter()
        .map(|&dep| level[dep] + 1)
        .max()
        .unwrap_or(0);
    }

    let max_level = level.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<usize>> = vec![Vec::new(); max_level + 1];
    for step in 0..self.len() {
      waves[level[step]].push(step);
    }
    waves.retain(|w| !w.is_empty());
    Some(waves)
  }

  /// Render the graph in Graphviz DOT format. Edges point from producer to
  /// consumer and are labelled with the item that links them.
  pub fn to_dot(&self, names: &[&str]) -> String {
    let mut out = String::from("digraph {\n    node [shape=rectangle];\n    rankdir=LR;\n\n");

    for (step, name) in names.iter().enumerate().take(self.len()) {
      out.push_str(&format!("    {}; // {}\n", quote(name), step));
    }
    out.push('\n');

    let mut edges: Vec<(usize, usize, ItemId)> = self
      .graph
      .edge_references()
      .map(|e| (self.graph[e.source()], self.graph[e.target()], *e.weight()))
      .collect();
    edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    for (from, to, item) in edges {
      out.push_str(&format!(
        "    {} -> {} [label={}];\n",
        quote(names[from]),
        quote(names[to]),
        quote(item.name())
      ));
    }

    out.push_str("}\n");
    out
  }
}

fn quote(input: &str) -> String {
  format!("\"{}\"", input.replace('\\', "\\\\").replace('"', "\\\""))
}
