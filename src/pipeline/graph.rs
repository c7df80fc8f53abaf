//! Element graph using daggy.
//!
//! Nodes hold the pipeline's elements. A removed element leaves an empty
//! node behind so that [`ElementId`]s stay valid. Edges are weighted with
//! the number of pad links between the two elements; the DAG rejects links
//! that would close a cycle and gives the order in which elements change
//! state.

use crate::element::Element;
use daggy::petgraph::Direction;
use daggy::petgraph::algo::toposort;
use daggy::petgraph::visit::EdgeRef;
use daggy::{Dag, NodeIndex};
use std::collections::HashMap;

/// Identifier of an element within its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) NodeIndex);

impl ElementId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Adding the edge would create a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WouldCycle;

pub(crate) struct Graph {
    dag: Dag<Option<Element>, u32>,
    by_name: HashMap<String, ElementId>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self {
            dag: Dag::new(),
            by_name: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, element: Element) -> ElementId {
        let name = element.name().to_string();
        let id = ElementId(self.dag.add_node(Some(element)));
        self.by_name.insert(name, id);
        id
    }

    pub(crate) fn remove(&mut self, id: ElementId) -> Option<Element> {
        let element = self.dag.node_weight_mut(id.0)?.take()?;
        self.by_name.remove(element.name());
        let mut edges: Vec<_> = self
            .dag
            .graph()
            .edges_directed(id.0, Direction::Outgoing)
            .chain(self.dag.graph().edges_directed(id.0, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        // Removing an edge moves the last edge into its slot, so remove
        // from the highest index down.
        edges.sort_unstable_by_key(|e| std::cmp::Reverse(e.index()));
        for edge in edges {
            self.dag.remove_edge(edge);
        }
        Some(element)
    }

    pub(crate) fn get(&self, id: ElementId) -> Option<&Element> {
        self.dag.node_weight(id.0)?.as_ref()
    }

    pub(crate) fn find(&self, name: &str) -> Option<ElementId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn find_element(&self, element: &Element) -> Option<ElementId> {
        self.find(element.name())
            .filter(|id| self.get(*id) == Some(element))
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Live elements in insertion order.
    pub(crate) fn ids(&self) -> Vec<ElementId> {
        self.dag
            .graph()
            .node_indices()
            .filter(|idx| self.dag.node_weight(*idx).is_some_and(Option::is_some))
            .map(ElementId)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Record one more pad link between `src` and `sink`.
    pub(crate) fn add_link(&mut self, src: ElementId, sink: ElementId) -> Result<(), WouldCycle> {
        if let Some(edge) = self.dag.find_edge(src.0, sink.0) {
            if let Some(count) = self.dag.edge_weight_mut(edge) {
                *count += 1;
            }
            return Ok(());
        }
        self.dag
            .add_edge(src.0, sink.0, 1)
            .map(|_| ())
            .map_err(|_| WouldCycle)
    }

    /// Forget one pad link between `src` and `sink`.
    pub(crate) fn remove_link(&mut self, src: ElementId, sink: ElementId) {
        let Some(edge) = self.dag.find_edge(src.0, sink.0) else {
            return;
        };
        let remaining = match self.dag.edge_weight_mut(edge) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return,
        };
        if remaining == 0 {
            self.dag.remove_edge(edge);
        }
    }

    /// Number of pad links from `src` to `sink`.
    pub(crate) fn link_count(&self, src: ElementId, sink: ElementId) -> u32 {
        self.dag
            .find_edge(src.0, sink.0)
            .and_then(|edge| self.dag.edge_weight(edge).copied())
            .unwrap_or(0)
    }

    /// Live elements, downstream ones first.
    pub(crate) fn sinks_first(&self) -> Vec<ElementId> {
        let mut order = match toposort(self.dag.graph(), None) {
            Ok(order) => order.into_iter().map(ElementId).collect(),
            // Unreachable: daggy refuses cyclic edges.
            Err(_) => self.ids(),
        };
        order.retain(|id| self.get(*id).is_some());
        order.reverse();
        order
    }

    pub(crate) fn sinks(&self) -> Vec<ElementId> {
        self.ids()
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(Element::is_sink))
            .collect()
    }

    pub(crate) fn sources(&self) -> Vec<ElementId> {
        self.ids()
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(Element::is_source))
            .collect()
    }
}
