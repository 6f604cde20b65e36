use std::collections::BTreeMap;

use crate::error::{Result, Vda5050Error};

use super::edge::Edge;
use super::node::Node;
use super::SequenceId;

/// One slot in the graph arena: either a node or an edge, keyed
/// externally by its `sequence_id` in [`Graph`]'s map.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphElement {
    Node(Node),
    Edge(Edge),
}

impl GraphElement {
    pub fn sequence_id(&self) -> SequenceId {
        match self {
            GraphElement::Node(n) => n.sequence_id,
            GraphElement::Edge(e) => e.sequence_id,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            GraphElement::Node(n) => &n.node_id,
            GraphElement::Edge(e) => &e.edge_id,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, GraphElement::Node(_))
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, GraphElement::Edge(_))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            GraphElement::Node(n) => Some(n),
            GraphElement::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            GraphElement::Edge(e) => Some(e),
            GraphElement::Node(_) => None,
        }
    }

    pub fn map_id(&self) -> Option<&str> {
        match self {
            GraphElement::Node(n) => n.node_position.as_ref().map(|p| p.map_id.as_str()),
            GraphElement::Edge(_) => None,
        }
    }
}

fn is_base_element(el: &GraphElement) -> bool {
    match el {
        GraphElement::Node(n) => n.released,
        GraphElement::Edge(e) => e.released,
    }
}

/// Manages a VDA 5050 order graph.
///
/// Invariants (spec.md §3):
///   - never empty
///   - no base element has a sequence id greater than any horizon element
///   - the AGV position, if set, is a node, and is part of the base
#[derive(Debug, Clone)]
pub struct Graph {
    agv_pos: Option<SequenceId>,
    elements: BTreeMap<SequenceId, GraphElement>,
}

impl Graph {
    /// Builds a graph from elements, validating the base/horizon and
    /// even/odd invariants up front.
    pub fn new(elements: Vec<GraphElement>) -> Result<Self> {
        if elements.is_empty() {
            return Err(Vda5050Error::InvalidArgument(
                "graph must not be empty".into(),
            ));
        }
        let mut map = BTreeMap::new();
        for el in elements {
            let seq = el.sequence_id();
            match &el {
                GraphElement::Node(_) if !super::is_node_seq(seq) => {
                    return Err(Vda5050Error::InvalidArgument(format!(
                        "node sequence id {seq} must be even"
                    )))
                }
                GraphElement::Edge(_) if !super::is_edge_seq(seq) => {
                    return Err(Vda5050Error::InvalidArgument(format!(
                        "edge sequence id {seq} must be odd"
                    )))
                }
                _ => {}
            }
            map.insert(seq, el);
        }
        let graph = Self {
            agv_pos: None,
            elements: map,
        };
        graph.check_base_before_horizon()?;
        Ok(graph)
    }

    fn check_base_before_horizon(&self) -> Result<()> {
        if let (Some((_, base_last)), Some((horizon_first, _))) =
            (self.base_bounds_opt(), self.horizon_bounds_opt())
        {
            if base_last >= horizon_first {
                return Err(Vda5050Error::InvalidArgument(
                    "base element sequence id must be strictly less than any horizon element"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    fn base_bounds_opt(&self) -> Option<(SequenceId, SequenceId)> {
        let mut first = None;
        let mut last = None;
        for (seq, el) in &self.elements {
            if is_base_element(el) {
                first.get_or_insert(*seq);
                last = Some(*seq);
            }
        }
        first.zip(last)
    }

    fn horizon_bounds_opt(&self) -> Option<(SequenceId, SequenceId)> {
        let mut first = None;
        let mut last = None;
        for (seq, el) in &self.elements {
            if !is_base_element(el) {
                first.get_or_insert(*seq);
                last = Some(*seq);
            }
        }
        first.zip(last)
    }


    pub fn bounds(&self) -> (SequenceId, SequenceId) {
        let first = *self.elements.keys().next().expect("graph is never empty");
        let last = *self
            .elements
            .keys()
            .next_back()
            .expect("graph is never empty");
        (first, last)
    }

    pub fn has_base(&self) -> bool {
        self.base_bounds_opt().is_some()
    }

    pub fn has_horizon(&self) -> bool {
        self.horizon_bounds_opt().is_some()
    }

    pub fn base_bounds(&self) -> Result<(SequenceId, SequenceId)> {
        self.base_bounds_opt()
            .ok_or_else(|| Vda5050Error::InvalidArgument("graph has no base".into()))
    }

    pub fn horizon_bounds(&self) -> Result<(SequenceId, SequenceId)> {
        self.horizon_bounds_opt()
            .ok_or_else(|| Vda5050Error::InvalidArgument("graph has no horizon".into()))
    }

    pub fn at(&self, seq: SequenceId) -> Result<&GraphElement> {
        self.elements
            .get(&seq)
            .ok_or_else(|| Vda5050Error::InvalidArgument(format!("no element at sequence {seq}")))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SequenceId, &GraphElement)> {
        self.elements.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.elements.values().filter_map(|el| el.as_node())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.elements.values().filter_map(|el| el.as_edge())
    }

    /// Copies out the `[first, last]` range as a standalone graph.
    pub fn subgraph(&self, first: SequenceId, last: SequenceId) -> Result<Graph> {
        if first > last {
            return Err(Vda5050Error::InvalidArgument(
                "subgraph bounds are inverted".into(),
            ));
        }
        let elements: Vec<GraphElement> = self
            .elements
            .range(first..=last)
            .map(|(_, el)| el.clone())
            .collect();
        if elements.is_empty() {
            return Err(Vda5050Error::InvalidArgument(
                "subgraph bounds are not in range".into(),
            ));
        }
        Graph::new(elements)
    }

    /// Extends this graph with `other`.
    ///
    /// `other.first` must be either `self.base_last` (one-node overlap,
    /// the horizon is discarded and replaced) or `self.base_last + 1`
    /// (strict append). Returns the delta range of genuinely new
    /// sequence ids. On an overlapping seam, the node from `other` wins
    /// (see DESIGN.md — original-source open question (b)).
    pub fn extend(&mut self, other: Graph) -> Result<(SequenceId, SequenceId)> {
        let (_, base_last) = self.base_bounds().unwrap_or((0, 0));
        let (other_first, other_last) = other.bounds();

        let overlap = other_first == base_last;
        let strict_append = other_first == base_last + 1;
        if !overlap && !strict_append {
            return Err(Vda5050Error::InvalidArgument(format!(
                "extend seam mismatch: other.first={other_first}, expected {base_last} or {}",
                base_last + 1
            )));
        }

        if let (Some(a), Some(b)) = (self.agv_pos, other.agv_pos) {
            if a != b {
                return Err(Vda5050Error::InvalidArgument(
                    "both graphs claim different AGV positions".into(),
                ));
            }
        }

        // Drop the current horizon; it is superseded by `other`.
        self.elements.retain(|_, el| is_base_element(el));

        for (seq, el) in other.elements {
            self.elements.insert(seq, el);
        }
        if other.agv_pos.is_some() {
            self.agv_pos = other.agv_pos;
        }

        self.check_base_before_horizon()?;

        let delta_first = std::cmp::max(base_last + 1, other_first);
        Ok((delta_first, other_last))
    }

    pub fn clean_horizon(&mut self) {
        let base_only: BTreeMap<_, _> = self
            .elements
            .iter()
            .filter(|(_, el)| is_base_element(el))
            .map(|(&seq, el)| (seq, el.clone()))
            .collect();
        self.elements = base_only;
    }

    pub fn agv_here(&self) -> bool {
        self.agv_pos.is_some()
    }

    pub fn agv_position(&self) -> Result<SequenceId> {
        self.agv_pos
            .ok_or_else(|| Vda5050Error::InvalidArgument("AGV is not on this graph".into()))
    }

    /// Sets the AGV's last-visited node. `seq` must resolve to a node in
    /// the base (spec.md §3, §4.2).
    pub fn set_agv_last_node(&mut self, seq: SequenceId) -> Result<()> {
        let el = self.at(seq)?;
        if !el.is_node() {
            return Err(Vda5050Error::InvalidArgument(format!(
                "sequence {seq} is not a node"
            )));
        }
        if !is_base_element(el) {
            return Err(Vda5050Error::InvalidArgument(format!(
                "sequence {seq} is not in the base"
            )));
        }
        self.agv_pos = Some(seq);
        Ok(())
    }

    /// Drops everything before the AGV position.
    pub fn trim(&mut self) -> Result<()> {
        let pos = self.agv_position()?;
        self.elements = self.elements.split_off(&pos);
        Ok(())
    }

    /// The next released node after the AGV, if any.
    pub fn current_goal(&self) -> Result<Option<&GraphElement>> {
        let pos = self.agv_position()?;
        Ok(self
            .elements
            .range((pos + 1)..)
            .map(|(_, el)| el)
            .find(|el| el.is_node() && is_base_element(el)))
    }

    pub fn current_map(&self) -> Option<&str> {
        if let Ok(pos) = self.agv_position() {
            if let Some(el) = self.elements.get(&pos) {
                if let Some(map) = el.map_id() {
                    return Some(map);
                }
            }
        }
        self.elements.values().find_map(|el| el.map_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    fn node(seq: SequenceId, released: bool) -> GraphElement {
        GraphElement::Node(Node::new(format!("n{seq}"), seq, released))
    }

    fn edge(seq: SequenceId, released: bool) -> GraphElement {
        GraphElement::Edge(Edge::new(
            format!("e{seq}"),
            seq,
            released,
            "a".to_string(),
            "b".to_string(),
        ))
    }

    #[test]
    fn rejects_empty_graph() {
        assert!(Graph::new(vec![]).is_err());
    }

    #[test]
    fn rejects_odd_node_sequence() {
        let el = GraphElement::Node(Node::new("n1", 1, true));
        assert!(Graph::new(vec![el]).is_err());
    }

    #[test]
    fn rejects_base_after_horizon() {
        let elements = vec![node(0, false), edge(1, true), node(2, true)];
        assert!(Graph::new(elements).is_err());
    }

    #[test]
    fn extend_strict_append_succeeds() {
        let mut g = Graph::new(vec![node(0, true)]).unwrap();
        g.set_agv_last_node(0).unwrap();
        let other = Graph::new(vec![edge(1, true), node(2, true)]).unwrap();
        let (first, last) = g.extend(other).unwrap();
        assert_eq!((first, last), (1, 2));
        assert_eq!(g.bounds(), (0, 2));
    }

    #[test]
    fn extend_one_node_overlap_succeeds() {
        let mut g = Graph::new(vec![node(0, true)]).unwrap();
        g.set_agv_last_node(0).unwrap();
        // overlap at seam: other.first == base_last == 0
        let other = Graph::new(vec![node(0, true), edge(1, true), node(2, true)]).unwrap();
        let (first, last) = g.extend(other).unwrap();
        assert_eq!((first, last), (1, 2));
    }

    #[test]
    fn extend_wrong_seam_fails() {
        let mut g = Graph::new(vec![node(0, true)]).unwrap();
        let other = Graph::new(vec![node(4, true)]).unwrap();
        assert!(g.extend(other).is_err());
    }

    #[test]
    fn set_agv_last_node_rejects_horizon() {
        let mut g = Graph::new(vec![node(0, true), edge(1, false), node(2, false)]).unwrap();
        assert!(g.set_agv_last_node(2).is_err());
    }

    #[test]
    fn trim_drops_everything_before_agv() {
        let mut g = Graph::new(vec![node(0, true), edge(1, true), node(2, true)]).unwrap();
        g.set_agv_last_node(2).unwrap();
        g.trim().unwrap();
        assert_eq!(g.bounds(), (2, 2));
    }

    proptest::proptest! {
        /// Any well-formed alternating node/edge/node/.../node chain,
        /// all released, builds and reports bounds matching its first
        /// and last sequence ids (spec.md §3: base/horizon ordering and
        /// the even/odd sequence-id invariant hold for any such chain,
        /// not just the hand-picked cases above).
        #[test]
        fn well_formed_chain_always_builds(node_count in 1usize..12) {
            let mut elements = Vec::new();
            for i in 0..node_count {
                let seq = (i * 2) as SequenceId;
                elements.push(node(seq, true));
                if i + 1 < node_count {
                    elements.push(edge(seq + 1, true));
                }
            }
            let last_seq = ((node_count - 1) * 2) as SequenceId;
            let graph = Graph::new(elements).unwrap();
            prop_assert_eq!(graph.bounds(), (0, last_seq));
            prop_assert_eq!(graph.len(), node_count * 2 - 1);
        }

        /// Trimming at any base node never grows the graph and always
        /// leaves that node as the new first element.
        #[test]
        fn trim_never_grows_and_starts_at_agv(node_count in 1usize..12, trim_at in 0usize..12) {
            let trim_at = trim_at % node_count;
            let mut elements = Vec::new();
            for i in 0..node_count {
                let seq = (i * 2) as SequenceId;
                elements.push(node(seq, true));
                if i + 1 < node_count {
                    elements.push(edge(seq + 1, true));
                }
            }
            let before_len = elements.len();
            let mut graph = Graph::new(elements).unwrap();
            let trim_seq = (trim_at * 2) as SequenceId;
            graph.set_agv_last_node(trim_seq).unwrap();
            graph.trim().unwrap();
            prop_assert!(graph.len() <= before_len);
            prop_assert_eq!(graph.bounds().0, trim_seq);
        }
    }
}
