//! Containment tree built from a flat diagram.
//!
//! Nodes live in an arena indexed by [`NodeIndex`]. Parent links and child
//! lists are stored as indices, never as owning pointers, so the tree can be
//! shared read-only across worker tasks.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{EstimationError, EstimationResult};
use crate::models::{Diagram, DiagramEdge, DiagramNode, ResourceNode, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct DiagramGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, NodeIndex>,
    parents: Vec<Option<NodeIndex>>,
    children: Vec<Vec<NodeIndex>>,
    roots: Vec<NodeIndex>,
    order: Vec<NodeIndex>,
    edges: Vec<DiagramEdge>,
}

impl DiagramGraph {
    /// Build the containment tree.
    ///
    /// Fails with `MalformedGraph` on duplicate ids, dangling parent
    /// references, or containment cycles. `default_region` applies to root
    /// nodes that carry no region of their own.
    pub fn build(diagram: &Diagram, default_region: &str) -> EstimationResult<Self> {
        let count = diagram.nodes.len();
        if count > u32::MAX as usize {
            return Err(EstimationError::InvalidInput(format!(
                "diagram has too many nodes ({})",
                count
            )));
        }

        let mut index = HashMap::with_capacity(count);
        for (i, node) in diagram.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(EstimationError::malformed(
                    format!("#{}", i),
                    "node id must not be empty",
                ));
            }
            if index.insert(node.id.clone(), NodeIndex::new(i)).is_some() {
                return Err(EstimationError::malformed(&node.id, "duplicate node id"));
            }
        }

        let mut parents = Vec::with_capacity(count);
        for node in &diagram.nodes {
            let parent = match node.parent_id.as_deref() {
                None => None,
                Some(parent_id) if parent_id == node.id => {
                    return Err(EstimationError::malformed(
                        &node.id,
                        "containment cycle: node is its own parent",
                    ));
                }
                Some(parent_id) => Some(*index.get(parent_id).ok_or_else(|| {
                    EstimationError::malformed(
                        &node.id,
                        format!("parent '{}' does not exist", parent_id),
                    )
                })?),
            };
            parents.push(parent);
        }

        detect_cycles(&diagram.nodes, &parents)?;

        let mut children = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[p.index()].push(NodeIndex::new(i)),
                None => roots.push(NodeIndex::new(i)),
            }
        }

        let order = preorder(&roots, &children, count);

        let mut regions: Vec<Option<String>> = vec![None; count];
        for idx in &order {
            let node = &diagram.nodes[idx.index()];
            let inherited = parents[idx.index()]
                .and_then(|p| regions[p.index()].clone())
                .unwrap_or_else(|| default_region.to_string());
            regions[idx.index()] = Some(own_region(node).unwrap_or(inherited));
        }

        let nodes = diagram
            .nodes
            .iter()
            .zip(regions)
            .map(|(node, region)| ResourceNode {
                id: node.id.clone(),
                kind: node.kind,
                resource_type: ResourceType::from_label(&node.data.resource_type),
                type_label: node.data.resource_type.clone(),
                name: display_name(node),
                config: node.data.config.clone(),
                parent_id: node.parent_id.clone(),
                region: region.unwrap_or_else(|| default_region.to_string()),
            })
            .collect();

        debug!(
            nodes = count,
            roots = roots.len(),
            edges = diagram.edges.len(),
            "Built containment tree"
        );

        Ok(Self {
            nodes,
            index,
            parents,
            children,
            roots,
            order,
            edges: diagram.edges.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &ResourceNode {
        &self.nodes[index.index()]
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|idx| self.node(*idx))
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.parents[index.index()]
    }

    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.children[index.index()]
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Containers before their contents, siblings in input order
    pub fn containment_order(&self) -> &[NodeIndex] {
        &self.order
    }

    /// Billable resource nodes in containment order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceNode> + '_ {
        self.order
            .iter()
            .map(|idx| self.node(*idx))
            .filter(|node| node.is_billable())
    }

    /// User-drawn edges, untouched
    pub fn edges(&self) -> &[DiagramEdge] {
        &self.edges
    }
}

/// Walk every parent chain with a visited set. The first node seen twice on
/// the current chain is reported.
fn detect_cycles(nodes: &[DiagramNode], parents: &[Option<NodeIndex>]) -> EstimationResult<()> {
    let mut state = vec![Visit::Unvisited; nodes.len()];
    let mut chain = Vec::new();

    for start in 0..nodes.len() {
        let mut current = Some(NodeIndex::new(start));
        while let Some(idx) = current {
            match state[idx.index()] {
                Visit::Done => break,
                Visit::InProgress => {
                    return Err(EstimationError::malformed(
                        &nodes[idx.index()].id,
                        "containment cycle detected",
                    ));
                }
                Visit::Unvisited => {
                    state[idx.index()] = Visit::InProgress;
                    chain.push(idx);
                    current = parents[idx.index()];
                }
            }
        }
        for idx in chain.drain(..) {
            state[idx.index()] = Visit::Done;
        }
    }
    Ok(())
}

fn preorder(roots: &[NodeIndex], children: &[Vec<NodeIndex>], count: usize) -> Vec<NodeIndex> {
    let mut order = Vec::with_capacity(count);
    let mut stack: Vec<NodeIndex> = roots.iter().rev().copied().collect();
    while let Some(idx) = stack.pop() {
        order.push(idx);
        stack.extend(children[idx.index()].iter().rev().copied());
    }
    order
}

fn own_region(node: &DiagramNode) -> Option<String> {
    if let Some(region) = non_empty(node.data.region.as_deref()) {
        return Some(region.to_string());
    }
    if ResourceType::from_label(&node.data.resource_type) == ResourceType::Region {
        return ["code", "name"]
            .iter()
            .find_map(|key| non_empty(node.data.config.get(*key).and_then(|v| v.as_str())))
            .map(str::to_string);
    }
    None
}

fn display_name(node: &DiagramNode) -> String {
    non_empty(node.data.label.as_deref())
        .or_else(|| non_empty(node.data.config.get("name").and_then(|v| v.as_str())))
        .unwrap_or(node.id.as_str())
        .to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
