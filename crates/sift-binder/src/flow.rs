//! Control-flow graph nodes.
//!
//! Flow nodes form a graph, not a tree: antecedent edges point backward
//! toward the start node, loops create cycles, and every traversal bounds
//! itself with a visited-id set. Nodes live in an arena addressed by
//! `FlowNodeId`.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sift_syntax::NodeId;
use smallvec::SmallVec;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FlowNodeId(pub u32);

impl FlowNodeId {
    pub const NONE: FlowNodeId = FlowNodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == FlowNodeId::NONE
    }
}

pub mod flow_flags {
    pub const UNREACHABLE: u32 = 1 << 0;
    pub const START: u32 = 1 << 1;
    pub const ASSIGNMENT: u32 = 1 << 2;
    pub const TRUE_CONDITION: u32 = 1 << 3;
    pub const FALSE_CONDITION: u32 = 1 << 4;
    pub const BRANCH_LABEL: u32 = 1 << 5;
    pub const LOOP_LABEL: u32 = 1 << 6;
    /// Execution resumed after a call that may have raised.
    pub const POST_CALL: u32 = 1 << 7;

    pub const CONDITION: u32 = TRUE_CONDITION | FALSE_CONDITION;
    pub const LABEL: u32 = BRANCH_LABEL | LOOP_LABEL;
}

#[derive(Clone, Debug)]
pub struct FlowNode {
    pub flags: u32,
    /// The syntax node the event refers to: the assignment statement, the
    /// tested expression, or the call. `NodeId::NONE` for labels and start.
    pub node: NodeId,
    pub antecedents: SmallVec<[FlowNodeId; 2]>,
}

impl FlowNode {
    pub fn has_any_flags(&self, flags: u32) -> bool {
        self.flags & flags != 0
    }
}

#[derive(Default)]
pub struct FlowNodeArena {
    nodes: Vec<FlowNode>,
}

impl FlowNodeArena {
    pub fn new() -> Self {
        FlowNodeArena::default()
    }

    pub fn alloc(&mut self, flags: u32) -> FlowNodeId {
        self.alloc_with_node(flags, NodeId::NONE)
    }

    pub fn alloc_with_node(&mut self, flags: u32, node: NodeId) -> FlowNodeId {
        let id = FlowNodeId(self.nodes.len() as u32);
        self.nodes.push(FlowNode {
            flags,
            node,
            antecedents: SmallVec::new(),
        });
        id
    }

    pub fn get(&self, id: FlowNodeId) -> Option<&FlowNode> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn add_antecedent(&mut self, label: FlowNodeId, antecedent: FlowNodeId) {
        if antecedent.is_none() || label == antecedent {
            return;
        }
        if let Some(node) = self.nodes.get_mut(label.0 as usize)
            && !node.antecedents.contains(&antecedent)
        {
            node.antecedents.push(antecedent);
        }
    }

    /// Whether no execution path reaches this node: either the dedicated
    /// unreachable node, or a label all of whose antecedents are themselves
    /// unreachable (e.g. the merge point after `if`/`else` arms that both
    /// return).
    pub fn is_unreachable(&self, id: FlowNodeId) -> bool {
        let mut visited = FxHashSet::default();
        self.is_unreachable_inner(id, &mut visited)
    }

    fn is_unreachable_inner(&self, id: FlowNodeId, visited: &mut FxHashSet<FlowNodeId>) -> bool {
        let Some(node) = self.get(id) else {
            return true;
        };
        if node.has_any_flags(flow_flags::UNREACHABLE) {
            return true;
        }
        if node.has_any_flags(flow_flags::START) {
            return false;
        }
        if !visited.insert(id) {
            // Cycle with no reachable entry.
            return true;
        }
        if node.antecedents.is_empty() {
            return node.has_any_flags(flow_flags::LABEL);
        }
        node.antecedents
            .iter()
            .all(|&a| self.is_unreachable_inner(a, visited))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
