//! Query surface for editor collaborators: resolved types by node or by
//! source offset, read straight out of the pass's cache.

use sift_binder::BinderState;
use sift_solver::{EvalKey, TypeCache, TypeId};
use sift_syntax::{NodeArena, NodeId};

/// Resolved type of a node at its recorded flow position, if the pass
/// computed one.
pub fn type_of(cache: &TypeCache, binder: &BinderState, node: NodeId) -> Option<TypeId> {
    let flow = binder.flow_at(node);
    cache.lookup(EvalKey { node, flow }).map(|(ty, _)| ty)
}

/// Smallest node containing `offset` that has a resolved type — the
/// hover query.
pub fn type_at_offset(
    arena: &NodeArena,
    binder: &BinderState,
    cache: &TypeCache,
    offset: u32,
) -> Option<(NodeId, TypeId)> {
    let node = arena.node_at_offset(offset)?;
    // The innermost node may be un-evaluated (e.g. a bare annotation
    // fragment); fall back outward through containing nodes.
    let mut candidate = Some(node);
    while let Some(current) = candidate {
        if let Some(ty) = type_of(cache, binder, current) {
            return Some((current, ty));
        }
        let range = arena.range(current);
        candidate = (0..arena.len() as u32)
            .map(NodeId)
            .filter(|&other| range.contained_in(arena.range(other)))
            .filter(|&other| arena.range(other).len > range.len)
            .min_by_key(|&other| arena.range(other).len);
    }
    None
}
