//! Dominator tree update plumbing.
//!
//! Rewrites do not maintain a dominator tree themselves; they report the
//! edges they insert and delete to a sink, and the sink owner decides what
//! to do with the stream. Updates for an edge cancel pairwise, so a sink
//! only ever needs the net effect.

use serde::{Deserialize, Serialize};

use crate::ir::BlockId;

/// A CFG edge mutation, in the order it was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomUpdate {
    Insert(BlockId, BlockId),
    Delete(BlockId, BlockId),
}

impl DomUpdate {
    pub fn edge(self) -> (BlockId, BlockId) {
        match self {
            DomUpdate::Insert(a, b) | DomUpdate::Delete(a, b) => (a, b),
        }
    }
}

/// Receiver for dominator updates emitted by rewrites.
pub trait DomUpdateSink {
    fn apply_updates(&mut self, updates: &[DomUpdate]);
}

/// Sink that records the raw update stream, mostly for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub updates: Vec<DomUpdate>,
}

impl DomUpdateSink for RecordingSink {
    fn apply_updates(&mut self, updates: &[DomUpdate]) {
        self.updates.extend_from_slice(updates);
    }
}

/// Reduce an update stream to its net effect: for each edge, only the last
/// operation survives, and it is dropped if it matches the edge's state
/// before the stream (an insert of an edge that was then deleted cancels).
pub fn net_updates(updates: &[DomUpdate]) -> Vec<DomUpdate> {
    let mut out: Vec<DomUpdate> = Vec::new();
    for &update in updates {
        let edge = update.edge();
        match out.iter().position(|u| u.edge() == edge) {
            Some(pos) => {
                let prior = out.remove(pos);
                // Insert then Delete (or the reverse) of the same edge is a
                // no-op overall.
                if std::mem::discriminant(&prior) != std::mem::discriminant(&update) {
                    continue;
                }
                out.push(update);
            }
            None => out.push(update),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    fn b(i: u32) -> BlockId {
        BlockId::new(i)
    }

    /// An insert followed by a delete of the same edge cancels out.
    #[test]
    fn insert_then_delete_cancels() {
        let stream = [
            DomUpdate::Insert(b(0), b(1)),
            DomUpdate::Delete(b(0), b(1)),
        ];
        assert!(net_updates(&stream).is_empty());
    }

    /// Distinct edges pass through untouched, in order.
    #[test]
    fn distinct_edges_survive() {
        let stream = [
            DomUpdate::Delete(b(0), b(2)),
            DomUpdate::Insert(b(1), b(2)),
        ];
        assert_eq!(net_updates(&stream), stream.to_vec());
    }

    /// Repeating the same operation on an edge keeps a single copy.
    #[test]
    fn duplicate_operation_deduplicates() {
        let stream = [
            DomUpdate::Delete(b(0), b(1)),
            DomUpdate::Delete(b(0), b(1)),
        ];
        assert_eq!(net_updates(&stream), vec![DomUpdate::Delete(b(0), b(1))]);
    }
}
