//! Undo journal backing `TopoStore` checkpoints.

use super::arena::ArenaOp;
use super::types::*;
use crate::attrib::{Attribute, AttributeSlot};

pub type AttrKey = (EntityRef, AttributeSlot);

/// Pre-state of one store write.
#[derive(Clone, Debug)]
pub enum Undo {
    Vertex(ArenaOp<Vertex>),
    Edge(ArenaOp<Edge>),
    CoEdge(ArenaOp<CoEdge>),
    Wire(ArenaOp<Wire>),
    Face(ArenaOp<Face>),
    Shell(ArenaOp<Shell>),
    Body(ArenaOp<Body>),
    Attr(AttrKey, Option<Attribute>),
    Tag(u64),
}

/// Handle returned by `TopoStore::begin`. Checkpoints nest: rolling back an
/// outer checkpoint also discards everything its inner ones kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    depth: usize,
    mark: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Vec<Undo>,
    marks: Vec<usize>,
}

impl Journal {
    pub fn recording(&self) -> bool {
        !self.marks.is_empty()
    }

    pub fn record(&mut self, undo: Undo) {
        if self.recording() {
            self.entries.push(undo);
        }
    }

    pub fn begin(&mut self) -> Checkpoint {
        let cp = Checkpoint { depth: self.marks.len(), mark: self.entries.len() };
        self.marks.push(cp.mark);
        cp
    }

    pub fn is_open(&self, cp: Checkpoint) -> bool {
        self.marks.get(cp.depth) == Some(&cp.mark)
    }

    /// Close `cp` keeping its writes. They stay journaled for any enclosing
    /// checkpoint.
    pub fn commit(&mut self, cp: Checkpoint) {
        if !self.is_open(cp) {
            log::warn!("commit of a checkpoint that is no longer open");
            return;
        }
        self.marks.truncate(cp.depth);
        if self.marks.is_empty() {
            self.entries.clear();
        }
    }

    /// Close `cp` and hand back its writes, newest first.
    pub fn unwind(&mut self, cp: Checkpoint) -> Vec<Undo> {
        if !self.is_open(cp) {
            log::warn!("rollback to a checkpoint that is no longer open");
            return Vec::new();
        }
        self.marks.truncate(cp.depth);
        let mut undone = self.entries.split_off(cp.mark);
        undone.reverse();
        undone
    }

    pub fn depth(&self) -> usize {
        self.marks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_recorded_outside_a_checkpoint() {
        let mut j = Journal::default();
        j.record(Undo::Tag(1));
        let cp = j.begin();
        assert!(j.unwind(cp).is_empty());
    }

    #[test]
    fn inner_commit_is_undone_by_outer_rollback() {
        let mut j = Journal::default();
        let outer = j.begin();
        j.record(Undo::Tag(1));
        let inner = j.begin();
        j.record(Undo::Tag(2));
        j.commit(inner);
        assert_eq!(j.depth(), 1);
        let undone = j.unwind(outer);
        assert_eq!(undone.len(), 2);
        assert!(matches!(undone[0], Undo::Tag(2)));
        assert_eq!(j.depth(), 0);
    }

    #[test]
    fn stale_checkpoint_is_ignored() {
        let mut j = Journal::default();
        let cp = j.begin();
        j.commit(cp);
        assert!(!j.is_open(cp));
        assert!(j.unwind(cp).is_empty());
    }
}
