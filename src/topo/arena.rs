//! Slot arena with handle invalidation.

/// Entities live in slots; deleting one empties its slot so stale handles
/// are detected instead of aliasing a newer entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn push(&mut self, value: T) -> usize {
        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    /// Overwrite a slot, returning the previous content.
    pub fn replace(&mut self, index: usize, value: Option<T>) -> Option<T> {
        match self.slots.get_mut(index) {
            Some(slot) => std::mem::replace(slot, value),
            None => None,
        }
    }

    pub fn pop(&mut self) {
        self.slots.pop();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// How to reverse one arena write.
#[derive(Clone, Debug)]
pub enum ArenaOp<T> {
    /// A slot was appended; undo pops it.
    Inserted,
    /// A slot was overwritten; undo restores the old content.
    Replaced(usize, Option<T>),
}

impl<T> ArenaOp<T> {
    pub fn undo(self, arena: &mut Arena<T>) {
        match self {
            ArenaOp::Inserted => arena.pop(),
            ArenaOp::Replaced(index, old) => {
                arena.replace(index, old);
            }
        }
    }
}
