//! Insertion-ordered entity list with O(1) membership.

use std::collections::HashSet;
use std::hash::Hash;

/// Unordered in meaning but iterated in insertion order; adding a member
/// twice is tolerated and keeps the first position.
#[derive(Clone, Debug)]
pub struct EntityList<T: Copy + Eq + Hash> {
    items: Vec<T>,
    members: HashSet<T>,
}

impl<T: Copy + Eq + Hash> Default for EntityList<T> {
    fn default() -> Self {
        EntityList { items: Vec::new(), members: HashSet::new() }
    }
}

impl<T: Copy + Eq + Hash> EntityList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `item` was already present.
    pub fn add(&mut self, item: T) -> bool {
        if self.members.insert(item) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.members.contains(item)
    }

    pub fn remove(&mut self, item: &T) -> bool {
        if self.members.remove(item) {
            self.items.retain(|x| x != item);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.items.iter().copied()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Copy + Eq + Hash> FromIterator<T> for EntityList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = EntityList::new();
        for x in iter {
            list.add(x);
        }
        list
    }
}

impl<T: Copy + Eq + Hash> Extend<T> for EntityList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for x in iter {
            self.add(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_position_of_duplicates() {
        let list: EntityList<u32> = [3, 1, 3, 2, 1].into_iter().collect();
        assert_eq!(list.as_slice(), &[3, 1, 2]);
        assert!(list.contains(&2));
    }

    #[test]
    fn remove_preserves_order() {
        let mut list: EntityList<u32> = [5, 6, 7].into_iter().collect();
        assert!(list.remove(&6));
        assert!(!list.remove(&6));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![5, 7]);
    }
}
