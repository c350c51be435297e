//! Sorted container of unique items.
//!
//! Ordering comes from a caller-supplied strict less-than function; uniqueness
//! comes from the item's own `PartialEq`, so two items may sort side by side
//! without being considered the same entry. Inserts and deletes are linear.

/// Strict "sorts before" relation.
pub type LessFn<T> = fn(&T, &T) -> bool;

#[derive(Debug, Clone)]
pub struct OrderedSet<T> {
    items: Vec<T>,
    less: LessFn<T>,
}

impl<T: PartialEq> OrderedSet<T> {
    pub fn new(less: LessFn<T>) -> Self {
        Self {
            items: Vec::new(),
            less,
        }
    }

    /// Insert `item` in sort order. Returns false if an equal item is already present.
    pub fn add(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        let less = self.less;
        // Equal-ranked items land after existing ones, keeping arrival order stable.
        let idx = self.items.partition_point(|existing| !less(&item, existing));
        self.items.insert(idx, item);
        true
    }

    /// Remove the first item equal to `item`, returning it.
    pub fn delete(&mut self, item: &T) -> Option<T> {
        let idx = self.items.iter().position(|existing| existing == item)?;
        Some(self.items.remove(idx))
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|existing| existing == item)
    }

    /// Find the stored item equal to `item`.
    pub fn get(&self, item: &T) -> Option<&T> {
        self.items.iter().find(|existing| *existing == item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Visit every item in order. The set is borrowed shared for the whole walk.
    pub fn for_each<F: FnMut(&T)>(&self, f: F) {
        self.items.iter().for_each(f);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
