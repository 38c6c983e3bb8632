/// Index-tracked max-heap used as the open list of graph searches
///
/// The heap does not own its items. It stores indexes into an external item slice
/// (for searches: the per-thread node array) and every item caches the heap slot it
/// currently occupies. Because an item always knows where it is:
/// - `contains` is O(1)
/// - `update_priority` (decrease/increase-key) is O(log n) without a scan
/// - arbitrary `remove` is O(log n)
///
/// The heap relies on callers keeping single membership: an item may only be added
/// while its cached slot is `None`.

use std::cmp::Ordering;

use crate::error::HeapError;

/// An item that can live in a [`RefMaxHeap`]
pub trait HeapItem {
    /// Slot currently occupied in the heap, `None` when absent
    fn heap_index(&self) -> Option<usize>;

    fn set_heap_index(&mut self, slot: Option<usize>);

    /// `Greater` means `self` should sit closer to the root than `other`
    fn priority_cmp(&self, other: &Self) -> Ordering;
}

/// Array-backed binary max-heap over indexes into an external item store
#[derive(Debug, Clone, Default)]
pub struct RefMaxHeap {
    /// Heap-ordered item indexes; `indexes[0]` is the maximum
    indexes: Vec<usize>,
}

impl RefMaxHeap {
    pub fn new() -> Self {
        Self { indexes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indexes: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Heap-ordered view of the stored item indexes
    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    /// Index of the maximum item without removing it
    pub fn peek(&self) -> Option<usize> {
        self.indexes.first().copied()
    }

    /// Insert `items[index]` and restore the heap condition
    pub fn add<T: HeapItem>(&mut self, items: &mut [T], index: usize) {
        debug_assert!(
            items[index].heap_index().is_none(),
            "item {} is already held by the heap",
            index
        );
        let slot = self.indexes.len();
        self.indexes.push(index);
        items[index].set_heap_index(Some(slot));
        self.sift_up(items, slot);
    }

    /// Remove and return the index of the maximum item
    pub fn remove_first<T: HeapItem>(&mut self, items: &mut [T]) -> Result<usize, HeapError> {
        if self.indexes.is_empty() {
            return Err(HeapError::EmptyStructure);
        }
        Ok(self.remove_slot(items, 0))
    }

    /// O(1) membership test through the item's cached slot
    pub fn contains<T: HeapItem>(&self, items: &[T], index: usize) -> bool {
        match items.get(index).and_then(HeapItem::heap_index) {
            Some(slot) => self.indexes.get(slot) == Some(&index),
            None => false,
        }
    }

    /// Re-heapify after the priority of `items[index]` changed externally
    pub fn update_priority<T: HeapItem>(
        &mut self,
        items: &mut [T],
        index: usize,
    ) -> Result<(), HeapError> {
        let slot = self.slot_of(items, index)?;
        let slot = self.sift_up(items, slot);
        self.sift_down(items, slot);
        Ok(())
    }

    /// Remove an arbitrary item
    pub fn remove<T: HeapItem>(&mut self, items: &mut [T], index: usize) -> Result<(), HeapError> {
        let slot = self.slot_of(items, index)?;
        self.remove_slot(items, slot);
        Ok(())
    }

    /// Empty the heap, resetting the cached slot of every remaining item
    pub fn clear<T: HeapItem>(&mut self, items: &mut [T]) {
        for &index in &self.indexes {
            if let Some(item) = items.get_mut(index) {
                item.set_heap_index(None);
            }
        }
        self.indexes.clear();
    }

    fn slot_of<T: HeapItem>(&self, items: &[T], index: usize) -> Result<usize, HeapError> {
        match items.get(index).and_then(HeapItem::heap_index) {
            Some(slot) if self.indexes.get(slot) == Some(&index) => Ok(slot),
            _ => Err(HeapError::NotInHeap(index)),
        }
    }

    fn remove_slot<T: HeapItem>(&mut self, items: &mut [T], slot: usize) -> usize {
        let removed = self.indexes.swap_remove(slot);
        items[removed].set_heap_index(None);

        if slot < self.indexes.len() {
            items[self.indexes[slot]].set_heap_index(Some(slot));
            let slot = self.sift_up(items, slot);
            self.sift_down(items, slot);
        }
        removed
    }

    /// Returns the slot the item ended up in
    fn sift_up<T: HeapItem>(&mut self, items: &mut [T], mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            let child_item = &items[self.indexes[slot]];
            let parent_item = &items[self.indexes[parent]];
            if child_item.priority_cmp(parent_item) != Ordering::Greater {
                break;
            }
            self.swap(items, slot, parent);
            slot = parent;
        }
        slot
    }

    fn sift_down<T: HeapItem>(&mut self, items: &mut [T], mut slot: usize) {
        let len = self.indexes.len();
        loop {
            let left = slot * 2 + 1;
            if left >= len {
                break;
            }
            let right = left + 1;

            let mut best = left;
            if right < len
                && items[self.indexes[right]].priority_cmp(&items[self.indexes[left]])
                    == Ordering::Greater
            {
                best = right;
            }

            if items[self.indexes[best]].priority_cmp(&items[self.indexes[slot]])
                != Ordering::Greater
            {
                break;
            }
            self.swap(items, slot, best);
            slot = best;
        }
    }

    fn swap<T: HeapItem>(&mut self, items: &mut [T], a: usize, b: usize) {
        self.indexes.swap(a, b);
        items[self.indexes[a]].set_heap_index(Some(a));
        items[self.indexes[b]].set_heap_index(Some(b));
    }
}
