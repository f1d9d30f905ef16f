//! Native range-index module
//!
//! The container's multi-dimensional range index, backed by an `rstar`
//! R*-tree. An index is registered against a feature table's id and
//! geometry columns and maps each feature id to a 2-D box. An id may also
//! hold an empty slot (no box): it counts as an entry but lies outside every
//! query box.

use crate::envelope::Envelope;
use rstar::{AABB, RTree, RTreeObject};
use rustc_hash::FxHashMap;

/// A boxed entry stored in the R-tree
#[derive(Debug, Clone, PartialEq)]
pub struct RangeEntry {
    pub id: i64,
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl RangeEntry {
    fn new(id: i64, envelope: &Envelope) -> Self {
        Self {
            id,
            min: [envelope.min_x, envelope.min_y],
            max: [envelope.max_x, envelope.max_y],
        }
    }

    fn to_envelope(&self) -> Envelope {
        Envelope::xy(self.min[0], self.max[0], self.min[1], self.max[1])
    }
}

impl RTreeObject for RangeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// One registered range index
pub struct RangeIndex {
    name: String,
    tree: RTree<RangeEntry>,
    slots: FxHashMap<i64, Option<RangeEntry>>,
}

impl RangeIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: RTree::new(),
            slots: FxHashMap::default(),
        }
    }

    /// Build an index in one pass from `(id, box)` pairs.
    pub fn bulk_load(name: impl Into<String>, entries: Vec<(i64, Option<Envelope>)>) -> Self {
        let mut slots = FxHashMap::default();
        let mut boxed = Vec::with_capacity(entries.len());
        for (id, envelope) in entries {
            let entry = envelope.map(|e| RangeEntry::new(id, &e));
            if let Some(ref entry) = entry {
                boxed.push(entry.clone());
            }
            slots.insert(id, entry);
        }

        Self {
            name: name.into(),
            tree: RTree::bulk_load(boxed),
            slots,
        }
    }

    /// Virtual table name, `rtree_<table>_<column>`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace the entry for an id. `None` stores an empty slot.
    pub fn insert(&mut self, id: i64, envelope: Option<&Envelope>) {
        self.delete(id);
        let entry = envelope.map(|e| RangeEntry::new(id, e));
        if let Some(ref entry) = entry {
            self.tree.insert(entry.clone());
        }
        self.slots.insert(id, entry);
    }

    /// Remove the entry for an id. Returns whether one existed.
    pub fn delete(&mut self, id: i64) -> bool {
        match self.slots.remove(&id) {
            Some(Some(entry)) => {
                self.tree.remove(&entry);
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.slots.contains_key(&id)
    }

    /// Ids whose box intersects the X/Y extent of `envelope`, sorted.
    pub fn intersecting(&self, envelope: &Envelope) -> Vec<i64> {
        let query = AABB::from_corners(
            [envelope.min_x, envelope.min_y],
            [envelope.max_x, envelope.max_y],
        );
        let mut ids: Vec<i64> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn count_intersecting(&self, envelope: &Envelope) -> usize {
        let query = AABB::from_corners(
            [envelope.min_x, envelope.min_y],
            [envelope.max_x, envelope.max_y],
        );
        self.tree.locate_in_envelope_intersecting(&query).count()
    }

    /// All ids, empty slots included, sorted.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Union of all stored boxes
    pub fn extent(&self) -> Option<Envelope> {
        self.tree
            .iter()
            .map(RangeEntry::to_envelope)
            .reduce(|a, b| a.union(&b))
    }

    /// Entries as `(id, box)` pairs, sorted by id.
    pub fn entries(&self) -> Vec<(i64, Option<Envelope>)> {
        let mut entries: Vec<(i64, Option<Envelope>)> = self
            .slots
            .iter()
            .map(|(id, entry)| (*id, entry.as_ref().map(RangeEntry::to_envelope)))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }

    /// Number of entries, empty slots included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_query_delete() {
        let mut index = RangeIndex::new("rtree_t_geom");
        index.insert(1, Some(&Envelope::point(1.0, 1.0)));
        index.insert(2, Some(&Envelope::xy(5.0, 6.0, 5.0, 6.0)));
        index.insert(3, None);

        assert_eq!(index.len(), 3);
        let query = Envelope::xy(0.0, 2.0, 0.0, 2.0);
        assert_eq!(index.intersecting(&query), vec![1]);
        assert_eq!(index.count_intersecting(&Envelope::xy(-100.0, 100.0, -100.0, 100.0)), 2);

        assert!(index.delete(1));
        assert!(!index.delete(1));
        assert!(index.delete(3));
        assert_eq!(index.ids(), vec![2]);
    }

    #[test]
    fn test_replace_moves_entry() {
        let mut index = RangeIndex::new("rtree_t_geom");
        index.insert(7, Some(&Envelope::point(0.0, 0.0)));
        index.insert(7, Some(&Envelope::point(50.0, 50.0)));

        assert_eq!(index.len(), 1);
        assert!(index.intersecting(&Envelope::point(0.0, 0.0)).is_empty());
        assert_eq!(index.intersecting(&Envelope::point(50.0, 50.0)), vec![7]);
    }

    #[test]
    fn test_empty_slots_never_match() {
        let mut index = RangeIndex::new("rtree_t_geom");
        index.insert(1, None);
        assert_eq!(index.count_intersecting(&Envelope::point(0.0, 0.0)), 0);
        assert!(index.contains(1));
        assert_eq!(index.extent(), None);
    }

    #[test]
    fn test_bulk_load_matches_incremental() {
        let entries = vec![
            (1, Some(Envelope::xy(0.0, 1.0, 0.0, 1.0))),
            (2, None),
            (3, Some(Envelope::xy(-3.0, -2.0, 4.0, 9.0))),
        ];
        let index = RangeIndex::bulk_load("rtree_t_geom", entries.clone());
        assert_eq!(index.entries(), entries);
        assert_eq!(index.extent(), Some(Envelope::xy(-3.0, 1.0, 0.0, 9.0)));
    }
}
