use super::model::Category;
use std::collections::HashMap;

/// Result of translating an old identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Known(i64),
    /// The record has not been persisted (yet, or ever).
    NotYetKnown,
}


/// Per-category old-id to new-id tables, indexed by `Category`.
#[derive(Debug, Clone)]
pub struct RemapTables {
    maps: [HashMap<i64, i64>; Category::COUNT],
}

impl Default for RemapTables {
    fn default() -> Self {
        Self::new()
    }
}

impl RemapTables {
    pub fn new() -> Self {
        let maps = std::array::from_fn(|_| {
            let mut m = HashMap::new();
            m.insert(0, 0);
            m
        });
        RemapTables { maps }
    }

    pub fn lookup(&self, category: Category, old_id: i64) -> Lookup {
        match self.maps[category.index()].get(&old_id) {
            Some(v) => Lookup::Known(*v),
            None => Lookup::NotYetKnown,
        }
    }

    /// Registers a persisted record. Fails when the old id was already
    /// registered in the same category; zero can never be re-registered.
    pub fn record(&mut self, category: Category, old_id: i64, new_id: i64) -> Result<(), i64> {
        let map = &mut self.maps[category.index()];
        if let Some(existing) = map.get(&old_id) {
            return Err(*existing);
        }
        map.insert(old_id, new_id);
        Ok(())
    }

    /// Number of real (non-sentinel) entries for `category`.
    pub fn len(&self, category: Category) -> usize {
        self.maps[category.index()].len() - 1
    }

    pub fn is_empty(&self, category: Category) -> bool {
        self.len(category) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_zero_maps_to_zero_everywhere() {
        let t = RemapTables::new();
        for c in Category::ALL {
            assert_eq!(t.lookup(c, 0), Lookup::Known(0));
            assert!(t.is_empty(c));
        }
    }

    #[test]
    fn categories_do_not_share_id_spaces() {
        let mut t = RemapTables::new();
        t.record(Category::Clip, 5, 100).expect("record clip");
        assert_eq!(t.lookup(Category::Clip, 5), Lookup::Known(100));
        assert_eq!(t.lookup(Category::Collection, 5), Lookup::NotYetKnown);
    }

    #[test]
    fn lookup_before_insert_is_not_yet_known() {
        let mut t = RemapTables::new();
        assert_eq!(t.lookup(Category::Collection, 3), Lookup::NotYetKnown);
        t.record(Category::Collection, 3, 11).expect("record");
        assert_eq!(t.lookup(Category::Collection, 3), Lookup::Known(11));
    }

    #[test]
    fn duplicate_old_id_is_rejected() {
        let mut t = RemapTables::new();
        t.record(Category::Episode, 2, 20).expect("first");
        assert_eq!(t.record(Category::Episode, 2, 21), Err(20));
        assert_eq!(t.record(Category::Episode, 0, 5), Err(0));
        assert_eq!(t.len(Category::Episode), 1);
    }
}
