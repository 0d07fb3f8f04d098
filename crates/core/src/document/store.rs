//! Object cache indexed by object number.

use crate::model::PdfObject;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Materialized objects, one slot per object number. Slots grow on insert.
///
/// Slots filled lazily in partial mode are tracked so they can be released
/// again. Pinned slots are never released.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Vec<Option<Arc<PdfObject>>>,
    pinned: FxHashSet<u32>,
    partial_loaded: FxHashSet<u32>,
    last_partial: Option<u32>,
}

impl ObjectStore {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, num: u32) -> Option<Arc<PdfObject>> {
        self.objects.get(num as usize).cloned().flatten()
    }

    pub fn contains(&self, num: u32) -> bool {
        matches!(self.objects.get(num as usize), Some(Some(_)))
    }

    /// Populated slot count.
    pub fn loaded(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    /// Fill a slot permanently.
    pub fn insert(&mut self, num: u32, obj: Arc<PdfObject>) {
        let idx = num as usize;
        if idx >= self.objects.len() {
            self.objects.resize(idx + 1, None);
        }
        self.objects[idx] = Some(obj);
    }

    /// Fill a slot on demand; it becomes the release-last candidate.
    pub fn insert_partial(&mut self, num: u32, obj: Arc<PdfObject>) {
        self.insert(num, obj);
        self.partial_loaded.insert(num);
        self.last_partial = Some(num);
    }

    pub fn pin(&mut self, num: u32) {
        self.pinned.insert(num);
    }

    pub fn is_pinned(&self, num: u32) -> bool {
        self.pinned.contains(&num)
    }

    /// Evict a lazily loaded, unpinned slot. Returns whether it was evicted.
    pub fn release(&mut self, num: u32) -> bool {
        if self.pinned.contains(&num) || !self.partial_loaded.remove(&num) {
            return false;
        }
        if self.last_partial == Some(num) {
            self.last_partial = None;
        }
        match self.objects.get_mut(num as usize) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }

    /// Evict the most recent lazily loaded slot.
    pub fn release_last(&mut self) -> bool {
        match self.last_partial {
            Some(num) => self.release(num),
            None => false,
        }
    }

    /// Drop a slot regardless of how it was filled.
    pub fn remove(&mut self, num: u32) -> Option<Arc<PdfObject>> {
        self.partial_loaded.remove(&num);
        self.pinned.remove(&num);
        if self.last_partial == Some(num) {
            self.last_partial = None;
        }
        self.objects.get_mut(num as usize).and_then(Option::take)
    }
}
