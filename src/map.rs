use crate::fingerprint::SimHasher;
use crate::store::SimStore;

/// Groups texts by near-duplicate fingerprint.
///
/// Wraps a [`SimStore`] whose ids index a value table: looking up a text
/// either lands on the value stored for an earlier fingerprint within
/// `max_dist` bits, or appends a fresh value under this text's fingerprint.
pub struct SimMap<T> {
    store: SimStore,
    values: Vec<T>,
    max_dist: u8,
}

impl<T> SimMap<T> {
    pub fn new(hasher: SimHasher, max_dist: u8) -> Self {
        SimMap {
            store: SimStore::new(hasher),
            values: Vec::new(),
            max_dist,
        }
    }

    /// Number of distinct (beyond `max_dist`) texts inserted so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max_distance(&self) -> u8 {
        self.max_dist
    }

    pub fn set_max_distance(&mut self, max_dist: u8) {
        self.max_dist = max_dist;
    }

    /// The value stored for the first fingerprint within the configured
    /// distance of this text's, if any.
    pub fn get_close(&self, text: &str) -> Option<&T> {
        let id = self.store.find_within(text, self.max_dist)?;
        Some(&self.values[id as usize])
    }

    /// Returns the value of an entry whose fingerprint lies within the
    /// configured distance, inserting `default()` under this text's
    /// fingerprint when none does.
    pub fn maybe_insert_close_or<F>(&mut self, text: &str, default: F) -> &T
    where
        F: FnOnce() -> T,
    {
        let key = self.store.hasher().fingerprint(text);
        if let Some(id) = self.store.find_within_fingerprint(key, self.max_dist) {
            return &self.values[id as usize];
        }
        let id = self.values.len();
        self.store.insert_fingerprint(key, id as i64);
        self.values.push(default());
        &self.values[id]
    }
}
