use pyo3::prelude::*;

mod feature;
mod fingerprint;
mod frontier;
mod hamming;
mod hash;
mod map;
mod store;
mod tables;

pub use feature::FeatureType;
pub use fingerprint::{simhash, InvalidWindowSize, SimHasher};
pub use hamming::hamming_distance;
pub use hash::HashMethod;
pub use map::SimMap;
pub use store::{FindResult, SimStore, Stats, BITS_PER_LEVEL, LEVELS, MAX_KEYS_PER_NODE};

#[pymodule]
mod simstore {
    use std::collections::HashMap;

    use pyo3::prelude::*;
    use pyo3::types::PyList;

    #[pymodule_export]
    use crate::feature::FeatureType;

    #[pymodule_export]
    use crate::hash::HashMethod;

    #[pyclass]
    #[derive(Clone)]
    struct SimHash {
        #[pyo3(get, set)]
        value: u64,
    }

    #[pymethods]
    impl SimHash {
        #[staticmethod]
        fn from_int(val: u64) -> Self {
            SimHash { value: val }
        }

        fn __str__(&self) -> String {
            format!("0x{:016x}", self.value)
        }
        fn __repr__(&self) -> String {
            format!("<SimHash 0x{:016x}>", self.value)
        }
        fn __hash__(&self) -> u64 {
            self.value
        }
        fn __eq__(&self, other: &SimHash) -> bool {
            self.value == other.value
        }
        fn __ne__(&self, other: &SimHash) -> bool {
            self.value != other.value
        }
        fn __int__(&self) -> u64 {
            self.value
        }

        fn hamming_distance(&self, other: &SimHash) -> u8 {
            crate::hamming::hamming_distance(self.value, other.value)
        }
    }

    #[pyclass]
    struct SimHasher {
        hasher: crate::fingerprint::SimHasher,
    }

    #[pymethods]
    impl SimHasher {
        #[new]
        #[pyo3(signature = (hash_method=HashMethod::XXHash, features=FeatureType::Bytes, n=3))]
        fn new(hash_method: HashMethod, features: FeatureType, n: usize) -> PyResult<Self> {
            let hasher = crate::fingerprint::SimHasher::new(hash_method, features, n)
                .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
            Ok(SimHasher { hasher })
        }

        fn fingerprint(&self, input: &str) -> SimHash {
            SimHash {
                value: self.hasher.fingerprint(input),
            }
        }
    }

    #[pyclass]
    struct SimStore {
        store: crate::store::SimStore,
    }

    #[pymethods]
    impl SimStore {
        #[new]
        #[pyo3(signature = (hash_method=HashMethod::XXHash, features=FeatureType::Bytes, n=3))]
        fn new(hash_method: HashMethod, features: FeatureType, n: usize) -> PyResult<Self> {
            let hasher = crate::fingerprint::SimHasher::new(hash_method, features, n)
                .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
            Ok(SimStore {
                store: crate::store::SimStore::new(hasher),
            })
        }

        fn insert(&mut self, text: &str, id: i64) {
            self.store.insert(text, id);
        }

        fn contains(&self, text: &str) -> Option<i64> {
            self.store.contains(text)
        }

        fn find(&self, text: &str, distance: u8) -> (Vec<i64>, u32, u32) {
            let found = self.store.find(text, distance);
            (found.ids, found.keys_checked, found.nodes_checked)
        }

        fn find_within(&self, text: &str, distance: u8) -> Option<i64> {
            self.store.find_within(text, distance)
        }

        fn find_closest(&self, text: &str) -> Option<i64> {
            self.store.find_closest(text)
        }

        fn stats(&self) -> (u32, u32) {
            let stats = self.store.stats();
            (stats.keys, stats.nodes)
        }

        fn pretty(&self) -> String {
            self.store.to_string()
        }

        fn __str__(&self) -> String {
            self.store.to_string()
        }
    }

    #[pyfunction]
    #[pyo3(signature = (value, method=HashMethod::XXHash, features=FeatureType::Bytes, n=3))]
    fn fingerprint(value: &str, method: HashMethod, features: FeatureType, n: usize) -> PyResult<SimHash> {
        let hasher = crate::fingerprint::SimHasher::new(method, features, n)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        Ok(SimHash {
            value: hasher.fingerprint(value),
        })
    }

    #[pyfunction]
    #[pyo3(signature = (texts, max_diff=3, method=HashMethod::XXHash, features=FeatureType::Bytes, n=3))]
    fn group_texts(
        texts: Bound<PyList>,
        max_diff: usize,
        method: HashMethod,
        features: FeatureType,
        n: usize,
    ) -> PyResult<Vec<Vec<Py<PyAny>>>> {
        let hasher = crate::fingerprint::SimHasher::new(method, features, n)
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        let mut map = crate::map::SimMap::new(hasher, max_diff as u8);
        let mut groups: HashMap<usize, Vec<Py<PyAny>>> = HashMap::new();

        for text in texts.iter() {
            let text_val = text.extract::<String>()?;
            let group = *map.maybe_insert_close_or(&text_val, || groups.len());
            groups.entry(group).or_default().push(text.into());
        }

        Ok(groups.into_values().collect())
    }
}
