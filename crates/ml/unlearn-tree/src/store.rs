//! Training-row storage keyed by stable integer ids.
//!
//! Keys are assigned once at load time and never reused or renumbered, so a
//! deleted key stays invalid for the lifetime of the model. The tree keeps
//! leaf-level key sets; this store is the single owner of the row data and
//! is what subtree rebuilds read from.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

/// Mapping from row key to (binary feature vector, binary label).
#[derive(Debug, Clone, Default)]
pub struct RowStore {
    rows: HashMap<usize, (Array1<u8>, u8)>,
    n_features: usize,
}

impl RowStore {
    /// Load a training set, assigning keys `0..n`.
    ///
    /// Rejects any feature or label value outside {0, 1}.
    pub fn load(x: ArrayView2<u8>, y: ArrayView1<u8>) -> Result<Self> {
        if x.iter().any(|&v| v > 1) || y.iter().any(|&v| v > 1) {
            return Err(Error::NonBinaryInput);
        }

        let mut rows = HashMap::with_capacity(x.nrows());
        for (i, (row, &label)) in x.outer_iter().zip(y.iter()).enumerate() {
            rows.insert(i, (row.to_owned(), label));
        }

        Ok(Self {
            rows,
            n_features: x.ncols(),
        })
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn contains(&self, key: usize) -> bool {
        self.rows.contains_key(&key)
    }

    /// Look up a single row by key.
    pub fn get(&self, key: usize) -> Result<(&Array1<u8>, u8)> {
        self.rows
            .get(&key)
            .map(|(x, y)| (x, *y))
            .ok_or(Error::UnknownKey(key))
    }

    /// Materialize the rows for `keys` as dense arrays, in key order.
    pub fn gather(&self, keys: &[usize]) -> Result<(Array2<u8>, Array1<u8>)> {
        let mut x = Array2::zeros((keys.len(), self.n_features));
        let mut y = Array1::zeros(keys.len());

        for (i, &key) in keys.iter().enumerate() {
            let (row, label) = self.get(key)?;
            x.row_mut(i).assign(row);
            y[i] = label;
        }

        Ok((x, y))
    }

    /// Remove a row by key.
    pub fn remove(&mut self, key: usize) -> Result<()> {
        self.rows
            .remove(&key)
            .map(|_| ())
            .ok_or(Error::UnknownKey(key))
    }

    /// Iterator over the keys currently stored, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn sample_store() -> RowStore {
        let x = arr2(&[[1u8, 0], [1, 1], [0, 1]]);
        let y = arr1(&[1u8, 1, 0]);
        RowStore::load(x.view(), y.view()).unwrap()
    }

    #[test]
    fn test_load_and_get() {
        let store = sample_store();
        assert_eq!(store.len(), 3);
        assert_eq!(store.n_features(), 2);

        let (row, label) = store.get(1).unwrap();
        assert_eq!(row, &arr1(&[1u8, 1]));
        assert_eq!(label, 1);
    }

    #[test]
    fn test_load_rejects_non_binary() {
        let x = arr2(&[[2u8, 0]]);
        let y = arr1(&[1u8]);
        assert!(matches!(
            RowStore::load(x.view(), y.view()),
            Err(Error::NonBinaryInput)
        ));

        let x = arr2(&[[1u8, 0]]);
        let y = arr1(&[3u8]);
        assert!(matches!(
            RowStore::load(x.view(), y.view()),
            Err(Error::NonBinaryInput)
        ));
    }

    #[test]
    fn test_gather_in_key_order() {
        let store = sample_store();
        let (x, y) = store.gather(&[2, 0]).unwrap();
        assert_eq!(x, arr2(&[[0u8, 1], [1, 0]]));
        assert_eq!(y, arr1(&[0u8, 1]));
    }

    #[test]
    fn test_remove_and_unknown_key() {
        let mut store = sample_store();
        store.remove(1).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.contains(1));

        assert!(matches!(store.remove(1), Err(Error::UnknownKey(1))));
        assert!(matches!(store.get(1), Err(Error::UnknownKey(1))));
        assert!(matches!(store.gather(&[0, 1]), Err(Error::UnknownKey(1))));

        let mut keys: Vec<usize> = store.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![0, 2]);
    }
}
