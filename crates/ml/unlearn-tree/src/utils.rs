use std::collections::HashSet;

use ndarray::{ArrayView1, ArrayView2};

use crate::error::{Error, Result};

/// Validate input dimensions for fitting
pub(crate) fn validate_fit_input(x: &ArrayView2<u8>, y: &ArrayView1<u8>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(Error::EmptyTrainingSet);
    }
    if x.ncols() == 0 {
        return Err(Error::DimensionMismatch {
            expected: 1,
            got: 0,
        });
    }
    if x.nrows() != y.len() {
        return Err(Error::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    Ok(())
}

/// Validate input dimensions for prediction
pub(crate) fn validate_predict_input(x: &ArrayView2<u8>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(Error::DimensionMismatch {
            expected: n_features,
            got: x.ncols(),
        });
    }
    Ok(())
}

/// Set difference over row keys: every key of `keys` not in `remove`,
/// deduplicated and sorted ascending.
pub(crate) fn remove_elements(keys: &[usize], remove: &[usize]) -> Vec<usize> {
    let removed: HashSet<usize> = remove.iter().copied().collect();
    let mut kept: Vec<usize> = keys
        .iter()
        .copied()
        .filter(|k| !removed.contains(k))
        .collect();
    kept.sort_unstable();
    kept.dedup();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array1, Array2};

    #[test]
    fn test_validate_fit_input() {
        let x = arr2(&[[1u8, 0], [0, 1]]);
        let y = arr1(&[1u8, 0]);
        assert!(validate_fit_input(&x.view(), &y.view()).is_ok());

        let y_short = arr1(&[1u8]);
        assert!(matches!(
            validate_fit_input(&x.view(), &y_short.view()),
            Err(Error::DimensionMismatch { expected: 2, got: 1 })
        ));

        let x_empty = Array2::<u8>::zeros((0, 2));
        let y_empty = Array1::<u8>::zeros(0);
        assert!(matches!(
            validate_fit_input(&x_empty.view(), &y_empty.view()),
            Err(Error::EmptyTrainingSet)
        ));

        let x_no_features = Array2::<u8>::zeros((2, 0));
        assert!(matches!(
            validate_fit_input(&x_no_features.view(), &y.view()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_predict_input() {
        let x = arr2(&[[1u8, 0]]);
        assert!(validate_predict_input(&x.view(), 2).is_ok());
        assert!(matches!(
            validate_predict_input(&x.view(), 3),
            Err(Error::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_remove_elements() {
        assert_eq!(remove_elements(&[4, 1, 3, 2], &[3, 9]), vec![1, 2, 4]);
        assert_eq!(remove_elements(&[1, 2], &[]), vec![1, 2]);
        assert_eq!(remove_elements(&[1, 2], &[1, 2]), Vec::<usize>::new());
    }
}
