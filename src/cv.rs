use crate::error::{ClassifyError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stratified k-fold split of row indices, without shuffling.
///
/// Rows are assigned to folds class by class in their original order, so that
/// every fold gets as close as possible to the overall class balance and the
/// same labels always give the same folds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CV {
    pub validation_folds: Vec<Vec<usize>>,
    pub training_sets: Vec<Vec<usize>>,
}

impl CV {
    pub fn new(y: &[u8], outer_folds: usize) -> Result<CV> {
        if outer_folds < 2 {
            return Err(ClassifyError::InvalidParam(format!(
                "at least 2 folds are needed for cross-validation, got {}",
                outer_folds
            )));
        }
        let mut class_counts: BTreeMap<u8, usize> = BTreeMap::new();
        for class in y {
            *class_counts.entry(*class).or_insert(0) += 1;
        }
        let max_class = class_counts.values().copied().max().unwrap_or(0);
        let min_class = class_counts.values().copied().min().unwrap_or(0);
        if outer_folds > y.len() || outer_folds > max_class {
            return Err(ClassifyError::TooFewMembers { folds: outer_folds, max_class });
        }
        if outer_folds > min_class {
            warn!(
                "The least populated class has only {} members, fewer than {} folds",
                min_class, outer_folds
            );
        }

        // Deal the sorted labels round-robin: fold i takes every k-th label
        // starting at i, which fixes how many rows of each class it receives.
        let classes: Vec<u8> = class_counts.keys().copied().collect();
        let mut sorted = y.to_vec();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; classes.len()]; outer_folds];
        for (position, class) in sorted.iter().enumerate() {
            let c = classes.binary_search(class).unwrap_or_default();
            allocation[position % outer_folds][c] += 1;
        }

        let mut fold_of = vec![0usize; y.len()];
        for (c, class) in classes.iter().enumerate() {
            let fold_ids = (0..outer_folds).flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][c]));
            let rows = y.iter().enumerate().filter(|(_, v)| *v == class).map(|(i, _)| i);
            for (row, fold) in rows.zip(fold_ids) {
                fold_of[row] = fold;
            }
        }

        let validation_folds: Vec<Vec<usize>> = (0..outer_folds)
            .map(|fold| (0..y.len()).filter(|&i| fold_of[i] == fold).collect())
            .collect();
        let training_sets = (0..outer_folds)
            .map(|fold| (0..y.len()).filter(|&i| fold_of[i] != fold).collect())
            .collect();

        Ok(CV { validation_folds, training_sets })
    }

    pub fn len(&self) -> usize {
        self.validation_folds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv_new_creates_correct_number_of_folds() {
        let y: Vec<u8> = vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let cv = CV::new(&y, 5).unwrap();
        assert_eq!(cv.len(), 5, "the number of validation folds should match outer_folds");
        assert_eq!(cv.training_sets.len(), 5);
    }

    #[test]
    fn test_cv_matches_stratified_kfold_allocation() {
        // Same labels as the scikit-learn StratifiedKFold example.
        let y: Vec<u8> = vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let cv = CV::new(&y, 3).unwrap();
        assert_eq!(cv.validation_folds, vec![vec![0, 1, 6, 7], vec![2, 3, 8, 9], vec![4, 5, 10, 11]]);

        let y: Vec<u8> = vec![1, 0, 0, 1, 0, 0, 0, 1, 0, 0];
        let cv = CV::new(&y, 3).unwrap();
        assert_eq!(cv.validation_folds, vec![vec![0, 1, 2, 4], vec![3, 5, 6], vec![7, 8, 9]]);
    }

    #[test]
    fn test_training_validation_no_overlap() {
        let y: Vec<u8> = (0..23).map(|i| u8::from(i % 3 == 0)).collect();
        let cv = CV::new(&y, 4).unwrap();
        let mut seen = vec![0; y.len()];
        for (train, valid) in cv.training_sets.iter().zip(cv.validation_folds.iter()) {
            assert_eq!(train.len() + valid.len(), y.len(), "each fold partitions the rows");
            assert!(train.iter().all(|i| !valid.contains(i)), "training and validation rows must not overlap");
            for &i in valid {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "every row is validated exactly once");
    }

    #[test]
    fn test_balanced_class_distribution() {
        let y: Vec<u8> = (0..50).map(|i| u8::from(i < 10)).collect();
        let cv = CV::new(&y, 5).unwrap();
        for valid in &cv.validation_folds {
            let positives = valid.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(positives, 2, "10 positives over 5 folds should give 2 per fold");
            assert_eq!(valid.len(), 10);
        }
    }

    #[test]
    fn test_cv_new_reproductibility() {
        let y: Vec<u8> = (0..37).map(|i| u8::from(i % 4 == 1)).collect();
        assert_eq!(CV::new(&y, 5).unwrap(), CV::new(&y, 5).unwrap(), "splitting is deterministic");
    }

    #[test]
    fn test_cv_new_with_too_few_members() {
        let y: Vec<u8> = vec![0, 1, 0, 1];
        assert!(matches!(CV::new(&y, 3), Err(ClassifyError::TooFewMembers { folds: 3, max_class: 2 })));
        assert!(CV::new(&[0, 0, 0, 1], 3).is_ok(), "one populated class is enough, with a warning");
        assert!(matches!(CV::new(&y, 1), Err(ClassifyError::InvalidParam(_))));
    }
}
