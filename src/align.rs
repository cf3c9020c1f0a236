use crate::data::{FeatureMatrix, BURDEN_COLUMN};
use crate::error::{ClassifyError, Result};
use crate::index::FeatureSource;
use crate::labels::LabelVector;
use crate::utils::mean_and_population_std;
use log::{debug, error};
use std::collections::{BTreeSet, HashSet};

/// Features and labels over the same samples, row for row.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedMatrices {
    pub samples: Vec<String>,
    pub x: FeatureMatrix,
    pub y: LabelVector,
}

/// Per-column centring and scaling fit on one matrix.
///
/// Uses the population standard deviation; constant columns keep a scale of 1
/// so they become all zeros instead of NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(matrix: &FeatureMatrix) -> StandardScaler {
        let mut mean = Vec::with_capacity(matrix.feature_len);
        let mut scale = Vec::with_capacity(matrix.feature_len);
        for j in 0..matrix.feature_len {
            let column: Vec<f64> = matrix.X.iter().map(|row| row[j]).collect();
            let (m, s) = mean_and_population_std(&column);
            mean.push(m);
            scale.push(if s == 0.0 || s.is_nan() { 1.0 } else { s });
        }
        StandardScaler { mean, scale }
    }

    pub fn transform(&self, matrix: &mut FeatureMatrix) {
        for row in matrix.X.iter_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.scale[j];
            }
        }
    }

    pub fn fit_transform(matrix: &mut FeatureMatrix) -> StandardScaler {
        let scaler = StandardScaler::fit(matrix);
        scaler.transform(matrix);
        scaler
    }
}

/// First cell of the design matrix inputs that is NaN or infinite.
fn check_finite(x: &FeatureMatrix, burden: &[f64]) -> Result<()> {
    for (i, (sample, row)) in x.samples.iter().zip(x.X.iter()).enumerate() {
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            return Err(ClassifyError::NonFinite { feature: x.features[j].clone(), sample: sample.clone() });
        }
        if !burden[i].is_finite() {
            return Err(ClassifyError::NonFinite { feature: BURDEN_COLUMN.to_string(), sample: sample.clone() });
        }
    }
    Ok(())
}

/// Restrict features and labels to their shared samples and build the design
/// matrix: standardized features, then the burden covariate, then (optionally)
/// one indicator column per cancer-type.
///
/// Scaling is fit on the aligned samples only. Shared samples are returned in
/// sorted order. A missing or infinite cell among them is an error.
pub fn align_matrices(input: &FeatureSource, labels: &LabelVector, add_cancertype_covariate: bool) -> Result<AlignedMatrices> {
    let features = input.load().map_err(|e| {
        if let FeatureSource::Path(path) = input {
            error!("Could not read feature matrix {}: {}", path.display(), e);
        }
        e
    })?;

    let label_samples: HashSet<&str> = labels.samples.iter().map(String::as_str).collect();
    let samples: Vec<String> = features
        .samples
        .iter()
        .filter(|s| label_samples.contains(s.as_str()))
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    if samples.is_empty() {
        return Err(ClassifyError::EmptyIntersection);
    }
    debug!(
        "Aligning {} of {} feature samples with {} labels",
        samples.len(),
        features.sample_len,
        labels.len()
    );

    let mut x = features.subset(&samples)?;
    let y = labels.subset(&samples)?;
    check_finite(&x, &y.log10_mut)?;
    StandardScaler::fit_transform(&mut x);

    x.push_column(BURDEN_COLUMN, &y.log10_mut)?;
    if add_cancertype_covariate {
        for disease in y.diseases() {
            let indicator: Vec<f64> =
                y.disease.iter().map(|d| if d.as_deref() == Some(disease.as_str()) { 1.0 } else { 0.0 }).collect();
            x.push_column(&disease, &indicator)?;
        }
    }

    Ok(AlignedMatrices { samples, x, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(samples: &[&str], diseases: &[&str]) -> LabelVector {
        LabelVector {
            samples: samples.iter().map(|s| s.to_string()).collect(),
            status: samples.iter().enumerate().map(|(i, _)| (i % 2) as u8).collect(),
            disease: diseases.iter().map(|d| Some(d.to_string())).collect(),
            log10_mut: samples.iter().enumerate().map(|(i, _)| i as f64 / 10.0).collect(),
        }
    }

    fn features(samples: &[&str]) -> FeatureMatrix {
        let X = samples
            .iter()
            .enumerate()
            .map(|(i, _)| vec![i as f64, (i * i) as f64 + 3.0, 7.0])
            .collect();
        FeatureMatrix::from_rows(
            samples.iter().map(|s| s.to_string()).collect(),
            vec!["0".to_string(), "1".to_string(), "2".to_string()],
            X,
        )
        .unwrap()
    }

    #[test]
    fn test_align_uses_exact_intersection() {
        let x = features(&["s5", "s1", "s3", "s9", "s2"]);
        let y = labels(&["s2", "s3", "s4", "s5", "s7"], &["BRCA", "LUAD", "BRCA", "LUAD", "BRCA"]);
        let aligned = align_matrices(&FeatureSource::Loaded(x), &y, true).unwrap();

        assert_eq!(aligned.samples, ["s2", "s3", "s5"], "intersection of both sample sets, sorted");
        assert_eq!(aligned.x.samples, aligned.samples, "feature rows follow the shared order");
        assert_eq!(aligned.y.samples, aligned.samples, "label rows follow the shared order");
        assert_eq!(aligned.x.sample_len, aligned.y.len());
        assert_eq!(aligned.y.status, vec![0, 1, 1]);
    }

    #[test]
    fn test_standardized_columns_over_aligned_samples() {
        let names: Vec<String> = (0..30).map(|i| format!("s{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let x = features(&refs);
        // Only even samples have labels, so scaling must ignore odd ones.
        let even: Vec<&str> = refs.iter().step_by(2).copied().collect();
        let y = labels(&even, &vec!["BRCA"; even.len()]);
        let aligned = align_matrices(&FeatureSource::Loaded(x), &y, false).unwrap();

        for j in 0..2 {
            let column: Vec<f64> = aligned.x.X.iter().map(|row| row[j]).collect();
            let (mean, std) = mean_and_population_std(&column);
            assert!(mean.abs() < 1e-9, "column {} mean should be 0, got {}", j, mean);
            assert!((std - 1.0).abs() < 1e-9, "column {} std should be 1, got {}", j, std);
        }
        assert!(aligned.x.X.iter().all(|row| row[2] == 0.0), "constant column is centred, not divided by zero");
    }

    #[test]
    fn test_covariates_appended() {
        let x = features(&["a", "b", "c"]);
        let y = labels(&["a", "b", "c"], &["LUAD", "BRCA", "LUAD"]);
        let aligned = align_matrices(&FeatureSource::Loaded(x.clone()), &y, true).unwrap();
        assert_eq!(aligned.x.features, ["0", "1", "2", "log10_mut", "BRCA", "LUAD"]);
        assert_eq!(aligned.x.X[1][3..], [0.1, 1.0, 0.0]);

        let aligned = align_matrices(&FeatureSource::Loaded(x), &y, false).unwrap();
        assert_eq!(aligned.x.feature_len, 4, "no cancer-type columns without the covariate");
    }

    #[test]
    fn test_align_failures() {
        let y = labels(&["a", "b"], &["BRCA", "BRCA"]);
        let err = align_matrices(&FeatureSource::Loaded(features(&["c", "d"])), &y, true);
        assert!(matches!(err, Err(ClassifyError::EmptyIntersection)));

        let mut x = features(&["a", "b"]);
        x.X[1][1] = f64::NAN;
        match align_matrices(&FeatureSource::Loaded(x), &y, true) {
            Err(ClassifyError::NonFinite { feature, sample }) => assert_eq!((feature.as_str(), sample.as_str()), ("1", "b")),
            other => panic!("a missing cell must stop alignment, got {:?}", other.map(|a| a.samples)),
        }

        let mut y_inf = y.clone();
        y_inf.log10_mut[0] = f64::INFINITY;
        assert!(matches!(
            align_matrices(&FeatureSource::Loaded(features(&["a", "b"])), &y_inf, true),
            Err(ClassifyError::NonFinite { .. })
        ));

        // Cells of samples dropped by the intersection do not matter
        let mut x = features(&["a", "b", "z"]);
        x.X[2][0] = f64::NAN;
        assert!(align_matrices(&FeatureSource::Loaded(x), &y, true).is_ok());

        let missing = FeatureSource::Path(std::env::temp_dir().join("tcga_classify_no_such_matrix.tsv"));
        assert!(align_matrices(&missing, &y, true).is_err(), "a path that cannot be read yields no table");
    }
}
