use crate::error::{ClassifyError, Result};
use crate::utils::parse_float;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Column holding the TCGA sample barcode in the sample freeze table.
pub const SAMPLE_COLUMN: &str = "SAMPLE_BARCODE";
/// Column holding the cancer-type acronym in the sample freeze table.
pub const DISEASE_COLUMN: &str = "DISEASE";
/// Column holding the log10 mutation count in the burden table.
pub const BURDEN_COLUMN: &str = "log10_mut";

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?)
}

/// Numeric table keyed by sample: one row per sample, one column per feature.
///
/// Used for compressed z matrices as well as mutation / copy-number status
/// tables, whose first TSV column is the sample identifier.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureMatrix {
    pub X: Vec<Vec<f64>>,
    pub samples: Vec<String>,
    pub features: Vec<String>,
    pub sample_len: usize,
    pub feature_len: usize,
}

impl FeatureMatrix {
    pub fn new() -> FeatureMatrix {
        FeatureMatrix {
            X: Vec::new(),
            samples: Vec::new(),
            features: Vec::new(),
            sample_len: 0,
            feature_len: 0,
        }
    }

    /// Build a matrix from rows, checking every row has one value per feature.
    pub fn from_rows(samples: Vec<String>, features: Vec<String>, X: Vec<Vec<f64>>) -> Result<FeatureMatrix> {
        if X.len() != samples.len() {
            return Err(ClassifyError::LengthMismatch { expected: samples.len(), found: X.len() });
        }
        if let Some(row) = X.iter().find(|row| row.len() != features.len()) {
            return Err(ClassifyError::LengthMismatch { expected: features.len(), found: row.len() });
        }
        Ok(FeatureMatrix {
            sample_len: samples.len(),
            feature_len: features.len(),
            X,
            samples,
            features,
        })
    }

    /// Load a TSV whose first column is the sample key and every other column numeric.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FeatureMatrix> {
        let path = path.as_ref();
        debug!("Loading feature matrix {}...", path.display());
        let mut reader = tsv_reader(path)?;
        let features: Vec<String> = reader.headers()?.iter().skip(1).map(String::from).collect();

        let mut samples = Vec::new();
        let mut X = Vec::new();
        for record in reader.records() {
            let record = record?;
            let sample = record.get(0).unwrap_or_default().to_string();
            let mut row = Vec::with_capacity(features.len());
            for (j, cell) in record.iter().skip(1).enumerate() {
                let value = parse_float(cell).ok_or_else(|| ClassifyError::Parse {
                    path: path.display().to_string(),
                    row: sample.clone(),
                    column: features[j].clone(),
                    value: cell.to_string(),
                })?;
                row.push(value);
            }
            samples.push(sample);
            X.push(row);
        }

        FeatureMatrix::from_rows(samples, features, X)
    }

    pub fn sample_index(&self) -> HashMap<&str, usize> {
        self.samples.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect()
    }

    pub fn feature_position(&self, feature: &str) -> Option<usize> {
        self.features.iter().position(|f| f == feature)
    }

    /// Values of one column, in sample order.
    pub fn column(&self, feature: &str) -> Result<Vec<f64>> {
        let j = self
            .feature_position(feature)
            .ok_or_else(|| ClassifyError::UnknownFeature { feature: feature.to_string() })?;
        Ok(self.X.iter().map(|row| row[j]).collect())
    }

    /// Keep only the named columns, in the given order.
    pub fn select_features(&self, features: &[String]) -> Result<FeatureMatrix> {
        let positions = features
            .iter()
            .map(|f| {
                self.feature_position(f)
                    .ok_or_else(|| ClassifyError::UnknownFeature { feature: f.clone() })
            })
            .collect::<Result<Vec<usize>>>()?;
        let X = self
            .X
            .iter()
            .map(|row| positions.iter().map(|&j| row[j]).collect())
            .collect();
        FeatureMatrix::from_rows(self.samples.clone(), features.to_vec(), X)
    }

    /// Reorder columns to `features`, filling absent ones with `fill`.
    pub fn reindex_features(&self, features: &[String], fill: f64) -> FeatureMatrix {
        let positions: Vec<Option<usize>> = features.iter().map(|f| self.feature_position(f)).collect();
        let X = self
            .X
            .iter()
            .map(|row| positions.iter().map(|p| p.map_or(fill, |j| row[j])).collect())
            .collect();
        FeatureMatrix {
            X,
            samples: self.samples.clone(),
            features: features.to_vec(),
            sample_len: self.sample_len,
            feature_len: features.len(),
        }
    }

    /// Reindex rows to `samples`; every requested sample must be present.
    pub fn subset(&self, samples: &[String]) -> Result<FeatureMatrix> {
        let index = self.sample_index();
        let X = samples
            .iter()
            .map(|s| {
                index
                    .get(s.as_str())
                    .map(|&i| self.X[i].clone())
                    .ok_or_else(|| ClassifyError::NoMatchingSamples { what: format!("sample {}", s) })
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;
        FeatureMatrix::from_rows(samples.to_vec(), self.features.clone(), X)
    }

    /// Append a suffix to every column name.
    pub fn rename_features(&mut self, suffix: &str) {
        for feature in self.features.iter_mut() {
            feature.push_str(suffix);
        }
    }

    /// Column-wise concatenation, aligned on this matrix's sample order.
    pub fn hconcat(&mut self, other: &FeatureMatrix) -> Result<()> {
        if self.feature_len == 0 && self.sample_len == 0 {
            *self = other.clone();
            return Ok(());
        }
        let index = other.sample_index();
        let rows = self
            .samples
            .iter()
            .map(|s| index.get(s.as_str()).copied())
            .collect::<Option<Vec<usize>>>()
            .ok_or(ClassifyError::LengthMismatch { expected: self.sample_len, found: other.sample_len })?;
        for (row, i) in self.X.iter_mut().zip(rows) {
            row.extend_from_slice(&other.X[i]);
        }
        self.features.extend(other.features.iter().cloned());
        self.feature_len = self.features.len();
        Ok(())
    }

    /// Append one column.
    pub fn push_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        if values.len() != self.sample_len {
            return Err(ClassifyError::LengthMismatch { expected: self.sample_len, found: values.len() });
        }
        for (row, v) in self.X.iter_mut().zip(values.iter()) {
            row.push(*v);
        }
        self.features.push(name.to_string());
        self.feature_len += 1;
        Ok(())
    }

    pub fn check_compatibility(&self, other: &FeatureMatrix) -> bool {
        self.features == other.features
    }
}

/// Cut `text` to at most `width` characters, ending with "..." when shortened.
fn truncate_display(text: String, width: usize) -> String {
    if text.chars().count() > width {
        format!("{}...", text.chars().take(width - 3).collect::<String>())
    } else {
        text
    }
}

impl fmt::Display for FeatureMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {}   Features: {}", self.sample_len, self.feature_len)?;

        let header = self.features.join("\t");
        let truncated_header = truncate_display(header, 100);
        writeln!(f, "{:<20} {}", "", truncated_header)?;

        for (sample, row) in self.samples.iter().zip(self.X.iter()).take(20) {
            let row_display = row.iter().map(|v| format!("{:.2}", v)).collect::<Vec<_>>().join("\t");
            let truncated_row = truncate_display(row_display, 80);
            writeln!(f, "{:<20} {}", sample, truncated_row)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FeatureMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Sample freeze: which samples are used and their cancer-type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleFreeze {
    pub samples: Vec<String>,
    pub disease: Vec<String>,
}

impl SampleFreeze {
    pub fn new(samples: Vec<String>, disease: Vec<String>) -> SampleFreeze {
        SampleFreeze { samples, disease }
    }

    /// Load `SAMPLE_BARCODE` and `DISEASE` columns by name from a TSV.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SampleFreeze> {
        let path = path.as_ref();
        let mut reader = tsv_reader(path)?;
        let headers = reader.headers()?.clone();
        let find = |column: &str| {
            headers.iter().position(|h| h == column).ok_or_else(|| ClassifyError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            })
        };
        let sample_col = find(SAMPLE_COLUMN)?;
        let disease_col = find(DISEASE_COLUMN)?;

        let mut freeze = SampleFreeze::new(Vec::new(), Vec::new());
        for record in reader.records() {
            let record = record?;
            freeze.samples.push(record.get(sample_col).unwrap_or_default().to_string());
            freeze.disease.push(record.get(disease_col).unwrap_or_default().to_string());
        }
        info!("Sample freeze {}: {} samples", path.display(), freeze.samples.len());
        Ok(freeze)
    }

    pub fn disease_of(&self) -> HashMap<&str, &str> {
        self.samples.iter().map(String::as_str).zip(self.disease.iter().map(String::as_str)).collect()
    }
}

/// Per-sample log10 mutation count, used as filter and covariate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MutationBurden {
    pub samples: Vec<String>,
    pub log10_mut: Vec<f64>,
}

impl MutationBurden {
    pub fn new(samples: Vec<String>, log10_mut: Vec<f64>) -> MutationBurden {
        MutationBurden { samples, log10_mut }
    }

    /// Load the `log10_mut` column of a sample-keyed TSV.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MutationBurden> {
        let path = path.as_ref();
        let table = FeatureMatrix::load(path)?;
        let log10_mut = table.column(BURDEN_COLUMN).map_err(|_| ClassifyError::MissingColumn {
            path: path.display().to_string(),
            column: BURDEN_COLUMN.to_string(),
        })?;
        Ok(MutationBurden::new(table.samples, log10_mut))
    }

    pub fn by_sample(&self) -> HashMap<&str, f64> {
        self.samples.iter().map(String::as_str).zip(self.log10_mut.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("tcga_classify_data_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn create_test_matrix() -> FeatureMatrix {
        FeatureMatrix::from_rows(
            vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
            vec!["0".to_string(), "1".to_string()],
            vec![vec![0.5, 1.0], vec![-0.25, 2.0], vec![1.5, 3.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_load_feature_matrix() {
        let path = temp_path("z.tsv");
        fs::write(&path, "\t0\t1\ns1\t0.5\t1.0\ns2\t-0.25\t2\ns3\t1.5\t\n").unwrap();
        let m = FeatureMatrix::load(&path).unwrap();
        assert_eq!(m.samples, ["s1", "s2", "s3"], "samples come from the first column");
        assert_eq!(m.features, ["0", "1"], "features come from the header, key column excluded");
        assert_eq!(m.X[1], vec![-0.25, 2.0]);
        assert!(m.X[2][1].is_nan(), "an empty cell should be read as missing");
        assert_eq!((m.sample_len, m.feature_len), (3, 2));
    }

    #[test]
    fn test_load_feature_matrix_rejects_text() {
        let path = temp_path("bad.tsv");
        fs::write(&path, "\tf\ns1\tabc\n").unwrap();
        match FeatureMatrix::load(&path) {
            Err(ClassifyError::Parse { value, .. }) => assert_eq!(value, "abc"),
            other => panic!("expected a parse error, got {:?}", other.map(|m| m.sample_len)),
        }
    }

    #[test]
    fn test_display_truncates_multibyte_names() {
        let features: Vec<String> = (0..40).map(|i| format!("gène_é{}", i)).collect();
        let row = vec![1.0; 40];
        let m = FeatureMatrix::from_rows(vec!["s1".to_string()], features, vec![row]).unwrap();
        let shown = format!("{}", m);
        let lines: Vec<&str> = shown.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("..."), "a long header is shortened");
        assert_eq!(lines[1].chars().count(), 21 + 100);
        assert_eq!(lines[2].chars().count(), 21 + 80);
        assert_eq!(truncate_display("éé".to_string(), 5), "éé", "short text is kept whole");
    }

    #[test]
    fn test_subset_reorders_and_rejects_unknown() {
        let m = create_test_matrix();
        let sub = m.subset(&["s3".to_string(), "s1".to_string()]).unwrap();
        assert_eq!(sub.samples, ["s3", "s1"]);
        assert_eq!(sub.X, vec![vec![1.5, 3.0], vec![0.5, 1.0]]);
        assert!(m.subset(&["s9".to_string()]).is_err(), "unknown samples cannot be reindexed");
    }

    #[test]
    fn test_select_features_and_column() {
        let m = create_test_matrix();
        let sel = m.select_features(&["1".to_string()]).unwrap();
        assert_eq!(sel.X, vec![vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(m.column("0").unwrap(), vec![0.5, -0.25, 1.5]);
        assert!(matches!(m.column("x"), Err(ClassifyError::UnknownFeature { .. })));
    }

    #[test]
    fn test_reindex_features_fills_missing() {
        let m = create_test_matrix();
        let re = m.reindex_features(&["1".to_string(), "LUAD".to_string()], 0.0);
        assert_eq!(re.features, ["1", "LUAD"]);
        assert_eq!(re.X[2], vec![3.0, 0.0], "absent columns are filled");
        assert_eq!(re.feature_len, 2);
    }

    #[test]
    fn test_hconcat_aligns_on_samples() {
        let mut m = create_test_matrix();
        let other = FeatureMatrix::from_rows(
            vec!["s3".to_string(), "s2".to_string(), "s1".to_string()],
            vec!["x".to_string()],
            vec![vec![30.0], vec![20.0], vec![10.0]],
        )
        .unwrap();
        m.hconcat(&other).unwrap();
        assert_eq!(m.features, ["0", "1", "x"]);
        assert_eq!(m.X[0], vec![0.5, 1.0, 10.0], "concatenation must follow sample keys, not row order");
        assert_eq!(m.feature_len, 3);

        let mut empty = FeatureMatrix::new();
        empty.hconcat(&other).unwrap();
        assert_eq!(empty, other, "concatenating onto an empty matrix copies the other one");
    }

    #[test]
    fn test_rename_and_push_column() {
        let mut m = create_test_matrix();
        m.rename_features("_42_10_signal");
        assert_eq!(m.features, ["0_42_10_signal", "1_42_10_signal"]);
        m.push_column("log10_mut", &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.X[2], vec![1.5, 3.0, 3.0]);
        assert!(m.push_column("bad", &[1.0]).is_err(), "a short column must be rejected");
    }

    #[test]
    fn test_load_sample_freeze_and_burden() {
        let freeze_path = temp_path("freeze.tsv");
        fs::write(&freeze_path, "PATIENT_BARCODE\tDISEASE\tSAMPLE_BARCODE\np1\tBRCA\ts1\np2\tLUAD\ts2\n").unwrap();
        let freeze = SampleFreeze::load(&freeze_path).unwrap();
        assert_eq!(freeze.samples, ["s1", "s2"]);
        assert_eq!(freeze.disease, ["BRCA", "LUAD"]);

        let burden_path = temp_path("burden.tsv");
        fs::write(&burden_path, "\tlog10_mut\tn_mut\ns1\t1.5\t31\ns2\t2.0\t100\n").unwrap();
        let burden = MutationBurden::load(&burden_path).unwrap();
        assert_eq!(burden.log10_mut, vec![1.5, 2.0]);

        let missing = temp_path("freeze_missing.tsv");
        fs::write(&missing, "SAMPLE_BARCODE\tTYPE\ns1\tBRCA\n").unwrap();
        assert!(matches!(SampleFreeze::load(&missing), Err(ClassifyError::MissingColumn { .. })));
    }
}
