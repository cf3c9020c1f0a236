use crate::data::FeatureMatrix;
use crate::error::{ClassifyError, Result};
use crate::param::StoreSplit;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the directory, under the models directory, holding one
/// subdirectory of z matrices per bottleneck dimension.
pub const MATRIX_DIR: &str = "ensemble_z_matrices";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
pub enum Signal {
    /// Features compressed from the real expression data
    signal,
    /// Features compressed from label-permuted data, used as a null baseline
    shuffled,
}

impl Signal {
    pub const ALL: [Signal; 2] = [Signal::signal, Signal::shuffled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::signal => "signal",
            Signal::shuffled => "shuffled",
        }
    }

    pub fn parse(name: &str) -> Option<Signal> {
        match name {
            "signal" => Some(Signal::signal),
            "shuffled" => Some(Signal::shuffled),
            _ => None,
        }
    }

    /// Does a z matrix file name belong to this signal?
    fn matches(&self, file_name: &str) -> bool {
        match self {
            Signal::signal => file_name.contains("_z_") && !file_name.contains("shuffled"),
            Signal::shuffled => file_name.contains("shuffled_z_"),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
pub enum Split {
    train,
    test,
}

impl Split {
    fn of(file_name: &str) -> Split {
        if file_name.contains("_test_") {
            Split::test
        } else {
            Split::train
        }
    }
}

/// One compressed feature matrix: (signal, z_dim, seed, algorithm, split).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey {
    pub signal: Signal,
    pub z_dim: String,
    pub seed: String,
    pub algorithm: String,
    pub split: Split,
}

impl FeatureKey {
    pub fn new(sig: Signal, z_dim: &str, seed: &str, algorithm: &str, split: Split) -> FeatureKey {
        FeatureKey {
            signal: sig,
            z_dim: z_dim.to_string(),
            seed: seed.to_string(),
            algorithm: algorithm.to_string(),
            split,
        }
    }

    /// Same model, other split
    pub fn with_split(&self, split: Split) -> FeatureKey {
        FeatureKey { split, ..self.clone() }
    }

    pub fn model(&self) -> ModelKey {
        ModelKey {
            signal: self.signal,
            z_dim: self.z_dim.clone(),
            seed: self.seed.clone(),
            algorithm: self.algorithm.clone(),
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} z={} seed={} algorithm={} ({:?})",
            self.signal, self.z_dim, self.seed, self.algorithm, self.split
        )
    }
}

/// A compression model, both splits included.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelKey {
    pub signal: Signal,
    pub z_dim: String,
    pub seed: String,
    pub algorithm: String,
}

impl ModelKey {
    pub fn key(&self, split: Split) -> FeatureKey {
        FeatureKey {
            signal: self.signal,
            z_dim: self.z_dim.clone(),
            seed: self.seed.clone(),
            algorithm: self.algorithm.clone(),
            split,
        }
    }
}

/// Where a feature matrix lives: either a file still to read, or the table itself.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureSource {
    Path(PathBuf),
    Loaded(FeatureMatrix),
}

impl FeatureSource {
    /// Read the matrix if needed.
    pub fn load(&self) -> Result<FeatureMatrix> {
        match self {
            FeatureSource::Path(path) => FeatureMatrix::load(path),
            FeatureSource::Loaded(matrix) => Ok(matrix.clone()),
        }
    }
}

/// Something the index walk could not use, and why.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a best-effort scan: what was indexed and what had to be skipped.
#[derive(Clone, Debug)]
pub struct IndexReport {
    pub entries: BTreeMap<FeatureKey, FeatureSource>,
    pub num_models: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl IndexReport {
    pub fn new() -> IndexReport {
        IndexReport {
            entries: BTreeMap::new(),
            num_models: 0,
            skipped: Vec::new(),
        }
    }

    pub fn get(&self, key: &FeatureKey) -> Result<&FeatureSource> {
        self.entries
            .get(key)
            .ok_or_else(|| ClassifyError::MissingFeatureMatrix { key: key.to_string() })
    }

    /// Distinct compression models present in the index, in key order.
    pub fn models(&self) -> Vec<ModelKey> {
        let mut models: Vec<ModelKey> = self.entries.keys().map(FeatureKey::model).collect();
        models.dedup();
        models
    }

    /// Models for which both the train and the test matrices are indexed.
    pub fn complete_models(&self) -> Vec<ModelKey> {
        self.models()
            .into_iter()
            .filter(|m| self.entries.contains_key(&m.key(Split::train)) && self.entries.contains_key(&m.key(Split::test)))
            .collect()
    }

    fn skip(&mut self, path: &Path, reason: String) {
        warn!("Skipping {}: {}", path.display(), reason);
        self.skipped.push(SkippedEntry { path: path.to_path_buf(), reason });
    }
}

fn sorted_dir_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();
    Ok(entries)
}

/// Index the compressed feature matrices found under `{models_dir}/ensemble_z_matrices`.
///
/// Each subdirectory holds the matrices of one bottleneck dimension, named
/// `{algorithm}_{seed}_z_...`; files with `_test_` in their name are the test
/// split and `shuffled` marks the permuted-data null models. Every train file
/// counts one model even when only the test split is kept. With `load_data`,
/// the matrices are read immediately and files that fail to load are skipped.
pub fn build_feature_index<P: AsRef<Path>>(models_dir: P, load_data: bool, store: StoreSplit) -> Result<IndexReport> {
    let matrix_dir = models_dir.as_ref().join(MATRIX_DIR);
    let comp_dirs = sorted_dir_entries(&matrix_dir)?;
    let mut report = IndexReport::new();

    for sig in Signal::ALL {
        for comp_dir in comp_dirs.iter().filter(|p| p.is_dir()) {
            let dir_name = comp_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let z_dim = dir_name.rsplit('_').next().unwrap_or_default().to_string();

            let z_files = match sorted_dir_entries(comp_dir) {
                Ok(files) => files,
                Err(e) => {
                    report.skip(comp_dir, e.to_string());
                    continue;
                }
            };

            for z_file in z_files {
                let file_name = match z_file.file_name() {
                    Some(name) => name.to_string_lossy().to_string(),
                    None => continue,
                };
                if !sig.matches(&file_name) {
                    continue;
                }

                let mut tokens = file_name.split('_');
                let (algorithm, seed) = match (tokens.next(), tokens.next()) {
                    (Some(alg), Some(seed)) if !alg.is_empty() && !seed.is_empty() => (alg.to_string(), seed.to_string()),
                    _ => {
                        report.skip(&z_file, "file name does not follow {algorithm}_{seed}_z_*".to_string());
                        continue;
                    }
                };

                let split = Split::of(&file_name);
                if split == Split::train {
                    report.num_models += 1;
                }
                let stored = match (store, split) {
                    (StoreSplit::both, _) => true,
                    (StoreSplit::train, Split::train) | (StoreSplit::test, Split::test) => true,
                    _ => false,
                };
                if !stored {
                    continue;
                }

                let source = if load_data {
                    match FeatureMatrix::load(&z_file) {
                        Ok(matrix) => FeatureSource::Loaded(matrix),
                        Err(e) => {
                            report.skip(&z_file, e.to_string());
                            continue;
                        }
                    }
                } else {
                    FeatureSource::Path(z_file.clone())
                };

                let key = FeatureKey::new(sig, &z_dim, &seed, &algorithm, split);
                debug!("Indexed {} -> {}", key, z_file.display());
                report.entries.insert(key, source);
            }
        }
    }

    info!(
        "Indexed {} feature matrices ({} models, {} entries skipped) under {}",
        report.entries.len(),
        report.num_models,
        report.skipped.len(),
        matrix_dir.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_models_dir(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("tcga_classify_index_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let z2 = root.join(MATRIX_DIR).join("components_2");
        let z3 = root.join(MATRIX_DIR).join("components_3");
        fs::create_dir_all(&z2).unwrap();
        fs::create_dir_all(&z3).unwrap();
        let table = "\t0\t1\ns1\t0.1\t0.2\ns2\t0.3\t0.4\n";
        for file in [
            "pca_42_z_train_matrix.tsv",
            "pca_42_z_test_matrix.tsv",
            "vae_7_z_train_matrix.tsv",
            "vae_7_z_test_matrix.tsv",
            "pca_42_shuffled_z_train_matrix.tsv",
            "pca_42_shuffled_z_test_matrix.tsv",
            "weights_42.tsv",
        ] {
            fs::write(z2.join(file), table).unwrap();
        }
        fs::write(z3.join("nmf_1_z_train_matrix.tsv"), table).unwrap();
        fs::write(z3.join("nmf_1_z_test_matrix.tsv"), "\t0\ns1\tnot_a_number\n").unwrap();
        root
    }

    #[test]
    fn test_build_feature_index_paths() {
        let root = create_models_dir("paths");
        let report = build_feature_index(&root, false, StoreSplit::both).unwrap();

        assert_eq!(report.entries.len(), 8, "6 signal files and 2 shuffled files should be indexed");
        assert_eq!(report.num_models, 4, "each train file counts one model");
        assert!(report.skipped.is_empty(), "paths are not opened, nothing can fail");

        let key = FeatureKey::new(Signal::signal, "2", "42", "pca", Split::test);
        match report.get(&key).unwrap() {
            FeatureSource::Path(p) => assert!(p.ends_with("pca_42_z_test_matrix.tsv")),
            other => panic!("expected a path, got {:?}", other),
        }
        let shuffled = FeatureKey::new(Signal::shuffled, "2", "42", "pca", Split::train);
        assert!(report.get(&shuffled).is_ok(), "shuffled matrices are indexed under the shuffled signal");
        assert!(
            report.get(&FeatureKey::new(Signal::signal, "2", "99", "pca", Split::train)).is_err(),
            "an absent key must be reported as missing"
        );
    }

    #[test]
    fn test_build_feature_index_signal_excludes_shuffled() {
        let root = create_models_dir("exclude");
        let report = build_feature_index(&root, false, StoreSplit::both).unwrap();
        let signal_models: Vec<ModelKey> =
            report.models().into_iter().filter(|m| m.signal == Signal::signal).collect();
        assert_eq!(signal_models.len(), 3, "pca/2, vae/2 and nmf/3 are the real-signal models");
        assert_eq!(
            report.models().iter().filter(|m| m.signal == Signal::shuffled).count(),
            1,
            "only pca has a shuffled counterpart"
        );
    }

    #[test]
    fn test_build_feature_index_store_split() {
        let root = create_models_dir("store");
        let train_only = build_feature_index(&root, false, StoreSplit::train).unwrap();
        assert!(train_only.entries.keys().all(|k| k.split == Split::train));
        assert_eq!(train_only.num_models, 4, "models are counted even when a split is not stored");

        let test_only = build_feature_index(&root, false, StoreSplit::test).unwrap();
        assert!(test_only.entries.keys().all(|k| k.split == Split::test));
        assert_eq!(test_only.num_models, 4);
        assert!(test_only.complete_models().is_empty(), "no model is complete with a single split");
    }

    #[test]
    fn test_build_feature_index_loaded_skips_bad_files() {
        let root = create_models_dir("loaded");
        let report = build_feature_index(&root, true, StoreSplit::both).unwrap();
        assert_eq!(report.skipped.len(), 1, "the unparsable nmf test matrix is skipped");
        assert!(report.skipped[0].path.ends_with("nmf_1_z_test_matrix.tsv"));
        assert_eq!(report.entries.len(), 7);

        let complete = report.complete_models();
        assert!(
            complete.iter().all(|m| m.algorithm != "nmf"),
            "nmf lost its test split and is not complete"
        );
        match report.get(&FeatureKey::new(Signal::signal, "2", "7", "vae", Split::train)).unwrap() {
            FeatureSource::Loaded(m) => assert_eq!(m.sample_len, 2),
            other => panic!("expected a loaded matrix, got {:?}", other),
        }
    }

    #[test]
    fn test_build_feature_index_missing_dir() {
        let root = std::env::temp_dir().join("tcga_classify_index_does_not_exist");
        assert!(build_feature_index(&root, false, StoreSplit::both).is_err());
    }
}
