use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

/// Which split(s) of the compressed matrices the feature index keeps
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum StoreSplit {
    both,
    train,
    test,
}

/// Copy-number event counted as a positive status for a gene
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum CopyNumber {
    gain,
    loss,
    none,
}

/// A gene to classify and the copy-number event merged into its status
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneTarget {
    pub symbol: String,
    #[serde(default = "copy_number_default")]
    pub copy_number: CopyNumber,
}

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub train: Train,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
    #[serde(default = "output_dir_default")]
    pub output_dir: String,
    #[serde(default = "true_default")]
    pub skip_existing: bool,
    #[serde(default = "empty_string")]
    pub save_summary: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub models_dir: String,
    #[serde(default = "empty_string")]
    pub mutation_status: String,
    #[serde(default = "empty_string")]
    pub copy_gain: String,
    #[serde(default = "empty_string")]
    pub copy_loss: String,
    #[serde(default = "empty_string")]
    pub sample_freeze: String,
    #[serde(default = "empty_string")]
    pub mutation_burden: String,
    #[serde(default = "store_split_default")]
    pub store_train_test: StoreSplit,
    #[serde(default = "empty_usize_vec")]
    pub zs: Vec<usize>,
    #[serde(default = "empty_string_vec")]
    pub algorithms: Vec<String>,
    #[serde(default = "signals_default")]
    pub signals: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Labels {
    #[serde(default = "genes_default")]
    pub genes: Vec<GeneTarget>,
    #[serde(default = "empty_string_vec")]
    pub cancer_types: Vec<String>,
    #[serde(default = "filter_count_default")]
    pub filter_count: usize,
    #[serde(default = "filter_prop_default")]
    pub filter_prop: f64,
    #[serde(default = "hyper_filter_default")]
    pub hyper_filter: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Train {
    #[serde(default = "alphas_default")]
    pub alphas: Vec<f64>,
    #[serde(default = "l1_ratios_default")]
    pub l1_ratios: Vec<f64>,
    #[serde(default = "folds_default")]
    pub folds: usize,
    #[serde(default = "max_iter_default")]
    pub max_iter: usize,
    #[serde(default = "tol_default")]
    pub tol: f64,
    #[serde(default = "true_default")]
    pub add_cancertype_covariate: bool,
    #[serde(default = "false_default")]
    pub drop_intermediate: bool,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Labels {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Train {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: String) -> Result<Param, Box<dyn Error>> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<(), String> {
    if !param.general.log_base.is_empty() {
        param.general.display_colorful = false;
    }

    if param.general.thread_number == 0 {
        return Err("Invalid thread_number=0. At least one thread is required.".to_string());
    }

    if param.labels.genes.is_empty() && param.labels.cancer_types.is_empty() {
        warn!("No gene nor cancer-type to classify: the run will only index the feature matrices.");
    }

    if param.data.store_train_test != StoreSplit::both {
        warn!(
            "store_train_test={:?}: models need both splits to be trained, only the index will be built.",
            param.data.store_train_test
        );
    }

    for signal in &param.data.signals {
        if signal != "signal" && signal != "shuffled" {
            return Err(format!("Invalid signal '{}'. Must be 'signal' or 'shuffled'.", signal));
        }
    }

    validate_labels(param)?;
    validate_train(param)?;
    Ok(())
}

fn validate_labels(param: &Param) -> Result<(), String> {
    if !(0.0..1.0).contains(&param.labels.filter_prop) {
        return Err(format!(
            "Invalid filter_prop={:.3}. Must be in range [0, 1).",
            param.labels.filter_prop
        ));
    }

    if param.labels.hyper_filter <= 0.0 {
        return Err(format!(
            "Invalid hyper_filter={:.3}. Must be > 0.",
            param.labels.hyper_filter
        ));
    }

    let needs_gain = param.labels.genes.iter().any(|g| g.copy_number == CopyNumber::gain);
    let needs_loss = param.labels.genes.iter().any(|g| g.copy_number == CopyNumber::loss);
    if needs_gain && param.data.copy_gain.is_empty() {
        return Err("A gene uses copy_number=gain but data.copy_gain is not set.".to_string());
    }
    if needs_loss && param.data.copy_loss.is_empty() {
        return Err("A gene uses copy_number=loss but data.copy_loss is not set.".to_string());
    }

    Ok(())
}

fn validate_train(param: &Param) -> Result<(), String> {
    if param.train.alphas.is_empty() || param.train.l1_ratios.is_empty() {
        return Err("Both alphas and l1_ratios must hold at least one value.".to_string());
    }

    if let Some(alpha) = param.train.alphas.iter().find(|a| !(**a > 0.0)) {
        return Err(format!("Invalid alpha={}. Must be > 0.", alpha));
    }

    if let Some(ratio) = param.train.l1_ratios.iter().find(|r| !(0.0..=1.0).contains(*r)) {
        return Err(format!("Invalid l1_ratio={}. Must be in range [0, 1].", ratio));
    }

    if param.train.folds < 2 {
        return Err(format!("Invalid folds={}. At least 2 folds are required.", param.train.folds));
    }

    if param.train.max_iter == 0 {
        return Err("Invalid max_iter=0. Must be >= 1.".to_string());
    }

    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    0
}
fn empty_string() -> String {
    "".to_string()
}
fn empty_string_vec() -> Vec<String> {
    Vec::new()
}
fn empty_usize_vec() -> Vec<usize> {
    Vec::new()
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn output_dir_default() -> String {
    "results".to_string()
}
fn store_split_default() -> StoreSplit {
    StoreSplit::both
}
fn copy_number_default() -> CopyNumber {
    CopyNumber::none
}
fn signals_default() -> Vec<String> {
    vec!["signal".to_string(), "shuffled".to_string()]
}
fn genes_default() -> Vec<GeneTarget> {
    Vec::new()
}
fn filter_count_default() -> usize {
    15
}
fn filter_prop_default() -> f64 {
    0.05
}
fn hyper_filter_default() -> f64 {
    5.0
}
fn alphas_default() -> Vec<f64> {
    vec![0.1, 0.13, 0.15, 0.18, 0.2, 0.3, 0.4, 0.5]
}
fn l1_ratios_default() -> Vec<f64> {
    vec![0.0, 0.05, 0.1, 0.15, 0.2]
}
fn folds_default() -> usize {
    5
}
fn max_iter_default() -> usize {
    1000
}
fn tol_default() -> f64 {
    1e-3
}
fn false_default() -> bool {
    false
}
fn true_default() -> bool {
    true
}
fn one_default() -> usize {
    1
}
