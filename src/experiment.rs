use crate::error::Result;
use crate::metrics::{
    summarize_results, write_coefficients, write_metrics, write_pr, write_roc, CoefficientRow, MetricsRow,
    PerformanceResult, Tag, TaggedPr, TaggedRoc,
};
use crate::param::Param;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What is being predicted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[allow(non_camel_case_types)]
pub enum TargetKind {
    gene,
    cancer_type,
}

/// Outcome of one target.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[allow(non_camel_case_types)]
pub enum TargetStatus {
    /// Every selected model was trained and the result files written.
    done,
    /// The result files already existed.
    skipped,
    /// The target could not produce a meaningful result.
    failed { reason: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TargetSummary {
    pub target: String,
    pub kind: TargetKind,
    pub status: TargetStatus,
    pub models_trained: usize,
    pub samples: usize,
}

/// Every row produced for one target, accumulated over models.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetResults {
    pub metrics: Vec<MetricsRow>,
    pub roc: Vec<TaggedRoc>,
    pub pr: Vec<TaggedPr>,
    pub coefficients: Vec<CoefficientRow>,
}

impl TargetResults {
    pub fn new() -> TargetResults {
        TargetResults::default()
    }

    pub fn add(&mut self, result: &PerformanceResult, tag: &Tag) {
        let (metrics, roc, pr) = summarize_results(result, tag);
        self.metrics.push(metrics);
        self.roc.extend(roc);
        self.pr.extend(pr);
    }

    /// Path of the per-target metrics table, whose presence marks the target as done.
    pub fn metrics_path<P: AsRef<Path>>(dir: P, target: &str) -> PathBuf {
        dir.as_ref().join(format!("{}_classify_metrics.tsv", target))
    }

    pub fn write<P: AsRef<Path>>(&self, dir: P, target: &str) -> Result<()> {
        let dir = dir.as_ref();
        write_roc(dir.join(format!("{}_roc_results.tsv", target)), &self.roc)?;
        write_pr(dir.join(format!("{}_pr_results.tsv", target)), &self.pr)?;
        write_coefficients(dir.join(format!("{}_coefficients.tsv", target)), &self.coefficients)?;
        // Written last so an interrupted target is never mistaken for a finished one.
        write_metrics(TargetResults::metrics_path(dir, target), &self.metrics)?;
        Ok(())
    }
}

/// Record of a whole run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Run ID, i.e. timestamp
    pub id: String,
    pub timestamp: String,
    /// Crate version and git hash used
    pub version: String,
    pub parameters: Param,
    pub targets: Vec<TargetSummary>,
    /// Matrices indexed, and those the index walk had to skip
    pub indexed_matrices: usize,
    pub skipped_matrices: usize,
    pub models_trained: usize,
    /// Execution time in seconds
    pub execution_time: f64,
}

impl RunSummary {
    pub fn count(&self, status: fn(&TargetStatus) -> bool) -> usize {
        self.targets.iter().filter(|t| status(&t.status)).count()
    }

    pub fn failed(&self) -> Vec<&TargetSummary> {
        self.targets.iter().filter(|t| matches!(t.status, TargetStatus::failed { .. })).collect()
    }

    pub fn display_results(&self) -> String {
        let mut text = format!(
            "Run {} ({}) | {} models trained in {:.2}s | {} matrices indexed, {} skipped\n",
            self.id, self.version, self.models_trained, self.execution_time, self.indexed_matrices, self.skipped_matrices
        );
        text.push_str(&format!(
            "Targets: {} done, {} skipped, {} failed\n",
            self.count(|s| matches!(s, TargetStatus::done)),
            self.count(|s| matches!(s, TargetStatus::skipped)),
            self.count(|s| matches!(s, TargetStatus::failed { .. }))
        ));
        for target in &self.targets {
            let status = match &target.status {
                TargetStatus::done => "\x1b[1;92mdone\x1b[0m".to_string(),
                TargetStatus::skipped => "\x1b[2;97mskipped\x1b[0m".to_string(),
                TargetStatus::failed { reason } => format!("\x1b[1;91mfailed\x1b[0m: {}", reason),
            };
            text.push_str(&format!(
                "  {:<12} {:<12} {:>4} models {:>6} samples  {}\n",
                target.target,
                format!("{:?}", target.kind),
                target.models_trained,
                target.samples,
                status
            ));
        }
        text
    }

    /// Saves the summary in a suitable format based on file extension.
    pub fn save_auto<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

        match ext.as_str() {
            "json" => self.save_json(path),
            "bin" | "bincode" => self.save_bincode(path),
            _ => {
                warn!("Unknown format. Saving run summary in json.");
                self.save_json(path.with_extension("json"))
            }
        }
    }

    fn save_json<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn save_bincode<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let encoded = bincode::serialize(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    /// Loads a summary, detecting the format from the file extension.
    pub fn load_auto<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

        match ext.as_str() {
            "json" => Self::load_json(path),
            "bin" | "bincode" => Self::load_bincode(path),
            _ => Self::load_with_fallback(path),
        }
    }

    fn load_json<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn load_bincode<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Tries bincode, then json.
    fn load_with_fallback<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Ok(summary) = Self::load_bincode(path) {
            return Ok(summary);
        }
        if let Ok(summary) = Self::load_json(path) {
            return Ok(summary);
        }
        Err("Unable to load the run summary".into())
    }
}
