//! Binary target labels: gene alteration status or cancer-type membership,
//! joined with cancer-type and mutation burden and filtered on both.

use crate::data::{FeatureMatrix, MutationBurden, SampleFreeze, DISEASE_COLUMN};
use crate::error::{ClassifyError, Result};
use crate::utils::{format_float, parse_float, sample_std};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Per-sample label with the covariates the aligner appends to features.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabelVector {
    pub samples: Vec<String>,
    pub status: Vec<u8>,
    pub disease: Vec<Option<String>>,
    pub log10_mut: Vec<f64>,
}

impl LabelVector {
    pub fn new() -> LabelVector {
        LabelVector { samples: Vec::new(), status: Vec::new(), disease: Vec::new(), log10_mut: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn push(&mut self, sample: &str, status: u8, disease: Option<String>, log10_mut: f64) {
        self.samples.push(sample.to_string());
        self.status.push(status);
        self.disease.push(disease);
        self.log10_mut.push(log10_mut);
    }

    /// Keep the rows where `keep` is true.
    fn retain(&self, keep: &[bool]) -> LabelVector {
        let mut kept = LabelVector::new();
        for (i, _) in keep.iter().enumerate().filter(|(_, k)| **k) {
            kept.push(&self.samples[i], self.status[i], self.disease[i].clone(), self.log10_mut[i]);
        }
        kept
    }

    pub fn sample_index(&self) -> HashMap<&str, usize> {
        self.samples.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect()
    }

    /// Reindex on `samples`, failing if one is absent.
    pub fn subset(&self, samples: &[String]) -> Result<LabelVector> {
        let index = self.sample_index();
        let mut subset = LabelVector::new();
        for sample in samples {
            let i = *index.get(sample.as_str()).ok_or_else(|| ClassifyError::NoMatchingSamples {
                what: format!("label vector (sample {})", sample),
            })?;
            subset.push(sample, self.status[i], self.disease[i].clone(), self.log10_mut[i]);
        }
        Ok(subset)
    }

    /// Distinct cancer-types present, sorted.
    pub fn diseases(&self) -> BTreeSet<String> {
        self.disease.iter().flatten().cloned().collect()
    }

    pub fn positives(&self) -> usize {
        self.status.iter().filter(|s| **s == 1).count()
    }
}

impl fmt::Display for LabelVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} samples, {} positives over {} cancer-types",
            self.len(),
            self.positives(),
            self.diseases().len()
        )
    }
}

/// Inclusion decision for one cancer-type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiseaseStats {
    pub disease: String,
    pub count: usize,
    pub proportion: f64,
    pub included: bool,
}

/// Status value counts of a cancer-type label, most frequent first.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CountSummary {
    pub acronym: String,
    pub counts: Vec<(u8, usize)>,
}

impl CountSummary {
    fn from_status(acronym: &str, status: &[u8]) -> CountSummary {
        let mut tally: BTreeMap<u8, usize> = BTreeMap::new();
        for s in status {
            *tally.entry(*s).or_insert(0) += 1;
        }
        let mut counts: Vec<(u8, usize)> = tally.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        CountSummary { acronym: acronym.to_string(), counts }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        writer.write_record(["status", self.acronym.as_str()])?;
        for (status, count) in &self.counts {
            writer.write_record([status.to_string(), count.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// One gene's status column as 0/1 values keyed by sample.
fn status_column(table: &FeatureMatrix, gene: &str) -> Result<Vec<u8>> {
    let values = table.column(gene)?;
    values
        .iter()
        .zip(table.samples.iter())
        .map(|(v, sample)| {
            if *v == 0.0 || *v == 1.0 {
                Ok(*v as u8)
            } else {
                Err(ClassifyError::Parse {
                    path: "status table".to_string(),
                    row: sample.clone(),
                    column: gene.to_string(),
                    value: format_float(*v),
                })
            }
        })
        .collect()
}

/// Element-wise sum of mutation and copy-number indicators.
pub fn raw_status(mutation: &[u8], copy: Option<&[u8]>) -> Vec<u8> {
    match copy {
        Some(copy) => mutation.iter().zip(copy.iter()).map(|(m, c)| m + c).collect(),
        None => mutation.to_vec(),
    }
}

/// Cap a raw status at 1, i.e. a logical OR of the summed indicators.
pub fn clamp_status(raw: &[u8]) -> Vec<u8> {
    raw.iter().map(|s| (*s).min(1)).collect()
}

/// `hyper_filter` sample standard deviations of the burden, and the rows under it.
///
/// The threshold is not centred on the mean. NaN burdens never pass.
pub fn burden_filter(log10_mut: &[f64], hyper_filter: f64) -> (f64, Vec<bool>) {
    let threshold = hyper_filter * sample_std(log10_mut);
    let keep = log10_mut.iter().map(|v| *v < threshold).collect();
    (threshold, keep)
}

/// Count and proportion of positives per cancer-type, sorted by cancer-type.
pub fn disease_stats(labels: &LabelVector, filter_count: usize, filter_prop: f64) -> Vec<DiseaseStats> {
    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (disease, status) in labels.disease.iter().zip(labels.status.iter()) {
        if let Some(disease) = disease {
            let entry = tally.entry(disease.as_str()).or_insert((0, 0));
            entry.0 += *status as usize;
            entry.1 += 1;
        }
    }
    tally
        .into_iter()
        .map(|(disease, (count, total))| {
            let proportion = count as f64 / total as f64;
            DiseaseStats {
                disease: disease.to_string(),
                count,
                proportion,
                included: count > filter_count && proportion > filter_prop,
            }
        })
        .collect()
}

pub fn filter_report_path<P: AsRef<Path>>(output_dir: P, gene: &str) -> PathBuf {
    output_dir.as_ref().join(format!("{}_filtered_cancertypes.tsv", gene))
}

pub fn write_filter_report<P: AsRef<Path>>(path: P, stats: &[DiseaseStats]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record([DISEASE_COLUMN, "status_count", "status_proportion", "disease_included"])?;
    for stat in stats {
        let included = if stat.included { "True" } else { "False" };
        writer.write_record([
            stat.disease.clone(),
            stat.count.to_string(),
            format_float(stat.proportion),
            included.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_filter_report<P: AsRef<Path>>(path: P) -> Result<Vec<DiseaseStats>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
    let parse_error = |row: &str, column: &str, value: &str| ClassifyError::Parse {
        path: path.display().to_string(),
        row: row.to_string(),
        column: column.to_string(),
        value: value.to_string(),
    };

    let mut stats = Vec::new();
    for record in reader.records() {
        let record = record?;
        let disease = record.get(0).unwrap_or_default();
        let count_cell = record.get(1).unwrap_or_default();
        let prop_cell = record.get(2).unwrap_or_default();
        let included_cell = record.get(3).unwrap_or_default();

        let count = count_cell
            .parse::<usize>()
            .map_err(|_| parse_error(disease, "status_count", count_cell))?;
        let proportion = parse_float(prop_cell).ok_or_else(|| parse_error(disease, "status_proportion", prop_cell))?;
        let included = match included_cell {
            "True" => true,
            "False" => false,
            other => return Err(parse_error(disease, "disease_included", other)),
        };
        stats.push(DiseaseStats { disease: disease.to_string(), count, proportion, included });
    }
    Ok(stats)
}

/// Gene alteration label, restricted to cancer-types where the alteration is
/// frequent enough and to samples under the burden threshold.
///
/// Writes `{gene}_filtered_cancertypes.tsv` under `output_dir` as a record
/// of which cancer-types were kept.
pub fn build_gene_label<P: AsRef<Path>>(
    mutation: &FeatureMatrix,
    copy: Option<&FeatureMatrix>,
    include_copy: bool,
    gene: &str,
    freeze: &SampleFreeze,
    burden: &MutationBurden,
    filter_count: usize,
    filter_prop: f64,
    output_dir: P,
    hyper_filter: f64,
) -> Result<LabelVector> {
    let mut samples = mutation.samples.clone();
    let mut mutation_status = status_column(mutation, gene)?;

    let status = match (include_copy, copy) {
        (true, Some(copy)) => {
            // Only samples present in both tables carry a defined status.
            let copy_status = status_column(copy, gene)?;
            let copy_index = copy.sample_index();
            let mut aligned_copy = Vec::with_capacity(samples.len());
            let mut keep = Vec::with_capacity(samples.len());
            for sample in &samples {
                match copy_index.get(sample.as_str()) {
                    Some(&j) => {
                        aligned_copy.push(copy_status[j]);
                        keep.push(true);
                    }
                    None => keep.push(false),
                }
            }
            let dropped = keep.iter().filter(|k| !**k).count();
            if dropped > 0 {
                warn!("{}: {} samples have no copy-number status and are dropped", gene, dropped);
            }
            samples = samples.into_iter().zip(keep.iter()).filter(|(_, k)| **k).map(|(s, _)| s).collect();
            mutation_status = mutation_status.into_iter().zip(keep.iter()).filter(|(_, k)| **k).map(|(s, _)| s).collect();
            clamp_status(&raw_status(&mutation_status, Some(&aligned_copy)))
        }
        (true, None) => {
            return Err(ClassifyError::InvalidParam(format!(
                "copy-number status requested for {} but no copy-number table given",
                gene
            )))
        }
        (false, _) => mutation_status,
    };

    let disease_of = freeze.disease_of();
    if !samples.iter().any(|s| disease_of.contains_key(s.as_str())) {
        return Err(ClassifyError::NoMatchingSamples { what: format!("{} status with the sample freeze", gene) });
    }

    let burden_of = burden.by_sample();
    let mut labels = LabelVector::new();
    for (sample, status) in samples.iter().zip(status.iter()) {
        if let Some(log10_mut) = burden_of.get(sample.as_str()) {
            let disease = disease_of.get(sample.as_str()).map(|d| d.to_string());
            labels.push(sample, *status, disease, *log10_mut);
        }
    }
    if labels.is_empty() {
        return Err(ClassifyError::NoMatchingSamples { what: format!("{} status with the mutation burden", gene) });
    }
    debug!("{}: {} samples joined with freeze and burden", gene, labels.len());

    let stats = disease_stats(&labels, filter_count, filter_prop);
    write_filter_report(filter_report_path(&output_dir, gene), &stats)?;
    let retained: BTreeSet<&str> = stats.iter().filter(|s| s.included).map(|s| s.disease.as_str()).collect();
    info!("{}: {} of {} cancer-types retained", gene, retained.len(), stats.len());
    if retained.is_empty() {
        warn!("{}: no cancer-type passes count > {} and proportion > {}", gene, filter_count, filter_prop);
    }

    let (threshold, under_threshold) = burden_filter(&labels.log10_mut, hyper_filter);
    let keep: Vec<bool> = under_threshold
        .iter()
        .zip(labels.disease.iter())
        .map(|(under, disease)| *under && disease.as_deref().map_or(false, |d| retained.contains(d)))
        .collect();
    let filtered = labels.retain(&keep);
    info!(
        "{}: burden threshold {:.4}, {} of {} samples kept ({})",
        gene,
        threshold,
        filtered.len(),
        labels.len(),
        filtered
    );
    Ok(filtered)
}

/// One-vs-rest cancer-type label over the sample freeze, burden filtered.
pub fn build_cancertype_label(
    acronym: &str,
    freeze: &SampleFreeze,
    burden: &MutationBurden,
    hyper_filter: f64,
) -> Result<(LabelVector, CountSummary)> {
    let burden_of = burden.by_sample();
    let mut labels = LabelVector::new();
    for (sample, disease) in freeze.samples.iter().zip(freeze.disease.iter()) {
        if let Some(log10_mut) = burden_of.get(sample.as_str()) {
            let status = u8::from(disease == acronym);
            labels.push(sample, status, Some(disease.clone()), *log10_mut);
        }
    }
    if labels.is_empty() {
        return Err(ClassifyError::NoMatchingSamples { what: "sample freeze with the mutation burden".to_string() });
    }

    let (threshold, keep) = burden_filter(&labels.log10_mut, hyper_filter);
    let filtered = labels.retain(&keep);
    let summary = CountSummary::from_status(acronym, &filtered.status);
    info!("{}: burden threshold {:.4}, {}", acronym, threshold, filtered);
    Ok((filtered, summary))
}
