//! Threshold curves, areas under them, and the flat tables results are
//! written to.
//!
//! Curve conventions follow scikit-learn: ROC thresholds run from `+inf`
//! downwards, PR points run from the lowest threshold up with a final
//! (precision 1, recall 0) point that has no threshold.

use crate::error::{ClassifyError, Result};
use crate::train::TrainedModel;
use crate::utils::{format_float, parse_float};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RocRow {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrRow {
    pub precision: f64,
    pub recall: f64,
    pub threshold: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PerformanceResult {
    pub auroc: f64,
    pub aupr: f64,
    pub roc: Vec<RocRow>,
    pub pr: Vec<PrRow>,
}

/// Cumulative false and true positive counts at each distinct score, highest first.
fn binary_clf_curve(y_true: &[u8], y_score: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[b].partial_cmp(&y_score[a]).unwrap_or(Ordering::Equal));

    let mut fps = Vec::new();
    let mut tps = Vec::new();
    let mut thresholds = Vec::new();
    let mut tp = 0.0;
    for (rank, &i) in order.iter().enumerate() {
        tp += y_true[i] as f64;
        let last_of_value = rank + 1 == order.len() || y_score[order[rank + 1]] != y_score[i];
        if last_of_value {
            tps.push(tp);
            fps.push((rank + 1) as f64 - tp);
            thresholds.push(y_score[i]);
        }
    }
    (fps, tps, thresholds)
}

/// Receiver operating characteristic, optionally without the collinear points.
pub fn roc_curve(y_true: &[u8], y_score: &[f64], drop_intermediate: bool) -> Vec<RocRow> {
    let (mut fps, mut tps, mut thresholds) = binary_clf_curve(y_true, y_score);

    if drop_intermediate && fps.len() > 2 {
        let n = fps.len();
        let keep: Vec<usize> = (0..n)
            .filter(|&i| {
                i == 0
                    || i == n - 1
                    || fps[i + 1] - 2.0 * fps[i] + fps[i - 1] != 0.0
                    || tps[i + 1] - 2.0 * tps[i] + tps[i - 1] != 0.0
            })
            .collect();
        fps = keep.iter().map(|&i| fps[i]).collect();
        tps = keep.iter().map(|&i| tps[i]).collect();
        thresholds = keep.iter().map(|&i| thresholds[i]).collect();
    }

    let total_fp = fps.last().copied().unwrap_or(0.0);
    let total_tp = tps.last().copied().unwrap_or(0.0);
    let rate = |count: f64, total: f64| if total > 0.0 { count / total } else { f64::NAN };

    let mut rows = vec![RocRow { fpr: 0.0, tpr: 0.0, threshold: f64::INFINITY }];
    for ((fp, tp), threshold) in fps.iter().zip(tps.iter()).zip(thresholds.iter()) {
        rows.push(RocRow { fpr: rate(*fp, total_fp), tpr: rate(*tp, total_tp), threshold: *threshold });
    }
    rows
}

/// Precision and recall at every distinct threshold, ascending, plus the
/// closing (1, 0) point with no threshold.
pub fn precision_recall_curve(y_true: &[u8], y_score: &[f64]) -> Vec<PrRow> {
    let (fps, tps, thresholds) = binary_clf_curve(y_true, y_score);
    let total_tp = tps.last().copied().unwrap_or(0.0);

    let mut rows: Vec<PrRow> = fps
        .iter()
        .zip(tps.iter())
        .zip(thresholds.iter())
        .rev()
        .map(|((fp, tp), threshold)| {
            let predicted = tp + fp;
            PrRow {
                precision: if predicted > 0.0 { tp / predicted } else { 0.0 },
                recall: if total_tp > 0.0 { tp / total_tp } else { f64::NAN },
                threshold: Some(*threshold),
            }
        })
        .collect();
    rows.push(PrRow { precision: 1.0, recall: 0.0, threshold: None });
    rows
}

/// Trapezoidal area under `y(x)`.
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2).zip(y.windows(2)).map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0).sum::<f64>().abs()
}

/// Area under the ROC curve; NaN when `y_true` holds a single class.
pub fn roc_auc(y_true: &[u8], y_score: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|v| **v == 1).count();
    if positives == 0 || positives == y_true.len() {
        return f64::NAN;
    }
    let roc = roc_curve(y_true, y_score, true);
    let fpr: Vec<f64> = roc.iter().map(|r| r.fpr).collect();
    let tpr: Vec<f64> = roc.iter().map(|r| r.tpr).collect();
    auc(&fpr, &tpr)
}

/// Step-wise area under the PR curve: sum of precision times recall increments.
pub fn average_precision(y_true: &[u8], y_score: &[f64]) -> f64 {
    let pr = precision_recall_curve(y_true, y_score);
    -pr.windows(2).map(|w| (w[1].recall - w[0].recall) * w[0].precision).sum::<f64>()
}

/// Average of a per-label score weighted by each label's positive count.
///
/// `y_true` and `y_score` hold one column per label. Returns 0 when no label
/// has a positive.
pub fn weighted_average_score<F>(y_true: &[Vec<u8>], y_score: &[Vec<f64>], metric: F) -> Result<f64>
where
    F: Fn(&[u8], &[f64]) -> f64,
{
    if y_true.len() != y_score.len() {
        return Err(ClassifyError::LengthMismatch { expected: y_true.len(), found: y_score.len() });
    }
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (truth, score) in y_true.iter().zip(y_score.iter()) {
        if truth.len() != score.len() {
            return Err(ClassifyError::LengthMismatch { expected: truth.len(), found: score.len() });
        }
        let weight = truth.iter().filter(|v| **v == 1).count() as f64;
        if weight > 0.0 {
            weighted += weight * metric(truth, score);
            total_weight += weight;
        }
    }
    Ok(if total_weight > 0.0 { weighted / total_weight } else { 0.0 })
}

/// ROC and PR curves of a set of scores with their weighted areas.
pub fn get_threshold_metrics(y_true: &[u8], y_pred: &[f64], drop_intermediate: bool) -> Result<PerformanceResult> {
    if y_true.len() != y_pred.len() {
        return Err(ClassifyError::LengthMismatch { expected: y_true.len(), found: y_pred.len() });
    }
    let truth = [y_true.to_vec()];
    let scores = [y_pred.to_vec()];
    let auroc = if roc_auc(y_true, y_pred).is_nan() {
        f64::NAN
    } else {
        weighted_average_score(&truth, &scores, roc_auc)?
    };
    Ok(PerformanceResult {
        auroc,
        aupr: weighted_average_score(&truth, &scores, average_precision)?,
        roc: roc_curve(y_true, y_pred, drop_intermediate),
        pr: precision_recall_curve(y_true, y_pred),
    })
}

/// What a set of scores was computed for.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub subject: String,
    pub signal: String,
    pub z_dim: String,
    pub seed: String,
    pub algorithm: String,
    pub data_type: String,
}

impl Tag {
    fn cells(&self) -> [String; 6] {
        [
            self.subject.clone(),
            self.signal.clone(),
            self.z_dim.clone(),
            self.seed.clone(),
            self.algorithm.clone(),
            self.data_type.clone(),
        ]
    }
}

const TAG_COLUMNS: [&str; 5] = ["signal", "z_dim", "seed", "algorithm", "data_type"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricsRow {
    pub auroc: f64,
    pub aupr: f64,
    pub tag: Tag,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaggedRoc {
    pub row: RocRow,
    pub tag: Tag,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaggedPr {
    pub row: PrRow,
    pub tag: Tag,
}

/// Attach the tag to the curves and flatten the areas into one row.
pub fn summarize_results(result: &PerformanceResult, tag: &Tag) -> (MetricsRow, Vec<TaggedRoc>, Vec<TaggedPr>) {
    let metrics = MetricsRow { auroc: result.auroc, aupr: result.aupr, tag: tag.clone() };
    let roc = result.roc.iter().map(|row| TaggedRoc { row: row.clone(), tag: tag.clone() }).collect();
    let pr = result.pr.iter().map(|row| TaggedPr { row: row.clone(), tag: tag.clone() }).collect();
    (metrics, roc, pr)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CoefficientRow {
    pub feature: String,
    pub weight: f64,
    pub abs: f64,
    pub signal: String,
    pub z_dim: String,
    pub seed: String,
    pub algorithm: String,
}

/// Classifier weights paired with feature names, largest magnitude first.
pub fn extract_coefficients(
    model: &TrainedModel,
    feature_names: &[String],
    signal: &str,
    z_dim: &str,
    seed: &str,
    algorithm: &str,
) -> Result<Vec<CoefficientRow>> {
    let weights = &model.classifier.coef;
    if weights.len() != feature_names.len() {
        return Err(ClassifyError::LengthMismatch { expected: feature_names.len(), found: weights.len() });
    }
    let mut rows: Vec<CoefficientRow> = feature_names
        .iter()
        .zip(weights.iter())
        .map(|(feature, weight)| CoefficientRow {
            feature: feature.clone(),
            weight: *weight,
            abs: weight.abs(),
            signal: signal.to_string(),
            z_dim: z_dim.to_string(),
            seed: seed.to_string(),
            algorithm: algorithm.to_string(),
        })
        .collect();
    rows.sort_by(|a, b| b.abs.partial_cmp(&a.abs).unwrap_or(Ordering::Equal));
    Ok(rows)
}

/// Whether a result file already exists, in which case the target needs no rerun.
pub fn check_status<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().is_file()
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

fn header(leading: &[&str], subject_column: &str) -> Vec<String> {
    leading
        .iter()
        .chain(std::iter::once(&subject_column))
        .chain(TAG_COLUMNS.iter())
        .map(|c| c.to_string())
        .collect()
}

pub fn write_metrics<P: AsRef<Path>>(path: P, rows: &[MetricsRow]) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(header(&["auroc", "aupr"], "gene_or_cancertype"))?;
    for row in rows {
        let mut record = vec![format_float(row.auroc), format_float(row.aupr)];
        record.extend(row.tag.cells());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_roc<P: AsRef<Path>>(path: P, rows: &[TaggedRoc]) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(header(&["fpr", "tpr", "threshold"], "predictor"))?;
    for tagged in rows {
        let mut record =
            vec![format_float(tagged.row.fpr), format_float(tagged.row.tpr), format_float(tagged.row.threshold)];
        record.extend(tagged.tag.cells());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_pr<P: AsRef<Path>>(path: P, rows: &[TaggedPr]) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(header(&["precision", "recall", "threshold"], "predictor"))?;
    for tagged in rows {
        let mut record = vec![
            format_float(tagged.row.precision),
            format_float(tagged.row.recall),
            tagged.row.threshold.map(format_float).unwrap_or_default(),
        ];
        record.extend(tagged.tag.cells());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

const COEFFICIENT_COLUMNS: [&str; 7] = ["feature", "weight", "abs", "signal", "z_dim", "seed", "algorithm"];

pub fn write_coefficients<P: AsRef<Path>>(path: P, rows: &[CoefficientRow]) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(COEFFICIENT_COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.feature.clone(),
            format_float(row.weight),
            format_float(row.abs),
            row.signal.clone(),
            row.z_dim.clone(),
            row.seed.clone(),
            row.algorithm.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a coefficient table back, e.g. to pick features for a new matrix.
pub fn read_coefficients<P: AsRef<Path>>(path: P) -> Result<Vec<CoefficientRow>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut positions = [0usize; 7];
    for (slot, column) in positions.iter_mut().zip(COEFFICIENT_COLUMNS.iter()) {
        *slot = headers.iter().position(|h| h == *column).ok_or_else(|| ClassifyError::MissingColumn {
            path: path.display().to_string(),
            column: column.to_string(),
        })?;
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |k: usize| record.get(positions[k]).unwrap_or_default().to_string();
        let number = |k: usize| {
            let value = cell(k);
            parse_float(&value).ok_or_else(|| ClassifyError::Parse {
                path: path.display().to_string(),
                row: cell(0),
                column: COEFFICIENT_COLUMNS[k].to_string(),
                value,
            })
        };
        rows.push(CoefficientRow {
            feature: cell(0),
            weight: number(1)?,
            abs: number(2)?,
            signal: cell(3),
            z_dim: cell(4),
            seed: cell(5),
            algorithm: cell(6),
        });
    }
    Ok(rows)
}
