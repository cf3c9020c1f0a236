use crate::cv::CV;
use crate::data::FeatureMatrix;
use crate::error::{ClassifyError, Result};
use crate::metrics::roc_auc;
use crate::model::ElasticNetLogistic;
use crate::param::Param;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Hyperparameter grid and fitting settings for one search.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GridSearch {
    pub alphas: Vec<f64>,
    pub l1_ratios: Vec<f64>,
    pub folds: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
    pub thread_number: usize,
}

impl GridSearch {
    pub fn from_param(param: &Param) -> GridSearch {
        GridSearch {
            alphas: param.train.alphas.clone(),
            l1_ratios: param.train.l1_ratios.clone(),
            folds: param.train.folds,
            max_iter: param.train.max_iter,
            tol: param.train.tol,
            seed: param.general.seed,
            thread_number: param.general.thread_number,
        }
    }

    /// Candidates in search order: alpha outer, l1 ratio inner.
    pub fn candidates(&self) -> Vec<(f64, f64)> {
        self.alphas.iter().flat_map(|&a| self.l1_ratios.iter().map(move |&l| (a, l))).collect()
    }

    fn classifier(&self, alpha: f64, l1_ratio: f64) -> ElasticNetLogistic {
        ElasticNetLogistic::new(alpha, l1_ratio, self.max_iter, self.tol, self.seed)
    }
}

/// Cross-validated scores of one grid point.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CvResult {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub split_test_scores: Vec<f64>,
    pub mean_test_score: f64,
    pub std_test_score: f64,
    pub mean_train_score: f64,
    pub rank_test_score: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainedModel {
    pub classifier: ElasticNetLogistic,
    pub best_alpha: f64,
    pub best_l1_ratio: f64,
    pub best_score: f64,
    pub cv_results: Vec<CvResult>,
}

/// Refit model with its decision scores on train, test and out-of-fold train.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainOutput {
    pub model: TrainedModel,
    pub y_predict_train: Vec<f64>,
    pub y_predict_test: Vec<f64>,
    pub y_cv: Vec<f64>,
}

fn select_rows(X: &[Vec<f64>], rows: &[usize]) -> Vec<Vec<f64>> {
    rows.iter().map(|&i| X[i].clone()).collect()
}

fn select_labels(y: &[u8], rows: &[usize]) -> Vec<u8> {
    rows.iter().map(|&i| y[i]).collect()
}

/// Descending order with NaN last.
fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Index of the best mean score; the earliest candidate wins ties.
fn best_candidate(results: &[CvResult]) -> usize {
    let mut best = 0;
    for (i, result) in results.iter().enumerate().skip(1) {
        if compare_scores(result.mean_test_score, results[best].mean_test_score) == Ordering::Less {
            best = i;
        }
    }
    best
}

/// Competition ranks (1 for the best), NaN scores ranked last.
fn rank_scores(scores: &[f64]) -> Vec<usize> {
    scores
        .iter()
        .map(|&s| 1 + scores.iter().filter(|&&other| compare_scores(other, s) == Ordering::Less).count())
        .collect()
}

/// Fit one configuration on a fold, returning (held-out AUROC, training AUROC).
fn score_fold(search: &GridSearch, alpha: f64, l1_ratio: f64, X: &[Vec<f64>], y: &[u8], cv: &CV, fold: usize) -> Result<(f64, f64)> {
    let train_rows = &cv.training_sets[fold];
    let valid_rows = &cv.validation_folds[fold];
    let (x_fit, y_fit) = (select_rows(X, train_rows), select_labels(y, train_rows));
    let (x_valid, y_valid) = (select_rows(X, valid_rows), select_labels(y, valid_rows));

    let mut classifier = search.classifier(alpha, l1_ratio);
    match classifier.fit(&x_fit, &y_fit) {
        Ok(()) => Ok((
            roc_auc(&y_valid, &classifier.decision_function(&x_valid)),
            roc_auc(&y_fit, &classifier.decision_function(&x_fit)),
        )),
        // A fold whose training part lost a class cannot be scored.
        Err(ClassifyError::SingleClass { .. }) => Ok((f64::NAN, f64::NAN)),
        Err(e) => Err(e),
    }
}

/// Out-of-fold decision scores of one configuration.
fn cross_val_predict(search: &GridSearch, alpha: f64, l1_ratio: f64, X: &[Vec<f64>], y: &[u8], cv: &CV) -> Result<Vec<f64>> {
    let fold_scores = (0..cv.len())
        .into_par_iter()
        .map(|fold| -> Result<Vec<f64>> {
            let train_rows = &cv.training_sets[fold];
            let mut classifier = search.classifier(alpha, l1_ratio);
            classifier.fit(&select_rows(X, train_rows), &select_labels(y, train_rows))?;
            Ok(classifier.decision_function(&select_rows(X, &cv.validation_folds[fold])))
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let mut y_cv = vec![0.0; y.len()];
    for (rows, scores) in cv.validation_folds.iter().zip(fold_scores) {
        for (&row, score) in rows.iter().zip(scores) {
            y_cv[row] = score;
        }
    }
    Ok(y_cv)
}

/// Grid search of an elastic-net logistic classifier scored by held-out
/// AUROC, refit of the winner on all training rows, and a second
/// cross-validation pass with the winning configuration for out-of-fold
/// scores.
///
/// Candidates and folds are fit in parallel on a pool of
/// `search.thread_number` threads; the call returns once every fit is done.
pub fn train_model(x_train: &FeatureMatrix, x_test: &FeatureMatrix, y_train: &[u8], search: &GridSearch) -> Result<TrainOutput> {
    if y_train.len() != x_train.sample_len {
        return Err(ClassifyError::LengthMismatch { expected: x_train.sample_len, found: y_train.len() });
    }
    if !x_train.check_compatibility(x_test) {
        return Err(ClassifyError::LengthMismatch { expected: x_train.feature_len, found: x_test.feature_len });
    }
    let positives = y_train.iter().filter(|v| **v == 1).count();
    if positives == 0 || positives == y_train.len() {
        return Err(ClassifyError::SingleClass { n_samples: y_train.len() });
    }
    let candidates = search.candidates();
    if candidates.is_empty() {
        return Err(ClassifyError::InvalidParam("empty hyperparameter grid".to_string()));
    }

    let cv = CV::new(y_train, search.folds)?;
    let X = &x_train.X;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(search.thread_number)
        .build()
        .map_err(|e| ClassifyError::InvalidParam(format!("cannot build thread pool: {}", e)))?;

    let (cv_results, y_cv, classifier, best) = pool.install(|| -> Result<_> {
        let tasks: Vec<(usize, usize)> =
            (0..candidates.len()).flat_map(|c| (0..cv.len()).map(move |fold| (c, fold))).collect();
        let fold_scores = tasks
            .par_iter()
            .map(|&(c, fold)| {
                let (alpha, l1_ratio) = candidates[c];
                score_fold(search, alpha, l1_ratio, X, y_train, &cv, fold)
            })
            .collect::<Result<Vec<(f64, f64)>>>()?;

        let mut cv_results: Vec<CvResult> = candidates
            .iter()
            .enumerate()
            .map(|(c, &(alpha, l1_ratio))| {
                let scores = &fold_scores[c * cv.len()..(c + 1) * cv.len()];
                let test: Vec<f64> = scores.iter().map(|s| s.0).collect();
                let train: Vec<f64> = scores.iter().map(|s| s.1).collect();
                let mean_test_score = mean(&test);
                let std_test_score = (test.iter().map(|s| (s - mean_test_score).powi(2)).sum::<f64>() / test.len() as f64).sqrt();
                CvResult {
                    alpha,
                    l1_ratio,
                    split_test_scores: test,
                    mean_test_score,
                    std_test_score,
                    mean_train_score: mean(&train),
                    rank_test_score: 0,
                }
            })
            .collect();
        let ranks = rank_scores(&cv_results.iter().map(|r| r.mean_test_score).collect::<Vec<f64>>());
        for (result, rank) in cv_results.iter_mut().zip(ranks) {
            result.rank_test_score = rank;
        }

        let best = best_candidate(&cv_results);
        let (alpha, l1_ratio) = candidates[best];
        let mut classifier = search.classifier(alpha, l1_ratio);
        classifier.fit(X, y_train)?;
        let y_cv = cross_val_predict(search, alpha, l1_ratio, X, y_train, &cv)?;
        Ok((cv_results, y_cv, classifier, best))
    })?;

    let best_result = &cv_results[best];
    info!(
        "Best of {} candidates: alpha={} l1_ratio={} | mean CV AUROC {:.3} (train {:.3})",
        cv_results.len(),
        best_result.alpha,
        best_result.l1_ratio,
        best_result.mean_test_score,
        best_result.mean_train_score
    );
    debug!("Refit converged in {} epochs", classifier.n_iter);

    let y_predict_train = classifier.decision_function(X);
    let y_predict_test = classifier.decision_function(&x_test.X);
    let model = TrainedModel {
        best_alpha: best_result.alpha,
        best_l1_ratio: best_result.l1_ratio,
        best_score: best_result.mean_test_score,
        classifier,
        cv_results,
    };
    Ok(TrainOutput { model, y_predict_train, y_predict_test, y_cv })
}
