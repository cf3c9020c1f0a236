#![allow(non_snake_case)]

pub mod align;
pub mod cv;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod experiment;
pub mod index;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod param;
pub mod train;
pub mod utils;

use crate::align::align_matrices;
use crate::data::{FeatureMatrix, MutationBurden, SampleFreeze};
use crate::error::{ClassifyError, Result};
use crate::experiment::{RunSummary, TargetKind, TargetResults, TargetStatus, TargetSummary};
use crate::index::{build_feature_index, IndexReport, ModelKey, Signal, Split};
use crate::labels::{build_cancertype_label, build_gene_label, LabelVector};
use crate::metrics::{check_status, extract_coefficients, get_threshold_metrics, Tag};
use crate::param::{CopyNumber, GeneTarget, Param};
use crate::train::{train_model, GridSearch};
use chrono::Local;
use log::{debug, error, warn};
use std::path::{Path, PathBuf};

/// Input tables shared by every target of a run.
struct Cohort {
    freeze: SampleFreeze,
    burden: MutationBurden,
    mutation: Option<FeatureMatrix>,
    copy_gain: Option<FeatureMatrix>,
    copy_loss: Option<FeatureMatrix>,
}

impl Cohort {
    fn load(param: &Param) -> Result<Cohort> {
        let optional = |path: &str| -> Result<Option<FeatureMatrix>> {
            if path.is_empty() {
                Ok(None)
            } else {
                FeatureMatrix::load(path).map(Some)
            }
        };
        let genes = !param.labels.genes.is_empty();
        let mutation = if genes { optional(&param.data.mutation_status)? } else { None };
        if genes && mutation.is_none() {
            return Err(ClassifyError::InvalidParam("genes to classify but data.mutation_status is not set".to_string()));
        }
        Ok(Cohort {
            freeze: SampleFreeze::load(&param.data.sample_freeze)?,
            burden: MutationBurden::load(&param.data.mutation_burden)?,
            mutation,
            copy_gain: if genes { optional(&param.data.copy_gain)? } else { None },
            copy_loss: if genes { optional(&param.data.copy_loss)? } else { None },
        })
    }
}

/// Compression models of the index kept by the data section filters.
fn selected_models(index: &IndexReport, param: &Param) -> Vec<ModelKey> {
    let zs: Vec<String> = param.data.zs.iter().map(|z| z.to_string()).collect();
    let signals: Vec<Signal> = param.data.signals.iter().filter_map(|s| Signal::parse(s)).collect();
    index
        .complete_models()
        .into_iter()
        .filter(|m| zs.is_empty() || zs.contains(&m.z_dim))
        .filter(|m| param.data.algorithms.is_empty() || param.data.algorithms.contains(&m.algorithm))
        .filter(|m| signals.contains(&m.signal))
        .collect()
}

/// Whether cancer-type indicators join the features of a target. A
/// cancer-type label is one of those indicators, so only gene targets get them.
fn use_cancertype_covariate(kind: &TargetKind, param: &Param) -> bool {
    param.train.add_cancertype_covariate && *kind == TargetKind::gene
}

/// Train every selected model against one label vector and collect the result rows.
fn classify_target(
    target: &str,
    kind: &TargetKind,
    labels: &LabelVector,
    models: &[ModelKey],
    index: &IndexReport,
    param: &Param,
) -> Result<TargetResults> {
    let search = GridSearch::from_param(param);
    let covariate = use_cancertype_covariate(kind, param);
    let mut results = TargetResults::new();

    for model in models {
        cinfo!(
            param.general.display_colorful,
            "\x1b[1;93m{}\x1b[0m | {} z={} seed={} algorithm={}",
            target,
            model.signal,
            model.z_dim,
            model.seed,
            model.algorithm
        );
        let train = align_matrices(index.get(&model.key(Split::train))?, labels, covariate)?;
        let test = align_matrices(index.get(&model.key(Split::test))?, labels, covariate)?;
        // Cancer-types absent from the test split get an all-zero indicator.
        let x_test = test.x.reindex_features(&train.x.features, 0.0);

        let output = train_model(&train.x, &x_test, &train.y.status, &search)?;

        let tag = |data_type: &str| Tag {
            subject: target.to_string(),
            signal: model.signal.to_string(),
            z_dim: model.z_dim.clone(),
            seed: model.seed.clone(),
            algorithm: model.algorithm.clone(),
            data_type: data_type.to_string(),
        };
        let drop = param.train.drop_intermediate;
        let train_result = get_threshold_metrics(&train.y.status, &output.y_predict_train, drop)?;
        let test_result = get_threshold_metrics(&test.y.status, &output.y_predict_test, drop)?;
        let cv_result = get_threshold_metrics(&train.y.status, &output.y_cv, drop)?;
        cinfo!(
            param.general.display_colorful,
            "AUROC train {:.3} | test {:.3} | cv {:.3}",
            train_result.auroc,
            test_result.auroc,
            cv_result.auroc
        );
        results.add(&train_result, &tag("train"));
        results.add(&test_result, &tag("test"));
        results.add(&cv_result, &tag("cv"));

        results.coefficients.extend(extract_coefficients(
            &output.model,
            &train.x.features,
            model.signal.as_str(),
            &model.z_dim,
            &model.seed,
            &model.algorithm,
        )?);
    }
    Ok(results)
}

fn gene_labels(gene: &GeneTarget, cohort: &Cohort, param: &Param, dir: &Path) -> Result<LabelVector> {
    let mutation = cohort
        .mutation
        .as_ref()
        .ok_or_else(|| ClassifyError::InvalidParam("no mutation status table loaded".to_string()))?;
    let copy = match gene.copy_number {
        CopyNumber::gain => cohort.copy_gain.as_ref(),
        CopyNumber::loss => cohort.copy_loss.as_ref(),
        CopyNumber::none => None,
    };
    build_gene_label(
        mutation,
        copy,
        gene.copy_number != CopyNumber::none,
        &gene.symbol,
        &cohort.freeze,
        &cohort.burden,
        param.labels.filter_count,
        param.labels.filter_prop,
        dir,
        param.labels.hyper_filter,
    )
}

/// Build the labels of one target, train its models and write its result files.
fn run_target(
    target: &str,
    kind: TargetKind,
    cohort: &Cohort,
    models: &[ModelKey],
    index: &IndexReport,
    param: &Param,
) -> TargetSummary {
    let mut summary = TargetSummary {
        target: target.to_string(),
        kind: kind.clone(),
        status: TargetStatus::done,
        models_trained: 0,
        samples: 0,
    };
    let dir: PathBuf = Path::new(&param.general.output_dir).join(target);
    if param.general.skip_existing && check_status(TargetResults::metrics_path(&dir, target)) {
        cinfo!(param.general.display_colorful, "\x1b[2;97m{} already done, skipping\x1b[0m", target);
        summary.status = TargetStatus::skipped;
        return summary;
    }

    let outcome = (|| -> Result<(usize, usize)> {
        std::fs::create_dir_all(&dir)?;
        let labels = match &kind {
            TargetKind::gene => {
                let gene = param
                    .labels
                    .genes
                    .iter()
                    .find(|g| g.symbol == target)
                    .ok_or_else(|| ClassifyError::InvalidParam(format!("unknown gene target {}", target)))?;
                gene_labels(gene, cohort, param, &dir)?
            }
            TargetKind::cancer_type => {
                let (labels, counts) = build_cancertype_label(target, &cohort.freeze, &cohort.burden, param.labels.hyper_filter)?;
                counts.write(dir.join(format!("{}_status_counts.tsv", target)))?;
                labels
            }
        };
        if labels.is_empty() {
            return Err(ClassifyError::NoMatchingSamples { what: format!("{} labels after filtering", target) });
        }
        let results = classify_target(target, &kind, &labels, models, index, param)?;
        results.write(&dir, target)?;
        Ok((models.len(), labels.len()))
    })();

    match outcome {
        Ok((models_trained, samples)) => {
            summary.models_trained = models_trained;
            summary.samples = samples;
        }
        Err(e) => {
            error!("{} failed: {}", target, e);
            summary.status = TargetStatus::failed { reason: e.to_string() };
        }
    }
    summary
}

/// Classify every configured gene and cancer-type with every selected
/// compression model, writing per-target result tables under
/// `general.output_dir`.
///
/// Input tables that cannot be read stop the run; a target whose labels or
/// models cannot be built is recorded as failed and the run moves on.
pub fn run(param: &Param) -> Result<RunSummary> {
    let start = std::time::Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    let cohort = Cohort::load(param)?;
    let index = build_feature_index(&param.data.models_dir, false, param.data.store_train_test)?;
    let models = selected_models(&index, param);
    cinfo!(
        param.general.display_colorful,
        "\x1b[2;97m{} matrices indexed ({} models, {} selected), {} entries skipped\x1b[0m",
        index.entries.len(),
        index.num_models,
        models.len(),
        index.skipped.len()
    );
    if models.is_empty() {
        warn!("No compression model has both splits indexed under {}", param.data.models_dir);
    }

    let mut targets = Vec::new();
    for gene in &param.labels.genes {
        targets.push(run_target(&gene.symbol, TargetKind::gene, &cohort, &models, &index, param));
    }
    for acronym in &param.labels.cancer_types {
        targets.push(run_target(acronym, TargetKind::cancer_type, &cohort, &models, &index, param));
    }

    let sha = option_env!("TCGA_CLASSIFY_GIT_SHA").unwrap_or("unknown");
    let summary = RunSummary {
        id: timestamp.clone(),
        timestamp,
        version: format!("{}#{}", env!("CARGO_PKG_VERSION"), sha),
        parameters: param.clone(),
        models_trained: targets.iter().map(|t| t.models_trained).sum(),
        targets,
        indexed_matrices: index.entries.len(),
        skipped_matrices: index.skipped.len(),
        execution_time: start.elapsed().as_secs_f64(),
    };
    debug!("{:?}", summary);
    Ok(summary)
}
