/// End-to-End Integration Test on the bundled tcga_mini cohort
///
/// 80 samples (BRCA/LUAD) compressed by two models (pca and ica), each with
/// its shuffled null. Component 0 of the real-signal matrices separates TP53
/// mutants, component 1 separates the two cancer-types.
///
/// Run with: cargo test --test test_pipeline_e2e_tcga_mini -- --nocapture
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tcga_classify::experiment::{RunSummary, TargetKind, TargetStatus};
use tcga_classify::labels::{filter_report_path, read_filter_report};
use tcga_classify::metrics::read_coefficients;
use tcga_classify::param::{CopyNumber, GeneTarget, Param};
use tcga_classify::run;

const COHORT: &str = "samples/tcga_mini";

fn output_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tcga_classify_e2e_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn create_tcga_mini_params(output: &Path) -> Param {
    let mut param = Param::default();

    param.general.seed = 0;
    param.general.thread_number = 2;
    param.general.display_colorful = false;
    param.general.log_base = "".to_string();
    param.general.output_dir = output.display().to_string();
    param.general.skip_existing = true;

    param.data.models_dir = format!("{}/models", COHORT);
    param.data.mutation_status = format!("{}/mutation_status.tsv", COHORT);
    param.data.copy_gain = format!("{}/copy_gain.tsv", COHORT);
    param.data.sample_freeze = format!("{}/sample_freeze.tsv", COHORT);
    param.data.mutation_burden = format!("{}/mutation_burden.tsv", COHORT);

    param.labels.genes = vec![
        GeneTarget { symbol: "TP53".to_string(), copy_number: CopyNumber::none },
        GeneTarget { symbol: "KRAS".to_string(), copy_number: CopyNumber::gain },
    ];
    param.labels.cancer_types = vec!["BRCA".to_string()];

    param.train.alphas = vec![0.1, 0.01];
    param.train.l1_ratios = vec![0.15, 0.5];
    param.train.folds = 4;
    param.train.max_iter = 200;

    param
}

/// `(signal, algorithm, data_type) -> auroc` from a metrics table.
fn read_auroc(path: &Path) -> HashMap<(String, String, String), f64> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
    let (auroc, signal, algorithm, data_type) = (col("auroc"), col("signal"), col("algorithm"), col("data_type"));
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (
                (r[signal].to_string(), r[algorithm].to_string(), r[data_type].to_string()),
                r[auroc].parse::<f64>().unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_pipeline_e2e_tcga_mini() {
    let output = output_dir("full");
    let param = create_tcga_mini_params(&output);

    let summary = run(&param).expect("run should succeed on the bundled cohort");

    assert_eq!(summary.indexed_matrices, 8, "2 algorithms x 2 signals x 2 splits");
    assert_eq!(summary.skipped_matrices, 0);
    assert_eq!(summary.targets.len(), 3);
    assert!(summary.failed().is_empty(), "no target should fail: {:?}", summary.failed());
    assert_eq!(summary.models_trained, 12, "4 models for each of the 3 targets");
    assert_eq!(summary.targets[2].kind, TargetKind::cancer_type);

    for target in ["TP53", "KRAS", "BRCA"] {
        let dir = output.join(target);
        for suffix in ["classify_metrics", "roc_results", "pr_results", "coefficients"] {
            assert!(dir.join(format!("{}_{}.tsv", target, suffix)).is_file(), "{} {} missing", target, suffix);
        }
    }
    assert!(output.join("BRCA").join("BRCA_status_counts.tsv").is_file());

    let tp53 = read_auroc(&output.join("TP53").join("TP53_classify_metrics.tsv"));
    assert_eq!(tp53.len(), 12, "train, test and cv rows for every model");
    for algorithm in ["pca", "ica"] {
        for data_type in ["train", "test", "cv"] {
            let key = ("signal".to_string(), algorithm.to_string(), data_type.to_string());
            assert!(tp53[&key] > 0.9, "{:?} auroc {} should reflect the separating component", key, tp53[&key]);
        }
    }

    let coefficients = read_coefficients(output.join("TP53").join("TP53_coefficients.tsv")).unwrap();
    // 3 components, the burden covariate and one indicator per cancer-type
    assert_eq!(coefficients.len(), 4 * 6);
    let first = &coefficients[0];
    assert_eq!(first.signal, "signal");
    assert!(first.abs >= coefficients[1].abs, "coefficients are sorted by magnitude within a model");

    // A cancer-type target is trained on components and burden only
    let brca_coefficients = read_coefficients(output.join("BRCA").join("BRCA_coefficients.tsv")).unwrap();
    assert_eq!(brca_coefficients.len(), 4 * 4);
    for row in &brca_coefficients {
        assert!(
            ["0", "1", "2", "log10_mut"].contains(&row.feature.as_str()),
            "BRCA model got feature {} beside its own label",
            row.feature
        );
    }
    let brca = read_auroc(&output.join("BRCA").join("BRCA_classify_metrics.tsv"));
    for algorithm in ["pca", "ica"] {
        let key = ("shuffled".to_string(), algorithm.to_string(), "test".to_string());
        assert!(brca[&key] < 1.0, "{:?} auroc {} on shuffled components means the label leaked", key, brca[&key]);
    }

    // KRAS mutants plus copy gains only reach the count filter in LUAD
    let report = read_filter_report(filter_report_path(output.join("KRAS"), "KRAS")).unwrap();
    let included: Vec<&str> = report.iter().filter(|s| s.included).map(|s| s.disease.as_str()).collect();
    assert_eq!(included, vec!["LUAD"]);
}

#[test]
fn test_pipeline_skips_finished_targets() {
    let output = output_dir("skip");
    let mut param = create_tcga_mini_params(&output);
    param.labels.genes.truncate(1);
    param.labels.cancer_types.clear();
    param.data.algorithms = vec!["pca".to_string()];
    param.data.signals = vec!["signal".to_string()];

    let first = run(&param).unwrap();
    assert_eq!(first.targets[0].status, TargetStatus::done);
    assert_eq!(first.models_trained, 1, "only the pca real-signal model is selected");

    let second = run(&param).unwrap();
    assert_eq!(second.targets[0].status, TargetStatus::skipped);
    assert_eq!(second.models_trained, 0);

    let path = output.join("summary.json");
    second.save_auto(&path).unwrap();
    let loaded = RunSummary::load_auto(&path).unwrap();
    assert_eq!(loaded.targets, second.targets);
}

#[test]
fn test_pipeline_records_failed_target() {
    let output = output_dir("failed");
    let mut param = create_tcga_mini_params(&output);
    // No cancer-type reaches 40 mutants, so every sample is filtered out
    param.labels.filter_count = 40;
    param.labels.genes.truncate(1);
    param.labels.cancer_types = vec!["BRCA".to_string()];

    let summary = run(&param).unwrap();
    assert!(matches!(summary.targets[0].status, TargetStatus::failed { .. }));
    assert_eq!(summary.targets[1].status, TargetStatus::done, "a failed target does not stop the run");
    assert!(!output.join("TP53").join("TP53_classify_metrics.tsv").exists());
}
