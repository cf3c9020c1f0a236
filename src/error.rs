use thiserror::Error;

/// Failures raised while loading tables, building labels or training.
///
/// Most variants are configuration errors: the inputs cannot produce a
/// statistically meaningful result, so the operation halts instead of
/// returning partial output.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("The required column '{column}' was not found in {path}")]
    MissingColumn { path: String, column: String },
    #[error("Could not parse value '{value}' (row '{row}', column '{column}') in {path}")]
    Parse {
        path: String,
        row: String,
        column: String,
        value: String,
    },
    #[error("No sample could be matched while joining {what}")]
    NoMatchingSamples { what: String },
    #[error("Feature matrix and label vector share no sample")]
    EmptyIntersection,
    #[error("Training labels hold a single class across {n_samples} samples: AUROC cannot be computed")]
    SingleClass { n_samples: usize },
    #[error("Cannot build {folds} stratified folds: the largest class only has {max_class} members")]
    TooFewMembers { folds: usize, max_class: usize },
    #[error("Length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("No feature matrix indexed for {key}")]
    MissingFeatureMatrix { key: String },
    #[error("Non-finite value in feature '{feature}' for sample '{sample}'")]
    NonFinite { feature: String, sample: String },
    #[error("Feature '{feature}' is not a column of the feature matrix")]
    UnknownFeature { feature: String },
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

pub type Result<T> = std::result::Result<T, ClassifyError>;
