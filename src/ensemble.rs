//! Assembling feature matrices out of several compression models: whole-model
//! ensembles per bottleneck dimension, or hand-picked features taken from a
//! coefficient table.

use crate::data::FeatureMatrix;
use crate::error::{ClassifyError, Result};
use crate::index::{FeatureKey, IndexReport, Signal, Split};
use crate::metrics::CoefficientRow;
use log::info;
use std::collections::BTreeMap;

/// Train and test matrices side by side.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitPair {
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

impl SplitPair {
    fn new() -> SplitPair {
        SplitPair { train: FeatureMatrix::new(), test: FeatureMatrix::new() }
    }

    fn append(&mut self, other: &SplitPair) -> Result<()> {
        self.train.hconcat(&other.train)?;
        self.test.hconcat(&other.test)?;
        Ok(())
    }
}

/// Load both splits of one compression model, optionally restricted to one feature.
pub fn get_feature(
    index: &IndexReport,
    z_dim: &str,
    seed: &str,
    algorithm: &str,
    sig: Signal,
    feature: Option<&str>,
) -> Result<SplitPair> {
    let key = FeatureKey::new(sig, z_dim, seed, algorithm, Split::train);
    let mut train = index.get(&key)?.load()?;
    let mut test = index.get(&key.with_split(Split::test))?.load()?;

    if let Some(feature) = feature {
        let selected = vec![feature.to_string()];
        train = train.select_features(&selected)?;
        test = test.select_features(&selected)?;
    }
    Ok(SplitPair { train, test })
}

/// Ensembles of one algorithm across seeds.
///
/// Every column is renamed `{feature}_{seed}_{z}_{signal}` so that matrices
/// from different seeds can sit side by side. Without `use_all_features`, one
/// ensemble is built per (signal, z); with it, one per signal spanning all zs
/// (keyed with an empty z).
pub fn load_ensemble(
    index: &IndexReport,
    zs: &[String],
    seeds: &[String],
    algorithm: &str,
    signals: &[Signal],
    use_all_features: bool,
) -> Result<BTreeMap<(Signal, String), SplitPair>> {
    let mut ensembles: BTreeMap<(Signal, String), SplitPair> = BTreeMap::new();

    for &sig in signals {
        let mut all_features = SplitPair::new();
        for z in zs {
            let mut ensemble = SplitPair::new();
            for seed in seeds {
                info!(
                    "Now processing: {} for k = {} and seed = {}. Data is {}",
                    algorithm, z, seed, sig
                );
                let mut pair = get_feature(index, z, seed, algorithm, sig, None)?;
                let suffix = format!("_{}_{}_{}", seed, z, sig);
                pair.train.rename_features(&suffix);
                pair.test.rename_features(&suffix);

                if use_all_features {
                    all_features.append(&pair)?;
                } else {
                    ensemble.append(&pair)?;
                }
            }
            if !use_all_features {
                ensembles.insert((sig, z.clone()), ensemble);
            }
        }
        if use_all_features {
            ensembles.insert((sig, String::new()), all_features);
        }
    }

    Ok(ensembles)
}

/// Gather the individual features named by coefficient rows into one matrix per split.
pub fn build_good_feature_matrix(index: &IndexReport, rows: &[CoefficientRow]) -> Result<SplitPair> {
    let mut combined = SplitPair::new();
    for row in rows {
        let sig = Signal::parse(&row.signal)
            .ok_or_else(|| ClassifyError::InvalidParam(format!("unknown signal '{}' for feature {}", row.signal, row.feature)))?;
        let pair = get_feature(index, &row.z_dim, &row.seed, &row.algorithm, sig, Some(&row.feature))?;
        combined.append(&pair)?;
    }
    Ok(combined)
}
