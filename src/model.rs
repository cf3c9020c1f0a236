//! Logistic regression with an elastic-net penalty, fit by stochastic
//! gradient descent.
//!
//! The optimiser follows the classic SGD recipe for linear models: samples
//! are visited in a seeded random order each epoch, the learning rate decays
//! as `1 / (alpha * (t0 + t))`, the L2 part of the penalty shrinks the weights
//! multiplicatively and the L1 part is applied with cumulative clipping
//! (Tsuruoka et al., 2009) so that weights can reach exactly zero. The
//! intercept is never penalised. Class imbalance is corrected with balanced
//! class weights `n / (2 * n_class)`.

use crate::error::{ClassifyError, Result};
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const MAX_DLOSS: f64 = 1e12;
const N_ITER_NO_CHANGE: usize = 5;

/// Log loss of margin `p` for a label `y` in {-1, 1}.
fn log_loss(p: f64, y: f64) -> f64 {
    let z = p * y;
    if z > 18.0 {
        (-z).exp()
    } else if z < -18.0 {
        -z
    } else {
        (-z).exp().ln_1p()
    }
}

/// Derivative of the log loss with respect to `p`.
fn log_dloss(p: f64, y: f64) -> f64 {
    let z = p * y;
    if z > 18.0 {
        -y * (-z).exp()
    } else if z < -18.0 {
        -y
    } else {
        -y / (z.exp() + 1.0)
    }
}

fn dot(w: &[f64], x: &[f64]) -> f64 {
    w.iter().zip(x.iter()).map(|(a, b)| a * b).sum()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ElasticNetLogistic {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
    pub coef: Vec<f64>,
    pub intercept: f64,
    pub n_iter: usize,
}

impl ElasticNetLogistic {
    pub fn new(alpha: f64, l1_ratio: f64, max_iter: usize, tol: f64, seed: u64) -> ElasticNetLogistic {
        ElasticNetLogistic {
            alpha,
            l1_ratio,
            max_iter,
            tol,
            seed,
            coef: Vec::new(),
            intercept: 0.0,
            n_iter: 0,
        }
    }

    /// Fit on rows `X` with 0/1 labels `y`, replacing any previous fit.
    pub fn fit(&mut self, X: &[Vec<f64>], y: &[u8]) -> Result<()> {
        if X.len() != y.len() {
            return Err(ClassifyError::LengthMismatch { expected: X.len(), found: y.len() });
        }
        let n_samples = y.len();
        let n_positive = y.iter().filter(|v| **v == 1).count();
        if n_positive == 0 || n_positive == n_samples {
            return Err(ClassifyError::SingleClass { n_samples });
        }
        let n_features = X.first().map_or(0, |row| row.len());

        let class_weight = [
            n_samples as f64 / (2.0 * (n_samples - n_positive) as f64),
            n_samples as f64 / (2.0 * n_positive as f64),
        ];
        let signed: Vec<f64> = y.iter().map(|v| if *v == 1 { 1.0 } else { -1.0 }).collect();

        // Initial step size, scaled to the expected weight magnitude.
        let typw = (1.0 / self.alpha.sqrt()).sqrt();
        let eta0 = typw / log_dloss(-typw, 1.0).abs().max(1.0);
        let optimal_init = 1.0 / (eta0 * self.alpha);

        let mut w = vec![0.0; n_features];
        let mut q = vec![0.0; n_features];
        let mut u = 0.0;
        let mut intercept = 0.0;
        let mut t = 1.0;
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n_samples).collect();
        self.n_iter = 0;

        for epoch in 0..self.max_iter {
            order.shuffle(&mut rng);
            let mut sumloss = 0.0;

            for &i in &order {
                let x = &X[i];
                let target = signed[i];
                let p = dot(&w, x) + intercept;
                let eta = 1.0 / (self.alpha * (optimal_init + t - 1.0));
                sumloss += log_loss(p, target);

                let dloss = log_dloss(p, target).clamp(-MAX_DLOSS, MAX_DLOSS);
                let update = -eta * dloss * class_weight[y[i] as usize];

                let decay = (1.0 - (1.0 - self.l1_ratio) * eta * self.alpha).max(0.0);
                for (wj, xj) in w.iter_mut().zip(x.iter()) {
                    *wj = *wj * decay + update * xj;
                }
                intercept += update;

                if self.l1_ratio > 0.0 {
                    u += self.l1_ratio * eta * self.alpha;
                    for (wj, qj) in w.iter_mut().zip(q.iter_mut()) {
                        let before = *wj;
                        if *wj > 0.0 {
                            *wj = (*wj - (u + *qj)).max(0.0);
                        } else if *wj < 0.0 {
                            *wj = (*wj + (u - *qj)).min(0.0);
                        }
                        *qj += *wj - before;
                    }
                }
                t += 1.0;
            }

            self.n_iter = epoch + 1;
            if sumloss > best_loss - self.tol * n_samples as f64 {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if sumloss < best_loss {
                best_loss = sumloss;
            }
            if no_improvement >= N_ITER_NO_CHANGE {
                debug!("Converged after {} epochs (alpha={}, l1_ratio={})", self.n_iter, self.alpha, self.l1_ratio);
                break;
            }
        }
        if self.n_iter == self.max_iter && no_improvement < N_ITER_NO_CHANGE {
            warn!(
                "Maximum number of iterations {} reached before convergence (alpha={}, l1_ratio={})",
                self.max_iter, self.alpha, self.l1_ratio
            );
        }

        self.coef = w;
        self.intercept = intercept;
        Ok(())
    }

    /// Signed distance to the separating hyperplane; positive means class 1.
    pub fn decision_function(&self, X: &[Vec<f64>]) -> Vec<f64> {
        X.iter().map(|x| dot(&self.coef, x) + self.intercept).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feature 0 separates the classes, feature 1 is deterministic noise.
    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
        let y: Vec<u8> = (0..n).map(|i| u8::from(i % 3 == 0)).collect();
        let X = y
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let noise = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
                vec![if *c == 1 { 1.5 } else { -1.0 } + noise / 4.0, noise]
            })
            .collect();
        (X, y)
    }

    #[test]
    fn test_fit_separates_classes() {
        let (X, y) = separable(60);
        let mut model = ElasticNetLogistic::new(0.01, 0.15, 1000, 1e-3, 0);
        model.fit(&X, &y).unwrap();
        assert!(model.coef[0] > 0.0, "informative feature should get a positive weight, got {}", model.coef[0]);

        let scores = model.decision_function(&X);
        let min_positive = scores.iter().zip(&y).filter(|(_, c)| **c == 1).map(|(s, _)| *s).fold(f64::INFINITY, f64::min);
        let max_negative =
            scores.iter().zip(&y).filter(|(_, c)| **c == 0).map(|(s, _)| *s).fold(f64::NEG_INFINITY, f64::max);
        assert!(min_positive > max_negative, "every positive should outrank every negative");
        assert!(model.n_iter >= 1 && model.n_iter <= 1000);
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (X, y) = separable(45);
        let mut a = ElasticNetLogistic::new(0.1, 0.05, 1000, 1e-3, 7);
        let mut b = ElasticNetLogistic::new(0.1, 0.05, 1000, 1e-3, 7);
        a.fit(&X, &y).unwrap();
        b.fit(&X, &y).unwrap();
        assert_eq!(a, b, "same seed, same data: same model");
    }

    #[test]
    fn test_stronger_penalty_shrinks_weights() {
        let (X, y) = separable(60);
        let norm = |alpha: f64| {
            let mut model = ElasticNetLogistic::new(alpha, 0.5, 1000, 1e-3, 0);
            model.fit(&X, &y).unwrap();
            model.coef.iter().map(|w| w.abs()).sum::<f64>()
        };
        assert!(norm(5.0) < norm(0.001), "alpha 5 should give smaller weights than alpha 0.001");
    }

    #[test]
    fn test_fit_rejects_single_class() {
        let X = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut model = ElasticNetLogistic::new(0.1, 0.1, 100, 1e-3, 0);
        assert!(matches!(model.fit(&X, &[1, 1, 1]), Err(ClassifyError::SingleClass { n_samples: 3 })));
        assert!(matches!(model.fit(&X, &[1, 0]), Err(ClassifyError::LengthMismatch { .. })));
    }

    #[test]
    fn test_loss_and_gradient() {
        assert!((log_loss(0.0, 1.0) - 2f64.ln()).abs() < 1e-12);
        assert!((log_dloss(0.0, 1.0) + 0.5).abs() < 1e-12);
        assert!((log_dloss(0.0, -1.0) - 0.5).abs() < 1e-12);
        assert!(log_loss(30.0, 1.0) < 1e-12, "confident correct predictions cost nothing");
        assert_eq!(log_dloss(-30.0, 1.0), -1.0);

        let model = ElasticNetLogistic { coef: vec![2.0], intercept: -1.0, ..ElasticNetLogistic::new(0.1, 0.1, 1, 1e-3, 0) };
        assert_eq!(model.decision_function(&[vec![0.5], vec![0.0]]), vec![0.0, -1.0]);
    }
}
