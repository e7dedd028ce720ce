//! The candidate model roster and fitted-estimator wrappers around smartcore.
//!
//! Candidate order and hyperparameters are part of the run contract: the tie
//! break during selection is first-wins, so reordering the roster changes
//! which model a tied run picks. Bump [`ROSTER_VERSION`] whenever the roster,
//! an estimator default, or the serialized estimator state changes shape.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::LinearRegression;
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_regressor::{KNNRegressor, KNNRegressorParameters};
use smartcore::svm::Kernels;
use smartcore::svm::svr::{SVR, SVRParameters};

use crate::error::{EngineError, Result};

/// Version of the candidate roster and estimator serialization.
pub const ROSTER_VERSION: u32 = 1;

/// Which estimator family a candidate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    Linear,
    Ridge,
    RandomForest,
    Svr,
    Knn,
}

/// One roster entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSpec {
    pub name: &'static str,
    pub kind: CandidateKind,
}

/// The fixed candidate roster, in selection-tie-break order.
pub const CANDIDATES: [CandidateSpec; 5] = [
    CandidateSpec {
        name: "Linear Regression",
        kind: CandidateKind::Linear,
    },
    CandidateSpec {
        name: "Ridge Regression",
        kind: CandidateKind::Ridge,
    },
    CandidateSpec {
        name: "Random Forest",
        kind: CandidateKind::RandomForest,
    },
    CandidateSpec {
        name: "SVR",
        kind: CandidateKind::Svr,
    },
    CandidateSpec {
        name: "KNN Regression",
        kind: CandidateKind::Knn,
    },
];

/// The roster paired with its version.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRoster {
    pub version: u32,
    pub candidates: &'static [CandidateSpec],
}

impl CandidateRoster {
    /// The roster this build trains with.
    pub fn current() -> Self {
        Self {
            version: ROSTER_VERSION,
            candidates: &CANDIDATES,
        }
    }
}

const RIDGE_ALPHA: f64 = 1.0;
const FOREST_TREES: u16 = 120;
const FOREST_MAX_DEPTH: u16 = 22;
const FOREST_MIN_SAMPLES_LEAF: usize = 2;
const FOREST_SEED: u64 = 42;
const SVR_C: f64 = 1.0;
const SVR_EPS: f64 = 0.1;
const KNN_K: usize = 5;

type LinearModel = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type RidgeModel = RidgeRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type KnnModel = KNNRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>, Euclidian<f64>>;

/// Training data retained for a support vector regressor.
///
/// The SVR implementation borrows its parameters and kernel for the life of
/// the fitted model, so it cannot be stored or serialized directly. Instead
/// the snapshot keeps the training matrix and hyperparameters and refits on
/// demand; the solver is deterministic for fixed inputs, so predictions are
/// reproducible across save/load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvrSnapshot {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub c: f64,
    pub eps: f64,
    pub gamma: f64,
}

impl SvrSnapshot {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let name = "SVR";
        let train_x = dense(&self.x, name)?;
        let train_y = self.y.clone();
        let params = SVRParameters::default()
            .with_c(self.c)
            .with_eps(self.eps)
            .with_kernel(Kernels::rbf().with_gamma(self.gamma));
        let model =
            SVR::fit(&train_x, &train_y, &params).map_err(|e| estimator_err(name, &e))?;
        let matrix = dense(x, name)?;
        model.predict(&matrix).map_err(|e| estimator_err(name, &e))
    }
}

/// A fitted candidate in serializable form.
#[derive(Debug, Serialize, Deserialize)]
pub enum FittedEstimator {
    Linear(Box<LinearModel>),
    Ridge(Box<RidgeModel>),
    RandomForest(Box<ForestModel>),
    Svr(SvrSnapshot),
    Knn(Box<KnnModel>),
}

fn estimator_err(name: &str, e: &smartcore::error::Failed) -> EngineError {
    EngineError::Estimator {
        name: name.to_string(),
        message: e.to_string(),
    }
}

fn dense(rows: &[Vec<f64>], _name: &str) -> Result<DenseMatrix<f64>> {
    Ok(DenseMatrix::from_2d_vec(&rows.to_vec()))
}

/// The RBF `scale` gamma: `1 / (n_features * var(X))`, falling back to 1.0
/// for a zero-variance matrix.
fn scale_gamma(x: &[Vec<f64>]) -> f64 {
    let n_features = x.first().map_or(0, Vec::len);
    let count = (x.len() * n_features) as f64;
    if count == 0.0 {
        return 1.0;
    }
    let mean = x.iter().flatten().sum::<f64>() / count;
    let var = x.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    if var > 0.0 {
        1.0 / (n_features as f64 * var)
    } else {
        1.0
    }
}

/// Fit one candidate on the training matrix.
pub fn fit_candidate(
    spec: &CandidateSpec,
    x_train: &[Vec<f64>],
    y_train: &[f64],
) -> Result<FittedEstimator> {
    let x = dense(x_train, spec.name)?;
    let y = y_train.to_vec();
    let fitted = match spec.kind {
        CandidateKind::Linear => {
            let model = LinearRegression::fit(&x, &y, Default::default())
                .map_err(|e| estimator_err(spec.name, &e))?;
            FittedEstimator::Linear(Box::new(model))
        }
        CandidateKind::Ridge => {
            let params = RidgeRegressionParameters::default().with_alpha(RIDGE_ALPHA);
            let model = RidgeRegression::fit(&x, &y, params)
                .map_err(|e| estimator_err(spec.name, &e))?;
            FittedEstimator::Ridge(Box::new(model))
        }
        CandidateKind::RandomForest => {
            let params = RandomForestRegressorParameters::default()
                .with_n_trees(FOREST_TREES.into())
                .with_max_depth(FOREST_MAX_DEPTH)
                .with_min_samples_leaf(FOREST_MIN_SAMPLES_LEAF)
                .with_seed(FOREST_SEED);
            let model = RandomForestRegressor::fit(&x, &y, params)
                .map_err(|e| estimator_err(spec.name, &e))?;
            FittedEstimator::RandomForest(Box::new(model))
        }
        CandidateKind::Svr => {
            let snapshot = SvrSnapshot {
                x: x_train.to_vec(),
                y,
                c: SVR_C,
                eps: SVR_EPS,
                gamma: scale_gamma(x_train),
            };
            // Fit once now so invalid training data fails here, not at
            // prediction time.
            snapshot.predict(&x_train[..1])?;
            FittedEstimator::Svr(snapshot)
        }
        CandidateKind::Knn => {
            let params = KNNRegressorParameters::default().with_k(KNN_K);
            let model =
                KNNRegressor::fit(&x, &y, params).map_err(|e| estimator_err(spec.name, &e))?;
            FittedEstimator::Knn(Box::new(model))
        }
    };
    Ok(fitted)
}

impl FittedEstimator {
    /// Predict targets for a preprocessed feature matrix.
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        match self {
            FittedEstimator::Linear(m) => {
                let matrix = dense(x, "Linear Regression")?;
                m.predict(&matrix)
                    .map_err(|e| estimator_err("Linear Regression", &e))
            }
            FittedEstimator::Ridge(m) => {
                let matrix = dense(x, "Ridge Regression")?;
                m.predict(&matrix)
                    .map_err(|e| estimator_err("Ridge Regression", &e))
            }
            FittedEstimator::RandomForest(m) => {
                let matrix = dense(x, "Random Forest")?;
                m.predict(&matrix)
                    .map_err(|e| estimator_err("Random Forest", &e))
            }
            FittedEstimator::Svr(snapshot) => snapshot.predict(x),
            FittedEstimator::Knn(m) => {
                let matrix = dense(x, "KNN Regression")?;
                m.predict(&matrix)
                    .map_err(|e| estimator_err("KNN Regression", &e))
            }
        }
    }
}
