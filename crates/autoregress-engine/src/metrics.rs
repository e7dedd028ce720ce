//! Regression scoring metrics.

use serde::{Deserialize, Serialize};

/// Validation scores for one fitted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Wall-clock fit+predict time.
    pub seconds: f64,
}

/// Coefficient of determination.
///
/// A constant true vector scores 1.0 when predictions match it exactly and
/// 0.0 otherwise, matching the convention regression toolkits settled on.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len());
    let n = y_true.len() as f64;
    let mean = y_true.iter().sum::<f64>() / n;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Mean absolute error.
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len());
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// Root mean squared error.
pub fn root_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len());
    let mse = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64;
    mse.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = [1.0, 2.0, 3.0];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert_eq!(mean_absolute_error(&y, &y), 0.0);
        assert_eq!(root_mean_squared_error(&y, &y), 0.0);
    }

    #[test]
    fn test_mean_prediction_scores_zero_r2() {
        let y_true = [1.0, 2.0, 3.0];
        let y_pred = [2.0, 2.0, 2.0];
        assert!((r2_score(&y_true, &y_pred)).abs() < 1e-12);
    }

    #[test]
    fn test_r2_can_go_negative() {
        let y_true = [1.0, 2.0, 3.0];
        let y_pred = [3.0, 3.0, 3.0];
        assert!(r2_score(&y_true, &y_pred) < 0.0);
    }

    #[test]
    fn test_constant_target_edge_cases() {
        let y_true = [5.0, 5.0, 5.0];
        assert_eq!(r2_score(&y_true, &[5.0, 5.0, 5.0]), 1.0);
        assert_eq!(r2_score(&y_true, &[5.0, 5.0, 6.0]), 0.0);
    }

    #[test]
    fn test_mae_and_rmse() {
        let y_true = [0.0, 0.0, 0.0, 0.0];
        let y_pred = [1.0, -1.0, 3.0, -3.0];
        assert_eq!(mean_absolute_error(&y_true, &y_pred), 2.0);
        assert_eq!(root_mean_squared_error(&y_true, &y_pred), 5.0_f64.sqrt());
    }
}
