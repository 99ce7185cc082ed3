use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub point_count: usize,
}

impl LinearFit {
    pub fn get_y(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Owned evaluator, independent of the fit it came from.
    pub fn evaluator(&self) -> impl Fn(f64) -> f64 + Send + Sync + 'static {
        let (slope, intercept) = (self.slope, self.intercept);
        move |x| slope * x + intercept
    }

    /// Fewer than two points cannot describe a trend even though the fit
    /// itself is well defined.
    pub fn is_trend(&self) -> bool {
        self.point_count >= 2
    }
}

/// Closed-form fit over `(x, y)` points, all weighted equally.
///
/// A single point (or any set sharing one x) yields a flat line through the
/// mean of y. An empty set is `InsufficientData`.
pub fn fit(points: &[(f64, f64)]) -> Result<LinearFit> {
    if points.is_empty() {
        return Err(TrajectoryError::InsufficientData(
            "regression needs at least one point".to_string(),
        ));
    }

    let n = points.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    let slope = if denominator.abs() <= f64::EPSILON * n * sum_xx.max(1.0) {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denominator
    };
    let intercept = (sum_y - slope * sum_x) / n;

    Ok(LinearFit {
        slope,
        intercept,
        point_count: points.len(),
    })
}

/// Same as [`fit`] for integer period indices.
pub fn fit_indexed(points: &[(u32, f64)]) -> Result<LinearFit> {
    let converted: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (f64::from(x), y)).collect();
    fit(&converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_line() {
        let line = fit_indexed(&[(0, 10.0), (1, 20.0), (2, 30.0)]).unwrap();
        assert!((line.slope - 10.0).abs() < 1e-9);
        assert!((line.intercept - 10.0).abs() < 1e-9);
        assert!((line.get_y(3.0) - 40.0).abs() < 1e-9);
        assert!(line.is_trend());
    }

    #[test]
    fn single_point_is_flat() {
        let line = fit(&[(2.0, 57.5)]).unwrap();
        assert_eq!(line.slope, 0.0);
        assert_eq!(line.get_y(-4.0), 57.5);
        assert_eq!(line.get_y(10.0), 57.5);
        assert!(!line.is_trend());
    }

    #[test]
    fn shared_x_is_flat_through_mean() {
        let line = fit(&[(1.0, 40.0), (1.0, 60.0)]).unwrap();
        assert_eq!(line.slope, 0.0);
        assert_eq!(line.get_y(0.0), 50.0);
    }

    #[test]
    fn empty_input_is_insufficient() {
        assert!(matches!(fit(&[]), Err(TrajectoryError::InsufficientData(_))));
    }

    #[test]
    fn noisy_points_match_hand_computed_fit() {
        // x = 0,1,2,3 ; y = 1,3,2,5 -> slope 1.1, intercept 1.1
        let line = fit_indexed(&[(0, 1.0), (1, 3.0), (2, 2.0), (3, 5.0)]).unwrap();
        assert!((line.slope - 1.1).abs() < 1e-9);
        assert!((line.intercept - 1.1).abs() < 1e-9);
    }

    #[test]
    fn evaluator_matches_get_y() {
        let line = fit_indexed(&[(0, 70.0), (2, 50.0)]).unwrap();
        let eval = line.evaluator();
        for x in [0.0, 1.0, 2.5, 7.0] {
            assert_eq!(eval(x), line.get_y(x));
        }
    }
}
