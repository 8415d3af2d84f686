pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Euclidean length of a vector.
    pub fn norm(vector: &[f64]) -> f64 {
        vector.iter().map(|&v| v * v).sum::<f64>().sqrt()
    }

    pub fn dot(lhs: &[f64], rhs: &[f64]) -> f64 {
        lhs.iter().zip(rhs).map(|(a, b)| a * b).sum()
    }

    /// Pearson chi-squared statistic, `None` when an expected value is not positive.
    pub fn chi_square(observed: &[f64], expected: &[f64]) -> Option<f64> {
        if observed.len() != expected.len() || observed.is_empty() {
            return None;
        }
        let mut total = 0.0;
        for (&o, &e) in observed.iter().zip(expected) {
            if e <= 0.0 || e.is_nan() {
                return None;
            }
            total += (o - e) * (o - e) / e;
        }
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(StatsHelper::mean(&[]), 0.0);
        assert_eq!(StatsHelper::mean(&[1.0, 2.0, 6.0]), 3.0);
    }

    #[test]
    fn norm_of_three_four_twelve() {
        assert_eq!(StatsHelper::norm(&[3.0, 4.0, 12.0]), 13.0);
    }

    #[test]
    fn chi_square_matches_hand_computation() {
        let value = StatsHelper::chi_square(&[2.0, 4.0], &[1.0, 4.0]).unwrap();
        assert!((value - 1.0).abs() < 1e-12);
        assert!(StatsHelper::chi_square(&[1.0], &[0.0]).is_none());
    }
}
