use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    pub fn multiply(lhs: ArrayView2<f64>, rhs: ArrayView2<f64>) -> Array2<f64> {
        lhs.dot(&rhs)
    }

    /// Inverse through nalgebra; `None` for singular, non-square or non-finite input.
    pub fn invert(matrix: ArrayView2<f64>) -> Option<Array2<f64>> {
        let (rows, cols) = matrix.dim();
        if rows != cols || matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let dense = DMatrix::from_fn(rows, cols, |r, c| matrix[[r, c]]);
        let inverse = dense.try_inverse()?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Array2::from_shape_fn((rows, cols), |(r, c)| inverse[(r, c)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn inverse_times_matrix_is_identity() {
        let matrix = array![[4.0, 7.0], [2.0, 6.0]];
        let inverse = MatrixHelper::invert(matrix.view()).unwrap();
        let product = MatrixHelper::multiply(matrix.view(), inverse.view());
        for ((r, c), value) in product.indexed_iter() {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn one_by_one_normal_matrix_inverts_to_reciprocal() {
        let inverse = MatrixHelper::invert(array![[4.0e-8]].view()).unwrap();
        assert!((inverse[[0, 0]] - 2.5e7).abs() < 1e-3);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let matrix = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(MatrixHelper::invert(matrix.view()).is_none());
        assert!(MatrixHelper::invert(array![[0.0]].view()).is_none());
        assert!(MatrixHelper::invert(array![[1.0, 2.0]].view()).is_none());
    }
}
