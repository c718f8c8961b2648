use linfa::Float;
use ndarray::{s, Array2, ArrayBase, Data, Ix2};

/// A structure to retain absolute differences computation used to compute covariance matrix
#[derive(Debug)]
pub struct DiffMatrix<F: Float> {
    /// Differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<F>,
    /// Indices of the differences in the original data array
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl<F: Float> DiffMatrix<F> {
    /// Compute differences given points given as an array (n_obs, nx)
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> DiffMatrix<F> {
        let (d, d_indices) = Self::cross_diff(x);
        DiffMatrix {
            d,
            d_indices,
            n_obs: x.nrows(),
        }
    }

    fn cross_diff(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> (Array2<F>, Array2<usize>) {
        let n_obs = x.nrows();
        let nx = x.ncols();
        let n_non_zero_cross_dist = n_obs * n_obs.saturating_sub(1) / 2;
        let mut indices = Array2::<usize>::zeros((n_non_zero_cross_dist, 2));
        let mut d = Array2::zeros((n_non_zero_cross_dist, nx));
        let mut idx = 0;
        for k in 0..n_obs.saturating_sub(1) {
            let idx0 = idx;
            idx = idx0 + n_obs - k - 1;

            for i in (k + 1)..n_obs {
                let r = idx0 + i - k - 1;
                indices[[r, 0]] = k;
                indices[[r, 1]] = i;
            }

            let diff = &x.slice(s![k, ..]) - &x.slice(s![k + 1..n_obs, ..]);
            d.slice_mut(s![idx0..idx, ..]).assign(&diff);
        }
        d.mapv_inplace(num_traits::Float::abs);

        (d, indices)
    }
}

/// Computes differences between each element of x and each element of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x));
/// *Panics* if x and y have not the same column numbers
pub fn pairwise_differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());

    let ny = y.nrows();
    let mut result = Array2::zeros((x.nrows() * ny, x.ncols()));
    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            result
                .row_mut(i * ny + j)
                .assign(&(&x_row - &y_row));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pairwise_differences() {
        let x = array![[1., 0.5], [-2., 0.]];
        let y = array![[0., 0.], [1., 1.], [3., -1.]];
        assert_abs_diff_eq!(
            array![
                [1., 0.5],
                [0., -0.5],
                [-2., 1.5],
                [-2., 0.],
                [-3., -1.],
                [-5., 1.]
            ],
            pairwise_differences(&x, &y),
            epsilon = 1e-12
        )
    }

    #[test]
    fn test_diff_matrix() {
        let xt = array![[0.25], [1.0], [3.0], [2.5]];
        let dm = DiffMatrix::new(&xt);
        assert_eq!(4, dm.n_obs);
        assert_abs_diff_eq!(
            array![[0.75], [2.75], [2.25], [2.0], [1.5], [0.5]],
            dm.d,
            epsilon = 1e-12
        );
        assert_eq!(
            array![[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]],
            dm.d_indices
        );
    }

    #[test]
    fn test_diff_matrix_single_point() {
        let dm = DiffMatrix::new(&array![[0.5, 1.5]]);
        assert_eq!(1, dm.n_obs);
        assert_eq!((0, 2), dm.d.dim());
    }
}
