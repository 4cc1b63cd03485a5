use crate::error::LinearSolveError;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Default relative pivot threshold of [LuFactorization::new]
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-13;

/// LU factorization with partial pivoting of a small dense square matrix, `P A = L U`
///
/// `L` has unit diagonal and is stored below the diagonal of `lu`, `U` is stored on and above it.
#[derive(Clone, Debug)]
pub struct LuFactorization {
    lu: Array2<f64>,
    /// Original row index of every factorized row
    permutation: Vec<usize>,
}

impl LuFactorization {
    /// Factorize `matrix`
    ///
    /// A pivot is singular if its magnitude is not larger than `pivot_tolerance` times the largest
    /// magnitude of its column in `matrix`, so the threshold does not depend on column scaling.
    pub fn new(matrix: ArrayView2<f64>, pivot_tolerance: f64) -> Result<Self, LinearSolveError> {
        let (rows, columns) = matrix.dim();
        if rows != columns {
            return Err(LinearSolveError::NotSquare { rows, columns });
        }
        let n = rows;
        let column_scales: Vec<f64> = matrix
            .columns()
            .into_iter()
            .map(|column| column.iter().fold(0.0_f64, |acc, value| acc.max(value.abs())))
            .collect();

        let mut lu = matrix.to_owned();
        let mut permutation: Vec<usize> = (0..n).collect();
        for k in 0..n {
            let pivot_row = (k..n).fold(k, |best, i| {
                if lu[[i, k]].abs() > lu[[best, k]].abs() {
                    i
                } else {
                    best
                }
            });
            let pivot = lu[[pivot_row, k]];
            let scale = column_scales[k];
            if !(scale.is_finite() && pivot.abs() > pivot_tolerance * scale) {
                return Err(LinearSolveError::Singular { column: k });
            }
            if pivot_row != k {
                for j in 0..n {
                    lu.swap([k, j], [pivot_row, j]);
                }
                permutation.swap(k, pivot_row);
            }
            for i in k + 1..n {
                let factor = lu[[i, k]] / pivot;
                lu[[i, k]] = factor;
                for j in k + 1..n {
                    let update = factor * lu[[k, j]];
                    lu[[i, j]] -= update;
                }
            }
        }
        Ok(Self { lu, permutation })
    }

    pub fn dim(&self) -> usize {
        self.permutation.len()
    }

    /// Solve `A x = rhs`
    pub fn solve(&self, rhs: ArrayView1<f64>) -> Result<Array1<f64>, LinearSolveError> {
        let n = self.dim();
        if rhs.len() != n {
            return Err(LinearSolveError::DimensionMismatch {
                actual: rhs.len(),
                expected: n,
            });
        }
        let mut x: Array1<f64> = self.permutation.iter().map(|&row| rhs[row]).collect();
        for i in 0..n {
            let s: f64 = (0..i).map(|j| self.lu[[i, j]] * x[j]).sum();
            x[i] -= s;
        }
        for i in (0..n).rev() {
            let s: f64 = (i + 1..n).map(|j| self.lu[[i, j]] * x[j]).sum();
            x[i] = (x[i] - s) / self.lu[[i, i]];
        }
        Ok(x)
    }

    /// Solve `A X = rhs` for every column of `rhs`
    pub fn solve_many(&self, rhs: ArrayView2<f64>) -> Result<Array2<f64>, LinearSolveError> {
        let n = self.dim();
        if rhs.nrows() != n {
            return Err(LinearSolveError::DimensionMismatch {
                actual: rhs.nrows(),
                expected: n,
            });
        }
        let mut solution = Array2::zeros(rhs.raw_dim());
        for (column, mut out) in rhs.columns().into_iter().zip(solution.columns_mut()) {
            out.assign(&self.solve(column)?);
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tests::*;

    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array, aview1};

    fn random_matrix(rng: &mut StdRng, n: usize) -> Array2<f64> {
        let mut matrix = Array::from_shape_simple_fn((n, n), || rng.sample::<f64, _>(StandardNormal));
        for i in 0..n {
            matrix[[i, i]] += n as f64;
        }
        matrix
    }

    #[test]
    fn solve_random_systems() {
        const N: usize = 5;
        const REPEAT: usize = 20;

        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..REPEAT {
            let matrix = random_matrix(&mut rng, N);
            let desired: Array1<f64> = (0..N).map(|_| rng.sample(StandardNormal)).collect();
            let rhs = matrix.dot(&desired);
            let lu = LuFactorization::new(matrix.view(), DEFAULT_PIVOT_TOLERANCE).unwrap();
            let actual = lu.solve(rhs.view()).unwrap();
            assert_abs_diff_eq!(actual, desired, epsilon = 1e-10);
        }
    }

    #[test]
    fn solve_many_inverts() {
        const N: usize = 5;

        let mut rng = StdRng::seed_from_u64(1);
        let matrix = random_matrix(&mut rng, N);
        let lu = LuFactorization::new(matrix.view(), DEFAULT_PIVOT_TOLERANCE).unwrap();
        let inverse = lu.solve_many(Array2::eye(N).view()).unwrap();
        assert_abs_diff_eq!(matrix.dot(&inverse), Array2::eye(N), epsilon = 1e-12);
    }

    #[test]
    fn requires_pivoting() {
        let matrix = array![[0.0, 1.0], [1.0, 0.0]];
        let lu = LuFactorization::new(matrix.view(), DEFAULT_PIVOT_TOLERANCE).unwrap();
        let x = lu.solve(aview1(&[2.0, 3.0])).unwrap();
        assert_abs_diff_eq!(x, array![3.0, 2.0]);
    }

    #[test]
    fn badly_scaled_columns() {
        let matrix = array![[1.0, 0.0], [0.0, 1e-20]];
        let lu = LuFactorization::new(matrix.view(), DEFAULT_PIVOT_TOLERANCE).unwrap();
        let x = lu.solve(aview1(&[1.0, 1e-20])).unwrap();
        assert_abs_diff_eq!(x, array![1.0, 1.0], epsilon = 1e-12);
    }

    #[test]
    fn singular_matrices() {
        let zero_column = array![[1.0, 0.0], [2.0, 0.0]];
        assert_eq!(
            LuFactorization::new(zero_column.view(), DEFAULT_PIVOT_TOLERANCE).unwrap_err(),
            LinearSolveError::Singular { column: 1 }
        );

        let dependent_rows = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [5.0, 7.0, 9.0]];
        assert!(matches!(
            LuFactorization::new(dependent_rows.view(), DEFAULT_PIVOT_TOLERANCE),
            Err(LinearSolveError::Singular { .. })
        ));

        let non_finite = array![[1.0, f64::NAN], [0.0, 1.0]];
        assert_eq!(
            LuFactorization::new(non_finite.view(), DEFAULT_PIVOT_TOLERANCE).unwrap_err(),
            LinearSolveError::Singular { column: 1 }
        );
    }

    #[test]
    fn dimension_errors() {
        let rectangular = Array2::<f64>::zeros((2, 3));
        assert_eq!(
            LuFactorization::new(rectangular.view(), DEFAULT_PIVOT_TOLERANCE).unwrap_err(),
            LinearSolveError::NotSquare {
                rows: 2,
                columns: 3
            }
        );
        let lu = LuFactorization::new(Array2::eye(3).view(), DEFAULT_PIVOT_TOLERANCE).unwrap();
        assert_eq!(
            lu.solve(aview1(&[1.0, 2.0])).unwrap_err(),
            LinearSolveError::DimensionMismatch {
                actual: 2,
                expected: 3
            }
        );
        assert!(lu.solve_many(Array2::zeros((2, 2)).view()).is_err());
    }
}
