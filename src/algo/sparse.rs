//! Sparse matrices and a preconditioned conjugate gradient solver.
//!
//! This module provides a lightweight sparse matrix in CSR format with the
//! handful of operations the fairing operator needs (triplet assembly,
//! products, row scaling, principal blocks) and a Jacobi-preconditioned
//! conjugate gradient solver for symmetric positive definite systems.

use nalgebra::DVector;

use crate::error::SolveError;

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` is the range of row `i` in `col_idx`/`values`.
    row_ptr: Vec<usize>,
    /// Column indices, sorted within each row.
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += val;
                }
            } else {
                col_idx.push(col);
                values.push(val);
                row_ptr[row + 1] += 1;
                last = Some((row, col));
            }
        }

        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over the `(column, value)` entries of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Entry at `(i, j)`, zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        match self.col_idx[range.clone()].binary_search(&j) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    /// The main diagonal.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }

    /// Multiply row `i` by `factors[i]` in place.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        assert_eq!(factors.len(), self.rows, "Scale vector dimension mismatch");

        for (i, &s) in factors.iter().enumerate() {
            for v in &mut self.values[self.row_ptr[i]..self.row_ptr[i + 1]] {
                *v *= s;
            }
        }
    }

    /// Sparse product `self * other`.
    pub fn mul(&self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(self.cols, other.rows, "Matrix dimension mismatch");

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        // Dense accumulator over the columns of the current output row
        let mut acc = vec![0.0; other.cols];
        let mut marker = vec![usize::MAX; other.cols];
        let mut pattern = Vec::new();

        for i in 0..self.rows {
            pattern.clear();
            for (k, a) in self.row(i) {
                for (j, b) in other.row(k) {
                    if marker[j] != i {
                        marker[j] = i;
                        acc[j] = 0.0;
                        pattern.push(j);
                    }
                    acc[j] += a * b;
                }
            }
            pattern.sort_unstable();
            for &j in &pattern {
                col_idx.push(j);
                values.push(acc[j]);
            }
            row_ptr.push(col_idx.len());
        }

        CsrMatrix {
            rows: self.rows,
            cols: other.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// The block made of `rows` and `columns` of this matrix, in the given order.
    pub fn submatrix(&self, rows: &[usize], columns: &[usize]) -> CsrMatrix {
        let mut column_map = vec![usize::MAX; self.cols];
        for (new, &old) in columns.iter().enumerate() {
            column_map[old] = new;
        }

        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        let mut entries: Vec<(usize, f64)> = Vec::new();
        for &i in rows {
            entries.clear();
            entries.extend(
                self.row(i)
                    .filter(|&(j, _)| column_map[j] != usize::MAX)
                    .map(|(j, v)| (column_map[j], v)),
            );
            entries.sort_unstable_by_key(|&(j, _)| j);
            for &(j, v) in &entries {
                col_idx.push(j);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }

        CsrMatrix {
            rows: rows.len(),
            cols: columns.len(),
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        let mut y = DVector::zeros(self.rows);
        for i in 0..self.rows {
            y[i] = self.row(i).map(|(j, v)| v * x[j]).sum();
        }
        y
    }
}

/// Result of a successful conjugate gradient solve.
#[derive(Debug, Clone)]
pub struct Solution {
    /// The solution vector.
    pub x: DVector<f64>,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Final relative residual norm.
    pub residual: f64,
}

/// Solve A*x = b with Jacobi-preconditioned conjugate gradient.
///
/// Requires A to be symmetric positive definite.
///
/// # Arguments
///
/// * `a` - The system matrix (must be symmetric positive definite)
/// * `b` - The right-hand side vector
/// * `x0` - Optional initial guess (zeros if None)
/// * `max_iter` - Maximum number of iterations
/// * `tolerance` - Convergence tolerance on the relative residual norm
///
/// The residual is measured relative to `|b|`, or to the initial residual
/// when `b` is zero (so a warm start away from the trivial solution still
/// has to travel to it).
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<Solution, SolveError> {
    let n = b.len();
    assert_eq!(a.nrows(), n, "Matrix-vector dimension mismatch");
    assert_eq!(a.ncols(), n, "Matrix must be square");

    if b.iter().any(|v| !v.is_finite()) || a.values.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite);
    }

    let mut x = match x0 {
        Some(x0) if x0.iter().all(|v| v.is_finite()) => x0.clone(),
        _ => DVector::zeros(n),
    };

    let inv_diag: DVector<f64> = DVector::from_iterator(
        n,
        a.diagonal()
            .into_iter()
            .map(|d| if d > 0.0 { 1.0 / d } else { 1.0 }),
    );

    // r = b - A*x
    let mut r = b - a.mul_vec(&x);
    let r0_norm = r.norm();
    let b_norm = b.norm();
    let scale = if b_norm > 1e-300 { b_norm } else { r0_norm };

    if r0_norm == 0.0 || r0_norm / scale < tolerance {
        return Ok(Solution {
            x,
            iterations: 0,
            residual: if scale > 0.0 { r0_norm / scale } else { 0.0 },
        });
    }

    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut residual = r0_norm / scale;

    for iter in 0..max_iter {
        let ap = a.mul_vec(&p);

        let p_ap = p.dot(&ap);
        if !p_ap.is_finite() {
            return Err(SolveError::NonFinite);
        }
        if p_ap <= 0.0 {
            return Err(SolveError::Breakdown { iteration: iter });
        }
        let alpha = rz / p_ap;

        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        residual = r.norm() / scale;
        if !residual.is_finite() {
            return Err(SolveError::NonFinite);
        }
        if residual < tolerance {
            return Ok(Solution {
                x,
                iterations: iter + 1,
                residual,
            });
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;

        // p = z + beta * p
        p.axpy(1.0, &z, beta);
        rz = rz_new;
    }

    Err(SolveError::NotConverged {
        iterations: max_iter,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd_2x2() -> CsrMatrix {
        // [ 4  1 ]
        // [ 1  3 ]
        CsrMatrix::from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)])
    }

    #[test]
    fn test_csr_from_triplets() {
        let a = spd_2x2();
        assert_eq!(a.nrows(), 2);
        assert_eq!(a.ncols(), 2);
        assert_eq!(a.nnz(), 4);
        assert_eq!(a.get(1, 0), 1.0);
    }

    #[test]
    fn test_csr_from_triplets_with_duplicates_and_empty_rows() {
        let triplets = vec![
            (2, 2, 3.0),
            (0, 0, 2.0),
            (0, 0, 2.0), // Duplicate: should sum to 4.0
            (0, 1, 1.0),
        ];
        let a = CsrMatrix::from_triplets(3, 3, triplets);

        assert_eq!(a.nnz(), 3);
        assert_eq!(a.get(0, 0), 4.0);
        assert_eq!(a.row(1).count(), 0);
        assert_eq!(a.diagonal(), vec![4.0, 0.0, 3.0]);

        let empty = CsrMatrix::from_triplets(2, 2, Vec::new());
        assert_eq!(empty.nnz(), 0);
        assert_eq!(empty.mul_vec(&DVector::from_vec(vec![1.0, 1.0])).norm(), 0.0);
    }

    #[test]
    fn test_csr_mul_vec() {
        // [ 4  1 ]   [ 1 ]   [ 5 ]
        // [ 1  3 ] * [ 1 ] = [ 4 ]
        let a = spd_2x2();
        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 1.0]));

        assert!((y[0] - 5.0).abs() < 1e-10);
        assert!((y[1] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_sparse_product_matches_dense() {
        let a = spd_2x2();
        let b = CsrMatrix::from_triplets(2, 3, vec![(0, 0, 1.0), (0, 2, 2.0), (1, 1, -1.0)]);
        let c = a.mul(&b);

        // [4 1][1  0 2]   [4 -1 8]
        // [1 3][0 -1 0] = [1 -3 2]
        let expected = [[4.0, -1.0, 8.0], [1.0, -3.0, 2.0]];
        assert_eq!((c.nrows(), c.ncols()), (2, 3));
        for (i, row) in expected.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                assert!((c.get(i, j) - v).abs() < 1e-12, "entry ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_scale_rows() {
        let mut a = spd_2x2();
        a.scale_rows(&[0.5, 2.0]);
        assert_eq!(a.get(0, 0), 2.0);
        assert_eq!(a.get(1, 0), 2.0);
        assert_eq!(a.diagonal(), vec![2.0, 6.0]);
    }

    #[test]
    fn test_submatrix_selects_and_reorders() {
        let a = CsrMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0), (2, 0, 4.0), (2, 2, 5.0)],
        );
        let s = a.submatrix(&[2, 0], &[2, 0]);

        assert_eq!((s.nrows(), s.ncols()), (2, 2));
        assert_eq!(s.get(0, 0), 5.0);
        assert_eq!(s.get(0, 1), 4.0);
        assert_eq!(s.get(1, 0), 2.0);
        assert_eq!(s.get(1, 1), 1.0);

        let off = a.submatrix(&[1], &[0, 2]);
        assert_eq!(off.nnz(), 0);
    }

    #[test]
    fn test_cg_simple() {
        // Solution: x = 1/11, y = 7/11
        let a = spd_2x2();
        let b = DVector::from_vec(vec![1.0, 2.0]);

        let sol = conjugate_gradient(&a, &b, None, 100, 1e-12).unwrap();

        assert!((a.mul_vec(&sol.x) - b).norm() < 1e-10);
        assert!((sol.x[0] - 1.0 / 11.0).abs() < 1e-10);
        assert!((sol.x[1] - 7.0 / 11.0).abs() < 1e-10);
        assert!(sol.iterations <= 2);
    }

    #[test]
    fn test_cg_larger_system() {
        let triplets = vec![
            (0, 0, 10.0),
            (0, 1, 1.0),
            (0, 2, 2.0),
            (1, 0, 1.0),
            (1, 1, 10.0),
            (1, 2, 1.0),
            (2, 0, 2.0),
            (2, 1, 1.0),
            (2, 2, 10.0),
            (2, 3, 1.0),
            (3, 2, 1.0),
            (3, 3, 10.0),
        ];
        let a = CsrMatrix::from_triplets(4, 4, triplets);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);

        let sol = conjugate_gradient(&a, &b, None, 100, 1e-10).unwrap();
        assert!((a.mul_vec(&sol.x) - &b).norm() < 1e-8);
    }

    #[test]
    fn test_cg_zero_rhs_moves_warm_start_to_zero() {
        let a = spd_2x2();
        let b = DVector::zeros(2);
        let x0 = DVector::from_vec(vec![3.0, -2.0]);

        let sol = conjugate_gradient(&a, &b, Some(&x0), 100, 1e-12).unwrap();
        assert!(sol.x.norm() < 1e-10);
    }

    #[test]
    fn test_cg_exact_warm_start_returns_immediately() {
        let a = spd_2x2();
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x0 = DVector::from_vec(vec![1.0 / 11.0, 7.0 / 11.0]);

        let sol = conjugate_gradient(&a, &b, Some(&x0), 100, 1e-10).unwrap();
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn test_cg_singular_matrix_breaks_down() {
        // [ 1 -1 ]
        // [-1  1 ] with an inconsistent right-hand side
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 1.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 1.0)]);
        let b = DVector::from_vec(vec![1.0, 1.0]);

        let err = conjugate_gradient(&a, &b, None, 50, 1e-10).unwrap_err();
        assert!(matches!(
            err,
            SolveError::Breakdown { .. } | SolveError::NotConverged { .. }
        ));
    }

    #[test]
    fn test_cg_rejects_non_finite_input() {
        let a = spd_2x2();
        let b = DVector::from_vec(vec![f64::NAN, 1.0]);
        assert_eq!(
            conjugate_gradient(&a, &b, None, 10, 1e-10).unwrap_err(),
            SolveError::NonFinite
        );
    }

    #[test]
    fn test_cg_iteration_limit() {
        let a = CsrMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 1.0), (1, 1, 100.0), (2, 2, 1e4), (0, 1, 0.5), (1, 0, 0.5)],
        );
        let b = DVector::from_vec(vec![1.0, 1.0, 1.0]);

        let err = conjugate_gradient(&a, &b, None, 0, 1e-12).unwrap_err();
        assert!(matches!(err, SolveError::NotConverged { iterations: 0, .. }));
    }
}
