use std::fmt;
use std::ops::{Index, IndexMut, Mul};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    #[error("Dimension mismatch in {operation}: {left_rows}x{left_cols} vs {right_rows}x{right_cols}")]
    Dimension {
        operation: &'static str,
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    #[error("Row {row} has {found} columns, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{operation} requires a square matrix, got {rows}x{cols}")]
    NotSquare {
        operation: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("Matrix is not positive-definite (pivot {pivot} at row {row})")]
    NotPositiveDefinite { row: usize, pivot: f64 },
    #[error("At least 2 rows are required for a covariance matrix, got {0}")]
    InsufficientRows(usize),
}

/// Dense row-major matrix of `f64`.
///
/// Dimensions are fixed at construction; cells can be written through `IndexMut`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::empty()
    }
}

impl Matrix {
    pub fn empty() -> Self {
        Matrix {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut identity = Self::zeros(n, n);
        for i in 0..n {
            identity[(i, i)] = 1.0;
        }
        identity
    }

    /// Builds an `n x 1` column vector.
    pub fn column(values: &[f64]) -> Self {
        Matrix {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    /// Builds a matrix from a nested table, rejecting ragged input.
    ///
    /// The column count is taken from the first row; every later row must match it.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let row_count = rows.len();
        let cols = rows.first().map_or(0, |row| row.len());
        let mut data = Vec::with_capacity(row_count * cols);

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(MatrixError::RaggedRows {
                    row: i,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend(row);
        }

        Ok(Matrix {
            rows: row_count,
            cols,
            data,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    pub fn transpose(&self) -> Matrix {
        let mut result = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                result[(j, i)] = self[(i, j)];
            }
        }
        result
    }

    pub fn dot(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.cols != other.rows {
            return Err(self.dimension_error("multiplication", other));
        }

        let mut result = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let left = self[(i, k)];
                for j in 0..other.cols {
                    result[(i, j)] += left * other[(k, j)];
                }
            }
        }
        Ok(result)
    }

    pub fn scale(&self, scalar: f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|x| x * scalar).collect(),
        }
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.zip_with(other, "addition", |a, b| a + b)
    }

    pub fn sub(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.zip_with(other, "subtraction", |a, b| a - b)
    }

    fn zip_with(
        &self,
        other: &Matrix,
        operation: &'static str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Matrix, MatrixError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(self.dimension_error(operation, other));
        }
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    fn dimension_error(&self, operation: &'static str, other: &Matrix) -> MatrixError {
        MatrixError::Dimension {
            operation,
            left_rows: self.rows,
            left_cols: self.cols,
            right_rows: other.rows,
            right_cols: other.cols,
        }
    }

    /// Arithmetic mean of each column. Empty when the matrix has no cells.
    pub fn mean_per_column(&self) -> Vec<f64> {
        if self.rows == 0 || self.cols == 0 {
            return Vec::new();
        }

        let mut means = vec![0.0; self.cols];
        for r in 0..self.rows {
            for (mean, value) in means.iter_mut().zip(self.row(r)) {
                *mean += value;
            }
        }
        let rows = self.rows as f64;
        means.iter_mut().for_each(|m| *m /= rows);
        means
    }

    /// Unbiased (divisor `rows - 1`) sample covariance between columns.
    pub fn covariance_matrix(&self) -> Result<Matrix, MatrixError> {
        if self.rows < 2 {
            return Err(MatrixError::InsufficientRows(self.rows));
        }

        let means = self.mean_per_column();
        let denominator = (self.rows - 1) as f64;
        let mut covariance = Matrix::zeros(self.cols, self.cols);

        for i in 0..self.cols {
            // the lower triangle is mirrored, so symmetry holds bit for bit
            for j in i..self.cols {
                let sum: f64 = (0..self.rows)
                    .map(|k| (self[(k, i)] - means[i]) * (self[(k, j)] - means[j]))
                    .sum();
                covariance[(i, j)] = sum / denominator;
                covariance[(j, i)] = covariance[(i, j)];
            }
        }
        Ok(covariance)
    }

    /// Cholesky factor `L` (lower triangular) with `A = L * L^T`.
    pub fn cholesky(&self) -> Result<Matrix, MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare {
                operation: "Cholesky decomposition",
                rows: self.rows,
                cols: self.cols,
            });
        }

        let n = self.rows;
        let mut lower = Matrix::zeros(n, n);

        for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..j).map(|k| lower[(i, k)] * lower[(j, k)]).sum();

                if i == j {
                    let pivot = self[(i, i)] - sum;
                    // also rejects a NaN pivot
                    if !(pivot > 0.0) {
                        return Err(MatrixError::NotPositiveDefinite { row: i, pivot });
                    }
                    lower[(i, j)] = pivot.sqrt();
                } else {
                    lower[(i, j)] = (self[(i, j)] - sum) / lower[(j, j)];
                }
            }
        }
        Ok(lower)
    }

    /// Inverse of a symmetric positive-definite matrix through its Cholesky factor.
    pub fn inverse(&self) -> Result<Matrix, MatrixError> {
        let lower = self.cholesky()?;
        let n = lower.num_rows();
        let mut inverse_lower = Matrix::zeros(n, n);

        // forward substitution, one column of L^-1 at a time
        for i in 0..n {
            inverse_lower[(i, i)] = 1.0 / lower[(i, i)];
            for j in (i + 1)..n {
                let sum: f64 = (i..j)
                    .map(|k| -lower[(j, k)] * inverse_lower[(k, i)])
                    .sum();
                inverse_lower[(j, i)] = sum / lower[(j, j)];
            }
        }

        // A^-1 = (L^-1)^T * L^-1
        inverse_lower.transpose().dot(&inverse_lower)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

impl Mul<f64> for &Matrix {
    type Output = Matrix;

    fn mul(self, scalar: f64) -> Matrix {
        self.scale(scalar)
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for value in self.row(r) {
                write!(f, "{:>12.6} ", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl From<&Matrix> for DMatrix<f64> {
    fn from(matrix: &Matrix) -> Self {
        DMatrix::from_row_slice(matrix.rows, matrix.cols, &matrix.data)
    }
}

impl From<&DMatrix<f64>> for Matrix {
    fn from(matrix: &DMatrix<f64>) -> Self {
        let (rows, cols) = matrix.shape();
        let mut result = Matrix::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                result[(r, c)] = matrix[(r, c)];
            }
        }
        result
    }
}
