//! Small dense matrices and vectors for colour math.
//!
//! Colour matrices in DNG are at most 4x4, so everything is a flat `Vec<f64>`
//! in row-major order. An empty matrix (0 x 0) means "not present".

use std::ops::{Index, IndexMut};

use crate::image_pipeline::common::error::{DngError, Result};

/// Pivot magnitude below which a matrix is treated as singular.
const SINGULAR_EPSILON: f64 = 1.0e-10;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::new(n, n);
        for i in 0..n {
            m[i][i] = 1.0;
        }
        m
    }

    pub fn diagonal(values: &Vector) -> Self {
        let mut m = Self::new(values.len(), values.len());
        for i in 0..values.len() {
            m[i][i] = values[i];
        }
        m
    }

    pub fn from_rows(rows: &[&[f64]]) -> Self {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut m = Self::new(rows.len(), cols);
        for (r, row) in rows.iter().enumerate() {
            m[r][..row.len().min(cols)].copy_from_slice(&row[..row.len().min(cols)]);
        }
        m
    }

    /// Builds a matrix from a flat row-major slice.
    pub fn from_slice(rows: usize, cols: usize, values: &[f64]) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(DngError::bad_format(format!(
                "matrix needs {} values, got {}",
                rows * cols,
                values.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data: values.to_vec(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn transpose(&self) -> Matrix {
        let mut t = Matrix::new(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t[c][r] = self[r][c];
            }
        }
        t
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    pub fn max_entry(&self) -> f64 {
        self.data.iter().copied().fold(f64::MIN, f64::max)
    }

    pub fn min_entry(&self) -> f64 {
        self.data.iter().copied().fold(f64::MAX, f64::min)
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self[r]
    }

    /// Returns a copy with `row` appended at the bottom.
    pub fn with_row_appended(&self, row: &[f64]) -> Matrix {
        let mut m = Matrix::new(self.rows + 1, self.cols);
        m.data[..self.data.len()].copy_from_slice(&self.data);
        m[self.rows][..self.cols.min(row.len())].copy_from_slice(&row[..self.cols.min(row.len())]);
        m
    }

    pub fn multiply(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(DngError::MatrixMath(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::new(self.rows, other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                out[r][c] = (0..self.cols).map(|k| self[r][k] * other[k][c]).sum();
            }
        }
        Ok(out)
    }

    pub fn multiply_vector(&self, v: &Vector) -> Result<Vector> {
        if self.cols != v.len() {
            return Err(DngError::MatrixMath(format!(
                "cannot multiply {}x{} by vector of {}",
                self.rows,
                self.cols,
                v.len()
            )));
        }
        let mut out = Vector::new(self.rows);
        for r in 0..self.rows {
            out[r] = (0..self.cols).map(|k| self[r][k] * v[k]).sum();
        }
        Ok(out)
    }

    /// Inverse for square matrices, pseudo-inverse otherwise.
    ///
    /// A 4x3 colour matrix (four-colour camera) is inverted as
    /// `(Mt M)^-1 Mt`, which yields the 3x4 least-squares inverse.
    pub fn invert(&self) -> Result<Matrix> {
        if self.is_empty() {
            return Err(DngError::MatrixMath("cannot invert an empty matrix".into()));
        }
        if self.rows == self.cols {
            return self.invert_square();
        }
        let t = self.transpose();
        if self.rows > self.cols {
            t.multiply(self)?.invert_square()?.multiply(&t)
        } else {
            t.multiply(&self.multiply(&t)?.invert_square()?)
        }
    }

    fn invert_square(&self) -> Result<Matrix> {
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .unwrap_or(col);
            if a[pivot][col].abs() < SINGULAR_EPSILON {
                return Err(DngError::MatrixMath(format!("{}x{} matrix is singular", n, n)));
            }
            if pivot != col {
                a.swap_rows(pivot, col);
                inv.swap_rows(pivot, col);
            }

            let p = a[col][col];
            for c in 0..n {
                a[col][c] /= p;
                inv[col][c] /= p;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let f = a[r][col];
                if f == 0.0 {
                    continue;
                }
                for c in 0..n {
                    let da = f * a[col][c];
                    let di = f * inv[col][c];
                    a[r][c] -= da;
                    inv[r][c] -= di;
                }
            }
        }
        Ok(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

impl Index<usize> for Matrix {
    type Output = [f64];

    fn index(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }
}

impl IndexMut<usize> for Matrix {
    fn index_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            data: values.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn push(&mut self, value: f64) {
        self.data.push(value);
    }

    pub fn max_entry(&self) -> f64 {
        self.data.iter().copied().fold(f64::MIN, f64::max)
    }

    pub fn min_entry(&self) -> f64 {
        self.data.iter().copied().fold(f64::MAX, f64::min)
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }
}

impl Index<usize> for Vector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.data[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.data[i]
    }
}
