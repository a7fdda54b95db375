use std::slice::ChunksExact;

use crate::HkmError;

/// Dense row-major matrix of `f32` vectors sharing one length.
///
/// The row length is fixed when the matrix is created; every row pushed
/// afterwards must match it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FloatMatrix {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl FloatMatrix {
    /// Create an empty matrix whose rows will have `dim` elements.
    pub fn new(dim: usize) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            dim,
        }
    }

    /// Create an empty matrix with room for `rows` rows.
    pub fn with_capacity(rows: usize, dim: usize) -> Self {
        Self {
            data: Vec::with_capacity(rows * dim),
            rows: 0,
            dim,
        }
    }

    /// Create a `rows × dim` matrix filled with zeros.
    pub fn zeros(rows: usize, dim: usize) -> Self {
        Self {
            data: vec![0.0; rows * dim],
            rows,
            dim,
        }
    }

    /// Wrap a flat row-major buffer.
    pub fn from_flat(data: Vec<f32>, dim: usize) -> Result<Self, HkmError> {
        if dim == 0 {
            if !data.is_empty() {
                return Err(HkmError::InvalidConfig(
                    "zero-dimensional matrix cannot hold values",
                ));
            }
            return Ok(Self::new(0));
        }
        if data.len() % dim != 0 {
            return Err(HkmError::DimensionMismatch {
                expected: dim,
                got: data.len() % dim,
            });
        }
        let rows = data.len() / dim;
        Ok(Self { data, rows, dim })
    }

    /// Copy a slice of owned rows into a matrix. All rows must share a length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, HkmError> {
        let dim = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::with_capacity(rows.len(), dim);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    /// Append one row.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), HkmError> {
        if row.len() != self.dim {
            return Err(HkmError::DimensionMismatch {
                expected: self.dim,
                got: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Length of every row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow row `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.rows()`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Mutably borrow row `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.rows()`.
    #[inline]
    pub fn row_mut(&mut self, idx: usize) -> &mut [f32] {
        let start = idx * self.dim;
        &mut self.data[start..start + self.dim]
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> RowIter<'_> {
        RowIter {
            inner: (self.dim > 0).then(|| self.data.chunks_exact(self.dim)),
        }
    }

    /// Flat row-major view of the values.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Iterator over the rows of a [`FloatMatrix`].
pub struct RowIter<'a> {
    inner: Option<ChunksExact<'a, f32>>,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner
            .as_ref()
            .map_or((0, Some(0)), ChunksExact::size_hint)
    }
}

impl ExactSizeIterator for RowIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged_input() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert_eq!(
            FloatMatrix::from_rows(&rows),
            Err(HkmError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn rows_are_row_major() {
        let matrix = FloatMatrix::from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3).unwrap();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.row(1), &[4.0f32, 5.0, 6.0][..]);
        let collected: Vec<&[f32]> = matrix.iter_rows().collect();
        assert_eq!(collected, vec![&[1.0f32, 2.0, 3.0][..], &[4.0f32, 5.0, 6.0][..]]);
    }

    #[test]
    fn zero_dim_matrix_has_no_rows() {
        let matrix = FloatMatrix::from_rows(&[]).unwrap();
        assert!(matrix.is_empty());
        assert_eq!(matrix.iter_rows().count(), 0);
    }
}
