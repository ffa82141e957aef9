//! Row-major float buffers shared between scripts and batch draw nodes.

use std::cell::{Ref, RefCell};

use crate::error::BridgeError;
use crate::objects::WrapSlot;
use crate::scene::node::ImageQuad;

/// Largest number of cells a single vector may hold.
pub const MAX_VECTOR_CELLS: usize = 1 << 24;

/// A `rows x stride` matrix of floats.
///
/// Columns are addressed 1-based from scripts, matching Lua conventions.
#[derive(Debug)]
pub struct FloatVector {
    data: RefCell<Vec<f32>>,
    rows: usize,
    stride: usize,
    slot: WrapSlot,
}

impl FloatVector {
    /// Zero-filled vector, refused when it would exceed [`MAX_VECTOR_CELLS`].
    pub fn new(rows: usize, stride: usize) -> Result<Self, BridgeError> {
        let cells = rows
            .checked_mul(stride)
            .filter(|cells| *cells <= MAX_VECTOR_CELLS)
            .ok_or_else(|| {
                BridgeError::argument(format!("vector of {} x {} is too large", rows, stride))
            })?;
        Ok(Self {
            data: RefCell::new(vec![0.0; cells]),
            rows,
            stride,
            slot: WrapSlot::default(),
        })
    }

    /// Builds a vector from rows; the first row decides the stride.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, BridgeError> {
        let stride = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * stride);
        for (i, row) in rows.iter().enumerate() {
            if row.len() < stride {
                return Err(BridgeError::argument(format!(
                    "row {} has {} columns, expected {}",
                    i + 1,
                    row.len(),
                    stride
                )));
            }
            data.extend_from_slice(&row[..stride]);
        }
        Ok(Self {
            data: RefCell::new(data),
            rows: rows.len(),
            stride,
            slot: WrapSlot::default(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn wrap_slot(&self) -> &WrapSlot {
        &self.slot
    }

    pub fn data(&self) -> Ref<'_, Vec<f32>> {
        self.data.borrow()
    }

    /// Value at a 1-based row and column.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.index(row, col).map(|i| self.data.borrow()[i])
    }

    /// Sets the value at a 1-based row and column; false when out of range.
    pub fn set(&self, row: usize, col: usize, value: f32) -> bool {
        match self.index(row, col) {
            Some(i) => {
                self.data.borrow_mut()[i] = value;
                true
            }
            None => false,
        }
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        if row == 0 || col == 0 || row > self.rows || col > self.stride {
            return None;
        }
        Some((row - 1) * self.stride + (col - 1))
    }

    /// Fills a column with `lo`, or with uniform random values in `[lo, hi)`.
    pub fn generate_column(&self, col: usize, lo: f32, hi: f32) -> Result<(), BridgeError> {
        if col == 0 || col > self.stride {
            return Err(BridgeError::argument(format!("invalid column: {}", col)));
        }
        let mut data = self.data.borrow_mut();
        for row in data.chunks_exact_mut(self.stride) {
            row[col - 1] = if lo == hi {
                lo
            } else {
                lo + (hi - lo) * fastrand::f32()
            };
        }
        Ok(())
    }

    /// Writes one textured quad per offsets row into four consecutive rows.
    ///
    /// Each target row receives `x, y, s, t` starting at column `col`; the
    /// quad is the image's geometry shifted by the offsets row's two
    /// values starting at `offsets_col`. Vertices are emitted in strip order.
    pub fn fill_with_image_quads(
        &self,
        col: usize,
        image: &ImageQuad,
        offsets: &FloatVector,
        offsets_col: usize,
    ) -> Result<(), BridgeError> {
        if std::ptr::eq(self, offsets) {
            return Err(BridgeError::argument("offsets vector must differ from the target vector"));
        }
        if self.rows < 4 {
            return Err(BridgeError::argument("vector size must be at least 4"));
        }
        if self.rows % 4 != 0 {
            return Err(BridgeError::argument("vector size must be divisible by 4"));
        }
        if offsets.rows != self.rows / 4 {
            return Err(BridgeError::argument(
                "offsets vector must be a quarter of the size of the target vector",
            ));
        }
        if col == 0 || self.stride < col + 3 {
            return Err(BridgeError::argument("vector stride too small (need 4 columns)"));
        }
        if offsets_col == 0 || offsets.stride < offsets_col + 1 {
            return Err(BridgeError::argument("not enough columns in offsets vector (need 2)"));
        }

        let wv = &image.world_vertices;
        let tc = &image.tex_coords;
        let corners = [0usize, 2, 6, 4];
        let offsets_data = offsets.data.borrow();
        let mut data = self.data.borrow_mut();
        for (quad, os_row) in data
            .chunks_exact_mut(self.stride * 4)
            .zip(offsets_data.chunks_exact(offsets.stride))
        {
            let dx = os_row[offsets_col - 1];
            let dy = os_row[offsets_col];
            for (row, &c) in quad.chunks_exact_mut(self.stride).zip(corners.iter()) {
                row[col - 1] = wv[c] + dx;
                row[col] = wv[c + 1] + dy;
                row[col + 1] = tc[c];
                row[col + 2] = tc[c + 1];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_uses_first_row_stride() {
        let v = FloatVector::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0, 5.0]]).unwrap();
        assert_eq!(v.rows(), 2);
        assert_eq!(v.stride(), 2);
        assert_eq!(v.get(2, 2), Some(4.0));
        assert_eq!(v.get(2, 3), None);
    }

    #[test]
    fn test_from_rows_rejects_short_rows() {
        assert!(FloatVector::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_new_rejects_oversized_vectors() {
        assert!(FloatVector::new(1 << 33, 1 << 33).is_err());
        assert!(FloatVector::new(MAX_VECTOR_CELLS, 2).is_err());
        assert_eq!(FloatVector::new(MAX_VECTOR_CELLS, 1).unwrap().rows(), MAX_VECTOR_CELLS);
    }

    #[test]
    fn test_generate_column_constant() {
        let v = FloatVector::new(3, 2).unwrap();
        v.generate_column(2, 5.0, 5.0).unwrap();
        assert_eq!(*v.data(), vec![0.0, 5.0, 0.0, 5.0, 0.0, 5.0]);
    }

    #[test]
    fn test_generate_column_random_in_range() {
        let v = FloatVector::new(50, 1).unwrap();
        v.generate_column(1, -1.0, 1.0).unwrap();
        assert!(v.data().iter().all(|x| *x >= -1.0 && *x < 1.0));
    }

    #[test]
    fn test_generate_column_rejects_bad_column() {
        let v = FloatVector::new(2, 2).unwrap();
        assert!(v.generate_column(0, 0.0, 1.0).is_err());
        assert!(v.generate_column(3, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_fill_with_image_quads() {
        let image = ImageQuad::new("atlas", 2.0, 2.0, [0.0, 0.0, 1.0, 1.0]);
        let target = FloatVector::new(4, 4).unwrap();
        let offsets = FloatVector::from_rows(&[vec![10.0, 20.0]]).unwrap();
        target.fill_with_image_quads(1, &image, &offsets, 1).unwrap();
        // bottom-left, bottom-right, top-left, top-right
        assert_eq!(target.get(1, 1), Some(9.0));
        assert_eq!(target.get(1, 2), Some(19.0));
        assert_eq!(target.get(2, 1), Some(11.0));
        assert_eq!(target.get(3, 2), Some(21.0));
        assert_eq!(target.get(4, 1), Some(11.0));
        assert_eq!(target.get(4, 2), Some(21.0));
    }

    #[test]
    fn test_fill_with_image_quads_validates_sizes() {
        let image = ImageQuad::new("atlas", 2.0, 2.0, [0.0, 0.0, 1.0, 1.0]);
        let target = FloatVector::new(6, 4).unwrap();
        let offsets = FloatVector::new(1, 2).unwrap();
        assert!(target.fill_with_image_quads(1, &image, &offsets, 1).is_err());
        let narrow = FloatVector::new(4, 3).unwrap();
        assert!(narrow.fill_with_image_quads(1, &image, &offsets, 1).is_err());
    }
}
