use serde::{Deserialize, Serialize};

/// Stacked spectral descriptors over time.
///
/// Rows are descriptor channels (chroma, MFCC, spectral contrast), columns
/// are STFT frames. Storage is row-major, so [`FeatureMatrix::values`] is
/// already the flattened form used for similarity comparison. Column count
/// is proportional to the duration of the extracted window at a fixed hop
/// size, which is what makes frame-window rescaling valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: usize,
    frames: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Build a matrix from row-major data. The length must match the shape.
    pub fn from_parts(rows: usize, frames: usize, data: Vec<f32>) -> Result<Self, String> {
        if data.len() != rows.saturating_mul(frames) {
            return Err(format!(
                "Feature matrix shape mismatch: {rows}x{frames} needs {} values, got {}",
                rows.saturating_mul(frames),
                data.len()
            ));
        }
        Ok(Self { rows, frames, data })
    }

    /// Build a matrix from per-frame columns, each `rows` values long.
    pub fn from_columns(rows: usize, columns: &[Vec<f32>]) -> Result<Self, String> {
        for (frame, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(format!(
                    "Feature column {frame} has {} values, expected {rows}",
                    column.len()
                ));
            }
        }
        let frames = columns.len();
        let mut data = vec![0.0_f32; rows * frames];
        for (frame, column) in columns.iter().enumerate() {
            for (row, &value) in column.iter().enumerate() {
                data[row * frames + frame] = value;
            }
        }
        Ok(Self { rows, frames, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of time frames (columns).
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Row-major view of the full matrix, the flattened comparison vector.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// One descriptor channel across all frames.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Copy of the first `count` columns; a `count` past the end keeps all frames.
    pub fn take_frames(&self, count: usize) -> FeatureMatrix {
        let frames = count.min(self.frames);
        let mut data = Vec::with_capacity(self.rows * frames);
        for row in 0..self.rows {
            let start = row * self.frames;
            data.extend_from_slice(&self.data[start..start + frames]);
        }
        FeatureMatrix {
            rows: self.rows,
            frames,
            data,
        }
    }

    /// Check the shape invariant. Deserialized matrices must pass this
    /// before they are trusted; a hand-edited store can violate it.
    pub fn validate(&self) -> Result<(), String> {
        if self.data.len() != self.rows.saturating_mul(self.frames) {
            return Err(format!(
                "Feature matrix shape mismatch: {}x{} with {} values",
                self.rows,
                self.frames,
                self.data.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_matrix(rows: usize, frames: usize) -> FeatureMatrix {
        let data: Vec<f32> = (0..rows * frames).map(|i| i as f32).collect();
        FeatureMatrix::from_parts(rows, frames, data).unwrap()
    }

    #[test]
    fn from_parts_rejects_wrong_length() {
        let err = FeatureMatrix::from_parts(2, 3, vec![0.0; 5]).unwrap_err();
        assert!(err.contains("shape mismatch"));
    }

    #[test]
    fn from_columns_builds_row_major() {
        let matrix =
            FeatureMatrix::from_columns(2, &[vec![1.0, 3.0], vec![2.0, 4.0]]).unwrap();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.frames(), 2);
        assert_eq!(matrix.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(matrix.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn from_columns_rejects_ragged_input() {
        let err = FeatureMatrix::from_columns(2, &[vec![1.0], vec![2.0, 3.0]]).unwrap_err();
        assert!(err.contains("column 0"));
    }

    #[test]
    fn take_frames_keeps_leading_columns_of_every_row() {
        let matrix = ramp_matrix(3, 4);
        let subset = matrix.take_frames(2);
        assert_eq!(subset.rows(), 3);
        assert_eq!(subset.frames(), 2);
        assert_eq!(subset.values(), &[0.0, 1.0, 4.0, 5.0, 8.0, 9.0]);
    }

    #[test]
    fn take_frames_past_end_is_identity() {
        let matrix = ramp_matrix(2, 3);
        assert_eq!(matrix.take_frames(10), matrix);
    }

    #[test]
    fn serde_round_trip_is_bit_identical() {
        let matrix = ramp_matrix(4, 5);
        let json = serde_json::to_string(&matrix).unwrap();
        let back: FeatureMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, matrix);
    }
}
