use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::output::write_atomic;

/// Field holding the latent coordinate of component `k`
pub fn component_field(k: usize) -> String {
    format!("components_mode_{}/value", k)
}

/// Row-major matrix of per-particle latent coordinates, shape `(rows, cols)`
#[derive(Debug, Clone, PartialEq)]
pub struct LatentMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl LatentMatrix {
    /// Interleave per-component columns into rows
    pub(crate) fn from_columns(rows: usize, columns: &[Vec<f64>]) -> Self {
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            data.extend(columns.iter().map(|c| c[i]));
        }
        Self { rows, cols, data }
    }

    /// Number of particles
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of components
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `(row, col)`
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// One particle's coordinates
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row < self.rows {
            Some(&self.data[row * self.cols..(row + 1) * self.cols])
        } else {
            None
        }
    }

    /// Row-major values
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Write as CSV with a `component_<k>` header row
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record((0..self.cols).map(|k| format!("component_{}", k)))?;
        for i in 0..self.rows {
            let row = &self.data[i * self.cols..(i + 1) * self.cols];
            csv_writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write the CSV to `path`, replacing it only once fully written
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomic(path.as_ref(), |writer| self.to_csv(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_is_row_major() {
        let m = LatentMatrix::from_columns(3, &[vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]]);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row(1), Some(&[2.0, -2.0][..]));
        assert_eq!(m.get(2, 1), Some(-3.0));
        assert_eq!(m.get(3, 0), None);
        assert_eq!(m.as_slice(), &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }

    #[test]
    fn test_to_csv() {
        let m = LatentMatrix::from_columns(2, &[vec![0.5, 1.25], vec![3.0, -4.0]]);
        let mut out = Vec::new();
        m.to_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "component_0,component_1\n0.5,3\n1.25,-4\n"
        );
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latent").join("J50_latent.csv");
        let m = LatentMatrix::from_columns(1, &[vec![0.25]]);
        m.write(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "component_0\n0.25\n"
        );
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
