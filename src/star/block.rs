use crate::error::{Error, Result};

/// One `data_*` block of a STAR file: ordered column labels and text rows
///
/// Values are kept as the original text tokens so that fields which are never
/// touched are written back exactly as read. Every row holds one field per
/// column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Block {
    /// Create an empty block with the given labels
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a block from labels and rows, validating every row's width
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self> {
        let mut block = Self::new(name, columns);
        block.rows.reserve(rows.len());
        for row in rows {
            block.push_row(row)?;
        }
        Ok(block)
    }

    /// Block name, e.g. `data_particles`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column labels in declared order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in file order
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Whether the block declares `column`
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Position of a column, or `MissingColumn`
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| Error::MissingColumn {
            block: self.name.clone(),
            column: column.to_string(),
        })
    }

    /// All values of one column, in row order
    pub fn column_values(&self, column: &str) -> Option<Vec<String>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// One field of one row
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// Append a row, rejecting it if its width differs from the column count
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::ColumnCountMismatch {
                block: self.name.clone(),
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Declare another column while the block has no rows yet
    pub(crate) fn push_label(&mut self, label: &str) {
        debug_assert!(self.rows.is_empty());
        self.columns.push(label.to_string());
    }

    /// Mutable access to the rows; callers must keep every row's width
    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<String>] {
        &mut self.rows
    }

    /// Replace all rows at once; widths are validated
    pub(crate) fn replace_rows(&mut self, rows: Vec<Vec<String>>) -> Result<()> {
        self.rows.clear();
        self.rows.reserve(rows.len());
        for row in rows {
            self.push_row(row)?;
        }
        Ok(())
    }

    /// Append a column whose value for each row is computed from that row
    pub fn add_column<F>(&mut self, column: &str, mut fill: F) -> Result<()>
    where
        F: FnMut(&[String]) -> String,
    {
        if self.has_column(column) {
            return Err(Error::ColumnAlreadyExists {
                block: self.name.clone(),
                column: column.to_string(),
            });
        }
        for row in &mut self.rows {
            let value = fill(row);
            row.push(value);
        }
        self.columns.push(column.to_string());
        Ok(())
    }

    /// New block holding the rows at `indices`, in that order
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let mut rows = Vec::with_capacity(indices.len());
        for &index in indices {
            let row = self.rows.get(index).ok_or(Error::IndexOutOfRange {
                index,
                len: self.rows.len(),
            })?;
            rows.push(row.clone());
        }
        Ok(Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        })
    }
}
