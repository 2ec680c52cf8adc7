//! # Dataset Abstraction
//!
//! [`Dataset`] is the surface the merge engine needs from a source of
//! particle metadata, implemented by both [`StarDataset`] and [`CsDataset`].
//! Columns are exposed as text so that a value read from either format can be
//! written into a STAR row unchanged.

use std::path::Path;

use crate::cs::CsDataset;
use crate::error::{Error, Result};
use crate::identity::{derive_identity, IdentityKey, IdentityRule};
use crate::star::{columns, StarDataset};

/// Row-oriented particle metadata that can be loaded, subset and written
pub trait Dataset: Sized {
    /// Load from a file
    ///
    /// For STAR datasets this is the `.star` file, for cryoSPARC datasets the
    /// `.csg` group descriptor.
    fn load(path: &Path) -> Result<Self>;

    /// Write to a file
    ///
    /// For cryoSPARC datasets `path` is `<outdir>/<rootname>` and three files
    /// are written under `outdir`.
    fn write(&self, path: &Path) -> Result<()>;

    /// New dataset holding the rows at `indices`, in that order
    fn select_rows(&self, indices: &[usize]) -> Result<Self>;

    /// Number of particle rows
    fn num_rows(&self) -> usize;

    /// Column names in declared order
    fn column_names(&self) -> Vec<String>;

    /// Every value of a column as text, or `None` if the column is absent
    fn column(&self, name: &str) -> Result<Option<Vec<String>>>;

    /// Identity of every row, in row order
    fn identity_keys(&self, rule: IdentityRule) -> Result<Vec<IdentityKey>>;

    /// Whether the dataset has a column
    fn has_column(&self, name: &str) -> bool {
        self.column_names().iter().any(|c| c == name)
    }
}

impl Dataset for StarDataset {
    fn load(path: &Path) -> Result<Self> {
        StarDataset::from_file(path)
    }

    fn write(&self, path: &Path) -> Result<()> {
        StarDataset::write(self, path)
    }

    fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        StarDataset::select_rows(self, indices)
    }

    fn num_rows(&self) -> usize {
        self.particles().num_rows()
    }

    fn column_names(&self) -> Vec<String> {
        self.particles().columns().to_vec()
    }

    fn column(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.particles().column_values(name))
    }

    fn identity_keys(&self, rule: IdentityRule) -> Result<Vec<IdentityKey>> {
        let particles = self.particles();
        let idx = particles.require_column(columns::IMAGE_NAME)?;
        particles
            .rows()
            .iter()
            .map(|row| derive_identity(&row[idx], rule))
            .collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.particles().has_column(name)
    }
}

impl Dataset for CsDataset {
    fn load(path: &Path) -> Result<Self> {
        CsDataset::from_csg(path)
    }

    fn write(&self, path: &Path) -> Result<()> {
        let rootname = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidFormat(format!("no output root name in {}", path.display()))
            })?;
        let outdir = path.parent().unwrap_or_else(|| Path::new(""));
        CsDataset::write(self, outdir, rootname)?;
        Ok(())
    }

    fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        CsDataset::select_rows(self, indices)
    }

    fn num_rows(&self) -> usize {
        CsDataset::num_rows(self)
    }

    fn column_names(&self) -> Vec<String> {
        self.field_names()
    }

    fn column(&self, name: &str) -> Result<Option<Vec<String>>> {
        self.field_text(name)
    }

    fn identity_keys(&self, rule: IdentityRule) -> Result<Vec<IdentityKey>> {
        CsDataset::identity_keys(self, rule)
    }
}
