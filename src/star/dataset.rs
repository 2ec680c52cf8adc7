use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::block::Block;
use super::columns::{OPTICS_BLOCK, OPTICS_GROUP};
use super::parser::{parse_document, StarDialect};
use super::writer::write_block;
use crate::error::{Error, Result};
use crate::output::write_atomic;

/// In-memory STAR dataset: optional optics block plus one data block
///
/// Blocks are shared through [`Arc`], so datasets derived by subsetting or
/// rewriting only one block keep pointing at the untouched one.
#[derive(Debug, Clone)]
pub struct StarDataset {
    optics: Option<Arc<Block>>,
    particles: Arc<Block>,
    dialect: StarDialect,
    path: Option<PathBuf>,
}

/// Datasets are equal when their dialect and block contents are; the source path is ignored
impl PartialEq for StarDataset {
    fn eq(&self, other: &Self) -> bool {
        self.dialect == other.dialect
            && self.optics.as_deref() == other.optics.as_deref()
            && *self.particles == *other.particles
    }
}

impl StarDataset {
    /// Build a dataset from blocks
    ///
    /// Versioned datasets need an optics block; legacy datasets must not have one.
    pub fn new(dialect: StarDialect, optics: Option<Block>, particles: Block) -> Result<Self> {
        match (&dialect, &optics) {
            (StarDialect::Versioned { .. }, None) => {
                return Err(Error::MissingBlock(OPTICS_BLOCK.to_string()))
            }
            (StarDialect::Legacy, Some(_)) => {
                return Err(Error::InvalidFormat(
                    "legacy STAR datasets have no optics block".to_string(),
                ))
            }
            _ => {}
        }
        Ok(Self {
            optics: optics.map(Arc::new),
            particles: Arc::new(particles),
            dialect,
            path: None,
        })
    }

    /// Load a STAR file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut dataset = Self::parse(&text, path)?;
        dataset.path = Some(path.to_path_buf());
        info!(
            "Loaded {}: {} rows in {}",
            path.display(),
            dataset.particles.num_rows(),
            dataset.dialect.data_block()
        );
        Ok(dataset)
    }

    /// Parse STAR text; `origin` is only used in error messages
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let (dialect, optics, particles) = parse_document(text, origin)?;
        let dataset = Self::new(dialect, optics, particles)?;
        let dangling = dataset.dangling_group_refs();
        if !dangling.is_empty() {
            warn!(
                "{} rows of {} reference optics groups missing from {}",
                dangling.len(),
                origin.display(),
                OPTICS_BLOCK
            );
        }
        Ok(dataset)
    }

    /// Serialize to any writer
    pub fn to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        if let Some(optics) = &self.optics {
            write_block(writer, OPTICS_BLOCK, optics)?;
        }
        write_block(writer, self.dialect.data_block(), &self.particles)?;
        Ok(())
    }

    /// Serialize to a string
    pub fn to_star_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::InvalidFormat(e.to_string()))
    }

    /// Write to `path`
    ///
    /// The file is assembled in a temporary file next to the target and moved
    /// into place once complete, so a failed run never leaves a truncated file.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        write_atomic(path, |writer| self.to_writer(writer))?;

        info!(
            "Wrote {}: {} rows",
            path.display(),
            self.particles.num_rows()
        );
        Ok(())
    }

    /// Optics block, if the dataset is versioned
    pub fn optics(&self) -> Option<&Block> {
        self.optics.as_deref()
    }

    /// Data block (one row per particle or micrograph)
    pub fn particles(&self) -> &Block {
        &self.particles
    }

    /// File layout
    pub fn dialect(&self) -> &StarDialect {
        &self.dialect
    }

    /// Path the dataset was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Same dataset with a different data block
    pub fn with_particles(&self, particles: Block) -> Self {
        Self {
            optics: self.optics.clone(),
            particles: Arc::new(particles),
            dialect: self.dialect.clone(),
            path: None,
        }
    }

    /// Same dataset with a different optics block
    ///
    /// Only meaningful for versioned datasets; legacy datasets are returned unchanged.
    pub fn with_optics(&self, optics: Block) -> Self {
        match self.dialect {
            StarDialect::Legacy => self.clone(),
            StarDialect::Versioned { .. } => Self {
                optics: Some(Arc::new(optics)),
                particles: self.particles.clone(),
                dialect: self.dialect.clone(),
                path: None,
            },
        }
    }

    /// New dataset holding the data rows at `indices`; optics are shared
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        Ok(self.with_particles(self.particles.select_rows(indices)?))
    }

    /// Data rows whose optics group id has no matching optics row
    pub fn dangling_group_refs(&self) -> Vec<usize> {
        let Some(optics) = &self.optics else {
            return Vec::new();
        };
        let (Some(optics_idx), Some(data_idx)) = (
            optics.column_index(OPTICS_GROUP),
            self.particles.column_index(OPTICS_GROUP),
        ) else {
            return Vec::new();
        };

        let known: std::collections::HashSet<&str> =
            optics.rows().iter().map(|r| r[optics_idx].as_str()).collect();
        self.particles
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| !known.contains(row[data_idx].as_str()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether both datasets share the same optics block allocation
    pub fn shares_optics_with(&self, other: &StarDataset) -> bool {
        match (&self.optics, &other.optics) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}
