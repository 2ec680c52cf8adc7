use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use log::{debug, info};

use super::group::{GroupDescriptor, MetafileKind};
use super::latent::{component_field, LatentMatrix};
use super::npy::StructuredArray;
use crate::error::{Error, Result};
use crate::identity::{derive_blob_identity, IdentityKey, IdentityRule};
use crate::output::write_atomic;

/// Field holding the image stack path of each particle
pub const BLOB_PATH: &str = "blob/path";

/// Field holding the zero-based index of each particle within its stack
pub const BLOB_IDX: &str = "blob/idx";

/// In-memory cryoSPARC particle dataset
///
/// The primary array and the optional passthrough array hold one record per
/// particle, aligned by row index. The descriptor is shared by [`Arc`] among
/// datasets derived from the same load.
#[derive(Debug, Clone, PartialEq)]
pub struct CsDataset {
    group: Arc<GroupDescriptor>,
    particles: StructuredArray,
    passthrough: Option<StructuredArray>,
    source: Option<PathBuf>,
}

impl CsDataset {
    /// Assemble a dataset, checking that the passthrough array is row-aligned
    pub fn new(
        group: GroupDescriptor,
        particles: StructuredArray,
        passthrough: Option<StructuredArray>,
    ) -> Result<Self> {
        if let Some(pt) = &passthrough {
            if pt.len() != particles.len() {
                return Err(Error::RowCountMismatch {
                    context: "passthrough array".to_string(),
                    expected: particles.len(),
                    found: pt.len(),
                });
            }
        }
        Ok(Self {
            group: Arc::new(group),
            particles,
            passthrough,
            source: None,
        })
    }

    /// Load the descriptor at `csg_path` and the arrays it references
    pub fn from_csg<P: AsRef<Path>>(csg_path: P) -> Result<Self> {
        let csg_path = csg_path.as_ref();
        let group = GroupDescriptor::from_file(csg_path)?;
        let metafiles = group.metafiles(csg_path)?;

        let particles = load_array(&metafiles.particles)?;
        let passthrough = match &metafiles.passthrough {
            Some(path) => Some(load_array(path)?),
            None => None,
        };

        let mut dataset = Self::new(group, particles, passthrough)?;
        dataset.source = Some(csg_path.to_path_buf());
        info!(
            "Loaded {}: {} particles{}",
            csg_path.display(),
            dataset.num_rows(),
            if dataset.passthrough.is_some() {
                " with passthrough"
            } else {
                ""
            }
        );
        Ok(dataset)
    }

    /// Write `<rootname>_particles.cs`, the passthrough array if present and
    /// `<rootname>_particles.csg` into `outdir`; returns the descriptor path
    pub fn write<P: AsRef<Path>>(&self, outdir: P, rootname: &str) -> Result<PathBuf> {
        let outdir = outdir.as_ref();

        let particles_name = format!("{}_{}", rootname, MetafileKind::Particles.file_suffix());
        let passthrough_name = self
            .passthrough
            .as_ref()
            .map(|_| format!("{}_{}", rootname, MetafileKind::Passthrough.file_suffix()));

        let group = self.group.rewritten(
            &particles_name,
            passthrough_name.as_deref(),
            self.num_rows(),
            Local::now(),
        )?;

        write_atomic(&outdir.join(&particles_name), |file| {
            self.particles.to_writer(file)
        })?;
        if let (Some(pt), Some(name)) = (&self.passthrough, &passthrough_name) {
            write_atomic(&outdir.join(name), |file| pt.to_writer(file))?;
        }

        let csg_path = outdir.join(format!("{}_particles.csg", rootname));
        let yaml = group.to_yaml()?;
        write_atomic(&csg_path, |file| Ok(file.write_all(yaml.as_bytes())?))?;

        info!(
            "Wrote {}: {} particles",
            csg_path.display(),
            self.num_rows()
        );
        Ok(csg_path)
    }

    /// Group descriptor
    pub fn group(&self) -> &GroupDescriptor {
        &self.group
    }

    /// Primary array
    pub fn particles(&self) -> &StructuredArray {
        &self.particles
    }

    /// Passthrough array, if loaded
    pub fn passthrough(&self) -> Option<&StructuredArray> {
        self.passthrough.as_ref()
    }

    /// Descriptor the dataset was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of particles
    pub fn num_rows(&self) -> usize {
        self.particles.len()
    }

    /// New dataset holding the rows at `indices` of both arrays
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let particles = self.particles.select(indices)?;
        let passthrough = match &self.passthrough {
            Some(pt) => Some(pt.select(indices)?),
            None => None,
        };
        Ok(Self {
            group: Arc::clone(&self.group),
            particles,
            passthrough,
            source: None,
        })
    }

    /// Whether both datasets share the same descriptor allocation
    pub fn shares_group_with(&self, other: &CsDataset) -> bool {
        Arc::ptr_eq(&self.group, &other.group)
    }

    /// Field names of the primary array followed by passthrough-only fields
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .particles
            .layout()
            .fields()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        if let Some(pt) = &self.passthrough {
            for field in pt.layout().fields() {
                if !self.particles.has_field(&field.name) {
                    names.push(field.name.clone());
                }
            }
        }
        names
    }

    /// The array that holds `name`, primary first
    fn array_with(&self, name: &str) -> Option<&StructuredArray> {
        if self.particles.has_field(name) {
            Some(&self.particles)
        } else {
            self.passthrough.as_ref().filter(|pt| pt.has_field(name))
        }
    }

    /// Every value of a field as text, or `None` if neither array has it
    pub fn field_text(&self, name: &str) -> Result<Option<Vec<String>>> {
        self.array_with(name)
            .map(|array| array.field_text(name))
            .transpose()
    }

    /// Every value of a scalar numeric field
    pub fn field_f64(&self, name: &str) -> Result<Vec<f64>> {
        match self.array_with(name) {
            Some(array) => array.field_f64(name),
            None => Err(Error::MissingColumn {
                block: "particles.cs".to_string(),
                column: name.to_string(),
            }),
        }
    }

    /// Identity of every particle from its blob path and index
    pub fn identity_keys(&self, rule: IdentityRule) -> Result<Vec<IdentityKey>> {
        let array = self.array_with(BLOB_PATH).ok_or_else(|| Error::MissingColumn {
            block: "particles.cs".to_string(),
            column: BLOB_PATH.to_string(),
        })?;
        let paths = array.field_text(BLOB_PATH)?;
        let indices = match self.array_with(BLOB_IDX) {
            Some(array) => array.field_u64(BLOB_IDX)?,
            None => {
                return Err(Error::MissingColumn {
                    block: "particles.cs".to_string(),
                    column: BLOB_IDX.to_string(),
                })
            }
        };
        paths
            .iter()
            .zip(indices)
            .map(|(path, idx)| derive_blob_identity(path, idx, rule))
            .collect()
    }

    /// Number of contiguous `components_mode_<k>/value` fields from `k = 0`
    pub fn num_components(&self) -> usize {
        (0..)
            .take_while(|&k| self.array_with(&component_field(k)).is_some())
            .count()
    }

    /// Latent coordinates from a variability analysis, shape `(rows, n)`
    ///
    /// `None` takes every available component.
    pub fn latent_variables(&self, num_components: Option<usize>) -> Result<LatentMatrix> {
        let available = self.num_components();
        let requested = num_components.unwrap_or(available);
        if available == 0 || requested > available {
            return Err(Error::InsufficientComponents {
                requested,
                available,
            });
        }
        debug!("Stacking {} of {} latent components", requested, available);

        let columns = (0..requested)
            .map(|k| self.field_f64(&component_field(k)))
            .collect::<Result<Vec<_>>>()?;
        Ok(LatentMatrix::from_columns(self.num_rows(), &columns))
    }
}

fn load_array(path: &Path) -> Result<StructuredArray> {
    if !path.is_file() {
        return Err(Error::MissingMetafile {
            path: path.to_path_buf(),
        });
    }
    let array = StructuredArray::from_file(path)?;
    debug!(
        "Read {}: {} records of {} bytes",
        path.display(),
        array.len(),
        array.layout().itemsize()
    );
    Ok(array)
}
