//! # particle-bridge
//!
//! Exchange of per-particle cryo-EM metadata between RELION STAR files and
//! cryoSPARC `.cs` / `.csg` datasets.
//!
//! ## Key Features
//!
//! - **Lossless round trips**: STAR values are kept as the original text
//!   tokens and `.cs` records as raw bytes, so fields that are never touched
//!   are written back unchanged.
//!
//! - **Identity-based joins**: particles are correlated through a canonical
//!   `"<index>@<basename>"` key derived from either representation, with
//!   explicit rules for UID prefixes and extensions.
//!
//! - **Strict merging**: every source particle must resolve to exactly one
//!   destination particle or the operation fails with the offending row.
//!
//! - **Optics rewriting**: rename, split and augment optics groups and
//!   relink micrographs without touching unrelated columns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use particle_bridge::merge::{merge_fields, MergeConfig};
//! use particle_bridge::star::StarDataset;
//!
//! let relion = StarDataset::from_file("Refine3D/job010/run_data.star")?;
//! let csparc = StarDataset::from_file("from_csparc.star")?;
//!
//! let posed = merge_fields(&relion, &csparc, &MergeConfig::pose_transfer(true))?;
//! posed.write("Refine3D/job010/run_data_posed.star")?;
//! # Ok::<(), particle_bridge::Error>(())
//! ```
//!
//! ## Subsetting a cryoSPARC Job
//!
//! ```rust,no_run
//! use particle_bridge::cs::CsDataset;
//! use particle_bridge::identity::IdentityRule;
//! use particle_bridge::merge::select_matching;
//! use particle_bridge::star::StarDataset;
//!
//! let job = CsDataset::from_csg("J42/J42_particles.csg")?;
//! let keep = StarDataset::from_file("Select/job020/particles.star")?;
//!
//! let subset = select_matching(&job, &keep, IdentityRule::BASENAME, IdentityRule::BASENAME)?;
//! subset.write("J42_selected", "J42_selected")?;
//! # Ok::<(), particle_bridge::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`identity`]: identity keys shared by both representations
//! - [`star`]: STAR parser and writer
//! - [`cs`]: `.npy` structured arrays and `.csg` group descriptors
//! - [`dataset`]: the [`Dataset`](dataset::Dataset) trait over both formats
//! - [`merge`]: identity join and field transfer
//! - [`optics`]: optics group rewrites

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod cs;
pub mod dataset;
pub mod error;
pub mod identity;
pub mod merge;
pub mod optics;
mod output;
pub mod star;

pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::cs::{CsDataset, GroupDescriptor, LatentMatrix, StructuredArray};
    pub use crate::dataset::Dataset;
    pub use crate::error::{Error, Result};
    pub use crate::identity::{derive_blob_identity, derive_identity, IdentityKey, IdentityRule};
    pub use crate::merge::{merge_fields, resolve_rows, select_matching, MergeConfig};
    pub use crate::optics::{
        append_column, assign_groups, augment_optics, parse_group_patterns, relink_micrographs,
        rename_group, ColumnSource, GroupPattern, GroupRename, MicrographIndex, OpticsAugment,
    };
    pub use crate::star::{columns, Block, StarDataset, StarDialect};
}
