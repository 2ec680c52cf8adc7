//! # cryoSPARC Module
//!
//! Reader and writer for cryoSPARC particle datasets.
//!
//! ## Layout
//!
//! ```text
//! J42/
//! ├── J42_particles.csg               <- YAML group descriptor
//! ├── J42_particles.cs                <- NumPy structured array, one record per particle
//! └── J42_passthrough_particles.cs    <- row-aligned side table (optional)
//! ```
//!
//! The descriptor's `results` map names the array holding each result group
//! (`blob`, `ctf`, `alignments3D`, ...) and its record count. Writing a
//! dataset under a new root name repoints every entry and refreshes the
//! counts so the descriptor always matches the payload.

mod dataset;
mod group;
mod header;
mod latent;
mod npy;


pub use dataset::{CsDataset, BLOB_IDX, BLOB_PATH};
pub use group::{GroupDescriptor, GroupInfo, MetafileKind, Metafiles, ResultEntry};
pub use latent::{component_field, LatentMatrix};
pub use npy::{Endianness, Field, RecordLayout, ScalarKind, StructuredArray, NPY_MAGIC};
