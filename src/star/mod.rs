//! # STAR Module
//!
//! Reader and writer for the RELION STAR text format as used for particle and
//! micrograph metadata.
//!
//! ## Supported Layouts
//!
//! ```text
//! data_optics              <- versioned dialect (RELION 3.1+)
//!
//! loop_
//! _rlnOpticsGroup
//! _rlnOpticsGroupName
//! 1 opticsGroup1
//!
//! data_particles           <- any data_* name; recorded in the dialect
//!
//! loop_
//! _rlnImageName
//! _rlnOpticsGroup
//! 000001@Extract/mic1.mrcs 1
//! ```
//!
//! The legacy dialect (RELION 2.x/3.0) has a single `data_` block with the
//! same `loop_` / label / row grammar and no optics table.
//!
//! Only the loop grammar is supported; key/value (non-loop) blocks are not.

mod block;
pub mod columns;
mod dataset;
mod parser;
mod writer;

#[cfg(test)]
mod tests;

pub use block::Block;
pub use dataset::StarDataset;
pub use parser::StarDialect;
