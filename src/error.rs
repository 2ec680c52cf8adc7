//! Error types for particle-bridge.

use std::path::PathBuf;

/// Errors that can occur while loading, transforming or writing particle metadata
///
/// Every variant carries enough context (block, row index, identity key or
/// file path) to locate the offending record. None of them are recovered from
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error reading or writing a metadata file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error in a group descriptor
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// CSV writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The STAR file has neither a `data_optics` nor a legacy `data_` block
    #[error("Unrecognized STAR dialect in {}: no data_optics or data_ block", path.display())]
    UnrecognizedDialect {
        /// File that was being parsed
        path: PathBuf,
    },

    /// A block named by the file layout could not be located
    #[error("Block not found: {0}")]
    MissingBlock(String),

    /// A row does not have one field per column
    #[error("Column count mismatch in {block}, row {row}: expected {expected} fields, found {found}")]
    ColumnCountMismatch {
        /// Block name
        block: String,
        /// Zero-based row index within the block
        row: usize,
        /// Number of declared columns
        expected: usize,
        /// Number of fields in the row
        found: usize,
    },

    /// An image reference could not be turned into an identity key
    #[error("Malformed identity {raw:?}: {reason}")]
    MalformedIdentity {
        /// The raw field value
        raw: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// Two destination rows share the same identity key
    #[error("Duplicate identity {identity} at rows {first} and {second}")]
    DuplicateIdentity {
        /// The repeated key
        identity: String,
        /// Row holding the first occurrence
        first: usize,
        /// Row holding the repeat
        second: usize,
    },

    /// A source row has no counterpart in the destination dataset
    #[error("Unresolved identity {identity} (source row {row})")]
    UnresolvedIdentity {
        /// Identity key of the source row
        identity: String,
        /// Zero-based source row index
        row: usize,
    },

    /// A descriptor metafile is neither a particle nor a passthrough file
    #[error("Unknown metafile kind in result {key:?}: {metafile}")]
    UnknownMetafileKind {
        /// Result key in the descriptor
        key: String,
        /// The metafile reference
        metafile: String,
    },

    /// More than one distinct metafile of the same kind is referenced
    #[error("Ambiguous {kind} metafile: {first} and {second}")]
    AmbiguousMetafile {
        /// Metafile kind
        kind: &'static str,
        /// First metafile seen
        first: String,
        /// Conflicting metafile
        second: String,
    },

    /// The descriptor references no particle metafile
    #[error("No particle metafile referenced by {}", path.display())]
    MissingMetafile {
        /// Descriptor path
        path: PathBuf,
    },

    /// The descriptor references a passthrough file but none is loaded
    #[error("Result {key:?} references a passthrough file but the dataset has no passthrough array")]
    MissingPassthrough {
        /// Result key in the descriptor
        key: String,
    },

    /// No optics row carries the requested group id or name
    #[error("Optics group not found: id {id:?}, name {name:?}")]
    GroupNotFound {
        /// Requested group id
        id: String,
        /// Requested group name
        name: String,
    },

    /// None of the group patterns matched a micrograph reference
    #[error("No optics pattern matched micrograph {micrograph} (row {row})")]
    NoPatternMatch {
        /// Micrograph reference of the row
        micrograph: String,
        /// Zero-based row index
        row: usize,
    },

    /// A micrograph could not be found among the known motion-corrected files
    #[error("No motion-corrected micrograph named {name} (row {row})")]
    UnresolvedMicrograph {
        /// Normalized micrograph name
        name: String,
        /// Zero-based row index
        row: usize,
    },

    /// A column to be appended already exists
    #[error("Column {column} already exists in {block}")]
    ColumnAlreadyExists {
        /// Block name
        block: String,
        /// Column name
        column: String,
    },

    /// A required column is absent
    #[error("Column {column} not found in {block}")]
    MissingColumn {
        /// Block name
        block: String,
        /// Column name
        column: String,
    },

    /// Fewer latent components are present than requested
    #[error("Requested {requested} latent components but only {available} are present")]
    InsufficientComponents {
        /// Number requested
        requested: usize,
        /// Number discovered
        available: usize,
    },

    /// Two row counts that must agree differ
    #[error("Row count mismatch in {context}: expected {expected}, found {found}")]
    RowCountMismatch {
        /// What was being compared
        context: String,
        /// Expected count
        expected: usize,
        /// Actual count
        found: usize,
    },

    /// A row index passed to a selection is past the end
    #[error("Row index {index} out of range for {len} rows")]
    IndexOutOfRange {
        /// Offending index
        index: usize,
        /// Number of rows
        len: usize,
    },

    /// Structurally invalid input
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
