//! STAR labels and block markers as constants.

/// Particle image reference, `<index>@<stack path>`
pub const IMAGE_NAME: &str = "_rlnImageName";
/// Micrograph the particle was extracted from
pub const MICROGRAPH_NAME: &str = "_rlnMicrographName";
/// Optics group id (particle rows reference optics rows by this value)
pub const OPTICS_GROUP: &str = "_rlnOpticsGroup";
/// Optics group name
pub const OPTICS_GROUP_NAME: &str = "_rlnOpticsGroupName";
/// Pixel size of the original (unbinned) micrograph
pub const MICROGRAPH_ORIGINAL_PIXEL_SIZE: &str = "_rlnMicrographOriginalPixelSize";

// Pose parameters
/// First Euler angle
pub const ANGLE_ROT: &str = "_rlnAngleRot";
/// Second Euler angle
pub const ANGLE_TILT: &str = "_rlnAngleTilt";
/// Third Euler angle (in-plane)
pub const ANGLE_PSI: &str = "_rlnAnglePsi";
/// In-plane X translation in Angstrom
pub const ORIGIN_X_ANGST: &str = "_rlnOriginXAngst";
/// In-plane Y translation in Angstrom
pub const ORIGIN_Y_ANGST: &str = "_rlnOriginYAngst";

/// Half-set assignment for gold-standard refinement
pub const RANDOM_SUBSET: &str = "_rlnRandomSubset";

/// Group name used for per-group scale/noise estimation
pub const GROUP_NAME: &str = "_rlnGroupName";
/// Group number used for per-group scale/noise estimation
pub const GROUP_NUMBER: &str = "_rlnGroupNumber";

/// All pose columns, in the order they are transferred
pub const POSE_COLUMNS: [&str; 5] = [
    ANGLE_ROT,
    ANGLE_TILT,
    ANGLE_PSI,
    ORIGIN_X_ANGST,
    ORIGIN_Y_ANGST,
];

/// Prefix shared by every column label
pub const LABEL_PREFIX: &str = "_";

/// Loop marker preceding the column labels of a block
pub const LOOP_MARKER: &str = "loop_";

/// Block holding optics groups in the versioned dialect
pub const OPTICS_BLOCK: &str = "data_optics";

/// Single block name of the legacy dialect
pub const LEGACY_BLOCK: &str = "data_";

/// Particle block name written for new versioned datasets
pub const PARTICLES_BLOCK: &str = "data_particles";
