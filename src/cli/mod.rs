use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod config;
mod info;
mod optics;
mod select;
mod transfer;

/// particle-bridge - move particle metadata between RELION and cryoSPARC
#[derive(Parser)]
#[command(name = "particle-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy poses (and half-set assignment) into a RELION particle file
    ///
    /// Particles missing from the source file are dropped from the output.
    TransferPose {
        /// RELION particle file receiving the poses
        #[arg(long, value_name = "STAR")]
        relion_star: PathBuf,

        /// Particle file converted from cryoSPARC, providing the poses
        #[arg(long, value_name = "STAR")]
        csparc_star: PathBuf,

        /// Output particle file
        #[arg(long, value_name = "STAR")]
        out_star: PathBuf,

        /// Do not transfer _rlnRandomSubset
        #[arg(long)]
        no_random_subset: bool,

        /// Load [transfer] settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Copy _rlnGroupName / _rlnGroupNumber from another particle file
    TransferGroup {
        /// Particle file providing the groups
        #[arg(long, value_name = "STAR")]
        source_star: PathBuf,

        /// Particle file receiving the groups
        #[arg(long, value_name = "STAR")]
        in_star: PathBuf,

        /// Output particle file
        #[arg(long, value_name = "STAR")]
        out_star: PathBuf,

        /// Load [transfer] settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Change the id and name of one optics group
    ChangeOpticsGroup {
        /// Input particle file
        #[arg(long, value_name = "STAR")]
        input: PathBuf,

        /// Output particle file
        #[arg(long, value_name = "STAR")]
        output: PathBuf,

        /// Current _rlnOpticsGroup
        #[arg(long)]
        src_optics_group: String,

        /// Current _rlnOpticsGroupName
        #[arg(long)]
        src_optics_group_name: String,

        /// New _rlnOpticsGroup
        #[arg(long)]
        new_optics_group: String,

        /// New _rlnOpticsGroupName
        #[arg(long)]
        new_optics_group_name: String,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Assign optics groups from micrograph name patterns
    AssignOpticsGroup {
        /// Pattern file with `<name> <id> <pattern>` lines
        #[arg(long, value_name = "FILE")]
        pattern_file: PathBuf,

        /// Input particle file with a single optics group
        #[arg(long, value_name = "STAR")]
        input: PathBuf,

        /// Output particle file
        #[arg(long, value_name = "STAR")]
        output: PathBuf,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Add columns to the optics table
    ModifyOptics {
        /// Input particle file
        #[arg(long, value_name = "STAR")]
        input: PathBuf,

        /// Output particle file
        #[arg(long, value_name = "STAR")]
        output: PathBuf,

        /// _rlnMicrographOriginalPixelSize for every optics group
        #[arg(long, value_name = "ANGSTROM")]
        orig_apix: Option<f64>,

        /// Add _rlnOpticsGroupName as opticsGroup<id>
        #[arg(long)]
        add_group_name: bool,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Point _rlnMicrographName at motion-corrected micrographs
    RelinkMicrographs {
        /// Input particle file
        #[arg(long, value_name = "STAR")]
        input: PathBuf,

        /// Output particle file
        #[arg(long, value_name = "STAR")]
        output: PathBuf,

        /// RELION project directory
        #[arg(long, value_name = "DIR")]
        project_dir: PathBuf,

        /// Motion correction output directories, relative to the project directory
        #[arg(long, value_name = "DIR", num_args = 1.., required = true)]
        motioncorr_dirs: Vec<String>,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Subset a cryoSPARC job to the particles listed in a STAR file
    SelectParticles {
        /// cryoSPARC group descriptor (*_particles.csg)
        #[arg(long, value_name = "CSG")]
        csg: PathBuf,

        /// Particle file listing the particles to keep
        #[arg(long, value_name = "STAR")]
        star: PathBuf,

        /// Output directory
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Output root name; files are written as <ROOTNAME>_particles.*
        #[arg(long)]
        rootname: String,

        /// Keep UID prefixes when matching stack names
        #[arg(long)]
        keep_uid: bool,

        /// Allow overwriting existing output files
        #[arg(long)]
        overwrite: bool,
    },

    /// Export latent coordinates of a 3D variability job as CSV
    ExportLatent {
        /// cryoSPARC group descriptor (*_particles.csg)
        #[arg(long, value_name = "CSG")]
        csg: PathBuf,

        /// Output CSV file
        #[arg(long, value_name = "CSV")]
        output: PathBuf,

        /// Number of components (default: all)
        #[arg(short = 'n', long)]
        num_components: Option<usize>,

        /// Allow overwriting the output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Display information about a .star or .csg file
    Info {
        /// Input file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

/// Refuse to replace an existing output unless asked to
fn ensure_writable(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!(
            "Output already exists: {} (use --overwrite to replace it)",
            path.display()
        );
    }
    Ok(())
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::TransferPose {
            relion_star,
            csparc_star,
            out_star,
            no_random_subset,
            config,
            overwrite,
        } => transfer::run_pose(
            relion_star,
            csparc_star,
            out_star,
            !no_random_subset,
            config,
            overwrite,
        ),
        Commands::TransferGroup {
            source_star,
            in_star,
            out_star,
            config,
            overwrite,
        } => transfer::run_group(source_star, in_star, out_star, config, overwrite),
        Commands::ChangeOpticsGroup {
            input,
            output,
            src_optics_group,
            src_optics_group_name,
            new_optics_group,
            new_optics_group_name,
            overwrite,
        } => optics::run_change(
            input,
            output,
            particle_bridge::optics::GroupRename {
                src_group_id: src_optics_group,
                src_group_name: src_optics_group_name,
                new_group_id: new_optics_group,
                new_group_name: new_optics_group_name,
            },
            overwrite,
        ),
        Commands::AssignOpticsGroup {
            pattern_file,
            input,
            output,
            overwrite,
        } => optics::run_assign(pattern_file, input, output, overwrite),
        Commands::ModifyOptics {
            input,
            output,
            orig_apix,
            add_group_name,
            overwrite,
        } => optics::run_modify(
            input,
            output,
            particle_bridge::optics::OpticsAugment {
                original_pixel_size: orig_apix,
                add_group_names: add_group_name,
            },
            overwrite,
        ),
        Commands::RelinkMicrographs {
            input,
            output,
            project_dir,
            motioncorr_dirs,
            overwrite,
        } => optics::run_relink(input, output, project_dir, motioncorr_dirs, overwrite),
        Commands::SelectParticles {
            csg,
            star,
            out_dir,
            rootname,
            keep_uid,
            overwrite,
        } => select::run_select(csg, star, out_dir, rootname, keep_uid, overwrite),
        Commands::ExportLatent {
            csg,
            output,
            num_components,
            overwrite,
        } => select::run_export_latent(csg, output, num_components, overwrite),
        Commands::Info { file } => info::run(file),
    }
}
