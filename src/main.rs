//! # particle-bridge
//!
//! A command-line tool for moving particle metadata between RELION and
//! cryoSPARC.
//!
//! ## Usage
//!
//! ```bash
//! # Copy cryoSPARC poses into a RELION particle file
//! particle-bridge transfer-pose --relion-star run_data.star \
//!     --csparc-star from_csparc.star --out-star posed.star
//!
//! # Keep only the cryoSPARC particles listed in a STAR file
//! particle-bridge select-particles --csg J42/J42_particles.csg \
//!     --star selected.star --out-dir J42_subset --rootname J42_subset
//!
//! # Inspect a file
//! particle-bridge info run_data.star
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
