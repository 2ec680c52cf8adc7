use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use particle_bridge::merge::{merge_fields, MergeConfig};
use particle_bridge::star::StarDataset;

use super::config::merge_config;
use super::ensure_writable;

/// Copy poses from a cryoSPARC-derived particle file into a RELION one
pub fn run_pose(
    relion_star: PathBuf,
    csparc_star: PathBuf,
    out_star: PathBuf,
    with_random_subset: bool,
    config: Option<PathBuf>,
    overwrite: bool,
) -> Result<()> {
    let config = merge_config(
        MergeConfig::pose_transfer(with_random_subset),
        config.as_deref(),
    )?;
    transfer(relion_star, csparc_star, out_star, &config, overwrite)
}

/// Copy per-group noise groups from one RELION particle file into another
pub fn run_group(
    source_star: PathBuf,
    in_star: PathBuf,
    out_star: PathBuf,
    config: Option<PathBuf>,
    overwrite: bool,
) -> Result<()> {
    let config = merge_config(MergeConfig::group_transfer(), config.as_deref())?;
    transfer(in_star, source_star, out_star, &config, overwrite)
}

fn transfer(
    dest: PathBuf,
    src: PathBuf,
    output: PathBuf,
    config: &MergeConfig,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(&output, overwrite)?;

    info!("Loading {} and {}", dest.display(), src.display());
    let dest_ds = StarDataset::from_file(&dest)
        .with_context(|| format!("Failed to load {}", dest.display()))?;
    let src_ds = StarDataset::from_file(&src)
        .with_context(|| format!("Failed to load {}", src.display()))?;

    let merged = merge_fields(&dest_ds, &src_ds, config).with_context(|| {
        format!(
            "Failed to transfer fields from {} to {}",
            src.display(),
            dest.display()
        )
    })?;

    merged
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} particles to {}",
        merged.particles().num_rows(),
        output.display()
    );
    Ok(())
}
