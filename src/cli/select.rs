use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use particle_bridge::cs::CsDataset;
use particle_bridge::identity::IdentityRule;
use particle_bridge::merge::select_matching;
use particle_bridge::star::StarDataset;

use super::ensure_writable;

/// Keep only the particles of a cryoSPARC job that a STAR file lists
pub fn run_select(
    csg: PathBuf,
    star: PathBuf,
    out_dir: PathBuf,
    rootname: String,
    keep_uid: bool,
    overwrite: bool,
) -> Result<()> {
    let out_csg = out_dir.join(format!("{}_particles.csg", rootname));
    ensure_writable(&out_csg, overwrite)?;

    let job = CsDataset::from_csg(&csg)
        .with_context(|| format!("Failed to load {}", csg.display()))?;
    let listing = StarDataset::from_file(&star)
        .with_context(|| format!("Failed to load {}", star.display()))?;

    let rule = IdentityRule::new(!keep_uid, true);
    let subset = select_matching(&job, &listing, rule, rule).with_context(|| {
        format!(
            "Failed to match particles of {} against {}",
            star.display(),
            csg.display()
        )
    })?;
    info!(
        "Kept {} of {} particles",
        subset.num_rows(),
        job.num_rows()
    );

    let written = subset
        .write(&out_dir, &rootname)
        .with_context(|| format!("Failed to write {}", out_dir.display()))?;
    println!(
        "Wrote {} particles to {}",
        subset.num_rows(),
        written.display()
    );
    Ok(())
}

/// Write the latent coordinates of a 3D variability job as CSV
pub fn run_export_latent(
    csg: PathBuf,
    output: PathBuf,
    num_components: Option<usize>,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(&output, overwrite)?;

    let job = CsDataset::from_csg(&csg)
        .with_context(|| format!("Failed to load {}", csg.display()))?;
    let latent = job
        .latent_variables(num_components)
        .with_context(|| format!("Failed to read latent coordinates from {}", csg.display()))?;

    latent
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} x {} latent coordinates to {}",
        latent.rows(),
        latent.cols(),
        output.display()
    );
    Ok(())
}
