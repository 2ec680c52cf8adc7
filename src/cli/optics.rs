use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use particle_bridge::optics::{
    assign_groups, augment_optics, parse_group_patterns, relink_micrographs, rename_group,
    GroupRename, MicrographIndex, OpticsAugment,
};
use particle_bridge::star::StarDataset;

use super::ensure_writable;

fn load(input: &Path) -> Result<StarDataset> {
    StarDataset::from_file(input).with_context(|| format!("Failed to load {}", input.display()))
}

fn save(ds: &StarDataset, output: &Path) -> Result<()> {
    ds.write(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} particles to {}",
        ds.particles().num_rows(),
        output.display()
    );
    Ok(())
}

/// Change the id and name of one optics group
pub fn run_change(
    input: PathBuf,
    output: PathBuf,
    rename: GroupRename,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(&output, overwrite)?;
    let ds = load(&input)?;
    let out = rename_group(&ds, &rename)
        .with_context(|| format!("Failed to rename optics group in {}", input.display()))?;
    save(&out, &output)
}

/// Assign optics groups from a pattern file
pub fn run_assign(
    pattern_file: PathBuf,
    input: PathBuf,
    output: PathBuf,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(&output, overwrite)?;
    let text = std::fs::read_to_string(&pattern_file)
        .with_context(|| format!("Failed to read pattern file: {}", pattern_file.display()))?;
    let patterns = parse_group_patterns(&text)
        .with_context(|| format!("Invalid pattern file: {}", pattern_file.display()))?;
    info!("Loaded {} optics group patterns", patterns.len());

    let ds = load(&input)?;
    let out = assign_groups(&ds, &patterns)
        .with_context(|| format!("Failed to assign optics groups in {}", input.display()))?;
    save(&out, &output)
}

/// Add columns to the optics table
pub fn run_modify(
    input: PathBuf,
    output: PathBuf,
    augment: OpticsAugment,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(&output, overwrite)?;
    if augment.original_pixel_size.is_none() && !augment.add_group_names {
        bail!("Nothing to do: pass --orig-apix and/or --add-group-name");
    }
    let ds = load(&input)?;
    let out = augment_optics(&ds, &augment)
        .with_context(|| format!("Failed to modify optics table of {}", input.display()))?;
    save(&out, &output)
}

/// Index the `*.mrc` files of each motion correction directory
///
/// Directories are scanned in the given order and files in name order, so an
/// earlier directory wins when a micrograph name appears twice.
fn index_micrographs(project_dir: &Path, dirs: &[String]) -> Result<MicrographIndex> {
    let mut index = MicrographIndex::new();
    for dir in dirs {
        let path = project_dir.join(dir);
        if !path.is_dir() {
            bail!("No such directory: {}", path.display());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&path)
            .with_context(|| format!("Failed to list {}", path.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(".mrc") && entry.path().is_file() {
                names.push(name.to_string());
            }
        }
        names.sort();
        debug!("{}: {} micrographs", path.display(), names.len());
        for name in names {
            index.insert(dir.as_str(), name);
        }
    }
    Ok(index)
}

/// Point micrograph references at motion-corrected files
pub fn run_relink(
    input: PathBuf,
    output: PathBuf,
    project_dir: PathBuf,
    motioncorr_dirs: Vec<String>,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(&output, overwrite)?;
    if !project_dir.is_dir() {
        bail!("No such directory: {}", project_dir.display());
    }
    let index = index_micrographs(&project_dir, &motioncorr_dirs)?;
    info!("Indexed {} motion-corrected micrographs", index.len());

    let ds = load(&input)?;
    let out = relink_micrographs(&ds, &index)
        .with_context(|| format!("Failed to relink micrographs in {}", input.display()))?;
    save(&out, &output)
}
