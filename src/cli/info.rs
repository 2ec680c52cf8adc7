use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use particle_bridge::cs::CsDataset;
use particle_bridge::star::{Block, StarDataset, StarDialect};

fn print_block(block: &Block) {
    println!("{}:", block.name());
    println!("  Rows: {}", block.num_rows());
    println!("  Columns:");
    for (i, column) in block.columns().iter().enumerate() {
        println!("  {:3}. {}", i + 1, column);
    }
    println!();
}

/// Display information about a `.star` or `.csg` file
pub fn run(file: PathBuf) -> Result<()> {
    if !file.exists() {
        bail!("File does not exist: {}", file.display());
    }

    match file.extension().and_then(|e| e.to_str()) {
        Some("csg") => {
            let ds = CsDataset::from_csg(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;

            println!("cryoSPARC Dataset Information");
            println!("=============================");
            println!("File: {}", file.display());
            println!("Particles: {}", ds.num_rows());
            println!();

            println!("Results:");
            for (key, entry) in &ds.group().results {
                let count = entry
                    .num_items
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("  {}: {} ({} items)", key, entry.metafile_name(), count);
            }
            println!();

            println!("Fields:");
            for field in ds.particles().layout().fields() {
                println!("  {} ({})", field.name, field.descr);
            }
            if let Some(pt) = ds.passthrough() {
                println!("Passthrough fields:");
                for field in pt.layout().fields() {
                    println!("  {} ({})", field.name, field.descr);
                }
            }
            let components = ds.num_components();
            if components > 0 {
                println!();
                println!("Latent components: {}", components);
            }
        }
        _ => {
            let ds = StarDataset::from_file(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;

            println!("STAR File Information");
            println!("=====================");
            println!("File: {}", file.display());
            match ds.dialect() {
                StarDialect::Legacy => println!("Layout: legacy (single data_ block)"),
                StarDialect::Versioned { data_block } => {
                    println!("Layout: versioned (data_optics + {})", data_block)
                }
            }
            println!();

            if let Some(optics) = ds.optics() {
                print_block(optics);
            }
            print_block(ds.particles());

            let dangling = ds.dangling_group_refs();
            if !dangling.is_empty() {
                println!(
                    "Warning: {} rows reference missing optics groups (first at row {})",
                    dangling.len(),
                    dangling[0]
                );
            }
        }
    }

    Ok(())
}
