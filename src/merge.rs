//! # Merge Module
//!
//! Correlates particle records across two datasets by identity key and copies
//! selected fields from a source dataset into a STAR destination.
//!
//! ```text
//! dest rows ──identity──▶ HashMap<key, row>
//!                              │
//! src rows ──identity──▶ lookup ──▶ copy of dest row + src fields ──▶ output row
//! ```
//!
//! The output has exactly one row per source row, in source order. Every
//! source row must resolve to a destination row; there is no partial output.

use std::collections::HashMap;

use log::{debug, info};
use serde::Deserialize;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::identity::{IdentityKey, IdentityRule};
use crate::star::{columns, Block, StarDataset};

/// Fields to transfer and how identities are derived on each side
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Columns to copy from the source, in output order for new columns
    pub fields: Vec<String>,
    /// Columns removed from `fields`
    pub skip_fields: Vec<String>,
    /// Identity normalization for destination rows
    pub dest_rule: IdentityRule,
    /// Identity normalization for source rows
    pub src_rule: IdentityRule,
}

impl MergeConfig {
    /// Pose angles and origin offsets, optionally with the half-set assignment
    ///
    /// Source identities have their UID prefix removed; destination
    /// identities are used as written.
    pub fn pose_transfer(with_random_subset: bool) -> Self {
        let mut fields: Vec<String> = columns::POSE_COLUMNS.iter().map(|c| c.to_string()).collect();
        if with_random_subset {
            fields.push(columns::RANDOM_SUBSET.to_string());
        }
        Self {
            fields,
            skip_fields: Vec::new(),
            dest_rule: IdentityRule::EXACT,
            src_rule: IdentityRule::STRIP_UID,
        }
    }

    /// Group name and number for per-group noise estimation
    pub fn group_transfer() -> Self {
        Self {
            fields: vec![
                columns::GROUP_NAME.to_string(),
                columns::GROUP_NUMBER.to_string(),
            ],
            skip_fields: Vec::new(),
            dest_rule: IdentityRule::EXACT,
            src_rule: IdentityRule::EXACT,
        }
    }

    /// `fields` without `skip_fields`, duplicates removed
    pub fn requested_fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !self.skip_fields.contains(field) && !out.contains(&field.as_str()) {
                out.push(field);
            }
        }
        out
    }
}

/// For each source key, the index of the destination row with the same key
///
/// Fails on the first duplicate destination key or the first source key that
/// has no destination row.
pub fn resolve_rows(dest_keys: &[IdentityKey], src_keys: &[IdentityKey]) -> Result<Vec<usize>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(dest_keys.len());
    for (row, key) in dest_keys.iter().enumerate() {
        if let Some(first) = index.insert(key.as_str(), row) {
            return Err(Error::DuplicateIdentity {
                identity: key.to_string(),
                first,
                second: row,
            });
        }
    }

    src_keys
        .iter()
        .enumerate()
        .map(|(row, key)| {
            index
                .get(key.as_str())
                .copied()
                .ok_or_else(|| Error::UnresolvedIdentity {
                    identity: key.to_string(),
                    row,
                })
        })
        .collect()
}

/// Copy the configured fields of every `src` row into its matching `dest` row
///
/// Requested fields the source does not have are skipped. Fields missing
/// from the destination are appended as new columns. Destination rows that
/// no source row refers to are dropped. The optics block is shared with
/// `dest`.
pub fn merge_fields<S: Dataset>(
    dest: &StarDataset,
    src: &S,
    config: &MergeConfig,
) -> Result<StarDataset> {
    let mut fields: Vec<&str> = Vec::new();
    for field in config.requested_fields() {
        if src.has_column(field) {
            fields.push(field);
        } else {
            debug!("Source has no {} column, skipping", field);
        }
    }

    let src_values = fields
        .iter()
        .map(|field| {
            src.column(field)?.ok_or_else(|| Error::MissingColumn {
                block: "source".to_string(),
                column: field.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    for (field, values) in fields.iter().zip(&src_values) {
        if values.len() != src.num_rows() {
            return Err(Error::RowCountMismatch {
                context: format!("source column {}", field),
                expected: src.num_rows(),
                found: values.len(),
            });
        }
    }

    let dest_keys = Dataset::identity_keys(dest, config.dest_rule)?;
    let src_keys = src.identity_keys(config.src_rule)?;
    let matches = resolve_rows(&dest_keys, &src_keys)?;

    let particles = dest.particles();
    let mut out_columns = particles.columns().to_vec();
    let mut targets = Vec::with_capacity(fields.len());
    for field in &fields {
        let idx = match particles.column_index(field) {
            Some(idx) => idx,
            None => {
                debug!("Adding column {} to {}", field, particles.name());
                out_columns.push(field.to_string());
                out_columns.len() - 1
            }
        };
        targets.push(idx);
    }

    let width = out_columns.len();
    let mut rows = Vec::with_capacity(matches.len());
    for (src_row, &dest_row) in matches.iter().enumerate() {
        let mut row = particles.rows()[dest_row].clone();
        row.resize(width, String::new());
        for (values, &target) in src_values.iter().zip(&targets) {
            row[target] = values[src_row].clone();
        }
        rows.push(row);
    }

    info!(
        "Transferred {} fields for {} of {} destination rows",
        fields.len(),
        rows.len(),
        particles.num_rows()
    );
    let block = Block::from_rows(particles.name(), out_columns, rows)?;
    Ok(dest.with_particles(block))
}

/// Rows of `dataset` named by `listing`, in listing order
///
/// Every listing row must resolve to a row of `dataset`.
pub fn select_matching<D: Dataset, L: Dataset>(
    dataset: &D,
    listing: &L,
    dataset_rule: IdentityRule,
    listing_rule: IdentityRule,
) -> Result<D> {
    let dataset_keys = dataset.identity_keys(dataset_rule)?;
    let listing_keys = listing.identity_keys(listing_rule)?;
    let indices = resolve_rows(&dataset_keys, &listing_keys)?;
    info!(
        "Selected {} of {} rows",
        indices.len(),
        dataset.num_rows()
    );
    dataset.select_rows(&indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cs::{CsDataset, GroupDescriptor, RecordLayout, StructuredArray};
    use std::path::Path;

    fn star(text: &str) -> StarDataset {
        StarDataset::parse(text, Path::new("test.star")).unwrap()
    }

    fn keys(raw: &[&str]) -> Vec<IdentityKey> {
        raw.iter()
            .map(|r| crate::identity::derive_identity(r, IdentityRule::EXACT).unwrap())
            .collect()
    }

    const DEST: &str = "\
data_optics

loop_
_rlnOpticsGroup
_rlnOpticsGroupName
1 opticsGroup1

data_particles

loop_
_rlnImageName
_rlnMicrographName
_rlnOpticsGroup
_rlnAngleRot
000001@Extract/job007/mic_a.mrcs MotionCorr/mic_a.mrc 1 0.0
000002@Extract/job007/mic_a.mrcs MotionCorr/mic_a.mrc 1 0.0
000001@Extract/job007/mic_b.mrcs MotionCorr/mic_b.mrc 1 0.0
";

    const SRC: &str = "\
data_

loop_
_rlnImageName
_rlnAngleRot
_rlnAngleTilt
_rlnOriginXAngst
_rlnRandomSubset
1@J12/imported/0042_mic_b.mrcs 11.0 21.0 1.5 2
2@J12/imported/0042_mic_a.mrcs 12.0 22.0 -1.5 1
";

    #[test]
    fn test_scenario_single_row() {
        let dest = star("data_\n\nloop_\n_rlnImageName\n_rlnAngleRot\n5@001_mic.mrcs 10.0\n");
        let src = star("data_\n\nloop_\n_rlnImageName\n_rlnAngleRot\n5@J1/777_mic.mrc 20.0\n");
        let config = MergeConfig {
            fields: vec![columns::ANGLE_ROT.to_string()],
            dest_rule: IdentityRule::BASENAME,
            src_rule: IdentityRule::BASENAME,
            ..Default::default()
        };

        let out = merge_fields(&dest, &src, &config).unwrap();
        assert_eq!(
            out.particles().rows(),
            [vec!["5@001_mic.mrcs".to_string(), "20.0".to_string()]]
        );
    }

    #[test]
    fn test_pose_transfer_one_row_per_source_row() {
        let dest = star(DEST);
        let src = star(SRC);
        let out = merge_fields(&dest, &src, &MergeConfig::pose_transfer(true)).unwrap();

        let particles = out.particles();
        assert_eq!(particles.num_rows(), 2);
        assert_eq!(
            particles.columns(),
            [
                "_rlnImageName",
                "_rlnMicrographName",
                "_rlnOpticsGroup",
                "_rlnAngleRot",
                "_rlnAngleTilt",
                "_rlnOriginXAngst",
                "_rlnRandomSubset"
            ]
        );
        assert_eq!(
            particles.rows()[0],
            [
                "000001@Extract/job007/mic_b.mrcs",
                "MotionCorr/mic_b.mrc",
                "1",
                "11.0",
                "21.0",
                "1.5",
                "2"
            ]
        );
        assert_eq!(particles.get(1, columns::IMAGE_NAME), Some("000002@Extract/job007/mic_a.mrcs"));
        assert_eq!(particles.get(1, columns::ORIGIN_X_ANGST), Some("-1.5"));
        assert!(out.shares_optics_with(&dest));
        assert_eq!(out.dialect(), dest.dialect());
    }

    #[test]
    fn test_without_random_subset() {
        let out = merge_fields(&star(DEST), &star(SRC), &MergeConfig::pose_transfer(false)).unwrap();
        assert!(!out.particles().has_column(columns::RANDOM_SUBSET));
        assert!(!out.particles().has_column(columns::ANGLE_PSI));
    }

    #[test]
    fn test_skip_fields() {
        let mut config = MergeConfig::pose_transfer(true);
        config.skip_fields = vec![columns::ANGLE_TILT.to_string()];
        let out = merge_fields(&star(DEST), &star(SRC), &config).unwrap();
        assert!(!out.particles().has_column(columns::ANGLE_TILT));
        assert_eq!(out.particles().get(0, columns::ANGLE_ROT), Some("11.0"));
    }

    #[test]
    fn test_unresolved_source_row() {
        let src = SRC.replace("0042_mic_a", "0042_mic_c");
        let err = merge_fields(&star(DEST), &star(&src), &MergeConfig::pose_transfer(true)).unwrap_err();
        match err {
            Error::UnresolvedIdentity { identity, row } => {
                assert_eq!(identity, "2@mic_c.mrcs");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_destination_identity() {
        let dest = DEST.replace("000002@Extract/job007/mic_a", "000001@Extract/job007/mic_a");
        let err = merge_fields(&star(&dest), &star(SRC), &MergeConfig::pose_transfer(true)).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateIdentity {
                first: 0,
                second: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_rows() {
        let dest = keys(&["1@a", "2@a", "1@b"]);
        assert_eq!(
            resolve_rows(&dest, &keys(&["1@b", "1@a", "1@b"])).unwrap(),
            vec![2, 0, 2]
        );
        assert!(resolve_rows(&dest, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_requested_fields() {
        let config = MergeConfig {
            fields: vec!["a".into(), "b".into(), "a".into(), "c".into()],
            skip_fields: vec!["c".into()],
            ..Default::default()
        };
        assert_eq!(config.requested_fields(), vec!["a", "b"]);
    }

    #[test]
    fn test_config_from_toml() {
        let config: MergeConfig = toml::from_str(
            r#"
            fields = ["_rlnAngleRot", "_rlnRandomSubset"]
            skip_fields = ["_rlnRandomSubset"]
            src_rule = { strip_uid = true }
            "#,
        )
        .unwrap();
        assert_eq!(config.requested_fields(), vec!["_rlnAngleRot"]);
        assert_eq!(config.src_rule, IdentityRule::STRIP_UID);
        assert_eq!(config.dest_rule, IdentityRule::EXACT);
    }

    #[test]
    fn test_select_matching_binary_rows() {
        let layout = RecordLayout::new(&[
            ("uid", "<u8", vec![]),
            ("blob/path", "|S32", vec![]),
            ("blob/idx", "<u4", vec![]),
        ])
        .unwrap();
        let stacks = ["J3/000099_mic_a.mrcs", "J3/000099_mic_a.mrcs", "J3/000099_mic_b.mrcs"];
        let mut array = StructuredArray::zeroed(layout, stacks.len());
        for (i, stack) in stacks.iter().enumerate() {
            array.set_f64(i, "uid", i as f64).unwrap();
            array.set_bytes(i, "blob/path", stack.as_bytes()).unwrap();
            array.set_f64(i, "blob/idx", (i % 2) as f64).unwrap();
        }
        let group = GroupDescriptor::from_yaml("results:\n  blob:\n    metafile: '>J3_particles.cs'\n").unwrap();
        let cs = CsDataset::new(group, array, None).unwrap();

        let listing = star(DEST);
        let selected = select_matching(&cs, &listing, IdentityRule::BASENAME, IdentityRule::BASENAME).unwrap();
        assert_eq!(
            selected.field_text("uid").unwrap().unwrap(),
            vec!["0", "1", "2"]
        );

        let listing = star("data_\n\nloop_\n_rlnImageName\n000001@x/mic_b.mrcs\n000002@x/mic_b.mrcs\n");
        assert!(matches!(
            select_matching(&cs, &listing, IdentityRule::BASENAME, IdentityRule::BASENAME),
            Err(Error::UnresolvedIdentity { row: 1, .. })
        ));
    }

    #[test]
    fn test_merged_empty_binary_text_roundtrips() {
        let layout = RecordLayout::new(&[
            ("blob/path", "|S32", vec![]),
            ("blob/idx", "<u4", vec![]),
            ("_rlnNote", "|S8", vec![]),
        ])
        .unwrap();
        let stacks = ["J3/000099_mic_b.mrcs", "J3/000099_mic_a.mrcs"];
        let mut array = StructuredArray::zeroed(layout, stacks.len());
        for (i, stack) in stacks.iter().enumerate() {
            array.set_bytes(i, "blob/path", stack.as_bytes()).unwrap();
        }
        array.set_bytes(1, "_rlnNote", b"kept").unwrap();
        let group = GroupDescriptor::from_yaml("results:\n  blob:\n    metafile: '>J3_particles.cs'\n").unwrap();
        let cs = CsDataset::new(group, array, None).unwrap();

        let config = MergeConfig {
            fields: vec!["_rlnNote".to_string()],
            skip_fields: Vec::new(),
            dest_rule: IdentityRule::BASENAME,
            src_rule: IdentityRule::BASENAME,
        };
        let merged = merge_fields(&star(DEST), &cs, &config).unwrap();
        assert_eq!(
            merged.particles().column_values("_rlnNote").unwrap(),
            vec!["", "kept"]
        );

        let text = merged.to_star_string().unwrap();
        let reread = StarDataset::parse(&text, Path::new("merged.star")).unwrap();
        assert_eq!(reread, merged);
    }
}
