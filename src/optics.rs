//! # Optics Module
//!
//! Rewrites of optics-group membership and the optics table of a STAR
//! dataset: renaming a group, assigning groups by micrograph name pattern,
//! adding optics columns, and relinking micrographs to motion-corrected
//! files. Every function returns a new dataset; the input is left untouched.

use std::collections::HashMap;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::star::columns::{
    MICROGRAPH_NAME, MICROGRAPH_ORIGINAL_PIXEL_SIZE, OPTICS_BLOCK, OPTICS_GROUP, OPTICS_GROUP_NAME,
};
use crate::star::{Block, StarDataset};

/// Template for generated optics group names; `{}` is the group id
pub const GROUP_NAME_TEMPLATE: &str = "opticsGroup{}";

fn require_optics(ds: &StarDataset) -> Result<&Block> {
    ds.optics()
        .ok_or_else(|| Error::MissingBlock(OPTICS_BLOCK.to_string()))
}

/// Change the id and name of one optics group
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupRename {
    /// Current `_rlnOpticsGroup`
    pub src_group_id: String,
    /// Current `_rlnOpticsGroupName`
    pub src_group_name: String,
    /// Replacement id
    pub new_group_id: String,
    /// Replacement name
    pub new_group_name: String,
}

/// Rename an optics group in both the optics table and the particle rows
pub fn rename_group(ds: &StarDataset, rename: &GroupRename) -> Result<StarDataset> {
    let source = ds.optics().ok_or_else(|| Error::MissingColumn {
        block: OPTICS_BLOCK.to_string(),
        column: OPTICS_GROUP.to_string(),
    })?;
    let mut optics = source.clone();
    let id_col = optics.require_column(OPTICS_GROUP)?;
    let name_col = optics.require_column(OPTICS_GROUP_NAME)?;
    let mut particles = ds.particles().clone();
    let data_col = particles.require_column(OPTICS_GROUP)?;

    let mut matched = 0;
    for row in optics.rows_mut() {
        if row[id_col] == rename.src_group_id {
            row[id_col] = rename.new_group_id.clone();
            matched += 1;
        }
        if row[name_col] == rename.src_group_name {
            row[name_col] = rename.new_group_name.clone();
            matched += 1;
        }
    }
    let mut moved = 0;
    for row in particles.rows_mut() {
        if row[data_col] == rename.src_group_id {
            row[data_col] = rename.new_group_id.clone();
            moved += 1;
        }
    }

    if matched + moved == 0 {
        return Err(Error::GroupNotFound {
            id: rename.src_group_id.clone(),
            name: rename.src_group_name.clone(),
        });
    }
    info!(
        "Renamed optics group {} ({}) to {} ({}): {} particles",
        rename.src_group_id,
        rename.src_group_name,
        rename.new_group_id,
        rename.new_group_name,
        moved
    );
    Ok(ds.with_optics(optics).with_particles(particles))
}

/// One line of a pattern file: particles whose micrograph name contains
/// `pattern` join group `id` named `name`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupPattern {
    /// Optics group name
    pub name: String,
    /// Optics group id
    pub id: String,
    /// Substring of `_rlnMicrographName`
    pub pattern: String,
}

/// Parse `<name> <id> <pattern>` lines; blank lines and `#` comments are skipped
pub fn parse_group_patterns(text: &str) -> Result<Vec<GroupPattern>> {
    let mut patterns = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let [name, id, pattern] = words.as_slice() else {
            return Err(Error::InvalidFormat(format!(
                "pattern line {}: expected `<name> <id> <pattern>`, found {} fields",
                lineno + 1,
                words.len()
            )));
        };
        patterns.push(GroupPattern {
            name: name.to_string(),
            id: id.to_string(),
            pattern: pattern.to_string(),
        });
    }
    Ok(patterns)
}

/// Split a single optics group into one group per pattern
///
/// The optics row is replicated for each pattern with its id and name; each
/// particle joins the group of the first pattern found in its micrograph
/// name.
pub fn assign_groups(ds: &StarDataset, patterns: &[GroupPattern]) -> Result<StarDataset> {
    if patterns.is_empty() {
        return Err(Error::InvalidFormat("no optics group patterns".to_string()));
    }
    let source = require_optics(ds)?;
    if source.num_rows() != 1 {
        return Err(Error::RowCountMismatch {
            context: format!("{} before group assignment", OPTICS_BLOCK),
            expected: 1,
            found: source.num_rows(),
        });
    }

    let mut template = source.clone();
    if !template.has_column(OPTICS_GROUP_NAME) {
        template.add_column(OPTICS_GROUP_NAME, |_| String::new())?;
    }
    let id_col = template.require_column(OPTICS_GROUP)?;
    let name_col = template.require_column(OPTICS_GROUP_NAME)?;
    let base = template.rows()[0].clone();
    let optics_rows = patterns
        .iter()
        .map(|p| {
            let mut row = base.clone();
            row[id_col] = p.id.clone();
            row[name_col] = p.name.clone();
            row
        })
        .collect();
    let mut optics = template;
    optics.replace_rows(optics_rows)?;

    let mut particles = ds.particles().clone();
    let mic_col = particles.require_column(MICROGRAPH_NAME)?;
    let group_col = particles.require_column(OPTICS_GROUP)?;
    for (i, row) in particles.rows_mut().iter_mut().enumerate() {
        let micrograph = &row[mic_col];
        let pattern = patterns
            .iter()
            .find(|p| micrograph.contains(p.pattern.as_str()))
            .ok_or_else(|| Error::NoPatternMatch {
                micrograph: micrograph.clone(),
                row: i,
            })?;
        row[group_col] = pattern.id.clone();
    }

    info!(
        "Assigned {} particles to {} optics groups",
        particles.num_rows(),
        patterns.len()
    );
    Ok(ds.with_optics(optics).with_particles(particles))
}

/// Value of a new column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// Same value in every row
    Constant(String),
    /// `template` with `{}` replaced by the row's value of `from`
    Derived {
        /// Existing column
        from: String,
        /// Output template
        template: String,
    },
}

/// Append a column to `block`
pub fn append_column(block: &mut Block, name: &str, source: &ColumnSource) -> Result<()> {
    match source {
        ColumnSource::Constant(value) => block.add_column(name, |_| value.clone()),
        ColumnSource::Derived { from, template } => {
            let idx = block.require_column(from)?;
            block.add_column(name, |row| template.replace("{}", &row[idx]))
        }
    }
}

/// Optics columns added by [`augment_optics`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct OpticsAugment {
    /// `_rlnMicrographOriginalPixelSize` for every optics group
    pub original_pixel_size: Option<f64>,
    /// Add `_rlnOpticsGroupName` as `opticsGroup<id>`
    pub add_group_names: bool,
}

/// Add the configured columns to the optics table
pub fn augment_optics(ds: &StarDataset, augment: &OpticsAugment) -> Result<StarDataset> {
    let mut optics = require_optics(ds)?.clone();

    if let Some(apix) = augment.original_pixel_size {
        if apix.is_nan() || apix <= 0.0 {
            return Err(Error::InvalidFormat(format!(
                "original pixel size must be positive, got {}",
                apix
            )));
        }
        append_column(
            &mut optics,
            MICROGRAPH_ORIGINAL_PIXEL_SIZE,
            &ColumnSource::Constant(apix.to_string()),
        )?;
        debug!("Set {} to {}", MICROGRAPH_ORIGINAL_PIXEL_SIZE, apix);
    }

    if augment.add_group_names {
        append_column(
            &mut optics,
            OPTICS_GROUP_NAME,
            &ColumnSource::Derived {
                from: OPTICS_GROUP.to_string(),
                template: GROUP_NAME_TEMPLATE.to_string(),
            },
        )?;
        debug!("Named {} optics groups", optics.num_rows());
    }

    Ok(ds.with_optics(optics))
}

/// Known motion-corrected micrographs, by file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicrographIndex {
    dirs: HashMap<String, String>,
}

impl MicrographIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as living in `dir`; the first registration wins
    pub fn insert(&mut self, dir: impl Into<String>, name: impl Into<String>) {
        self.dirs.entry(name.into()).or_insert_with(|| dir.into());
    }

    /// Directory holding `name`
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.dirs.get(name).map(String::as_str)
    }

    /// Number of known micrographs
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Whether no micrographs are known
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// File name of a micrograph reference with its upstream UID token removed
///
/// Everything up to and including the first `_` is dropped; a name without
/// `_` yields an empty string.
fn relink_query(micrograph: &str) -> &str {
    let basename = micrograph.rsplit('/').next().unwrap_or_default();
    basename.split_once('_').map_or("", |(_, rest)| rest)
}

/// Point every `_rlnMicrographName` at the matching motion-corrected file
pub fn relink_micrographs(ds: &StarDataset, index: &MicrographIndex) -> Result<StarDataset> {
    let mut particles = ds.particles().clone();
    let mic_col = particles.require_column(MICROGRAPH_NAME)?;

    for (i, row) in particles.rows_mut().iter_mut().enumerate() {
        let query = relink_query(&row[mic_col]);
        let dir = index.lookup(query).ok_or_else(|| Error::UnresolvedMicrograph {
            name: query.to_string(),
            row: i,
        })?;
        let relinked = if dir.is_empty() {
            query.to_string()
        } else {
            format!("{}/{}", dir.trim_end_matches('/'), query)
        };
        row[mic_col] = relinked;
    }

    info!(
        "Relinked {} particles against {} micrographs",
        particles.num_rows(),
        index.len()
    );
    Ok(ds.with_particles(particles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const STAR: &str = "\
data_optics

loop_
_rlnOpticsGroup
_rlnOpticsGroupName
_rlnImagePixelSize
1 opticsGroup1 1.06

data_particles

loop_
_rlnImageName
_rlnMicrographName
_rlnOpticsGroup
1@Extract/a.mrcs J5/motioncorrected/0101_xfooy_001.mrc 1
2@Extract/a.mrcs J5/motioncorrected/0102_grid2_002.mrc 1
3@Extract/a.mrcs J5/motioncorrected/0103_grid2_oo_003.mrc 1
";

    fn dataset() -> StarDataset {
        StarDataset::parse(STAR, Path::new("test.star")).unwrap()
    }

    fn pattern(name: &str, id: &str, pattern: &str) -> GroupPattern {
        GroupPattern {
            name: name.to_string(),
            id: id.to_string(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn test_rename_group() {
        let ds = dataset();
        let rename = GroupRename {
            src_group_id: "1".to_string(),
            src_group_name: "opticsGroup1".to_string(),
            new_group_id: "4".to_string(),
            new_group_name: "grid4".to_string(),
        };
        let out = rename_group(&ds, &rename).unwrap();

        let optics = out.optics().unwrap();
        assert_eq!(optics.get(0, OPTICS_GROUP), Some("4"));
        assert_eq!(optics.get(0, OPTICS_GROUP_NAME), Some("grid4"));
        assert_eq!(
            out.particles().column_values(OPTICS_GROUP).unwrap(),
            vec!["4", "4", "4"]
        );
        assert!(out.dangling_group_refs().is_empty());
        // input untouched
        assert_eq!(ds.particles().get(0, OPTICS_GROUP), Some("1"));
    }

    #[test]
    fn test_rename_unknown_group() {
        let rename = GroupRename {
            src_group_id: "9".to_string(),
            src_group_name: "opticsGroup9".to_string(),
            new_group_id: "1".to_string(),
            new_group_name: "x".to_string(),
        };
        assert!(matches!(
            rename_group(&dataset(), &rename),
            Err(Error::GroupNotFound { .. })
        ));

        let legacy = StarDataset::parse("data_\n\nloop_\n_rlnOpticsGroup\n1\n", Path::new("x.star")).unwrap();
        assert!(matches!(
            rename_group(&legacy, &rename),
            Err(Error::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_parse_group_patterns() {
        let text = "# name id pattern\ngridA 1 _grid1_\n\n  gridB  2  _grid2_ \n";
        let patterns = parse_group_patterns(text).unwrap();
        assert_eq!(
            patterns,
            vec![pattern("gridA", "1", "_grid1_"), pattern("gridB", "2", "_grid2_")]
        );

        let err = parse_group_patterns("gridA 1\n").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(msg) if msg.contains("line 1")));
    }

    #[test]
    fn test_assign_groups_first_match_wins() {
        let patterns = vec![
            pattern("G1", "1", "foo"),
            pattern("G2", "2", "oo"),
            pattern("G3", "3", "grid2"),
        ];
        let out = assign_groups(&dataset(), &patterns).unwrap();

        let optics = out.optics().unwrap();
        assert_eq!(optics.num_rows(), 3);
        assert_eq!(optics.column_values(OPTICS_GROUP).unwrap(), vec!["1", "2", "3"]);
        assert_eq!(
            optics.column_values(OPTICS_GROUP_NAME).unwrap(),
            vec!["G1", "G2", "G3"]
        );
        assert_eq!(
            optics.column_values("_rlnImagePixelSize").unwrap(),
            vec!["1.06", "1.06", "1.06"]
        );
        assert_eq!(
            out.particles().column_values(OPTICS_GROUP).unwrap(),
            vec!["1", "3", "2"]
        );
        assert!(out.dangling_group_refs().is_empty());
    }

    #[test]
    fn test_assign_groups_adds_name_column() {
        let text = STAR.replace("_rlnOpticsGroupName\n", "").replace("1 opticsGroup1 1.06", "1 1.06");
        let ds = StarDataset::parse(&text, Path::new("x.star")).unwrap();
        let out = assign_groups(&ds, &[pattern("all", "7", "J5")]).unwrap();
        let optics = out.optics().unwrap();
        assert_eq!(optics.columns().last().map(String::as_str), Some(OPTICS_GROUP_NAME));
        assert_eq!(optics.get(0, OPTICS_GROUP_NAME), Some("all"));
    }

    #[test]
    fn test_assign_groups_errors() {
        let err = assign_groups(&dataset(), &[pattern("G1", "1", "nomatch")]).unwrap_err();
        assert!(matches!(err, Error::NoPatternMatch { row: 0, .. }));

        let two_groups = STAR.replace("1 opticsGroup1 1.06", "1 opticsGroup1 1.06\n2 opticsGroup2 1.06");
        let ds = StarDataset::parse(&two_groups, Path::new("x.star")).unwrap();
        assert!(matches!(
            assign_groups(&ds, &[pattern("G1", "1", "J5")]),
            Err(Error::RowCountMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_append_column() {
        let mut block = dataset().optics().unwrap().clone();
        append_column(&mut block, "_rlnVoltage", &ColumnSource::Constant("300".to_string())).unwrap();
        append_column(
            &mut block,
            "_rlnTag",
            &ColumnSource::Derived {
                from: OPTICS_GROUP.to_string(),
                template: "g{}".to_string(),
            },
        )
        .unwrap();
        assert_eq!(block.get(0, "_rlnVoltage"), Some("300"));
        assert_eq!(block.get(0, "_rlnTag"), Some("g1"));

        assert!(matches!(
            append_column(&mut block, "_rlnVoltage", &ColumnSource::Constant("200".to_string())),
            Err(Error::ColumnAlreadyExists { .. })
        ));
        assert!(matches!(
            append_column(
                &mut block,
                "_rlnOther",
                &ColumnSource::Derived {
                    from: "_rlnMissing".to_string(),
                    template: "{}".to_string()
                }
            ),
            Err(Error::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_augment_optics() {
        let text = STAR.replace("_rlnOpticsGroupName\n", "").replace("1 opticsGroup1 1.06", "1 1.06");
        let ds = StarDataset::parse(&text, Path::new("x.star")).unwrap();
        let out = augment_optics(
            &ds,
            &OpticsAugment {
                original_pixel_size: Some(0.53),
                add_group_names: true,
            },
        )
        .unwrap();

        let optics = out.optics().unwrap();
        assert_eq!(
            optics.columns(),
            [
                "_rlnOpticsGroup",
                "_rlnImagePixelSize",
                "_rlnMicrographOriginalPixelSize",
                "_rlnOpticsGroupName"
            ]
        );
        assert_eq!(optics.rows()[0], ["1", "1.06", "0.53", "opticsGroup1"]);

        // the name column already exists in the unmodified fixture
        let err = augment_optics(
            &dataset(),
            &OpticsAugment {
                original_pixel_size: None,
                add_group_names: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::ColumnAlreadyExists { .. }));
    }

    #[test]
    fn test_relink_micrographs() {
        let mut index = MicrographIndex::new();
        index.insert("MotionCorr/job002/Movies", "xfooy_001.mrc");
        index.insert("MotionCorr/job003/Movies/", "grid2_002.mrc");
        index.insert("MotionCorr/job003/Movies", "grid2_oo_003.mrc");
        index.insert("MotionCorr/job009/Movies", "grid2_oo_003.mrc");

        let out = relink_micrographs(&dataset(), &index).unwrap();
        assert_eq!(
            out.particles().column_values(MICROGRAPH_NAME).unwrap(),
            vec![
                "MotionCorr/job002/Movies/xfooy_001.mrc",
                "MotionCorr/job003/Movies/grid2_002.mrc",
                "MotionCorr/job003/Movies/grid2_oo_003.mrc"
            ]
        );

        let mut partial = MicrographIndex::new();
        partial.insert("MotionCorr", "xfooy_001.mrc");
        match relink_micrographs(&dataset(), &partial).unwrap_err() {
            Error::UnresolvedMicrograph { name, row } => {
                assert_eq!(name, "grid2_002.mrc");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_relink_query() {
        assert_eq!(relink_query("a/b/0101_mic_1.mrc"), "mic_1.mrc");
        assert_eq!(relink_query("mic.mrc"), "");
    }
}
