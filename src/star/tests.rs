use super::*;
use crate::error::Error;
use std::path::Path;
use tempfile::tempdir;

const VERSIONED_STAR: &str = r#"
# version 30001

data_optics

loop_
_rlnOpticsGroupName #1
_rlnOpticsGroup #2
_rlnImagePixelSize #3
opticsGroup1 1 1.06

# version 30001

data_particles

loop_
_rlnImageName #1
_rlnMicrographName #2
_rlnOpticsGroup #3
_rlnAngleRot #4
000001@Extract/job007/001_mic_a.mrcs MotionCorr/001_mic_a.mrc 1 10.5
000002@Extract/job007/001_mic_a.mrcs MotionCorr/001_mic_a.mrc 1 -32.0
000001@Extract/job007/002_mic_b.mrcs   MotionCorr/002_mic_b.mrc   1   77.25

"#;

const LEGACY_STAR: &str = "data_\n\nloop_\n_rlnImageName\n_rlnDefocusU\n1@a.mrcs 12000.0\n2@a.mrcs 12100.0\n";

fn origin() -> &'static Path {
    Path::new("test.star")
}

#[test]
fn test_parse_versioned() {
    let ds = StarDataset::parse(VERSIONED_STAR, origin()).unwrap();

    assert_eq!(
        ds.dialect(),
        &StarDialect::Versioned {
            data_block: "data_particles".to_string()
        }
    );

    let optics = ds.optics().unwrap();
    assert_eq!(
        optics.columns(),
        ["_rlnOpticsGroupName", "_rlnOpticsGroup", "_rlnImagePixelSize"]
    );
    assert_eq!(optics.num_rows(), 1);

    let particles = ds.particles();
    assert_eq!(particles.columns().len(), 4);
    assert_eq!(particles.num_rows(), 3);
    assert_eq!(particles.get(2, columns::ANGLE_ROT), Some("77.25"));
    assert_eq!(
        particles.get(0, columns::IMAGE_NAME),
        Some("000001@Extract/job007/001_mic_a.mrcs")
    );
    assert!(ds.dangling_group_refs().is_empty());
}

#[test]
fn test_parse_legacy() {
    let ds = StarDataset::parse(LEGACY_STAR, origin()).unwrap();
    assert_eq!(ds.dialect(), &StarDialect::Legacy);
    assert!(ds.optics().is_none());
    assert_eq!(ds.particles().num_rows(), 2);
    assert_eq!(
        ds.particles().column_values("_rlnDefocusU").unwrap(),
        vec!["12000.0", "12100.0"]
    );
}

#[test]
fn test_first_marker_wins() {
    // A legacy marker before any optics block selects the legacy dialect
    let text = format!("{}\ndata_optics\n\nloop_\n_rlnOpticsGroup\n1\n", LEGACY_STAR);
    let ds = StarDataset::parse(&text, origin()).unwrap();
    assert_eq!(ds.dialect(), &StarDialect::Legacy);
}

#[test]
fn test_unrecognized_dialect() {
    let err = StarDataset::parse("data_images\nloop_\n_rlnImageName\n", origin()).unwrap_err();
    assert!(matches!(err, Error::UnrecognizedDialect { .. }));

    let err = StarDataset::parse("", origin()).unwrap_err();
    assert!(matches!(err, Error::UnrecognizedDialect { .. }));
}

#[test]
fn test_missing_data_block_after_optics() {
    let text = "data_optics\n\nloop_\n_rlnOpticsGroup\n1\n\n";
    let err = StarDataset::parse(text, origin()).unwrap_err();
    assert!(matches!(err, Error::MissingBlock(_)));
}

#[test]
fn test_missing_loop_marker() {
    let text = "data_\n\n_rlnImageName\n1@a.mrcs\n";
    let err = StarDataset::parse(text, origin()).unwrap_err();
    assert!(matches!(err, Error::MissingBlock(_)));
}

#[test]
fn test_column_count_mismatch_names_row() {
    let text = "data_\n\nloop_\n_rlnImageName\n_rlnDefocusU\n1@a.mrcs 1.0\n2@a.mrcs\n";
    match StarDataset::parse(text, origin()).unwrap_err() {
        Error::ColumnCountMismatch {
            block,
            row,
            expected,
            found,
        } => {
            assert_eq!(block, "data_");
            assert_eq!(row, 1);
            assert_eq!(expected, 2);
            assert_eq!(found, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_rows_stop_at_blank_line() {
    let text = "data_\n\nloop_\n_rlnImageName\n1@a.mrcs\n\n2@a.mrcs\n";
    let ds = StarDataset::parse(text, origin()).unwrap();
    assert_eq!(ds.particles().num_rows(), 1);
}

#[test]
fn test_empty_block_has_no_rows() {
    let text = "data_\n\nloop_\n_rlnImageName\n_rlnDefocusU\n";
    let ds = StarDataset::parse(text, origin()).unwrap();
    assert_eq!(ds.particles().columns().len(), 2);
    assert_eq!(ds.particles().num_rows(), 0);
}

#[test]
fn test_write_layout() {
    let ds = StarDataset::parse(LEGACY_STAR, origin()).unwrap();
    let text = ds.to_star_string().unwrap();
    assert_eq!(
        text,
        "data_\n\nloop_\n_rlnImageName\n_rlnDefocusU\n1@a.mrcs 12000.0\n2@a.mrcs 12100.0\n\n"
    );
}

#[test]
fn test_roundtrip_versioned() {
    let ds = StarDataset::parse(VERSIONED_STAR, origin()).unwrap();
    let text = ds.to_star_string().unwrap();
    let reparsed = StarDataset::parse(&text, origin()).unwrap();
    assert_eq!(ds, reparsed);
}

#[test]
fn test_file_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("particles.star");

    let ds = StarDataset::parse(VERSIONED_STAR, origin()).unwrap();
    ds.write(&path).unwrap();

    let loaded = StarDataset::from_file(&path).unwrap();
    assert_eq!(loaded.path(), Some(path.as_path()));
    assert_eq!(ds, loaded);
}

#[test]
fn test_select_rows_shares_optics() {
    let ds = StarDataset::parse(VERSIONED_STAR, origin()).unwrap();
    let subset = ds.select_rows(&[2, 0]).unwrap();

    assert_eq!(subset.particles().num_rows(), 2);
    assert_eq!(subset.particles().get(0, columns::ANGLE_ROT), Some("77.25"));
    assert_eq!(subset.particles().get(1, columns::ANGLE_ROT), Some("10.5"));
    assert!(subset.shares_optics_with(&ds));

    assert!(matches!(
        ds.select_rows(&[3]),
        Err(Error::IndexOutOfRange { index: 3, len: 3 })
    ));
}

#[test]
fn test_dangling_group_refs() {
    let text = VERSIONED_STAR.replace("MotionCorr/002_mic_b.mrc   1", "MotionCorr/002_mic_b.mrc   7");
    let ds = StarDataset::parse(&text, origin()).unwrap();
    assert_eq!(ds.dangling_group_refs(), vec![2]);
}

#[test]
fn test_add_column_rejects_duplicates() {
    let ds = StarDataset::parse(LEGACY_STAR, origin()).unwrap();
    let mut block = ds.particles().clone();
    block.add_column("_rlnDefocusV", |row| row[1].clone()).unwrap();
    assert_eq!(block.get(1, "_rlnDefocusV"), Some("12100.0"));

    let err = block.add_column("_rlnDefocusV", |_| String::new()).unwrap_err();
    assert!(matches!(err, Error::ColumnAlreadyExists { .. }));
}

fn legacy_with_values(values: &[&str]) -> StarDataset {
    let rows = values
        .iter()
        .enumerate()
        .map(|(i, v)| vec![format!("{}@a.mrcs", i + 1), v.to_string()])
        .collect();
    let block = Block::from_rows(
        columns::LEGACY_BLOCK,
        vec![columns::IMAGE_NAME.to_string(), "_rlnNote".to_string()],
        rows,
    )
    .unwrap();
    StarDataset::new(StarDialect::Legacy, None, block).unwrap()
}

#[test]
fn test_empty_and_spaced_values_roundtrip() {
    let values = [
        "",
        "two words",
        "\"leading quote",
        "it's",
        "say \"hi\" now",
        "_looks_like_a_label",
        "data_block",
        "tab\tseparated",
    ];
    let ds = legacy_with_values(&values);

    let text = ds.to_star_string().unwrap();
    assert!(text.contains("1@a.mrcs \"\"\n"));
    assert!(text.contains("2@a.mrcs \"two words\"\n"));
    assert!(text.contains("4@a.mrcs it's\n"));

    let reparsed = StarDataset::parse(&text, origin()).unwrap();
    assert_eq!(reparsed, ds);
    assert_eq!(reparsed.particles().get(0, "_rlnNote"), Some(""));
}

#[test]
fn test_quote_choice_avoids_early_close() {
    // `"` followed by a space would end a double-quoted value
    let ds = legacy_with_values(&["a\" b"]);
    let text = ds.to_star_string().unwrap();
    assert!(text.contains("1@a.mrcs 'a\" b'\n"));
    assert_eq!(StarDataset::parse(&text, origin()).unwrap(), ds);
}

#[test]
fn test_unwritable_values_are_rejected() {
    let err = legacy_with_values(&["line\nbreak"]).to_star_string().unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));

    let err = legacy_with_values(&["x\" y' z"]).to_star_string().unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}

#[test]
fn test_quoted_fields_in_input() {
    let text = "data_\n\nloop_\n_rlnImageName\n_rlnNote\n1@a.mrcs \"a b\"\n2@a.mrcs ''\n";
    let ds = StarDataset::parse(text, origin()).unwrap();
    assert_eq!(
        ds.particles().column_values("_rlnNote").unwrap(),
        vec!["a b", ""]
    );

    let err = StarDataset::parse("data_\n\nloop_\n_rlnNote\n\"open\n", origin()).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
}
