use std::fs::File;
use std::io::Write;

use bms_config::{load_offsets_csv, offsets_to_csv};
use rstest::rstest;
use tempfile::tempdir;

#[rstest]
fn offsets_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offsets.csv");
    let bytes = offsets_to_csv(&[12, -3, 0, 7, 1, -60]).unwrap();
    std::fs::write(&path, &bytes).unwrap();

    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("interface,offset\n0,12\n"));
    assert_eq!(load_offsets_csv(&path).unwrap(), vec![12, -3, 0, 7, 1, -60]);
}

#[rstest]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offsets.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "iface,value").unwrap();
    writeln!(f, "0,1").unwrap();
    drop(f);

    let err = load_offsets_csv(&path).expect_err("should reject headers");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains("headers 'interface,offset'")
    );
}

#[rstest]
fn rejects_out_of_range_interface() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offsets.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "interface,offset").unwrap();
    writeln!(f, "0,1").unwrap();
    writeln!(f, "5,2").unwrap();
    drop(f);

    let err = load_offsets_csv(&path).expect_err("gap in interfaces");
    assert!(format!("{err}").contains("out of range"));
}

#[rstest]
#[case("0,abc")]
#[case("0,70000")]
fn rejects_unparseable_offset(#[case] row: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("offsets.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "interface,offset").unwrap();
    writeln!(f, "{row}").unwrap();
    drop(f);

    let err = load_offsets_csv(&path).expect_err("bad row");
    assert!(format!("{err}").contains("invalid CSV row 2"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_offsets_csv(&dir.path().join("nope.csv")).expect_err("missing");
    assert!(format!("{err}").contains("open offsets CSV"));
}
