use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;

use terra_ops::error::OpsError;
use terra_ops::tsv::TsvTable;

const LOAD_FILE: &str =
    "entity:sample_id\tcram\tdepth\r\nS1\tgs://b/S1.cram\t30\r\n\r\nS2\t\t31\r\n";

#[test]
fn reads_gzipped_load_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("sample.tsv.gz")).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(LOAD_FILE.as_bytes()).unwrap();
    std::fs::write(path.as_std_path(), encoder.finish().unwrap()).unwrap();

    let table = TsvTable::read(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.headers, vec!["entity:sample_id", "cram", "depth"]);
    assert_eq!(table.entity_type(None).unwrap(), "sample");
}

#[test]
fn records_infer_numbers_only_when_asked() {
    let table = TsvTable::parse("sample_id\tdepth\nS1\t30\n").unwrap();
    assert_eq!(table.to_records(false)[0], json!({"sample_id": "S1", "depth": "30"}));
    assert_eq!(table.to_records(true)[0], json!({"sample_id": "S1", "depth": 30}));
}

#[test]
fn missing_file_is_a_filesystem_error() {
    let err = TsvTable::read(camino::Utf8Path::new("/nonexistent/sample.tsv")).unwrap_err();
    assert_matches!(err, OpsError::Filesystem(_));
}
