use camino::Utf8PathBuf;
use serde_json::json;

use terra_ops::store::ReportStore;

fn temp_store() -> (tempfile::TempDir, ReportStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join(".terra-ops")).unwrap();
    (temp, ReportStore::new_with_root(root))
}

#[test]
fn saved_report_round_trips_envelope() {
    let (_temp, store) = temp_store();
    let path = store
        .save("ingest", &json!({"dataset": "d", "row_count": 3}))
        .unwrap();
    assert!(path.starts_with(store.command_dir("ingest")));

    let report = ReportStore::read_report(&path).unwrap();
    assert_eq!(report.command, "ingest");
    assert!(report.tool.starts_with("terra-ops/"));
    assert_eq!(report.result["row_count"], 3);
}

#[test]
fn list_reports_filters_by_command() {
    let (_temp, store) = temp_store();
    store.save("copy", &json!({"copied": 1})).unwrap();
    store.save("mop", &json!({"deleted": 0})).unwrap();

    let all = store.list_reports(None).unwrap();
    assert_eq!(all.len(), 2);

    let copies = store.list_reports(Some("copy")).unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].command, "copy");
}

#[test]
fn list_reports_on_missing_store_is_empty() {
    let (_temp, store) = temp_store();
    assert!(store.list_reports(Some("ingest")).unwrap().is_empty());
}
