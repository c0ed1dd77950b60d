use assert_matches::assert_matches;

use terra_ops::domain::{GcsUri, JobId, ProfileId, SnapshotId, WorkspaceRef};
use terra_ops::error::OpsError;
use terra_ops::listing::ListingSource;

#[test]
fn parse_workspace_with_spaces_trimmed() {
    let ws: WorkspaceRef = "  broad-firecloud-dsde/AnVIL_Demo ".parse().unwrap();
    assert_eq!(ws.namespace(), "broad-firecloud-dsde");
    assert_eq!(ws.name(), "AnVIL_Demo");
}

#[test]
fn snapshot_and_profile_ids_share_uuid_rules() {
    let id: SnapshotId = "5A5A5A5A-0000-4000-8000-00000000000B".parse().unwrap();
    assert_eq!(id.as_str(), "5a5a5a5a-0000-4000-8000-00000000000b");
    let err = "billing".parse::<ProfileId>().unwrap_err();
    assert_matches!(err, OpsError::InvalidUuid(_));
}

#[test]
fn parse_job_id_invalid() {
    for value in ["", "a/b", "has space"] {
        let err = value.parse::<JobId>().unwrap_err();
        assert_matches!(err, OpsError::InvalidJobId(_));
    }
}

#[test]
fn parse_gcs_uri_rejects_uppercase_bucket() {
    let err = "gs://Fc-Bucket/x".parse::<GcsUri>().unwrap_err();
    assert_matches!(err, OpsError::InvalidGcsUri(_));
}

#[test]
fn listing_source_picks_backend() {
    let gcs: ListingSource = "gs://fc-1/run".parse().unwrap();
    assert_matches!(gcs, ListingSource::Gcs(ref uri) if uri.bucket() == "fc-1");
    let local: ListingSource = "./outputs".parse().unwrap();
    assert_matches!(local, ListingSource::Local(ref path) if path.as_str() == "./outputs");
    assert_matches!(
        "gs://".parse::<ListingSource>().unwrap_err(),
        OpsError::InvalidGcsUri(_)
    );
}
