use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::OpsError;

const UUID_PATTERN: &str = r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UUID_PATTERN).expect("static uuid pattern"))
}

fn parse_uuid(value: &str) -> Result<String, OpsError> {
    let normalized = value.trim().to_lowercase();
    let is_valid = uuid_regex()
        .find(&normalized)
        .map(|m| m.start() == 0 && m.end() == normalized.len())
        .unwrap_or(false);
    if !is_valid {
        return Err(OpsError::InvalidUuid(value.to_string()));
    }
    Ok(normalized)
}

/// Returns the TDR file UUID referenced by `value`, which is either a bare
/// file id or a DRS URI such as `drs://host/v1_<snapshot>_<file>`.
pub fn extract_file_uuid(value: &str) -> Option<String> {
    uuid_regex()
        .find_iter(value)
        .last()
        .map(|m| m.as_str().to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceRef {
    namespace: String,
    name: String,
}

impl WorkspaceRef {
    pub fn new(namespace: &str, name: &str) -> Result<Self, OpsError> {
        format!("{namespace}/{name}").parse()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for WorkspaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for WorkspaceRef {
    type Err = OpsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (namespace, name) = trimmed
            .split_once('/')
            .ok_or_else(|| OpsError::InvalidWorkspace(value.to_string()))?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(OpsError::InvalidWorkspace(value.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = OpsError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                parse_uuid(value).map(Self)
            }
        }
    };
}

uuid_id!(DatasetId);
uuid_id!(SnapshotId);
uuid_id!(ProfileId);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = OpsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
            return Err(OpsError::InvalidJobId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GcsUri {
    bucket: String,
    object: String,
}

impl GcsUri {
    /// `object` is taken verbatim; listed names may carry any characters.
    pub fn new(bucket: &str, object: &str) -> Result<Self, OpsError> {
        if !is_valid_bucket(bucket) {
            return Err(OpsError::InvalidGcsUri(format!("gs://{bucket}/{object}")));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object name or prefix inside the bucket; empty for a bucket root.
    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn join(&self, relative: &str) -> GcsUri {
        let relative = relative.trim_start_matches('/');
        let object = if self.object.is_empty() {
            relative.to_string()
        } else if self.object.ends_with('/') {
            format!("{}{relative}", self.object)
        } else {
            format!("{}/{relative}", self.object)
        };
        GcsUri {
            bucket: self.bucket.clone(),
            object,
        }
    }

    /// Listing prefix: the object path with a trailing slash, or empty.
    pub fn prefix(&self) -> String {
        if self.object.is_empty() || self.object.ends_with('/') {
            self.object.clone()
        } else {
            format!("{}/", self.object)
        }
    }
}

impl fmt::Display for GcsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.object.is_empty() {
            write!(f, "gs://{}", self.bucket)
        } else {
            write!(f, "gs://{}/{}", self.bucket, self.object)
        }
    }
}

impl FromStr for GcsUri {
    type Err = OpsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .trim()
            .strip_prefix("gs://")
            .ok_or_else(|| OpsError::InvalidGcsUri(value.to_string()))?;
        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if !is_valid_bucket(bucket) {
            return Err(OpsError::InvalidGcsUri(value.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }
}

fn is_valid_bucket(bucket: &str) -> bool {
    !bucket.is_empty()
        && bucket
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || "-_.".contains(ch))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TdrEnvironment {
    Prod,
    Dev,
}

impl fmt::Display for TdrEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TdrEnvironment::Prod => write!(f, "prod"),
            TdrEnvironment::Dev => write!(f, "dev"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStrategy {
    Append,
    Replace,
    Merge,
}

impl fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStrategy::Append => write!(f, "append"),
            UpdateStrategy::Replace => write!(f, "replace"),
            UpdateStrategy::Merge => write!(f, "merge"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_workspace_ref() {
        let ws: WorkspaceRef = "anvil-datastorage/AnVIL_Test".parse().unwrap();
        assert_eq!(ws.namespace(), "anvil-datastorage");
        assert_eq!(ws.name(), "AnVIL_Test");
        assert_eq!(ws.to_string(), "anvil-datastorage/AnVIL_Test");
    }

    #[test]
    fn parse_workspace_ref_invalid() {
        for value in ["no-slash", "/name", "ns/", "ns/a/b"] {
            let err = value.parse::<WorkspaceRef>().unwrap_err();
            assert_matches!(err, OpsError::InvalidWorkspace(_));
        }
    }

    #[test]
    fn dataset_id_is_lowercased() {
        let id: DatasetId = "3B8E0C3A-1F0E-4B57-9D2C-7A5D1E2F3A4B".parse().unwrap();
        assert_eq!(id.as_str(), "3b8e0c3a-1f0e-4b57-9d2c-7a5d1e2f3a4b");
    }

    #[test]
    fn dataset_id_rejects_garbage() {
        let err = "3b8e0c3a-1f0e".parse::<DatasetId>().unwrap_err();
        assert_matches!(err, OpsError::InvalidUuid(_));
        let err = "x3b8e0c3a-1f0e-4b57-9d2c-7a5d1e2f3a4b"
            .parse::<DatasetId>()
            .unwrap_err();
        assert_matches!(err, OpsError::InvalidUuid(_));
    }

    #[test]
    fn gcs_uri_parts() {
        let uri: GcsUri = "gs://fc-secure-1234/data/crams".parse().unwrap();
        assert_eq!(uri.bucket(), "fc-secure-1234");
        assert_eq!(uri.object(), "data/crams");
        assert_eq!(uri.prefix(), "data/crams/");
        assert_eq!(
            uri.join("a.cram").to_string(),
            "gs://fc-secure-1234/data/crams/a.cram"
        );

        let root: GcsUri = "gs://bucket".parse().unwrap();
        assert_eq!(root.prefix(), "");
        assert_eq!(root.join("x/y").to_string(), "gs://bucket/x/y");
    }

    #[test]
    fn gcs_uri_invalid() {
        assert_matches!(
            "s3://bucket/x".parse::<GcsUri>().unwrap_err(),
            OpsError::InvalidGcsUri(_)
        );
        assert_matches!(
            "gs:///x".parse::<GcsUri>().unwrap_err(),
            OpsError::InvalidGcsUri(_)
        );
    }

    #[test]
    fn gcs_uri_new_keeps_object_verbatim() {
        let uri = GcsUri::new("fc-1", " keep.cram ").unwrap();
        assert_eq!(uri.object(), " keep.cram ");
        assert_matches!(
            GcsUri::new("Bad Bucket", "x").unwrap_err(),
            OpsError::InvalidGcsUri(_)
        );
    }

    #[test]
    fn file_uuid_from_drs_uri() {
        let drs = "drs://jade.datarepo-dev.broadinstitute.org/v1_0a1b2c3d-0000-4000-8000-000000000001_9f8e7d6c-1111-4222-8333-444455556666";
        assert_eq!(
            extract_file_uuid(drs).as_deref(),
            Some("9f8e7d6c-1111-4222-8333-444455556666")
        );
        assert_eq!(
            extract_file_uuid("9F8E7D6C-1111-4222-8333-444455556666").as_deref(),
            Some("9f8e7d6c-1111-4222-8333-444455556666")
        );
        assert_eq!(extract_file_uuid("not-a-file"), None);
    }
}
