use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::GcsUri;
use crate::error::OpsError;
use crate::fs_util::walk_dir;
use crate::gcs::{GcsClient, GcsObject};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub size: u64,
    pub md5: Option<String>,
}

/// Files under a root keyed by path relative to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub root: String,
    pub entries: BTreeMap<String, ListingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingSource {
    Gcs(GcsUri),
    Local(Utf8PathBuf),
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingSource::Gcs(uri) => write!(f, "{uri}"),
            ListingSource::Local(path) => write!(f, "{path}"),
        }
    }
}

impl FromStr for ListingSource {
    type Err = OpsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().starts_with("gs://") {
            Ok(ListingSource::Gcs(value.parse()?))
        } else {
            Ok(ListingSource::Local(Utf8PathBuf::from(value.trim())))
        }
    }
}

impl Listing {
    pub fn load(source: &ListingSource, gcs: &dyn GcsClient) -> Result<Self, OpsError> {
        match source {
            ListingSource::Gcs(uri) => {
                let objects = gcs.list_objects(uri)?;
                Ok(Self::from_gcs_objects(uri, &objects))
            }
            ListingSource::Local(path) => Self::from_local(path),
        }
    }

    /// Zero-byte `dir/` placeholder objects are dropped.
    pub fn from_gcs_objects(root: &GcsUri, objects: &[GcsObject]) -> Self {
        let prefix = root.prefix();
        let entries = objects
            .iter()
            .filter(|object| !object.name.ends_with('/'))
            .filter_map(|object| {
                let relative = object.name.strip_prefix(prefix.as_str())?;
                Some((
                    relative.to_string(),
                    ListingEntry {
                        size: object.size,
                        md5: object.md5_hash.clone(),
                    },
                ))
            })
            .collect();
        Self {
            root: root.to_string(),
            entries,
        }
    }

    pub fn from_local(root: &Utf8Path) -> Result<Self, OpsError> {
        if !root.as_std_path().is_dir() {
            return Err(OpsError::Filesystem(format!("{root} is not a directory")));
        }
        let mut entries = BTreeMap::new();
        for path in walk_dir(root.as_std_path())? {
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(root.as_std_path())
                .map_err(|err| OpsError::Filesystem(err.to_string()))?;
            let relative = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let size = fs::metadata(&path)
                .map_err(|err| OpsError::Filesystem(err.to_string()))?
                .len();
            entries.insert(relative, ListingEntry { size, md5: None });
        }
        Ok(Self {
            root: root.to_string(),
            entries,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Mismatch {
    pub path: String,
    pub source: ListingEntry,
    pub destination: ListingEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingComparison {
    pub source: String,
    pub destination: String,
    pub matched: usize,
    pub only_in_source: Vec<String>,
    pub only_in_destination: Vec<String>,
    pub mismatched: Vec<Mismatch>,
}

impl ListingComparison {
    pub fn is_identical(&self) -> bool {
        self.only_in_source.is_empty()
            && self.only_in_destination.is_empty()
            && self.mismatched.is_empty()
    }
}

/// Entries differ when sizes differ, or when both sides carry an md5 and
/// they disagree.
pub fn compare(source: &Listing, destination: &Listing) -> ListingComparison {
    let mut matched = 0;
    let mut only_in_source = Vec::new();
    let mut mismatched = Vec::new();

    for (path, entry) in &source.entries {
        match destination.entries.get(path) {
            None => only_in_source.push(path.clone()),
            Some(other) => {
                let md5_differs = matches!((&entry.md5, &other.md5), (Some(a), Some(b)) if a != b);
                if entry.size != other.size || md5_differs {
                    mismatched.push(Mismatch {
                        path: path.clone(),
                        source: entry.clone(),
                        destination: other.clone(),
                    });
                } else {
                    matched += 1;
                }
            }
        }
    }

    let only_in_destination = destination
        .entries
        .keys()
        .filter(|path| !source.entries.contains_key(*path))
        .cloned()
        .collect();

    ListingComparison {
        source: source.root.clone(),
        destination: destination.root.clone(),
        matched,
        only_in_source,
        only_in_destination,
        mismatched,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMatch {
    Match,
    Mismatch,
    Unknown,
}

/// md5 when both objects have one (composite uploads do not), else crc32c.
pub fn checksums_match(a: &GcsObject, b: &GcsObject) -> ChecksumMatch {
    let pair = match (&a.md5_hash, &b.md5_hash) {
        (Some(x), Some(y)) => Some((x, y)),
        _ => match (&a.crc32c, &b.crc32c) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        },
    };
    match pair {
        Some((x, y)) if x == y => ChecksumMatch::Match,
        Some(_) => ChecksumMatch::Mismatch,
        None => ChecksumMatch::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, size: u64, md5: Option<&str>, crc: Option<&str>) -> GcsObject {
        GcsObject {
            name: name.to_string(),
            bucket: "b".to_string(),
            size,
            md5_hash: md5.map(str::to_string),
            crc32c: crc.map(str::to_string),
            updated: None,
        }
    }

    #[test]
    fn checksum_preference() {
        let a = object("x", 1, Some("m1"), Some("c1"));
        let b = object("x", 1, Some("m1"), Some("c2"));
        assert_eq!(checksums_match(&a, &b), ChecksumMatch::Match);

        let composite = object("x", 1, None, Some("c1"));
        assert_eq!(checksums_match(&a, &composite), ChecksumMatch::Match);
        let other = object("x", 1, None, Some("c9"));
        assert_eq!(checksums_match(&a, &other), ChecksumMatch::Mismatch);

        let bare = object("x", 1, None, None);
        assert_eq!(checksums_match(&a, &bare), ChecksumMatch::Unknown);
    }

    #[test]
    fn gcs_listing_is_relative_to_prefix() {
        let root: GcsUri = "gs://b/run1".parse().unwrap();
        let listing = Listing::from_gcs_objects(
            &root,
            &[
                object("run1/", 0, None, None),
                object("run1/a.txt", 3, Some("m"), None),
                object("run1/sub/b.txt", 4, None, None),
            ],
        );
        let keys = listing.entries.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["a.txt", "sub/b.txt"]);
    }
}
