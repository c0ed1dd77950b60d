use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::GcsUri;
use crate::error::OpsError;
use crate::http::{ApiClient, Platform, error_message_from_value};

const LIST_FIELDS: &str = "items(name,bucket,size,md5Hash,crc32c,updated),nextPageToken";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsObject {
    pub name: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub size: u64,
    #[serde(default)]
    pub md5_hash: Option<String>,
    #[serde(default)]
    pub crc32c: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteResponse {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    rewrite_token: Option<String>,
    #[serde(default)]
    resource: Option<GcsObject>,
}

pub trait GcsClient: Send + Sync {
    /// Every object under the URI's prefix, following `nextPageToken`.
    fn list_objects(&self, uri: &GcsUri) -> Result<Vec<GcsObject>, OpsError>;
    /// `None` when the object does not exist.
    fn get_object(&self, uri: &GcsUri) -> Result<Option<GcsObject>, OpsError>;
    /// Server-side copy; returns the destination object.
    fn rewrite_object(&self, source: &GcsUri, destination: &GcsUri) -> Result<GcsObject, OpsError>;
    fn delete_object(&self, uri: &GcsUri) -> Result<(), OpsError>;
}

#[derive(Clone)]
pub struct GcsHttpClient {
    api: ApiClient,
}

impl GcsHttpClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn object_url(&self, uri: &GcsUri) -> Result<reqwest::Url, OpsError> {
        self.api
            .url(&["storage", "v1", "b", uri.bucket(), "o", uri.object()])
    }
}

impl GcsClient for GcsHttpClient {
    fn list_objects(&self, uri: &GcsUri) -> Result<Vec<GcsObject>, OpsError> {
        let url = self.api.url(&["storage", "v1", "b", uri.bucket(), "o"])?;
        let prefix = uri.prefix();
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: ListResponse = self.api.send_json(|| {
                let mut request = self
                    .api
                    .get(&url)
                    .query(&[("fields", LIST_FIELDS), ("maxResults", "1000")]);
                if !prefix.is_empty() {
                    request = request.query(&[("prefix", prefix.as_str())]);
                }
                if let Some(token) = &page_token {
                    request = request.query(&[("pageToken", token.as_str())]);
                }
                request
            })?;
            objects.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tracing::debug!(uri = %uri, count = objects.len(), "listed objects");
        Ok(objects)
    }

    fn get_object(&self, uri: &GcsUri) -> Result<Option<GcsObject>, OpsError> {
        let url = self.object_url(uri)?;
        let (status, body) = self.api.send_raw(|| self.api.get(&url))?;
        match status {
            200 => serde_json::from_value(body)
                .map(Some)
                .map_err(|err| OpsError::Payload(format!("object metadata: {err}"))),
            404 => Ok(None),
            _ => Err(Platform::Gcs.status_error(
                status,
                error_message_from_value(&body).unwrap_or_else(|| body.to_string()),
            )),
        }
    }

    fn rewrite_object(&self, source: &GcsUri, destination: &GcsUri) -> Result<GcsObject, OpsError> {
        let url = self.api.url(&[
            "storage",
            "v1",
            "b",
            source.bucket(),
            "o",
            source.object(),
            "rewriteTo",
            "b",
            destination.bucket(),
            "o",
            destination.object(),
        ])?;
        let mut token: Option<String> = None;
        loop {
            let response: RewriteResponse = self.api.send_json(|| {
                let request = self.api.post(&url).json(&Value::Object(Default::default()));
                match &token {
                    Some(token) => request.query(&[("rewriteToken", token.as_str())]),
                    None => request,
                }
            })?;
            if response.done {
                return response.resource.ok_or_else(|| {
                    OpsError::Payload(format!("rewrite of {source} returned no resource"))
                });
            }
            token = Some(response.rewrite_token.ok_or_else(|| {
                OpsError::Payload(format!("rewrite of {source} incomplete without token"))
            })?);
        }
    }

    fn delete_object(&self, uri: &GcsUri) -> Result<(), OpsError> {
        let url = self.object_url(uri)?;
        self.api.send_empty(|| self.api.delete(&url))
    }
}

/// GCS encodes 64-bit sizes as JSON strings.
fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => text.parse().map_err(serde::de::Error::custom),
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("size out of range")),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("unexpected size {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn object_size_from_string() {
        let object: GcsObject = serde_json::from_value(json!({
            "name": "data/a.cram",
            "bucket": "b",
            "size": "123456789012",
            "md5Hash": "1B2M2Y8AsgTpgAmY7PhCfg==",
            "crc32c": "AAAAAA=="
        }))
        .unwrap();
        assert_eq!(object.size, 123456789012);
        assert_eq!(object.md5_hash.as_deref(), Some("1B2M2Y8AsgTpgAmY7PhCfg=="));
    }

    #[test]
    fn composite_object_without_md5() {
        let object: GcsObject = serde_json::from_value(json!({
            "name": "big.bam",
            "size": 5,
            "crc32c": "abc="
        }))
        .unwrap();
        assert!(object.md5_hash.is_none());
        assert_eq!(object.size, 5);
    }
}
