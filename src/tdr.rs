use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::domain::{DatasetId, JobId, ProfileId, UpdateStrategy};
use crate::error::OpsError;
use crate::http::{ApiClient, Platform, error_message_from_value};
use crate::job::{JobApi, JobModel};

const ENUMERATE_PAGE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_profile_id: Option<String>,
    #[serde(default)]
    pub schema: Option<DatasetSchema>,
    #[serde(default)]
    pub cloud_platform: Option<String>,
    #[serde(default)]
    pub data_project: Option<String>,
    #[serde(default)]
    pub phs_id: Option<String>,
    #[serde(default)]
    pub self_hosted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSchema {
    pub tables: Vec<TableModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<Value>,
}

impl DatasetSchema {
    pub fn table(&self, name: &str) -> Option<&TableModel> {
        self.tables.iter().find(|table| table.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableModel {
    pub name: String,
    pub columns: Vec<ColumnModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    /// Partitioning and row-count fields pass through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TableModel {
    pub fn fileref_columns(&self) -> Vec<&ColumnModel> {
        self.columns
            .iter()
            .filter(|column| column.datatype.eq_ignore_ascii_case("fileref"))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnModel {
    pub name: String,
    pub datatype: String,
    #[serde(default)]
    pub array_of: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub default_profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnumerateResponse {
    #[serde(default)]
    filtered_total: usize,
    #[serde(default)]
    items: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatasetRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub default_profile_id: String,
    pub schema: DatasetSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phs_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_hosted: Option<bool>,
}

impl CreateDatasetRequest {
    /// Copies `source` under a new name and billing profile.
    pub fn from_dataset(
        source: &DatasetModel,
        name: &str,
        profile: &ProfileId,
    ) -> Result<Self, OpsError> {
        let schema = source
            .schema
            .clone()
            .ok_or_else(|| OpsError::Payload(format!("dataset {} has no schema", source.id)))?;
        Ok(Self {
            name: name.to_string(),
            description: source.description.clone(),
            default_profile_id: profile.to_string(),
            schema,
            cloud_platform: source.cloud_platform.clone(),
            phs_id: source.phs_id.clone(),
            self_hosted: source.self_hosted,
        })
    }
}

/// Body of `POST datasets/{id}/ingest` in array mode. TDR mixes snake and
/// camel case here.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRequest {
    pub table: String,
    pub format: String,
    pub load_tag: String,
    #[serde(rename = "updateStrategy")]
    pub update_strategy: UpdateStrategy,
    pub records: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bad_records: Option<u32>,
}

impl IngestRequest {
    pub fn array(
        table: &str,
        load_tag: &str,
        update_strategy: UpdateStrategy,
        records: Vec<Value>,
    ) -> Self {
        Self {
            table: table.to_string(),
            format: "array".to_string(),
            load_tag: load_tag.to_string(),
            update_strategy,
            records,
            max_bad_records: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPage {
    #[serde(default)]
    pub result: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total_row_count: usize,
    #[serde(default)]
    pub filtered_row_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileModel {
    pub file_id: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub checksums: Vec<FileChecksum>,
    #[serde(default)]
    pub file_detail: Option<FileDetail>,
}

impl FileModel {
    pub fn access_url(&self) -> Option<&str> {
        self.file_detail
            .as_ref()
            .and_then(|detail| detail.access_url.as_deref())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path
            .as_deref()
            .and_then(|path| path.rsplit('/').find(|part| !part.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChecksum {
    pub checksum: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetail {
    #[serde(default)]
    pub access_url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub profile_id: String,
    pub contents: Vec<SnapshotContents>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotContents {
    pub dataset_name: String,
    pub mode: String,
}

impl SnapshotRequest {
    pub fn full_view(name: &str, dataset_name: &str, profile: &ProfileId) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            profile_id: profile.to_string(),
            contents: vec![SnapshotContents {
                dataset_name: dataset_name.to_string(),
                mode: "byFullView".to_string(),
            }],
        }
    }
}

pub trait TdrClient: JobApi {
    fn get_dataset(&self, id: &DatasetId) -> Result<DatasetModel, OpsError>;
    fn enumerate_datasets(&self, filter: Option<&str>) -> Result<Vec<DatasetSummary>, OpsError>;
    fn create_dataset(&self, request: &CreateDatasetRequest) -> Result<JobId, OpsError>;
    fn ingest(&self, dataset: &DatasetId, request: &IngestRequest) -> Result<JobId, OpsError>;
    fn query_rows(
        &self,
        dataset: &DatasetId,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<RowPage, OpsError>;
    fn file_by_id(&self, dataset: &DatasetId, file_id: &str) -> Result<FileModel, OpsError>;
    fn create_snapshot(&self, request: &SnapshotRequest) -> Result<JobId, OpsError>;
}

#[derive(Clone)]
pub struct TdrHttpClient {
    api: ApiClient,
}

impl TdrHttpClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn repo_url(&self, segments: &[&str]) -> Result<reqwest::Url, OpsError> {
        let mut all = vec!["api", "repository", "v1"];
        all.extend_from_slice(segments);
        self.api.url(&all)
    }

    fn submit<B: Serialize>(&self, segments: &[&str], body: &B) -> Result<JobId, OpsError> {
        let url = self.repo_url(segments)?;
        let model: JobModel = self.api.send_json(|| self.api.post(&url).json(body))?;
        tracing::info!(job_id = %model.id, endpoint = %url, "submitted TDR job");
        model.job_id()
    }
}

impl JobApi for TdrHttpClient {
    fn job_status(&self, job_id: &JobId) -> Result<(u16, JobModel), OpsError> {
        let url = self.repo_url(&["jobs", job_id.as_str()])?;
        let (status, body) = self.api.send_raw(|| self.api.get(&url))?;
        if status != 200 && status != 202 {
            let message = error_message_from_value(&body).unwrap_or_else(|| body.to_string());
            return Err(Platform::Tdr.status_error(status, message));
        }
        let model = serde_json::from_value(body)
            .map_err(|err| OpsError::Payload(format!("job model: {err}")))?;
        Ok((status, model))
    }

    fn job_result(&self, job_id: &JobId) -> Result<(u16, Value), OpsError> {
        let url = self.repo_url(&["jobs", job_id.as_str(), "result"])?;
        self.api.send_raw(|| self.api.get(&url))
    }
}

impl TdrClient for TdrHttpClient {
    fn get_dataset(&self, id: &DatasetId) -> Result<DatasetModel, OpsError> {
        let url = self.repo_url(&["datasets", id.as_str()])?;
        self.api.send_json(|| {
            self.api
                .get(&url)
                .query(&[("include", "SCHEMA,PROFILE,DATA_PROJECT,STORAGE")])
        })
    }

    fn enumerate_datasets(&self, filter: Option<&str>) -> Result<Vec<DatasetSummary>, OpsError> {
        let url = self.repo_url(&["datasets"])?;
        let mut items = Vec::new();
        loop {
            let offset = items.len().to_string();
            let limit = ENUMERATE_PAGE.to_string();
            let page: EnumerateResponse = self.api.send_json(|| {
                let request = self
                    .api
                    .get(&url)
                    .query(&[("offset", offset.as_str()), ("limit", limit.as_str())]);
                match filter {
                    Some(filter) => request.query(&[("filter", filter)]),
                    None => request,
                }
            })?;
            let fetched = page.items.len();
            items.extend(page.items);
            if fetched == 0 || items.len() >= page.filtered_total {
                break;
            }
        }
        Ok(items)
    }

    fn create_dataset(&self, request: &CreateDatasetRequest) -> Result<JobId, OpsError> {
        self.submit(&["datasets"], request)
    }

    fn ingest(&self, dataset: &DatasetId, request: &IngestRequest) -> Result<JobId, OpsError> {
        self.submit(&["datasets", dataset.as_str(), "ingest"], request)
    }

    fn query_rows(
        &self,
        dataset: &DatasetId,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<RowPage, OpsError> {
        let url = self.repo_url(&["datasets", dataset.as_str(), "data", table])?;
        let body = json!({
            "offset": offset,
            "limit": limit,
            "sort": "datarepo_row_id",
            "direction": "asc",
            "filter": "",
        });
        self.api.send_json(|| self.api.post(&url).json(&body))
    }

    fn file_by_id(&self, dataset: &DatasetId, file_id: &str) -> Result<FileModel, OpsError> {
        let url = self.repo_url(&["datasets", dataset.as_str(), "files", file_id])?;
        self.api.send_json(|| self.api.get(&url))
    }

    fn create_snapshot(&self, request: &SnapshotRequest) -> Result<JobId, OpsError> {
        self.submit(&["snapshots"], request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_request_wire_names() {
        let request = IngestRequest::array(
            "sample",
            "terra-ops-1",
            UpdateStrategy::Merge,
            vec![json!({"sample_id": "S1"})],
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["format"], "array");
        assert_eq!(value["load_tag"], "terra-ops-1");
        assert_eq!(value["updateStrategy"], "merge");
        assert!(value.get("max_bad_records").is_none());
    }

    #[test]
    fn table_extra_fields_survive() {
        let raw = json!({
            "name": "sample",
            "columns": [
                {"name": "sample_id", "datatype": "string", "arrayOf": false},
                {"name": "cram", "datatype": "fileref", "arrayOf": false}
            ],
            "primaryKey": ["sample_id"],
            "partitionMode": "none",
            "rowCount": 12
        });
        let table: TableModel = serde_json::from_value(raw).unwrap();
        assert_eq!(table.fileref_columns().len(), 1);
        let back = serde_json::to_value(&table).unwrap();
        assert_eq!(back["partitionMode"], "none");
        assert_eq!(back["primaryKey"][0], "sample_id");
    }

    #[test]
    fn file_model_accessors() {
        let raw = json!({
            "fileId": "9f8e7d6c-1111-4222-8333-444455556666",
            "path": "/crams/S1.cram",
            "size": 10,
            "checksums": [{"checksum": "abcd", "type": "crc32c"}, {"checksum": "ff00", "type": "md5"}],
            "fileDetail": {"accessUrl": "gs://datarepo-bucket/x/S1.cram", "mimeType": "application/octet-stream"}
        });
        let file: FileModel = serde_json::from_value(raw).unwrap();
        assert_eq!(file.access_url(), Some("gs://datarepo-bucket/x/S1.cram"));
        assert_eq!(file.file_name(), Some("S1.cram"));
        assert_eq!(file.checksums[1].kind, "md5");
    }
}
