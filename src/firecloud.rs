use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::WorkspaceRef;
use crate::error::OpsError;
use crate::http::ApiClient;

pub const ENTITY_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDetails {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub authorization_domain: Vec<AuthDomain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDomain {
    pub members_group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceResponse {
    workspace: WorkspaceDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    pub namespace: String,
    pub name: String,
    pub attributes: Map<String, Value>,
    pub authorization_domain: Vec<AuthDomain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_files_with_prefix: Option<String>,
}

impl CloneRequest {
    pub fn new(
        dest: &WorkspaceRef,
        auth_domains: &[String],
        copy_files_with_prefix: Option<String>,
    ) -> Self {
        Self {
            namespace: dest.namespace().to_string(),
            name: dest.name().to_string(),
            attributes: Map::new(),
            authorization_domain: auth_domains
                .iter()
                .map(|group| AuthDomain {
                    members_group_name: group.clone(),
                })
                .collect(),
            copy_files_with_prefix,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeInfo {
    pub count: usize,
    pub id_name: String,
    #[serde(default)]
    pub attribute_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPage {
    #[serde(default)]
    pub results: Vec<Entity>,
    pub result_metadata: ResultMetadata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(default)]
    pub filtered_count: usize,
    #[serde(default)]
    pub filtered_page_count: usize,
}

/// One entity in a `batchUpsert` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOp {
    pub name: String,
    pub entity_type: String,
    pub operations: Vec<AttributeOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeOp {
    pub op: String,
    pub attribute_name: String,
    pub add_update_attribute: Value,
}

impl AttributeOp {
    pub fn add_update(name: &str, value: Value) -> Self {
        Self {
            op: "AddUpdateAttribute".to_string(),
            attribute_name: name.to_string(),
            add_update_attribute: value,
        }
    }
}

pub trait FirecloudClient {
    fn get_workspace(&self, ws: &WorkspaceRef) -> Result<WorkspaceDetails, OpsError>;
    fn clone_workspace(
        &self,
        source: &WorkspaceRef,
        request: &CloneRequest,
    ) -> Result<WorkspaceDetails, OpsError>;
    fn entity_types(&self, ws: &WorkspaceRef) -> Result<BTreeMap<String, EntityTypeInfo>, OpsError>;
    /// `page` is 1-based, as in the Rawls entity query API.
    fn entity_page(
        &self,
        ws: &WorkspaceRef,
        entity_type: &str,
        page: usize,
        page_size: usize,
    ) -> Result<EntityPage, OpsError>;
    fn batch_upsert(&self, ws: &WorkspaceRef, ops: &[UpsertOp]) -> Result<(), OpsError>;

    fn all_entities(&self, ws: &WorkspaceRef, entity_type: &str) -> Result<Vec<Entity>, OpsError> {
        let mut entities = Vec::new();
        let mut page = 1;
        loop {
            let response = self.entity_page(ws, entity_type, page, ENTITY_PAGE_SIZE)?;
            let fetched = response.results.len();
            entities.extend(response.results);
            if fetched == 0 || page >= response.result_metadata.filtered_page_count {
                break;
            }
            page += 1;
        }
        Ok(entities)
    }
}

#[derive(Clone)]
pub struct FirecloudHttpClient {
    api: ApiClient,
}

impl FirecloudHttpClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn workspace_url(&self, ws: &WorkspaceRef, rest: &[&str]) -> Result<reqwest::Url, OpsError> {
        let mut segments = vec!["api", "workspaces", ws.namespace(), ws.name()];
        segments.extend_from_slice(rest);
        self.api.url(&segments)
    }
}

impl FirecloudClient for FirecloudHttpClient {
    fn get_workspace(&self, ws: &WorkspaceRef) -> Result<WorkspaceDetails, OpsError> {
        let url = self.workspace_url(ws, &[])?;
        let response: WorkspaceResponse = self.api.send_json(|| self.api.get(&url))?;
        Ok(response.workspace)
    }

    fn clone_workspace(
        &self,
        source: &WorkspaceRef,
        request: &CloneRequest,
    ) -> Result<WorkspaceDetails, OpsError> {
        let url = self.workspace_url(source, &["clone"])?;
        self.api.send_json(|| self.api.post(&url).json(request))
    }

    fn entity_types(
        &self,
        ws: &WorkspaceRef,
    ) -> Result<BTreeMap<String, EntityTypeInfo>, OpsError> {
        let url = self.workspace_url(ws, &["entities"])?;
        self.api.send_json(|| self.api.get(&url))
    }

    fn entity_page(
        &self,
        ws: &WorkspaceRef,
        entity_type: &str,
        page: usize,
        page_size: usize,
    ) -> Result<EntityPage, OpsError> {
        let url = self.workspace_url(ws, &["entityQuery", entity_type])?;
        let page = page.to_string();
        let page_size = page_size.to_string();
        self.api.send_json(|| {
            self.api
                .get(&url)
                .query(&[("page", page.as_str()), ("pageSize", page_size.as_str())])
        })
    }

    fn batch_upsert(&self, ws: &WorkspaceRef, ops: &[UpsertOp]) -> Result<(), OpsError> {
        let url = self.workspace_url(ws, &["entities", "batchUpsert"])?;
        self.api.send_empty(|| self.api.post(&url).json(ops))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn upsert_op_wire_format() {
        let op = UpsertOp {
            name: "S1".to_string(),
            entity_type: "sample".to_string(),
            operations: vec![AttributeOp::add_update("cram", json!("gs://b/S1.cram"))],
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["entityType"], "sample");
        assert_eq!(value["operations"][0]["op"], "AddUpdateAttribute");
        assert_eq!(value["operations"][0]["attributeName"], "cram");
        assert_eq!(value["operations"][0]["addUpdateAttribute"], "gs://b/S1.cram");
    }

    #[test]
    fn clone_request_auth_domains() {
        let dest: WorkspaceRef = "billing/copy".parse().unwrap();
        let request = CloneRequest::new(&dest, &["AUTH_ANVIL".to_string()], None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["authorizationDomain"][0]["membersGroupName"], "AUTH_ANVIL");
        assert!(value.get("copyFilesWithPrefix").is_none());
    }
}
