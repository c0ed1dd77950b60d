use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::ResolvedConfig;
use crate::domain::{
    DatasetId, GcsUri, ProfileId, SnapshotId, UpdateStrategy, WorkspaceRef, extract_file_uuid,
};
use crate::error::OpsError;
use crate::firecloud::{CloneRequest, FirecloudClient};
use crate::gcs::{GcsClient, GcsObject};
use crate::job::wait_for_job;
use crate::listing::{
    ChecksumMatch, Listing, ListingComparison, ListingSource, checksums_match, compare,
};
use crate::pool::parallel_map;
use crate::tdr::{CreateDatasetRequest, DatasetSummary, IngestRequest, SnapshotRequest, TdrClient};
use crate::tsv::TsvTable;

pub const DEFAULT_PROTECTED_PREFIXES: &[&str] = &["notebooks/"];

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

fn note(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

/// Tunables the operations read from the resolved config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub poll_interval: Duration,
    pub upsert_batch_size: usize,
    pub ingest_batch_size: usize,
    pub workers: usize,
    pub billing_profile: Option<ProfileId>,
}

impl From<&ResolvedConfig> for Settings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            upsert_batch_size: config.upsert_batch_size,
            ingest_batch_size: config.ingest_batch_size,
            workers: config.workers,
            billing_profile: config.billing_profile.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub auth_domains: Vec<String>,
    pub copy_files_with_prefix: Option<String>,
    pub copy_bucket: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneResult {
    pub source: String,
    pub destination: String,
    pub source_bucket: String,
    pub destination_bucket: String,
    pub copy: Option<CopyResult>,
}

#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    pub entity_type: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult {
    pub workspace: String,
    pub entity_type: String,
    pub rows: usize,
    pub batches: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub update_strategy: UpdateStrategy,
    pub infer_numbers: bool,
    pub load_tag: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            update_strategy: UpdateStrategy::Append,
            infer_numbers: false,
            load_tag: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestJobResult {
    pub job_id: String,
    pub load_tag: String,
    pub row_count: u64,
    pub bad_row_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub dataset: String,
    pub table: String,
    pub jobs: Vec<IngestJobResult>,
    pub row_count: u64,
    pub bad_row_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectFailure {
    pub object: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyResult {
    pub source: String,
    pub destination: String,
    pub listed: usize,
    pub copied: usize,
    pub skipped: usize,
    pub unverified: usize,
    pub failed: Vec<ObjectFailure>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub name: Option<String>,
    pub profile: Option<ProfileId>,
    pub page_size: Option<usize>,
    pub update_strategy: UpdateStrategy,
    pub snapshot: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            name: None,
            profile: None,
            page_size: None,
            update_strategy: UpdateStrategy::Append,
            snapshot: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableMigration {
    pub table: String,
    pub source_rows: usize,
    pub ingested_rows: u64,
    pub bad_rows: u64,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrateResult {
    pub source_dataset: String,
    pub source_name: String,
    pub destination_dataset: String,
    pub destination_name: String,
    pub tables: Vec<TableMigration>,
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MopOptions {
    pub dry_run: bool,
    pub protected_prefixes: Vec<String>,
}

impl Default for MopOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            protected_prefixes: DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MopResult {
    pub workspace: String,
    pub bucket: String,
    pub listed: usize,
    pub referenced: usize,
    pub protected: usize,
    pub candidates: Vec<String>,
    pub candidate_bytes: u64,
    pub deleted: usize,
    pub failed: Vec<ObjectFailure>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResult {
    pub dataset: String,
    pub snapshot_name: String,
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetListResult {
    pub datasets: Vec<DatasetSummary>,
}

enum CopyOutcome {
    Copied,
    Skipped,
    Unverified,
    Failed(ObjectFailure),
}

pub struct App<T: TdrClient, F: FirecloudClient, G: GcsClient> {
    tdr: T,
    firecloud: F,
    gcs: G,
    settings: Settings,
}

impl<T: TdrClient, F: FirecloudClient, G: GcsClient> App<T, F, G> {
    pub fn new(tdr: T, firecloud: F, gcs: G, settings: Settings) -> Self {
        Self {
            tdr,
            firecloud,
            gcs,
            settings,
        }
    }

    pub fn clone_workspace(
        &self,
        source: &WorkspaceRef,
        destination: &WorkspaceRef,
        options: CloneOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CloneResult, OpsError> {
        note(sink, format!("phase=Resolve; workspace {source}"));
        let source_details = self.firecloud.get_workspace(source)?;

        note(sink, format!("phase=Clone; {source} -> {destination}"));
        let request = CloneRequest::new(
            destination,
            &options.auth_domains,
            options.copy_files_with_prefix.clone(),
        );
        let cloned = self.firecloud.clone_workspace(source, &request)?;

        let copy = if options.copy_bucket {
            let from = GcsUri::new(&source_details.bucket_name, "")?;
            let to = GcsUri::new(&cloned.bucket_name, "")?;
            Some(self.copy_objects(&from, &to, CopyOptions::default(), sink)?)
        } else {
            None
        };

        Ok(CloneResult {
            source: source.to_string(),
            destination: destination.to_string(),
            source_bucket: source_details.bucket_name,
            destination_bucket: cloned.bucket_name,
            copy,
        })
    }

    pub fn upsert_table(
        &self,
        workspace: &WorkspaceRef,
        table: &TsvTable,
        options: UpsertOptions,
        sink: &dyn ProgressSink,
    ) -> Result<UpsertResult, OpsError> {
        let entity_type = table.entity_type(options.entity_type.as_deref())?;
        let ops = table.to_upsert_ops(options.entity_type.as_deref())?;
        let batches = ops.chunks(self.settings.upsert_batch_size).collect::<Vec<_>>();

        if !options.dry_run {
            let started = Instant::now();
            for (index, batch) in batches.iter().enumerate() {
                self.firecloud.batch_upsert(workspace, batch)?;
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Upsert; batch {}/{} ({} rows) to {workspace}",
                        index + 1,
                        batches.len(),
                        batch.len()
                    ),
                    elapsed: Some(started.elapsed()),
                });
            }
        }

        Ok(UpsertResult {
            workspace: workspace.to_string(),
            entity_type,
            rows: ops.len(),
            batches: batches.len(),
            dry_run: options.dry_run,
        })
    }

    pub fn ingest_table(
        &self,
        dataset: &DatasetId,
        table: &str,
        rows: &TsvTable,
        options: IngestOptions,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, OpsError> {
        note(sink, format!("phase=Resolve; dataset {dataset}"));
        let model = self.tdr.get_dataset(dataset)?;
        let has_table = model
            .schema
            .as_ref()
            .and_then(|schema| schema.table(table))
            .is_some();
        if !has_table {
            return Err(OpsError::UnknownTable(table.to_string()));
        }

        let records = rows.to_records(options.infer_numbers);
        let base_tag = options
            .load_tag
            .clone()
            .unwrap_or_else(|| default_load_tag(table));

        let mut jobs = Vec::new();
        let chunks = records.chunks(self.settings.ingest_batch_size).collect::<Vec<_>>();
        for (index, chunk) in chunks.iter().enumerate() {
            let load_tag = if chunks.len() == 1 {
                base_tag.clone()
            } else {
                format!("{base_tag}-{}", index + 1)
            };
            let request =
                IngestRequest::array(table, &load_tag, options.update_strategy, chunk.to_vec());
            let job_id = self.tdr.ingest(dataset, &request)?;
            note(
                sink,
                format!(
                    "phase=Ingest; batch {}/{} submitted as job {job_id}",
                    index + 1,
                    chunks.len()
                ),
            );
            let result = wait_for_job(&self.tdr, &job_id, self.settings.poll_interval, sink)?;
            jobs.push(IngestJobResult {
                job_id: job_id.to_string(),
                load_tag,
                row_count: count(&result, "row_count"),
                bad_row_count: count(&result, "bad_row_count"),
            });
        }

        Ok(IngestResult {
            dataset: dataset.to_string(),
            table: table.to_string(),
            row_count: jobs.iter().map(|job| job.row_count).sum(),
            bad_row_count: jobs.iter().map(|job| job.bad_row_count).sum(),
            jobs,
        })
    }

    pub fn copy_objects(
        &self,
        source: &GcsUri,
        destination: &GcsUri,
        options: CopyOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CopyResult, OpsError> {
        note(sink, format!("phase=Resolve; listing {source}"));
        let prefix = source.prefix();
        let objects = self
            .gcs
            .list_objects(source)?
            .into_iter()
            .filter(|object| !object.name.ends_with('/'))
            .collect::<Vec<_>>();

        let mut result = CopyResult {
            source: source.to_string(),
            destination: destination.to_string(),
            listed: objects.len(),
            copied: 0,
            skipped: 0,
            unverified: 0,
            failed: Vec::new(),
            dry_run: options.dry_run,
        };
        if options.dry_run {
            return Ok(result);
        }

        let gcs = &self.gcs;
        let outcomes = parallel_map(&objects, self.settings.workers, |object| {
            let relative = object.name.strip_prefix(prefix.as_str()).unwrap_or(&object.name);
            let from = GcsUri::new(source.bucket(), &object.name)?;
            let to = destination.join(relative);
            let outcome = copy_one(gcs, object, &from, &to, options.force);
            if let CopyOutcome::Copied = outcome {
                note(sink, format!("phase=Copy; {from} -> {to}"));
            }
            Ok::<_, OpsError>(outcome)
        });

        for (object, outcome) in objects.iter().zip(outcomes) {
            match outcome {
                Ok(CopyOutcome::Copied) => result.copied += 1,
                Ok(CopyOutcome::Skipped) => result.skipped += 1,
                Ok(CopyOutcome::Unverified) => {
                    result.copied += 1;
                    result.unverified += 1;
                }
                Ok(CopyOutcome::Failed(failure)) => result.failed.push(failure),
                Err(err) => result.failed.push(ObjectFailure {
                    object: object.name.clone(),
                    error: err.to_string(),
                }),
            }
        }
        Ok(result)
    }

    pub fn compare_listings(
        &self,
        source: &ListingSource,
        destination: &ListingSource,
        sink: &dyn ProgressSink,
    ) -> Result<ListingComparison, OpsError> {
        note(sink, format!("phase=Resolve; listing {source}"));
        let left = Listing::load(source, &self.gcs)?;
        note(sink, format!("phase=Resolve; listing {destination}"));
        let right = Listing::load(destination, &self.gcs)?;
        Ok(compare(&left, &right))
    }

    pub fn list_datasets(
        &self,
        filter: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetListResult, OpsError> {
        note(sink, "phase=Resolve; enumerating datasets".to_string());
        Ok(DatasetListResult {
            datasets: self.tdr.enumerate_datasets(filter)?,
        })
    }

    /// Copies the dataset `dataset` from this app's TDR into `destination`.
    pub fn migrate_dataset<D: TdrClient>(
        &self,
        destination: &D,
        dataset: &DatasetId,
        options: MigrateOptions,
        sink: &dyn ProgressSink,
    ) -> Result<MigrateResult, OpsError> {
        note(sink, format!("phase=Resolve; source dataset {dataset}"));
        let source = self.tdr.get_dataset(dataset)?;
        let profile = options
            .profile
            .clone()
            .or_else(|| self.settings.billing_profile.clone())
            .ok_or_else(|| {
                OpsError::MissingProfile("pass --profile or set billing_profile".to_string())
            })?;
        let name = options.name.clone().unwrap_or_else(|| source.name.clone());

        let existing = destination.enumerate_datasets(Some(&name))?;
        if existing.iter().any(|summary| summary.name == name) {
            return Err(OpsError::AlreadyExists(format!("dataset {name}")));
        }

        let request = CreateDatasetRequest::from_dataset(&source, &name, &profile)?;
        let job_id = destination.create_dataset(&request)?;
        note(sink, format!("phase=Create; dataset {name} as job {job_id}"));
        let created = wait_for_job(destination, &job_id, self.settings.poll_interval, sink)?;
        let new_id: DatasetId = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OpsError::Payload("dataset create result has no id".to_string()))?
            .parse()?;

        let page_size = options.page_size.unwrap_or(self.settings.ingest_batch_size).max(1);
        let mut tables = Vec::new();
        for table in &request.schema.tables {
            let filerefs = table
                .fileref_columns()
                .into_iter()
                .map(|column| column.name.clone())
                .collect::<BTreeSet<_>>();
            let mut migration = TableMigration {
                table: table.name.clone(),
                source_rows: 0,
                ingested_rows: 0,
                bad_rows: 0,
                files: 0,
            };

            let mut offset = 0;
            let mut batch = 0;
            loop {
                let page = self.tdr.query_rows(dataset, &table.name, offset, page_size)?;
                let fetched = page.result.len();
                if fetched == 0 {
                    break;
                }
                let mut records = Vec::with_capacity(fetched);
                for row in page.result {
                    let (record, files) = self.migrate_row(dataset, &table.name, row, &filerefs)?;
                    migration.files += files;
                    records.push(record);
                }
                migration.source_rows += fetched;
                batch += 1;

                let load_tag = format!("migrate-{}-{}-{batch}", source.id, table.name);
                let ingest =
                    IngestRequest::array(&table.name, &load_tag, options.update_strategy, records);
                let job_id = destination.ingest(&new_id, &ingest)?;
                note(
                    sink,
                    format!("phase=Ingest; {} rows {offset}.. as job {job_id}", table.name),
                );
                let result = wait_for_job(destination, &job_id, self.settings.poll_interval, sink)?;
                migration.ingested_rows += count(&result, "row_count");
                migration.bad_rows += count(&result, "bad_row_count");

                offset += fetched;
                if offset >= page.total_row_count {
                    break;
                }
            }
            tables.push(migration);
        }

        let snapshot_id = if options.snapshot {
            let snapshot_name = format!("{name}_snapshot");
            let request = SnapshotRequest::full_view(&snapshot_name, &name, &profile);
            let job_id = destination.create_snapshot(&request)?;
            let result = wait_for_job(destination, &job_id, self.settings.poll_interval, sink)?;
            Some(result_id(&result, "snapshot")?)
        } else {
            None
        };

        Ok(MigrateResult {
            source_dataset: source.id,
            source_name: source.name,
            destination_dataset: new_id.to_string(),
            destination_name: name,
            tables,
            snapshot_id,
        })
    }

    /// Drops `datarepo_*` columns and turns fileref values into inline
    /// file-load objects. Returns the record and how many files it loads.
    fn migrate_row(
        &self,
        dataset: &DatasetId,
        table: &str,
        row: Map<String, Value>,
        filerefs: &BTreeSet<String>,
    ) -> Result<(Value, usize), OpsError> {
        let mut record = Map::new();
        let mut files = 0;
        for (column, value) in row {
            if column.starts_with("datarepo_") || value.is_null() {
                continue;
            }
            if !filerefs.contains(&column) {
                record.insert(column, value);
                continue;
            }
            let converted = match value {
                Value::Array(items) => {
                    let mut loads = Vec::with_capacity(items.len());
                    for item in items {
                        if let Some(reference) = item.as_str() {
                            loads.push(self.file_load(dataset, table, reference)?);
                            files += 1;
                        }
                    }
                    Value::Array(loads)
                }
                Value::String(reference) => {
                    files += 1;
                    self.file_load(dataset, table, &reference)?
                }
                other => other,
            };
            record.insert(column, converted);
        }
        Ok((Value::Object(record), files))
    }

    fn file_load(
        &self,
        dataset: &DatasetId,
        table: &str,
        reference: &str,
    ) -> Result<Value, OpsError> {
        let file_id = extract_file_uuid(reference)
            .ok_or_else(|| OpsError::InvalidUuid(reference.to_string()))?;
        let file = self.tdr.file_by_id(dataset, &file_id)?;
        let source_path = file
            .access_url()
            .ok_or_else(|| OpsError::Payload(format!("file {file_id} has no access URL")))?;
        let file_name = file.file_name().unwrap_or(file_id.as_str());
        Ok(json!({
            "sourcePath": source_path,
            "targetPath": format!("/{table}/{file_id}/{file_name}"),
        }))
    }

    pub fn mop_workspace(
        &self,
        workspace: &WorkspaceRef,
        options: MopOptions,
        sink: &dyn ProgressSink,
    ) -> Result<MopResult, OpsError> {
        note(sink, format!("phase=Resolve; workspace {workspace}"));
        let details = self.firecloud.get_workspace(workspace)?;
        let bucket = details.bucket_name.clone();
        let bucket_prefix = format!("gs://{bucket}/");

        let mut referenced = BTreeSet::new();
        for value in details.attributes.values() {
            collect_references(value, &bucket_prefix, &mut referenced);
        }
        for entity_type in self.firecloud.entity_types(workspace)?.keys() {
            note(sink, format!("phase=Resolve; scanning {entity_type} entities"));
            for entity in self.firecloud.all_entities(workspace, entity_type)? {
                for value in entity.attributes.values() {
                    collect_references(value, &bucket_prefix, &mut referenced);
                }
            }
        }

        let root = GcsUri::new(&bucket, "")?;
        let objects = self.gcs.list_objects(&root)?;
        let mut protected = 0;
        let mut referenced_count = 0;
        let mut candidates = Vec::new();
        for object in &objects {
            if options
                .protected_prefixes
                .iter()
                .any(|prefix| object.name.starts_with(prefix.as_str()))
            {
                protected += 1;
            } else if referenced.contains(&object.name) {
                referenced_count += 1;
            } else if !object.name.ends_with('/') {
                candidates.push(object);
            }
        }

        let mut result = MopResult {
            workspace: workspace.to_string(),
            bucket: bucket.clone(),
            listed: objects.len(),
            referenced: referenced_count,
            protected,
            candidates: candidates.iter().map(|object| object.name.clone()).collect(),
            candidate_bytes: candidates.iter().map(|object| object.size).sum(),
            deleted: 0,
            failed: Vec::new(),
            dry_run: options.dry_run,
        };
        if options.dry_run {
            note(
                sink,
                format!("phase=Mop; dry run, {} deletion candidates", result.candidates.len()),
            );
            return Ok(result);
        }

        let gcs = &self.gcs;
        let outcomes = parallel_map(&candidates, self.settings.workers, |object| {
            GcsUri::new(&bucket, &object.name).and_then(|uri| gcs.delete_object(&uri))
        });
        for (object, outcome) in candidates.iter().zip(outcomes) {
            match outcome {
                Ok(()) => result.deleted += 1,
                Err(err) => result.failed.push(ObjectFailure {
                    object: object.name.clone(),
                    error: err.to_string(),
                }),
            }
        }
        note(sink, format!("phase=Mop; deleted {} objects", result.deleted));
        Ok(result)
    }

    pub fn create_snapshot(
        &self,
        dataset: &DatasetId,
        name: Option<&str>,
        profile: Option<ProfileId>,
        sink: &dyn ProgressSink,
    ) -> Result<SnapshotResult, OpsError> {
        let model = self.tdr.get_dataset(dataset)?;
        let profile = match profile.or_else(|| self.settings.billing_profile.clone()) {
            Some(profile) => profile,
            None => model
                .default_profile_id
                .as_deref()
                .ok_or_else(|| {
                    OpsError::MissingProfile(format!("dataset {dataset} has no default profile"))
                })?
                .parse::<ProfileId>()?,
        };
        let snapshot_name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", model.name, chrono::Utc::now().format("%Y%m%d")));
        let request = SnapshotRequest::full_view(&snapshot_name, &model.name, &profile);
        let job_id = self.tdr.create_snapshot(&request)?;
        note(sink, format!("phase=Snapshot; {snapshot_name} as job {job_id}"));
        let result = wait_for_job(&self.tdr, &job_id, self.settings.poll_interval, sink)?;
        Ok(SnapshotResult {
            dataset: dataset.to_string(),
            snapshot_name,
            snapshot_id: result_id(&result, "snapshot")?,
        })
    }
}

fn copy_one<G: GcsClient>(
    gcs: &G,
    object: &GcsObject,
    from: &GcsUri,
    to: &GcsUri,
    force: bool,
) -> CopyOutcome {
    let failed = |error: String| {
        CopyOutcome::Failed(ObjectFailure {
            object: from.to_string(),
            error,
        })
    };

    if !force {
        match gcs.get_object(to) {
            Ok(Some(existing)) if checksums_match(object, &existing) == ChecksumMatch::Match => {
                return CopyOutcome::Skipped;
            }
            Ok(_) => {}
            Err(err) => return failed(err.to_string()),
        }
    }

    let copied = match gcs.rewrite_object(from, to) {
        Ok(copied) => copied,
        Err(err) => return failed(err.to_string()),
    };
    match checksums_match(object, &copied) {
        ChecksumMatch::Match => CopyOutcome::Copied,
        ChecksumMatch::Mismatch => failed(format!("checksum mismatch after copy to {to}")),
        ChecksumMatch::Unknown if copied.size != object.size => failed(format!(
            "size mismatch after copy to {to}: {} != {}",
            copied.size, object.size
        )),
        ChecksumMatch::Unknown => CopyOutcome::Unverified,
    }
}

/// Every object name in `bucket_prefix` mentioned anywhere inside `value`.
pub fn collect_references(value: &Value, bucket_prefix: &str, into: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => {
            if let Some(object) = text.strip_prefix(bucket_prefix) {
                into.insert(object.to_string());
            }
        }
        Value::Array(items) => items
            .iter()
            .for_each(|item| collect_references(item, bucket_prefix, into)),
        Value::Object(map) => map
            .values()
            .for_each(|item| collect_references(item, bucket_prefix, into)),
        _ => {}
    }
}

fn count(result: &Value, key: &str) -> u64 {
    result.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn result_id(result: &Value, what: &str) -> Result<String, OpsError> {
    let id = result
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| OpsError::Payload(format!("{what} result has no id")))?;
    Ok(id.parse::<SnapshotId>()?.to_string())
}

fn default_load_tag(table: &str) -> String {
    format!("terra-ops-{table}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_in_nested_rawls_lists() {
        let value = json!({
            "itemsType": "AttributeValue",
            "items": ["gs://fc-1/a.cram", "gs://other/b.cram", {"x": "gs://fc-1/c.crai"}]
        });
        let mut found = BTreeSet::new();
        collect_references(&value, "gs://fc-1/", &mut found);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["a.cram".to_string(), "c.crai".to_string()]
        );
    }

    #[test]
    fn counts_default_to_zero() {
        let result = json!({"row_count": 12});
        assert_eq!(count(&result, "row_count"), 12);
        assert_eq!(count(&result, "bad_row_count"), 0);
    }
}
