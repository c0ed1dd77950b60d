use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use flate2::read::GzDecoder;
use serde_json::{Map, Number, Value};

use crate::error::OpsError;
use crate::firecloud::{AttributeOp, UpsertOp};

/// A header row plus data rows of a tab-separated load file. Cells are taken
/// verbatim; there is no quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TsvTable {
    pub fn read(path: &Utf8Path) -> Result<Self, OpsError> {
        let mut file = File::open(path.as_std_path())
            .map_err(|err| OpsError::Filesystem(format!("open {path}: {err}")))?;
        let mut content = String::new();
        let read = if path.extension() == Some("gz") {
            GzDecoder::new(file).read_to_string(&mut content)
        } else {
            file.read_to_string(&mut content)
        };
        read.map_err(|err| OpsError::Tsv(format!("{path}: {err}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, OpsError> {
        let mut lines = content
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| OpsError::Tsv("file has no header row".to_string()))?;
        let headers = header_line
            .split('\t')
            .map(|cell| cell.trim().to_string())
            .collect::<Vec<_>>();
        if headers.iter().any(String::is_empty) {
            return Err(OpsError::Tsv("header row has an empty column name".to_string()));
        }

        let mut rows = Vec::new();
        for (index, line) in lines {
            let cells = line.split('\t').map(str::to_string).collect::<Vec<_>>();
            if cells.len() != headers.len() {
                return Err(OpsError::Tsv(format!(
                    "line {} has {} columns, header has {}",
                    index + 1,
                    cells.len(),
                    headers.len()
                )));
            }
            rows.push(cells);
        }
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entity type named by the first header (`entity:sample_id` or
    /// `sample_id`), unless overridden.
    pub fn entity_type(&self, entity_type_override: Option<&str>) -> Result<String, OpsError> {
        if let Some(entity_type) = entity_type_override {
            return Ok(entity_type.to_string());
        }
        let first = &self.headers[0];
        let bare = first.strip_prefix("entity:").unwrap_or(first);
        bare.strip_suffix("_id")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                OpsError::Tsv(format!(
                    "first column {first} does not name an entity type (expected entity:<type>_id)"
                ))
            })
    }

    pub fn to_upsert_ops(
        &self,
        entity_type_override: Option<&str>,
    ) -> Result<Vec<UpsertOp>, OpsError> {
        let entity_type = self.entity_type(entity_type_override)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let name = row[0].trim();
                if name.is_empty() {
                    return Err(OpsError::Tsv(format!("row {} has an empty entity id", index + 1)));
                }
                let operations = self.headers[1..]
                    .iter()
                    .zip(&row[1..])
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(header, value)| {
                        AttributeOp::add_update(header, Value::String(value.clone()))
                    })
                    .collect();
                Ok(UpsertOp {
                    name: name.to_string(),
                    entity_type: entity_type.clone(),
                    operations,
                })
            })
            .collect()
    }

    /// One JSON object per row for TDR array ingest. Empty cells are left
    /// out so TDR stores them as null.
    pub fn to_records(&self, infer_numbers: bool) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let record = self
                    .headers
                    .iter()
                    .zip(row)
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(header, value)| (header.clone(), cell_value(value, infer_numbers)))
                    .collect::<Map<_, _>>();
                Value::Object(record)
            })
            .collect()
    }
}

fn cell_value(value: &str, infer_numbers: bool) -> Value {
    if infer_numbers {
        if let Ok(int) = value.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Some(number) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    const SAMPLES: &str = "entity:sample_id\tcram\tdepth\r\nS1\tgs://b/S1.cram\t30\n\nS2\t\t31.5\n";

    #[test]
    fn parse_skips_blank_lines_and_crlf() {
        let table = TsvTable::parse(SAMPLES).unwrap();
        assert_eq!(table.headers, vec!["entity:sample_id", "cram", "depth"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["S2", "", "31.5"]);
    }

    #[test]
    fn ragged_row_rejected() {
        let err = TsvTable::parse("a\tb\n1\n").unwrap_err();
        assert_matches!(err, OpsError::Tsv(ref message) if message.contains("line 2"));
    }

    #[test]
    fn entity_type_from_header() {
        let table = TsvTable::parse(SAMPLES).unwrap();
        assert_eq!(table.entity_type(None).unwrap(), "sample");
        assert_eq!(table.entity_type(Some("participant")).unwrap(), "participant");

        let bare = TsvTable::parse("subject_id\tage\nP1\t40\n").unwrap();
        assert_eq!(bare.entity_type(None).unwrap(), "subject");

        let bad = TsvTable::parse("name\tage\nP1\t40\n").unwrap();
        assert_matches!(bad.entity_type(None).unwrap_err(), OpsError::Tsv(_));
    }

    #[test]
    fn upsert_ops_skip_empty_cells() {
        let ops = TsvTable::parse(SAMPLES).unwrap().to_upsert_ops(None).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operations.len(), 2);
        assert_eq!(ops[1].name, "S2");
        assert_eq!(ops[1].operations.len(), 1);
        assert_eq!(ops[1].operations[0].attribute_name, "depth");
    }

    #[test]
    fn records_with_number_inference() {
        let table = TsvTable::parse(SAMPLES).unwrap();
        let records = table.to_records(true);
        assert_eq!(records[0]["depth"], json!(30));
        assert_eq!(records[1]["depth"], json!(31.5));
        assert!(records[1].get("cram").is_none());

        let plain = table.to_records(false);
        assert_eq!(plain[0]["depth"], json!("30"));
    }
}
