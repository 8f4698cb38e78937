//! Grist REST API reader.

use crate::config::{ApiConfig, LogicalTable, Mapping};
use crate::source::{RawTables, Row, Table, TableSource};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("orgmap/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Reads the five tables through `GET /api/docs/{doc}/tables/{table}/records`.
#[derive(Debug, Clone)]
pub struct GristApi {
    config: ApiConfig,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: Value,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

impl GristApi {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    fn records_url(&self, table: &str) -> String {
        format!(
            "{}/api/docs/{}/tables/{}/records",
            self.config.base_url, self.config.doc_id, table
        )
    }

    fn fetch_table(&self, name: &str) -> Result<Table> {
        let response = ureq::get(&self.records_url(name))
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("Accept", "application/json")
            .set("User-Agent", USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .call();

        match response {
            Ok(resp) => {
                let body: RecordsResponse = resp
                    .into_json()
                    .map_err(|e| Error::Http(format!("bad records payload for {}: {}", name, e)))?;
                Ok(Table::from_rows(name, flatten_records(body.records)))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let snippet: String = body.chars().take(300).collect();
                Err(Error::Http(format!(
                    "Grist API HTTP {} on {}: {}",
                    code, name, snippet
                )))
            }
            Err(e) => Err(Error::Http(format!("Grist API request for {} failed: {}", name, e))),
        }
    }
}

/// Flatten `{id, fields{...}}` records into rows carrying their `id`.
fn flatten_records(records: Vec<Record>) -> Vec<Row> {
    records
        .into_iter()
        .map(|record| {
            let mut row = Row::new();
            row.insert("id".to_string(), record.id);
            for (key, value) in record.fields {
                if key != "id" {
                    row.insert(key, value);
                }
            }
            row
        })
        .collect()
}

impl TableSource for GristApi {
    fn label(&self) -> String {
        "Grist API".to_string()
    }

    fn load(&self, mapping: &Mapping) -> Result<RawTables> {
        let mut loaded = Vec::with_capacity(LogicalTable::ALL.len());
        for table in LogicalTable::ALL {
            let name = mapping.table(table);
            let t = self.fetch_table(name)?;
            tracing::debug!(table = %table, name, rows = t.len(), "fetched table");
            loaded.push(t);
        }
        RawTables::from_loaded(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_records() {
        let body: RecordsResponse = serde_json::from_value(json!({
            "records": [
                {"id": 1, "fields": {"Nom": "Team Alpha", "Epics": ["L", 100]}},
                {"id": 2}
            ]
        }))
        .unwrap();
        let rows = flatten_records(body.records);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["Nom"], json!("Team Alpha"));
        assert_eq!(rows[1]["id"], json!(2));
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn test_records_url() {
        let api = GristApi::new(ApiConfig {
            base_url: "https://grist.example.org".to_string(),
            doc_id: "abc".to_string(),
            api_key: "k".to_string(),
        });
        assert_eq!(
            api.records_url("Equipes"),
            "https://grist.example.org/api/docs/abc/tables/Equipes/records"
        );
    }

    #[test]
    fn test_unreachable_host_is_http_error() {
        let api = GristApi::new(ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            doc_id: "abc".to_string(),
            api_key: "k".to_string(),
        });
        let err = api.load(&Mapping::embedded().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
