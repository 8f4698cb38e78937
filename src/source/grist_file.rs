//! `.grist` document reader.
//!
//! A `.grist` file is a SQLite database with one table per Grist table.

use crate::config::{LogicalTable, Mapping};
use crate::source::{RawTables, Row, Table, TableSource};
use crate::{Error, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::PathBuf;

/// Reads the five tables from a local `.grist` file.
#[derive(Debug, Clone)]
pub struct GristFile {
    path: PathBuf,
}

impl GristFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_table(&self, conn: &Connection, name: &str) -> Result<Table> {
        let sql = format!("SELECT * FROM \"{}\"", name.replace('"', "\"\""));
        let context = |e: rusqlite::Error| {
            Error::SourceUnavailable(format!(
                "cannot read table {:?} from {}: {}",
                name,
                self.path.display(),
                e
            ))
        };

        let mut stmt = conn.prepare(&sql).map_err(context)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut out = Row::new();
                for (i, column) in columns.iter().enumerate() {
                    out.insert(column.clone(), sql_to_json(row.get_ref(i)?));
                }
                Ok(out)
            })
            .map_err(context)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(context)?;

        Ok(Table {
            name: name.to_string(),
            columns,
            rows,
        })
    }
}

/// Convert one SQLite cell to JSON.
///
/// Non-finite reals and blobs have no JSON form and become null.
fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

impl TableSource for GristFile {
    fn label(&self) -> String {
        format!("file ({})", self.path.display())
    }

    fn load(&self, mapping: &Mapping) -> Result<RawTables> {
        if !self.path.exists() {
            return Err(Error::SourceUnavailable(format!(
                ".grist file not found: {}",
                self.path.display()
            )));
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut loaded = Vec::with_capacity(LogicalTable::ALL.len());
        for table in LogicalTable::ALL {
            let name = mapping.table(table);
            let t = self.read_table(&conn, name)?;
            tracing::debug!(table = %table, name, rows = t.len(), "read table");
            loaded.push(t);
        }
        RawTables::from_loaded(loaded)
    }
}
