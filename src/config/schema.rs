//! KDL schema for mapping.kdl.
//!
//! This module provides:
//! - [`MappingLayer`] - one parsed mapping file, keyed by `section.key` paths
//! - [`Mapping`] - the resolved, validated mapping the model builder consumes
//! - Serialization to and from KDL
//!
//! # KDL Schema
//!
//! ```kdl
//! tables {
//!     teams "Equipes"
//!     people "Personnes"
//!     epics "Epics"
//!     features "Features"
//!     assignments "Affectations"
//! }
//! columns {
//!     person-label "Nom"
//!     assignment-charge "Charge"
//!     // ...
//! }
//! roles {
//!     pm "PM"
//!     po "PO"
//! }
//! ```

use crate::config::ConfigError;
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The five tables the model is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalTable {
    Teams,
    People,
    Epics,
    Features,
    Assignments,
}

impl LogicalTable {
    /// Every logical table, in load order.
    pub const ALL: [LogicalTable; 5] = [
        LogicalTable::Teams,
        LogicalTable::People,
        LogicalTable::Epics,
        LogicalTable::Features,
        LogicalTable::Assignments,
    ];

    /// Key under the `tables` section.
    pub fn key(&self) -> &'static str {
        match self {
            LogicalTable::Teams => "teams",
            LogicalTable::People => "people",
            LogicalTable::Epics => "epics",
            LogicalTable::Features => "features",
            LogicalTable::Assignments => "assignments",
        }
    }
}

impl std::fmt::Display for LogicalTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Top-level sections, in output order.
pub const SECTIONS: [&str; 3] = ["tables", "columns", "roles"];

/// Keys accepted in the `columns` section.
pub const COLUMN_KEYS: [&str; 15] = [
    "person-label",
    "team-name",
    "team-epics",
    "epic-name",
    "epic-description",
    "epic-intention-current",
    "epic-intention-next",
    "feature-epic",
    "feature-name",
    "feature-period",
    "assignment-team",
    "assignment-epic",
    "assignment-person",
    "assignment-charge",
    "assignment-role",
];

/// Keys accepted in the `roles` section.
pub const ROLE_KEYS: [&str; 2] = ["pm", "po"];

const TABLE_KEYS: [&str; 5] = ["teams", "people", "epics", "features", "assignments"];

fn section_keys(section: &str) -> Option<&'static [&'static str]> {
    match section {
        "tables" => Some(&TABLE_KEYS),
        "columns" => Some(&COLUMN_KEYS),
        "roles" => Some(&ROLE_KEYS),
        _ => None,
    }
}

/// One mapping file's worth of settings.
///
/// Only the keys present in the file are stored, so layers can be merged
/// key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingLayer {
    entries: BTreeMap<String, String>,
}

impl MappingLayer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a layer from KDL text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e: kdl::KdlError| ConfigError::Parse(e.to_string()))?;
        Self::from_kdl(&doc)
    }

    /// Read a layer from a parsed KDL document.
    ///
    /// Unknown sections or keys are rejected so typos surface immediately.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self, ConfigError> {
        let mut layer = Self::new();

        for section in doc.nodes() {
            let section_name = section.name().value();
            let allowed = section_keys(section_name).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown section '{}'", section_name))
            })?;

            let Some(children) = section.children() else {
                continue;
            };

            for node in children.nodes() {
                let key = node.name().value();
                if !allowed.contains(&key) {
                    return Err(ConfigError::Invalid(format!(
                        "unknown key '{}.{}'",
                        section_name, key
                    )));
                }
                let value = node
                    .entries()
                    .iter()
                    .find(|e| e.name().is_none())
                    .and_then(|e| e.value().as_string())
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "'{}.{}' expects a string value",
                            section_name, key
                        ))
                    })?;
                layer.set(section_name, key, value);
            }
        }

        Ok(layer)
    }

    /// Convert the layer to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        for section in SECTIONS {
            let prefix = format!("{}.", section);
            let mut children = KdlDocument::new();
            for (path, value) in &self.entries {
                if let Some(key) = path.strip_prefix(&prefix) {
                    let mut node = KdlNode::new(key);
                    node.push(KdlEntry::new(KdlValue::String(value.clone())));
                    children.nodes_mut().push(node);
                }
            }
            if children.nodes().is_empty() {
                continue;
            }
            let mut node = KdlNode::new(section);
            node.set_children(children);
            doc.nodes_mut().push(node);
        }

        doc.autoformat();
        doc
    }

    /// Look up a `section.key` path.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.entries
            .insert(format!("{}.{}", section, key), value.to_string());
    }

    /// Paths set in this layer, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another layer into this one.
    /// Keys present in `other` override keys in `self`.
    pub fn merge(&mut self, other: &MappingLayer) {
        for (path, value) in &other.entries {
            self.entries.insert(path.clone(), value.clone());
        }
    }
}

/// Actual table names in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub teams: String,
    pub people: String,
    pub epics: String,
    pub features: String,
    pub assignments: String,
}

/// Actual column names in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    /// People: display name
    pub person_label: String,
    /// Teams: display name
    pub team_name: String,
    /// Teams: reference list of owned epics
    pub team_epics: String,
    pub epic_name: String,
    pub epic_description: String,
    /// Epics: intention for the current period
    pub epic_intention_current: String,
    /// Epics: intention for the next period
    pub epic_intention_next: String,
    /// Features: reference to the parent epic
    pub feature_epic: String,
    pub feature_name: String,
    /// Features: period tag
    pub feature_period: String,
    pub assignment_team: String,
    pub assignment_epic: String,
    pub assignment_person: String,
    pub assignment_charge: String,
    pub assignment_role: String,
}

/// Literal role strings meaning product manager and product owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTokens {
    pub pm: String,
    pub po: String,
}

/// Resolved column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub tables: TableNames,
    pub columns: ColumnNames,
    pub roles: RoleTokens,
}

impl Mapping {
    /// Build a mapping from a fully merged layer.
    pub fn from_layer(layer: &MappingLayer) -> Result<Self, ConfigError> {
        let table = |t: LogicalTable| -> Result<String, ConfigError> {
            layer
                .get(&format!("tables.{}", t.key()))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingTable {
                    table: t.key().to_string(),
                })
        };
        let column = |key: &str| -> Result<String, ConfigError> {
            layer
                .get(&format!("columns.{}", key))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ConfigError::Invalid(format!("columns.{} is not set", key)))
        };
        let role = |key: &str, default: &str| -> String {
            layer
                .get(&format!("roles.{}", key))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let mapping = Mapping {
            tables: TableNames {
                teams: table(LogicalTable::Teams)?,
                people: table(LogicalTable::People)?,
                epics: table(LogicalTable::Epics)?,
                features: table(LogicalTable::Features)?,
                assignments: table(LogicalTable::Assignments)?,
            },
            columns: ColumnNames {
                person_label: column("person-label")?,
                team_name: column("team-name")?,
                team_epics: column("team-epics")?,
                epic_name: column("epic-name")?,
                epic_description: column("epic-description")?,
                epic_intention_current: column("epic-intention-current")?,
                epic_intention_next: column("epic-intention-next")?,
                feature_epic: column("feature-epic")?,
                feature_name: column("feature-name")?,
                feature_period: column("feature-period")?,
                assignment_team: column("assignment-team")?,
                assignment_epic: column("assignment-epic")?,
                assignment_person: column("assignment-person")?,
                assignment_charge: column("assignment-charge")?,
                assignment_role: column("assignment-role")?,
            },
            roles: RoleTokens {
                pm: role("pm", "PM"),
                po: role("po", "PO"),
            },
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// The embedded default mapping.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_layer(&crate::config::embedded::default_layer()?)
    }

    /// Check that every logical table is named.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for table in LogicalTable::ALL {
            if self.table(table).trim().is_empty() {
                return Err(ConfigError::MissingTable {
                    table: table.key().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Actual name of a logical table.
    pub fn table(&self, table: LogicalTable) -> &str {
        match table {
            LogicalTable::Teams => &self.tables.teams,
            LogicalTable::People => &self.tables.people,
            LogicalTable::Epics => &self.tables.epics,
            LogicalTable::Features => &self.tables.features,
            LogicalTable::Assignments => &self.tables.assignments,
        }
    }
}
