//! Embedded default column mapping.
//!
//! Compiled into the binary and used as the base layer of mapping resolution.
//! The names match the column layout of the reference Grist org document.

use crate::config::ConfigError;
use crate::config::schema::MappingLayer;

/// Default mapping document (KDL).
pub const DEFAULT_MAPPING_KDL: &str = include_str!("embedded/mapping.kdl");

/// Parse the embedded mapping into a layer.
pub fn default_layer() -> Result<MappingLayer, ConfigError> {
    MappingLayer::parse(DEFAULT_MAPPING_KDL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogicalTable, Mapping};

    #[test]
    fn test_embedded_mapping_parses() {
        let layer = default_layer().unwrap();
        assert_eq!(layer.get("tables.assignments"), Some("Affectations"));
        assert_eq!(layer.get("roles.po"), Some("PO"));
    }

    #[test]
    fn test_embedded_mapping_is_complete() {
        let mapping = Mapping::from_layer(&default_layer().unwrap()).unwrap();
        for table in LogicalTable::ALL {
            assert!(!mapping.table(table).is_empty(), "{table}");
        }
        assert_eq!(mapping.columns.assignment_charge, "Charge");
    }
}
