//! Deployment-supplied catalog of saved LQL queries.
//!
//! The catalog declares, per saved query id, which LQL parameters a caller
//! must bind. It is a JSON file such as:
//!
//! ```json
//! {
//!   "queries": {
//!     "samv_out_of_canada": {
//!       "description": "EC2 instances running outside ca-central-1",
//!       "requiredParameters": ["StartTimeRange", "EndTimeRange"]
//!     }
//!   }
//! }
//! ```
//!
//! Queries absent from the catalog are still accepted; the platform has the
//! final word on their parameters.

use crate::error::{ArgumentError, ConfigError};
use crate::query::builder::{END_TIME_ARG, START_TIME_ARG};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct QueryCatalog {
    #[serde(default)]
    queries: BTreeMap<String, CatalogEntry>,
}

impl QueryCatalog {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text)
            .map_err(|e| ConfigError::invalid("query_catalog", format!("invalid JSON: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::invalid(
                "query_catalog",
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn get(&self, query_id: &str) -> Option<&CatalogEntry> {
        self.queries.get(query_id)
    }

    /// Check that every parameter the catalog requires for `query_id` is
    /// bound. The time-range parameters are also satisfied by a time window.
    pub fn check(
        &self,
        query_id: &str,
        parameters: &BTreeMap<String, String>,
        has_time_range: bool,
    ) -> Result<(), ArgumentError> {
        let Some(entry) = self.get(query_id) else {
            return Ok(());
        };
        let missing: Vec<&str> = entry
            .required_parameters
            .iter()
            .map(String::as_str)
            .filter(|name| {
                let by_window = has_time_range && (*name == START_TIME_ARG || *name == END_TIME_ARG);
                !by_window && !parameters.contains_key(*name)
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ArgumentError::invalid(format!(
                "query '{}' requires parameters: {}",
                query_id,
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"{
        "queries": {
            "samv_out_of_canada": {
                "description": "EC2 outside Canada",
                "requiredParameters": ["StartTimeRange", "EndTimeRange", "Region"]
            },
            "no_params": {}
        }
    }"#;

    #[test]
    fn test_parse_and_lookup() {
        let catalog = QueryCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        let entry = catalog.get("samv_out_of_canada").unwrap();
        assert_eq!(entry.required_parameters.len(), 3);
        assert!(catalog.get("no_params").unwrap().required_parameters.is_empty());
    }

    #[test]
    fn test_required_parameters_enforced() {
        let catalog = QueryCatalog::from_json(CATALOG).unwrap();
        let mut params = BTreeMap::new();

        let err = catalog.check("samv_out_of_canada", &params, false).unwrap_err();
        assert!(err.to_string().contains("StartTimeRange, EndTimeRange, Region"));

        let err = catalog.check("samv_out_of_canada", &params, true).unwrap_err();
        assert!(err.to_string().ends_with("requires parameters: Region"));

        params.insert("Region".to_string(), "ca-central-1".to_string());
        assert!(catalog.check("samv_out_of_canada", &params, true).is_ok());
    }

    #[test]
    fn test_unknown_query_is_accepted() {
        let catalog = QueryCatalog::default();
        assert!(catalog.check("anything", &BTreeMap::new(), false).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        let catalog = QueryCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        let missing = QueryCatalog::load(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(missing.to_string().contains("query_catalog"));
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(QueryCatalog::from_json("{not json").is_err());
        assert!(QueryCatalog::from_json(r#"{"queries": []}"#).is_err());
    }
}
