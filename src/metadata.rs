//! Per-dataset metadata fetched live from the API.
//!
//! Nothing here is cached: every call is a fresh request, so results always
//! reflect the remote state for the path asked about. All network access of
//! a session goes through [`MetadataResolver`], which is the place to add a
//! caching layer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CensusError, Result};
use crate::request::DatasetPath;
use crate::selection::WILDCARD;
use crate::table::{DataTable, Rows, cell_text, rows_from_json};
use crate::transport::{Transport, fetch};

/// Attribute name to value for one variable (`label`, `predicateType`, ...).
pub type VariableAttributes = IndexMap<String, Value>;

/// A variable record inside a [`ConceptMap`]: its attributes plus a
/// `variable` entry holding its name, without the `concept` entry.
pub type VariableDescriptor = IndexMap<String, Value>;

/// Variable name to attributes, in document order.
pub type VariableDefinitions = IndexMap<String, VariableAttributes>;

#[derive(Debug, Deserialize)]
struct VariablesDocument {
    variables: VariableDefinitions,
}

#[derive(Debug, Deserialize)]
struct GeographyDocument {
    #[serde(default)]
    fips: Vec<GeographyDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographyDescriptor {
    pub name: String,
    /// Enclosing geographies that must accompany this one in a query.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Required geographies that accept `*`.
    #[serde(default)]
    pub wildcard: Vec<String>,
    #[serde(default, rename = "geoLevelDisplay")]
    pub level: Option<String>,
}

/// Concept name to the variables grouped under it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConceptMap(IndexMap<String, Vec<VariableDescriptor>>);

impl ConceptMap {
    /// Groups definitions by their `concept` attribute. Variables without a
    /// concept are left out.
    pub fn from_definitions(definitions: &VariableDefinitions) -> Self {
        let mut concepts: IndexMap<String, Vec<VariableDescriptor>> = IndexMap::new();
        for (name, attributes) in definitions {
            let Some(concept) = attributes.get("concept") else {
                continue;
            };
            let mut descriptor = VariableDescriptor::with_capacity(attributes.len());
            descriptor.insert("variable".to_string(), Value::String(name.clone()));
            for (key, value) in attributes {
                if key != "concept" {
                    descriptor.insert(key.clone(), value.clone());
                }
            }
            concepts
                .entry(cell_text(concept))
                .or_default()
                .push(descriptor);
        }
        Self(concepts)
    }

    pub fn concepts(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get(&self, concept: &str) -> Option<&[VariableDescriptor]> {
        self.0.get(concept).map(Vec::as_slice)
    }

    pub fn contains(&self, concept: &str) -> bool {
        self.0.contains_key(concept)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[VariableDescriptor])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Keeps only the listed concepts, in the listed order.
    pub fn filtered<S: AsRef<str>>(&self, concepts: &[S]) -> Self {
        Self(
            concepts
                .iter()
                .filter_map(|c| {
                    self.0
                        .get_key_value(c.as_ref())
                        .map(|(k, v)| (k.clone(), v.clone()))
                })
                .collect(),
        )
    }

    /// Every variable name, in concept order.
    pub fn variable_names(&self) -> Vec<String> {
        self.0
            .values()
            .flatten()
            .filter_map(|d| d.get("variable").map(cell_text))
            .collect()
    }

    /// One row per variable: a leading `concept` column, then every attribute
    /// seen across variables in first-seen order. Absent attributes are empty.
    pub fn to_table(&self) -> DataTable {
        let mut header: Vec<String> = vec!["concept".to_string()];
        for descriptor in self.0.values().flatten() {
            for key in descriptor.keys() {
                if !header.contains(key) {
                    header.push(key.clone());
                }
            }
        }

        let mut columns: IndexMap<String, Vec<String>> =
            header.iter().map(|h| (h.clone(), Vec::new())).collect();
        for (concept, descriptors) in &self.0 {
            for descriptor in descriptors {
                for (name, values) in columns.iter_mut() {
                    let cell = if name == "concept" {
                        concept.clone()
                    } else {
                        descriptor.get(name).map(cell_text).unwrap_or_default()
                    };
                    values.push(cell);
                }
            }
        }
        DataTable::from_columns(columns)
    }
}

/// Fetches and normalizes dataset metadata through a [`Transport`].
pub struct MetadataResolver {
    base_url: String,
    transport: Box<dyn Transport + Send>,
}

impl MetadataResolver {
    pub fn new(base_url: impl Into<String>, transport: Box<dyn Transport + Send>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetch_variable_definitions(&self, path: &DatasetPath) -> Result<VariableDefinitions> {
        let url = path.document_url(&self.base_url, "variables");
        debug!(%url, "fetching variable definitions");
        let doc: VariablesDocument = fetch(self.transport.as_ref(), &url)?;
        Ok(doc.variables)
    }

    pub fn fetch_concept_map(&self, path: &DatasetPath) -> Result<ConceptMap> {
        Ok(ConceptMap::from_definitions(
            &self.fetch_variable_definitions(path)?,
        ))
    }

    pub fn fetch_geography_definitions(
        &self,
        path: &DatasetPath,
    ) -> Result<Vec<GeographyDescriptor>> {
        let url = path.document_url(&self.base_url, "geography");
        debug!(%url, "fetching geography definitions");
        let doc: GeographyDocument = fetch(self.transport.as_ref(), &url)?;
        Ok(doc.fips)
    }

    /// `NAME` of every value of `geography`, as a table with a `NAME` column
    /// and a column named after the geography holding the codes.
    pub fn fetch_geography_values(
        &self,
        path: &DatasetPath,
        geography: &str,
        key: &str,
    ) -> Result<DataTable> {
        let url = path.query_url(
            &self.base_url,
            &["NAME".to_string()],
            geography,
            &[WILDCARD.to_string()],
            key,
        );
        let rows = self.fetch_rows(&url)?;
        let table = DataTable::from_rows(&rows).map_err(|e| e.at_url(&url))?;
        for column in ["NAME", geography] {
            if table.column(column).is_none() {
                return Err(CensusError::transport(
                    &url,
                    format!("NAME lookup response has no `{}` column", column),
                ));
            }
        }
        Ok(table)
    }

    pub fn fetch_rows(&self, url: &str) -> Result<Rows> {
        let value = self.transport.get_json(url)?;
        rows_from_json(&value).map_err(|e| e.at_url(url))
    }

    pub fn fetch_text(&self, url: &str) -> Result<String> {
        self.transport.get_text(url)
    }

    pub(crate) fn fetch_document<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        fetch(self.transport.as_ref(), url)
    }
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Looks up the `label` attribute of `variable`.
pub fn variable_label(definitions: &VariableDefinitions, variable: &str) -> Result<String> {
    definitions
        .get(variable)
        .and_then(|attrs| attrs.get("label"))
        .map(cell_text)
        .ok_or_else(|| CensusError::MissingLabel {
            kind: "variable",
            key: variable.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Table;
    use crate::transport::MockTransport;
    use serde_json::json;

    const BASE: &str = "https://api.census.gov/data";

    fn definitions() -> VariableDefinitions {
        serde_json::from_value(json!({
            "NAME": {"label": "Geographic Area Name", "predicateType": "string"},
            "B01001_001E": {"label": "Estimate!!Total:", "concept": "SEX BY AGE", "group": "B01001"},
            "B01001_002E": {"label": "Estimate!!Total:!!Male:", "concept": "SEX BY AGE"},
            "B19013_001E": {"label": "Median household income", "concept": "MEDIAN HOUSEHOLD INCOME"}
        }))
        .unwrap()
    }

    #[test]
    fn test_concept_grouping_strips_concept_key() {
        let map = ConceptMap::from_definitions(&definitions());
        assert_eq!(map.concepts(), vec!["SEX BY AGE", "MEDIAN HOUSEHOLD INCOME"]);

        let sex_by_age = map.get("SEX BY AGE").unwrap();
        assert_eq!(sex_by_age.len(), 2);
        assert_eq!(sex_by_age[0]["variable"], "B01001_001E");
        assert_eq!(sex_by_age[0].get_index(0).unwrap().0, "variable");
        assert!(!sex_by_age[0].contains_key("concept"));
        assert_eq!(sex_by_age[0]["group"], "B01001");
    }

    #[test]
    fn test_variables_without_concept_are_omitted() {
        let map = ConceptMap::from_definitions(&definitions());
        assert!(!map.variable_names().contains(&"NAME".to_string()));
        assert_eq!(map.variable_names().len(), 3);
    }

    #[test]
    fn test_filtered_follows_requested_order() {
        let map = ConceptMap::from_definitions(&definitions());
        let filtered = map.filtered(&["MEDIAN HOUSEHOLD INCOME", "UNKNOWN", "SEX BY AGE"]);
        assert_eq!(
            filtered.variable_names(),
            vec!["B19013_001E", "B01001_001E", "B01001_002E"]
        );
    }

    #[test]
    fn test_concept_table_fills_missing_attributes() {
        let map = ConceptMap::from_definitions(&definitions());
        let table = map.to_table();
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["concept", "variable", "label", "group"]
        );
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column("group").unwrap(), ["B01001", "", ""]);
        assert_eq!(
            table.column("concept").unwrap(),
            ["SEX BY AGE", "SEX BY AGE", "MEDIAN HOUSEHOLD INCOME"]
        );
    }

    #[test]
    fn test_variable_label_lookup() {
        let defs = definitions();
        assert_eq!(variable_label(&defs, "NAME").unwrap(), "Geographic Area Name");
        assert!(matches!(
            variable_label(&defs, "B99999_001E"),
            Err(CensusError::MissingLabel { .. })
        ));
    }

    #[test]
    fn test_resolver_fetches_documents() {
        let path = DatasetPath::new("2020", "acs", "acs5", Some(Table::Named("profile".into())));
        let mock = MockTransport::new()
            .with_json(
                format!("{}/2020/acs/acs5/profile/geography.json", BASE),
                &json!({"fips": [
                    {"name": "us", "geoLevelDisplay": "010"},
                    {"name": "county", "requires": ["state"], "wildcard": ["state"]}
                ]}),
            )
            .with_json(
                format!("{}/2020/acs/acs5/profile?get=NAME&for=state:*&key=k", BASE),
                &json!([["NAME", "state"], ["Alabama", "01"]]),
            );
        let resolver = MetadataResolver::new(BASE, Box::new(mock));

        let geos = resolver.fetch_geography_definitions(&path).unwrap();
        assert_eq!(geos.len(), 2);
        assert_eq!(geos[0].level.as_deref(), Some("010"));
        assert_eq!(geos[1].requires, vec!["state"]);

        let values = resolver.fetch_geography_values(&path, "state", "k").unwrap();
        assert_eq!(values.column("NAME").unwrap(), ["Alabama"]);
    }

    #[test]
    fn test_geography_values_without_code_column_fail() {
        let path = DatasetPath::new("2020", "acs", "acs5", Some(Table::Detail));
        let mock = MockTransport::new().with_json(
            format!("{}/2020/acs/acs5?get=NAME&for=county:*&key=k", BASE),
            &json!([["NAME", "state"], ["Autauga County, Alabama", "01"]]),
        );
        let resolver = MetadataResolver::new(BASE, Box::new(mock));

        let err = resolver
            .fetch_geography_values(&path, "county", "k")
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("no `county` column"));
        assert!(!err.to_string().contains("key=k"));
    }
}
