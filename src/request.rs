//! URL construction for metadata documents and data pulls.

use crate::error::{CensusError, Result};
use crate::selection::{Field, Selection, Table, WILDCARD};
use crate::util::{append_query, urljoin};

/// The `{year}/{api}/{database}[/{table}]` part of every dataset URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetPath {
    pub year: String,
    pub api: String,
    pub database: String,
    /// `None` and the `detail` sentinel both address the database endpoint.
    pub table: Option<Table>,
}

impl DatasetPath {
    pub fn new(
        year: impl Into<String>,
        api: impl Into<String>,
        database: impl Into<String>,
        table: Option<Table>,
    ) -> Self {
        Self {
            year: year.into(),
            api: api.into(),
            database: database.into(),
            table,
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec![self.year.as_str(), self.api.as_str(), self.database.as_str()];
        if let Some(table) = self.table.as_ref().and_then(Table::segment) {
            segments.push(table);
        }
        segments
    }

    pub fn url(&self, base: &str) -> String {
        urljoin(base, &self.segments().join("/"))
    }

    /// `{dataset}/{endpoint}.json`, e.g. `variables` or `geography`.
    pub fn document_url(&self, base: &str, endpoint: &str) -> String {
        format!("{}/{}.json", self.url(base), endpoint)
    }

    /// `{dataset}?get=..&for={geography}:{values}&key={key}`.
    pub fn query_url(
        &self,
        base: &str,
        get: &[String],
        geography: &str,
        values: &[String],
        key: &str,
    ) -> String {
        let get = get.join(",");
        let geo = format!("{}:{}", geography, values.join(","));
        append_query(
            &self.url(base),
            &[("get", &get), ("for", &geo), ("key", key)],
        )
    }
}

/// Builds the data-pull URL for a configured selection.
///
/// Every missing required field is reported at once.
pub fn data_url(base: &str, selection: &Selection, key: &str) -> Result<String> {
    let variables = selection.variables().filter(|v| !v.is_empty());

    let (Some(year), Some(api), Some(database), Some(variables), Some(geography)) = (
        selection.year(),
        selection.api(),
        selection.database(),
        variables,
        selection.geography(),
    ) else {
        let missing = [
            (Field::Year, selection.year().is_some()),
            (Field::Api, selection.api().is_some()),
            (Field::Database, selection.database().is_some()),
            (Field::Variables, variables.is_some()),
            (Field::Geography, selection.geography().is_some()),
        ]
        .into_iter()
        .filter_map(|(field, set)| (!set).then_some(field))
        .collect();
        return Err(CensusError::IncompleteConfiguration { missing });
    };

    let wildcard = [WILDCARD.to_string()];
    let values = selection.geography_values().unwrap_or(&wildcard);
    let path = DatasetPath::new(year, api, database, selection.table().cloned());
    Ok(path.query_url(base, variables, geography, values, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.census.gov/data";

    fn detail_selection() -> Selection {
        Selection {
            year: Some("2020".into()),
            api: Some("acs".into()),
            database: Some("acs5".into()),
            table: Some(Table::Detail),
            concepts: None,
            variables: Some(vec!["NAME".into()]),
            geography: Some("state".into()),
            geography_values: Some(vec![WILDCARD.into()]),
        }
    }

    #[test]
    fn test_detail_table_has_no_segment() {
        let url = data_url(BASE, &detail_selection(), "TOKEN").unwrap();
        assert_eq!(
            url,
            "https://api.census.gov/data/2020/acs/acs5?get=NAME&for=state:*&key=TOKEN"
        );
    }

    #[test]
    fn test_named_table_and_value_list() {
        let mut selection = detail_selection();
        selection.table = Some(Table::Named("profile".into()));
        selection.variables = Some(vec!["NAME".into(), "DP05_0001E".into()]);
        selection.geography_values = Some(vec!["01".into(), "02".into()]);
        let url = data_url(BASE, &selection, "k").unwrap();
        assert_eq!(
            url,
            "https://api.census.gov/data/2020/acs/acs5/profile?get=NAME,DP05_0001E&for=state:01,02&key=k"
        );
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let mut selection = detail_selection();
        selection.variables = Some(Vec::new());
        selection.geography = None;
        match data_url(BASE, &selection, "k") {
            Err(CensusError::IncompleteConfiguration { missing }) => {
                assert_eq!(missing, vec![Field::Variables, Field::Geography]);
            }
            other => panic!("expected IncompleteConfiguration, got {:?}", other),
        }
        assert!(data_url(BASE, &Selection::new(), "k").is_err());
    }

    #[test]
    fn test_document_urls() {
        let path = DatasetPath::new("2020", "acs", "acs5", Some(Table::Named("subject".into())));
        assert_eq!(
            path.document_url(BASE, "variables"),
            "https://api.census.gov/data/2020/acs/acs5/subject/variables.json"
        );
        let detail = DatasetPath::new("2020", "acs", "acs5", Some(Table::Detail));
        assert_eq!(
            detail.document_url(BASE, "geography"),
            "https://api.census.gov/data/2020/acs/acs5/geography.json"
        );
    }
}
