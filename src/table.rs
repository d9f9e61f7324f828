//! Column-oriented reshaping of the API's row-oriented responses.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CensusError, Result};

/// Rows as returned by the API: a header row followed by data rows.
pub type Rows = Vec<Vec<String>>;

/// Column name to that column's values, in source row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DataTable {
    columns: IndexMap<String, Vec<String>>,
}

impl DataTable {
    /// Builds a table from a header row plus data rows.
    ///
    /// A response with only a header yields empty columns.
    pub fn from_rows(rows: &[Vec<String>]) -> Result<Self> {
        let Some((header, data)) = rows.split_first() else {
            return Err(malformed("response has no header row"));
        };

        let mut columns: IndexMap<String, Vec<String>> = IndexMap::with_capacity(header.len());
        for name in header {
            if columns
                .insert(name.clone(), Vec::with_capacity(data.len()))
                .is_some()
            {
                return Err(CensusError::ColumnCollision(name.clone()));
            }
        }

        for (i, row) in data.iter().enumerate() {
            if row.len() != header.len() {
                return Err(malformed(&format!(
                    "row {} has {} cells, header has {}",
                    i + 1,
                    row.len(),
                    header.len()
                )));
            }
            for (values, cell) in columns.values_mut().zip(row) {
                values.push(cell.clone());
            }
        }

        Ok(Self { columns })
    }

    pub(crate) fn from_columns(columns: IndexMap<String, Vec<String>>) -> Self {
        Self { columns }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn columns(&self) -> &IndexMap<String, Vec<String>> {
        &self.columns
    }

    pub fn into_columns(self) -> IndexMap<String, Vec<String>> {
        self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, v)| v.len())
    }

    /// Renames `from` to `to` in place, keeping the column's position.
    /// Returns `false` when `from` is not a column.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<bool> {
        if from == to {
            return Ok(self.columns.contains_key(from));
        }
        if self.columns.contains_key(to) {
            return Err(CensusError::ColumnCollision(to.to_string()));
        }
        let Some(index) = self.columns.get_index_of(from) else {
            return Ok(false);
        };
        let Some(values) = self.columns.shift_remove(from) else {
            return Ok(false);
        };
        self.columns.shift_insert(index, to.to_string(), values);
        Ok(true)
    }

    /// Replaces every value of `column` through `lookup`. A missing column
    /// or a value with no entry fails as a missing `kind` label.
    pub fn relabel_values(
        &mut self,
        column: &str,
        lookup: &HashMap<String, String>,
        kind: &'static str,
    ) -> Result<()> {
        let Some(values) = self.columns.get_mut(column) else {
            return Err(CensusError::MissingLabel {
                kind,
                key: column.to_string(),
            });
        };
        for value in values.iter_mut() {
            match lookup.get(value.as_str()) {
                Some(label) => *value = label.clone(),
                None => {
                    return Err(CensusError::MissingLabel {
                        kind,
                        key: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Maps each value of `key_column` to the value in `value_column` on the
    /// same row. The first occurrence of a key wins.
    pub fn lookup(&self, key_column: &str, value_column: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        if let (Some(keys), Some(values)) = (self.column(key_column), self.column(value_column)) {
            for (k, v) in keys.iter().zip(values) {
                out.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        out
    }
}

/// Converts a JSON array-of-arrays into string rows.
///
/// Cells are normally strings; `null` becomes an empty string and any other
/// scalar is rendered as JSON text.
pub fn rows_from_json(value: &Value) -> Result<Rows> {
    let Value::Array(rows) = value else {
        return Err(malformed("response is not an array of rows"));
    };
    rows.iter()
        .map(|row| match row {
            Value::Array(cells) => Ok(cells.iter().map(cell_text).collect()),
            _ => Err(malformed("response row is not an array")),
        })
        .collect()
}

pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn malformed(reason: &str) -> CensusError {
    CensusError::Transport {
        url: String::new(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Rows {
        rows_from_json(&value).unwrap()
    }

    #[test]
    fn test_single_row_becomes_columns() {
        let table = DataTable::from_rows(&rows(json!([
            ["NAME", "B01001_001E", "state"],
            ["Alabama", "4903185", "01"]
        ])))
        .unwrap();

        let expected = json!({
            "NAME": ["Alabama"],
            "B01001_001E": ["4903185"],
            "state": ["01"]
        });
        assert_eq!(serde_json::to_value(&table).unwrap(), expected);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["NAME", "B01001_001E", "state"]
        );
    }

    #[test]
    fn test_row_order_preserved() {
        let table = DataTable::from_rows(&rows(json!([
            ["NAME", "state"],
            ["Alabama", "01"],
            ["Alaska", "02"],
            ["Arizona", "04"]
        ])))
        .unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column("state").unwrap(), ["01", "02", "04"]);
    }

    #[test]
    fn test_header_only_and_empty() {
        let table = DataTable::from_rows(&rows(json!([["NAME"]]))).unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 1);
        assert!(DataTable::from_rows(&[]).unwrap_err().is_transport());
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = DataTable::from_rows(&rows(json!([["A", "B"], ["1"]]))).unwrap_err();
        assert!(err.to_string().contains("row 1 has 1 cells"));
    }

    #[test]
    fn test_null_and_numeric_cells() {
        let parsed = rows(json!([["A", "B", "C"], [null, 12, "x"]]));
        assert_eq!(parsed[1], vec!["", "12", "x"]);
    }

    #[test]
    fn test_rename_keeps_position() {
        let mut table = DataTable::from_rows(&rows(json!([
            ["NAME", "B01001_001E", "state"],
            ["Alabama", "4903185", "01"]
        ])))
        .unwrap();
        assert!(table.rename_column("B01001_001E", "Total Population").unwrap());
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["NAME", "Total Population", "state"]
        );
        assert!(!table.rename_column("missing", "x").unwrap());
        assert!(matches!(
            table.rename_column("state", "NAME"),
            Err(CensusError::ColumnCollision(_))
        ));
    }

    #[test]
    fn test_relabel_values_and_lookup() {
        let names = DataTable::from_rows(&rows(json!([
            ["NAME", "state"],
            ["Alabama", "01"],
            ["Alaska", "02"],
            ["Duplicate", "01"]
        ])))
        .unwrap();
        let lookup = names.lookup("state", "NAME");
        assert_eq!(lookup["01"], "Alabama");

        let mut data = DataTable::from_rows(&rows(json!([["state"], ["02"], ["01"]]))).unwrap();
        data.relabel_values("state", &lookup, "geography").unwrap();
        assert_eq!(data.column("state").unwrap(), ["Alaska", "Alabama"]);

        let mut unknown = DataTable::from_rows(&rows(json!([["state"], ["99"]]))).unwrap();
        assert!(matches!(
            unknown.relabel_values("state", &lookup, "geography"),
            Err(CensusError::MissingLabel { .. })
        ));
    }

    #[test]
    fn test_relabel_values_missing_column_fails() {
        let mut data =
            DataTable::from_rows(&rows(json!([["NAME", "county"], ["Autauga", "001"]]))).unwrap();
        let lookup = HashMap::from([("01".to_string(), "Alabama".to_string())]);
        match data.relabel_values("state", &lookup, "geography") {
            Err(CensusError::MissingLabel { kind, key }) => {
                assert_eq!(kind, "geography");
                assert_eq!(key, "state");
            }
            other => panic!("expected a missing label, got {:?}", other),
        }
        assert_eq!(data.column("county").unwrap(), ["001"]);
    }
}
