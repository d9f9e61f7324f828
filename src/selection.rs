//! Stored query configuration.
//!
//! Fields form a strict chain; each depends on every field before it, so
//! assigning one clears everything after it. Validation against the remote
//! catalogs lives in [`Census`](crate::Census); this module only stores.

use std::fmt;

/// Table value meaning "no sub-table, use the database endpoint".
pub const DETAIL_TABLE: &str = "detail";

/// Geography value selecting every value of the chosen geography.
pub const WILDCARD: &str = "*";

/// Configuration levels, ordered coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Year,
    Api,
    Database,
    Table,
    Concepts,
    Variables,
    Geography,
    GeographyValues,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Year,
        Field::Api,
        Field::Database,
        Field::Table,
        Field::Concepts,
        Field::Variables,
        Field::Geography,
        Field::GeographyValues,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Year => "year",
            Field::Api => "api",
            Field::Database => "database",
            Field::Table => "table",
            Field::Concepts => "concepts",
            Field::Variables => "variables",
            Field::Geography => "geography",
            Field::GeographyValues => "geography_values",
        }
    }

    /// Fields strictly finer-grained than `self`.
    pub fn dependents(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| *f > self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table choice: a real catalog table or the `detail` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Table {
    Detail,
    Named(String),
}

impl Table {
    pub fn parse(value: &str) -> Self {
        if value == DETAIL_TABLE {
            Table::Detail
        } else {
            Table::Named(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Table::Detail => DETAIL_TABLE,
            Table::Named(name) => name,
        }
    }

    /// URL path segment, absent for the sentinel.
    pub fn segment(&self) -> Option<&str> {
        match self {
            Table::Detail => None,
            Table::Named(name) => Some(name),
        }
    }

    pub fn is_detail(&self) -> bool {
        matches!(self, Table::Detail)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub(crate) year: Option<String>,
    pub(crate) api: Option<String>,
    pub(crate) database: Option<String>,
    pub(crate) table: Option<Table>,
    pub(crate) concepts: Option<Vec<String>>,
    pub(crate) variables: Option<Vec<String>>,
    pub(crate) geography: Option<String>,
    pub(crate) geography_values: Option<Vec<String>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn year(&self) -> Option<&str> {
        self.year.as_deref()
    }

    pub fn api(&self) -> Option<&str> {
        self.api.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn concepts(&self) -> Option<&[String]> {
        self.concepts.as_deref()
    }

    pub fn variables(&self) -> Option<&[String]> {
        self.variables.as_deref()
    }

    pub fn geography(&self) -> Option<&str> {
        self.geography.as_deref()
    }

    pub fn geography_values(&self) -> Option<&[String]> {
        self.geography_values.as_deref()
    }

    pub(crate) fn unset(&mut self, field: Field) {
        match field {
            Field::Year => self.year = None,
            Field::Api => self.api = None,
            Field::Database => self.database = None,
            Field::Table => self.table = None,
            Field::Concepts => self.concepts = None,
            Field::Variables => self.variables = None,
            Field::Geography => self.geography = None,
            Field::GeographyValues => self.geography_values = None,
        }
    }

    /// Unsets every field that depends on `field`.
    pub(crate) fn clear_after(&mut self, field: Field) {
        for dependent in field.dependents() {
            self.unset(dependent);
        }
    }
}
