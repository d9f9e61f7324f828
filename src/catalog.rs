//! Index of every dataset the API publishes, keyed by vintage year.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{CensusError, Result};

/// The bulk discovery document (`data.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct BulkCatalog {
    #[serde(default)]
    pub dataset: Vec<DatasetDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDescriptor {
    /// Vintage year; time-series datasets have none.
    #[serde(default)]
    pub c_vintage: Option<Vintage>,
    /// `[api, database?, table?]`
    #[serde(default)]
    pub c_dataset: Vec<String>,
    #[serde(default)]
    pub title: String,
}

/// Vintages are numbers in the live document but strings in some mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Vintage {
    Number(i64),
    Text(String),
}

impl Vintage {
    pub fn as_key(&self) -> String {
        match self {
            Vintage::Number(n) => n.to_string(),
            Vintage::Text(s) => s.clone(),
        }
    }
}

type Tables = Vec<String>;
type Databases = IndexMap<String, Tables>;
type Apis = IndexMap<String, Databases>;

/// `year -> api -> database -> [tables]`, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogIndex {
    years: IndexMap<String, Apis>,
}

impl CatalogIndex {
    pub fn build(descriptors: &[DatasetDescriptor]) -> Result<Self> {
        let mut years: IndexMap<String, Apis> = IndexMap::new();

        for descriptor in descriptors {
            let Some(vintage) = &descriptor.c_vintage else {
                continue;
            };
            let apis = years.entry(vintage.as_key()).or_default();

            let mut segments = descriptor.c_dataset.iter();
            let Some(api) = segments.next() else {
                return Err(CensusError::MalformedCatalog {
                    title: descriptor.title.clone(),
                });
            };
            let databases = apis.entry(api.clone()).or_default();

            let Some(database) = segments.next() else {
                continue;
            };
            let tables = databases.entry(database.clone()).or_default();

            if let Some(table) = segments.next() {
                if !tables.contains(table) {
                    tables.push(table.clone());
                }
            }
        }

        Ok(Self { years })
    }

    pub fn years(&self) -> Vec<String> {
        self.years.keys().cloned().collect()
    }

    pub fn apis(&self, year: &str) -> Result<Vec<String>> {
        Ok(self.year_entry(year)?.keys().cloned().collect())
    }

    pub fn databases(&self, year: &str, api: &str) -> Result<Vec<String>> {
        Ok(self.api_entry(year, api)?.keys().cloned().collect())
    }

    pub fn tables(&self, year: &str, api: &str, database: &str) -> Result<Vec<String>> {
        self.api_entry(year, api)?
            .get(database)
            .cloned()
            .ok_or_else(|| not_found(&[year, api, database]))
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    fn year_entry(&self, year: &str) -> Result<&Apis> {
        self.years.get(year).ok_or_else(|| not_found(&[year]))
    }

    fn api_entry(&self, year: &str, api: &str) -> Result<&Databases> {
        self.year_entry(year)?
            .get(api)
            .ok_or_else(|| not_found(&[year, api]))
    }
}

fn not_found(path: &[&str]) -> CensusError {
    CensusError::CatalogPathNotFound {
        path: path.join("/"),
    }
}
