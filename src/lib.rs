//! A small Rust client for the U.S. Census Bureau data API.
//!
//! A [`Census`] session narrows a query one level at a time: year, API,
//! database, table, concepts, variables, geography and geography values.
//! Each selection is checked against the dataset catalog or metadata
//! fetched live from the API, and changing a level clears every level
//! below it. Once configured, the session builds the data URL, issues the
//! request and reshapes the rows into columns.
//!
//! ## Quick start
//! - Configure the API key via `CENSUS_API_KEY` or a `.censusapirc` file
//!   (current directory or home directory).
//! - Walk the levels, then call [`Census::pull_data`].
//!
//! ```no_run
//! use anyhow::Result;
//! use censusapi::{Census, DataResponse, Shape};
//!
//! fn main() -> Result<()> {
//!     let mut census = Census::from_env()?;
//!     census.set_year(2020)?;
//!     census.set_api("acs")?;
//!     census.set_database("acs5")?;
//!     census.set_table("profile")?;
//!     census.add_variable("NAME")?;
//!     census.add_variable("DP05_0001E")?;
//!     census.set_geography("state")?;
//!     census.add_geography_value("01")?;
//!
//!     if let DataResponse::Table(table) = census.pull_data(Shape::Labelled)? {
//!         println!("{}", serde_json::to_string_pretty(&table)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Non-fatal advisories (for example the `detail` table being accepted
//! unverified) are logged through `tracing` and kept on the session; see
//! [`Census::take_warnings`].

#![forbid(unsafe_code)]

mod advisory;
mod catalog;
mod client;
mod config;
mod error;
mod metadata;
mod request;
mod selection;
mod table;
mod transport;
mod util;

pub use advisory::{MAX_ADVISORIES, Warning};
pub use catalog::{BulkCatalog, CatalogIndex, DatasetDescriptor, Vintage};
pub use client::{Census, ClientConfig, DataResponse, Shape};
pub use error::{CensusError, Result};
pub use metadata::{
    ConceptMap, GeographyDescriptor, MetadataResolver, VariableAttributes, VariableDefinitions,
    VariableDescriptor, variable_label,
};
pub use request::{DatasetPath, data_url};
pub use selection::{DETAIL_TABLE, Field, Selection, Table, WILDCARD};
pub use table::{DataTable, Rows, rows_from_json};
pub use transport::{HttpTransport, MockTransport, Transport};
