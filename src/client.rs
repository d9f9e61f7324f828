use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

use crate::advisory::{Advisories, Warning};
use crate::catalog::{BulkCatalog, CatalogIndex, DatasetDescriptor};
use crate::config::{DEFAULT_BASE_URL, DEFAULT_CATALOG_URL, load_config};
use crate::error::{CensusError, Result};
use crate::metadata::{ConceptMap, GeographyDescriptor, MetadataResolver, variable_label};
use crate::request::{DatasetPath, data_url};
use crate::selection::{DETAIL_TABLE, Field, Selection, Table, WILDCARD};
use crate::table::{DataTable, Rows};
use crate::transport::{HttpTransport, Transport};
use crate::util::redact_key;

/// Variable accepted in every dataset regardless of concept.
const NAME_VARIABLE: &str = "NAME";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base data URL, typically `https://api.census.gov/data`.
    pub url: String,
    /// Bulk dataset discovery document, fetched once per session.
    pub catalog_url: String,
    /// API key, sent as the `key` query parameter.
    pub key: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Show a spinner while the catalog downloads.
    pub progress: bool,
}

impl ClientConfig {
    /// Default endpoints with the given key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            key: key.into(),
            verify: true,
            progress: true,
        }
    }
}

/// How [`Census::pull_data`] returns parsed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    /// Header row plus data rows, as sent.
    Rows,
    /// Column-oriented table.
    #[default]
    Table,
    /// Table with variable columns renamed to their labels and geography
    /// codes replaced by their names.
    Labelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataResponse {
    /// Unparsed body. Pulls against the `detail` table always come back raw.
    Raw(String),
    Rows(Rows),
    Table(DataTable),
}

impl DataResponse {
    pub fn into_table(self) -> Option<DataTable> {
        match self {
            DataResponse::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            DataResponse::Raw(text) => Some(text),
            _ => None,
        }
    }
}

/// A query-building session against the Census data API.
///
/// Selections are made coarse to fine: year, API, database, table, concepts,
/// variables, geography, geography values. Each setter validates against
/// the catalog or live metadata for the fields already chosen, and clears
/// every finer field. A session is single-threaded; use one per task.
#[derive(Debug)]
pub struct Census {
    key: String,
    descriptors: Vec<DatasetDescriptor>,
    catalog: CatalogIndex,
    selection: Selection,
    resolver: MetadataResolver,
    advisories: Advisories,
}

impl Census {
    /// Creates a session using environment variables and/or `.censusapirc`.
    ///
    /// This is equivalent to `Census::new(None, None, None)`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a session using (in order of precedence):
    /// - explicit `url`/`key` arguments
    /// - environment variables `CENSUS_API_URL` / `CENSUS_API_KEY`
    /// - config file from `CENSUS_API_RC` or `.censusapirc`
    ///
    /// Downloads the dataset catalog before returning.
    pub fn new(url: Option<String>, key: Option<String>, verify: Option<bool>) -> anyhow::Result<Self> {
        let cfg = load_config(url, key, verify)?;
        let transport = HttpTransport::new(cfg.verify, Duration::from_secs(60))
            .context("failed to build HTTP client")?;
        let catalog_url = cfg.catalog_url.clone();
        Self::with_transport(cfg, transport)
            .with_context(|| format!("failed to load dataset catalog from {}", catalog_url))
    }

    /// Creates a session over any [`Transport`], e.g. a
    /// [`MockTransport`](crate::MockTransport) for offline use.
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Result<Self> {
        let resolver = MetadataResolver::new(config.url, Box::new(transport));

        let spinner = config.progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message("Loading dataset catalog");
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        let bulk = resolver.fetch_document::<BulkCatalog>(&config.catalog_url);
        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }
        let bulk = bulk?;

        let catalog = CatalogIndex::build(&bulk.dataset)?;
        info!(
            datasets = bulk.dataset.len(),
            years = catalog.years().len(),
            "loaded dataset catalog"
        );

        Ok(Self {
            key: config.key,
            descriptors: bulk.dataset,
            catalog,
            selection: Selection::new(),
            resolver,
            advisories: Advisories::default(),
        })
    }

    // TOKEN

    pub fn token(&self) -> &str {
        &self.key
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.key = token.into();
    }

    /// The token as a query parameter, `key=<token>`.
    pub fn token_param(&self) -> String {
        format!("key={}", self.key)
    }

    // CATALOG

    /// Every descriptor of the bulk catalog document.
    pub fn descriptors(&self) -> &[DatasetDescriptor] {
        &self.descriptors
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    pub fn base_url(&self) -> &str {
        self.resolver.base_url()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Advisories raised so far, oldest first. Only the newest
    /// [`MAX_ADVISORIES`](crate::MAX_ADVISORIES) are kept.
    pub fn warnings(&self) -> Vec<Warning> {
        self.advisories.snapshot()
    }

    /// Advisories raised so far, clearing the log.
    pub fn take_warnings(&self) -> Vec<Warning> {
        self.advisories.drain()
    }

    pub fn pull_years(&self) -> Vec<String> {
        self.catalog.years()
    }

    pub fn pull_apis(&self) -> Result<Vec<String>> {
        self.catalog.apis(self.year()?)
    }

    pub fn pull_databases(&self) -> Result<Vec<String>> {
        self.catalog.databases(self.year()?, self.api()?)
    }

    pub fn pull_tables(&self) -> Result<Vec<String>> {
        self.catalog
            .tables(self.year()?, self.api()?, self.database()?)
    }

    // YEAR

    pub fn set_year(&mut self, year: impl ToString) -> Result<()> {
        self.selection.clear_after(Field::Year);
        let year = year.to_string();
        let choices = self.pull_years();
        if !choices.contains(&year) {
            return Err(CensusError::InvalidSelection {
                field: Field::Year,
                value: year,
                scope: String::new(),
                choices,
            });
        }
        self.selection.year = Some(year);
        Ok(())
    }

    pub fn year(&self) -> Result<&str> {
        self.selection
            .year()
            .ok_or_else(|| CensusError::NotConfigured {
                field: Field::Year,
                hint: "set a year first".to_string(),
                choices: self.pull_years(),
            })
    }

    // API

    pub fn set_api(&mut self, api: &str) -> Result<()> {
        self.selection.clear_after(Field::Api);
        let choices = self.pull_apis()?;
        self.check_choice(Field::Api, api, choices)?;
        self.selection.api = Some(api.to_string());
        Ok(())
    }

    pub fn api(&self) -> Result<&str> {
        let year = self.year()?;
        match self.selection.api() {
            Some(api) => Ok(api),
            None => Err(CensusError::NotConfigured {
                field: Field::Api,
                hint: format!("pick an API for the year {}", year),
                choices: self.catalog.apis(year)?,
            }),
        }
    }

    // DATABASE

    pub fn set_database(&mut self, database: &str) -> Result<()> {
        self.selection.clear_after(Field::Database);
        let choices = self.pull_databases()?;
        self.check_choice(Field::Database, database, choices)?;
        self.selection.database = Some(database.to_string());
        Ok(())
    }

    pub fn database(&self) -> Result<&str> {
        let api = self.api()?;
        match self.selection.database() {
            Some(database) => Ok(database),
            None => Err(CensusError::NotConfigured {
                field: Field::Database,
                hint: format!("pick a database{}", self.scope()),
                choices: self.catalog.databases(self.year()?, api)?,
            }),
        }
    }

    // TABLE

    /// Selects a table. `"detail"` is accepted without a catalog entry and
    /// raises [`Warning::DetailTable`].
    pub fn set_table(&mut self, table: &str) -> Result<()> {
        self.selection.clear_after(Field::Table);
        let mut choices = self.pull_tables()?;
        match Table::parse(table) {
            Table::Detail => {
                self.advisories.raise(Warning::DetailTable {
                    database: self.database()?.to_string(),
                });
                self.selection.table = Some(Table::Detail);
            }
            Table::Named(name) => {
                if !choices.contains(&name) {
                    choices.push(DETAIL_TABLE.to_string());
                    return Err(CensusError::InvalidSelection {
                        field: Field::Table,
                        value: name,
                        scope: self.scope(),
                        choices,
                    });
                }
                self.selection.table = Some(Table::Named(name));
            }
        }
        Ok(())
    }

    pub fn table(&self) -> Result<&Table> {
        let database = self.database()?;
        match self.selection.table() {
            Some(table) => Ok(table),
            None => {
                let mut choices = self
                    .catalog
                    .tables(self.year()?, self.api()?, database)?;
                choices.push(DETAIL_TABLE.to_string());
                Err(CensusError::NotConfigured {
                    field: Field::Table,
                    hint: format!("pick a table{}", self.scope()),
                    choices,
                })
            }
        }
    }

    /// Year, API, database and table of the current selection.
    pub fn dataset_path(&self) -> Result<DatasetPath> {
        let table = self.table()?.clone();
        Ok(DatasetPath::new(
            self.year()?,
            self.api()?,
            self.database()?,
            Some(table),
        ))
    }

    /// URL of a metadata document (`variables`, `geography`, `groups`, ...)
    /// for the current dataset.
    pub fn document_url(&self, endpoint: &str) -> Result<String> {
        Ok(self.dataset_path()?.document_url(self.base_url(), endpoint))
    }

    // CONCEPTS

    pub fn pull_concepts(&self) -> Result<Vec<String>> {
        Ok(self.pull_concepts_and_variables()?.concepts())
    }

    /// Every concept of the current dataset with its variables.
    pub fn pull_concepts_and_variables(&self) -> Result<ConceptMap> {
        self.resolver.fetch_concept_map(&self.dataset_path()?)
    }

    /// Restricts the variable universe to `concepts`. At least one is required.
    pub fn set_concepts<S: AsRef<str>>(&mut self, concepts: &[S]) -> Result<()> {
        let had_variables = self.selection.variables.is_some();
        self.selection.clear_after(Field::Concepts);

        let available = self.pull_concepts()?;
        if concepts.is_empty() {
            return Err(CensusError::InvalidSelection {
                field: Field::Concepts,
                value: String::new(),
                scope: format!("{} (blank concept list)", self.scope()),
                choices: available,
            });
        }

        let mut selected: Vec<String> = Vec::with_capacity(concepts.len());
        for concept in concepts {
            let concept = concept.as_ref();
            if !available.iter().any(|c| c == concept) {
                return Err(CensusError::InvalidSelection {
                    field: Field::Concepts,
                    value: concept.to_string(),
                    scope: self.scope(),
                    choices: available,
                });
            }
            if !selected.iter().any(|c| c == concept) {
                selected.push(concept.to_string());
            }
        }

        if had_variables {
            self.advisories.raise(Warning::ConceptsReset);
        }
        self.selection.concepts = Some(selected);
        Ok(())
    }

    pub fn concepts(&self) -> Result<&[String]> {
        self.table()?;
        match self.selection.concepts() {
            Some(concepts) => Ok(concepts),
            None => Err(CensusError::NotConfigured {
                field: Field::Concepts,
                hint: format!("pick concepts{}", self.scope()),
                choices: self.pull_concepts()?,
            }),
        }
    }

    // VARIABLES

    /// Variables under the selected concepts, or every concept with
    /// [`Warning::ConceptFilterSkipped`] when none are selected.
    pub fn pull_variables(&self) -> Result<ConceptMap> {
        let all = self.pull_concepts_and_variables()?;
        match self.selection.concepts() {
            Some(concepts) => Ok(all.filtered(concepts)),
            None => {
                self.advisories.raise(Warning::ConceptFilterSkipped);
                Ok(all)
            }
        }
    }

    /// Names a variable may be added under: those of the selected concepts,
    /// or every defined variable when no concepts are selected.
    pub fn pull_variable_names(&self) -> Result<Vec<String>> {
        self.variable_universe(true)
    }

    /// Appends `variable` to the variable list. `NAME` is always allowed.
    pub fn add_variable(&mut self, variable: &str) -> Result<()> {
        self.table()?;
        self.selection.clear_after(Field::Variables);
        let universe = self.universe_for(&[variable])?;
        self.push_variable(variable, &universe)
    }

    /// Replaces the variable list, adding each entry in order.
    ///
    /// Stops at the first rejected entry, keeping those before it.
    pub fn set_variables<S: AsRef<str>>(&mut self, variables: &[S]) -> Result<()> {
        self.table()?;
        self.selection.clear_after(Field::Variables);
        self.selection.variables = Some(Vec::new());
        let universe = self.universe_for(variables)?;
        for variable in variables {
            self.push_variable(variable.as_ref(), &universe)?;
        }
        Ok(())
    }

    pub fn clear_variables(&mut self) -> Result<()> {
        self.table()?;
        self.selection.clear_after(Field::Variables);
        self.selection.variables = Some(Vec::new());
        Ok(())
    }

    pub fn variables(&self) -> Result<&[String]> {
        self.table()?;
        match self.selection.variables() {
            Some(variables) => Ok(variables),
            None => Err(CensusError::NotConfigured {
                field: Field::Variables,
                hint: "add variables first; see pull_variables() for what is available"
                    .to_string(),
                choices: self.variable_universe(false)?,
            }),
        }
    }

    fn variable_universe(&self, warn: bool) -> Result<Vec<String>> {
        let path = self.dataset_path()?;
        match self.selection.concepts() {
            Some(concepts) => Ok(self
                .resolver
                .fetch_concept_map(&path)?
                .filtered(concepts)
                .variable_names()),
            None => {
                if warn {
                    self.advisories.raise(Warning::ConceptFilterSkipped);
                }
                Ok(self
                    .resolver
                    .fetch_variable_definitions(&path)?
                    .into_keys()
                    .collect())
            }
        }
    }

    /// Fetches the universe only when some candidate needs checking.
    fn universe_for<S: AsRef<str>>(&self, candidates: &[S]) -> Result<Vec<String>> {
        if candidates.iter().all(|c| c.as_ref() == NAME_VARIABLE) {
            return Ok(Vec::new());
        }
        self.variable_universe(true)
    }

    fn push_variable(&mut self, variable: &str, universe: &[String]) -> Result<()> {
        if self
            .selection
            .variables()
            .is_some_and(|v| v.iter().any(|x| x == variable))
        {
            return Err(CensusError::DuplicateVariable(variable.to_string()));
        }
        if variable != NAME_VARIABLE && !universe.iter().any(|v| v == variable) {
            return Err(CensusError::VariableNotAllowed {
                variable: variable.to_string(),
                scope: self.scope(),
            });
        }
        self.selection
            .variables
            .get_or_insert_with(Vec::new)
            .push(variable.to_string());
        Ok(())
    }

    // GEOGRAPHY

    pub fn pull_geographies(&self) -> Result<Vec<GeographyDescriptor>> {
        self.resolver
            .fetch_geography_definitions(&self.dataset_path()?)
    }

    pub fn pull_geography_names(&self) -> Result<Vec<String>> {
        Ok(self
            .pull_geographies()?
            .into_iter()
            .map(|g| g.name)
            .collect())
    }

    /// Selects a geography level with every value (`*`) selected.
    ///
    /// A geography that `requires` enclosing geographies raises
    /// [`Warning::GeographyRequires`]; those are not collected here.
    pub fn set_geography(&mut self, geography: &str) -> Result<()> {
        self.selection.clear_after(Field::Geography);
        let geographies = self.pull_geographies()?;

        let Some(descriptor) = geographies.iter().find(|g| g.name == geography) else {
            return Err(CensusError::InvalidSelection {
                field: Field::Geography,
                value: geography.to_string(),
                scope: self.scope(),
                choices: geographies.into_iter().map(|g| g.name).collect(),
            });
        };

        if !descriptor.requires.is_empty() {
            self.advisories.raise(Warning::GeographyRequires {
                geography: geography.to_string(),
                requires: descriptor.requires.clone(),
            });
        }
        self.selection.geography = Some(geography.to_string());
        self.selection.geography_values = Some(vec![WILDCARD.to_string()]);
        self.advisories.raise(Warning::WildcardGeography {
            geography: geography.to_string(),
        });
        Ok(())
    }

    pub fn geography(&self) -> Result<&str> {
        self.table()?;
        match self.selection.geography() {
            Some(geography) => Ok(geography),
            None => Err(CensusError::NotConfigured {
                field: Field::Geography,
                hint: format!("pick a geography{}", self.scope()),
                choices: self.pull_geography_names()?,
            }),
        }
    }

    /// `NAME` and code of every value of the selected geography.
    pub fn pull_geography_values(&self) -> Result<DataTable> {
        let geography = self.geography()?;
        self.resolver
            .fetch_geography_values(&self.dataset_path()?, geography, &self.key)
    }

    /// Adds a specific geography value. The first one replaces `*`.
    pub fn add_geography_value(&mut self, value: &str) -> Result<()> {
        let codes = self.geography_codes()?;
        self.push_geography_value(value, &codes)
    }

    /// Replaces the geography values with `values`, validating each.
    pub fn set_geography_values<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        let codes = self.geography_codes()?;
        self.selection.geography_values = Some(vec![WILDCARD.to_string()]);
        for value in values {
            self.push_geography_value(value.as_ref(), &codes)?;
        }
        Ok(())
    }

    pub fn geography_values(&self) -> Result<&[String]> {
        let geography = self.geography()?;
        self.selection
            .geography_values()
            .ok_or_else(|| CensusError::NotConfigured {
                field: Field::GeographyValues,
                hint: format!("set the geography {} again", geography),
                choices: vec![WILDCARD.to_string()],
            })
    }

    fn geography_codes(&self) -> Result<Vec<String>> {
        let geography = self.geography()?;
        let values = self.pull_geography_values()?;
        // The resolver guarantees the code column exists.
        Ok(values
            .column(geography)
            .map(<[String]>::to_vec)
            .unwrap_or_default())
    }

    fn push_geography_value(&mut self, value: &str, codes: &[String]) -> Result<()> {
        let geography = self.geography()?.to_string();
        if !codes.iter().any(|c| c == value) {
            return Err(CensusError::GeographyValueNotAllowed {
                value: value.to_string(),
                geography,
            });
        }

        let current = self
            .selection
            .geography_values
            .get_or_insert_with(Vec::new);
        if current.iter().any(|v| v == WILDCARD) {
            *current = vec![value.to_string()];
            self.advisories.raise(Warning::WildcardReplaced {
                geography,
                value: value.to_string(),
            });
        } else if !current.iter().any(|v| v == value) {
            current.push(value.to_string());
        }
        Ok(())
    }

    // DATA

    /// The data-pull URL for the current selection.
    pub fn data_url(&self) -> Result<String> {
        data_url(self.base_url(), &self.selection, &self.key)
    }

    /// Issues the data request for the current selection.
    ///
    /// When the table is `detail` the body is returned unparsed as
    /// [`DataResponse::Raw`], whatever `shape` asks for.
    pub fn pull_data(&self, shape: Shape) -> Result<DataResponse> {
        let url = self.data_url()?;
        info!(url = %redact_key(&url), "pulling data");

        if self.selection.table().is_some_and(Table::is_detail) {
            return Ok(DataResponse::Raw(self.resolver.fetch_text(&url)?));
        }

        let rows = self.resolver.fetch_rows(&url)?;
        if shape == Shape::Rows {
            return Ok(DataResponse::Rows(rows));
        }

        let mut table = DataTable::from_rows(&rows).map_err(|e| e.at_url(&url))?;
        if shape == Shape::Labelled {
            self.label_table(&mut table)?;
        }
        Ok(DataResponse::Table(table))
    }

    /// Renames selected variable columns to their labels and replaces
    /// geography codes with their names.
    pub fn label_table(&self, table: &mut DataTable) -> Result<()> {
        let path = self.dataset_path()?;

        let definitions = self.resolver.fetch_variable_definitions(&path)?;
        for variable in self.variables()? {
            let label = variable_label(&definitions, variable)?;
            table.rename_column(variable, &label)?;
        }

        let geography = self.geography()?;
        let names = self
            .resolver
            .fetch_geography_values(&path, geography, &self.key)?;
        let lookup = names.lookup(geography, NAME_VARIABLE);
        table.relabel_values(geography, &lookup, "geography")
    }

    // helpers

    fn check_choice(&self, field: Field, value: &str, choices: Vec<String>) -> Result<()> {
        if choices.iter().any(|c| c == value) {
            return Ok(());
        }
        Err(CensusError::InvalidSelection {
            field,
            value: value.to_string(),
            scope: self.scope(),
            choices,
        })
    }

    /// `" for year 2020, api acs, ..."` over the dataset-level fields set so far.
    fn scope(&self) -> String {
        let parts: Vec<String> = [
            ("year", self.selection.year()),
            ("api", self.selection.api()),
            ("database", self.selection.database()),
            ("table", self.selection.table().map(Table::as_str)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{} {}", name, v)))
        .collect();

        if parts.is_empty() {
            String::new()
        } else {
            format!(" for {}", parts.join(", "))
        }
    }
}
