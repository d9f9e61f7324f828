use reqwest::StatusCode;
use thiserror::Error;

use crate::selection::Field;
use crate::util::redact_key;

/// Longest choice list rendered in full inside an error message.
const MAX_LISTED_CHOICES: usize = 25;

/// Errors raised by a [`Census`](crate::Census) session.
///
/// Validation errors are raised at the call that violates the invariant;
/// nothing is retried.
#[derive(Debug, Error)]
pub enum CensusError {
    /// A getter ran before its field (or a predecessor) was set.
    #[error("`{field}` is not configured: {hint}. Valid choices: {}", list_choices(.choices))]
    NotConfigured {
        field: Field,
        hint: String,
        choices: Vec<String>,
    },

    /// A setter argument is outside the currently valid set.
    #[error("`{value}` is not a valid {field}{scope}. Valid choices: {}", list_choices(.choices))]
    InvalidSelection {
        field: Field,
        value: String,
        scope: String,
        choices: Vec<String>,
    },

    #[error("variable `{0}` is already present")]
    DuplicateVariable(String),

    #[error("variable `{variable}` is not allowed{scope}")]
    VariableNotAllowed { variable: String, scope: String },

    #[error("value `{value}` is not allowed for geography `{geography}`")]
    GeographyValueNotAllowed { value: String, geography: String },

    /// Network, HTTP status or body parsing failure at the transport boundary.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("incomplete configuration, missing: {}", list_fields(.missing))]
    IncompleteConfiguration { missing: Vec<Field> },

    /// A catalog descriptor carries a vintage but no dataset path.
    #[error("no api found for data set `{title}`")]
    MalformedCatalog { title: String },

    #[error("catalog has no entry for {path}")]
    CatalogPathNotFound { path: String },

    #[error("no {kind} label found for `{key}`")]
    MissingLabel { kind: &'static str, key: String },

    #[error("column `{0}` already exists")]
    ColumnCollision(String),
}

pub type Result<T> = std::result::Result<T, CensusError>;

impl CensusError {
    pub(crate) fn transport(url: &str, reason: impl Into<String>) -> Self {
        CensusError::Transport {
            url: redact_key(url),
            reason: reason.into(),
        }
    }

    /// Attaches `url` to a transport error raised where the URL was not known.
    pub(crate) fn at_url(self, url: &str) -> Self {
        match self {
            CensusError::Transport { url: u, reason } if u.is_empty() => {
                CensusError::transport(url, reason)
            }
            other => other,
        }
    }

    /// True for failures that came from the transport boundary rather than validation.
    pub fn is_transport(&self) -> bool {
        matches!(self, CensusError::Transport { .. })
    }
}

fn list_choices(choices: &[String]) -> String {
    if choices.is_empty() {
        return "(none)".to_string();
    }
    let shown = choices
        .iter()
        .take(MAX_LISTED_CHOICES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if choices.len() > MAX_LISTED_CHOICES {
        format!("{} ... and {} more", shown, choices.len() - MAX_LISTED_CHOICES)
    } else {
        shown
    }
}

fn list_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns a non-success HTTP reply into a transport error with a remediation hint.
///
/// The Census API answers errors with short plain-text bodies
/// (`error: unknown variable 'X'`) and an invalid key with an HTML page.
pub(crate) fn format_http_failure(status: StatusCode, url: &str, body: &str) -> CensusError {
    let body = body.trim();

    if looks_like_invalid_key(body) {
        return CensusError::transport(
            url,
            format!(
                "the API key was rejected (HTTP {}).\n- Check CENSUS_API_KEY or the `key:` line in .censusapirc\n- Keys are requested at https://api.census.gov/data/key_signup.html",
                status.as_u16()
            ),
        );
    }

    if status == StatusCode::NOT_FOUND {
        return CensusError::transport(
            url,
            format!(
                "endpoint not found (HTTP 404).\n- The dataset path may not exist for this year, or the base URL is wrong\n- Default base URL: https://api.census.gov/data\n\nServer message: {}",
                body
            ),
        );
    }

    if status == StatusCode::NO_CONTENT {
        return CensusError::transport(url, "the query matched no data (HTTP 204)");
    }

    CensusError::transport(url, format!("HTTP {}\n{}", status.as_u16(), body))
}

pub(crate) fn looks_like_invalid_key(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.starts_with('<') && lower.contains("invalid key")
}
