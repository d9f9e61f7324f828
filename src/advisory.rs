//! Non-fatal advisories raised while configuring a session.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The `detail` sentinel was accepted without a catalog entry to back it.
    DetailTable { database: String },
    /// A new geography starts out selecting every value.
    WildcardGeography { geography: String },
    /// The first specific value replaced the `*` wildcard.
    WildcardReplaced { geography: String, value: String },
    /// The geography needs enclosing geographies this client does not model.
    GeographyRequires {
        geography: String,
        requires: Vec<String>,
    },
    /// No concepts were selected, so variables were not filtered.
    ConceptFilterSkipped,
    /// Setting concepts cleared the variable list.
    ConceptsReset,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DetailTable { database } => write!(
                f,
                "the `detail` table may or may not exist in the database {}",
                database
            ),
            Warning::WildcardGeography { geography } => write!(
                f,
                "using * to get all of geography {}; add specific values to narrow it",
                geography
            ),
            Warning::WildcardReplaced { geography, value } => {
                write!(f, "replaced * for geography {} with {}", geography, value)
            }
            Warning::GeographyRequires {
                geography,
                requires,
            } => write!(
                f,
                "geography {} requires {}; supply those in the query yourself",
                geography,
                requires.join(", ")
            ),
            Warning::ConceptFilterSkipped => {
                f.write_str("no concepts set, returning all variables")
            }
            Warning::ConceptsReset => f.write_str("new concepts set, variables cleared"),
        }
    }
}

/// Most advisories a session keeps; older ones are dropped first.
pub const MAX_ADVISORIES: usize = 256;

/// Bounded log of advisories; also forwards each one to `tracing`.
#[derive(Debug, Default)]
pub(crate) struct Advisories {
    log: RefCell<VecDeque<Warning>>,
}

impl Advisories {
    pub(crate) fn raise(&self, warning: Warning) {
        warn!("{}", warning);
        let mut log = self.log.borrow_mut();
        if log.len() == MAX_ADVISORIES {
            log.pop_front();
        }
        log.push_back(warning);
    }

    pub(crate) fn snapshot(&self) -> Vec<Warning> {
        self.log.borrow().iter().cloned().collect()
    }

    pub(crate) fn drain(&self) -> Vec<Warning> {
        self.log.borrow_mut().drain(..).collect()
    }
}
