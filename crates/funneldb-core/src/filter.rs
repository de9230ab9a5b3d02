//! Event filters
//!
//! A filter is a CNF over `field=value` terms, resolved through the trail
//! store into dictionary items. A clause holds for an event when one of its
//! plain items is present or one of its negated items is absent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cnf::Formula;
use crate::engine::{Event, FunnelError, FunnelResult, Item, TrailStore};

/// A `field=value` term.
///
/// Inside a formula a negated term prints with the generic prefix,
/// `~field=value`, and parses back the same way. There is no `field!=value`
/// form: `!=` is read as part of the field name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: String,
    pub value: String,
}

impl FieldValue {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn resolve<S: TrailStore>(&self, store: &S) -> FunnelResult<Item> {
        store.item(store.field(&self.field)?, &self.value)
    }
}

impl FromStr for FieldValue {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, value) = s
            .split_once('=')
            .ok_or_else(|| FunnelError::Format(format!("expected field=value, got '{}'", s)))?;
        Ok(Self::new(field.trim(), value.trim()))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

/// A compiled event filter.
///
/// The empty filter matches every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    clauses: Vec<Vec<(Item, bool)>>,
}

impl EventFilter {
    pub fn compile<S: TrailStore>(formula: &Formula<FieldValue>, store: &S) -> FunnelResult<Self> {
        let mut clauses = Vec::with_capacity(formula.len());
        for clause in formula.clauses() {
            let mut terms = Vec::with_capacity(clause.len());
            for literal in clause.literals() {
                terms.push((literal.term.resolve(store)?, literal.negated));
            }
            clauses.push(terms);
        }
        Ok(Self { clauses })
    }

    /// Parse `country=US & ~type=refund` style filters
    pub fn parse<S: TrailStore>(input: &str, store: &S) -> FunnelResult<Self> {
        let formula = Formula::parse(input)?.try_map_terms(|t| t.parse::<FieldValue>())?;
        Self::compile(&formula, store)
    }

    /// Compiled clauses as `(item, negated)` terms
    pub fn clauses(&self) -> &[Vec<(Item, bool)>] {
        &self.clauses
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.iter().any(|&(item, negated)| event.has(item) != negated))
    }
}
