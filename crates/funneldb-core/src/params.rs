//! Funnel index configuration
//!
//! An index is described by its key groups (each group one independent key
//! dimension made of one or more fields) and an optional mask field whose
//! values become the bits of every entity mask.
//!
//! ```rust
//! use funneldb_core::params::{FieldGroup, IndexParams};
//!
//! let params = IndexParams::from_json(
//!     r#"{"keys": [[], "country", ["country", "os"]], "mask_field": "step"}"#,
//! )
//! .unwrap();
//! assert_eq!(params.keys[1], FieldGroup::One("country".into()));
//! ```

use serde::{Deserialize, Serialize};

use crate::cnf::MAX_TERMS;
use crate::engine::{FieldId, FunnelError, FunnelResult, TrailStore};

/// One key group: a single field or an ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldGroup {
    One(String),
    Many(Vec<String>),
}

impl FieldGroup {
    /// The group with no fields: a single funnel holding every entity
    pub fn none() -> Self {
        FieldGroup::Many(Vec::new())
    }

    pub fn fields(&self) -> &[String] {
        match self {
            FieldGroup::One(field) => std::slice::from_ref(field),
            FieldGroup::Many(fields) => fields,
        }
    }
}

impl From<&str> for FieldGroup {
    fn from(field: &str) -> Self {
        FieldGroup::One(field.to_string())
    }
}

impl From<String> for FieldGroup {
    fn from(field: String) -> Self {
        FieldGroup::One(field)
    }
}

impl From<Vec<String>> for FieldGroup {
    fn from(fields: Vec<String>) -> Self {
        FieldGroup::Many(fields)
    }
}

impl<const N: usize> From<[&str; N]> for FieldGroup {
    fn from(fields: [&str; N]) -> Self {
        FieldGroup::Many(fields.iter().map(|f| f.to_string()).collect())
    }
}

fn default_keys() -> Vec<FieldGroup> {
    vec![FieldGroup::none()]
}

/// Index build parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    #[serde(default = "default_keys")]
    pub keys: Vec<FieldGroup>,
    #[serde(default)]
    pub mask_field: Option<String>,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            mask_field: None,
        }
    }
}

impl IndexParams {
    /// Params with no key groups yet
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            mask_field: None,
        }
    }

    pub fn group(mut self, group: impl Into<FieldGroup>) -> Self {
        self.keys.push(group.into());
        self
    }

    pub fn mask(mut self, field: impl Into<String>) -> Self {
        self.mask_field = Some(field.into());
        self
    }

    pub fn from_json(input: &str) -> FunnelResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> FunnelResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolve the mask field and check its values fit in a mask.
    ///
    /// Value `v` of the mask field owns bit `v`, so the lexicon must hold at
    /// least one value and at most `MAX_TERMS - 1`.
    pub fn validate<S: TrailStore>(&self, store: &S) -> FunnelResult<Option<FieldId>> {
        if self.keys.is_empty() {
            return Err(FunnelError::Format(
                "index needs at least one key group".to_string(),
            ));
        }
        for group in &self.keys {
            for field in group.fields() {
                store.field(field)?;
            }
        }

        let name = match &self.mask_field {
            Some(name) => name,
            None => return Ok(None),
        };
        let field = store.field(name)?;
        let arity = store.lexicon_size(field)?;
        if arity < 1 {
            return Err(FunnelError::Format(format!(
                "mask field '{}' has no values",
                name
            )));
        }
        if arity >= MAX_TERMS as u64 {
            return Err(FunnelError::Capacity {
                what: format!("mask field '{}' value", name),
                index: arity as usize,
                limit: MAX_TERMS - 1,
            });
        }
        Ok(Some(field))
    }
}
