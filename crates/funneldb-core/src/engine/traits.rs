//! Boundary traits for the trail store and the funnel engine

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::engine::error::{FunnelError, FunnelResult};
use crate::family::Family;
use crate::set::Set;

/// Field identifier within a trail store
pub type FieldId = u32;

/// Funnel identifier within an index
pub type FunnelId = u32;

/// Entity (trail) identifier
pub type EntityId = u32;

/// Per-entity funnel bitmask
pub type Mask = u64;

/// A dictionary-encoded `(field, value)` pair. `val` 0 is the unset value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Item {
    pub field: FieldId,
    pub val: u64,
}

/// One event of a trail; `values` is indexed by field id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: u64,
    pub values: Vec<u64>,
}

impl Event {
    /// Value of `field`, 0 when unset or out of range
    pub fn value(&self, field: FieldId) -> u64 {
        self.values.get(field as usize).copied().unwrap_or(0)
    }

    pub fn has(&self, item: Item) -> bool {
        self.value(item.field) == item.val
    }
}

/// One member of an evaluated set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    pub id: EntityId,
    pub mask: Mask,
}

/// Lazily produced set members. An `Err` item ends the sequence.
pub type Elements<'a> = Box<dyn Iterator<Item = FunnelResult<Element>> + 'a>;

/// Read access to the dictionary-encoded event store.
///
/// Lexicon values of a field are numbered `1..=lexicon_size`; 0 is reserved
/// for "unset".
pub trait TrailStore {
    /// Number of fields
    fn num_fields(&self) -> usize;

    /// Resolve a field name.
    ///
    /// Returns `FunnelError::NotFound` for unknown names.
    fn field(&self, name: &str) -> FunnelResult<FieldId>;

    /// Name of a field id
    fn field_name(&self, field: FieldId) -> FunnelResult<&str>;

    /// Number of distinct values of a field, not counting "unset"
    fn lexicon_size(&self, field: FieldId) -> FunnelResult<u64>;

    /// Value string for a value number in `1..=lexicon_size`
    fn lexicon_word(&self, field: FieldId, val: u64) -> FunnelResult<&str>;

    /// Value number of a value string.
    ///
    /// Returns `FunnelError::NotFound` if the value never occurs.
    fn lexicon_val(&self, field: FieldId, value: &str) -> FunnelResult<u64>;

    /// All value strings of a field, in value-number order
    fn lexicon(&self, field: FieldId) -> FunnelResult<Vec<&str>> {
        (1..=self.lexicon_size(field)?)
            .map(|val| self.lexicon_word(field, val))
            .collect()
    }

    /// Resolve `(field, value)` into an item
    fn item(&self, field: FieldId, value: &str) -> FunnelResult<Item> {
        Ok(Item {
            field,
            val: self.lexicon_val(field, value)?,
        })
    }

    /// Number of trails
    fn num_trails(&self) -> u64;

    /// Events of one trail, in time order
    fn events(&self, trail: EntityId) -> FunnelResult<Vec<Event>>;
}

/// Evaluator over a compiled funnel index.
///
/// Implementations own the physical index; sets and families are plain
/// descriptors handed in for each call.
pub trait FunnelEngine {
    /// Number of funnels in the index
    fn num_funnels(&self) -> u64;

    /// Number of entities in the set
    fn count(&self, set: &Set) -> FunnelResult<u64>;

    /// One count per family predicate, in family order, all against the
    /// same funnel
    fn count_family(&self, family: &Family, funnel_id: FunnelId) -> FunnelResult<Vec<u64>>;

    /// Members of the set with their masks
    fn iter<'a>(&'a self, set: &Set) -> FunnelResult<Elements<'a>>;

    /// Persist the index
    fn save(&self, sink: &mut dyn Write) -> FunnelResult<()>;
}

/// Check a funnel id against the engine's index
pub(crate) fn check_funnel(num_funnels: u64, funnel_id: FunnelId) -> FunnelResult<()> {
    if u64::from(funnel_id) >= num_funnels {
        return Err(FunnelError::NotFound(format!("funnel id {}", funnel_id)));
    }
    Ok(())
}
