//! FunnelDB Core
//!
//! Boolean query algebra and set evaluation over precomputed funnels: for
//! every funnel (one combination of key field values) and every entity in
//! it, the index stores a bitmask of which mask-field values the entity's
//! events carried.
//!
//! # Modules
//!
//! - `cnf` - formulas in conjunctive normal form, their parser and the
//!   bitmask compiler
//! - `keys` - mixed-radix mapping between funnel keys and funnel ids
//! - `set` - simple and complex funnel sets
//! - `family` - batches of mask predicates counted against one funnel
//! - `filter` - event-level filters over `field=value` terms
//! - `engine` - trail store and funnel engine boundaries, in-memory backends
//! - `db` - the `FunnelDb` facade
//!
//! # Example
//!
//! ```rust
//! use funneldb_core::{FunnelDb, IndexParams, MemoryTrailStore};
//!
//! let mut store = MemoryTrailStore::new(["country", "step"]);
//! store.add(0, 1, &["US", "visit"]).unwrap();
//! store.add(0, 2, &["US", "pay"]).unwrap();
//! store.add(1, 1, &["FI", "visit"]).unwrap();
//!
//! let params = IndexParams::default().group("country").mask("step");
//! let db = FunnelDb::build(store, &params).unwrap();
//!
//! let visited = db.query("/visit").unwrap();
//! let paid = db.query("/pay").unwrap();
//! assert_eq!(db.count(&(&visited - &paid)).unwrap(), 1);
//!
//! let family = db.family(["visit", "pay"]).unwrap();
//! assert_eq!(db.counts(&family, "country=US").unwrap(), vec![1, 1]);
//! ```

pub mod cnf;
pub mod db;
pub mod engine;
pub mod family;
pub mod filter;
pub mod keys;
pub mod logging;
pub mod params;
pub mod set;

// Re-export main types at crate root
pub use cnf::{
    none_of, one_of, where_all, where_none, Clause, ClauseMask, CompiledCnf, Formula, Literal,
    ParseError, Syntax, MAX_TERMS,
};
pub use db::FunnelDb;
pub use engine::{
    Element, Elements, EntityId, Event, FieldId, FunnelEngine, FunnelError, FunnelId,
    FunnelResult, Item, Mask, MemoryEngine, MemoryTrailStore, TrailStore,
};
pub use family::Family;
pub use filter::{EventFilter, FieldValue};
pub use keys::{FunnelKey, Key, KeyIndex};
pub use params::{FieldGroup, IndexParams};
pub use set::{ComplexSet, Set, SimpleSet};
