//! Boundaries to the trail store and the funnel engine
//!
//! This module defines the `TrailStore` and `FunnelEngine` traits the core
//! calls into, the error taxonomy every operation reports through, and
//! in-memory implementations of both:
//!
//! - **Trail store**: field and value dictionaries plus per-trail events
//!   (`MemoryTrailStore`)
//! - **Funnel engine**: per-funnel `entity -> mask` maps with a reference
//!   evaluator (`MemoryEngine`)
//!
//! # Example
//!
//! ```rust
//! use funneldb_core::engine::{FunnelEngine, MemoryEngine};
//! use funneldb_core::Set;
//!
//! let mut engine = MemoryEngine::new(1);
//! engine.insert(0, 7, 0b10).unwrap();
//!
//! assert_eq!(engine.count(&Set::funnel(0)).unwrap(), 1);
//! ```

mod error;
mod memory;
mod traits;

pub use error::{FunnelError, FunnelResult};
pub use memory::{MemoryEngine, MemoryTrailStore};
pub(crate) use traits::check_funnel;
pub use traits::{
    Element, Elements, EntityId, Event, FieldId, FunnelEngine, FunnelId, Item, Mask, TrailStore,
};
