//! The analyst-facing funnel database
//!
//! [`FunnelDb`] ties a trail store, a funnel engine and the key layout
//! together: it resolves keys and mask values, builds sets from keys or
//! query strings, and forwards evaluation to the engine.
//!
//! # Query strings
//!
//! ```text
//! set-expr   := leaf ( ('&'|'|'|'~') leaf )* | '(' set-expr ')'
//! leaf       := key ['/' mask-expr]
//! key        := 'field=value' (',' 'field=value')*   -- percent-encoded
//! mask-expr  := '!' negation, ',' AND, '+' OR
//! ```
//!
//! ```rust
//! use funneldb_core::{FunnelDb, IndexParams, MemoryTrailStore};
//!
//! let mut store = MemoryTrailStore::new(["country", "step"]);
//! store.add(0, 1, &["US", "visit"]).unwrap();
//! store.add(0, 2, &["US", "signup"]).unwrap();
//! store.add(1, 1, &["FI", "visit"]).unwrap();
//!
//! let params = IndexParams::default().group("country").mask("step");
//! let db = FunnelDb::build(store, &params).unwrap();
//!
//! let signed_up = db.query("/signup").unwrap();
//! assert_eq!(db.count(&signed_up).unwrap(), 1);
//!
//! let bounced = db.query("country=US/visit,!signup | country=FI/visit").unwrap();
//! assert_eq!(db.count(&bounced).unwrap(), 1);
//! ```

use std::io::{Read, Write};

use crate::cnf::{CompiledCnf, Formula};
use crate::engine::{
    check_funnel, Elements, EntityId, Event, FieldId, FunnelEngine, FunnelError, FunnelId,
    FunnelResult, Mask, MemoryEngine, TrailStore,
};
use crate::family::Family;
use crate::keys::{FunnelKey, Key, KeyIndex};
use crate::params::IndexParams;
use crate::set::Set;

/// A funnel index over a trail store
#[derive(Debug)]
pub struct FunnelDb<S, E> {
    store: S,
    engine: E,
    params: IndexParams,
    index: KeyIndex,
}

impl<S: TrailStore> FunnelDb<S, MemoryEngine> {
    /// Build an in-memory index over `store`
    pub fn build(store: S, params: &IndexParams) -> FunnelResult<Self> {
        let engine = MemoryEngine::build(&store, params)?;
        Self::new(store, engine, params)
    }

    /// Open an in-memory index previously written with [`FunnelDb::save`]
    pub fn load<R: Read>(store: S, source: R, params: &IndexParams) -> FunnelResult<Self> {
        let engine = MemoryEngine::load(source)?;
        Self::new(store, engine, params)
    }
}

impl<S: TrailStore, E: FunnelEngine> FunnelDb<S, E> {
    /// Wrap an existing engine.
    ///
    /// The engine must hold exactly as many funnels as `params` lays out
    /// over `store`.
    pub fn new(store: S, engine: E, params: &IndexParams) -> FunnelResult<Self> {
        let index = KeyIndex::new(&store, params)?;
        if engine.num_funnels() != index.num_funnels() {
            return Err(FunnelError::Format(format!(
                "engine holds {} funnels, key layout needs {}",
                engine.num_funnels(),
                index.num_funnels()
            )));
        }
        Ok(Self {
            store,
            engine,
            params: params.clone(),
            index,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn key_index(&self) -> &KeyIndex {
        &self.index
    }

    /// Number of funnels
    pub fn len(&self) -> u64 {
        self.index.num_funnels()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simple set over a raw funnel id; `None` selects every member
    pub fn funnel(&self, funnel_id: FunnelId, cnf: Option<CompiledCnf>) -> FunnelResult<Set> {
        check_funnel(self.len(), funnel_id)?;
        Ok(Set::simple(funnel_id, cnf.unwrap_or_default()))
    }

    pub fn funnel_id(&self, key: impl Into<Key>) -> FunnelResult<FunnelId> {
        let key = key.into();
        self.index.funnel_id(&self.store, &key).inspect_err(|e| {
            tracing::debug!(key = ?key, error = %e, "key resolution failed");
        })
    }

    /// Every fully-set key; `to_string()` gives the serialized form
    pub fn keys(&self) -> FunnelResult<impl Iterator<Item = FunnelKey>> {
        self.index.keys(&self.store)
    }

    /// Decode a funnel id back into its key
    pub fn key_of(&self, funnel_id: FunnelId) -> FunnelResult<FunnelKey> {
        self.index.key_of(&self.store, funnel_id)
    }

    fn require_mask_field(&self) -> FunnelResult<FieldId> {
        self.index
            .mask_field()
            .ok_or_else(|| FunnelError::NotFound("mask field".to_string()))
    }

    /// Bit position of a mask-field value
    pub fn mask_val(&self, value: &str) -> FunnelResult<usize> {
        let field = self.require_mask_field()?;
        Ok(self.store.lexicon_val(field, value)? as usize)
    }

    /// Mask-field values whose bits are set in `mask`
    pub fn mask_values(&self, mask: Mask) -> FunnelResult<Vec<String>> {
        let field = self.require_mask_field()?;
        (1..64u64)
            .filter(|&bit| mask & (1 << bit) != 0)
            .map(|bit| self.store.lexicon_word(field, bit).map(str::to_string))
            .collect()
    }

    /// Compile a formula over mask-field values.
    ///
    /// The empty formula needs no mask field and matches everything.
    pub fn mask_cnf(&self, formula: &Formula<String>) -> FunnelResult<CompiledCnf> {
        CompiledCnf::compile(formula, |value| self.mask_val(value))
    }

    /// Simple set for one key, filtered by a formula over mask values
    pub fn select(&self, key: impl Into<Key>, mask: &Formula<String>) -> FunnelResult<Set> {
        let funnel_id = self.funnel_id(key)?;
        Ok(Set::simple(funnel_id, self.mask_cnf(mask)?))
    }

    pub fn any(&self, sets: impl IntoIterator<Item = Set>) -> FunnelResult<Set> {
        Set::any(sets)
    }

    pub fn all(&self, sets: impl IntoIterator<Item = Set>) -> FunnelResult<Set> {
        Set::all(sets)
    }

    /// Parse one `key[/mask-expr]` leaf into a simple set
    pub fn leaf(&self, leaf: &str) -> FunnelResult<Set> {
        let (key, mask) = leaf.split_once('/').unwrap_or((leaf, ""));
        if mask.contains('/') {
            return Err(FunnelError::Format(format!(
                "leaf '{}' has more than one '/'",
                leaf
            )));
        }
        let mask = Formula::parse_extended(mask)?;
        self.select(key, &mask)
    }

    /// Parse a set query into a complex set.
    ///
    /// Identical leaves share one child slot.
    pub fn query(&self, query: &str) -> FunnelResult<Set> {
        let formula = Formula::parse(query)?;
        let mut children: Vec<Set> = Vec::new();
        let membership = formula.try_map_terms(|leaf| {
            let set = self.leaf(leaf)?;
            let slot = match children.iter().position(|c| *c == set) {
                Some(slot) => slot,
                None => {
                    children.push(set);
                    children.len() - 1
                }
            };
            Ok::<usize, FunnelError>(slot)
        })?;

        if children.is_empty() {
            return Err(FunnelError::Format("query has no leaves".to_string()));
        }
        tracing::debug!(query, children = children.len(), "parsed set query");
        let cnf = CompiledCnf::compile(&membership, |&i| Ok(i))?;
        Set::complex(children, cnf)
    }

    /// Family of mask queries in the extended syntax
    pub fn family<'q>(&self, queries: impl IntoIterator<Item = &'q str>) -> FunnelResult<Family> {
        queries
            .into_iter()
            .map(|q| self.mask_cnf(&Formula::parse_extended(q)?))
            .collect()
    }

    pub fn count(&self, set: &Set) -> FunnelResult<u64> {
        self.engine.count(set)
    }

    /// Members of the set; the sequence ends after the first error
    pub fn iter(&self, set: &Set) -> FunnelResult<Elements<'_>> {
        Ok(Box::new(until_error(self.engine.iter(set)?)))
    }

    /// Members of the set with their events; ends after the first error
    pub fn trails<'a>(
        &'a self,
        set: &Set,
    ) -> FunnelResult<impl Iterator<Item = FunnelResult<(EntityId, Vec<Event>)>> + 'a> {
        let trails = self.iter(set)?.map(move |element| {
            let element = element?;
            Ok((element.id, self.store.events(element.id)?))
        });
        Ok(until_error(trails))
    }

    /// One count per family predicate against the keyed funnel
    pub fn counts(&self, family: &Family, key: impl Into<Key>) -> FunnelResult<Vec<u64>> {
        let funnel_id = self.funnel_id(key)?;
        self.engine.count_family(family, funnel_id)
    }

    pub fn save(&self, sink: &mut dyn Write) -> FunnelResult<()> {
        self.engine.save(sink)
    }
}

/// Yield items up to and including the first `Err`, then stop
fn until_error<T>(
    items: impl Iterator<Item = FunnelResult<T>>,
) -> impl Iterator<Item = FunnelResult<T>> {
    items
        .scan(false, |failed, item| {
            if *failed {
                return None;
            }
            *failed = item.is_err();
            Some(item)
        })
        .fuse()
}
