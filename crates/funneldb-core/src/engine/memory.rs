//! In-memory backends
//!
//! A dictionary-encoded trail store and a map-based funnel engine, for
//! tests, development and small datasets that fit in memory.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Write};

use crate::engine::error::{FunnelError, FunnelResult};
use crate::engine::traits::{
    check_funnel, Element, Elements, EntityId, Event, FieldId, FunnelEngine, FunnelId, Mask,
    TrailStore,
};
use crate::family::Family;
use crate::filter::EventFilter;
use crate::keys::KeyIndex;
use crate::params::IndexParams;
use crate::set::Set;

/// In-memory trail store.
///
/// Values are interned per field as they are added; the first distinct
/// value of a field gets number 1.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrailStore {
    fields: Vec<String>,
    lexicons: Vec<Vec<String>>,
    lookup: Vec<HashMap<String, u64>>,
    trails: Vec<Vec<Event>>,
}

impl MemoryTrailStore {
    pub fn new<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let n = fields.len();
        Self {
            fields,
            lexicons: vec![Vec::new(); n],
            lookup: vec![HashMap::new(); n],
            trails: Vec::new(),
        }
    }

    /// Append an event to a trail, one value per field.
    ///
    /// An empty string leaves the field unset. Trails in between that were
    /// never written stay empty.
    pub fn add(&mut self, trail: EntityId, timestamp: u64, values: &[&str]) -> FunnelResult<()> {
        if values.len() != self.fields.len() {
            return Err(FunnelError::Format(format!(
                "event has {} values, store has {} fields",
                values.len(),
                self.fields.len()
            )));
        }

        let mut encoded = Vec::with_capacity(values.len());
        for (field, value) in values.iter().enumerate() {
            encoded.push(self.intern(field, value));
        }

        let trail = trail as usize;
        if trail >= self.trails.len() {
            self.trails.resize_with(trail + 1, Vec::new);
        }
        let events = &mut self.trails[trail];
        let at = events.partition_point(|e| e.timestamp <= timestamp);
        events.insert(
            at,
            Event {
                timestamp,
                values: encoded,
            },
        );
        Ok(())
    }

    fn intern(&mut self, field: usize, value: &str) -> u64 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&val) = self.lookup[field].get(value) {
            return val;
        }
        self.lexicons[field].push(value.to_string());
        let val = self.lexicons[field].len() as u64;
        self.lookup[field].insert(value.to_string(), val);
        val
    }

    /// Trails with at least one event matching the filter
    pub fn matching(&self, filter: &EventFilter) -> Vec<EntityId> {
        self.trails
            .iter()
            .enumerate()
            .filter(|(_, events)| events.iter().any(|e| filter.matches(e)))
            .map(|(id, _)| id as EntityId)
            .collect()
    }

    fn check_field(&self, field: FieldId) -> FunnelResult<usize> {
        let index = field as usize;
        if index >= self.fields.len() {
            return Err(FunnelError::NotFound(format!("field id {}", field)));
        }
        Ok(index)
    }
}

impl TrailStore for MemoryTrailStore {
    fn num_fields(&self) -> usize {
        self.fields.len()
    }

    fn field(&self, name: &str) -> FunnelResult<FieldId> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|i| i as FieldId)
            .ok_or_else(|| FunnelError::NotFound(format!("field '{}'", name)))
    }

    fn field_name(&self, field: FieldId) -> FunnelResult<&str> {
        let index = self.check_field(field)?;
        Ok(&self.fields[index])
    }

    fn lexicon_size(&self, field: FieldId) -> FunnelResult<u64> {
        let index = self.check_field(field)?;
        Ok(self.lexicons[index].len() as u64)
    }

    fn lexicon_word(&self, field: FieldId, val: u64) -> FunnelResult<&str> {
        let index = self.check_field(field)?;
        val.checked_sub(1)
            .and_then(|i| self.lexicons[index].get(i as usize))
            .map(String::as_str)
            .ok_or_else(|| {
                FunnelError::NotFound(format!("value {} of field '{}'", val, self.fields[index]))
            })
    }

    fn lexicon_val(&self, field: FieldId, value: &str) -> FunnelResult<u64> {
        let index = self.check_field(field)?;
        self.lookup[index].get(value).copied().ok_or_else(|| {
            FunnelError::NotFound(format!("value '{}' of field '{}'", value, self.fields[index]))
        })
    }

    fn num_trails(&self) -> u64 {
        self.trails.len() as u64
    }

    fn events(&self, trail: EntityId) -> FunnelResult<Vec<Event>> {
        self.trails
            .get(trail as usize)
            .cloned()
            .ok_or_else(|| FunnelError::NotFound(format!("trail {}", trail)))
    }
}

/// In-memory funnel index: one `entity -> mask` map per non-empty funnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEngine {
    num_funnels: u64,
    funnels: BTreeMap<FunnelId, BTreeMap<EntityId, Mask>>,
}

impl MemoryEngine {
    /// An index of `num_funnels` empty funnels
    pub fn new(num_funnels: u64) -> Self {
        Self {
            num_funnels,
            funnels: BTreeMap::new(),
        }
    }

    /// Build the index from a trail store.
    ///
    /// Each event lands in one funnel per key group. Its mask-field value
    /// `v`, when set, turns on bit `v` of the entity's mask in each of those
    /// funnels.
    pub fn build<S: TrailStore>(store: &S, params: &IndexParams) -> FunnelResult<Self> {
        let index = KeyIndex::new(store, params)?;
        let mask_field = index.mask_field();
        let mut engine = Self::new(index.num_funnels());

        let mut events = 0usize;
        for trail in 0..store.num_trails() {
            let id = EntityId::try_from(trail).map_err(|_| FunnelError::Capacity {
                what: "trail id".to_string(),
                index: usize::try_from(trail).unwrap_or(usize::MAX),
                limit: EntityId::MAX as usize,
            })?;
            for event in store.events(id)? {
                let bits = match mask_field.map(|f| event.value(f)) {
                    Some(v) if v != 0 => 1 << v,
                    _ => 0,
                };
                for group in 0..index.num_groups() {
                    engine.insert(index.event_funnel(group, &event)?, id, bits)?;
                }
                events += 1;
            }
        }

        tracing::debug!(
            trails = store.num_trails(),
            events,
            funnels = engine.num_funnels,
            populated = engine.funnels.len(),
            "built funnel index"
        );
        Ok(engine)
    }

    /// Read an index written by [`FunnelEngine::save`]
    pub fn load<R: Read>(source: R) -> FunnelResult<Self> {
        let engine: Self = serde_json::from_reader(source)?;
        if let Some(id) = engine
            .funnels
            .keys()
            .find(|&&id| u64::from(id) >= engine.num_funnels)
        {
            return Err(FunnelError::Format(format!(
                "funnel id {} beyond index size {}",
                id, engine.num_funnels
            )));
        }
        Ok(engine)
    }

    /// Add an entity to a funnel, OR-ing `bits` into its mask
    pub fn insert(&mut self, funnel_id: FunnelId, entity: EntityId, bits: Mask) -> FunnelResult<()> {
        check_funnel(self.num_funnels, funnel_id)?;
        *self
            .funnels
            .entry(funnel_id)
            .or_default()
            .entry(entity)
            .or_insert(0) |= bits;
        Ok(())
    }

    /// Members of one funnel with their masks
    pub fn funnel(&self, funnel_id: FunnelId) -> FunnelResult<Vec<Element>> {
        check_funnel(self.num_funnels, funnel_id)?;
        Ok(self
            .funnels
            .get(&funnel_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(&id, &mask)| Element { id, mask })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn validate(&self, set: &Set) -> FunnelResult<Vec<FunnelId>> {
        let ids = set.funnel_ids();
        for &id in &ids {
            check_funnel(self.num_funnels, id)?;
        }
        Ok(ids)
    }

    /// Every entity in any funnel the set reads from
    fn universe(&self, funnel_ids: &[FunnelId]) -> BTreeSet<EntityId> {
        funnel_ids
            .iter()
            .filter_map(|id| self.funnels.get(id))
            .flat_map(|members| members.keys().copied())
            .collect()
    }

    /// Mask of `entity` if it is a member of `set`.
    ///
    /// For a complex set the mask is the child membership bits.
    fn member(&self, set: &Set, entity: EntityId) -> Option<Mask> {
        match set {
            Set::Simple(simple) => self
                .funnels
                .get(&simple.funnel_id)?
                .get(&entity)
                .copied()
                .filter(|&mask| simple.cnf.matches(mask)),
            Set::Complex(complex) => {
                let bits = complex
                    .children()
                    .iter()
                    .enumerate()
                    .filter(|(_, child)| self.member(child, entity).is_some())
                    .fold(0, |acc, (i, _)| acc | 1 << i);
                Some(bits).filter(|&bits| complex.cnf().matches(bits))
            }
        }
    }
}

impl FunnelEngine for MemoryEngine {
    fn num_funnels(&self) -> u64 {
        self.num_funnels
    }

    fn count(&self, set: &Set) -> FunnelResult<u64> {
        let ids = self.validate(set)?;
        Ok(self
            .universe(&ids)
            .into_iter()
            .filter(|&id| self.member(set, id).is_some())
            .count() as u64)
    }

    fn count_family(&self, family: &Family, funnel_id: FunnelId) -> FunnelResult<Vec<u64>> {
        check_funnel(self.num_funnels, funnel_id)?;
        let members = self.funnels.get(&funnel_id);
        Ok(family
            .cnfs()
            .iter()
            .map(|cnf| {
                members
                    .map(|m| m.values().filter(|&&mask| cnf.matches(mask)).count() as u64)
                    .unwrap_or(0)
            })
            .collect())
    }

    fn iter<'a>(&'a self, set: &Set) -> FunnelResult<Elements<'a>> {
        let ids = self.validate(set)?;
        let set = set.clone();
        Ok(Box::new(self.universe(&ids).into_iter().filter_map(
            move |id| self.member(&set, id).map(|mask| Ok(Element { id, mask })),
        )))
    }

    fn save(&self, sink: &mut dyn Write) -> FunnelResult<()> {
        serde_json::to_writer(sink, self)
            .map_err(|e| FunnelError::Engine(format!("failed to write index: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnf::{where_all, CompiledCnf};
    use pretty_assertions::assert_eq;

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new(2);
        engine.insert(0, 1, 0b101).unwrap();
        engine.insert(0, 2, 0b011).unwrap();
        engine.insert(0, 3, 0b110).unwrap();
        engine.insert(1, 3, 0).unwrap();
        engine
    }

    fn bit(i: usize) -> CompiledCnf {
        CompiledCnf::compile(&where_all([i]), |&i| Ok(i)).unwrap()
    }

    fn ids(engine: &MemoryEngine, set: &Set) -> Vec<EntityId> {
        engine
            .iter(set)
            .unwrap()
            .map(|e| e.unwrap().id)
            .collect()
    }

    #[test]
    fn test_store_interns_values() {
        let mut store = MemoryTrailStore::new(["country", "type"]);
        store.add(0, 5, &["US", "view"]).unwrap();
        store.add(0, 1, &["US", ""]).unwrap();
        store.add(2, 3, &["FI", "buy"]).unwrap();

        assert_eq!(store.num_trails(), 3);
        assert_eq!(store.lexicon(0).unwrap(), vec!["US", "FI"]);
        assert_eq!(store.lexicon_val(1, "buy").unwrap(), 2);
        assert_eq!(store.lexicon_word(1, 1).unwrap(), "view");
        assert!(store.lexicon_word(1, 0).is_err());

        let events = store.events(0).unwrap();
        assert_eq!(events[0].timestamp, 1);
        assert_eq!(events[0].values, vec![1, 0]);
        assert!(store.events(1).unwrap().is_empty());
    }

    #[test]
    fn test_store_rejects_wrong_arity() {
        let mut store = MemoryTrailStore::new(["a"]);
        assert!(matches!(
            store.add(0, 0, &["x", "y"]),
            Err(FunnelError::Format(_))
        ));
    }

    #[test]
    fn test_insert_ors_bits() {
        let mut engine = MemoryEngine::new(1);
        engine.insert(0, 9, 0b01).unwrap();
        engine.insert(0, 9, 0b10).unwrap();
        assert_eq!(engine.funnel(0).unwrap(), vec![Element { id: 9, mask: 0b11 }]);
        assert!(matches!(
            engine.insert(1, 9, 0),
            Err(FunnelError::NotFound(_))
        ));
    }

    #[test]
    fn test_simple_and_complex_members() {
        let engine = engine();
        let has0 = Set::simple(0, bit(0));
        let has2 = Set::simple(0, bit(2));
        assert_eq!(ids(&engine, &has0), vec![1, 2]);
        assert_eq!(ids(&engine, &(&has0 - &has2)), vec![2]);
        assert_eq!(engine.count(&(&has0 | &Set::funnel(1))).unwrap(), 3);

        let elements: Vec<Element> = engine
            .iter(&(&has0 & &has2))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(elements, vec![Element { id: 1, mask: 0b11 }]);
    }

    #[test]
    fn test_unknown_funnel() {
        let engine = engine();
        let set = &Set::funnel(0) & &Set::funnel(7);
        assert!(matches!(engine.count(&set), Err(FunnelError::NotFound(_))));
        assert!(engine.iter(&set).is_err());
    }

    #[test]
    fn test_count_family() {
        let engine = engine();
        let family = Family::new(vec![CompiledCnf::always(), bit(0), bit(1), bit(5)]);
        assert_eq!(engine.count_family(&family, 0).unwrap(), vec![3, 2, 2, 0]);
        assert_eq!(engine.count_family(&family, 1).unwrap(), vec![1, 0, 0, 0]);
        assert!(engine.count_family(&family, 2).is_err());
    }

    #[test]
    fn test_save_load() {
        let engine = engine();
        let mut buf = Vec::new();
        engine.save(&mut buf).unwrap();
        assert_eq!(MemoryEngine::load(buf.as_slice()).unwrap(), engine);
    }

    #[test]
    fn test_load_malformed() {
        assert!(matches!(
            MemoryEngine::load("not json".as_bytes()),
            Err(FunnelError::Format(_))
        ));
        let out_of_range = r#"{"num_funnels": 1, "funnels": {"4": {"1": 0}}}"#;
        assert!(matches!(
            MemoryEngine::load(out_of_range.as_bytes()),
            Err(FunnelError::Format(_))
        ));
    }

    #[test]
    fn test_build() {
        let mut store = MemoryTrailStore::new(["country", "step"]);
        store.add(0, 1, &["US", "visit"]).unwrap();
        store.add(0, 2, &["US", "signup"]).unwrap();
        store.add(1, 1, &["FI", "visit"]).unwrap();
        store.add(2, 1, &["FI", ""]).unwrap();

        let params = IndexParams::default().group("country").mask("step");
        let engine = MemoryEngine::build(&store, &params).unwrap();
        // [] -> 0, country -> 1 + 0..=2
        assert_eq!(engine.num_funnels(), 4);
        assert_eq!(
            engine.funnel(0).unwrap(),
            vec![
                Element { id: 0, mask: 0b110 },
                Element { id: 1, mask: 0b010 },
                Element { id: 2, mask: 0 },
            ]
        );
        assert_eq!(engine.funnel(2).unwrap(), vec![Element { id: 0, mask: 0b110 }]);
        assert_eq!(engine.funnel(1).unwrap(), vec![]);
    }
}
