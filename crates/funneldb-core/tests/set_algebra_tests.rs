//! Set algebra tests against a stub funnel engine

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use funneldb_core::{
    where_all, CompiledCnf, Element, Elements, EntityId, Family, FunnelEngine, FunnelError,
    FunnelId, FunnelResult, Mask, MemoryEngine, Set,
};
use pretty_assertions::assert_eq;

/// Reference evaluator: walks the set tree for every known entity.
struct StubEngine {
    funnels: Vec<BTreeMap<EntityId, Mask>>,
}

impl StubEngine {
    fn new(funnels: Vec<Vec<(EntityId, Mask)>>) -> Self {
        Self {
            funnels: funnels
                .into_iter()
                .map(|f| f.into_iter().collect())
                .collect(),
        }
    }

    fn entities(&self) -> BTreeSet<EntityId> {
        self.funnels.iter().flat_map(|f| f.keys().copied()).collect()
    }

    fn is_member(&self, set: &Set, id: EntityId) -> FunnelResult<bool> {
        match set {
            Set::Simple(s) => {
                let funnel = self
                    .funnels
                    .get(s.funnel_id as usize)
                    .ok_or_else(|| FunnelError::NotFound(format!("funnel {}", s.funnel_id)))?;
                Ok(funnel.get(&id).is_some_and(|&mask| s.cnf.matches(mask)))
            }
            Set::Complex(c) => {
                let mut bits = 0u64;
                for (i, child) in c.children().iter().enumerate() {
                    if self.is_member(child, id)? {
                        bits |= 1 << i;
                    }
                }
                Ok(c.cnf().matches(bits))
            }
        }
    }

    fn members(&self, set: &Set) -> FunnelResult<Vec<EntityId>> {
        let mut out = Vec::new();
        for id in self.entities() {
            if self.is_member(set, id)? {
                out.push(id);
            }
        }
        Ok(out)
    }
}

impl FunnelEngine for StubEngine {
    fn num_funnels(&self) -> u64 {
        self.funnels.len() as u64
    }

    fn count(&self, set: &Set) -> FunnelResult<u64> {
        Ok(self.members(set)?.len() as u64)
    }

    fn count_family(&self, family: &Family, funnel_id: FunnelId) -> FunnelResult<Vec<u64>> {
        let funnel = self
            .funnels
            .get(funnel_id as usize)
            .ok_or_else(|| FunnelError::NotFound(format!("funnel {}", funnel_id)))?;
        Ok(family
            .cnfs()
            .iter()
            .map(|cnf| funnel.values().filter(|&&m| cnf.matches(m)).count() as u64)
            .collect())
    }

    fn iter<'a>(&'a self, set: &Set) -> FunnelResult<Elements<'a>> {
        let ids = self.members(set)?;
        Ok(Box::new(
            ids.into_iter().map(|id| Ok(Element { id, mask: 0 })),
        ))
    }

    fn save(&self, _sink: &mut dyn Write) -> FunnelResult<()> {
        Err(FunnelError::Engine("stub cannot save".to_string()))
    }
}

fn bit(i: usize) -> CompiledCnf {
    CompiledCnf::compile(&where_all([i]), |&i| Ok(i)).unwrap()
}

fn ids(engine: &impl FunnelEngine, set: &Set) -> Vec<EntityId> {
    engine.iter(set).unwrap().map(|e| e.unwrap().id).collect()
}

#[test]
fn test_end_to_end_masks() {
    let engine = StubEngine::new(vec![vec![(1, 0b101), (2, 0b011), (3, 0b110)]]);

    let bit0 = Set::simple(0, bit(0));
    let bit2 = Set::simple(0, bit(2));
    assert_eq!(ids(&engine, &bit0), vec![1, 2]);
    assert_eq!(ids(&engine, &(&bit0 - &bit2)), vec![2]);
}

#[test]
fn test_memory_engine_agrees_with_stub() {
    let masks = vec![(1, 0b101), (2, 0b011), (3, 0b110)];
    let stub = StubEngine::new(vec![masks.clone(), vec![(3, 1), (4, 1)]]);
    let mut memory = MemoryEngine::new(2);
    for (id, mask) in masks {
        memory.insert(0, id, mask).unwrap();
    }
    memory.insert(1, 3, 1).unwrap();
    memory.insert(1, 4, 1).unwrap();

    let a = Set::simple(0, bit(1));
    let b = Set::funnel(1);
    let c = Set::simple(0, bit(2));
    for set in [&a & &b, &a | &b, &a ^ &c, &(&a | &b) - &c] {
        assert_eq!(ids(&stub, &set), ids(&memory, &set));
    }
}

#[test]
fn test_set_algebra_laws() {
    let engine = StubEngine::new(vec![
        vec![(1, 0), (2, 0), (3, 0), (5, 0), (8, 0)],
        vec![(2, 0), (3, 0), (4, 0), (8, 0), (9, 0)],
    ]);
    let a = Set::funnel(0);
    let b = Set::funnel(1);

    let count = |s: &Set| engine.count(s).unwrap();
    assert_eq!(count(&(&a & &b)) + count(&(&a - &b)), count(&a));
    assert_eq!(count(&(&a ^ &b)), count(&(&a | &b)) - count(&(&a & &b)));
    assert_eq!(count(&(&a & &b)), 3);
    assert_eq!(count(&(&a ^ &b)), 4);
}

/// Every entity sits in every funnel, except multiples of 5, which miss
/// every third funnel, and entity 17, which misses funnel 65 only.
fn wide_engine(width: usize) -> (StubEngine, Vec<Vec<(EntityId, Mask)>>) {
    let funnels: Vec<Vec<(EntityId, Mask)>> = (0..width)
        .map(|f| {
            (0..40u32)
                .filter(|&e| e % 5 != 0 || (e as usize * 7 + f) % 3 != 0)
                .filter(|&e| e != 17 || f != 65)
                .map(|e| (e, 0))
                .collect()
        })
        .collect();
    (StubEngine::new(funnels.clone()), funnels)
}

#[test]
fn test_all_past_width_limit_matches_reference() {
    let (engine, funnels) = wide_engine(70);
    let sets: Vec<Set> = (0..70).map(Set::funnel).collect();
    let all = Set::all(sets).unwrap();

    let expected: Vec<EntityId> = engine
        .entities()
        .into_iter()
        .filter(|e| funnels.iter().all(|f| f.iter().any(|(id, _)| id == e)))
        .collect();

    assert!(!expected.is_empty());
    assert!(!expected.contains(&17));
    assert_eq!(ids(&engine, &all), expected);
}

#[test]
fn test_any_past_width_limit_matches_reference() {
    let funnels: Vec<Vec<(EntityId, Mask)>> = (0..130u32).map(|f| vec![(f, 0)]).collect();
    let engine = StubEngine::new(funnels);
    let any = Set::any((0..130).map(Set::funnel)).unwrap();
    assert_eq!(engine.count(&any).unwrap(), 130);

    let only_late = Set::any((100..130).map(Set::funnel)).unwrap();
    assert_eq!(ids(&engine, &only_late), (100..130).collect::<Vec<_>>());
}

#[test]
fn test_dropping_a_set_keeps_siblings() {
    let engine = StubEngine::new(vec![vec![(1, 0)], vec![(1, 0), (2, 0)]]);
    let a = Set::funnel(0);
    let b = Set::funnel(1);
    let both = &a & &b;
    let either = &a | &b;
    drop(both);
    drop(a);
    assert_eq!(ids(&engine, &either), vec![1, 2]);
}

/// Engine whose every call fails, and whose scans fail after one element
struct BrokenEngine;

impl FunnelEngine for BrokenEngine {
    fn num_funnels(&self) -> u64 {
        1
    }

    fn count(&self, _set: &Set) -> FunnelResult<u64> {
        Err(FunnelError::Engine("status 5: index corrupted".to_string()))
    }

    fn count_family(&self, _family: &Family, _funnel_id: FunnelId) -> FunnelResult<Vec<u64>> {
        Err(FunnelError::Engine("status 5: index corrupted".to_string()))
    }

    fn iter<'a>(&'a self, _set: &Set) -> FunnelResult<Elements<'a>> {
        let items = vec![
            Ok(Element { id: 1, mask: 0 }),
            Err(FunnelError::Engine("status 7: read failed".to_string())),
        ];
        Ok(Box::new(items.into_iter()))
    }

    fn save(&self, _sink: &mut dyn Write) -> FunnelResult<()> {
        Err(FunnelError::Engine("status 9: disk full".to_string()))
    }
}

#[test]
fn test_engine_errors_propagate() {
    let engine = BrokenEngine;
    let set = Set::funnel(0);

    let err = engine.count(&set).unwrap_err();
    assert_eq!(err.to_string(), "engine error: status 5: index corrupted");

    let items: Vec<_> = engine.iter(&set).unwrap().collect();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(FunnelError::Engine(_))));
}
