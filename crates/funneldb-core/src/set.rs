//! Funnel set algebra
//!
//! Sets are immutable descriptors. A [`SimpleSet`] is one funnel filtered by
//! a predicate over entity mask bits; a [`ComplexSet`] combines child sets
//! through a predicate whose term `i` means "member of `children[i]`".
//! Children are shared through `Arc`, so a set lives as long as any parent
//! that references it and building a new set never touches an existing one.
//!
//! Sets hold no engine handle. Counting and iteration go through a
//! [`FunnelEngine`](crate::engine::FunnelEngine).

use std::ops::{BitAnd, BitOr, BitXor, Sub};
use std::sync::Arc;

use crate::cnf::{one_of, where_all, ClauseMask, CompiledCnf, MAX_TERMS};
use crate::engine::{FunnelError, FunnelId, FunnelResult};

/// One funnel filtered by a mask predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimpleSet {
    pub funnel_id: FunnelId,
    pub cnf: CompiledCnf,
}

/// A boolean combination of child sets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComplexSet {
    children: Vec<Set>,
    cnf: CompiledCnf,
}

impl ComplexSet {
    pub fn children(&self) -> &[Set] {
        &self.children
    }

    /// Predicate over child membership bits
    pub fn cnf(&self) -> &CompiledCnf {
        &self.cnf
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Set {
    Simple(Arc<SimpleSet>),
    Complex(Arc<ComplexSet>),
}

#[derive(Debug, Clone, Copy)]
enum Combinator {
    Any,
    All,
}

impl Set {
    pub fn simple(funnel_id: FunnelId, cnf: CompiledCnf) -> Self {
        Set::Simple(Arc::new(SimpleSet { funnel_id, cnf }))
    }

    /// Every member of a funnel
    pub fn funnel(funnel_id: FunnelId) -> Self {
        Self::simple(funnel_id, CompiledCnf::always())
    }

    /// Combine children under a membership predicate.
    ///
    /// At most [`MAX_TERMS`] children fit in one node, and the predicate may
    /// only reference existing children.
    pub fn complex(children: Vec<Set>, cnf: CompiledCnf) -> FunnelResult<Self> {
        if children.is_empty() {
            return Err(FunnelError::Format(
                "complex set needs at least one child".to_string(),
            ));
        }
        if children.len() > MAX_TERMS {
            return Err(FunnelError::Capacity {
                what: "child set".to_string(),
                index: children.len() - 1,
                limit: MAX_TERMS,
            });
        }
        if children.len() < MAX_TERMS {
            let valid = (1u64 << children.len()) - 1;
            for clause in cnf.clauses() {
                let used = clause.positive | clause.negative;
                if used & !valid != 0 {
                    let index = (63 - (used & !valid).leading_zeros()) as usize;
                    return Err(FunnelError::Format(format!(
                        "predicate references child {} of {}",
                        index,
                        children.len()
                    )));
                }
            }
        }
        Ok(Set::Complex(Arc::new(ComplexSet { children, cnf })))
    }

    /// Two-child node; bit 0 is `a`, bit 1 is `b`
    fn pair(a: &Set, b: &Set, clauses: &[(u64, u64)]) -> Set {
        let clauses = clauses
            .iter()
            .map(|&(positive, negative)| ClauseMask { positive, negative })
            .collect();
        Set::Complex(Arc::new(ComplexSet {
            children: vec![a.clone(), b.clone()],
            cnf: CompiledCnf::from_clauses(clauses),
        }))
    }

    /// Members of both
    pub fn and(&self, other: &Set) -> Set {
        Self::pair(self, other, &[(0b01, 0), (0b10, 0)])
    }

    /// Members of either
    pub fn or(&self, other: &Set) -> Set {
        Self::pair(self, other, &[(0b11, 0)])
    }

    /// Members of exactly one: `(a | b) & (~a | ~b)`
    pub fn xor(&self, other: &Set) -> Set {
        Self::pair(self, other, &[(0b11, 0), (0, 0b11)])
    }

    /// Members of `self` that are not in `other`
    pub fn sub(&self, other: &Set) -> Set {
        Self::pair(self, other, &[(0b01, 0), (0, 0b10)])
    }

    /// Members of at least one set, over any number of sets
    pub fn any(sets: impl IntoIterator<Item = Set>) -> FunnelResult<Set> {
        Self::combine(sets.into_iter().collect(), Combinator::Any)
    }

    /// Members of every set, over any number of sets
    pub fn all(sets: impl IntoIterator<Item = Set>) -> FunnelResult<Set> {
        Self::combine(sets.into_iter().collect(), Combinator::All)
    }

    fn combine(mut sets: Vec<Set>, op: Combinator) -> FunnelResult<Set> {
        if sets.is_empty() {
            return Err(FunnelError::Format(format!(
                "{:?} needs at least one set",
                op
            )));
        }
        if sets.len() > MAX_TERMS {
            let rest = sets.split_off(MAX_TERMS - 1);
            tracing::trace!(op = ?op, remainder = rest.len(), "wrapping sets past the width limit");
            sets.push(Self::combine(rest, op)?);
        }

        let terms = 0..sets.len();
        let formula = match op {
            Combinator::Any => one_of(terms),
            Combinator::All => where_all(terms),
        };
        let cnf = CompiledCnf::compile(&formula, |&i| Ok(i))?;
        Self::complex(sets, cnf)
    }

    pub fn as_simple(&self) -> Option<&SimpleSet> {
        match self {
            Set::Simple(s) => Some(s),
            Set::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexSet> {
        match self {
            Set::Simple(_) => None,
            Set::Complex(c) => Some(c),
        }
    }

    /// Distinct funnels the set reads from, in first-visit order
    pub fn funnel_ids(&self) -> Vec<FunnelId> {
        let mut ids = Vec::new();
        self.collect_funnels(&mut ids);
        ids
    }

    fn collect_funnels(&self, ids: &mut Vec<FunnelId>) {
        match self {
            Set::Simple(s) => {
                if !ids.contains(&s.funnel_id) {
                    ids.push(s.funnel_id);
                }
            }
            Set::Complex(c) => {
                for child in &c.children {
                    child.collect_funnels(ids);
                }
            }
        }
    }

    /// Longest path to a leaf; a simple set has depth 1
    pub fn depth(&self) -> usize {
        match self {
            Set::Simple(_) => 1,
            Set::Complex(c) => 1 + c.children.iter().map(Set::depth).max().unwrap_or(0),
        }
    }
}

impl BitAnd for &Set {
    type Output = Set;

    fn bitand(self, rhs: Self) -> Set {
        self.and(rhs)
    }
}

impl BitOr for &Set {
    type Output = Set;

    fn bitor(self, rhs: Self) -> Set {
        self.or(rhs)
    }
}

impl BitXor for &Set {
    type Output = Set;

    fn bitxor(self, rhs: Self) -> Set {
        self.xor(rhs)
    }
}

impl Sub for &Set {
    type Output = Set;

    fn sub(self, rhs: Self) -> Set {
        Set::sub(self, rhs)
    }
}
