//! Bitmask compilation of CNF formulas
//!
//! Each term of a formula is mapped to a bit position below [`MAX_TERMS`] and
//! each clause becomes a `(positive, negative)` pair of masks. Given an
//! entity mask `m`, a clause is satisfied iff
//! `(m & positive) != 0 || (!m & negative) != 0`, and the compiled formula is
//! satisfied iff every clause is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Formula;
use crate::engine::{FunnelError, FunnelResult};

/// Hard limit on distinct bit positions in one compiled formula
pub const MAX_TERMS: usize = 64;

/// One compiled clause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClauseMask {
    pub positive: u64,
    pub negative: u64,
}

impl ClauseMask {
    pub fn matches(&self, mask: u64) -> bool {
        (mask & self.positive) != 0 || (!mask & self.negative) != 0
    }
}

/// A formula compiled to one mask pair per clause.
///
/// The empty compiled formula matches every mask.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompiledCnf {
    clauses: Vec<ClauseMask>,
}

impl CompiledCnf {
    /// Matches everything
    pub fn always() -> Self {
        Self::default()
    }

    pub fn from_clauses(clauses: Vec<ClauseMask>) -> Self {
        Self { clauses }
    }

    /// Compile using a caller-supplied term to bit position mapping.
    ///
    /// Fails with [`FunnelError::Capacity`] when a mapped position is not
    /// below [`MAX_TERMS`]; errors from the mapping itself propagate.
    pub fn compile<T, F>(formula: &Formula<T>, mut mapping: F) -> FunnelResult<Self>
    where
        T: Ord + Clone,
        F: FnMut(&T) -> FunnelResult<usize>,
    {
        let mut clauses = Vec::with_capacity(formula.len());
        for clause in formula.clauses() {
            let mut compiled = ClauseMask::default();
            for literal in clause.literals() {
                let index = mapping(&literal.term)?;
                if index >= MAX_TERMS {
                    return Err(FunnelError::Capacity {
                        what: "term index".to_string(),
                        index,
                        limit: MAX_TERMS,
                    });
                }
                if literal.negated {
                    compiled.negative |= 1 << index;
                } else {
                    compiled.positive |= 1 << index;
                }
            }
            clauses.push(compiled);
        }
        Ok(Self { clauses })
    }

    /// Compile assigning each distinct term the next free bit, in canonical
    /// term order. Returns the terms indexed by bit position.
    pub fn compile_dense<T: Ord + Clone>(formula: &Formula<T>) -> FunnelResult<(Self, Vec<T>)> {
        let terms: Vec<T> = formula.terms().into_iter().cloned().collect();
        if terms.len() > MAX_TERMS {
            return Err(FunnelError::Capacity {
                what: "distinct terms".to_string(),
                index: terms.len() - 1,
                limit: MAX_TERMS,
            });
        }
        let positions: BTreeMap<&T, usize> =
            terms.iter().enumerate().map(|(i, t)| (t, i)).collect();
        let compiled = Self::compile(formula, |t| {
            positions
                .get(t)
                .copied()
                .ok_or_else(|| FunnelError::NotFound("term".to_string()))
        })?;
        Ok((compiled, terms))
    }

    pub fn clauses(&self) -> &[ClauseMask] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Every clause satisfied by `mask`
    pub fn matches(&self, mask: u64) -> bool {
        self.clauses.iter().all(|c| c.matches(mask))
    }
}
