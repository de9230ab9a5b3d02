//! Predicate families
//!
//! A family is an ordered batch of mask predicates counted together against
//! one funnel, so the engine resolves the funnel once for the whole batch.

use crate::cnf::CompiledCnf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Family {
    cnfs: Vec<CompiledCnf>,
}

impl Family {
    pub fn new(cnfs: Vec<CompiledCnf>) -> Self {
        Self { cnfs }
    }

    pub fn push(&mut self, cnf: CompiledCnf) {
        self.cnfs.push(cnf);
    }

    /// Predicates in construction order
    pub fn cnfs(&self) -> &[CompiledCnf] {
        &self.cnfs
    }

    pub fn len(&self) -> usize {
        self.cnfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cnfs.is_empty()
    }
}

impl FromIterator<CompiledCnf> for Family {
    fn from_iter<I: IntoIterator<Item = CompiledCnf>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
