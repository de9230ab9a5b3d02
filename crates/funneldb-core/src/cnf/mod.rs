//! Boolean query algebra in conjunctive normal form
//!
//! A [`Formula`] is an AND of [`Clause`]s, each clause an OR of
//! [`Literal`]s. Both levels are stored as ordered, deduplicated sets, so two
//! formulas built along different paths compare (and hash) equal whenever
//! they contain the same clauses.
//!
//! # Cost model
//!
//! `AND` is a set union and always cheap. `OR` distributes clause-wise: the
//! result of `a | b` holds `|a| × |b|` clauses, and `NOT` expands through
//! De Morgan into a chain of `OR`s, so it can blow up combinatorially for
//! wide formulas. Prefer AND-heavy construction, and use the n-ary
//! [`Formula::any`] / [`one_of`] helpers instead of folding binary `OR`s.
//!
//! # Example
//!
//! ```rust
//! use funneldb_core::cnf::{one_of, where_all, Formula};
//!
//! let signup = where_all(["signup"]);
//! let paid = one_of(["card", "invoice"]);
//! let q = &signup & &paid;
//! assert_eq!(q.to_string(), "(card | invoice) & signup");
//! assert_eq!(
//!     q.map_terms(|t| t.to_string()),
//!     Formula::parse("signup & (card | invoice)").unwrap()
//! );
//! ```

pub mod compile;
mod lexer;
mod parser;
mod token;

pub use compile::{ClauseMask, CompiledCnf, MAX_TERMS};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, Syntax};

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// A term tested plainly or negated
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal<T> {
    pub term: T,
    pub negated: bool,
}

impl<T> Literal<T> {
    pub fn new(term: T) -> Self {
        Self {
            term,
            negated: false,
        }
    }

    pub fn negative(term: T) -> Self {
        Self {
            term,
            negated: true,
        }
    }

    /// Evaluate against the truth value of the term
    pub fn holds(&self, value: bool) -> bool {
        value != self.negated
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Literal<U> {
        Literal {
            term: f(self.term),
            negated: self.negated,
        }
    }
}

impl<T> Not for Literal<T> {
    type Output = Literal<T>;

    fn not(self) -> Self::Output {
        Literal {
            term: self.term,
            negated: !self.negated,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Literal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "~{}", self.term)
        } else {
            write!(f, "{}", self.term)
        }
    }
}

/// Disjunction of literals
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Clause<T: Ord> {
    literals: BTreeSet<Literal<T>>,
}

impl<T: Ord> Clause<T> {
    pub fn new(literals: impl IntoIterator<Item = Literal<T>>) -> Self {
        Self {
            literals: literals.into_iter().collect(),
        }
    }

    pub fn literals(&self) -> impl Iterator<Item = &Literal<T>> {
        self.literals.iter()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn contains(&self, literal: &Literal<T>) -> bool {
        self.literals.contains(literal)
    }
}

impl<T: Ord + Clone> Clause<T> {
    /// OR of two clauses
    pub fn union(&self, other: &Self) -> Self {
        Self {
            literals: self.literals.union(&other.literals).cloned().collect(),
        }
    }

    /// De Morgan: the AND of every literal negated
    pub fn negate(&self) -> Formula<T> {
        Formula::new(
            self.literals
                .iter()
                .map(|l| Clause::new([!l.clone()])),
        )
    }

    /// True if some literal holds under the assignment
    pub fn evaluate(&self, mut assign: impl FnMut(&T) -> bool) -> bool {
        self.literals.iter().any(|l| l.holds(assign(&l.term)))
    }
}

impl<T: Ord + fmt::Display> fmt::Display for Clause<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", literal)?;
        }
        Ok(())
    }
}

/// Conjunction of clauses, always kept in CNF.
///
/// The empty formula has no constraint and is satisfied by everything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Formula<T: Ord> {
    clauses: BTreeSet<Clause<T>>,
}

impl<T: Ord> Default for Formula<T> {
    fn default() -> Self {
        Self {
            clauses: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> Formula<T> {
    /// Build from clauses; empty clauses are dropped.
    pub fn new(clauses: impl IntoIterator<Item = Clause<T>>) -> Self {
        Self {
            clauses: clauses.into_iter().filter(|c| !c.is_empty()).collect(),
        }
    }

    /// The formula with no clauses
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single positive literal
    pub fn literal(term: T) -> Self {
        Self::new([Clause::new([Literal::new(term)])])
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause<T>> {
        self.clauses.iter()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Distinct terms, in canonical order
    pub fn terms(&self) -> BTreeSet<&T> {
        self.clauses
            .iter()
            .flat_map(|c| c.literals().map(|l| &l.term))
            .collect()
    }

    /// AND: union of the clause sets
    pub fn and(&self, other: &Self) -> Self {
        Self {
            clauses: self.clauses.union(&other.clauses).cloned().collect(),
        }
    }

    /// OR: clause-wise distribution.
    ///
    /// An empty side short-circuits to the other side unchanged.
    pub fn or(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Self::new(
            self.clauses
                .iter()
                .flat_map(|c| other.clauses.iter().map(move |d| c.union(d))),
        )
    }

    /// NOT: De Morgan over every clause, recombined with `or`.
    pub fn negate(&self) -> Self {
        self.clauses
            .iter()
            .map(Clause::negate)
            .reduce(|acc, f| acc.or(&f))
            .unwrap_or_default()
    }

    /// n-ary AND
    pub fn all(formulas: impl IntoIterator<Item = Self>) -> Self {
        Self::new(formulas.into_iter().flat_map(|f| f.clauses))
    }

    /// n-ary OR.
    ///
    /// Single-clause operands merge into one clause before distributing, so
    /// OR-ing many literals stays linear.
    pub fn any(formulas: impl IntoIterator<Item = Self>) -> Self {
        let mut merged: Option<Clause<T>> = None;
        let mut rest: Vec<Self> = Vec::new();

        for formula in formulas {
            if formula.is_empty() {
                // Short-circuit identical to the binary `or`.
                continue;
            }
            if formula.len() == 1 {
                let clause = formula.clauses.into_iter().next();
                merged = match (merged, clause) {
                    (Some(m), Some(c)) => Some(m.union(&c)),
                    (m, c) => m.or(c),
                };
            } else {
                rest.push(formula);
            }
        }

        let head = merged.map(|c| Self::new([c])).unwrap_or_default();
        rest.iter().fold(head, |acc, f| acc.or(f))
    }

    /// Evaluate under a truth assignment of the terms
    pub fn evaluate(&self, mut assign: impl FnMut(&T) -> bool) -> bool {
        self.clauses.iter().all(|c| c.evaluate(&mut assign))
    }

    /// Rebuild with every term replaced
    pub fn map_terms<U: Ord + Clone>(&self, mut f: impl FnMut(&T) -> U) -> Formula<U> {
        Formula::new(
            self.clauses
                .iter()
                .map(|c| Clause::new(c.literals().map(|l| l.clone().map(|t| f(&t))))),
        )
    }

    /// Rebuild with every term replaced, stopping at the first error
    pub fn try_map_terms<U: Ord + Clone, E>(
        &self,
        mut f: impl FnMut(&T) -> Result<U, E>,
    ) -> Result<Formula<U>, E> {
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let mut literals = Vec::with_capacity(clause.len());
            for literal in clause.literals() {
                literals.push(Literal {
                    term: f(&literal.term)?,
                    negated: literal.negated,
                });
            }
            clauses.push(Clause::new(literals));
        }
        Ok(Formula::new(clauses))
    }
}

impl Formula<String> {
    /// Parse the standard syntax (`&`, `|`, `~`, parentheses)
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse(input, Syntax::Standard)
    }

    /// Parse the analyst syntax (`,` AND, `+` OR, `!` NOT)
    pub fn parse_extended(input: &str) -> Result<Self, ParseError> {
        parse(input, Syntax::Extended)
    }
}

impl std::str::FromStr for Formula<String> {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

impl<T: Ord + fmt::Display> fmt::Display for Formula<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wrap = self.clauses.len() > 1;
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " & ")?;
            }
            if wrap && clause.len() > 1 {
                write!(f, "({})", clause)?;
            } else {
                write!(f, "{}", clause)?;
            }
        }
        Ok(())
    }
}

impl<T: Ord + Clone> BitAnd for &Formula<T> {
    type Output = Formula<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl<T: Ord + Clone> BitAnd for Formula<T> {
    type Output = Formula<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(&rhs)
    }
}

impl<T: Ord + Clone> BitOr for &Formula<T> {
    type Output = Formula<T>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl<T: Ord + Clone> BitOr for Formula<T> {
    type Output = Formula<T>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(&rhs)
    }
}

impl<T: Ord + Clone> Not for &Formula<T> {
    type Output = Formula<T>;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl<T: Ord + Clone> Not for Formula<T> {
    type Output = Formula<T>;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

/// "At least one of": a single clause of positive literals
pub fn one_of<T: Ord + Clone>(terms: impl IntoIterator<Item = T>) -> Formula<T> {
    Formula::new([Clause::new(terms.into_iter().map(Literal::new))])
}

/// "Not every one of": a single clause of negated literals
pub fn none_of<T: Ord + Clone>(terms: impl IntoIterator<Item = T>) -> Formula<T> {
    Formula::new([Clause::new(terms.into_iter().map(Literal::negative))])
}

/// AND of every term, one singleton clause each
pub fn where_all<T: Ord + Clone>(terms: impl IntoIterator<Item = T>) -> Formula<T> {
    Formula::new(
        terms
            .into_iter()
            .map(|t| Clause::new([Literal::new(t)])),
    )
}

/// AND of every term negated, one singleton clause each
pub fn where_none<T: Ord + Clone>(terms: impl IntoIterator<Item = T>) -> Formula<T> {
    Formula::new(
        terms
            .into_iter()
            .map(|t| Clause::new([Literal::negative(t)])),
    )
}
