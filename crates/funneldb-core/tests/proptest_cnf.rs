//! Property tests for the CNF algebra and its compiler

use funneldb_core::{where_all, CompiledCnf, Formula, Literal};
use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const TERMS: [&str; 4] = ["a", "b", "c", "d"];

/// A single literal over four terms
fn arb_literal() -> impl Strategy<Value = Formula<String>> {
    (0..TERMS.len(), any::<bool>()).prop_map(|(i, negated)| {
        let term = TERMS[i].to_string();
        if negated {
            !Formula::literal(term)
        } else {
            Formula::literal(term)
        }
    })
}

/// Small formulas built from AND, OR and NOT over four terms
fn arb_formula() -> impl Strategy<Value = Formula<String>> {
    arb_literal().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a & b),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a | b),
            inner.prop_map(|a| !a),
        ]
    })
}

/// Formulas of positive literals joined by AND and OR only
fn arb_positive_formula() -> impl Strategy<Value = Formula<String>> {
    let leaf = (0..TERMS.len()).prop_map(|i| Formula::literal(TERMS[i].to_string()));
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a & b),
            (inner.clone(), inner).prop_map(|(a, b)| a | b),
        ]
    })
}

fn assignments() -> impl Iterator<Item = [bool; 4]> {
    (0..16u8).map(|bits| [0, 1, 2, 3].map(|i| bits & (1 << i) != 0))
}

fn eval(f: &Formula<String>, v: [bool; 4]) -> bool {
    f.evaluate(|t| {
        let i = TERMS.iter().position(|x| *x == t.as_str()).unwrap_or(0);
        v[i]
    })
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

proptest! {
    /// AND commutes, and equal formulas hash equally
    #[test]
    fn and_is_canonical(a in arb_formula(), b in arb_formula()) {
        let ab = &a & &b;
        let ba = &b & &a;
        prop_assert_eq!(&ab, &ba);
        prop_assert_eq!(hash_of(&ab), hash_of(&ba));
    }

    /// OR of two conjunctions holds exactly when one side holds
    #[test]
    fn or_distributes(
        x in proptest::sample::subsequence(TERMS.to_vec(), 1..=2),
        y in proptest::sample::subsequence(TERMS.to_vec(), 1..=2),
    ) {
        let fx = where_all(x.iter().map(|t| t.to_string()));
        let fy = where_all(y.iter().map(|t| t.to_string()));
        let f = &fx | &fy;
        for v in assignments() {
            prop_assert_eq!(eval(&f, v), eval(&fx, v) || eval(&fy, v));
        }
    }

    /// NOT(NOT(f)) agrees with f on every assignment
    #[test]
    fn double_negation(f in arb_formula()) {
        let g = !!&f;
        for v in assignments() {
            prop_assert_eq!(eval(&f, v), eval(&g, v));
        }
    }

    /// NOT(f) disagrees with f on every assignment
    #[test]
    fn negation_flips(f in arb_formula()) {
        let g = !&f;
        for v in assignments() {
            prop_assert_eq!(eval(&f, v), !eval(&g, v));
        }
    }

    /// Printing and re-parsing keeps the meaning
    #[test]
    fn display_parse_roundtrip(f in arb_positive_formula()) {
        let printed = f.to_string();
        let parsed = Formula::parse(&printed).unwrap();
        for v in assignments() {
            prop_assert_eq!(eval(&f, v), eval(&parsed, v));
        }
    }

    /// Negated formulas round trip through the printer as well
    #[test]
    fn display_parse_roundtrip_with_negation(f in arb_formula()) {
        let parsed = Formula::parse(&f.to_string()).unwrap();
        prop_assert_eq!(parsed, f);
    }

    /// The compiled form agrees with direct evaluation on every mask
    #[test]
    fn compiled_matches_evaluation(f in arb_formula()) {
        let compiled = CompiledCnf::compile(&f, |t| {
            Ok(TERMS.iter().position(|x| *x == t.as_str()).unwrap_or(0))
        }).unwrap();
        for v in assignments() {
            let mask = v.iter().enumerate().fold(0u64, |m, (i, &b)| m | (u64::from(b) << i));
            prop_assert_eq!(compiled.matches(mask), eval(&f, v));
        }
    }

    /// Literal negation is an involution
    #[test]
    fn literal_negation(i in 0..TERMS.len(), negated in any::<bool>()) {
        let lit = Literal { term: TERMS[i], negated };
        prop_assert_eq!(!!lit.clone(), lit);
    }
}
