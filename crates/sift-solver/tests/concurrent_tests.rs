//! The interner is shared read-mostly state between parallel per-file
//! pipelines; concurrent construction of equal structures must converge on
//! identical ids.

use rayon::prelude::*;
use sift_solver::{TypeId, TypeInterner};

#[test]
fn test_concurrent_interning_is_deterministic() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = TypeInterner::new();
    let int = db.builtins.int_instance;
    let s = db.builtins.str_instance;

    let ids: Vec<TypeId> = (0..64)
        .into_par_iter()
        .map(|i| {
            // Vary construction order per thread; canonicalization must
            // erase the difference.
            if i % 2 == 0 {
                db.union(vec![int, s, TypeId::NONE])
            } else {
                db.union(vec![TypeId::NONE, db.union2(s, int)])
            }
        })
        .collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_concurrent_literal_interning() {
    let db = TypeInterner::new();
    let ids: Vec<TypeId> = (0..64)
        .into_par_iter()
        .map(|i| db.literal_int(i % 4))
        .collect();
    let distinct: std::collections::BTreeSet<TypeId> = ids.into_iter().collect();
    assert_eq!(distinct.len(), 4);
}
