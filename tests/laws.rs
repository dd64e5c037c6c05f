// Property-based tests for the engine laws: identity, select/transform
// correspondence, composition, the setval constant law, shape
// preservation, and determinism.
//
// Structures are generated with a known top-level layout (so every pooled
// path applies) plus fully arbitrary trees for the walker laws.

use proptest::prelude::*;

use deepnav::navigators::{multi_path, walker, ALL};
use deepnav::{path, select, setval, transform, val, NativeFn, PathElem, Result, Value};

fn number() -> NativeFn {
    NativeFn::pred("number?", |v| v.as_int().is_some())
}

fn inc(_vals: &[Value], v: &Value) -> Result<Value> {
    Ok(val!(v.as_int().unwrap() + 1))
}

fn int_vec(ns: Vec<i64>) -> Value {
    Value::vector(ns.into_iter().map(Value::from).collect())
}

/// A structure with a fixed top-level layout: {"a": [ints], "b": {"c":
/// [ints]}, "d": int}. Every pooled path below applies to it, and every
/// pooled path points only at integers.
fn arb_db() -> impl Strategy<Value = Value> {
    (
        prop::collection::vec(-50i64..50, 0..5),
        prop::collection::vec(-50i64..50, 0..4),
        -50i64..50,
    )
        .prop_map(|(a, c, d)| {
            val!({
                "a": (int_vec(a)),
                "b": {"c": (int_vec(c))},
                "d": (Value::from(d))
            })
        })
}

fn pool_path(i: usize) -> Vec<PathElem> {
    match i {
        0 => path!["a", ALL],
        1 => path!["b", "c", ALL],
        2 => path!["d"],
        3 => path![walker(number())],
        _ => path![multi_path(vec![path!["d"], path!["b", "c", ALL]])],
    }
}

/// Arbitrary nested trees of scalars, vectors, maps, and lists.
fn arb_tree() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::from),
        (-50i64..50).prop_map(Value::from),
        "[a-z]{1,3}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 20, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::vector),
            prop::collection::vec(("[a-z]{1,2}", inner.clone()), 0..4).prop_map(|pairs| {
                let m: indexmap::IndexMap<Value, Value> = pairs
                    .into_iter()
                    .map(|(k, v)| (Value::string(k), v))
                    .collect();
                Value::map(m)
            }),
            prop::collection::vec(inner, 0..4)
                .prop_map(|elems| Value::List(elems.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn identity_law(s in arb_db(), i in 0usize..5) {
        let out = transform(pool_path(i), |_: &[Value], v: &Value| Ok(v.clone()), &s).unwrap();
        prop_assert_eq!(out, s);
    }

    #[test]
    fn identity_law_on_arbitrary_trees(s in arb_tree()) {
        let p = path![walker(number())];
        let out = transform(p, |_: &[Value], v: &Value| Ok(v.clone()), &s).unwrap();
        prop_assert_eq!(out, s);
    }

    #[test]
    fn select_transform_correspondence(s in arb_db(), i in 0usize..5) {
        let before = select(pool_path(i), &s).unwrap();
        let rewritten = transform(pool_path(i), inc, &s).unwrap();
        let after = select(pool_path(i), &rewritten).unwrap();
        let mapped: Vec<Value> = before
            .iter()
            .map(|v| val!(v.as_int().unwrap() + 1))
            .collect();
        prop_assert_eq!(after, mapped);
    }

    #[test]
    fn composition_law(s in arb_db()) {
        let whole = select(path!["b", "c", ALL], &s).unwrap();
        let outer = select(path!["b", "c"], &s).unwrap();
        let composed: Vec<Value> = outer
            .iter()
            .flat_map(|x| select(path![ALL], x).unwrap())
            .collect();
        prop_assert_eq!(whole, composed);
    }

    #[test]
    fn setval_constant_law(s in arb_db(), i in 0usize..5, v in -50i64..50) {
        let n = select(pool_path(i), &s).unwrap().len();
        let rewritten = setval(pool_path(i), val!(v), &s).unwrap();
        let after = select(pool_path(i), &rewritten).unwrap();
        prop_assert_eq!(after.len(), n);
        prop_assert!(after.iter().all(|x| *x == val!(v)));
    }

    #[test]
    fn shape_preservation(s in arb_db(), v in -50i64..50) {
        let out = setval(path!["a", ALL], val!(v), &s).unwrap();
        // Positions the path does not point at hold identical values
        prop_assert_eq!(out.get(&val!("b")), s.get(&val!("b")));
        prop_assert_eq!(out.get(&val!("d")), s.get(&val!("d")));
        prop_assert_eq!(
            out.get(&val!("a")).unwrap().len(),
            s.get(&val!("a")).unwrap().len()
        );
    }

    #[test]
    fn determinism_law(s in arb_db(), i in 0usize..5) {
        let a = select(pool_path(i), &s).unwrap();
        let b = select(pool_path(i), &s).unwrap();
        prop_assert_eq!(a, b);

        let ta = transform(pool_path(i), inc, &s).unwrap();
        let tb = transform(pool_path(i), inc, &s).unwrap();
        prop_assert_eq!(ta, tb);
    }
}
