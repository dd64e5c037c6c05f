// deepnav - composable navigation and transformation for nested immutable data
// Copyright (c) 2026 deepnav contributors
// Licensed under the MIT License

//! # deepnav
//!
//! A composable navigation-and-transformation engine for nested immutable
//! data. A *path* — a composition of *navigators* — names a set of locations
//! inside a tree of maps, sequences, and sets; the engine then either
//! **selects** the values at those locations (in deterministic left-to-right
//! depth-first order) or **transforms** them, producing a new structure that
//! shares everything it did not touch with the input.
//!
//! Paths are compiled once into a flat execution plan and applied many
//! times, including paths whose parameters arrive only at call time
//! ("late-bound").
//!
//! ## Architecture
//!
//! - `value` - the tagged value model (Rc-wrapped, copy-on-write containers)
//! - `container` - the uniform operation surface over the container shapes
//! - `navigator` - the navigator protocol: the `Nav` union, compiled paths,
//!   parameter frames, and the user-extension traits
//! - `compiler` - flattens path trees, lifts literals, assigns parameter
//!   offsets
//! - `engine` - the select/transform walks
//! - `navigators` - the built-in navigator library
//!
//! ## Example
//!
//! ```
//! use deepnav::navigators::ALL;
//! use deepnav::{compile_paths, path, select, transform, val, Value};
//!
//! let data = val!({"a": [{"b": 3}, {"b": 5}]});
//!
//! // Compile once, run many times.
//! let compiled = compile_paths(path!["a", ALL, "b"]).unwrap();
//!
//! let found = select(&compiled, &data).unwrap();
//! assert_eq!(found, vec![val!(3), val!(5)]);
//!
//! let bumped = transform(
//!     &compiled,
//!     |_, v: &Value| Ok(val!(v.as_int().unwrap() + 1)),
//!     &data,
//! )
//! .unwrap();
//! assert_eq!(bumped, val!({"a": [{"b": 4}, {"b": 6}]}));
//! ```

pub mod compiler;
pub mod container;
pub mod engine;
pub mod error;
pub mod navigator;
pub mod navigators;
pub mod value;

pub use compiler::{bind_params, compile_paths, PathElem};
pub use container::Shape;
pub use engine::{SelectK, TransformK};
pub use error::{Error, Result};
pub use navigator::{
    CompiledPath, Nav, ParamCollector, ParamFrame, ParamNavigator, RawCollector, RawNavigator,
};
pub use value::{List, NativeFn, Value};

/// Anything acceptable as a path argument to the entry points: a compiled
/// path (borrowed or owned), an uncompiled `path![...]` vector, a single
/// path element, or a bare navigator.
pub trait IntoPath {
    fn into_path(self) -> Result<CompiledPath>;
}

impl IntoPath for CompiledPath {
    fn into_path(self) -> Result<CompiledPath> {
        Ok(self)
    }
}

impl IntoPath for &CompiledPath {
    fn into_path(self) -> Result<CompiledPath> {
        Ok(self.clone())
    }
}

impl IntoPath for Vec<PathElem> {
    fn into_path(self) -> Result<CompiledPath> {
        compile_paths(self)
    }
}

impl IntoPath for PathElem {
    fn into_path(self) -> Result<CompiledPath> {
        compile_paths(vec![self])
    }
}

impl IntoPath for Nav {
    fn into_path(self) -> Result<CompiledPath> {
        compile_paths(vec![PathElem::Nav(self)])
    }
}

/// Collect every value the path points at, in left-to-right depth-first
/// order.
///
/// ```
/// use deepnav::navigators::ALL;
/// use deepnav::{path, select, val};
///
/// let people = val!([{"name": "x", "age": 1}, {"name": "y", "age": 2}]);
/// let names = select(path![ALL, "name"], &people).unwrap();
/// assert_eq!(names, vec![val!("x"), val!("y")]);
/// ```
pub fn select(path: impl IntoPath, structure: &Value) -> Result<Vec<Value>> {
    let compiled = path.into_path()?;
    engine::run_select(&compiled, structure)
}

/// The path's single result, or `None` when it selects nothing. More than
/// one result is a cardinality violation.
pub fn select_one(path: impl IntoPath, structure: &Value) -> Result<Option<Value>> {
    let mut results = select(path, structure)?;
    if results.len() > 1 {
        return Err(Error::Cardinality(format!(
            "select-one expected at most one result, got {}",
            results.len()
        )));
    }
    Ok(results.pop())
}

/// The path's single result; anything but exactly one is a cardinality
/// violation.
pub fn select_one_strict(path: impl IntoPath, structure: &Value) -> Result<Value> {
    let mut results = select(path, structure)?;
    if results.len() != 1 {
        return Err(Error::Cardinality(format!(
            "select-one! expected exactly one result, got {}",
            results.len()
        )));
    }
    Ok(results.remove(0))
}

/// The first value the path points at, or `None`.
pub fn select_first(path: impl IntoPath, structure: &Value) -> Result<Option<Value>> {
    let mut results = select(path, structure)?;
    if results.is_empty() {
        Ok(None)
    } else {
        Ok(Some(results.remove(0)))
    }
}

/// Replace every pointed-at value with the output of `f`, preserving
/// everything else. `f` receives the collected values (empty unless the
/// path contains collectors) followed by the navigated value.
///
/// ```
/// use deepnav::navigators::{collect_one, ALL};
/// use deepnav::{path, transform, val, Value};
///
/// let recs = val!([{"k": 10, "v": 1}, {"k": 20, "v": 2}]);
/// let out = transform(
///     path![ALL, collect_one(path!["k"]), "v"],
///     |vals: &[Value], v: &Value| {
///         Ok(val!(vals[0].as_int().unwrap() + v.as_int().unwrap()))
///     },
///     &recs,
/// )
/// .unwrap();
/// assert_eq!(out, val!([{"k": 10, "v": 11}, {"k": 20, "v": 22}]));
/// ```
pub fn transform<P, F>(path: P, mut f: F, structure: &Value) -> Result<Value>
where
    P: IntoPath,
    F: FnMut(&[Value], &Value) -> Result<Value>,
{
    let compiled = path.into_path()?;
    engine::run_transform(&compiled, structure, &mut f)
}

/// Set every pointed-at value to `v`.
///
/// ```
/// use deepnav::navigators::srange;
/// use deepnav::{path, setval, val};
///
/// let out = setval(path![srange(1, 3)], val!(["x", "y"]), &val!([0, 1, 2, 3, 4])).unwrap();
/// assert_eq!(out, val!([0, "x", "y", 3, 4]));
/// ```
pub fn setval(path: impl IntoPath, v: Value, structure: &Value) -> Result<Value> {
    transform(path, move |_, _| Ok(v.clone()), structure)
}

/// Transform with a side channel: `f` returns `Some((replacement,
/// side_value))` to rewrite a location and record a side value, or `None`
/// to leave it unchanged and record nothing. Side values accumulate through
/// `merge`; the default ([`replace_in`]) appends sequences element-wise and
/// pushes anything else.
pub fn replace_in_with<P, F, M>(
    path: P,
    mut f: F,
    structure: &Value,
    mut merge: M,
) -> Result<(Value, Vec<Value>)>
where
    P: IntoPath,
    F: FnMut(&[Value], &Value) -> Result<Option<(Value, Value)>>,
    M: FnMut(&mut Vec<Value>, Value),
{
    let compiled = path.into_path()?;
    let mut acc: Vec<Value> = Vec::new();
    let out = engine::run_transform(&compiled, structure, &mut |vals, v| match f(vals, v)? {
        Some((replacement, side)) => {
            merge(&mut acc, side);
            Ok(replacement)
        }
        None => Ok(v.clone()),
    })?;
    Ok((out, acc))
}

/// [`replace_in_with`] using the default concatenating merge.
///
/// ```
/// use deepnav::navigators::ALL;
/// use deepnav::{path, replace_in, val, Value};
///
/// // Zero out odd values, reporting the ones replaced.
/// let (out, replaced) = replace_in(
///     path![ALL],
///     |_, v: &Value| {
///         if v.as_int().unwrap() % 2 == 1 {
///             Ok(Some((val!(0), v.clone())))
///         } else {
///             Ok(None)
///         }
///     },
///     &val!([1, 2, 3, 4]),
/// )
/// .unwrap();
/// assert_eq!(out, val!([0, 2, 0, 4]));
/// assert_eq!(replaced, vec![val!(1), val!(3)]);
/// ```
pub fn replace_in<P, F>(path: P, f: F, structure: &Value) -> Result<(Value, Vec<Value>)>
where
    P: IntoPath,
    F: FnMut(&[Value], &Value) -> Result<Option<(Value, Value)>>,
{
    replace_in_with(path, f, structure, |acc, side| {
        if let Some(elems) = side.seq_elems() {
            acc.extend(elems);
        } else {
            acc.push(side);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::navigators::{late_key, ALL};
    use super::*;
    use crate::{path, val};

    #[test]
    fn test_select_one_cardinality() {
        let s = val!([1, 2, 3]);
        assert!(matches!(
            select_one(path![ALL], &s),
            Err(Error::Cardinality(_))
        ));
        assert_eq!(select_one(path![ALL], &val!([7])).unwrap(), Some(val!(7)));
        let empty: Vec<Value> = Vec::new();
        assert_eq!(
            select_one(path![ALL], &Value::vector(empty)).unwrap(),
            None
        );
    }

    #[test]
    fn test_select_one_strict() {
        assert_eq!(
            select_one_strict(path![ALL], &val!([7])).unwrap(),
            val!(7)
        );
        assert!(matches!(
            select_one_strict(path![ALL], &val!([])),
            Err(Error::Cardinality(_))
        ));
    }

    #[test]
    fn test_select_first() {
        assert_eq!(select_first(path![ALL], &val!([4, 5])).unwrap(), Some(val!(4)));
        assert_eq!(select_first(path![ALL], &val!([])).unwrap(), None);
    }

    #[test]
    fn test_late_binding_entry_point() {
        let compiled = compile_paths(path![late_key()]).unwrap();
        let bound = bind_params(&compiled, vec![val!("a")], 0);
        assert_eq!(select(&bound, &val!({"a": 7})).unwrap(), vec![val!(7)]);

        // The same compiled path bound to a different frame
        let bound_b = bind_params(&compiled, vec![val!("b")], 0);
        assert_eq!(select(&bound_b, &val!({"a": 7, "b": 8})).unwrap(), vec![val!(8)]);
    }

    #[test]
    fn test_setval_constant() {
        let out = setval(path![ALL], val!(9), &val!([1, 2])).unwrap();
        assert_eq!(out, val!([9, 9]));
    }
}
