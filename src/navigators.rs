// Built-in navigator library: constants and constructors for the
// primitive navigator set. Path-taking constructors return `PathElem` so
// their inner paths are compiled (and literal-lifted) together with the
// enclosing path; everything else returns `Nav` directly.

use indexmap::IndexSet;

use crate::compiler::PathElem;
use crate::navigator::Nav;
use crate::value::{NativeFn, Value};

/// Every child of a container. Map children appear as `[key value]` pairs,
/// and a transform over a map must return a pair per entry.
pub const ALL: Nav = Nav::All;

/// The head of an ordered sequence. Empty or non-ordered structures are a
/// shape mismatch.
pub const FIRST: Nav = Nav::First;

/// The tail element of an ordered sequence.
pub const LAST: Nav = Nav::Last;

/// The structure itself. Useful as an always-true condition in `cond_path`.
pub const STAY: Nav = Nav::Stay;

/// Nothing: select yields no values and transform leaves the structure
/// untouched.
pub const STOP: Nav = Nav::Stop;

/// The empty subsequence before the first element; transforming it
/// prepends the replacement sequence.
pub const BEGINNING: Nav = Nav::Beginning;

/// The empty subsequence after the last element; transforming it appends.
pub const END: Nav = Nav::End;

/// Collector for the structure at this point in the navigation.
pub const VAL: Nav = Nav::Val;

/// The value at `key` in a keyed map. Select navigates to `nil` when the
/// key is absent; transform inserts the key in that case.
pub fn key(k: impl Into<Value>) -> Nav {
    Nav::Keypath(k.into())
}

/// Late-bound [`key`]: consumes one parameter slot at bind time.
pub fn late_key() -> Nav {
    Nav::LateKey { offset: 0 }
}

/// The contiguous subsequence `[start, end)` of an ordered sequence,
/// presented to the rest of the path as a vector. Transforming splices the
/// replacement over the range, so the replacement may change the length.
pub fn srange(start: usize, end: usize) -> Nav {
    Nav::Srange(start, end)
}

/// Late-bound [`srange`]: consumes two parameter slots at bind time.
pub fn late_srange() -> Nav {
    Nav::LateSrange { offset: 0 }
}

/// A subrange whose bounds are recomputed from the structure on every
/// invocation. Each bound function must return a non-negative integer.
pub fn srange_dynamic(start_fn: NativeFn, end_fn: NativeFn) -> Nav {
    Nav::SrangeDyn(start_fn, end_fn)
}

/// Every sub-value matching the predicate, found by a pre-order
/// depth-first walk of the whole tree (map values, vector, list, and set
/// elements). Matching values are not descended into. The walk recurses on
/// the call stack, so extremely deep structures are bounded by it.
pub fn walker(pred: NativeFn) -> Nav {
    Nav::Walker(pred)
}

/// Like [`walker`], but descends only ordered sequences; maps and sets are
/// opaque leaves.
pub fn codewalker(pred: NativeFn) -> Nav {
    Nav::Codewalker(pred)
}

/// The filtered view of an ordered sequence: the elements whose inner path
/// selects at least one value, presented as a vector. A transform must
/// return a sequence of the same length, which is spliced back into the
/// original positions.
pub fn filterer(path: Vec<PathElem>) -> PathElem {
    PathElem::Filterer(path)
}

/// A read/write window: the rest of the path sees `f(structure)`, and on
/// transform the continuation's output becomes the new value (there is no
/// write-back, since `f` is not invertible).
pub fn view(f: NativeFn) -> Nav {
    Nav::View(f)
}

/// Predicate gate: the structure passes through iff `f` is truthy on it.
pub fn pred(f: NativeFn) -> Nav {
    Nav::PredFn(f)
}

/// Predicate gate by set membership.
pub fn pred_set(elems: impl IntoIterator<Item = Value>) -> Nav {
    let s: IndexSet<Value> = elems.into_iter().collect();
    Nav::PredSet(std::rc::Rc::new(s))
}

/// Pass the structure through iff the inner path selects something.
pub fn selected(path: Vec<PathElem>) -> PathElem {
    PathElem::Selected(path)
}

/// Pass the structure through iff the inner path selects nothing.
pub fn not_selected(path: Vec<PathElem>) -> PathElem {
    PathElem::NotSelected(path)
}

/// A window over the structure as it looks after transforming `path` with
/// `f`; used identically in select and transform.
pub fn transformed(path: Vec<PathElem>, f: NativeFn) -> PathElem {
    PathElem::Transformed(path, f)
}

/// Scan `(condition, branch)` clauses in order; the first condition whose
/// select is non-empty decides the branch. With no matching clause, select
/// yields nothing and transform returns the structure unchanged.
pub fn cond_path(pairs: Vec<(Vec<PathElem>, Vec<PathElem>)>) -> PathElem {
    PathElem::CondPath(pairs)
}

/// Two-way branch: continue along `then` when `cond` selects something,
/// otherwise miss.
pub fn if_path(cond: Vec<PathElem>, then: Vec<PathElem>) -> PathElem {
    PathElem::CondPath(vec![(cond, then)])
}

/// Two-way branch with an else path.
pub fn if_else_path(
    cond: Vec<PathElem>,
    then: Vec<PathElem>,
    els: Vec<PathElem>,
) -> PathElem {
    PathElem::CondPath(vec![(cond, then), (vec![PathElem::Nav(STAY)], els)])
}

/// Navigate every path in order. Select concatenates their selections;
/// transform applies them sequentially left to right, threading the
/// running structure so later paths observe earlier writes.
pub fn multi_path(paths: Vec<Vec<PathElem>>) -> PathElem {
    PathElem::MultiPath(paths)
}

/// Collector: the inner path's full selection, as a vector.
pub fn collect(path: Vec<PathElem>) -> PathElem {
    PathElem::Collect(path)
}

/// Collector: the inner path's single result (`nil` when it selects
/// nothing; more than one result is a cardinality violation).
pub fn collect_one(path: Vec<PathElem>) -> PathElem {
    PathElem::CollectOne(path)
}

/// Collector: a constant value.
pub fn putval(v: impl Into<Value>) -> Nav {
    Nav::PutVal(v.into())
}

/// Late-bound [`putval`]: consumes one parameter slot at bind time.
pub fn late_putval() -> Nav {
    Nav::LatePutVal { offset: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_paths;
    use crate::{path, val};

    #[test]
    fn test_constants_are_fresh_values() {
        let p = compile_paths(path![ALL, FIRST]).unwrap();
        assert_eq!(p.navs().len(), 2);
    }

    #[test]
    fn test_if_else_builds_two_clauses() {
        let elem = if_else_path(path![pred(NativeFn::pred("t", |_| true))], path![STAY], path![STAY]);
        if let PathElem::CondPath(pairs) = elem {
            assert_eq!(pairs.len(), 2);
        } else {
            panic!("expected cond-path");
        }
    }

    #[test]
    fn test_pred_set_gate() {
        let p = compile_paths(path![pred_set([val!(1), val!(2)])]).unwrap();
        assert_eq!(crate::engine::run_select(&p, &val!(1)).unwrap(), vec![val!(1)]);
        assert!(crate::engine::run_select(&p, &val!(3)).unwrap().is_empty());
    }
}
