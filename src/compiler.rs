// Path compiler: lowers a heterogeneous path tree into a flat CompiledPath.
//
// The compiler does a single depth-first traversal of the input tree,
// inlining nested sub-paths, lifting literals into navigator variants,
// compiling inner paths of compound navigators, and assigning each
// parameterized navigator its cumulative parameter-slot offset.

use crate::error::{Error, Result};
use crate::navigator::{CompiledPath, Nav};
use crate::value::{NativeFn, Value};

/// One element of an uncompiled path: a navigator, a nested sub-path
/// (inlined during compilation), a literal (lifted during compilation), or
/// a compound navigator whose inner paths still need compiling.
#[derive(Clone, Debug)]
pub enum PathElem {
    Nav(Nav),
    Sub(Vec<PathElem>),
    Lit(Value),
    Filterer(Vec<PathElem>),
    Selected(Vec<PathElem>),
    NotSelected(Vec<PathElem>),
    Transformed(Vec<PathElem>, NativeFn),
    CondPath(Vec<(Vec<PathElem>, Vec<PathElem>)>),
    MultiPath(Vec<Vec<PathElem>>),
    Collect(Vec<PathElem>),
    CollectOne(Vec<PathElem>),
}

impl From<Nav> for PathElem {
    fn from(n: Nav) -> Self {
        PathElem::Nav(n)
    }
}

impl From<Value> for PathElem {
    fn from(v: Value) -> Self {
        PathElem::Lit(v)
    }
}

impl From<&str> for PathElem {
    fn from(s: &str) -> Self {
        PathElem::Lit(Value::string(s))
    }
}

impl From<NativeFn> for PathElem {
    fn from(f: NativeFn) -> Self {
        PathElem::Lit(Value::Fn(f))
    }
}

impl From<Vec<PathElem>> for PathElem {
    fn from(v: Vec<PathElem>) -> Self {
        PathElem::Sub(v)
    }
}

impl From<CompiledPath> for PathElem {
    fn from(p: CompiledPath) -> Self {
        PathElem::Nav(Nav::Sub(p))
    }
}

/// Macro for building path literals: each element is converted with
/// `PathElem::from`, so navigators, strings, values, nested `path!`
/// vectors, and compiled paths mix freely.
#[macro_export]
macro_rules! path {
    ($($elem:expr),* $(,)?) => {
        vec![ $( $crate::compiler::PathElem::from($elem) ),* ]
    };
}

/// Lift a literal value into its navigator equivalent: keyed literals
/// (keywords and strings) become key paths, sets and functions become
/// predicate gates. Anything else is a compile error.
fn lift_literal(v: Value) -> Result<Nav> {
    match v {
        Value::Keyword(_) | Value::Str(_) => Ok(Nav::Keypath(v)),
        Value::Set(s) => Ok(Nav::PredSet(s)),
        Value::Fn(f) => Ok(Nav::PredFn(f)),
        other => Err(Error::InvalidLiteral(format!(
            "cannot use a {} as a navigator: {}",
            other.shape_name(),
            other
        ))),
    }
}

fn flatten_into(elems: Vec<PathElem>, out: &mut Vec<Nav>) -> Result<()> {
    for elem in elems {
        match elem {
            PathElem::Nav(n) => out.push(n),
            PathElem::Sub(v) => flatten_into(v, out)?,
            PathElem::Lit(v) => out.push(lift_literal(v)?),
            PathElem::Filterer(v) => out.push(Nav::Filterer(compile_paths(v)?)),
            PathElem::Selected(v) => out.push(Nav::Selected(compile_paths(v)?)),
            PathElem::NotSelected(v) => out.push(Nav::NotSelected(compile_paths(v)?)),
            PathElem::Transformed(v, f) => out.push(Nav::Transformed(compile_paths(v)?, f)),
            PathElem::CondPath(pairs) => {
                let compiled = pairs
                    .into_iter()
                    .map(|(c, p)| Ok((compile_paths(c)?, compile_paths(p)?)))
                    .collect::<Result<Vec<_>>>()?;
                out.push(Nav::CondPath(compiled));
            }
            PathElem::MultiPath(paths) => {
                let compiled = paths
                    .into_iter()
                    .map(compile_paths)
                    .collect::<Result<Vec<_>>>()?;
                out.push(Nav::MultiPath(compiled));
            }
            PathElem::Collect(v) => out.push(Nav::Collect(compile_paths(v)?)),
            PathElem::CollectOne(v) => out.push(Nav::CollectOne(compile_paths(v)?)),
        }
    }
    Ok(())
}

/// Compile a path tree into a flat executable plan.
///
/// Flattening is depth-first and left-to-right, so composition is
/// associative: `compile_paths(path![a, path![b, c], d])` equals
/// `compile_paths(path![a, b, c, d])`. A path whose slot count is zero is
/// fully executable; otherwise it must be bound to a parameter frame with
/// [`bind_params`] before execution.
pub fn compile_paths(elems: impl Into<Vec<PathElem>>) -> Result<CompiledPath> {
    let mut navs: Vec<Nav> = Vec::new();
    flatten_into(elems.into(), &mut navs)?;

    let mut slot_count = 0usize;
    let mut collectors = false;
    let navs: Vec<Nav> = navs
        .into_iter()
        .map(|nav| {
            collectors |= nav.collects();
            let n = nav.slots();
            let nav = nav.shift(slot_count);
            slot_count += n;
            nav
        })
        .collect();

    Ok(CompiledPath::new(navs, slot_count, collectors))
}

/// Materialize a late-bound path: attach a read-only parameter array and a
/// base index. Cheap — the navigator sequence is shared with the input.
pub fn bind_params(
    compiled: &CompiledPath,
    params: impl Into<std::rc::Rc<[Value]>>,
    start_idx: usize,
) -> CompiledPath {
    compiled.bind(params, start_idx)
}
