// Execution engine: runs a compiled path against a structure in select or
// transform mode.
//
// Continuations are reified as an index into the flat navigator slice plus
// the engine state, instead of heap-allocated closures. Branching
// navigators (cond-path, multi-path, nested compiled paths) chain
// stack-allocated continuation objects so that "the rest of the path"
// composes without boxing. Collected values live in a branch-local vector:
// collectors push before descending and truncate on the way back out, so
// no branch observes another branch's collections.

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result};
use crate::navigator::{CompiledPath, Nav, ParamFrame};
use crate::value::{NativeFn, Value};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run a compiled path in select mode: collect every pointed-at value in
/// left-to-right depth-first order.
pub(crate) fn run_select(path: &CompiledPath, structure: &Value) -> Result<Vec<Value>> {
    ensure_bound(path)?;
    let mut st = SelectState {
        frame: path.frame().cloned(),
        vals: Vec::new(),
        out: Vec::new(),
    };
    select_at(path.navs(), 0, structure, &mut st, &SelectLeaf)?;
    Ok(st.out)
}

/// Run a compiled path in transform mode. The terminal function receives
/// the collected values followed by the navigated value, and its output
/// replaces that value; everything not pointed at is preserved.
pub(crate) fn run_transform(
    path: &CompiledPath,
    structure: &Value,
    func: &mut dyn FnMut(&[Value], &Value) -> Result<Value>,
) -> Result<Value> {
    ensure_bound(path)?;
    let mut st = TransformState {
        frame: path.frame().cloned(),
        vals: Vec::new(),
        func,
    };
    transform_at(path.navs(), 0, structure, &mut st, &TransformLeaf)
}

fn ensure_bound(path: &CompiledPath) -> Result<()> {
    if path.is_bound() {
        Ok(())
    } else {
        Err(Error::UnboundParam(format!(
            "path declares {} parameter slots but no frame is bound",
            path.slots()
        )))
    }
}

// ---------------------------------------------------------------------------
// Engine state and continuations
// ---------------------------------------------------------------------------

pub(crate) struct SelectState {
    frame: Option<ParamFrame>,
    vals: Vec<Value>,
    out: Vec<Value>,
}

trait SelectCont {
    fn resume(&self, s: &Value, st: &mut SelectState) -> Result<()>;
}

/// End of path: the pointed-at value itself.
struct SelectLeaf;

impl SelectCont for SelectLeaf {
    fn resume(&self, s: &Value, st: &mut SelectState) -> Result<()> {
        st.out.push(s.clone());
        Ok(())
    }
}

/// Resume the outer path after a nested path finishes.
struct SelectChain<'a> {
    navs: &'a [Nav],
    idx: usize,
    next: &'a dyn SelectCont,
}

impl SelectCont for SelectChain<'_> {
    fn resume(&self, s: &Value, st: &mut SelectState) -> Result<()> {
        select_at(self.navs, self.idx, s, st, self.next)
    }
}

/// Like `SelectChain`, but swaps back the outer parameter frame for the
/// rest of the path (used when a nested path carries its own frame).
struct SelectRestore<'a> {
    frame: Option<ParamFrame>,
    navs: &'a [Nav],
    idx: usize,
    next: &'a dyn SelectCont,
}

impl SelectCont for SelectRestore<'_> {
    fn resume(&self, s: &Value, st: &mut SelectState) -> Result<()> {
        let inner = std::mem::replace(&mut st.frame, self.frame.clone());
        let r = select_at(self.navs, self.idx, s, st, self.next);
        st.frame = inner;
        r
    }
}

pub(crate) struct TransformState<'f> {
    frame: Option<ParamFrame>,
    vals: Vec<Value>,
    func: &'f mut dyn FnMut(&[Value], &Value) -> Result<Value>,
}

trait TransformCont {
    fn resume(&self, s: &Value, st: &mut TransformState<'_>) -> Result<Value>;
}

/// End of path: apply the terminal function to (collected values, value).
struct TransformLeaf;

impl TransformCont for TransformLeaf {
    fn resume(&self, s: &Value, st: &mut TransformState<'_>) -> Result<Value> {
        (st.func)(&st.vals, s)
    }
}

struct TransformChain<'a> {
    navs: &'a [Nav],
    idx: usize,
    next: &'a dyn TransformCont,
}

impl TransformCont for TransformChain<'_> {
    fn resume(&self, s: &Value, st: &mut TransformState<'_>) -> Result<Value> {
        transform_at(self.navs, self.idx, s, st, self.next)
    }
}

struct TransformRestore<'a> {
    frame: Option<ParamFrame>,
    navs: &'a [Nav],
    idx: usize,
    next: &'a dyn TransformCont,
}

impl TransformCont for TransformRestore<'_> {
    fn resume(&self, s: &Value, st: &mut TransformState<'_>) -> Result<Value> {
        let inner = std::mem::replace(&mut st.frame, self.frame.clone());
        let r = transform_at(self.navs, self.idx, s, st, self.next);
        st.frame = inner;
        r
    }
}

// ---------------------------------------------------------------------------
// Continuation handles for custom navigators
// ---------------------------------------------------------------------------

/// The opaque continuation handed to custom navigators in select mode.
/// `descend` runs the rest of the path on one pointed-at sub-structure.
pub struct SelectK<'a> {
    navs: &'a [Nav],
    idx: usize,
    st: &'a mut SelectState,
    next: &'a dyn SelectCont,
}

impl SelectK<'_> {
    pub fn descend(&mut self, s: &Value) -> Result<()> {
        select_at(self.navs, self.idx, s, self.st, self.next)
    }
}

/// The opaque continuation handed to custom navigators in transform mode.
/// `descend` runs the rest of the path and returns the replacement for the
/// given sub-structure.
pub struct TransformK<'a, 'f> {
    navs: &'a [Nav],
    idx: usize,
    st: &'a mut TransformState<'f>,
    next: &'a dyn TransformCont,
}

impl TransformK<'_, '_> {
    pub fn descend(&mut self, s: &Value) -> Result<Value> {
        transform_at(self.navs, self.idx, s, self.st, self.next)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn shape_err(nav: &str, s: &Value) -> Error {
    Error::ShapeMismatch(format!(
        "{} cannot navigate a {}: {}",
        nav,
        s.shape_name(),
        s
    ))
}

fn frame_args(
    frame: &Option<ParamFrame>,
    offset: usize,
    n: usize,
    who: &str,
) -> Result<Vec<Value>> {
    match frame {
        Some(f) => f.args(offset, n, who),
        None => Err(Error::UnboundParam(format!(
            "{} executed without a parameter frame",
            who
        ))),
    }
}

fn frame_arg(frame: &Option<ParamFrame>, offset: usize, who: &str) -> Result<Value> {
    let mut args = frame_args(frame, offset, 1, who)?;
    Ok(args.remove(0))
}

/// Resolve the ordered elements and check subrange bounds.
fn range_window(who: &str, s: &Value, start: usize, end: usize) -> Result<Vec<Value>> {
    let elems = s.seq_elems().ok_or_else(|| shape_err(who, s))?;
    if start > end || end > elems.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} [{}, {}) out of bounds for a sequence of length {}",
            who,
            start,
            end,
            elems.len()
        )));
    }
    Ok(elems)
}

fn dyn_bound(v: Value, who: &str) -> Result<usize> {
    match v.as_int() {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(Error::ShapeMismatch(format!(
            "{} dynamic bound must be a non-negative integer, got {}",
            who, v
        ))),
    }
}

/// Run a nested path as a fresh select execution (its collectors and
/// results do not leak into the enclosing navigation).
fn select_fresh(p: &CompiledPath, s: &Value, outer: &Option<ParamFrame>) -> Result<Vec<Value>> {
    let frame = p.frame().cloned().or_else(|| outer.clone());
    if p.slots() > 0 && frame.is_none() {
        return Err(Error::UnboundParam(format!(
            "inner path declares {} parameter slots but no frame is bound",
            p.slots()
        )));
    }
    let mut st = SelectState {
        frame,
        vals: Vec::new(),
        out: Vec::new(),
    };
    select_at(p.navs(), 0, s, &mut st, &SelectLeaf)?;
    Ok(st.out)
}

/// Run a nested path as a fresh transform execution with a unary terminal.
fn transform_fresh(
    p: &CompiledPath,
    s: &Value,
    outer: &Option<ParamFrame>,
    f: &NativeFn,
) -> Result<Value> {
    let frame = p.frame().cloned().or_else(|| outer.clone());
    if p.slots() > 0 && frame.is_none() {
        return Err(Error::UnboundParam(format!(
            "inner path declares {} parameter slots but no frame is bound",
            p.slots()
        )));
    }
    let mut func = |_vals: &[Value], v: &Value| Ok(f.call(v));
    let mut st = TransformState {
        frame,
        vals: Vec::new(),
        func: &mut func,
    };
    transform_at(p.navs(), 0, s, &mut st, &TransformLeaf)
}

// ---------------------------------------------------------------------------
// Select walk
// ---------------------------------------------------------------------------

fn select_at(
    navs: &[Nav],
    idx: usize,
    s: &Value,
    st: &mut SelectState,
    next: &dyn SelectCont,
) -> Result<()> {
    let Some(nav) = navs.get(idx) else {
        return next.resume(s, st);
    };
    match nav {
        Nav::All => match s {
            Value::Map(m) => {
                for (k, v) in m.iter() {
                    let entry = Value::vector(vec![k.clone(), v.clone()]);
                    select_at(navs, idx + 1, &entry, st, next)?;
                }
                Ok(())
            }
            Value::Vec(v) => {
                for e in v.iter() {
                    select_at(navs, idx + 1, e, st, next)?;
                }
                Ok(())
            }
            Value::List(l) => {
                for e in l.iter() {
                    select_at(navs, idx + 1, e, st, next)?;
                }
                Ok(())
            }
            Value::Set(set) => {
                for e in set.iter() {
                    select_at(navs, idx + 1, e, st, next)?;
                }
                Ok(())
            }
            other => Err(shape_err("ALL", other)),
        },

        Nav::First => match s.first() {
            Some(head) => {
                let head = head.clone();
                select_at(navs, idx + 1, &head, st, next)
            }
            None => Err(shape_err("FIRST", s)),
        },

        Nav::Last => {
            let last = match s {
                Value::Vec(v) => v.last().cloned(),
                Value::List(l) => l.iter().last().cloned(),
                _ => None,
            };
            match last {
                Some(tail) => select_at(navs, idx + 1, &tail, st, next),
                None => Err(shape_err("LAST", s)),
            }
        }

        Nav::Stay => select_at(navs, idx + 1, s, st, next),

        Nav::Stop => Ok(()),

        Nav::Keypath(k) => {
            let m = s.as_map().ok_or_else(|| shape_err("keypath", s))?;
            let child = m.get(k).cloned().unwrap_or(Value::Nil);
            select_at(navs, idx + 1, &child, st, next)
        }

        Nav::LateKey { offset } => {
            let k = frame_arg(&st.frame, *offset, "keypath")?;
            let m = s.as_map().ok_or_else(|| shape_err("keypath", s))?;
            let child = m.get(&k).cloned().unwrap_or(Value::Nil);
            select_at(navs, idx + 1, &child, st, next)
        }

        Nav::Srange(start, end) => {
            let elems = range_window("srange", s, *start, *end)?;
            let window = Value::vector(elems[*start..*end].to_vec());
            select_at(navs, idx + 1, &window, st, next)
        }

        Nav::SrangeDyn(fs, fe) => {
            let start = dyn_bound(fs.call(s), "srange")?;
            let end = dyn_bound(fe.call(s), "srange")?;
            let elems = range_window("srange", s, start, end)?;
            let window = Value::vector(elems[start..end].to_vec());
            select_at(navs, idx + 1, &window, st, next)
        }

        Nav::Beginning => {
            range_window("BEGINNING", s, 0, 0)?;
            select_at(navs, idx + 1, &Value::vector(Vec::new()), st, next)
        }

        Nav::End => {
            let len = s.len().filter(|_| s.is_ordered()).ok_or_else(|| shape_err("END", s))?;
            range_window("END", s, len, len)?;
            select_at(navs, idx + 1, &Value::vector(Vec::new()), st, next)
        }

        Nav::Walker(pred) => walk_select(pred, false, navs, idx + 1, s, st, next),

        Nav::Codewalker(pred) => walk_select(pred, true, navs, idx + 1, s, st, next),

        Nav::Filterer(p) => {
            let elems = s.seq_elems().ok_or_else(|| shape_err("filterer", s))?;
            let frame = st.frame.clone();
            let mut matched = Vec::new();
            for e in &elems {
                if !select_fresh(p, e, &frame)?.is_empty() {
                    matched.push(e.clone());
                }
            }
            let window = Value::vector(matched);
            select_at(navs, idx + 1, &window, st, next)
        }

        Nav::View(f) => {
            let window = f.call(s);
            select_at(navs, idx + 1, &window, st, next)
        }

        Nav::PredFn(f) => {
            if f.test(s) {
                select_at(navs, idx + 1, s, st, next)
            } else {
                Ok(())
            }
        }

        Nav::PredSet(set) => {
            if set.contains(s) {
                select_at(navs, idx + 1, s, st, next)
            } else {
                Ok(())
            }
        }

        Nav::Selected(p) => {
            let frame = st.frame.clone();
            if !select_fresh(p, s, &frame)?.is_empty() {
                select_at(navs, idx + 1, s, st, next)
            } else {
                Ok(())
            }
        }

        Nav::NotSelected(p) => {
            let frame = st.frame.clone();
            if select_fresh(p, s, &frame)?.is_empty() {
                select_at(navs, idx + 1, s, st, next)
            } else {
                Ok(())
            }
        }

        Nav::Transformed(p, f) => {
            let frame = st.frame.clone();
            let window = transform_fresh(p, s, &frame, f)?;
            select_at(navs, idx + 1, &window, st, next)
        }

        Nav::CondPath(pairs) => {
            let frame = st.frame.clone();
            for (cond, branch) in pairs {
                if !select_fresh(cond, s, &frame)?.is_empty() {
                    return select_into_sub(branch, navs, idx + 1, s, st, next);
                }
            }
            Ok(())
        }

        Nav::MultiPath(paths) => {
            for p in paths {
                select_into_sub(p, navs, idx + 1, s, st, next)?;
            }
            Ok(())
        }

        Nav::Sub(p) => select_into_sub(p, navs, idx + 1, s, st, next),

        Nav::Collect(p) => {
            let frame = st.frame.clone();
            let collected = Value::vector(select_fresh(p, s, &frame)?);
            push_and_continue_select(collected, navs, idx, s, st, next)
        }

        Nav::CollectOne(p) => {
            let frame = st.frame.clone();
            let collected = collect_one_value(p, s, &frame)?;
            push_and_continue_select(collected, navs, idx, s, st, next)
        }

        Nav::PutVal(v) => push_and_continue_select(v.clone(), navs, idx, s, st, next),

        Nav::LatePutVal { offset } => {
            let v = frame_arg(&st.frame, *offset, "putval")?;
            push_and_continue_select(v, navs, idx, s, st, next)
        }

        Nav::Val => push_and_continue_select(s.clone(), navs, idx, s, st, next),

        Nav::LateSrange { offset } => {
            let args = frame_args(&st.frame, *offset, 2, "srange")?;
            let start = dyn_bound(args[0].clone(), "srange")?;
            let end = dyn_bound(args[1].clone(), "srange")?;
            let elems = range_window("srange", s, start, end)?;
            let window = Value::vector(elems[start..end].to_vec());
            select_at(navs, idx + 1, &window, st, next)
        }

        Nav::Custom(n) => {
            let mut k = SelectK {
                navs,
                idx: idx + 1,
                st,
                next,
            };
            n.select_step(s, &mut k)
        }

        Nav::CustomParam { nav, slots, offset } => {
            let args = frame_args(&st.frame, *offset, *slots, nav.name())?;
            let mut k = SelectK {
                navs,
                idx: idx + 1,
                st,
                next,
            };
            nav.select_step(&args, s, &mut k)
        }

        Nav::CustomCollector(c) => {
            let collected = c.collect_value(s)?;
            push_and_continue_select(collected, navs, idx, s, st, next)
        }

        Nav::CustomParamCollector {
            collector,
            slots,
            offset,
        } => {
            let args = frame_args(&st.frame, *offset, *slots, collector.name())?;
            let collected = collector.collect_value(&args, s)?;
            push_and_continue_select(collected, navs, idx, s, st, next)
        }
    }
}

/// Collector step: push onto the branch-local accumulator, continue on the
/// same structure, and truncate on the way back out.
fn push_and_continue_select(
    collected: Value,
    navs: &[Nav],
    idx: usize,
    s: &Value,
    st: &mut SelectState,
    next: &dyn SelectCont,
) -> Result<()> {
    st.vals.push(collected);
    let r = select_at(navs, idx + 1, s, st, next);
    st.vals.pop();
    r
}

fn collect_one_value(p: &CompiledPath, s: &Value, frame: &Option<ParamFrame>) -> Result<Value> {
    let mut results = select_fresh(p, s, frame)?;
    if results.len() > 1 {
        return Err(Error::Cardinality(format!(
            "collect-one matched {} values in {}",
            results.len(),
            s
        )));
    }
    Ok(results.pop().unwrap_or(Value::Nil))
}

fn select_into_sub(
    p: &CompiledPath,
    navs: &[Nav],
    idx_after: usize,
    s: &Value,
    st: &mut SelectState,
    next: &dyn SelectCont,
) -> Result<()> {
    match p.frame() {
        Some(f) => {
            let saved = std::mem::replace(&mut st.frame, Some(f.clone()));
            let chain = SelectRestore {
                frame: saved.clone(),
                navs,
                idx: idx_after,
                next,
            };
            let r = select_at(p.navs(), 0, s, st, &chain);
            st.frame = saved;
            r
        }
        None => {
            let chain = SelectChain {
                navs,
                idx: idx_after,
                next,
            };
            select_at(p.navs(), 0, s, st, &chain)
        }
    }
}

/// Pre-order depth-first walk. Matching sub-values are handed to the rest
/// of the path and not descended into. `code_only` restricts descent to
/// ordered sequences. Recursion uses the call stack, so the structural
/// depth limit is the thread stack.
fn walk_select(
    pred: &NativeFn,
    code_only: bool,
    navs: &[Nav],
    idx: usize,
    v: &Value,
    st: &mut SelectState,
    next: &dyn SelectCont,
) -> Result<()> {
    if pred.test(v) {
        return select_at(navs, idx, v, st, next);
    }
    match v {
        Value::Vec(vec) => {
            for e in vec.iter() {
                walk_select(pred, code_only, navs, idx, e, st, next)?;
            }
            Ok(())
        }
        Value::List(l) => {
            for e in l.iter() {
                walk_select(pred, code_only, navs, idx, e, st, next)?;
            }
            Ok(())
        }
        Value::Map(m) if !code_only => {
            for (_k, mv) in m.iter() {
                walk_select(pred, code_only, navs, idx, mv, st, next)?;
            }
            Ok(())
        }
        Value::Set(set) if !code_only => {
            for e in set.iter() {
                walk_select(pred, code_only, navs, idx, e, st, next)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Transform walk
// ---------------------------------------------------------------------------

fn transform_at(
    navs: &[Nav],
    idx: usize,
    s: &Value,
    st: &mut TransformState<'_>,
    next: &dyn TransformCont,
) -> Result<Value> {
    let Some(nav) = navs.get(idx) else {
        return next.resume(s, st);
    };
    match nav {
        Nav::All => match s {
            Value::Map(m) => {
                let mut out = IndexMap::with_capacity(m.len());
                for (k, v) in m.iter() {
                    let entry = Value::vector(vec![k.clone(), v.clone()]);
                    let r = transform_at(navs, idx + 1, &entry, st, next)?;
                    match r.seq_elems().as_deref() {
                        Some([nk, nv]) => {
                            out.insert(nk.clone(), nv.clone());
                        }
                        _ => {
                            return Err(Error::ShapeMismatch(format!(
                                "ALL over a map expects each entry to become a [key value] pair, got {}",
                                r
                            )))
                        }
                    }
                }
                Ok(Value::map(out))
            }
            Value::Vec(v) => {
                let mut out = Vec::with_capacity(v.len());
                for e in v.iter() {
                    out.push(transform_at(navs, idx + 1, e, st, next)?);
                }
                Ok(Value::vector(out))
            }
            Value::List(l) => {
                let mut out = Vec::with_capacity(l.len());
                for e in l.iter() {
                    out.push(transform_at(navs, idx + 1, e, st, next)?);
                }
                Ok(Value::List(out.into_iter().collect()))
            }
            Value::Set(set) => {
                let mut out = IndexSet::with_capacity(set.len());
                for e in set.iter() {
                    out.insert(transform_at(navs, idx + 1, e, st, next)?);
                }
                Ok(Value::set(out))
            }
            other => Err(shape_err("ALL", other)),
        },

        Nav::First => {
            let head = s
                .first()
                .cloned()
                .ok_or_else(|| shape_err("FIRST", s))?;
            let r = transform_at(navs, idx + 1, &head, st, next)?;
            s.update_at(0, |_| r).ok_or_else(|| shape_err("FIRST", s))
        }

        Nav::Last => {
            let len = s.len().filter(|_| s.is_ordered()).unwrap_or(0);
            if len == 0 {
                return Err(shape_err("LAST", s));
            }
            let tail = match s {
                Value::Vec(v) => v[len - 1].clone(),
                Value::List(l) => l.iter().last().cloned().unwrap_or(Value::Nil),
                _ => return Err(shape_err("LAST", s)),
            };
            let r = transform_at(navs, idx + 1, &tail, st, next)?;
            s.update_at(len - 1, |_| r)
                .ok_or_else(|| shape_err("LAST", s))
        }

        Nav::Stay => transform_at(navs, idx + 1, s, st, next),

        Nav::Stop => Ok(s.clone()),

        Nav::Keypath(k) => transform_key(k.clone(), navs, idx, s, st, next),

        Nav::LateKey { offset } => {
            let k = frame_arg(&st.frame, *offset, "keypath")?;
            transform_key(k, navs, idx, s, st, next)
        }

        Nav::Srange(start, end) => splice_range("srange", *start, *end, navs, idx, s, st, next),

        Nav::SrangeDyn(fs, fe) => {
            let start = dyn_bound(fs.call(s), "srange")?;
            let end = dyn_bound(fe.call(s), "srange")?;
            splice_range("srange", start, end, navs, idx, s, st, next)
        }

        Nav::Beginning => splice_range("BEGINNING", 0, 0, navs, idx, s, st, next),

        Nav::End => {
            let len = s.len().filter(|_| s.is_ordered()).ok_or_else(|| shape_err("END", s))?;
            splice_range("END", len, len, navs, idx, s, st, next)
        }

        Nav::Walker(pred) => walk_transform(pred, false, navs, idx + 1, s, st, next),

        Nav::Codewalker(pred) => walk_transform(pred, true, navs, idx + 1, s, st, next),

        Nav::Filterer(p) => {
            let elems = s.seq_elems().ok_or_else(|| shape_err("filterer", s))?;
            let frame = st.frame.clone();
            let mut positions = Vec::new();
            let mut matched = Vec::new();
            for (i, e) in elems.iter().enumerate() {
                if !select_fresh(p, e, &frame)?.is_empty() {
                    positions.push(i);
                    matched.push(e.clone());
                }
            }
            let window = Value::vector(matched);
            let r = transform_at(navs, idx + 1, &window, st, next)?;
            let repl = r.seq_elems().ok_or_else(|| {
                Error::ShapeMismatch(format!(
                    "filterer transform must return an ordered sequence, got {}",
                    r
                ))
            })?;
            if repl.len() != positions.len() {
                return Err(Error::ArityMismatch(format!(
                    "filterer transform returned {} elements for {} selected positions",
                    repl.len(),
                    positions.len()
                )));
            }
            let mut out = elems;
            for (i, v) in positions.into_iter().zip(repl) {
                out[i] = v;
            }
            Ok(s.rebuild_seq(out))
        }

        Nav::View(f) => {
            let window = f.call(s);
            transform_at(navs, idx + 1, &window, st, next)
        }

        Nav::PredFn(f) => {
            if f.test(s) {
                transform_at(navs, idx + 1, s, st, next)
            } else {
                Ok(s.clone())
            }
        }

        Nav::PredSet(set) => {
            if set.contains(s) {
                transform_at(navs, idx + 1, s, st, next)
            } else {
                Ok(s.clone())
            }
        }

        Nav::Selected(p) => {
            let frame = st.frame.clone();
            if !select_fresh(p, s, &frame)?.is_empty() {
                transform_at(navs, idx + 1, s, st, next)
            } else {
                Ok(s.clone())
            }
        }

        Nav::NotSelected(p) => {
            let frame = st.frame.clone();
            if select_fresh(p, s, &frame)?.is_empty() {
                transform_at(navs, idx + 1, s, st, next)
            } else {
                Ok(s.clone())
            }
        }

        Nav::Transformed(p, f) => {
            let frame = st.frame.clone();
            let window = transform_fresh(p, s, &frame, f)?;
            transform_at(navs, idx + 1, &window, st, next)
        }

        Nav::CondPath(pairs) => {
            let frame = st.frame.clone();
            for (cond, branch) in pairs {
                if !select_fresh(cond, s, &frame)?.is_empty() {
                    return transform_into_sub(branch, navs, idx + 1, s, st, next);
                }
            }
            // No matching clause leaves the structure untouched.
            Ok(s.clone())
        }

        Nav::MultiPath(paths) => {
            let mut cur = s.clone();
            for p in paths {
                cur = transform_into_sub(p, navs, idx + 1, &cur, st, next)?;
            }
            Ok(cur)
        }

        Nav::Sub(p) => transform_into_sub(p, navs, idx + 1, s, st, next),

        Nav::Collect(p) => {
            let frame = st.frame.clone();
            let collected = Value::vector(select_fresh(p, s, &frame)?);
            push_and_continue_transform(collected, navs, idx, s, st, next)
        }

        Nav::CollectOne(p) => {
            let frame = st.frame.clone();
            let collected = collect_one_value(p, s, &frame)?;
            push_and_continue_transform(collected, navs, idx, s, st, next)
        }

        Nav::PutVal(v) => push_and_continue_transform(v.clone(), navs, idx, s, st, next),

        Nav::LatePutVal { offset } => {
            let v = frame_arg(&st.frame, *offset, "putval")?;
            push_and_continue_transform(v, navs, idx, s, st, next)
        }

        Nav::Val => push_and_continue_transform(s.clone(), navs, idx, s, st, next),

        Nav::LateSrange { offset } => {
            let args = frame_args(&st.frame, *offset, 2, "srange")?;
            let start = dyn_bound(args[0].clone(), "srange")?;
            let end = dyn_bound(args[1].clone(), "srange")?;
            splice_range("srange", start, end, navs, idx, s, st, next)
        }

        Nav::Custom(n) => {
            let mut k = TransformK {
                navs,
                idx: idx + 1,
                st,
                next,
            };
            n.transform_step(s, &mut k)
        }

        Nav::CustomParam { nav, slots, offset } => {
            let args = frame_args(&st.frame, *offset, *slots, nav.name())?;
            let mut k = TransformK {
                navs,
                idx: idx + 1,
                st,
                next,
            };
            nav.transform_step(&args, s, &mut k)
        }

        Nav::CustomCollector(c) => {
            let collected = c.collect_value(s)?;
            push_and_continue_transform(collected, navs, idx, s, st, next)
        }

        Nav::CustomParamCollector {
            collector,
            slots,
            offset,
        } => {
            let args = frame_args(&st.frame, *offset, *slots, collector.name())?;
            let collected = collector.collect_value(&args, s)?;
            push_and_continue_transform(collected, navs, idx, s, st, next)
        }
    }
}

fn push_and_continue_transform(
    collected: Value,
    navs: &[Nav],
    idx: usize,
    s: &Value,
    st: &mut TransformState<'_>,
    next: &dyn TransformCont,
) -> Result<Value> {
    st.vals.push(collected);
    let r = transform_at(navs, idx + 1, s, st, next);
    st.vals.pop();
    r
}

fn transform_key(
    k: Value,
    navs: &[Nav],
    idx: usize,
    s: &Value,
    st: &mut TransformState<'_>,
    next: &dyn TransformCont,
) -> Result<Value> {
    let m = s.as_map().ok_or_else(|| shape_err("keypath", s))?;
    let child = m.get(&k).cloned().unwrap_or(Value::Nil);
    let r = transform_at(navs, idx + 1, &child, st, next)?;
    s.put(k, r).ok_or_else(|| shape_err("keypath", s))
}

/// Subrange transform: the continuation's output (any ordered sequence) is
/// spliced over `[start, end)`, so an empty range inserts at `start`.
fn splice_range(
    who: &str,
    start: usize,
    end: usize,
    navs: &[Nav],
    idx: usize,
    s: &Value,
    st: &mut TransformState<'_>,
    next: &dyn TransformCont,
) -> Result<Value> {
    let elems = range_window(who, s, start, end)?;
    let window = Value::vector(elems[start..end].to_vec());
    let r = transform_at(navs, idx + 1, &window, st, next)?;
    let repl = r.seq_elems().ok_or_else(|| {
        Error::ShapeMismatch(format!(
            "{} transform must return an ordered sequence, got {}",
            who, r
        ))
    })?;
    let mut out = Vec::with_capacity(elems.len() - (end - start) + repl.len());
    out.extend_from_slice(&elems[..start]);
    out.extend(repl);
    out.extend_from_slice(&elems[end..]);
    Ok(s.rebuild_seq(out))
}

fn transform_into_sub(
    p: &CompiledPath,
    navs: &[Nav],
    idx_after: usize,
    s: &Value,
    st: &mut TransformState<'_>,
    next: &dyn TransformCont,
) -> Result<Value> {
    match p.frame() {
        Some(f) => {
            let saved = std::mem::replace(&mut st.frame, Some(f.clone()));
            let chain = TransformRestore {
                frame: saved.clone(),
                navs,
                idx: idx_after,
                next,
            };
            let r = transform_at(p.navs(), 0, s, st, &chain);
            st.frame = saved;
            r
        }
        None => {
            let chain = TransformChain {
                navs,
                idx: idx_after,
                next,
            };
            transform_at(p.navs(), 0, s, st, &chain)
        }
    }
}

/// Bottom-up rebuild: children are walked first, containers are rebuilt
/// around the replacements, shapes are preserved throughout.
fn walk_transform(
    pred: &NativeFn,
    code_only: bool,
    navs: &[Nav],
    idx: usize,
    v: &Value,
    st: &mut TransformState<'_>,
    next: &dyn TransformCont,
) -> Result<Value> {
    if pred.test(v) {
        return transform_at(navs, idx, v, st, next);
    }
    match v {
        Value::Vec(vec) => {
            let mut out = Vec::with_capacity(vec.len());
            for e in vec.iter() {
                out.push(walk_transform(pred, code_only, navs, idx, e, st, next)?);
            }
            Ok(Value::vector(out))
        }
        Value::List(l) => {
            let mut out = Vec::with_capacity(l.len());
            for e in l.iter() {
                out.push(walk_transform(pred, code_only, navs, idx, e, st, next)?);
            }
            Ok(Value::List(out.into_iter().collect()))
        }
        Value::Map(m) if !code_only => {
            let mut out = IndexMap::with_capacity(m.len());
            for (k, mv) in m.iter() {
                out.insert(
                    k.clone(),
                    walk_transform(pred, code_only, navs, idx, mv, st, next)?,
                );
            }
            Ok(Value::map(out))
        }
        Value::Set(set) if !code_only => {
            let mut out = IndexSet::with_capacity(set.len());
            for e in set.iter() {
                out.insert(walk_transform(pred, code_only, navs, idx, e, st, next)?);
            }
            Ok(Value::set(out))
        }
        _ => Ok(v.clone()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_paths;
    use crate::navigator::{RawCollector, RawNavigator};
    use crate::navigators::{collect_one, key, ALL, VAL};
    use crate::{path, val};

    fn inc(vals: &[Value], v: &Value) -> Result<Value> {
        let _ = vals;
        Ok(val!(v.as_int().unwrap_or(0) + 1))
    }

    #[test]
    fn test_select_leaf_order() {
        let p = compile_paths(path![ALL, "b"]).unwrap();
        let s = val!([{"b": 1}, {"b": 2}, {"b": 3}]);
        assert_eq!(run_select(&p, &s).unwrap(), vec![val!(1), val!(2), val!(3)]);
    }

    #[test]
    fn test_transform_preserves_unpointed() {
        let p = compile_paths(path!["a"]).unwrap();
        let s = val!({"a": 1, "z": [9, 9]});
        let mut f = |vals: &[Value], v: &Value| inc(vals, v);
        let out = run_transform(&p, &s, &mut f).unwrap();
        assert_eq!(out, val!({"a": 2, "z": [9, 9]}));
        // Untouched subtree is shared, not copied
        if let (Value::Vec(a), Value::Vec(b)) = (
            s.get(&val!("z")).unwrap(),
            out.get(&val!("z")).unwrap(),
        ) {
            assert!(std::rc::Rc::ptr_eq(a, b));
        } else {
            panic!("expected vectors");
        }
    }

    #[test]
    fn test_collector_snapshots_are_branch_local() {
        // Each element collects its own :k — no leakage across branches.
        let p = compile_paths(path![ALL, collect_one(path!["k"]), "v"]).unwrap();
        let s = val!([{"k": 10, "v": 1}, {"k": 20, "v": 2}]);
        let mut f = |vals: &[Value], v: &Value| -> Result<Value> {
            assert_eq!(vals.len(), 1);
            Ok(val!(vals[0].as_int().unwrap() + v.as_int().unwrap()))
        };
        let out = run_transform(&p, &s, &mut f).unwrap();
        assert_eq!(out, val!([{"k": 10, "v": 11}, {"k": 20, "v": 22}]));
    }

    #[test]
    fn test_unbound_path_refuses_to_run() {
        let p = compile_paths(path![crate::navigators::late_key()]).unwrap();
        let err = run_select(&p, &val!({"a": 1})).unwrap_err();
        assert!(matches!(err, Error::UnboundParam(_)));
    }

    #[test]
    fn test_custom_navigator_roundtrip() {
        // Navigates to both elements of a two-element vector, reversed.
        struct Reversed;
        impl RawNavigator for Reversed {
            fn name(&self) -> &'static str {
                "reversed"
            }
            fn select_step(&self, s: &Value, k: &mut SelectK<'_>) -> Result<()> {
                let elems = s.seq_elems().ok_or_else(|| shape_err("reversed", s))?;
                for e in elems.iter().rev() {
                    k.descend(e)?;
                }
                Ok(())
            }
            fn transform_step(&self, s: &Value, k: &mut TransformK<'_, '_>) -> Result<Value> {
                let elems = s.seq_elems().ok_or_else(|| shape_err("reversed", s))?;
                let mut out = Vec::with_capacity(elems.len());
                for e in elems.iter().rev() {
                    out.push(k.descend(e)?);
                }
                out.reverse();
                Ok(s.rebuild_seq(out))
            }
        }

        let p = compile_paths(path![Nav::custom(Reversed)]).unwrap();
        assert_eq!(
            run_select(&p, &val!([1, 2, 3])).unwrap(),
            vec![val!(3), val!(2), val!(1)]
        );
        let mut f = |vals: &[Value], v: &Value| inc(vals, v);
        assert_eq!(
            run_transform(&p, &val!([1, 2, 3]), &mut f).unwrap(),
            val!([2, 3, 4])
        );
    }

    #[test]
    fn test_custom_collector() {
        struct Len;
        impl RawCollector for Len {
            fn name(&self) -> &'static str {
                "len"
            }
            fn collect_value(&self, s: &Value) -> Result<Value> {
                Ok(val!(s.len().unwrap_or(0)))
            }
        }

        let p = compile_paths(path![Nav::collector(Len), key("a")]).unwrap();
        let s = val!({"a": 5, "b": 6});
        let mut f = |vals: &[Value], v: &Value| -> Result<Value> {
            Ok(val!(vals[0].as_int().unwrap() * 100 + v.as_int().unwrap()))
        };
        assert_eq!(run_transform(&p, &s, &mut f).unwrap(), val!({"a": 205, "b": 6}));
    }

    #[test]
    fn test_val_collects_current_structure() {
        let p = compile_paths(path![VAL, key("a")]).unwrap();
        let s = val!({"a": 1});
        let mut seen = None;
        let mut f = |vals: &[Value], v: &Value| -> Result<Value> {
            seen = Some(vals[0].clone());
            Ok(v.clone())
        };
        run_transform(&p, &s, &mut f).unwrap();
        assert_eq!(seen, Some(s));
    }
}
