// Navigator protocol: the tagged union of path steps, compiled paths, and
// the late-bound parameter frame.
//
// Every built-in is an explicit variant; literals (keywords, sets,
// functions) are lifted into variants by the compiler, so the engine never
// dispatches on raw values. User extensions enter through the Raw*/Param*
// traits and the Custom* variants.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::engine::{SelectK, TransformK};
use crate::error::{Error, Result};
use crate::value::{NativeFn, Value};

/// One step of a path.
///
/// A navigator is *constant* (usable directly) or *parameterized* (declares
/// parameter slots and reads its arguments through the path's parameter
/// frame at execution). The `Late*` variants and `CustomParam*` are the
/// parameterized ones; their `offset` is assigned by the compiler as the
/// cumulative slot count to their left.
#[derive(Clone)]
pub enum Nav {
    /// Every child of a container. Map children are `[key value]` pairs.
    All,
    /// Head of an ordered sequence.
    First,
    /// Tail element of an ordered sequence.
    Last,
    /// The structure itself.
    Stay,
    /// Nothing: select yields no values, transform is a no-op.
    Stop,
    /// The value at a map key. On transform, a missing key is inserted.
    Keypath(Value),
    /// Contiguous subsequence `[start, end)`, presented as a vector.
    Srange(usize, usize),
    /// Subrange whose bounds are recomputed from the structure per call.
    SrangeDyn(NativeFn, NativeFn),
    /// The empty subsequence before the first element.
    Beginning,
    /// The empty subsequence after the last element.
    End,
    /// Recursive descent: every sub-value matching the predicate, pre-order.
    Walker(NativeFn),
    /// Like `Walker`, but descends only ordered sequences.
    Codewalker(NativeFn),
    /// The filtered view of an ordered sequence (elements whose inner path
    /// selects something), presented as a vector.
    Filterer(CompiledPath),
    /// A read/write window through a function (no write-back).
    View(NativeFn),
    /// Predicate gate: pass the structure through iff the function is truthy.
    PredFn(NativeFn),
    /// Predicate gate by set membership.
    PredSet(Rc<IndexSet<Value>>),
    /// Pass iff the inner path selects something.
    Selected(CompiledPath),
    /// Pass iff the inner path selects nothing.
    NotSelected(CompiledPath),
    /// Window over the structure after an inner transform is applied.
    Transformed(CompiledPath, NativeFn),
    /// First clause whose condition selects something decides the branch.
    /// No matching clause: select yields nothing, transform is a no-op.
    CondPath(Vec<(CompiledPath, CompiledPath)>),
    /// Select concatenates; transform threads the structure left to right.
    MultiPath(Vec<CompiledPath>),
    /// A compiled path used as a single navigator.
    Sub(CompiledPath),

    // Collectors: contribute a value to the terminal function's argument
    // list without moving the cursor.
    /// Collect the inner path's full selection (as a vector).
    Collect(CompiledPath),
    /// Collect the inner path's single result (cardinality <= 1).
    CollectOne(CompiledPath),
    /// Collect a constant.
    PutVal(Value),
    /// Collect the structure at this point.
    Val,

    // Late-bound parameterized forms. Offsets are assigned at compile time;
    // arguments are read from the parameter frame at execution.
    LateKey { offset: usize },
    LateSrange { offset: usize },
    LatePutVal { offset: usize },

    // User extensions.
    Custom(Rc<dyn RawNavigator>),
    CustomParam {
        nav: Rc<dyn ParamNavigator>,
        slots: usize,
        offset: usize,
    },
    CustomCollector(Rc<dyn RawCollector>),
    CustomParamCollector {
        collector: Rc<dyn ParamCollector>,
        slots: usize,
        offset: usize,
    },
}

impl Nav {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Nav::All => "ALL",
            Nav::First => "FIRST",
            Nav::Last => "LAST",
            Nav::Stay => "STAY",
            Nav::Stop => "STOP",
            Nav::Keypath(_) | Nav::LateKey { .. } => "keypath",
            Nav::Srange(..) | Nav::SrangeDyn(..) | Nav::LateSrange { .. } => "srange",
            Nav::Beginning => "BEGINNING",
            Nav::End => "END",
            Nav::Walker(_) => "walker",
            Nav::Codewalker(_) => "codewalker",
            Nav::Filterer(_) => "filterer",
            Nav::View(_) => "view",
            Nav::PredFn(_) | Nav::PredSet(_) => "pred",
            Nav::Selected(_) => "selected?",
            Nav::NotSelected(_) => "not-selected?",
            Nav::Transformed(..) => "transformed",
            Nav::CondPath(_) => "cond-path",
            Nav::MultiPath(_) => "multi-path",
            Nav::Sub(_) => "subpath",
            Nav::Collect(_) => "collect",
            Nav::CollectOne(_) => "collect-one",
            Nav::PutVal(_) | Nav::LatePutVal { .. } => "putval",
            Nav::Val => "VAL",
            Nav::Custom(n) => n.name(),
            Nav::CustomParam { nav, .. } => nav.name(),
            Nav::CustomCollector(c) => c.name(),
            Nav::CustomParamCollector { collector, .. } => collector.name(),
        }
    }

    /// Number of unsatisfied parameter slots this navigator consumes.
    pub(crate) fn slots(&self) -> usize {
        match self {
            Nav::LateKey { .. } | Nav::LatePutVal { .. } => 1,
            Nav::LateSrange { .. } => 2,
            Nav::CustomParam { slots, .. } => *slots,
            Nav::CustomParamCollector { slots, .. } => *slots,
            Nav::Filterer(p)
            | Nav::Selected(p)
            | Nav::NotSelected(p)
            | Nav::Transformed(p, _)
            | Nav::Sub(p)
            | Nav::Collect(p)
            | Nav::CollectOne(p) => p.unbound_slots(),
            Nav::CondPath(pairs) => pairs
                .iter()
                .map(|(c, p)| c.unbound_slots() + p.unbound_slots())
                .sum(),
            Nav::MultiPath(paths) => paths.iter().map(|p| p.unbound_slots()).sum(),
            _ => 0,
        }
    }

    /// Whether this step feeds the collected-values accumulator of the
    /// navigation it is part of. Inner paths that run as fresh
    /// sub-executions (filterer tests, `collect` itself) do not count;
    /// branch paths that continue the outer navigation do.
    pub(crate) fn collects(&self) -> bool {
        match self {
            Nav::Collect(_)
            | Nav::CollectOne(_)
            | Nav::PutVal(_)
            | Nav::LatePutVal { .. }
            | Nav::Val
            | Nav::CustomCollector(_)
            | Nav::CustomParamCollector { .. } => true,
            Nav::Sub(p) => p.has_collectors(),
            Nav::CondPath(pairs) => pairs.iter().any(|(_, p)| p.has_collectors()),
            Nav::MultiPath(paths) => paths.iter().any(|p| p.has_collectors()),
            _ => false,
        }
    }

    /// Rebase every parameter offset by `base`. Inner paths consume their
    /// slots in order, so sibling paths are staggered.
    pub(crate) fn shift(self, base: usize) -> Nav {
        // Even at base 0, compound variants must stagger their inner paths.
        if self.slots() == 0 {
            return self;
        }
        match self {
            Nav::LateKey { offset } => Nav::LateKey {
                offset: offset + base,
            },
            Nav::LateSrange { offset } => Nav::LateSrange {
                offset: offset + base,
            },
            Nav::LatePutVal { offset } => Nav::LatePutVal {
                offset: offset + base,
            },
            Nav::CustomParam { nav, slots, offset } => Nav::CustomParam {
                nav,
                slots,
                offset: offset + base,
            },
            Nav::CustomParamCollector {
                collector,
                slots,
                offset,
            } => Nav::CustomParamCollector {
                collector,
                slots,
                offset: offset + base,
            },
            Nav::Filterer(p) => Nav::Filterer(p.shift(base)),
            Nav::Selected(p) => Nav::Selected(p.shift(base)),
            Nav::NotSelected(p) => Nav::NotSelected(p.shift(base)),
            Nav::Transformed(p, f) => Nav::Transformed(p.shift(base), f),
            Nav::Sub(p) => Nav::Sub(p.shift(base)),
            Nav::Collect(p) => Nav::Collect(p.shift(base)),
            Nav::CollectOne(p) => Nav::CollectOne(p.shift(base)),
            Nav::CondPath(pairs) => {
                let mut at = base;
                let mut out = Vec::with_capacity(pairs.len());
                for (c, p) in pairs {
                    let cs = c.unbound_slots();
                    let ps = p.unbound_slots();
                    let c = c.shift(at);
                    let p = p.shift(at + cs);
                    at += cs + ps;
                    out.push((c, p));
                }
                Nav::CondPath(out)
            }
            Nav::MultiPath(paths) => {
                let mut at = base;
                let mut out = Vec::with_capacity(paths.len());
                for p in paths {
                    let s = p.unbound_slots();
                    out.push(p.shift(at));
                    at += s;
                }
                Nav::MultiPath(out)
            }
            other => other,
        }
    }

    /// Wrap a user navigator.
    pub fn custom(nav: impl RawNavigator + 'static) -> Nav {
        Nav::Custom(Rc::new(nav))
    }

    /// Register a parameterized user navigator consuming `slots` frame slots.
    pub fn params_path(slots: usize, nav: impl ParamNavigator + 'static) -> Nav {
        Nav::CustomParam {
            nav: Rc::new(nav),
            slots,
            offset: 0,
        }
    }

    /// Wrap a user collector.
    pub fn collector(collector: impl RawCollector + 'static) -> Nav {
        Nav::CustomCollector(Rc::new(collector))
    }

    /// Register a parameterized user collector consuming `slots` frame slots.
    pub fn params_collector(slots: usize, collector: impl ParamCollector + 'static) -> Nav {
        Nav::CustomParamCollector {
            collector: Rc::new(collector),
            slots,
            offset: 0,
        }
    }
}

impl fmt::Debug for Nav {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nav::Keypath(k) => write!(f, "keypath({})", k),
            Nav::Srange(s, e) => write!(f, "srange({}, {})", s, e),
            Nav::PutVal(v) => write!(f, "putval({})", v),
            Nav::LateKey { offset } => write!(f, "keypath(?{})", offset),
            Nav::LateSrange { offset } => write!(f, "srange(?{}, ?{})", offset, offset + 1),
            Nav::LatePutVal { offset } => write!(f, "putval(?{})", offset),
            other => write!(f, "{}", other.name()),
        }
    }
}

// ── Custom navigator protocol ────────────────────────────────────────────────

/// A user-defined constant navigator.
///
/// `select_step` must call `k.descend` once per pointed-at sub-structure;
/// `transform_step` must do the same and splice each replacement back,
/// returning the updated structure. The continuation is opaque: it
/// represents the rest of the path and must not be inspected.
pub trait RawNavigator {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn select_step(&self, structure: &Value, k: &mut SelectK<'_>) -> Result<()>;

    fn transform_step(&self, structure: &Value, k: &mut TransformK<'_, '_>) -> Result<Value>;
}

/// A user-defined parameterized navigator. `args` holds the navigator's
/// slice of the parameter frame, in slot order.
pub trait ParamNavigator {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn select_step(&self, args: &[Value], structure: &Value, k: &mut SelectK<'_>) -> Result<()>;

    fn transform_step(
        &self,
        args: &[Value],
        structure: &Value,
        k: &mut TransformK<'_, '_>,
    ) -> Result<Value>;
}

/// A user-defined collector: yields one value into the collected-values
/// side channel without advancing the cursor.
pub trait RawCollector {
    fn name(&self) -> &'static str {
        "custom-collector"
    }

    fn collect_value(&self, structure: &Value) -> Result<Value>;
}

/// A parameterized user collector.
pub trait ParamCollector {
    fn name(&self) -> &'static str {
        "custom-collector"
    }

    fn collect_value(&self, args: &[Value], structure: &Value) -> Result<Value>;
}

// ── Parameter frame ──────────────────────────────────────────────────────────

/// Late-bound arguments: a shared read-only array plus a base index.
/// Parameterized navigator `i` reads `params[base + offset_i + k]` for its
/// k-th argument. Frames are never mutated during a call.
#[derive(Clone, Debug)]
pub struct ParamFrame {
    params: Rc<[Value]>,
    base: usize,
}

impl ParamFrame {
    pub fn new(params: impl Into<Rc<[Value]>>, base: usize) -> Self {
        ParamFrame {
            params: params.into(),
            base,
        }
    }

    /// The argument at `offset + k` relative to the frame base.
    pub(crate) fn arg(&self, offset: usize, k: usize, who: &str) -> Result<Value> {
        self.params
            .get(self.base + offset + k)
            .cloned()
            .ok_or_else(|| {
                Error::UnboundParam(format!(
                    "{} expects a parameter at slot {} but the frame holds {} values from base {}",
                    who,
                    offset + k,
                    self.params.len(),
                    self.base
                ))
            })
    }

    /// The contiguous argument slice `[offset, offset + n)`.
    pub(crate) fn args(&self, offset: usize, n: usize, who: &str) -> Result<Vec<Value>> {
        (0..n).map(|k| self.arg(offset, k, who)).collect()
    }
}

// ── Compiled paths ───────────────────────────────────────────────────────────

/// A compiled path: a flat navigator sequence plus its late-parameter slot
/// count and a collector flag. Compiled paths are immutable, cheap to clone,
/// and are themselves navigators (see `Nav::Sub`).
#[derive(Clone, Debug)]
pub struct CompiledPath {
    navs: Rc<[Nav]>,
    slots: usize,
    collectors: bool,
    frame: Option<ParamFrame>,
}

impl CompiledPath {
    pub(crate) fn new(navs: Vec<Nav>, slots: usize, collectors: bool) -> Self {
        CompiledPath {
            navs: navs.into(),
            slots,
            collectors,
            frame: None,
        }
    }

    #[inline]
    pub(crate) fn navs(&self) -> &[Nav] {
        &self.navs
    }

    /// Total number of late parameter slots the path consumes.
    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Whether any collector appears anywhere along the path.
    #[inline]
    pub fn has_collectors(&self) -> bool {
        self.collectors
    }

    /// Slots still unsatisfied (zero once a frame is attached).
    #[inline]
    pub(crate) fn unbound_slots(&self) -> usize {
        if self.frame.is_some() {
            0
        } else {
            self.slots
        }
    }

    #[inline]
    pub(crate) fn frame(&self) -> Option<&ParamFrame> {
        self.frame.as_ref()
    }

    /// Whether the path can execute (all slots satisfied).
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.slots == 0 || self.frame.is_some()
    }

    /// Attach a parameter frame. The navigator sequence is shared, not
    /// copied; binding is allocation-free apart from the frame itself.
    pub fn bind(&self, params: impl Into<Rc<[Value]>>, base: usize) -> CompiledPath {
        CompiledPath {
            navs: self.navs.clone(),
            slots: self.slots,
            collectors: self.collectors,
            frame: Some(ParamFrame::new(params, base)),
        }
    }

    /// Rebase every unbound parameter offset by `base`.
    pub(crate) fn shift(&self, base: usize) -> CompiledPath {
        if base == 0 || self.unbound_slots() == 0 {
            return self.clone();
        }
        let navs: Vec<Nav> = self.navs.iter().cloned().map(|n| n.shift(base)).collect();
        CompiledPath {
            navs: navs.into(),
            slots: self.slots,
            collectors: self.collectors,
            frame: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_and_binding() {
        let p = CompiledPath::new(vec![Nav::LateKey { offset: 0 }], 1, false);
        assert_eq!(p.slots(), 1);
        assert!(!p.is_bound());

        let b = p.bind(vec![Value::string("a")], 0);
        assert!(b.is_bound());
        assert_eq!(b.slots(), 1);
        // Binding shares the navigator sequence
        assert!(Rc::ptr_eq(&p.navs, &b.navs));
    }

    #[test]
    fn test_frame_indexing() {
        let f = ParamFrame::new(vec![Value::Int(10), Value::Int(20), Value::Int(30)], 1);
        assert_eq!(f.arg(0, 0, "x").unwrap(), Value::Int(20));
        assert_eq!(f.arg(1, 0, "x").unwrap(), Value::Int(30));
        assert!(f.arg(2, 0, "x").is_err());
    }

    #[test]
    fn test_shift_staggers_siblings() {
        let inner_a = CompiledPath::new(vec![Nav::LateKey { offset: 0 }], 1, false);
        let inner_b = CompiledPath::new(vec![Nav::LateKey { offset: 0 }], 1, false);
        let multi = Nav::MultiPath(vec![inner_a, inner_b]);
        assert_eq!(multi.slots(), 2);

        if let Nav::MultiPath(paths) = multi.shift(3) {
            let offs: Vec<usize> = paths
                .iter()
                .map(|p| match p.navs()[0] {
                    Nav::LateKey { offset } => offset,
                    _ => panic!("expected keypath"),
                })
                .collect();
            assert_eq!(offs, vec![3, 4]);
        } else {
            panic!("expected multi-path");
        }
    }
}
