// Value: Rc-wrapped tagged value type for O(1) cloning.
// All containers are persistent: updates copy-on-write via Rc::make_mut,
// so unchanged sub-containers are shared by reference with the input.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

/// A nested immutable value with O(1) clone semantics via Rc-wrapping.
///
/// Scalars are `Nil`, `Bool`, `Int`, `Float`, `Str`, and `Keyword`. The
/// container shapes are `Map` (keyed, insertion-ordered), `Vec` (indexed
/// sequence), `List` (linked sequence), and `Set` (insertion-ordered).
/// `Fn` holds a named native function usable as predicate or transform.
///
/// `Int` and `Float` are separate variants so that `Value` can implement
/// `Eq + Hash` and serve as a map key or set element; `Float` compares and
/// hashes by bit pattern.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Keyword(Rc<str>),
    Map(Rc<IndexMap<Value, Value>>),
    Vec(Rc<Vec<Value>>),
    List(List),
    Set(Rc<IndexSet<Value>>),
    Fn(NativeFn),
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    #[inline]
    pub fn keyword(s: impl Into<Rc<str>>) -> Self {
        Value::Keyword(s.into())
    }

    #[inline]
    pub fn vector(v: Vec<Value>) -> Self {
        Value::Vec(Rc::new(v))
    }

    #[inline]
    pub fn map(m: IndexMap<Value, Value>) -> Self {
        Value::Map(Rc::new(m))
    }

    #[inline]
    pub fn list(l: List) -> Self {
        Value::List(l)
    }

    #[inline]
    pub fn set(s: IndexSet<Value>) -> Self {
        Value::Set(Rc::new(s))
    }

    #[inline]
    pub fn native(f: NativeFn) -> Self {
        Value::Fn(f)
    }

    /// An empty keyed map.
    pub fn empty_map() -> Self {
        Value::Map(Rc::new(IndexMap::new()))
    }
}

// ── Type checks and extraction ───────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    #[inline]
    pub fn is_vec(&self) -> bool {
        matches!(self, Value::Vec(_))
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        matches!(self, Value::Set(_))
    }

    #[inline]
    pub fn is_fn(&self) -> bool {
        matches!(self, Value::Fn(_))
    }

    /// Everything but `Nil` and `Bool(false)` is truthy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Keyword(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_vec(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Vec(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&IndexMap<Value, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    #[inline]
    pub fn as_set(&self) -> Option<&IndexSet<Value>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Get a mutable reference to the inner Vec, cloning if shared (Rc::make_mut).
    #[inline]
    pub fn as_vec_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Vec(v) => Some(Rc::make_mut(v)),
            _ => None,
        }
    }

    /// Get a mutable reference to the inner IndexMap, cloning if shared (Rc::make_mut).
    #[inline]
    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<Value, Value>> {
        match self {
            Value::Map(m) => Some(Rc::make_mut(m)),
            _ => None,
        }
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    #[inline]
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    #[inline]
    fn from(v: Vec<Value>) -> Self {
        Value::Vec(Rc::new(v))
    }
}

impl From<IndexMap<Value, Value>> for Value {
    #[inline]
    fn from(m: IndexMap<Value, Value>) -> Self {
        Value::Map(Rc::new(m))
    }
}

impl From<IndexSet<Value>> for Value {
    #[inline]
    fn from(s: IndexSet<Value>) -> Self {
        Value::Set(Rc::new(s))
    }
}

impl From<List> for Value {
    #[inline]
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<NativeFn> for Value {
    #[inline]
    fn from(f: NativeFn) -> Self {
        Value::Fn(f)
    }
}

// ── Equality and hashing ─────────────────────────────────────────────────────

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bitwise so NaN keys behave consistently with Hash
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Vec(a), Value::Vec(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Fn(a), Value::Fn(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Keyword(s) => s.hash(state),
            Value::Vec(v) => v.hash(state),
            Value::List(l) => l.hash(state),
            // Map/Set equality is order-independent, so hash only the length
            // to stay consistent with Eq.
            Value::Map(m) => m.len().hash(state),
            Value::Set(s) => s.len().hash(state),
            Value::Fn(f) => f.hash(state),
        }
    }
}

// ── Display / Debug ──────────────────────────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Keyword(s) => write!(f, ":{}", s),
            Value::Vec(v) => {
                write!(f, "[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            Value::List(l) => {
                write!(f, "(")?;
                for (i, e) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Set(s) => {
                write!(f, "#{{")?;
                for (i, e) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
            Value::Fn(nf) => write!(f, "<fn {}>", nf.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ── Native functions ─────────────────────────────────────────────────────────

/// A named native function over values.
///
/// Used as a predicate (result tested for truthiness) and as a unary
/// transform (for `view`, `transformed`, and dynamic subrange bounds).
/// Equality and hashing are by pointer identity, like any opaque callable.
#[derive(Clone)]
pub struct NativeFn {
    name: Rc<str>,
    func: Rc<dyn Fn(&Value) -> Value>,
}

impl NativeFn {
    pub fn new(name: impl Into<Rc<str>>, func: impl Fn(&Value) -> Value + 'static) -> Self {
        NativeFn {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    /// Wrap a boolean predicate as a native function.
    pub fn pred(name: impl Into<Rc<str>>, pred: impl Fn(&Value) -> bool + 'static) -> Self {
        NativeFn {
            name: name.into(),
            func: Rc::new(move |v| Value::Bool(pred(v))),
        }
    }

    #[inline]
    pub fn call(&self, v: &Value) -> Value {
        (self.func)(v)
    }

    /// Call and test the result for truthiness.
    #[inline]
    pub fn test(&self, v: &Value) -> bool {
        self.call(v).is_truthy()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for NativeFn {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl Eq for NativeFn {}

impl Hash for NativeFn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.func) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

// ── Linked sequence ──────────────────────────────────────────────────────────

/// A persistent singly-linked sequence. `cons`, `first`, and `rest` are O(1)
/// and share structure; random-access updates rebuild the prefix.
#[derive(Clone, Default)]
pub struct List {
    head: Option<Rc<ListNode>>,
    len: usize,
}

#[derive(Clone)]
struct ListNode {
    elem: Value,
    next: Option<Rc<ListNode>>,
}

impl List {
    pub fn new() -> Self {
        List { head: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Prepend an element, sharing the existing tail.
    pub fn cons(&self, elem: Value) -> List {
        List {
            head: Some(Rc::new(ListNode {
                elem,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn first(&self) -> Option<&Value> {
        self.head.as_deref().map(|n| &n.elem)
    }

    /// The sequence without its head; `None` when empty.
    pub fn rest(&self) -> Option<List> {
        self.head.as_deref().map(|n| List {
            head: n.next.clone(),
            len: self.len - 1,
        })
    }

    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            node: self.head.as_deref(),
        }
    }
}

pub struct ListIter<'a> {
    node: Option<&'a ListNode>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(&node.elem)
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let elems: Vec<Value> = iter.into_iter().collect();
        let mut list = List::new();
        for elem in elems.into_iter().rev() {
            list = list.cons(elem);
        }
        list
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for List {}

impl Hash for List {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        for elem in self.iter() {
            elem.hash(state);
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ── serde_json interop ───────────────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(arr) => {
                Value::Vec(Rc::new(arr.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let m: IndexMap<Value, Value> = map
                    .into_iter()
                    .map(|(k, v)| (Value::string(k), Value::from(v)))
                    .collect();
                Value::Map(Rc::new(m))
            }
        }
    }
}

/// Best-effort JSON rendering: keywords become bare strings, lists and sets
/// become arrays, non-string map keys are stringified, functions become null.
impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::json!(*n),
            Value::Float(n) => {
                if n.is_finite() {
                    serde_json::json!(*n)
                } else {
                    serde_json::Value::Null
                }
            }
            Value::Str(s) | Value::Keyword(s) => serde_json::Value::String(s.to_string()),
            Value::Vec(arr) => {
                serde_json::Value::Array(arr.iter().map(serde_json::Value::from).collect())
            }
            Value::List(l) => {
                serde_json::Value::Array(l.iter().map(serde_json::Value::from).collect())
            }
            Value::Set(s) => {
                serde_json::Value::Array(s.iter().map(serde_json::Value::from).collect())
            }
            Value::Map(map) => {
                let m: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Value::Str(s) | Value::Keyword(s) => s.to_string(),
                            other => other.to_string(),
                        };
                        (key, serde_json::Value::from(v))
                    })
                    .collect();
                serde_json::Value::Object(m)
            }
            Value::Fn(_) => serde_json::Value::Null,
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_json::Value::from(self).serialize(serializer)
    }
}

impl Value {
    /// Parse a JSON string into a value.
    pub fn from_json_str(s: &str) -> Result<Value, serde_json::Error> {
        let v: serde_json::Value = serde_json::from_str(s)?;
        Ok(Value::from(v))
    }

    /// Serialize to a JSON string (see the `From<&Value>` caveats).
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── val! macro ───────────────────────────────────────────────────────────────

/// Macro for constructing `Value` literals.
///
/// Usage:
///   val!(nil)               → Value::Nil
///   val!(true)              → Value::Bool(true)
///   val!(42)                → Value::Int(42)
///   val!(3.14)              → Value::Float(3.14)
///   val!("hello")           → Value::Str
///   val!([1, 2, 3])         → Value::Vec
///   val!({"k": v, ...})     → Value::Map (any literal as key)
///   val!(expr)              → Value::from(expr)
#[macro_export]
macro_rules! val {
    // nil
    (nil) => {
        $crate::value::Value::Nil
    };

    // true
    (true) => {
        $crate::value::Value::Bool(true)
    };

    // false
    (false) => {
        $crate::value::Value::Bool(false)
    };

    // Vector
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::value::Value::Vec(std::rc::Rc::new(vec![ $( $crate::val!($elem) ),* ]))
    };

    // Map
    ({ $($key:tt : $val:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = indexmap::IndexMap::new();
            $(
                map.insert($crate::val!($key), $crate::val!($val));
            )*
            $crate::value::Value::Map(std::rc::Rc::new(map))
        }
    };

    // Expression (fallback — numbers, strings, variables, etc.)
    ($other:expr) => {
        $crate::value::Value::from($other)
    };
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_cheap() {
        // Vector clone should be O(1) — same Rc pointer
        let v = Value::vector(vec![val!(1), val!(2), val!(3)]);
        let v2 = v.clone();
        if let (Value::Vec(a), Value::Vec(b)) = (&v, &v2) {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected vectors");
        }

        let mut m = IndexMap::new();
        m.insert(val!("x"), val!(1));
        let obj = Value::map(m);
        let obj2 = obj.clone();
        if let (Value::Map(a), Value::Map(b)) = (&obj, &obj2) {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected maps");
        }
    }

    #[test]
    fn test_make_mut_cow() {
        let mut v = Value::vector(vec![val!(1), val!(2)]);
        let v2 = v.clone();

        v.as_vec_mut().unwrap().push(val!(3));

        assert_eq!(v.as_vec().unwrap().len(), 3);
        assert_eq!(v2.as_vec().unwrap().len(), 2);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(val!(0).is_truthy());
        assert!(val!("").is_truthy());
    }

    #[test]
    fn test_equality() {
        assert_eq!(val!(1), val!(1));
        assert_ne!(val!(1), val!(1.0));
        assert_eq!(val!("a"), val!("a"));
        assert_ne!(val!("a"), Value::keyword("a"));
        assert_eq!(val!([1, 2]), val!([1, 2]));
        assert_eq!(val!({"a": 1}), val!({"a": 1}));
        assert_ne!(val!({"a": 1}), val!({"a": 2}));
    }

    #[test]
    fn test_map_keys_by_value() {
        let m = val!({1: "one", "two": 2, true: nil});
        assert_eq!(m.get(&val!(1)), Some(&val!("one")));
        assert_eq!(m.get(&val!("two")), Some(&val!(2)));
        assert_eq!(m.get(&val!(true)), Some(&Value::Nil));
        assert_eq!(m.get(&val!(2)), None);
    }

    #[test]
    fn test_list_ops() {
        let l: List = vec![val!(1), val!(2), val!(3)].into_iter().collect();
        assert_eq!(l.len(), 3);
        assert_eq!(l.first(), Some(&val!(1)));
        let r = l.rest().unwrap();
        assert_eq!(r.first(), Some(&val!(2)));
        assert_eq!(r.len(), 2);

        let c = l.cons(val!(0));
        assert_eq!(c.len(), 4);
        assert_eq!(c.first(), Some(&val!(0)));
        // Original unchanged
        assert_eq!(l.first(), Some(&val!(1)));
    }

    #[test]
    fn test_native_fn_identity() {
        let f = NativeFn::pred("odd?", |v| v.as_int().map(|n| n % 2 != 0).unwrap_or(false));
        let g = f.clone();
        assert_eq!(Value::Fn(f.clone()), Value::Fn(g));
        assert!(f.test(&val!(3)));
        assert!(!f.test(&val!(4)));
        assert!(!f.test(&val!("x")));
    }

    #[test]
    fn test_json_roundtrip() {
        let v = val!({"name": "Alice", "scores": [1, 2, 3], "active": true});
        let s = v.to_json_string().unwrap();
        let back = Value::from_json_str(&s).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn test_display() {
        assert_eq!(val!([1, "a"]).to_string(), "[1 \"a\"]");
        assert_eq!(Value::keyword("k").to_string(), ":k");
        assert_eq!(val!({"a": 1}).to_string(), "{\"a\" 1}");
    }
}
