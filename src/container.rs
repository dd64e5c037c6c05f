// Container shim: the uniform operation surface over the four container
// shapes (keyed map, indexed sequence, linked sequence, set). The engine
// goes through these helpers so shape handling lives in one place.

use indexmap::IndexSet;

use crate::value::{List, Value};

/// The shape of a value, as the navigation engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Map,
    Vec,
    List,
    Set,
    Fn,
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Map(_) => Shape::Map,
            Value::Vec(_) => Shape::Vec,
            Value::List(_) => Shape::List,
            Value::Set(_) => Shape::Set,
            Value::Fn(_) => Shape::Fn,
            _ => Shape::Scalar,
        }
    }

    /// Shape name for diagnostics.
    pub fn shape_name(&self) -> &'static str {
        match self.shape() {
            Shape::Scalar => "scalar",
            Shape::Map => "map",
            Shape::Vec => "vector",
            Shape::List => "list",
            Shape::Set => "set",
            Shape::Fn => "function",
        }
    }

    /// Vectors and lists are the ordered sequences.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        matches!(self, Value::Vec(_) | Value::List(_))
    }

    /// Number of children, for any container shape.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Map(m) => Some(m.len()),
            Value::Vec(v) => Some(v.len()),
            Value::List(l) => Some(l.len()),
            Value::Set(s) => Some(s.len()),
            _ => None,
        }
    }

    // ── Keyed access ─────────────────────────────────────────────────────

    /// Look up `key` in a keyed map.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// A new map with `key` bound to `val`; existing entries are shared.
    /// `None` when the value is not a map.
    pub fn put(&self, key: Value, val: Value) -> Option<Value> {
        match self {
            Value::Map(m) => {
                let mut m = m.clone();
                std::rc::Rc::make_mut(&mut m).insert(key, val);
                Some(Value::Map(m))
            }
            _ => None,
        }
    }

    // ── Ordered access ───────────────────────────────────────────────────

    /// Head of an ordered sequence.
    pub fn first(&self) -> Option<&Value> {
        match self {
            Value::Vec(v) => v.first(),
            Value::List(l) => l.first(),
            _ => None,
        }
    }

    /// An ordered sequence without its head. `None` for non-ordered shapes
    /// and for empty sequences.
    pub fn rest(&self) -> Option<Value> {
        match self {
            Value::Vec(v) => {
                if v.is_empty() {
                    None
                } else {
                    Some(Value::vector(v[1..].to_vec()))
                }
            }
            Value::List(l) => l.rest().map(Value::List),
            _ => None,
        }
    }

    /// Prepend an element to an ordered sequence, preserving its shape.
    pub fn cons(&self, elem: Value) -> Option<Value> {
        match self {
            Value::Vec(v) => {
                let mut out = Vec::with_capacity(v.len() + 1);
                out.push(elem);
                out.extend(v.iter().cloned());
                Some(Value::vector(out))
            }
            Value::List(l) => Some(Value::List(l.cons(elem))),
            _ => None,
        }
    }

    /// A new ordered sequence with the element at `idx` replaced by
    /// `f(element)`. `None` for non-ordered shapes or out-of-range `idx`.
    pub fn update_at(&self, idx: usize, f: impl FnOnce(&Value) -> Value) -> Option<Value> {
        match self {
            Value::Vec(v) => {
                let old = v.get(idx)?;
                let new = f(old);
                let mut v = v.clone();
                std::rc::Rc::make_mut(&mut v)[idx] = new;
                Some(Value::Vec(v))
            }
            Value::List(l) => {
                if idx >= l.len() {
                    return None;
                }
                let mut elems: Vec<Value> = l.iter().cloned().collect();
                elems[idx] = f(&elems[idx]);
                Some(Value::List(elems.into_iter().collect::<List>()))
            }
            _ => None,
        }
    }

    /// Materialize the elements of an ordered sequence.
    pub fn seq_elems(&self) -> Option<Vec<Value>> {
        match self {
            Value::Vec(v) => Some(v.as_ref().clone()),
            Value::List(l) => Some(l.iter().cloned().collect()),
            _ => None,
        }
    }

    /// Rebuild an ordered sequence of the same shape as `self` from `elems`.
    pub fn rebuild_seq(&self, elems: Vec<Value>) -> Value {
        match self {
            Value::List(_) => Value::List(elems.into_iter().collect::<List>()),
            _ => Value::vector(elems),
        }
    }

    /// Membership test for sets.
    pub fn contains(&self, elem: &Value) -> Option<bool> {
        match self {
            Value::Set(s) => Some(s.contains(elem)),
            _ => None,
        }
    }

    /// A new set with `elem` added.
    pub fn conj(&self, elem: Value) -> Option<Value> {
        match self {
            Value::Set(s) => {
                let mut s = s.clone();
                std::rc::Rc::make_mut(&mut s).insert(elem);
                Some(Value::Set(s))
            }
            _ => None,
        }
    }
}

/// Build a set value from elements (later duplicates collapse).
pub fn set_of(elems: impl IntoIterator<Item = Value>) -> Value {
    let s: IndexSet<Value> = elems.into_iter().collect();
    Value::set(s)
}
