//! Dynamically typed values passed between modules as exports

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use itertools::Itertools;
use ordered_float::NotNan;

/// A shared, mutable key-value record. Exports containers are records so that
/// a module observing another one mid-evaluation sees fields as they are
/// filled in.
pub type Record = Rc<RefCell<HashMap<String, Value>>>;

/// The value of a module's exports, or of any field within it.
#[derive(Clone, Default)]
pub enum Value {
  /// No value; still counts as evaluated when memoized
  #[default]
  Undefined,
  /// An explicit empty value
  Null,
  /// A boolean
  Bool(bool),
  /// A number that is never NaN
  Num(NotNan<f64>),
  /// A string
  Str(Rc<str>),
  /// A shared record
  Record(Record),
  /// Anything the host wants to pass through the tree unchanged
  Opaque(Rc<dyn Any>),
}
impl Value {
  /// A new empty record
  #[must_use]
  pub fn record() -> Self { Self::Record(Rc::default()) }

  /// A new record with the given fields
  #[must_use]
  pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
    Self::Record(Rc::new(RefCell::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())))
  }

  /// A string value
  #[must_use]
  pub fn str(s: impl AsRef<str>) -> Self { Self::Str(Rc::from(s.as_ref())) }

  /// A number, or [None] for NaN
  #[must_use]
  pub fn num(n: f64) -> Option<Self> { NotNan::new(n).ok().map(Self::Num) }

  /// Wrap an arbitrary host value
  #[must_use]
  pub fn opaque<T: Any>(t: T) -> Self { Self::Opaque(Rc::new(t)) }

  /// Read a field of a record. Non-records have no fields.
  #[must_use]
  pub fn get(&self, key: &str) -> Option<Value> {
    match self {
      Self::Record(rec) => rec.borrow().get(key).cloned(),
      _ => None,
    }
  }

  /// Assign a field of a record. Returns false if the value is not a record.
  pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
    match self {
      Self::Record(rec) => {
        rec.borrow_mut().insert(key.into(), value);
        true
      },
      _ => false,
    }
  }

  /// The string content, if this is a string
  #[must_use]
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Str(s) => Some(s),
      _ => None,
    }
  }

  /// The boolean, if this is a boolean
  #[must_use]
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      _ => None,
    }
  }

  /// The number, if this is a number
  #[must_use]
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Num(n) => Some(n.into_inner()),
      _ => None,
    }
  }

  /// Access an opaque host value as a concrete type
  #[must_use]
  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    match self {
      Self::Opaque(any) => any.downcast_ref(),
      _ => None,
    }
  }

  /// Identity comparison. Records, strings and opaque values are compared by
  /// pointer, scalars by value.
  #[must_use]
  pub fn same(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b),
      (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b),
      (Self::Opaque(a), Self::Opaque(b)) => Rc::ptr_eq(a, b),
      (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
      (Self::Bool(a), Self::Bool(b)) => a == b,
      (Self::Num(a), Self::Num(b)) => a == b,
      _ => false,
    }
  }
}

/// Structural equality. Opaque values are only equal to themselves.
impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Str(a), Self::Str(b)) => a == b,
      (Self::Record(a), Self::Record(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
      _ => self.same(other),
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self { Self::Bool(value) }
}
impl From<&str> for Value {
  fn from(value: &str) -> Self { Self::str(value) }
}
impl From<String> for Value {
  fn from(value: String) -> Self { Self::Str(Rc::from(value)) }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Undefined => write!(f, "undefined"),
      Self::Null => write!(f, "null"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Num(n) => write!(f, "{n}"),
      Self::Str(s) => write!(f, "{s:?}"),
      Self::Opaque(_) => write!(f, "<opaque>"),
      Self::Record(rec) => match rec.try_borrow() {
        Err(_) => write!(f, "{{<borrowed>}}"),
        Ok(rec) => {
          let fields = rec.iter().sorted_by(|a, b| a.0.cmp(b.0));
          write!(f, "{{{}}}", fields.map(|(k, v)| format!("{k}: {v:?}")).join(", "))
        },
      },
    }
  }
}

#[cfg(test)]
mod test {
  use super::Value;

  #[test]
  fn records_share_state() {
    let exports = Value::record();
    let alias = exports.clone();
    assert!(exports.set("answer", Value::num(42.0).unwrap()));
    assert_eq!(alias.get("answer").and_then(|v| v.as_f64()), Some(42.0));
    assert!(alias.same(&exports));
    assert!(!Value::record().same(&exports));
  }

  #[test]
  fn structural_equality() {
    let a = Value::from_pairs([("x", Value::from(true))]);
    let b = Value::from_pairs([("x", Value::from(true))]);
    assert_eq!(a, b);
    assert!(!a.same(&b));
    assert!(!Value::Null.set("x", Value::Undefined));
    assert_eq!(format!("{a:?}"), "{x: true}");
  }
}
