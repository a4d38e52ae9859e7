use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use trait_set::trait_set;

use crate::error::ModuleResult;
use crate::evaluate::{Module, Require};
use crate::value::Value;

trait_set! {
  /// The body of a unit. It receives the handle bound to its own location and
  /// the module whose exports it should fill in.
  pub trait FactoryFn = Fn(&Require, &Module) -> ModuleResult<()>;
}

/// Shared, type-erased [FactoryFn]
pub type Factory = Rc<dyn FactoryFn>;

/// A piece of tree to be merged into an installer. Fragments are inert until
/// installed.
#[derive(Clone)]
pub enum Fragment {
  /// A directory. Merged recursively into an existing directory.
  Dir(HashMap<String, Fragment>),
  /// A unit with its declared static dependencies
  Unit {
    /// Identifiers that must be installed and ready before the unit is
    /// considered ready
    deps: Vec<String>,
    /// The body; [None] only for units whose exports are assigned directly
    factory: Option<Factory>,
  },
  /// An identifier resolved relative to the node's own location
  Alias(String),
  /// A temporary exports value, replaced by the first real definition
  Stub(Value),
  /// A pre-evaluated unit. If the node already exists and has not been
  /// evaluated, the value becomes its exports and its factory never runs.
  Value(Value),
}
impl Fragment {
  /// A directory from name-fragment pairs
  #[must_use]
  pub fn tree<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, Fragment)>) -> Self {
    Self::Dir(entries.into_iter().map(|(k, v)| (k.as_ref().to_string(), v)).collect())
  }

  /// A unit with no dependencies
  #[must_use]
  pub fn module(factory: impl Fn(&Require, &Module) -> ModuleResult<()> + 'static) -> Self {
    Self::Unit { deps: Vec::new(), factory: Some(Rc::new(factory)) }
  }

  /// A unit with declared dependencies
  #[must_use]
  pub fn with_deps<S: Into<String>>(
    deps: impl IntoIterator<Item = S>,
    factory: impl Fn(&Require, &Module) -> ModuleResult<()> + 'static,
  ) -> Self {
    Self::Unit { deps: deps.into_iter().map(Into::into).collect(), factory: Some(Rc::new(factory)) }
  }

  /// An alias to another identifier
  #[must_use]
  pub fn alias(target: impl Into<String>) -> Self { Self::Alias(target.into()) }

  /// A stub exports value
  #[must_use]
  pub fn stub(value: Value) -> Self { Self::Stub(value) }

  /// A unit with preset exports
  #[must_use]
  pub fn value(value: Value) -> Self { Self::Value(value) }

  /// Build a unit from a loosely typed list of parts:
  ///
  /// - every [Part::Dep] becomes a declared dependency, in order
  /// - the last [Part::Factory] becomes the body
  /// - without a factory, the [Part::Record]s are merged into a stub
  /// - with neither, the unit's body waits for each dependency and then
  ///   requires it
  #[must_use]
  pub fn from_parts(parts: impl IntoIterator<Item = Part>) -> Self {
    let mut deps = Vec::new();
    let mut factory = None;
    let mut records = Vec::new();
    for part in parts {
      match part {
        Part::Dep(dep) => deps.push(dep),
        Part::Factory(f) => factory = Some(f),
        Part::Record(value) => records.push(value),
      }
    }
    if factory.is_none() && !records.is_empty() {
      let stub = Value::record();
      for rec in records {
        if let Value::Record(fields) = &rec {
          for (k, v) in fields.borrow().iter() {
            stub.set(k.clone(), v.clone());
          }
        }
      }
      return Self::Stub(stub);
    }
    let factory = factory.unwrap_or_else(|| require_each(deps.clone()));
    Self::Unit { deps, factory: Some(factory) }
  }
}

/// Body of a unit that only lists dependencies: each is queued as its own
/// entry point so that it is required as soon as it becomes ready.
fn require_each(deps: Vec<String>) -> Factory {
  Rc::new(move |require: &Require, _: &Module| -> ModuleResult<()> {
    for dep in deps.iter().cloned() {
      require.ensure([dep.clone()], move |require: &Require, _: &Module| {
        require.require(&dep).map(|_| ())
      });
    }
    Ok(())
  })
}

impl fmt::Debug for Fragment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Dir(entries) => f.debug_map().entries(entries.iter()).finish(),
      Self::Unit { deps, factory } =>
        f.debug_struct("Unit").field("deps", deps).field("factory", &factory.is_some()).finish(),
      Self::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
      Self::Stub(value) => f.debug_tuple("Stub").field(value).finish(),
      Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
    }
  }
}

/// An element of the list accepted by [Fragment::from_parts]
#[derive(Clone)]
pub enum Part {
  /// A declared dependency
  Dep(String),
  /// A unit body
  Factory(Factory),
  /// Fields of a stub exports value
  Record(Value),
}
impl Part {
  /// Wrap a closure as a [Part::Factory]
  #[must_use]
  pub fn factory(f: impl Fn(&Require, &Module) -> ModuleResult<()> + 'static) -> Self {
    Self::Factory(Rc::new(f))
  }
}
impl From<&str> for Part {
  fn from(value: &str) -> Self { Self::Dep(value.to_string()) }
}
impl From<String> for Part {
  fn from(value: String) -> Self { Self::Dep(value) }
}
impl From<Value> for Part {
  fn from(value: Value) -> Self { Self::Record(value) }
}

#[cfg(test)]
mod test {
  use super::{Fragment, Part};
  use crate::value::Value;

  #[test]
  fn parts_with_factory() {
    let frag = Fragment::from_parts([
      Part::from("./a"),
      Part::factory(|_, _| Ok(())),
      Part::from("./b"),
      Part::from(Value::from_pairs([("x", Value::Null)])),
    ]);
    match frag {
      Fragment::Unit { deps, factory } => {
        assert_eq!(deps, ["./a", "./b"]);
        assert!(factory.is_some());
      },
      other => panic!("expected unit, got {other:?}"),
    }
  }

  #[test]
  fn records_become_stub() {
    let frag = Fragment::from_parts([
      Part::from("./a"),
      Part::from(Value::from_pairs([("x", Value::from(true))])),
      Part::from(Value::from_pairs([("y", Value::from(false))])),
    ]);
    let Fragment::Stub(stub) = frag else { panic!("expected stub") };
    assert_eq!(stub.get("x"), Some(Value::from(true)));
    assert_eq!(stub.get("y"), Some(Value::from(false)));
  }

  #[test]
  fn deps_only_get_default_body() {
    let Fragment::Unit { deps, factory } = Fragment::from_parts([Part::from("x")]) else {
      panic!("expected unit")
    };
    assert_eq!(deps, ["x"]);
    assert!(factory.is_some());
  }
}
