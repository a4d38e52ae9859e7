//! Evaluation of units and the handles given to their factories

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::error::{ModuleError, ModuleResult, NotFound};
use crate::installer::Installer;
use crate::prefetch::{prefetch, Fetch};
use crate::readiness::ready;
use crate::resolver::{extensions, resolve};
use crate::scheduler::enqueue;
use crate::tree::node::{Contents, Node, Unit};
use crate::value::Value;

/// Evaluate the unit at a node at most once and return its exports. Anything
/// that isn't a unit or a stub yields [None]. `parent` is the unit on whose
/// behalf the evaluation happens.
pub(crate) fn evaluate(
  inst: &Installer,
  node: &Node,
  parent: Option<&Node>,
) -> ModuleResult<Option<Value>> {
  let factory = match &*node.contents() {
    Contents::Stub(value) => return Ok(Some(value.clone())),
    Contents::Unit(unit) => unit.factory.clone(),
    _ => return Ok(None),
  };
  if let Some(parent) = parent {
    parent.note_child(node);
    node.claim_parent_module(parent);
  }
  if let Some(exports) = node.exports() {
    return Ok(Some(exports));
  }
  let exports = Value::record();
  node.set_exports(exports.clone());
  let module = Module(node.clone());
  if let Some(before) = &inst.config().before_evaluate {
    if before(&module) {
      debug!(node = ?node, "evaluation taken over by hook");
      return Ok(node.exports());
    }
  }
  if let Some(factory) = factory {
    debug!(node = ?node, "evaluating");
    factory(&Require::new(inst.clone(), node.clone()), &module)?;
  }
  Ok(node.exports().or(Some(exports)))
}

/// The view of a unit handed to its factory and to hooks
#[derive(Clone, PartialEq, Eq)]
pub struct Module(pub(crate) Node);
impl Module {
  /// Identity of the unit, [None] for anonymous entry points
  pub fn id(&self) -> Option<&str> { self.0.id() }
  /// The current exports; [None] before evaluation starts
  pub fn exports(&self) -> Option<Value> { self.0.exports() }
  /// Replace the exports. Units that already received the old value keep it.
  pub fn set_exports(&self, value: Value) { self.0.set_exports(value) }
  /// Identities required by this unit, in the order they were first required
  pub fn children(&self) -> Vec<String> { self.0.children() }
  /// A unit evaluated on behalf of this one, by identity
  pub fn child(&self, id: &str) -> Option<Module> { self.0.child_by_id(id).map(Module) }
  /// The first unit that evaluated this one
  pub fn parent(&self) -> Option<Module> { self.0.parent_module().map(Module) }
}
impl fmt::Debug for Module {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Module").field(&self.0).finish()
  }
}

/// A resolution handle bound to a location in the tree. Relative identifiers
/// are resolved from the directory of the bound node.
#[derive(Clone)]
pub struct Require {
  inst: Installer,
  node: Node,
}
impl Require {
  pub(crate) fn new(inst: Installer, node: Node) -> Self { Self { inst, node } }

  /// Resolve and evaluate a unit, returning its exports. A unit that's
  /// already being evaluated further up the stack returns its exports as they
  /// are now.
  pub fn require(&self, id: &str) -> ModuleResult<Value> {
    let found = match resolve(&self.inst, &self.node, id, Some(&self.node))? {
      Some(node) => evaluate(&self.inst, &node, Some(&self.node))?.map(|v| (node, v)),
      None => None,
    };
    match found {
      Some((node, value)) => {
        self.node.push_child(&node);
        Ok(value)
      },
      None => {
        let err = NotFound::new(id, self.node.id()).pack();
        match &self.inst.config().fallback {
          Some(fallback) => fallback.value(id, self.node.id(), err),
          None => Err(err),
        }
      },
    }
  }

  /// The identity an identifier resolves to
  pub fn resolve(&self, id: &str) -> ModuleResult<String> {
    let found = resolve(&self.inst, &self.node, id, Some(&self.node))?;
    match found.as_ref().and_then(Node::id) {
      Some(found) => Ok(found.to_string()),
      None => {
        let err = NotFound::new(id, self.node.id()).pack();
        match &self.inst.config().fallback {
          Some(fallback) => fallback.resolve(id, self.node.id(), err),
          None => Err(err),
        }
      },
    }
  }

  /// Whether an identifier resolves to a unit whose dependencies are all
  /// installed, transitively
  pub fn ready(&self, id: &str) -> bool {
    match resolve(&self.inst, &self.node, id, Some(&self.node)) {
      Ok(Some(node)) => ready(&self.inst, &node),
      _ => false,
    }
  }

  /// The extension list in effect for identifiers resolved by this handle
  pub fn extensions(&self) -> Vec<String> { extensions(&self.inst, &self.node) }

  /// Queue an anonymous entry point which runs once every dependency is ready.
  /// Entry points run in the order they were queued.
  pub fn ensure<S: Into<String>>(
    &self,
    deps: impl IntoIterator<Item = S>,
    callback: impl Fn(&Require, &Module) -> ModuleResult<()> + 'static,
  ) {
    let deps = deps.into_iter().map(Into::into).collect();
    let entry = Node::anonymous(&self.node, Unit::new(Some(Rc::new(callback)), deps));
    enqueue(&self.inst, entry);
  }

  /// Make sure an identifier and its declared dependencies are installed,
  /// fetching whatever is missing. Resolves to the identity of the unit.
  pub fn prefetch(&self, id: &str) -> LocalBoxFuture<'static, ModuleResult<String>> {
    prefetch(&self.inst, &self.node, id)
  }

  /// Set the collaborator that supplies missing units
  pub fn set_fetch(&self, fetch: impl Fetch + 'static) { self.inst.set_fetch(fetch) }

  /// The unit this handle is bound to
  pub fn module(&self) -> Module { Module(self.node.clone()) }
}
impl fmt::Debug for Require {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Require").field("node", &self.node).finish_non_exhaustive()
  }
}

#[cfg(test)]
mod test {
  use std::cell::Cell;
  use std::rc::Rc;

  use futures::executor::LocalPool;

  use crate::config::Config;
  use crate::error::{NotFound, Thrown};
  use crate::installer::Installer;
  use crate::tree::Fragment;
  use crate::value::Value;

  fn installer() -> (LocalPool, Installer) {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    (pool, inst)
  }

  #[test]
  fn evaluates_once() {
    let (_pool, inst) = installer();
    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let require = inst.install(Fragment::tree([(
      "a.js",
      Fragment::module(move |_, module| {
        runs2.set(runs2.get() + 1);
        module.set_exports(Value::from(false));
        Ok(())
      }),
    )]));
    assert_eq!(require.require("./a").ok(), Some(Value::from(false)));
    assert_eq!(require.require("/a.js").ok(), Some(Value::from(false)));
    assert_eq!(runs.get(), 1);
  }

  #[test]
  fn undefined_exports_are_memoized() {
    let (_pool, inst) = installer();
    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    let require = inst.install(Fragment::tree([(
      "u.js",
      Fragment::module(move |_, module| {
        runs2.set(runs2.get() + 1);
        module.set_exports(Value::Undefined);
        Ok(())
      }),
    )]));
    assert_eq!(require.require("./u").ok(), Some(Value::Undefined));
    assert_eq!(require.require("./u").ok(), Some(Value::Undefined));
    assert_eq!(runs.get(), 1);
  }

  #[test]
  fn circular_requirers_see_partial_exports() {
    let (_pool, inst) = installer();
    let require = inst.install(Fragment::tree([
      (
        "a.js",
        Fragment::module(|require, module| {
          let exports = module.exports().expect("created before the factory");
          exports.set("early", Value::from(true));
          let b = require.require("./b")?;
          exports.set("b_saw_late", b.get("saw_late").unwrap_or_default());
          exports.set("late", Value::from(true));
          Ok(())
        }),
      ),
      (
        "b.js",
        Fragment::module(|require, module| {
          let a = require.require("./a")?;
          let exports = module.exports().expect("created before the factory");
          exports.set("saw_early", a.get("early").unwrap_or_default());
          exports.set("saw_late", a.get("late").unwrap_or_default());
          Ok(())
        }),
      ),
    ]));
    let a = require.require("./a").expect("installed");
    assert_eq!(a.get("b_saw_late"), Some(Value::Undefined));
    let b = require.require("./b").expect("installed");
    assert_eq!(b.get("saw_early"), Some(Value::from(true)));
  }

  #[test]
  fn missing_modules_report_requester() {
    let (_pool, inst) = installer();
    let require = inst.install(Fragment::tree([(
      "a.js",
      Fragment::module(|require, _| require.require("./nope").map(|_| ())),
    )]));
    let err = require.require("./a").expect_err("dependency is missing");
    let nf = err.downcast_ref::<NotFound>().expect("not found");
    assert_eq!(nf.id, "./nope");
    assert_eq!(nf.requester.as_deref(), Some("/a.js"));
    assert!(require.resolve("./nope").is_err());
    assert_eq!(require.resolve("./a").ok().as_deref(), Some("/a.js"));
  }

  #[test]
  fn factory_errors_keep_partial_exports() {
    let (_pool, inst) = installer();
    let require = inst.install(Fragment::tree([(
      "bad.js",
      Fragment::module(|_, module| {
        module.exports().expect("created before the factory").set("x", Value::from(true));
        Err(Thrown::new("boom"))
      }),
    )]));
    let err = require.require("./bad").expect_err("factory fails");
    assert!(err.is::<Thrown>());
    let partial = require.require("./bad").expect("memoized");
    assert_eq!(partial.get("x"), Some(Value::from(true)));
  }

  #[test]
  fn bookkeeping() {
    let (_pool, inst) = installer();
    let require = inst.install(Fragment::tree([
      (
        "a.js",
        Fragment::module(|require, _| {
          require.require("./b")?;
          require.require("./b.js")?;
          require.require("./c")?;
          Ok(())
        }),
      ),
      ("b.js", Fragment::module(|_, _| Ok(()))),
      ("c.js", Fragment::module(|_, _| Ok(()))),
    ]));
    let a = require.module().child("/a.js");
    assert!(a.is_none(), "nothing evaluated yet");
    require.require("./a").expect("installed");
    let a = require.module().child("/a.js").expect("noted on the root handle");
    assert_eq!(a.children(), ["/b.js", "/c.js"]);
    let b = a.child("/b.js").expect("noted");
    assert_eq!(b.parent(), Some(a.clone()));
    assert_eq!(b.id(), Some("/b.js"));
  }
}
