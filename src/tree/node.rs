use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use hashbrown::HashMap;

use super::fragment::Factory;
use crate::config::Options;
use crate::value::Value;

/// A directory listing together with the readiness verdicts of identifiers
/// resolved from within it. Resolution of a given identifier has the same
/// outcome for every unit in a directory that shares the directory's options,
/// so those units share the verdicts.
#[derive(Default)]
pub(crate) struct Directory {
  pub entries: HashMap<String, Node>,
  pub ready: HashMap<String, bool>,
}

/// A loadable unit
#[derive(Clone)]
pub(crate) struct Unit {
  /// [None] for units whose exports were assigned directly
  pub factory: Option<Factory>,
  /// Declared static dependencies, in order
  pub deps: Vec<String>,
  /// The dependencies not yet proven ready
  pub pending: Vec<String>,
}
impl Unit {
  pub fn new(factory: Option<Factory>, deps: Vec<String>) -> Self {
    Self { factory, pending: deps.clone(), deps }
  }
}

pub(crate) enum Contents {
  Absent,
  Dir(Directory),
  Unit(Unit),
  Alias(String),
  Stub(Value),
}
impl Contents {
  /// Whether a definition arriving later may take this one's place
  pub fn is_placeholder(&self) -> bool { matches!(self, Self::Absent | Self::Stub(_)) }
}

/// Progress of the readiness computation on a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
  Unknown,
  /// Dependencies are being expanded at the given depth
  InProgress(usize),
  /// Proven ready. The tree only grows, so this never changes back.
  Ready,
}

pub(crate) struct NodeData {
  name: Option<String>,
  id: Option<String>,
  parent: Option<Weak<NodeData>>,
  options: Option<Rc<Options>>,
  contents: RefCell<Contents>,
  exports: RefCell<Option<Value>>,
  visit: Cell<Visit>,
  children: RefCell<Vec<String>>,
  children_by_id: RefCell<HashMap<String, Weak<NodeData>>>,
  parent_module: RefCell<Option<Weak<NodeData>>>,
}

/// A directory or unit in the tree. Clones refer to the same node; equality
/// and hashing are by identity.
#[derive(Clone)]
pub(crate) struct Node(Rc<NodeData>);
impl Node {
  fn create(
    name: Option<String>,
    parent: Option<&Node>,
    options: Option<Rc<Options>>,
    contents: Contents,
  ) -> Self {
    let id = match (&name, parent) {
      (Some(name), Some(parent)) => Some(format!("{}/{name}", parent.id().unwrap_or(""))),
      (None, None) => Some(String::new()),
      (_, _) => None,
    };
    Self(Rc::new(NodeData {
      name,
      id,
      parent: parent.map(|p| Rc::downgrade(&p.0)),
      options,
      contents: RefCell::new(contents),
      exports: RefCell::new(None),
      visit: Cell::new(Visit::Unknown),
      children: RefCell::default(),
      children_by_id: RefCell::default(),
      parent_module: RefCell::new(None),
    }))
  }

  /// A fresh empty root directory. Its identity is the empty path.
  pub fn root() -> Self { Self::create(None, None, None, Contents::Dir(Directory::default())) }

  /// A named node under a directory. The caller is responsible for listing it
  /// in the parent.
  pub fn child_of(parent: &Node, name: &str, options: Option<Rc<Options>>) -> Self {
    Self::create(Some(name.to_string()), Some(parent), options, Contents::Absent)
  }

  /// A node that takes its namespace from `parent` without being listed
  /// anywhere. It has no identity.
  pub fn anonymous(parent: &Node, unit: Unit) -> Self {
    Self::create(None, Some(parent), None, Contents::Unit(unit))
  }

  pub fn id(&self) -> Option<&str> { self.0.id.as_deref() }
  pub fn name(&self) -> Option<&str> { self.0.name.as_deref() }
  pub fn parent(&self) -> Option<Node> { self.0.parent.as_ref()?.upgrade().map(Self) }
  pub fn options(&self) -> Option<&Rc<Options>> { self.0.options.as_ref() }

  pub fn contents(&self) -> Ref<'_, Contents> { self.0.contents.borrow() }
  pub fn replace_contents(&self, contents: Contents) -> Contents {
    self.0.contents.replace(contents)
  }
  /// Run a mutation on the contents. The callback must not reach back into
  /// this node.
  pub fn with_contents_mut<T>(&self, f: impl FnOnce(&mut Contents) -> T) -> T {
    f(&mut self.0.contents.borrow_mut())
  }

  pub fn is_dir(&self) -> bool { matches!(*self.contents(), Contents::Dir(_)) }

  /// Look up a listed child of a directory
  pub fn child(&self, name: &str) -> Option<Node> {
    match &*self.contents() {
      Contents::Dir(dir) => dir.entries.get(name).cloned(),
      _ => None,
    }
  }

  /// The node itself if it's a directory, otherwise its closest directory
  /// ancestor
  pub fn enclosing_dir(&self) -> Option<Node> {
    let mut cur = self.clone();
    while !cur.is_dir() {
      cur = cur.parent()?;
    }
    Some(cur)
  }

  pub fn root_of(&self) -> Node {
    let mut cur = self.clone();
    while let Some(parent) = cur.parent() {
      cur = parent;
    }
    cur
  }

  /// The target of an alias node
  pub fn alias(&self) -> Option<String> {
    match &*self.contents() {
      Contents::Alias(target) => Some(target.clone()),
      _ => None,
    }
  }

  /// The options in effect for this node, inherited from the closest ancestor
  /// that has any
  pub fn effective_options(&self) -> Option<Rc<Options>> {
    let mut cur = Some(self.clone());
    while let Some(node) = cur {
      if let Some(opts) = node.options() {
        return Some(opts.clone());
      }
      cur = node.parent();
    }
    None
  }

  pub fn exports(&self) -> Option<Value> { self.0.exports.borrow().clone() }
  pub fn set_exports(&self, value: Value) { *self.0.exports.borrow_mut() = Some(value) }

  pub fn visit(&self) -> Visit { self.0.visit.get() }
  pub fn set_visit(&self, visit: Visit) { self.0.visit.set(visit) }

  /// Record a unit evaluated on behalf of this one
  pub fn note_child(&self, child: &Node) {
    let Some(id) = child.id() else { return };
    let mut by_id = self.0.children_by_id.borrow_mut();
    by_id.entry(id.to_string()).or_insert_with(|| Rc::downgrade(&child.0));
  }
  /// Record an identity required by this unit
  pub fn push_child(&self, child: &Node) {
    let Some(id) = child.id() else { return };
    let mut children = self.0.children.borrow_mut();
    if !children.iter().any(|c| c == id) {
      children.push(id.to_string());
    }
  }
  pub fn children(&self) -> Vec<String> { self.0.children.borrow().clone() }
  pub fn child_by_id(&self, id: &str) -> Option<Node> {
    self.0.children_by_id.borrow().get(id)?.upgrade().map(Self)
  }

  pub fn parent_module(&self) -> Option<Node> {
    self.0.parent_module.borrow().as_ref()?.upgrade().map(Self)
  }
  /// Set the first unit that evaluated this one. Later callers are ignored.
  pub fn claim_parent_module(&self, parent: &Node) {
    let mut slot = self.0.parent_module.borrow_mut();
    if slot.is_none() {
      *slot = Some(Rc::downgrade(&parent.0));
    }
  }
}

impl PartialEq for Node {
  fn eq(&self, other: &Self) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}
impl Eq for Node {}
impl Hash for Node {
  fn hash<H: Hasher>(&self, state: &mut H) { Rc::as_ptr(&self.0).hash(state) }
}

impl fmt::Debug for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.id() {
      Some("") => write!(f, "Node(<root>)"),
      Some(id) => write!(f, "Node({id})"),
      None => write!(f, "Node(<anonymous>)"),
    }
  }
}
