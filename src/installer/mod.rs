//! The context that owns a tree and everything scheduled against it

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::config::{Config, Options};
use crate::evaluate::Require;
use crate::prefetch::{Batch, Fetch};
use crate::scheduler::{schedule_flush, Queue};
use crate::tree::node::Node;
use crate::tree::{merge, Fragment};

struct Shared {
  root: Node,
  config: Config,
  queue: RefCell<Queue>,
  batch: RefCell<Batch>,
  fetch: RefCell<Option<Rc<dyn Fetch>>>,
}

/// A module tree together with its deferred queue, its prefetch batch and its
/// configuration. Clones share all state.
#[derive(Clone)]
pub struct Installer(Rc<Shared>);
impl Installer {
  /// Create an empty tree
  #[must_use]
  pub fn new(config: Config) -> Self {
    Self(Rc::new(Shared {
      root: Node::root(),
      config,
      queue: RefCell::default(),
      batch: RefCell::default(),
      fetch: RefCell::new(None),
    }))
  }

  /// Merge a fragment into the tree and give queued entry points another
  /// chance to run. Returns the handle bound to the root.
  pub fn install(&self, fragment: Fragment) -> Require {
    self.merge_fragment(fragment, None);
    self.handle()
  }

  /// [Installer::install] with options applied to every node the fragment
  /// creates
  pub fn install_with(&self, fragment: Fragment, options: Options) -> Require {
    self.merge_fragment(fragment, Some(Rc::new(options)));
    self.handle()
  }

  /// The handle bound to the root
  #[must_use]
  pub fn handle(&self) -> Require { Require::new(self.clone(), self.0.root.clone()) }

  /// Set the collaborator that supplies missing units to prefetch batches
  pub fn set_fetch(&self, fetch: impl Fetch + 'static) {
    *self.0.fetch.borrow_mut() = Some(Rc::new(fetch));
  }

  pub(crate) fn merge_fragment(&self, fragment: Fragment, options: Option<Rc<Options>>) {
    debug!(?fragment, "installing");
    merge(&self.0.root, fragment, options.as_ref());
    schedule_flush(self);
  }

  pub(crate) fn root(&self) -> &Node { &self.0.root }
  pub(crate) fn config(&self) -> &Config { &self.0.config }
  pub(crate) fn queue(&self) -> &RefCell<Queue> { &self.0.queue }
  pub(crate) fn batch(&self) -> &RefCell<Batch> { &self.0.batch }
  pub(crate) fn fetcher(&self) -> Option<Rc<dyn Fetch>> { self.0.fetch.borrow().clone() }
}
impl fmt::Debug for Installer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Installer")
      .field("config", &self.0.config)
      .field("queued", &self.0.queue.borrow().len())
      .field("batch", &*self.0.batch.borrow())
      .finish_non_exhaustive()
  }
}
