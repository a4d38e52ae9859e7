//! Fetching missing units in batches.
//!
//! Every prefetch issued before the deferred batch runs joins the same batch.
//! The batch makes at most one call to the [Fetch] collaborator, installs what
//! it returns, and then settles its futures in the order they were requested.

use std::fmt;
use std::future::Future;
use std::mem;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::error::{Abandoned, ModuleError, ModuleResult, NotFound};
use crate::installer::Installer;
use crate::resolver::{absolute_id, extensions, resolve};
use crate::scheduler::Unstarted;
use crate::tree::node::{Contents, Node};
use crate::tree::Fragment;
use crate::value::Value;

/// Details of a missing identifier handed to the [Fetch] collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
  /// Identity of the unit that needs it
  pub requester: Option<String>,
  /// The stub currently installed in its place, if any
  pub stub: Option<Value>,
  /// Extensions in effect where the identifier was requested
  pub extensions: Vec<String>,
}

/// The host's way of obtaining units. It receives the missing identifiers,
/// keyed by absolute identity where possible, and returns a fragment rooted at
/// the root of the tree.
pub trait Fetch {
  /// Obtain the missing units
  fn fetch(&self, missing: Vec<(String, FetchRequest)>)
  -> LocalBoxFuture<'static, ModuleResult<Fragment>>;
}
impl<F, Fut> Fetch for F
where
  F: Fn(Vec<(String, FetchRequest)>) -> Fut,
  Fut: Future<Output = ModuleResult<Fragment>> + 'static,
{
  fn fetch(
    &self,
    missing: Vec<(String, FetchRequest)>,
  ) -> LocalBoxFuture<'static, ModuleResult<Fragment>> {
    self(missing).boxed_local()
  }
}

struct Waiter {
  from: Node,
  id: String,
  tx: oneshot::Sender<ModuleResult<String>>,
}

/// Prefetch requests collected since the last batch started
#[derive(Default)]
pub(crate) struct Batch {
  waiters: Vec<Waiter>,
  missing: Vec<(String, FetchRequest)>,
  scheduled: bool,
}
impl fmt::Debug for Batch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Batch")
      .field("waiting", &self.waiters.len())
      .field("missing", &self.missing.iter().map(|(k, _)| k).collect::<Vec<_>>())
      .field("scheduled", &self.scheduled)
      .finish()
  }
}

/// Join the current batch with an identifier resolved from `from`
pub(crate) fn prefetch(
  inst: &Installer,
  from: &Node,
  id: &str,
) -> LocalBoxFuture<'static, ModuleResult<String>> {
  let (tx, rx) = oneshot::channel();
  let mut missing = Vec::new();
  collect_missing(inst, from, id, &mut missing, &mut HashSet::new());
  let start = {
    let mut batch = inst.batch().borrow_mut();
    batch.waiters.push(Waiter { from: from.clone(), id: id.to_string(), tx });
    for (key, req) in missing {
      if !batch.missing.iter().any(|(k, _)| *k == key) {
        batch.missing.push((key, req));
      }
    }
    !mem::replace(&mut batch.scheduled, true)
  };
  if start {
    let task = Unstarted::new(inst.clone(), abandon);
    inst.config().defer.defer(
      async move {
        if let Some(inst) = task.start() {
          run_batch(inst).await
        }
      }
      .boxed_local(),
    );
  }
  let id = id.to_string();
  async move { rx.await.unwrap_or_else(|_| Err(Abandoned { id }.pack())) }.boxed_local()
}

enum Found {
  Stub(Value),
  Deps(Vec<String>),
  Other,
}

/// Gather the identifiers that must be fetched before `id` can be required
/// from `from`: the identifier itself if it doesn't resolve or resolves to a
/// stub, and otherwise the same for each declared dependency, transitively.
pub(crate) fn collect_missing(
  inst: &Installer,
  from: &Node,
  id: &str,
  out: &mut Vec<(String, FetchRequest)>,
  seen: &mut HashSet<Node>,
) {
  let request = |stub| FetchRequest {
    requester: from.id().map(str::to_string),
    stub,
    extensions: extensions(inst, from),
  };
  let node = match resolve(inst, from, id, Some(from)) {
    Ok(Some(node)) => node,
    Ok(None) => {
      let base = from.enclosing_dir().and_then(|d| d.id().map(str::to_string)).unwrap_or_default();
      out.push((absolute_id(&base, id), request(None)));
      return;
    },
    Err(e) => {
      debug!(id, error = %e, "resolution failed while collecting missing units");
      return;
    },
  };
  if !seen.insert(node.clone()) {
    return;
  }
  let found = match &*node.contents() {
    Contents::Stub(value) => Found::Stub(value.clone()),
    Contents::Unit(unit) => Found::Deps(unit.deps.clone()),
    _ => Found::Other,
  };
  match found {
    Found::Stub(value) => out.push((node.id().unwrap_or_default().to_string(), request(Some(value)))),
    Found::Deps(deps) =>
      for dep in deps {
        collect_missing(inst, &node, &dep, out, seen);
      },
    Found::Other => (),
  }
}

/// A batch task dropped before it ran releases its waiters, which settles
/// their futures with [Abandoned]
fn abandon(inst: &Installer) {
  let waiters = match inst.batch().try_borrow_mut() {
    Ok(mut batch) => {
      batch.scheduled = false;
      batch.missing.clear();
      mem::take(&mut batch.waiters)
    },
    Err(_) => return,
  };
  warn!(waiting = waiters.len(), "prefetch batch dropped before it ran");
}

async fn run_batch(inst: Installer) {
  let (waiters, missing) = {
    let mut batch = inst.batch().borrow_mut();
    batch.scheduled = false;
    (mem::take(&mut batch.waiters), mem::take(&mut batch.missing))
  };
  let fetched = match inst.fetcher() {
    Some(fetch) if !missing.is_empty() => {
      let keys = missing.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
      debug!(missing = ?keys, "fetching");
      fetch.fetch(missing).await.map(Some)
    },
    _ => Ok(None),
  };
  match fetched {
    Err(e) => {
      debug!(error = %e, waiting = waiters.len(), "fetch failed");
      for waiter in waiters {
        let _ = waiter.tx.send(Err(e.clone()));
      }
    },
    Ok(fragment) => {
      if let Some(fragment) = fragment {
        inst.merge_fragment(fragment, None);
      }
      debug!(waiting = waiters.len(), "settling prefetch batch");
      for Waiter { from, id, tx } in waiters {
        let result = match resolve(&inst, &from, &id, Some(&from)) {
          Ok(Some(node)) => match node.id() {
            Some(found) => Ok(found.to_string()),
            None => Err(NotFound::new(&id, from.id()).pack()),
          },
          Ok(None) => Err(NotFound::new(&id, from.id()).pack()),
          Err(e) => Err(e),
        };
        let _ = tx.send(result);
      }
    },
  }
}

#[cfg(test)]
mod test {
  use futures::executor::{block_on, LocalPool};
  use hashbrown::HashSet;

  use super::collect_missing;
  use crate::config::Config;
  use crate::error::Abandoned;
  use crate::installer::Installer;
  use crate::tree::Fragment;
  use crate::value::Value;

  #[test]
  fn missing_units() {
    let pool = LocalPool::new();
    let inst = Installer::new(Config::new(pool.spawner()));
    inst.install(Fragment::tree([(
      "lib",
      Fragment::tree([
        ("a.js", Fragment::with_deps(["./b", "../c", "./s", "dep"], |_, _| Ok(()))),
        ("b.js", Fragment::with_deps(["./a", "./d"], |_, _| Ok(()))),
        ("s.js", Fragment::stub(Value::Null)),
      ]),
    )]));
    let mut out = Vec::new();
    collect_missing(&inst, inst.root(), "./lib/a", &mut out, &mut HashSet::new());
    let keys = out.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, ["/lib/d", "/c", "/lib/s.js", "dep"]);
    let (_, stub) = &out[2];
    assert_eq!(stub.stub, Some(Value::Null));
    assert_eq!(stub.requester.as_deref(), Some("/lib/a.js"));
    assert_eq!(stub.extensions, [".js", ".json"]);
  }

  #[test]
  fn refused_batch_is_abandoned() {
    let pool = LocalPool::new();
    let spawner = pool.spawner();
    drop(pool);
    let inst = Installer::new(Config::new(spawner));
    let err = block_on(inst.handle().prefetch("./a")).expect_err("the executor is gone");
    assert_eq!(err.downcast_ref::<Abandoned>().map(|a| a.id.as_str()), Some("./a"));
    let batch = inst.batch().borrow();
    assert!(!batch.scheduled);
    assert!(batch.waiters.is_empty());
    assert!(batch.missing.is_empty());
  }
}
